//! Field-name references inside map content.
//!
//! Maps name the fields of the layers they display: popups, renderers, label
//! expressions, filters and search settings. When the feature service owning such a
//! layer is part of the same Solution, each known field name is replaced with
//! `{{<svc>.layer<N>.fields.<name>.name}}`. The service publishes those entries
//! once it has been deployed, so the map follows any renaming on the destination.
//!
//! ```text
//! "renderer": {"field": "STATUS"}
//!     -> "renderer": {"field": "{{svc1.layer0.fields.status.name}}"}
//! "definitionExpression": "STATUS = 'open'"
//!     -> "definitionExpression": "{{svc1.layer0.fields.status.name}} = 'open'"
//! ```

use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::OnceLock;

use crate::core::{ItemKind, ItemTemplate};
use crate::templating::templatize_term;

/// Field names of one feature-service layer in the Solution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasourceInfo {
    /// Source id of the owning feature service.
    pub item_id: String,
    pub layer_id: u64,
    pub fields: Vec<String>,
}

impl DatasourceInfo {
    /// Dictionary prefix under which the deployed service publishes field names.
    pub fn base_path(&self) -> String {
        format!("{}.layer{}.fields", self.item_id, self.layer_id)
    }

    /// The placeholder a rewritten map layer carries as its `url`.
    pub fn layer_url_token(&self) -> String {
        templatize_term(&self.item_id, &self.item_id, &format!(".layer{}.url", self.layer_id))
    }

    /// Placeholder for `name` when it is one of this layer's fields (ignoring case).
    pub fn field_token(&self, name: &str) -> Option<String> {
        let known = self.fields.iter().find(|field| field.eq_ignore_ascii_case(name.trim()))?;
        let base = self.base_path();
        Some(templatize_term(&base, &base, &format!(".{}.name", known.to_lowercase())))
    }

    /// Replace every whole-word field name in `text`, in a single pass.
    fn templatize_words(&self, text: &str) -> String {
        let Some(words) = self.word_regex() else {
            return text.to_string();
        };
        words
            .replace_all(text, |caps: &Captures<'_>| {
                self.field_token(&caps[0]).unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    fn word_regex(&self) -> Option<Regex> {
        if self.fields.is_empty() {
            return None;
        }
        let alternation =
            self.fields.iter().map(|field| regex::escape(field)).collect::<Vec<_>>().join("|");
        Regex::new(&format!(r"\b(?:{alternation})\b")).ok()
    }

    /// Replace `<open>FIELD<close>` references, e.g. `{STATUS}` or `[STATUS]`.
    fn templatize_delimited(&self, text: &str, pattern: &Regex, open: &str, close: &str) -> String {
        pattern
            .replace_all(text, |caps: &Captures<'_>| match self.field_token(&caps[1]) {
                Some(token) => format!("{open}{token}{close}"),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

/// `{FIELD}` in popup text.
fn popup_reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([^{}]+)\}").expect("popup reference regex is valid"))
}

/// `[FIELD]` in label expressions.
fn label_reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\[\]]+)\]").expect("label reference regex is valid"))
}

/// Field lists of every feature-service layer and table in `templates`.
pub fn datasource_infos(templates: &[ItemTemplate]) -> Vec<DatasourceInfo> {
    let mut infos: Vec<DatasourceInfo> = Vec::new();
    for template in templates.iter().filter(|t| t.kind == ItemKind::FeatureService) {
        for layer in service_layers(template) {
            let Some(layer_id) = layer.get("id").and_then(Value::as_u64) else {
                continue;
            };
            let fields: Vec<String> = layer
                .get("fields")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|field| field.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect();
            if fields.is_empty()
                || infos.iter().any(|i| i.item_id == template.item_id && i.layer_id == layer_id)
            {
                continue;
            }
            infos.push(DatasourceInfo {
                item_id: template.item_id.clone(),
                layer_id,
                fields,
            });
        }
    }
    infos
}

/// Layer and table definitions of a feature-service template, from its data and
/// its properties.
pub(crate) fn service_layers(template: &ItemTemplate) -> impl Iterator<Item = &Value> {
    [&template.data, &template.properties]
        .into_iter()
        .flat_map(|section| ["layers", "tables"].map(move |list| section.get(list)))
        .flatten()
        .filter_map(Value::as_array)
        .flatten()
}

/// The datasource a map layer or table was rewritten against, matched by its
/// templatized `url`.
pub fn datasource_for<'d>(layer: &Value, datasources: &'d [DatasourceInfo]) -> Option<&'d DatasourceInfo> {
    let url = layer.get("url").and_then(Value::as_str)?;
    datasources.iter().find(|ds| ds.layer_url_token() == url)
}

/// Templatize the field references of one map layer or table.
pub fn templatize_layer_fields(layer: &mut Value, ds: &DatasourceInfo) {
    if let Some(popup) = layer.get_mut("popupInfo") {
        templatize_popup_info(popup, ds);
    }

    if let Some(inputs) = layer.pointer_mut("/definitionEditor/inputs").and_then(Value::as_array_mut) {
        for parameter in inputs
            .iter_mut()
            .filter_map(|input| input.get_mut("parameters").and_then(Value::as_array_mut))
            .flatten()
        {
            templatize_name_at(parameter, "fieldName", ds);
        }
    }

    if let Some(definition) = layer.get_mut("layerDefinition") {
        templatize_drawing_info(definition, ds);
        if let Some(Value::String(expression)) = definition.get_mut("definitionExpression") {
            *expression = ds.templatize_words(expression);
        }
    }
}

/// Templatize `field.name` of an application search layer.
pub fn templatize_search_field(search_layer: &mut Value, ds: &DatasourceInfo) {
    if let Some(field) = search_layer.get_mut("field") {
        templatize_name_at(field, "name", ds);
    }
}

fn templatize_popup_info(popup: &mut Value, ds: &DatasourceInfo) {
    if let Some(infos) = popup.get_mut("fieldInfos").and_then(Value::as_array_mut) {
        for info in infos {
            templatize_name_at(info, "fieldName", ds);
        }
    }

    for key in ["title", "description"] {
        if let Some(Value::String(text)) = popup.get_mut(key) {
            *text = ds.templatize_delimited(text, popup_reference_regex(), "{", "}");
        }
    }
}

fn templatize_drawing_info(definition: &mut Value, ds: &DatasourceInfo) {
    let Some(drawing) = definition.get_mut("drawingInfo") else {
        return;
    };

    if let Some(renderer) = drawing.get_mut("renderer") {
        for key in ["field", "field1", "field2", "field3", "normalizationField"] {
            templatize_name_at(renderer, key, ds);
        }
    }

    if let Some(labels) = drawing.get_mut("labelingInfo").and_then(Value::as_array_mut) {
        for label in labels {
            if let Some(Value::String(expression)) = label.get_mut("labelExpression") {
                *expression = ds.templatize_delimited(expression, label_reference_regex(), "[", "]");
            }
        }
    }
}

/// Replace the string at `object[key]` when it names a known field.
fn templatize_name_at(object: &mut Value, key: &str, ds: &DatasourceInfo) {
    if let Some(Value::String(name)) = object.get_mut(key)
        && let Some(token) = ds.field_token(name)
    {
        *name = token;
    }
}
