//! Feature Service templates.
//!
//! A service's template lists its `layers` and `tables` by numeric id. Once the
//! service exists on the destination, every layer gets a URL (`<serviceUrl>/<id>`)
//! and all of them share the service's item id; maps that were rewritten against
//! this service resolve their `{{<svc>.layer<N>.url}}` tokens from these entries.
//! Layers that list their `fields` also publish each field's name under
//! `<svc>.layer<N>.fields.<lowercased name>.name`.

use anyhow::Result;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::BTreeSet;

use super::fields::service_layers;
use super::{DependencyResolution, ItemProcessor, UrlHash};
use crate::core::{ItemKind, ItemTemplate};
use crate::portal::{CreatedItem, Portal};

#[derive(Debug, Default, Clone, Copy)]
pub struct FeatureServiceProcessor;

/// Layer and table ids declared in the template's data or properties.
fn layer_ids(template: &ItemTemplate) -> BTreeSet<u64> {
    service_layers(template).filter_map(|layer| layer.get("id").and_then(Value::as_u64)).collect()
}

/// `(layer id, field name)` for every field listed by a layer or table.
fn layer_fields(template: &ItemTemplate) -> BTreeSet<(u64, String)> {
    service_layers(template)
        .filter_map(|layer| Some((layer.get("id")?.as_u64()?, layer.get("fields")?.as_array()?)))
        .flat_map(|(id, fields)| {
            fields
                .iter()
                .filter_map(|field| field.get("name").and_then(Value::as_str))
                .map(move |name| (id, name.to_string()))
        })
        .collect()
}

impl ItemProcessor for FeatureServiceProcessor {
    fn handles(&self, kind: &ItemKind) -> bool {
        *kind == ItemKind::FeatureService
    }

    fn extract<'a>(
        &'a self,
        template: &'a ItemTemplate,
        _portal: &'a dyn Portal,
    ) -> BoxFuture<'a, Result<DependencyResolution>> {
        let mut resolution = DependencyResolution::default();
        for id in &template.dependencies {
            resolution.push_dependency(id);
        }
        futures::future::ready(Ok(resolution)).boxed()
    }

    fn rewrite(&self, _template: &mut ItemTemplate, _url_hash: &UrlHash) {}

    fn created_entries(&self, template: &ItemTemplate, created: &CreatedItem) -> Vec<(String, Value)> {
        let Some(url) = created.url.as_deref() else {
            return Vec::new();
        };
        let source = &template.item_id;
        let url = url.trim_end_matches('/');

        let mut entries = vec![(format!("{source}.url"), Value::String(url.to_string()))];
        for id in layer_ids(template) {
            entries.push((format!("{source}.layer{id}.url"), Value::String(format!("{url}/{id}"))));
            entries.push((format!("{source}.layer{id}.itemId"), Value::String(created.id.clone())));
        }
        for (id, name) in layer_fields(template) {
            let path = format!("{source}.layer{id}.fields.{}.name", name.to_lowercase());
            entries.push((path, Value::String(name)));
        }
        entries
    }
}
