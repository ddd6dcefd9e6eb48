//! Web Map templates.
//!
//! A map's data lists `operationalLayers` and `tables`; each entry that carries a
//! `url` points at a layer of some feature service. Extraction asks the portal
//! which item owns each URL and whether the acting user administers it. Rewriting
//! then replaces the `url` and `itemId` of administered layers with placeholders
//! that resolve once the owning service has been deployed:
//!
//! ```text
//! "url": "https://services.example.com/.../FeatureServer/3"
//!     -> "url": "{{svc1234.layer3.url}}", "itemId": "{{svc1234.layer3.itemId}}"
//! ```
//!
//! Field names used by rewritten layers are templatized afterwards, once the whole
//! Solution is known (see [`super::fields`]).

use anyhow::{Context, Result};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

use super::fields::{datasource_for, templatize_layer_fields, templatize_search_field};
use super::{DatasourceInfo, DependencyResolution, ItemProcessor, UrlEntry, UrlHash};
use crate::core::{ItemKind, ItemTemplate};
use crate::portal::Portal;
use crate::templating::{PLACEHOLDER_SERVER_NAME, templatize_term};

/// Layer lists scanned, in this order.
const LAYER_LISTS: [&str; 2] = ["operationalLayers", "tables"];

#[derive(Debug, Default, Clone, Copy)]
pub struct WebMapProcessor;

/// Layers and tables of a map's data, operational layers first.
fn layer_entries(data: &Value) -> impl Iterator<Item = &Map<String, Value>> {
    LAYER_LISTS
        .iter()
        .filter_map(|list| data.get(*list).and_then(Value::as_array))
        .flatten()
        .filter_map(Value::as_object)
}

/// Numeric suffix taken from the last path segment of a layer URL.
fn layer_index(url: &str) -> &str {
    url.trim_end_matches('/').rsplit('/').next().unwrap_or_default()
}

/// Templatize the `url` and `itemId` of every administered layer in `layers`.
pub fn templatize_webmap_layer_ids_and_urls(layers: &mut [Value], url_hash: &UrlHash) {
    for layer in layers.iter_mut().filter_map(Value::as_object_mut) {
        let Some(url) = layer.get("url").and_then(Value::as_str) else {
            continue;
        };
        let Some(entry) = url_hash.get(url).filter(|entry| entry.can_templatize) else {
            continue;
        };

        let index = layer_index(url);
        let id = entry.id.as_str();
        let templated_url = templatize_term(id, id, &format!(".layer{index}.url"));
        let templated_id = templatize_term(id, id, &format!(".layer{index}.itemId"));
        layer.insert("url".to_string(), Value::String(templated_url));
        layer.insert("itemId".to_string(), Value::String(templated_id));
    }
}

impl ItemProcessor for WebMapProcessor {
    fn handles(&self, kind: &ItemKind) -> bool {
        *kind == ItemKind::WebMap
    }

    fn extract<'a>(
        &'a self,
        template: &'a ItemTemplate,
        portal: &'a dyn Portal,
    ) -> BoxFuture<'a, Result<DependencyResolution>> {
        async move {
            let mut resolution = DependencyResolution::default();
            // Administrator checks issued in this call, by owning id.
            let mut checked: HashMap<String, bool> = HashMap::new();

            for layer in layer_entries(&template.data) {
                let Some(url) = layer.get("url").and_then(Value::as_str) else {
                    continue;
                };

                let info = portal
                    .lookup_service_info(url)
                    .await
                    .with_context(|| format!("Failed to look up service {url}"))?;
                let Some(owner) = info.service_item_id else {
                    debug!("Layer {} has no owning item, left as is", url);
                    continue;
                };

                let can_templatize = match checked.get(&owner) {
                    Some(known) => *known,
                    None => {
                        let is_admin = portal
                            .check_is_administrator(&owner)
                            .await
                            .with_context(|| format!("Failed to check rights on {owner}"))?;
                        checked.insert(owner.clone(), is_admin);
                        is_admin
                    }
                };
                if !can_templatize {
                    debug!("Not an administrator of {}, keeping {} literal", owner, url);
                }

                resolution.push_dependency(&owner);
                resolution.url_hash.insert(
                    url.to_string(),
                    UrlEntry {
                        id: owner,
                        can_templatize,
                    },
                );
            }

            Ok(resolution)
        }
        .boxed()
    }

    fn rewrite(&self, template: &mut ItemTemplate, url_hash: &UrlHash) {
        for list in LAYER_LISTS {
            if let Some(layers) = template.data.get_mut(list).and_then(Value::as_array_mut) {
                templatize_webmap_layer_ids_and_urls(layers, url_hash);
            }
        }
    }

    fn convert_item_to_template<'a>(
        &'a self,
        mut template: ItemTemplate,
        portal: &'a dyn Portal,
    ) -> BoxFuture<'a, Result<ItemTemplate>> {
        async move {
            let viewer_url = format!(
                "{PLACEHOLDER_SERVER_NAME}/home/webmap/viewer.html?webmap={}",
                templatize_term(&template.item_id, &template.item_id, ".itemId")
            );
            if let Value::Object(item) = &mut template.item {
                item.insert("url".to_string(), Value::String(viewer_url));
            }

            let resolution = self.extract(&template, portal).await?;
            resolution.record_on(&mut template);
            self.rewrite(&mut template, &resolution.url_hash);
            Ok(template)
        }
        .boxed()
    }

    fn post_process_field_references(&self, template: &mut ItemTemplate, datasources: &[DatasourceInfo]) {
        // Search layers name operational layers by id.
        let mut by_layer_id: HashMap<String, &DatasourceInfo> = HashMap::new();
        for list in LAYER_LISTS {
            let Some(layers) = template.data.get_mut(list).and_then(Value::as_array_mut) else {
                continue;
            };
            for layer in layers {
                let Some(ds) = datasource_for(layer, datasources) else {
                    continue;
                };
                if let Some(id) = layer.get("id").and_then(Value::as_str) {
                    by_layer_id.insert(id.to_string(), ds);
                }
                templatize_layer_fields(layer, ds);
            }
        }

        let search_layers = template
            .data
            .pointer_mut("/applicationProperties/viewing/search/layers")
            .and_then(Value::as_array_mut);
        for search_layer in search_layers.into_iter().flatten() {
            let ds = search_layer.get("id").and_then(Value::as_str).and_then(|id| by_layer_id.get(id));
            if let Some(ds) = ds.copied() {
                templatize_search_field(search_layer, ds);
            }
        }
    }
}
