//! The `DeployingItems` and `ResolvingCircularDependencies` stages.
//!
//! Creation runs with bounded concurrency. Only the remote calls are concurrent:
//! the driver loop below owns the substitution dictionary, resolves each item's
//! content before its call starts and records the new id when it returns, so
//! dictionary writes never overlap.

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::run::DeploymentRun;
use crate::core::{DeployError, ItemPayload, ItemTemplate};
use crate::portal::CreatedItem;
use crate::resolver::{CreationSchedule, DependencyGraph};
use crate::templating::{ResolvePolicy, SubstitutionDictionary};

impl DeploymentRun<'_> {
    pub(super) async fn deploy_items(
        &mut self,
        templates: &[ItemTemplate],
        graph: &DependencyGraph,
        folder_id: &str,
    ) -> Result<(), DeployError> {
        let portal = self.portal;
        let by_id: HashMap<&str, &ItemTemplate> =
            templates.iter().map(|t| (t.item_id.as_str(), t)).collect();
        let solution_ids: HashSet<&str> = by_id.keys().copied().collect();
        let max_concurrency = self.options.max_concurrency.max(1);

        let mut schedule = CreationSchedule::new(graph)?;
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < max_concurrency {
                let Some(item_id) = schedule.pop_ready() else {
                    break;
                };
                self.options.cancellation.check()?;
                let Some(&template) = by_id.get(item_id.as_str()) else {
                    continue;
                };

                let policy = ResolvePolicy::lenient()
                    .deferring(template.circular_dependencies.iter().cloned())
                    .requiring(
                        template
                            .hard_dependencies()
                            .filter(|id| solution_ids.contains(id.as_str()))
                            .cloned(),
                    );
                let payload = resolve_payload(&self.dictionary, template, &policy)
                    .map_err(|err| DeployError::item_creation(&template.item_id, err))?;
                debug!("Creating {} ({})", template.item_id, template.kind);

                in_flight.push(async move {
                    let result = portal.create_item(&payload, folder_id).await;
                    (template, payload, result)
                });
            }

            let Some((template, payload, result)) = in_flight.next().await else {
                break;
            };
            let created = result.map_err(|err| DeployError::item_creation(&template.item_id, err))?;
            debug!("Created {} as {}", template.item_id, created.id);

            self.publish_created(template, &created)
                .map_err(|err| DeployError::item_creation(&template.item_id, err))?;

            // Content that names the item itself can only be completed now.
            let own_id = [template.item_id.clone()];
            if !SubstitutionDictionary::unresolved_roots(&payload.item, &own_id).is_empty()
                || !SubstitutionDictionary::unresolved_roots(&payload.data, &own_id).is_empty()
            {
                let policy =
                    ResolvePolicy::lenient().deferring(template.circular_dependencies.iter().cloned());
                let patched = self
                    .resolve_created_payload(&payload, &policy)
                    .map_err(|err| DeployError::item_creation(&template.item_id, err))?;
                portal
                    .update_item(&created.id, &patched, folder_id)
                    .await
                    .map_err(|err| DeployError::item_creation(&template.item_id, err))?;
            }

            self.progress.advance(template.estimated_cost);
            schedule.complete(&template.item_id);
        }

        if !schedule.is_finished() {
            return Err(DeployError::InvalidSolutionData {
                reason: "not every item could be scheduled".to_string(),
            });
        }
        Ok(())
    }

    /// Re-resolve every item with circular partners and write it back.
    ///
    /// Works from the original template content, so tokens deferred at creation time
    /// are still present and now resolve.
    pub(super) async fn resolve_circular_dependencies(
        &mut self,
        templates: &[ItemTemplate],
        folder_id: &str,
    ) -> Result<(), DeployError> {
        for template in templates.iter().filter(|t| t.has_circular_dependencies()) {
            self.options.cancellation.check()?;
            let destination_id = self
                .dictionary
                .item_id(&template.item_id)
                .map(str::to_string)
                .ok_or_else(|| {
                    DeployError::circular_resolution(
                        &template.item_id,
                        anyhow::anyhow!("item was never created"),
                    )
                })?;

            let policy =
                ResolvePolicy::lenient().requiring(template.circular_dependencies.iter().cloned());
            let payload = resolve_payload(&self.dictionary, template, &policy)
                .map_err(|err| DeployError::circular_resolution(&template.item_id, err))?;
            debug!("Patching circular references of {}", template.item_id);
            self.portal
                .update_item(&destination_id, &payload, folder_id)
                .await
                .map_err(|err| DeployError::circular_resolution(&template.item_id, err))?;
        }
        Ok(())
    }

    /// Record the new id and the kind's published entries.
    fn publish_created(
        &mut self,
        template: &ItemTemplate,
        created: &CreatedItem,
    ) -> Result<(), DeployError> {
        self.dictionary.record_item_id(&template.item_id, &created.id)?;
        let processor = self.registry.for_kind(&template.kind);
        for (path, value) in processor.created_entries(template, created) {
            self.dictionary.set(&path, value)?;
        }
        Ok(())
    }

    fn resolve_created_payload(
        &self,
        payload: &ItemPayload,
        policy: &ResolvePolicy,
    ) -> Result<ItemPayload, DeployError> {
        Ok(ItemPayload {
            item: self.dictionary.resolve(&payload.item, policy)?,
            data: self.dictionary.resolve(&payload.data, policy)?,
        })
    }
}

fn resolve_payload(
    dictionary: &SubstitutionDictionary,
    template: &ItemTemplate,
    policy: &ResolvePolicy,
) -> Result<ItemPayload, DeployError> {
    let mut item = dictionary.resolve(&template.item, policy)?;
    if item.is_null() {
        item = Value::Object(serde_json::Map::new());
    }
    // The portal needs the kind to create the item.
    if let Value::Object(map) = &mut item {
        map.entry("type").or_insert_with(|| Value::String(template.kind.to_string()));
    }
    Ok(ItemPayload {
        item,
        data: dictionary.resolve(&template.data, policy)?,
    })
}
