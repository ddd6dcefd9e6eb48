//! Kind-specific template processing.
//!
//! Each item kind knows how to find the other items its content references and how
//! to turn those references into placeholders. The orchestrator never inspects item
//! content itself; it goes through an [`ItemProcessor`] picked from a
//! [`ProcessorRegistry`] by the template's [`ItemKind`].
//!
//! The contract has two steps, run when an item is converted into a template:
//! 1. [`ItemProcessor::extract`] returns a [`DependencyResolution`]: the owning item
//!    ids referenced by the content plus a table from each referenced URL to its
//!    owner and whether the acting user may templatize it.
//! 2. [`ItemProcessor::rewrite`] replaces each templatizable reference with
//!    placeholders. References the user does not administer stay literal.
//!
//! Once every item of a Solution is a template,
//! [`ItemProcessor::post_process_field_references`] lets a kind templatize the field
//! names it borrows from feature services in the same Solution (see [`fields`]).
//!
//! After deployment creates an item, [`ItemProcessor::created_entries`] lists the
//! extra dictionary values the new item publishes (for example per-layer URLs).

pub mod feature_service;
pub mod fields;
pub mod webmap;

use anyhow::Result;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::core::{ItemKind, ItemTemplate};
use crate::portal::{CreatedItem, Portal};

pub use feature_service::FeatureServiceProcessor;
pub use fields::{DatasourceInfo, datasource_infos};
pub use webmap::WebMapProcessor;

/// Owner of a referenced URL and whether it may be rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlEntry {
    pub id: String,
    pub can_templatize: bool,
}

/// Source URL -> owning item.
pub type UrlHash = BTreeMap<String, UrlEntry>;

/// Output of [`ItemProcessor::extract`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyResolution {
    /// Owning item ids in first-seen order, each listed once.
    pub dependencies: Vec<String>,
    pub url_hash: UrlHash,
}

impl DependencyResolution {
    /// Add `id` unless it is already listed.
    pub fn push_dependency(&mut self, id: &str) {
        if !self.dependencies.iter().any(|existing| existing == id) {
            self.dependencies.push(id.to_string());
        }
    }

    /// Append the found dependencies to `template`, skipping ids it already lists
    /// and the template's own id.
    pub fn record_on(&self, template: &mut ItemTemplate) {
        for id in &self.dependencies {
            if !template.dependencies.contains(id) && *id != template.item_id {
                template.dependencies.push(id.clone());
            }
        }
    }
}

/// Per-kind extraction and rewriting rules.
pub trait ItemProcessor: Send + Sync {
    /// Whether this processor handles `kind`.
    fn handles(&self, kind: &ItemKind) -> bool;

    /// Find the items `template` references.
    fn extract<'a>(
        &'a self,
        template: &'a ItemTemplate,
        portal: &'a dyn Portal,
    ) -> BoxFuture<'a, Result<DependencyResolution>>;

    /// Replace templatizable references in `template` with placeholders.
    fn rewrite(&self, template: &mut ItemTemplate, url_hash: &UrlHash);

    /// Dictionary entries published once the item exists on the destination.
    fn created_entries(&self, _template: &ItemTemplate, _created: &CreatedItem) -> Vec<(String, Value)> {
        Vec::new()
    }

    /// Extract, record the dependencies on the template, then rewrite.
    fn convert_item_to_template<'a>(
        &'a self,
        mut template: ItemTemplate,
        portal: &'a dyn Portal,
    ) -> BoxFuture<'a, Result<ItemTemplate>> {
        async move {
            let resolution = self.extract(&template, portal).await?;
            resolution.record_on(&mut template);
            self.rewrite(&mut template, &resolution.url_hash);
            Ok(template)
        }
        .boxed()
    }

    /// Templatize field names `template` borrows from the given datasources.
    fn post_process_field_references(
        &self,
        _template: &mut ItemTemplate,
        _datasources: &[DatasourceInfo],
    ) {
    }
}

/// Fallback for kinds without content rules: dependencies are taken as declared.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericProcessor;

impl ItemProcessor for GenericProcessor {
    fn handles(&self, _kind: &ItemKind) -> bool {
        true
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
}

/// Processors by kind, falling back to [`GenericProcessor`].
pub struct ProcessorRegistry {
    processors: Vec<Box<dyn ItemProcessor>>,
    fallback: GenericProcessor,
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self {
            processors: vec![Box::new(WebMapProcessor), Box::new(FeatureServiceProcessor)],
            fallback: GenericProcessor,
        }
    }
}

impl ProcessorRegistry {
    /// Registry with no kind-specific processors.
    pub fn empty() -> Self {
        Self {
            processors: Vec::new(),
            fallback: GenericProcessor,
        }
    }

    /// Register a processor; later registrations take precedence.
    pub fn register(&mut self, processor: Box<dyn ItemProcessor>) {
        self.processors.insert(0, processor);
    }

    pub fn for_kind(&self, kind: &ItemKind) -> &dyn ItemProcessor {
        self.processors
            .iter()
            .find(|processor| processor.handles(kind))
            .map_or(&self.fallback as &dyn ItemProcessor, |processor| processor.as_ref())
    }

    /// Templatize field references across a Solution's templates, using the field
    /// lists of the feature services among them.
    pub fn post_process_field_references(&self, templates: &mut [ItemTemplate]) {
        let datasources = datasource_infos(templates);
        if datasources.is_empty() {
            return;
        }
        for template in templates.iter_mut() {
            self.for_kind(&template.kind).post_process_field_references(template, &datasources);
        }
    }
}
