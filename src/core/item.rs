//! Item templates and the solution payloads that carry them.
//!
//! A Solution is stored on the source portal as an item of type `"Solution"` whose
//! data payload is a [`SolutionData`]: a list of [`ItemTemplate`]s plus optional
//! deployment parameters. Each template describes one deployable item and the ids of
//! the other templates it must wait on.
//!
//! Template content (`item`, `data`, `properties`) is opaque to the engine. It is kept
//! as JSON and only touched by placeholder resolution and by the kind-specific
//! processors in [`crate::processors`].
//!
//! # JSON Shape
//!
//! ```json
//! {
//!   "itemId": "map1234",
//!   "type": "Web Map",
//!   "dependencies": ["svc5678"],
//!   "circularDependencies": [],
//!   "estimatedDeploymentCostFactor": 2,
//!   "item": { "title": "Roads", "url": "{{portalBaseUrl}}/home/webmap/viewer.html?webmap={{map1234.itemId}}" },
//!   "data": { "operationalLayers": [] }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Discriminator selecting which processor handles a template.
///
/// Known kinds get their own variant; anything else round-trips through
/// [`ItemKind::Other`] unchanged so that solutions containing kinds this crate has no
/// processor for still deploy with the generic behavior.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemKind {
    /// `"Web Map"`: operational layers and tables reference feature services by URL.
    WebMap,
    /// `"Feature Service"`: publishes per-layer URLs other items point at.
    FeatureService,
    /// `"Web Mapping Application"`
    WebMappingApplication,
    /// `"Solution"`: the container item itself.
    Solution,
    /// Any other portal item type, kept verbatim.
    Other(String),
}

impl ItemKind {
    /// The portal's type string for this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::WebMap => "Web Map",
            Self::FeatureService => "Feature Service",
            Self::WebMappingApplication => "Web Mapping Application",
            Self::Solution => "Solution",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for ItemKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Web Map" => Self::WebMap,
            "Feature Service" => Self::FeatureService,
            "Web Mapping Application" => Self::WebMappingApplication,
            "Solution" => Self::Solution,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for ItemKind {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<ItemKind> for String {
    fn from(value: ItemKind) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_cost() -> f64 {
    1.0
}

/// One deployable unit of a Solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemTemplate {
    /// Source-side id; the key used for this item until a destination id exists.
    pub item_id: String,

    /// Kind discriminator (`"type"` on the wire).
    #[serde(rename = "type")]
    pub kind: ItemKind,

    /// Ids this item must wait on, in declaration order.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Subset of `dependencies` that form cycles with this item. These are patched
    /// after every item exists instead of being waited on.
    #[serde(default)]
    pub circular_dependencies: Vec<String>,

    /// Relative creation weight used to apportion progress.
    #[serde(rename = "estimatedDeploymentCostFactor", default = "default_cost")]
    pub estimated_cost: f64,

    /// Item metadata (title, tags, url, ...). May contain placeholders.
    #[serde(default)]
    pub item: Value,

    /// Structured item body. May contain placeholders.
    #[serde(default)]
    pub data: Value,

    /// Kind-specific extra content (service definitions, layer lists, ...).
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub properties: Value,

    /// Fields this crate doesn't interpret; preserved on round trip.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ItemTemplate {
    /// Create a template with empty content and a cost of 1.
    pub fn new(item_id: impl Into<String>, kind: impl Into<ItemKind>) -> Self {
        Self {
            item_id: item_id.into(),
            kind: kind.into(),
            dependencies: Vec::new(),
            circular_dependencies: Vec::new(),
            estimated_cost: default_cost(),
            item: Value::Object(Map::new()),
            data: Value::Null,
            properties: Value::Null,
            extra: Map::new(),
        }
    }

    /// Dependencies that must complete before this item starts, i.e. every
    /// dependency not marked circular.
    pub fn hard_dependencies(&self) -> impl Iterator<Item = &String> {
        self.dependencies.iter().filter(|id| !self.circular_dependencies.contains(id))
    }

    /// Whether this item takes part in the circular-dependency pass.
    pub fn has_circular_dependencies(&self) -> bool {
        !self.circular_dependencies.is_empty()
    }

    /// The item's title, falling back to its source id.
    pub fn title(&self) -> &str {
        self.item.get("title").and_then(Value::as_str).unwrap_or(&self.item_id)
    }

    /// Copy retaining only identity and dependency metadata.
    ///
    /// This is what a deployed Solution stores as its manifest: enough to know what
    /// was deployed and how the pieces relate, none of the item content.
    pub fn normalized(&self) -> NormalizedTemplate {
        NormalizedTemplate {
            item_id: self.item_id.clone(),
            kind: self.kind.clone(),
            dependencies: self.dependencies.clone(),
            circular_dependencies: self.circular_dependencies.clone(),
        }
    }
}

/// Minimal dependency manifest entry persisted in a deployed Solution's data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedTemplate {
    pub item_id: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub circular_dependencies: Vec<String>,
}

/// Strip a template down to `{itemId, type, dependencies, circularDependencies}`.
pub fn normalize_template(template: &ItemTemplate) -> NormalizedTemplate {
    template.normalized()
}

/// Data payload of a source Solution item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolutionData {
    #[serde(default)]
    pub templates: Vec<ItemTemplate>,

    /// Deployment parameters exposed to placeholders as `params.*`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Data payload written to a deployed Solution item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployedSolutionData {
    pub templates: Vec<NormalizedTemplate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Portal item metadata ("item base").
///
/// Only the fields the deployer reads or rewrites are typed; everything else rides
/// along in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ItemKind>,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub type_keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tryit_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Properties the portal assigns itself and refuses on item creation.
pub const NON_CREATABLE_PROPERTIES: &[&str] = &[
    "avgRating",
    "created",
    "id",
    "itemControl",
    "modified",
    "numComments",
    "numRatings",
    "numViews",
    "orgId",
    "owner",
    "ownerFolder",
    "protected",
    "scoreCompleteness",
    "size",
    "uploaded",
];

impl ItemMetadata {
    /// Remove the portal-managed properties listed in [`NON_CREATABLE_PROPERTIES`].
    pub fn strip_non_creatable(&mut self) {
        self.id = None;
        self.extra.retain(|key, _| !NON_CREATABLE_PROPERTIES.contains(&key.as_str()));
    }
}

/// Metadata plus body sent to the portal when creating or updating an item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemPayload {
    pub item: Value,
    #[serde(default)]
    pub data: Value,
}

impl ItemPayload {
    pub fn title(&self) -> &str {
        self.item.get("title").and_then(Value::as_str).unwrap_or_default()
    }
}
