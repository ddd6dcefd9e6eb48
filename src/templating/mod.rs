//! Placeholder substitution for item templates.
//!
//! Templates reference values that only exist on the destination (new item ids,
//! service URLs, the deploying user's folder) through `{{path}}` tokens. During a
//! run the orchestrator fills a [`SubstitutionDictionary`] with those values and
//! resolves each template's content against it.
//!
//! # Placeholder Syntax
//!
//! | Token | Meaning |
//! | --- | --- |
//! | `{{abc.itemId}}` | value at dotted path `abc.itemId` |
//! | `{{user.username:upperCase}}` | value passed through a [`Transform`] |
//! | `{{params.basemap\|\|streets}}` | value, or `streets` when the path is missing |
//!
//! # Examples
//!
//! ```rust
//! use serde_json::json;
//! use solution_deployer::templating::{ResolvePolicy, SubstitutionDictionary};
//!
//! let mut dict = SubstitutionDictionary::new();
//! dict.record_item_id("6f2a", "b91c")?;
//!
//! let resolved = dict.resolve(&json!({"webmap": "{{6f2a.itemId}}"}), &ResolvePolicy::strict())?;
//! assert_eq!(resolved, json!({"webmap": "b91c"}));
//! # Ok::<(), solution_deployer::core::DeployError>(())
//! ```

pub mod dictionary;
pub mod placeholder;
pub mod transforms;

pub use dictionary::{ResolvePolicy, SubstitutionDictionary};
pub use placeholder::{PLACEHOLDER_SERVER_NAME, contains_placeholder, templatize_term};
pub use transforms::Transform;
