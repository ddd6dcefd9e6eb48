//! Core types shared by every stage of a deployment.
//!
//! - [`item`] - item templates, solution payloads and item metadata
//! - [`error`] - the deployment error taxonomy and its failure envelope

pub mod error;
pub mod item;

pub use error::{DeployError, DeployFailure, DeployStage, ErrorContext, user_friendly_error};
pub use item::{
    DeployedSolutionData, ItemKind, ItemMetadata, ItemPayload, ItemTemplate, NormalizedTemplate,
    SolutionData, normalize_template,
};
