//! Error handling for solution deployment
//!
//! Two layers, the same split the CLI and the engine rely on:
//! - [`DeployError`] enumerates every way a run can fail, carrying the collaborator's
//!   error as its `source` where one exists.
//! - [`DeployFailure`] is the uniform envelope a caller receives: the
//!   [`DeployStage`] that was executing plus the [`DeployError`] raised there.
//!
//! Collaborator calls ([`crate::portal::Portal`]) report plain `anyhow` errors; the
//! orchestrator decides which taxonomy variant they become. For terminal display,
//! [`user_friendly_error`] turns any `anyhow::Error` into an [`ErrorContext`] with a
//! suggestion when one is known.
//!
//! # Examples
//!
//! ```rust,no_run
//! use solution_deployer::core::{DeployError, DeployFailure, DeployStage};
//!
//! let failure = DeployFailure::new(
//!     DeployStage::DeployingItems,
//!     DeployError::MissingSubstitution { path: "abc.itemId".to_string() },
//! );
//! assert_eq!(
//!     failure.to_string(),
//!     "Deployment failed while deploying items: No substitution value for '{{abc.itemId}}'"
//! );
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// States of a deployment run.
///
/// `Failed` is not listed: a failed run is represented by [`DeployFailure`] carrying
/// the stage that was active when the error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeployStage {
    Fetching,
    FolderReady,
    ExtentResolved,
    SolutionItemCreated,
    DeployingItems,
    ResolvingCircularDependencies,
    Finalizing,
    Done,
}

impl fmt::Display for DeployStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fetching => "fetching solution",
            Self::FolderReady => "creating folder",
            Self::ExtentResolved => "resolving extent",
            Self::SolutionItemCreated => "creating solution item",
            Self::DeployingItems => "deploying items",
            Self::ResolvingCircularDependencies => "resolving circular dependencies",
            Self::Finalizing => "finalizing solution",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Everything that can stop a deployment.
#[derive(Error, Debug)]
pub enum DeployError {
    /// One of the five initial fetches failed.
    #[error("Failed to fetch {what}")]
    FetchFailure {
        what: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to create folder '{title}'")]
    FolderCreationFailure {
        title: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to project the organization's default extent to WGS84")]
    ExtentResolutionFailure {
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to create the deployed solution item")]
    SolutionItemCreationFailure {
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to create item '{item_id}'")]
    ItemCreationFailure {
        item_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to patch circular references of item '{item_id}'")]
    CircularResolutionFailure {
        item_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to update the deployed solution item")]
    FinalizationFailure {
        #[source]
        source: anyhow::Error,
    },

    /// A required placeholder names a path the dictionary does not hold.
    #[error("No substitution value for '{{{{{path}}}}}'")]
    MissingSubstitution { path: String },

    /// A dictionary key would be rewritten with a different value within one run.
    #[error("Substitution value for '{path}' is already set to a different value")]
    SubstitutionConflict { path: String },

    #[error("Unknown placeholder transform '{name}'")]
    UnknownTransform { name: String },

    /// The non-circular dependency edges contain a cycle.
    #[error("Circular dependency detected: {cycle}")]
    DependencyCycle { cycle: String },

    #[error("Invalid solution data: {reason}")]
    InvalidSolutionData { reason: String },

    #[error("Deployment was cancelled")]
    Cancelled,
}

impl DeployError {
    /// Wrap an [`anyhow::Error`] raised while creating `item_id`.
    pub fn item_creation(item_id: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::ItemCreationFailure {
            item_id: item_id.into(),
            source: source.into(),
        }
    }

    pub fn circular_resolution(
        item_id: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::CircularResolutionFailure {
            item_id: item_id.into(),
            source: source.into(),
        }
    }
}

/// Failure envelope returned by a deployment run.
#[derive(Error, Debug)]
#[error("Deployment failed while {stage}: {error}")]
pub struct DeployFailure {
    pub stage: DeployStage,
    #[source]
    pub error: DeployError,
}

impl DeployFailure {
    pub const fn new(stage: DeployStage, error: DeployError) -> Self {
        Self { stage, error }
    }

    /// The id of the item whose creation or patching failed, if any.
    pub fn item_id(&self) -> Option<&str> {
        match &self.error {
            DeployError::ItemCreationFailure { item_id, .. }
            | DeployError::CircularResolutionFailure { item_id, .. } => Some(item_id),
            _ => None,
        }
    }
}

/// An error prepared for terminal display.
#[derive(Debug)]
pub struct ErrorContext {
    pub message: String,
    pub causes: Vec<String>,
    pub suggestion: Option<String>,
}

impl ErrorContext {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            causes: Vec::new(),
            suggestion: None,
        }
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    #[must_use]
    pub fn with_causes(mut self, causes: Vec<String>) -> Self {
        self.causes = causes;
        self
    }

    /// Print to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);
        for cause in &self.causes {
            eprintln!("  {}: {}", "caused by".yellow(), cause);
        }
        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for cause in &self.causes {
            write!(f, "\nCaused by: {cause}")?;
        }
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }
        Ok(())
    }
}

/// Convert any error into a displayable [`ErrorContext`].
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let causes: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    let context = ErrorContext::new(error.to_string()).with_causes(causes);

    let deploy_error = error
        .downcast_ref::<DeployFailure>()
        .map(|failure| &failure.error)
        .or_else(|| error.downcast_ref::<DeployError>());

    // Content failures arrive wrapped in the failing item's error.
    let missing_value = error.chain().any(|cause| {
        matches!(cause.downcast_ref::<DeployError>(), Some(DeployError::MissingSubstitution { .. }))
    });
    if missing_value {
        return context.with_suggestion(
            "Seed the value with --param or the [dictionary] table of the config file",
        );
    }

    match deploy_error {
        Some(DeployError::DependencyCycle { .. }) => context.with_suggestion(
            "Mark one edge of the cycle in the template's circularDependencies list",
        ),
        Some(DeployError::FetchFailure { .. }) => context
            .with_suggestion("Check the solution id, the portal URL and that the token is valid"),
        _ => context,
    }
}
