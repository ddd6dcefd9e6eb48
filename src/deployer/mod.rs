//! Solution deployment orchestration.
//!
//! [`Deployer::deploy_solution`] drives one run through a fixed sequence of stages:
//!
//! | Stage | Work |
//! | --- | --- |
//! | `Fetching` | fetch the Solution item, its data, the portal, the user and their folders concurrently |
//! | `FolderReady` | create the destination folder (`"<title>"`, `"<title> 1"`, ...) |
//! | `ExtentResolved` | reproject the organization's default extent to WGS84 |
//! | `SolutionItemCreated` | create the empty Solution item and point its URLs at the new id |
//! | `DeployingItems` | create every contained item once its hard dependencies exist |
//! | `ResolvingCircularDependencies` | patch items whose circular partners now exist |
//! | `Finalizing` | store the id-mapped manifest, tag the Solution `Deployed` |
//!
//! Any failure ends the run with a [`DeployFailure`] naming the stage. Nothing is
//! retried or rolled back.
//!
//! # Example
//!
//! ```rust,no_run
//! use solution_deployer::deployer::{DeployOptions, Deployer};
//! use solution_deployer::portal::{Credentials, RestPortal};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let credentials = Credentials::new("https://www.arcgis.com", Some("token".into()))?;
//! let portal = RestPortal::new(credentials)?;
//!
//! let deployed = Deployer::new(&portal)
//!     .deploy_solution("6f2a0c1e", DeployOptions::default())
//!     .await?;
//! println!("Deployed as {}", deployed.item.id.unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod cancellation;
pub mod folder;
mod items;
pub mod progress;
mod run;

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{error, info};

use crate::core::{DeployFailure, DeployedSolutionData, ItemMetadata};
use crate::portal::Portal;
use crate::processors::ProcessorRegistry;

pub use cancellation::CancellationToken;
pub use folder::{create_unique_folder, unique_folder_name};
pub use progress::{ProgressCallback, ProgressTracker, estimate_deployment_cost};

use run::DeploymentRun;

/// Concurrent item creations when the caller does not choose.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Caller choices for one deployment.
///
/// `title`, `snippet`, `description` and `tags` default to the source Solution
/// item's values.
#[derive(Clone)]
pub struct DeployOptions {
    pub progress_callback: Option<ProgressCallback>,
    /// Values seeded into the substitution dictionary before anything is fetched.
    pub template_dictionary: Map<String, Value>,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    /// Upper bound on item creations in flight; values below 1 mean 1.
    pub max_concurrency: usize,
    pub cancellation: CancellationToken,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            progress_callback: None,
            template_dictionary: Map::new(),
            title: None,
            snippet: None,
            description: None,
            tags: None,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            cancellation: CancellationToken::new(),
        }
    }
}

impl fmt::Debug for DeployOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployOptions")
            .field("has_progress_callback", &self.progress_callback.is_some())
            .field("template_dictionary", &self.template_dictionary)
            .field("title", &self.title)
            .field("snippet", &self.snippet)
            .field("description", &self.description)
            .field("tags", &self.tags)
            .field("max_concurrency", &self.max_concurrency)
            .field("cancellation", &self.cancellation)
            .finish()
    }
}

impl DeployOptions {
    #[must_use]
    pub fn with_progress_callback(mut self, callback: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.progress_callback = Some(std::sync::Arc::new(callback));
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }
}

/// A completed deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployedSolution {
    /// The deployed Solution item as last written.
    pub item: ItemMetadata,
    /// The manifest stored as the Solution item's data.
    pub data: DeployedSolutionData,
    /// Source item id -> destination item id.
    pub id_map: BTreeMap<String, String>,
}

/// Deploys Solutions through one portal session.
pub struct Deployer<'p> {
    portal: &'p dyn Portal,
    registry: ProcessorRegistry,
}

impl<'p> Deployer<'p> {
    pub fn new(portal: &'p dyn Portal) -> Self {
        Self::with_registry(portal, ProcessorRegistry::default())
    }

    pub fn with_registry(portal: &'p dyn Portal, registry: ProcessorRegistry) -> Self {
        Self {
            portal,
            registry,
        }
    }

    /// Deploy the Solution `solution_id` into the portal's organization.
    ///
    /// # Errors
    ///
    /// A [`DeployFailure`] carrying the stage that was executing and the error raised
    /// there. Progress already reported is not rolled back.
    pub async fn deploy_solution(
        &self,
        solution_id: &str,
        options: DeployOptions,
    ) -> Result<DeployedSolution, DeployFailure> {
        info!("Deploying solution {}", solution_id);
        let mut run = DeploymentRun::new(self.portal, &self.registry, options);
        match run.execute(solution_id).await {
            Ok(deployed) => {
                info!(
                    "Deployed solution {} as {} ({} items)",
                    solution_id,
                    deployed.item.id.as_deref().unwrap_or_default(),
                    deployed.id_map.len()
                );
                Ok(deployed)
            }
            Err(err) => {
                let failure = DeployFailure::new(run.stage(), err);
                error!("{}", failure);
                Err(failure)
            }
        }
    }
}

/// Deploy with the default processors.
pub async fn deploy_solution(
    portal: &dyn Portal,
    solution_id: &str,
    options: DeployOptions,
) -> Result<DeployedSolution, DeployFailure> {
    Deployer::new(portal).deploy_solution(solution_id, options).await
}

/// Replace every occurrence of `old` in `text` with `new`.
///
/// Absent and empty inputs come back unchanged, as does text without `old`.
pub fn checked_replace_all(text: Option<&str>, old: &str, new: &str) -> Option<String> {
    text.map(|text| {
        if !old.is_empty() && text.contains(old) {
            text.replace(old, new)
        } else {
            text.to_string()
        }
    })
}
