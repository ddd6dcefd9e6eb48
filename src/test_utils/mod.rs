//! Test utilities for the deployer.
//!
//! Fixtures build an [`InMemoryPortal`] holding a source Solution, so unit tests,
//! integration tests and the CLI tests all deploy against the same organization
//! shape.
//!
//! # Example
//!
//! ```rust,no_run
//! use solution_deployer::test_utils::{SolutionFixture, template};
//!
//! # async fn example() {
//! let portal = SolutionFixture::new("sol", "Water")
//!     .with_template(template("a", "Feature Service", &[]))
//!     .build();
//! let deployed = solution_deployer::deployer::deploy_solution(&portal, "sol", Default::default())
//!     .await
//!     .unwrap();
//! # }
//! ```

use serde_json::{Value, json};
use std::sync::{Arc, Mutex, Once};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::core::{ItemTemplate, SolutionData};
use crate::deployer::ProgressCallback;
use crate::portal::memory::StoredItem;
use crate::portal::{
    Extent, Folder, HelperServices, InMemoryPortal, PortalDescriptor, PortalSnapshot, ServiceUrl,
    SpatialReference, User,
};

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Portal URL of every fixture organization.
pub const FIXTURE_PORTAL_URL: &str = "https://portal.example.com/sharing";
/// Username of the fixture's acting user.
pub const FIXTURE_USERNAME: &str = "deployer";

/// Initialize logging for tests.
///
/// Only the first call has an effect. `RUST_LOG` is used when `level` is `None`;
/// with neither, tests run without a subscriber.
///
/// ```bash
/// RUST_LOG=solution_deployer=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}

/// A template titled after its id, with the given hard dependencies.
pub fn template(item_id: &str, kind: &str, dependencies: &[&str]) -> ItemTemplate {
    let mut template = ItemTemplate::new(item_id, kind);
    template.dependencies = dependencies.iter().map(|id| (*id).to_string()).collect();
    template.item = json!({ "title": item_id });
    template
}

/// Organization descriptor whose default extent is in Web Mercator.
pub fn mercator_descriptor() -> PortalDescriptor {
    PortalDescriptor {
        is_portal: false,
        default_extent: Extent {
            xmin: -20_037_508.342_789_244,
            ymin: 0.0,
            xmax: 0.0,
            ymax: 20_037_508.342_789_244,
            spatial_reference: Some(SpatialReference::wkid(102100)),
        },
        helper_services: HelperServices {
            geometry: Some(ServiceUrl {
                url: "https://utility.example.com/Geometry/GeometryServer".to_string(),
            }),
            ..HelperServices::default()
        },
        url_key: Some("fixture".to_string()),
        custom_base_url: Some("maps.example.com".to_string()),
        ..PortalDescriptor::default()
    }
}

/// Builder for an organization holding one source Solution.
#[derive(Debug, Clone)]
pub struct SolutionFixture {
    solution_id: String,
    title: String,
    solution: SolutionData,
    descriptor: PortalDescriptor,
    folders: Vec<Folder>,
}

impl SolutionFixture {
    pub fn new(solution_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            solution_id: solution_id.into(),
            title: title.into(),
            solution: SolutionData::default(),
            descriptor: mercator_descriptor(),
            folders: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_template(mut self, template: ItemTemplate) -> Self {
        self.solution.templates.push(template);
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: Value) -> Self {
        self.solution.params = Some(params);
        self
    }

    #[must_use]
    pub fn with_descriptor(mut self, descriptor: PortalDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    /// Add an existing folder owned by the fixture user.
    #[must_use]
    pub fn with_folder(mut self, title: impl Into<String>) -> Self {
        let title = title.into();
        self.folders.push(Folder {
            id: format!("folder-{}", self.folders.len()),
            title,
            username: Some(FIXTURE_USERNAME.to_string()),
        });
        self
    }

    pub fn solution_data(&self) -> Value {
        serde_json::to_value(&self.solution).unwrap_or(Value::Null)
    }

    pub fn snapshot(&self) -> PortalSnapshot {
        let mut snapshot = PortalSnapshot {
            portal_url: FIXTURE_PORTAL_URL.to_string(),
            descriptor: self.descriptor.clone(),
            user: User {
                username: FIXTURE_USERNAME.to_string(),
                ..User::default()
            },
            folders: self.folders.clone(),
            ..PortalSnapshot::default()
        };
        snapshot.items.insert(
            self.solution_id.clone(),
            StoredItem {
                item: json!({
                    "id": self.solution_id,
                    "type": "Solution",
                    "title": self.title,
                    "owner": "author",
                    "tags": ["source"],
                    "typeKeywords": ["Solution", "Template"],
                    "thumbnailUrl": format!(
                        "https://source.example.com/sharing/rest/content/items/{}/info/thumb.png",
                        self.solution_id
                    ),
                    "url": format!("https://source.example.com/home/item.html?id={}", self.solution_id),
                    "created": 1_600_000_000_000_i64,
                    "numViews": 12
                }),
                data: self.solution_data(),
                folder_id: None,
            },
        );
        snapshot
    }

    pub fn build(&self) -> InMemoryPortal {
        InMemoryPortal::new(self.snapshot())
    }
}

/// A progress callback that records every value it receives.
pub fn recording_progress() -> (ProgressCallback, Arc<Mutex<Vec<f64>>>) {
    let values = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&values);
    let callback: ProgressCallback = Arc::new(move |percent| {
        if let Ok(mut values) = sink.lock() {
            values.push(percent);
        }
    });
    (callback, values)
}
