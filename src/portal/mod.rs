//! The remote operations the deployer consumes.
//!
//! Everything that touches a portal goes through the [`Portal`] trait: fetching the
//! source Solution, creating the destination folder and items, reprojecting the
//! organization extent, and the two lookups the map extractor needs. The deployer
//! never retries; timeouts and retry policy belong to the implementation.
//!
//! Two implementations ship with the crate:
//! - [`memory::InMemoryPortal`] keeps a whole organization in memory and can load and
//!   save it as a JSON snapshot. Tests and `soldeploy --portal-file` use it.
//! - [`rest::RestPortal`] talks to an ArcGIS Online / Enterprise `sharing/rest` API.
//!
//! Methods return boxed futures so the trait stays object safe and the deployer can
//! work against `&dyn Portal`.

pub mod memory;
pub mod rest;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{ItemMetadata, ItemPayload};

pub use memory::{InMemoryPortal, PortalEvent, PortalOperation, PortalSnapshot};
pub use rest::{Credentials, RestPortal};

/// Boxed result future returned by every [`Portal`] operation.
pub type PortalFuture<'a, T> = BoxFuture<'a, anyhow::Result<T>>;

/// Well-known id of the geographic (WGS84) spatial reference.
pub const WGS84_WKID: u32 = 4326;

/// Spatial reference of an extent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wkid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_wkid: Option<u32>,
}

impl SpatialReference {
    pub const fn wkid(wkid: u32) -> Self {
        Self {
            wkid: Some(wkid),
            latest_wkid: None,
        }
    }

    /// `latestWkid` when present, else `wkid`.
    pub fn effective_wkid(&self) -> Option<u32> {
        self.latest_wkid.or(self.wkid)
    }
}

/// Axis-aligned envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extent {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_reference: Option<SpatialReference>,
}

impl Extent {
    pub fn wkid(&self) -> Option<u32> {
        self.spatial_reference.and_then(|sr| sr.effective_wkid())
    }

    /// `"xmin,ymin,xmax,ymax"`, the form item metadata uses.
    pub fn to_bbox_string(&self) -> String {
        format!("{},{},{},{}", self.xmin, self.ymin, self.xmax, self.ymax)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceUrl {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HelperServices {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<ServiceUrl>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The target organization's self description (`portals/self`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalDescriptor {
    #[serde(default)]
    pub is_portal: bool,
    #[serde(default)]
    pub default_extent: Extent,
    #[serde(default)]
    pub helper_services: HelperServices,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_base_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PortalDescriptor {
    /// `https://<urlKey>.<customBaseUrl>` when the organization has both.
    pub fn organization_base_url(&self) -> Option<String> {
        match (self.url_key.as_deref(), self.custom_base_url.as_deref()) {
            (Some(key), Some(base)) if !key.is_empty() && !base.is_empty() => {
                Some(format!("https://{key}.{base}"))
            }
            _ => None,
        }
    }
}

/// The acting user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Outcome of a folder creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderCreation {
    Created(Folder),
    /// The user already has a folder with this title.
    TitleTaken,
}

/// Identity of a newly created item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Response of a service endpoint (`<serviceUrl>?f=json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    #[serde(default)]
    pub service_item_id: Option<String>,
}

/// Remote operations used by the deployer and the kind processors.
pub trait Portal: Send + Sync {
    /// Base URL of the portal the session is bound to.
    fn portal_url(&self) -> &str;

    fn fetch_item_base<'a>(&'a self, id: &'a str) -> PortalFuture<'a, ItemMetadata>;

    fn fetch_item_data<'a>(&'a self, id: &'a str) -> PortalFuture<'a, Value>;

    fn fetch_portal_descriptor(&self) -> PortalFuture<'_, PortalDescriptor>;

    fn fetch_current_user(&self) -> PortalFuture<'_, User>;

    fn fetch_user_folders(&self) -> PortalFuture<'_, Vec<Folder>>;

    fn create_folder<'a>(&'a self, title: &'a str) -> PortalFuture<'a, FolderCreation>;

    fn reproject_extent<'a>(
        &'a self,
        extent: &'a Extent,
        out_wkid: u32,
        geometry_service_url: &'a str,
    ) -> PortalFuture<'a, Extent>;

    fn create_item<'a>(
        &'a self,
        payload: &'a ItemPayload,
        folder_id: &'a str,
    ) -> PortalFuture<'a, CreatedItem>;

    fn update_item<'a>(
        &'a self,
        id: &'a str,
        payload: &'a ItemPayload,
        folder_id: &'a str,
    ) -> PortalFuture<'a, ()>;

    fn lookup_service_info<'a>(&'a self, url: &'a str) -> PortalFuture<'a, ServiceInfo>;

    /// Whether the acting user administers the item.
    fn check_is_administrator<'a>(&'a self, item_id: &'a str) -> PortalFuture<'a, bool>;
}
