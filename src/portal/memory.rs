//! An organization held entirely in memory.
//!
//! The state is a serializable [`PortalSnapshot`], so a whole source + destination
//! organization can live in one JSON file: `soldeploy --portal-file org.json` loads
//! it, deploys into it and writes it back. Tests use the same type and inspect the
//! [`PortalEvent`] log to check ordering and call counts, and can make individual
//! operations fail with [`InMemoryPortal::fail_operation`].

use anyhow::{Context, Result, anyhow, bail};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{
    CreatedItem, Extent, Folder, FolderCreation, Portal, PortalDescriptor, PortalFuture,
    ServiceInfo, SpatialReference, User, WGS84_WKID,
};
use crate::core::{ItemMetadata, ItemPayload};

/// Mean Earth radius used by the Web Mercator projection.
const EARTH_RADIUS: f64 = 6_378_137.0;

/// An item as stored by the in-memory portal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredItem {
    pub item: Value,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
}

/// Complete state of an in-memory organization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalSnapshot {
    pub portal_url: String,
    #[serde(default)]
    pub descriptor: PortalDescriptor,
    #[serde(default)]
    pub user: User,
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub items: BTreeMap<String, StoredItem>,
    /// Service URL -> id of the item owning the service.
    #[serde(default)]
    pub services: BTreeMap<String, String>,
    /// Ids of items the user administers.
    #[serde(default)]
    pub administered: BTreeSet<String>,
}

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortalOperation {
    FetchItemBase,
    FetchItemData,
    FetchPortalDescriptor,
    FetchCurrentUser,
    FetchUserFolders,
    CreateFolder,
    ReprojectExtent,
    CreateItem,
    UpdateItem,
    LookupServiceInfo,
    CheckIsAdministrator,
}

/// Observable calls, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalEvent {
    FolderCreated { title: String },
    CreateItemStarted { title: String },
    ItemCreated { id: String, title: String },
    ItemUpdated { id: String },
    ServiceLookedUp { url: String },
    AdministratorChecked { item_id: String },
}

/// [`Portal`] implementation backed by a [`PortalSnapshot`].
#[derive(Debug, Default)]
pub struct InMemoryPortal {
    portal_url: String,
    state: Mutex<PortalSnapshot>,
    events: Mutex<Vec<PortalEvent>>,
    failing: Mutex<HashSet<PortalOperation>>,
    failing_titles: Mutex<HashSet<String>>,
    /// Payloads as received by `create_item`, by new id.
    creations: Mutex<HashMap<String, ItemPayload>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryPortal {
    pub fn new(snapshot: PortalSnapshot) -> Self {
        Self {
            portal_url: snapshot.portal_url.clone(),
            state: Mutex::new(snapshot),
            ..Self::default()
        }
    }

    /// Load a snapshot from a JSON file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read portal snapshot {}", path.display()))?;
        let snapshot: PortalSnapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse portal snapshot {}", path.display()))?;
        Ok(Self::new(snapshot))
    }

    /// Write the current state to a JSON file.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.snapshot())
            .context("Failed to serialize portal snapshot")?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write portal snapshot {}", path.display()))
    }

    pub fn snapshot(&self) -> PortalSnapshot {
        lock(&self.state).clone()
    }

    /// Store an item under a fixed id, replacing any previous one.
    pub fn insert_item(&self, id: impl Into<String>, item: Value, data: Value) {
        lock(&self.state).items.insert(
            id.into(),
            StoredItem {
                item,
                data,
                folder_id: None,
            },
        );
    }

    pub fn item(&self, id: &str) -> Option<StoredItem> {
        lock(&self.state).items.get(id).cloned()
    }

    /// The payload item `id` was created with, before any later update.
    pub fn created_payload(&self, id: &str) -> Option<ItemPayload> {
        lock(&self.creations).get(id).cloned()
    }

    /// Make every future call of `operation` fail.
    pub fn fail_operation(&self, operation: PortalOperation) {
        lock(&self.failing).insert(operation);
    }

    /// Make creation of items with this title fail.
    pub fn fail_item_titled(&self, title: impl Into<String>) {
        lock(&self.failing_titles).insert(title.into());
    }

    pub fn events(&self) -> Vec<PortalEvent> {
        lock(&self.events).clone()
    }

    /// Number of administrator checks issued for `item_id`.
    pub fn administrator_checks(&self, item_id: &str) -> usize {
        lock(&self.events)
            .iter()
            .filter(|event| {
                matches!(event, PortalEvent::AdministratorChecked { item_id: id } if id == item_id)
            })
            .count()
    }

    fn record(&self, event: PortalEvent) {
        lock(&self.events).push(event);
    }

    fn check(&self, operation: PortalOperation) -> Result<()> {
        if lock(&self.failing).contains(&operation) {
            bail!("{operation:?} failed");
        }
        Ok(())
    }

    fn create_item_now(&self, payload: &ItemPayload, folder_id: &str) -> Result<CreatedItem> {
        self.check(PortalOperation::CreateItem)?;
        let title = payload.title().to_string();
        if lock(&self.failing_titles).contains(&title) {
            bail!("Unable to create item '{title}'");
        }

        let id = uuid::Uuid::new_v4().simple().to_string();
        let mut state = lock(&self.state);
        let mut item = match &payload.item {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        item.insert("id".into(), Value::String(id.clone()));
        item.insert("owner".into(), Value::String(state.user.username.clone()));

        if item.get("type").and_then(Value::as_str) == Some("Feature Service") {
            let service_url = format!("{}/rest/services/{id}/FeatureServer", state.portal_url);
            item.insert("url".into(), Value::String(service_url.clone()));
            state.services.insert(service_url, id.clone());
            state.administered.insert(id.clone());
        }
        let url = item.get("url").and_then(Value::as_str).map(str::to_string);

        state.items.insert(
            id.clone(),
            StoredItem {
                item: Value::Object(item),
                data: payload.data.clone(),
                folder_id: (!folder_id.is_empty()).then(|| folder_id.to_string()),
            },
        );
        drop(state);
        lock(&self.creations).insert(id.clone(), payload.clone());

        self.record(PortalEvent::ItemCreated {
            id: id.clone(),
            title,
        });
        Ok(CreatedItem {
            id,
            url,
        })
    }
}

/// Inverse spherical Web Mercator for one point.
fn mercator_to_geographic(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    (lon, lat)
}

fn project(extent: &Extent, out_wkid: u32) -> Result<Extent> {
    let in_wkid = extent.wkid().unwrap_or(WGS84_WKID);
    if in_wkid == out_wkid {
        return Ok(*extent);
    }
    match (in_wkid, out_wkid) {
        (102100 | 102113 | 3857, WGS84_WKID) => {
            let (xmin, ymin) = mercator_to_geographic(extent.xmin, extent.ymin);
            let (xmax, ymax) = mercator_to_geographic(extent.xmax, extent.ymax);
            Ok(Extent {
                xmin,
                ymin,
                xmax,
                ymax,
                spatial_reference: Some(SpatialReference::wkid(out_wkid)),
            })
        }
        _ => Err(anyhow!("Projection from wkid {in_wkid} to {out_wkid} is not supported")),
    }
}

impl Portal for InMemoryPortal {
    fn portal_url(&self) -> &str {
        &self.portal_url
    }

    fn fetch_item_base<'a>(&'a self, id: &'a str) -> PortalFuture<'a, ItemMetadata> {
        async move {
            self.check(PortalOperation::FetchItemBase)?;
            let stored = self.item(id).ok_or_else(|| anyhow!("Item '{id}' does not exist"))?;
            serde_json::from_value(stored.item)
                .with_context(|| format!("Item '{id}' has invalid metadata"))
        }
        .boxed()
    }

    fn fetch_item_data<'a>(&'a self, id: &'a str) -> PortalFuture<'a, Value> {
        async move {
            self.check(PortalOperation::FetchItemData)?;
            let stored = self.item(id).ok_or_else(|| anyhow!("Item '{id}' does not exist"))?;
            Ok(stored.data)
        }
        .boxed()
    }

    fn fetch_portal_descriptor(&self) -> PortalFuture<'_, PortalDescriptor> {
        async move {
            self.check(PortalOperation::FetchPortalDescriptor)?;
            Ok(lock(&self.state).descriptor.clone())
        }
        .boxed()
    }

    fn fetch_current_user(&self) -> PortalFuture<'_, User> {
        async move {
            self.check(PortalOperation::FetchCurrentUser)?;
            Ok(lock(&self.state).user.clone())
        }
        .boxed()
    }

    fn fetch_user_folders(&self) -> PortalFuture<'_, Vec<Folder>> {
        async move {
            self.check(PortalOperation::FetchUserFolders)?;
            Ok(lock(&self.state).folders.clone())
        }
        .boxed()
    }

    fn create_folder<'a>(&'a self, title: &'a str) -> PortalFuture<'a, FolderCreation> {
        async move {
            self.check(PortalOperation::CreateFolder)?;
            let mut state = lock(&self.state);
            if state.folders.iter().any(|folder| folder.title == title) {
                return Ok(FolderCreation::TitleTaken);
            }
            let folder = Folder {
                id: uuid::Uuid::new_v4().simple().to_string(),
                title: title.to_string(),
                username: Some(state.user.username.clone()),
            };
            state.folders.push(folder.clone());
            drop(state);
            self.record(PortalEvent::FolderCreated {
                title: title.to_string(),
            });
            Ok(FolderCreation::Created(folder))
        }
        .boxed()
    }

    fn reproject_extent<'a>(
        &'a self,
        extent: &'a Extent,
        out_wkid: u32,
        _geometry_service_url: &'a str,
    ) -> PortalFuture<'a, Extent> {
        async move {
            self.check(PortalOperation::ReprojectExtent)?;
            project(extent, out_wkid)
        }
        .boxed()
    }

    fn create_item<'a>(
        &'a self,
        payload: &'a ItemPayload,
        folder_id: &'a str,
    ) -> PortalFuture<'a, CreatedItem> {
        async move {
            self.record(PortalEvent::CreateItemStarted {
                title: payload.title().to_string(),
            });
            // Let other in-flight creations interleave, as a remote call would.
            tokio::task::yield_now().await;
            self.create_item_now(payload, folder_id)
        }
        .boxed()
    }

    fn update_item<'a>(
        &'a self,
        id: &'a str,
        payload: &'a ItemPayload,
        folder_id: &'a str,
    ) -> PortalFuture<'a, ()> {
        async move {
            self.check(PortalOperation::UpdateItem)?;
            let mut state = lock(&self.state);
            let stored =
                state.items.get_mut(id).ok_or_else(|| anyhow!("Item '{id}' does not exist"))?;
            // Updates merge into the stored metadata; properties not sent are kept.
            if !stored.item.is_object() {
                stored.item = Value::Object(Map::new());
            }
            if let (Value::Object(item), Value::Object(update)) = (&mut stored.item, &payload.item) {
                for (key, value) in update {
                    item.insert(key.clone(), value.clone());
                }
                item.insert("id".into(), Value::String(id.to_string()));
            }
            stored.data = payload.data.clone();
            if !folder_id.is_empty() {
                stored.folder_id = Some(folder_id.to_string());
            }
            drop(state);
            self.record(PortalEvent::ItemUpdated {
                id: id.to_string(),
            });
            Ok(())
        }
        .boxed()
    }

    fn lookup_service_info<'a>(&'a self, url: &'a str) -> PortalFuture<'a, ServiceInfo> {
        async move {
            self.check(PortalOperation::LookupServiceInfo)?;
            self.record(PortalEvent::ServiceLookedUp {
                url: url.to_string(),
            });
            let state = lock(&self.state);
            // Layer URLs resolve to the service that hosts them.
            let service_item_id = state.services.get(url).cloned().or_else(|| {
                let (service_url, layer) = url.rsplit_once('/')?;
                layer.parse::<u32>().ok()?;
                state.services.get(service_url).cloned()
            });
            Ok(ServiceInfo {
                service_item_id,
            })
        }
        .boxed()
    }

    fn check_is_administrator<'a>(&'a self, item_id: &'a str) -> PortalFuture<'a, bool> {
        async move {
            self.check(PortalOperation::CheckIsAdministrator)?;
            self.record(PortalEvent::AdministratorChecked {
                item_id: item_id.to_string(),
            });
            Ok(lock(&self.state).administered.contains(item_id))
        }
        .boxed()
    }
}
