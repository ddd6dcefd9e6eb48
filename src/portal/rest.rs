//! [`Portal`] over the ArcGIS `sharing/rest` API.
//!
//! Requests carry `f=json` and, when configured, a `token` parameter. The API
//! reports most failures with HTTP 200 and an `{"error": {...}}` body, so every
//! response goes through [`check_response`] before it is decoded.

use anyhow::{Context, Result, anyhow, bail};
use futures::FutureExt;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

use super::{
    CreatedItem, Extent, Folder, FolderCreation, Portal, PortalDescriptor, PortalFuture,
    ServiceInfo, SpatialReference, User,
};
use crate::core::{ItemMetadata, ItemPayload};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Where to connect and how to authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub portal_url: String,
    pub token: Option<String>,
}

impl Credentials {
    /// Validates the URL and drops any trailing slash.
    pub fn new(portal_url: &str, token: Option<String>) -> Result<Self> {
        let parsed =
            Url::parse(portal_url).with_context(|| format!("Invalid portal URL: {portal_url}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("Portal URL must use http or https: {portal_url}");
        }
        Ok(Self {
            portal_url: portal_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }
}

pub struct RestPortal {
    client: Client,
    credentials: Credentials,
    username: OnceCell<String>,
}

impl RestPortal {
    pub fn new(credentials: Credentials) -> Result<Self> {
        Self::with_timeout(credentials, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(credentials: Credentials, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("soldeploy/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            credentials,
            username: OnceCell::new(),
        })
    }

    fn sharing_url(&self, path: &str) -> String {
        format!("{}/sharing/rest/{path}", self.credentials.portal_url)
    }

    fn auth_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("f".to_string(), "json".to_string())];
        if let Some(token) = &self.credentials.token {
            params.push(("token".to_string(), token.clone()));
        }
        params
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .query(&self.auth_params())
            .query(query)
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("Request to {url} failed"))?;
        let body: Value =
            response.json().await.with_context(|| format!("Invalid JSON from {url}"))?;
        check_response(body)
    }

    async fn post_form(&self, url: &str, form: Vec<(String, String)>) -> Result<Value> {
        debug!("POST {}", url);
        let mut fields = self.auth_params();
        fields.extend(form);
        let response = self
            .client
            .post(url)
            .form(&fields)
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("Request to {url} failed"))?;
        response.json().await.with_context(|| format!("Invalid JSON from {url}"))
    }

    async fn get_typed<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.get_json(&self.sharing_url(path), &[]).await?;
        serde_json::from_value(body).with_context(|| format!("Unexpected response from {path}"))
    }

    async fn username(&self) -> Result<&str> {
        self.username
            .get_or_try_init(|| async { self.fetch_user().await.map(|user| user.username) })
            .await
            .map(String::as_str)
    }

    async fn fetch_user(&self) -> Result<User> {
        self.get_typed("community/self").await
    }

    fn user_content_url(&self, username: &str, folder_id: &str, operation: &str) -> String {
        if folder_id.is_empty() {
            self.sharing_url(&format!("content/users/{username}/{operation}"))
        } else {
            self.sharing_url(&format!("content/users/{username}/{folder_id}/{operation}"))
        }
    }
}

/// Turn an `{"error": ...}` body into an error.
fn check_response(body: Value) -> Result<Value> {
    if let Some(error) = body.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = error.get("message").and_then(Value::as_str).unwrap_or("unknown error");
        let details = error
            .get("details")
            .and_then(Value::as_array)
            .map(|details| {
                details.iter().filter_map(Value::as_str).collect::<Vec<_>>().join("; ")
            })
            .unwrap_or_default();
        if details.is_empty() {
            bail!("Portal error {code}: {message}");
        }
        bail!("Portal error {code}: {message} ({details})");
    }
    Ok(body)
}

/// Flatten item metadata and data into `addItem`/`update` form fields.
///
/// Strings are sent as-is, string arrays comma separated, everything else as JSON.
/// The item data goes in `text`.
fn item_form(payload: &ItemPayload) -> Vec<(String, String)> {
    let mut form = Vec::new();
    if let Value::Object(item) = &payload.item {
        for (key, value) in item {
            let encoded = match value {
                Value::Null => continue,
                Value::String(text) => text.clone(),
                Value::Array(values) if values.iter().all(Value::is_string) => values
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(","),
                other => other.to_string(),
            };
            form.push((key.clone(), encoded));
        }
    }
    if !payload.data.is_null() {
        form.push(("text".to_string(), payload.data.to_string()));
    }
    form
}

fn success_id(body: &Value, what: &str) -> Result<String> {
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        bail!("Portal refused to {what}");
    }
    body.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Portal response to {what} has no id"))
}

impl Portal for RestPortal {
    fn portal_url(&self) -> &str {
        &self.credentials.portal_url
    }

    fn fetch_item_base<'a>(&'a self, id: &'a str) -> PortalFuture<'a, ItemMetadata> {
        async move { self.get_typed(&format!("content/items/{id}")).await }.boxed()
    }

    fn fetch_item_data<'a>(&'a self, id: &'a str) -> PortalFuture<'a, Value> {
        async move { self.get_json(&self.sharing_url(&format!("content/items/{id}/data")), &[]).await }
            .boxed()
    }

    fn fetch_portal_descriptor(&self) -> PortalFuture<'_, PortalDescriptor> {
        self.get_typed("portals/self").boxed()
    }

    fn fetch_current_user(&self) -> PortalFuture<'_, User> {
        self.fetch_user().boxed()
    }

    fn fetch_user_folders(&self) -> PortalFuture<'_, Vec<Folder>> {
        async move {
            let username = self.username().await?;
            let body = self.get_json(&self.sharing_url(&format!("content/users/{username}")), &[]).await?;
            let folders = body.get("folders").cloned().unwrap_or_else(|| json!([]));
            serde_json::from_value(folders).context("Unexpected folder listing")
        }
        .boxed()
    }

    fn create_folder<'a>(&'a self, title: &'a str) -> PortalFuture<'a, FolderCreation> {
        async move {
            let username = self.username().await?;
            let url = self.sharing_url(&format!("content/users/{username}/createFolder"));
            let body = self.post_form(&url, vec![("title".to_string(), title.to_string())]).await?;

            // A duplicate title is reported as "Folder title '<t>' not available".
            let taken = body
                .get("error")
                .and_then(|error| error.get("message"))
                .and_then(Value::as_str)
                .is_some_and(|message| message.contains("not available"));
            if taken {
                return Ok(FolderCreation::TitleTaken);
            }

            let body = check_response(body)?;
            let folder = body.get("folder").cloned().ok_or_else(|| anyhow!("No folder in response"))?;
            Ok(FolderCreation::Created(
                serde_json::from_value(folder).context("Unexpected folder in response")?,
            ))
        }
        .boxed()
    }

    fn reproject_extent<'a>(
        &'a self,
        extent: &'a Extent,
        out_wkid: u32,
        geometry_service_url: &'a str,
    ) -> PortalFuture<'a, Extent> {
        async move {
            let in_sr = extent.wkid().ok_or_else(|| anyhow!("Extent has no spatial reference"))?;
            let geometries = json!({
                "geometryType": "esriGeometryEnvelope",
                "geometries": [{
                    "xmin": extent.xmin, "ymin": extent.ymin,
                    "xmax": extent.xmax, "ymax": extent.ymax,
                }],
            });
            let url = format!("{}/project", geometry_service_url.trim_end_matches('/'));
            let body = self
                .get_json(
                    &url,
                    &[
                        ("inSR", in_sr.to_string()),
                        ("outSR", out_wkid.to_string()),
                        ("geometries", geometries.to_string()),
                    ],
                )
                .await?;
            let projected = body
                .get("geometries")
                .and_then(|g| g.get(0))
                .cloned()
                .ok_or_else(|| anyhow!("Projection returned no geometry"))?;
            let mut extent: Extent =
                serde_json::from_value(projected).context("Unexpected projected geometry")?;
            extent.spatial_reference = Some(SpatialReference::wkid(out_wkid));
            Ok(extent)
        }
        .boxed()
    }

    fn create_item<'a>(
        &'a self,
        payload: &'a ItemPayload,
        folder_id: &'a str,
    ) -> PortalFuture<'a, CreatedItem> {
        async move {
            let username = self.username().await?;
            let url = self.user_content_url(username, folder_id, "addItem");
            let body = check_response(self.post_form(&url, item_form(payload)).await?)?;
            let id = success_id(&body, "add the item")?;
            let url = payload.item.get("url").and_then(Value::as_str).map(str::to_string);
            Ok(CreatedItem {
                id,
                url,
            })
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
            let username = self.username().await?;
            let url = self.user_content_url(username, folder_id, &format!("items/{id}/update"));
            let body = check_response(self.post_form(&url, item_form(payload)).await?)?;
            success_id(&body, "update the item")?;
            Ok(())
        }
        .boxed()
    }

    fn lookup_service_info<'a>(&'a self, url: &'a str) -> PortalFuture<'a, ServiceInfo> {
        async move {
            let body = self.get_json(url, &[]).await?;
            serde_json::from_value(body).with_context(|| format!("Unexpected service info from {url}"))
        }
        .boxed()
    }

    fn check_is_administrator<'a>(&'a self, item_id: &'a str) -> PortalFuture<'a, bool> {
        async move {
            let body = self.get_json(&self.sharing_url(&format!("content/items/{item_id}")), &[]).await?;
            Ok(body.get("itemControl").and_then(Value::as_str) == Some("admin"))
        }
        .boxed()
    }
}
