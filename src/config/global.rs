//! User-wide deployer configuration (`~/.soldeploy/config.toml`).
//!
//! The file holds the target portal and its token, so it belongs to the user and is
//! never part of a project. A missing file is not an error; every key has a default.
//!
//! ```toml
//! max_concurrency = 4
//!
//! [portal]
//! url = "https://myorg.maps.arcgis.com"
//! token = "..."
//! timeout_secs = 60
//!
//! # Seed values for the substitution dictionary
//! [dictionary]
//! region = "north"
//! ```

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::deployer::DEFAULT_MAX_CONCURRENCY;
use crate::portal::Credentials;

/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_ENV: &str = "SOLDEPLOY_CONFIG";
/// Environment variable overriding `[portal] token`.
pub const TOKEN_ENV: &str = "SOLDEPLOY_TOKEN";

/// `[portal]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Access token. Prefer the `SOLDEPLOY_TOKEN` environment variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployerConfig {
    /// Item creations allowed in flight at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default)]
    pub portal: PortalConfig,

    /// Values seeded into every run's substitution dictionary.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub dictionary: Map<String, Value>,
}

const fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            portal: PortalConfig::default(),
            dictionary: Map::new(),
        }
    }
}

impl DeployerConfig {
    /// Load from the default location, or defaults when the file does not exist.
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Load from `path` when given, else from [`default_path`](Self::default_path).
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        config.max_concurrency = config.max_concurrency.max(1);
        Ok(config)
    }

    /// Write the configuration, creating parent directories.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        // The file may hold a token.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mut perms = fs::metadata(path)
                .await
                .with_context(|| format!("Failed to read permissions for {}", path.display()))?
                .permissions();
            perms.set_mode(0o600);
            fs::set_permissions(path, perms).await.with_context(|| {
                format!("Failed to set permissions on {}", path.display())
            })?;
        }

        Ok(())
    }

    /// `$SOLDEPLOY_CONFIG`, else `~/.soldeploy/config.toml`.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV)
            && !path.is_empty()
        {
            return Ok(PathBuf::from(path));
        }

        let home = dirs::home_dir().ok_or_else(|| anyhow!("Unable to determine home directory"))?;
        Ok(home.join(".soldeploy").join("config.toml"))
    }

    /// Token from `SOLDEPLOY_TOKEN`, else from the file.
    pub fn token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV)
            .ok()
            .filter(|token| !token.is_empty())
            .or_else(|| self.portal.token.clone())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.portal.timeout_secs.map(Duration::from_secs)
    }

    /// Credentials for the configured portal.
    pub fn credentials(&self) -> Result<Credentials> {
        let url = self.portal.url.as_deref().ok_or_else(|| {
            anyhow!("No portal configured; set [portal] url in the config file or use --portal-file")
        })?;
        Credentials::new(url, self.token())
    }
}
