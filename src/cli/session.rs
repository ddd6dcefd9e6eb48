//! The portal a command talks to.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::DeployerConfig;
use crate::portal::{InMemoryPortal, Portal, RestPortal};

/// Either a snapshot file loaded into memory or a live REST portal.
pub enum PortalSession {
    File { portal: InMemoryPortal, path: PathBuf },
    Rest(RestPortal),
}

impl PortalSession {
    /// `--portal-file` when given, else the portal named in the configuration.
    pub async fn open(portal_file: Option<&Path>, config: &DeployerConfig) -> Result<Self> {
        if let Some(path) = portal_file {
            debug!("Using portal snapshot {}", path.display());
            let portal = InMemoryPortal::load_from(path).await?;
            return Ok(Self::File {
                portal,
                path: path.to_path_buf(),
            });
        }

        let credentials = config.credentials()?;
        debug!("Using portal {}", credentials.portal_url);
        let portal = match config.timeout() {
            Some(timeout) => RestPortal::with_timeout(credentials, timeout)?,
            None => RestPortal::new(credentials)?,
        };
        Ok(Self::Rest(portal))
    }

    pub fn portal(&self) -> &dyn Portal {
        match self {
            Self::File {
                portal,
                ..
            } => portal,
            Self::Rest(portal) => portal,
        }
    }

    /// Persist changes made to a snapshot file.
    pub async fn save(&self) -> Result<()> {
        if let Self::File {
            portal,
            path,
        } = self
        {
            portal.save_to(path).await?;
        }
        Ok(())
    }
}
