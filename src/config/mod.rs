//! Configuration for the `soldeploy` binary.
//!
//! One user-wide TOML file, `~/.soldeploy/config.toml`, names the target portal, the
//! token, the creation concurrency and any seed values for the substitution
//! dictionary. `--config` or `SOLDEPLOY_CONFIG` point at another file, and
//! `SOLDEPLOY_TOKEN` overrides the token. Command line flags win over the file.

mod global;

pub use global::{CONFIG_PATH_ENV, DeployerConfig, PortalConfig, TOKEN_ENV};
