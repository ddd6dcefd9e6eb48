//! Solution Deployer
//!
//! Instantiates a *Solution* (a graph of templated portal items) into a target
//! organization. Every item is created in dependency order, `{{...}}` placeholders in
//! its content are filled from a substitution dictionary that grows as items are
//! created, and a new Solution item records where everything ended up.
//!
//! # Architecture Overview
//!
//! A deployment fetches the source Solution, validates its dependency graph, creates
//! a destination folder and an empty Solution item, then creates the contained items
//! with bounded concurrency. Items that reference each other in a cycle are created
//! first and patched once all of them exist.
//!
//! # Core Modules
//!
//! - [`deployer`] - Deployment orchestration, progress, folders and cancellation
//! - [`templating`] - Placeholder grammar, transforms and the substitution dictionary
//! - [`resolver`] - Dependency graph, cycle detection and creation scheduling
//! - [`processors`] - Per-kind dependency extraction and reference rewriting
//! - [`portal`] - The [`Portal`](portal::Portal) seam with REST and in-memory backends
//! - [`core`] - Item and Solution types, errors
//!
//! ## Supporting Modules
//! - [`cli`] - The `soldeploy` command line
//! - [`config`] - User-wide configuration (`~/.soldeploy/config.toml`)
//! - [`utils`] - Terminal progress display
//!
//! # Solution Data
//!
//! ```json
//! {
//!   "templates": [
//!     {
//!       "itemId": "a1",
//!       "type": "Feature Service",
//!       "dependencies": [],
//!       "estimatedDeploymentCostFactor": 3,
//!       "item": { "title": "Hydrants" }
//!     },
//!     {
//!       "itemId": "b2",
//!       "type": "Web Map",
//!       "dependencies": ["a1"],
//!       "item": { "title": "Hydrant Map ({{params.region}})" },
//!       "data": { "operationalLayers": [{ "url": "{{a1.layer0.url}}" }] }
//!     }
//!   ],
//!   "params": { "region": "north" }
//! }
//! ```
//!
//! # Command-Line Usage
//!
//! ```bash
//! soldeploy deploy 6f2a0c1e --title "Hydrants" --param region=south
//! soldeploy plan 6f2a0c1e
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod deployer;
pub mod portal;
pub mod processors;
pub mod resolver;
pub mod templating;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
