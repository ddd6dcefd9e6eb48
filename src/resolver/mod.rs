//! Creation ordering for a Solution's item templates.
//!
//! Templates declare the ids they depend on. Before anything is created, the
//! deployer builds a [`DependencyGraph`] from the *hard* edges (non-circular, inside
//! the Solution), rejects cyclic graphs, and then drains a [`CreationSchedule`]:
//! an item becomes ready only once every hard dependency has been created.
//!
//! ```rust
//! use solution_deployer::core::ItemTemplate;
//! use solution_deployer::resolver::DependencyGraph;
//!
//! let mut map = ItemTemplate::new("map", "Web Map");
//! map.dependencies = vec!["svc".to_string()];
//! let svc = ItemTemplate::new("svc", "Feature Service");
//!
//! let graph = DependencyGraph::from_templates(&[map, svc])?;
//! assert_eq!(graph.topological_order()?, vec!["svc", "map"]);
//! # Ok::<(), solution_deployer::core::DeployError>(())
//! ```

pub mod dependency_graph;

pub use dependency_graph::{CreationSchedule, DependencyGraph};
