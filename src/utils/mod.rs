//! Terminal helpers used by the binary.

pub mod progress;

pub use progress::DeployProgressBar;
