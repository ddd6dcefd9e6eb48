//! Terminal progress display for deployments.
//!
//! Wraps an `indicatif` bar measured in percent. The bar is hidden when
//! `SOLDEPLOY_NO_PROGRESS` is set (the `--no-progress` flag sets it), which keeps
//! output clean in scripts and CI.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

use crate::deployer::ProgressCallback;

/// Set to any value to hide progress bars.
pub const NO_PROGRESS_ENV: &str = "SOLDEPLOY_NO_PROGRESS";

fn is_progress_disabled() -> bool {
    std::env::var(NO_PROGRESS_ENV).is_ok()
}

fn percent_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// A 0-100 bar fed by the deployer's progress callback.
#[derive(Clone)]
pub struct DeployProgressBar {
    inner: IndicatifBar,
}

impl DeployProgressBar {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_visibility(prefix, true)
    }

    pub fn with_visibility(prefix: impl Into<String>, visible: bool) -> Self {
        let inner = if !visible || is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new(100);
            bar.set_style(percent_style());
            bar.set_prefix(prefix.into());
            bar
        };
        Self {
            inner,
        }
    }

    /// Spinner for work of unknown length.
    pub fn spinner(message: impl Into<String>, visible: bool) -> Self {
        let inner = if !visible || is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new_spinner();
            bar.set_style(spinner_style());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        };
        inner.set_message(message.into());
        Self {
            inner,
        }
    }

    pub fn set_percent(&self, percent: f64) {
        self.inner.set_position(percent.clamp(0.0, 100.0).round() as u64);
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.inner.set_message(message.into());
    }

    /// Callback for [`DeployOptions::progress_callback`](crate::deployer::DeployOptions).
    pub fn callback(&self) -> ProgressCallback {
        let bar = self.clone();
        Arc::new(move |percent| bar.set_percent(percent))
    }

    pub fn finish_with_message(&self, message: impl Into<String>) {
        self.inner.finish_with_message(message.into());
    }

    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }

    pub fn position(&self) -> u64 {
        self.inner.position()
    }
}
