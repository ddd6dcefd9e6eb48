//! Cost-weighted deployment progress.
//!
//! Setup reports fixed checkpoints; the remaining 95% is shared out between the
//! contained items in proportion to their estimated cost. The tracker never reports
//! a value lower than one it already reported.

use std::fmt;
use std::sync::Arc;

use crate::core::ItemTemplate;

/// Caller-supplied sink for progress percentages.
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// Share of the bar given to item creation.
pub const ITEMS_SHARE: f64 = 95.0;
/// Reported when the run starts.
pub const STARTED: f64 = 0.0;
/// Reported once the destination folder exists.
pub const FOLDER_READY: f64 = 2.0;
/// Reported once the Solution item exists.
pub const SOLUTION_ITEM_CREATED: f64 = 3.0;
pub const COMPLETE: f64 = 100.0;

/// Sum of the templates' cost factors, floored at 1.
pub fn estimate_deployment_cost(templates: &[ItemTemplate]) -> f64 {
    templates.iter().map(|template| template.estimated_cost.max(0.0)).sum::<f64>().max(1.0)
}

/// Percentage points one unit of cost is worth.
pub fn progress_percent_step(total_cost: f64) -> f64 {
    ITEMS_SHARE / total_cost.max(1.0)
}

/// Monotonic progress accumulator for one run.
pub struct ProgressTracker {
    sink: Option<ProgressCallback>,
    percent: f64,
    step: f64,
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("percent", &self.percent)
            .field("step", &self.step)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

impl ProgressTracker {
    pub fn new(sink: Option<ProgressCallback>) -> Self {
        Self {
            sink,
            percent: 0.0,
            step: ITEMS_SHARE,
        }
    }

    /// Size the per-cost step for the templates about to be created.
    pub fn begin_items(&mut self, templates: &[ItemTemplate]) {
        self.step = progress_percent_step(estimate_deployment_cost(templates));
    }

    /// Report `percent`, clamped so the reported sequence never decreases.
    pub fn report(&mut self, percent: f64) {
        self.percent = percent.clamp(self.percent, COMPLETE);
        if let Some(sink) = &self.sink {
            sink(self.percent);
        }
    }

    /// Advance by one completed item of the given cost.
    pub fn advance(&mut self, cost: f64) {
        self.report(self.percent + self.step * cost.max(0.0));
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }
}
