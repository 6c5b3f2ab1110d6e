//! Progress reporting for session runs.

use common::SharedFn;
use strum_macros::Display;

/// Progress of one session stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionProgress {
    /// Items finished in this stage.
    pub current: usize,
    /// Items this stage will process.
    pub total: usize,
    pub stage: SessionStage,
}

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionStage {
    Loading,
    Synthesis,
    Calibration,
    Demosaic,
    Registration,
    Combination,
}

/// Callback type for progress reporting.
pub type ProgressCallback = SharedFn<dyn Fn(SessionProgress) + Send + Sync>;

pub(super) fn report_progress(
    callback: &ProgressCallback,
    current: usize,
    total: usize,
    stage: SessionStage,
) {
    if let Some(f) = callback.as_ref() {
        f(SessionProgress {
            current,
            total,
            stage,
        });
    }
}
