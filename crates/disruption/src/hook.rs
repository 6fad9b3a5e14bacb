//! Side effects triggered by disruption transitions.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::error;

/// Hook the sampler calls at different stages of disruption detection.
///
/// Hooks run synchronously on the consumer task, so they should hand long
/// running work off to their own task.
#[cfg_attr(test, mockall::automock)]
pub trait SamplerHook: Send + Sync {
    /// Called whenever a new disruption interval is opened.
    fn disruption_started(&self);
}

impl<F> SamplerHook for F
where
    F: Fn() + Send + Sync,
{
    fn disruption_started(&self) {
        self()
    }
}

/// Run every hook, logging and swallowing panics so a broken hook cannot
/// stop interval recording.
pub(crate) fn notify_disruption_started(hooks: &[Arc<dyn SamplerHook>], locator: &str) {
    for hook in hooks {
        if catch_unwind(AssertUnwindSafe(|| hook.disruption_started())).is_err() {
            error!(locator, "Sampler hook panicked while handling disruption start");
        }
    }
}
