use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use tour_locator::RecoveryHook;
use tour_preconditions::PreconditionEngine;
use tourguide_core_types::Precondition;

/// Re-applies a step's recovery preconditions before the single retry.
/// With no recovery list the retry still happens, after a yield.
pub(crate) struct StepRecovery<'a> {
    engine: &'a PreconditionEngine,
    preconditions: Option<&'a [Precondition]>,
    cancel: &'a CancellationToken,
}

impl<'a> StepRecovery<'a> {
    pub(crate) fn new(
        engine: &'a PreconditionEngine,
        preconditions: Option<&'a [Precondition]>,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            engine,
            preconditions,
            cancel,
        }
    }
}

#[async_trait]
impl RecoveryHook for StepRecovery<'_> {
    async fn recover(&self) {
        let Some(preconditions) = self.preconditions.filter(|list| !list.is_empty()) else {
            return;
        };
        let batch = self
            .engine
            .apply_all_until(preconditions, self.cancel)
            .await;
        debug!(
            applied = batch.results.len(),
            failed = batch.failed.len(),
            cancelled = batch.cancelled,
            "recovery preconditions re-applied"
        );
    }
}
