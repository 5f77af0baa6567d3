//! Precondition dispatch
//!
//! Every operation checks the current state first and returns without
//! touching the page when it already holds, then acts and polls until the
//! desired state is observed or `precondition_timeout` elapses.
//!
//! A batch run with [`PreconditionEngine::apply_all_until`] stops at the
//! first await after its token is cancelled, and session writes carry the
//! epoch captured when the batch began.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tour_dom::DomPort;
use tour_editor_state::EditorStore;
use tourguide_core_types::{
    poll_for, poll_until, PlaybackConfig, PlaybackSession, Precondition, PreconditionKind,
};

use crate::errors::PreconditionError;
use crate::types::{Applied, PreconditionBatch, PreconditionResult};

/// Cancellation and session epoch shared by every operation of one run.
pub(crate) struct RunScope {
    pub(crate) cancel: CancellationToken,
    pub(crate) epoch: u64,
}

impl RunScope {
    /// Fails once the run is cancelled or `session` has been cleared.
    pub(crate) fn ensure_live(&self, session: &PlaybackSession) -> Result<(), PreconditionError> {
        if self.cancel.is_cancelled() || session.epoch() != self.epoch {
            Err(PreconditionError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Applies step preconditions against the page and the editor store.
pub struct PreconditionEngine {
    pub(crate) dom: Arc<dyn DomPort>,
    pub(crate) editor: Arc<dyn EditorStore>,
    pub(crate) session: PlaybackSession,
    pub(crate) config: Arc<PlaybackConfig>,
}

impl PreconditionEngine {
    pub fn new(
        dom: Arc<dyn DomPort>,
        editor: Arc<dyn EditorStore>,
        session: PlaybackSession,
        config: Arc<PlaybackConfig>,
    ) -> Self {
        Self {
            dom,
            editor,
            session,
            config,
        }
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    fn scope(&self, cancel: &CancellationToken) -> RunScope {
        RunScope {
            cancel: cancel.clone(),
            epoch: self.session.epoch(),
        }
    }

    /// Run one precondition. Never panics or errors; failures are reported
    /// in the result.
    pub async fn apply(&self, precondition: &Precondition) -> PreconditionResult {
        let scope = self.scope(&CancellationToken::new());
        self.apply_in(precondition, &scope).await
    }

    async fn apply_in(&self, precondition: &Precondition, scope: &RunScope) -> PreconditionResult {
        let kind = match precondition.parsed_kind() {
            Ok(kind) => kind,
            Err(_) => {
                let err = PreconditionError::UnknownType(precondition.kind.clone());
                warn!("{}", err);
                return PreconditionResult::failed(precondition.kind.as_str(), err.to_string());
            }
        };

        debug!(kind = kind.name(), params = %precondition.params, "applying precondition");
        match self.run(kind, precondition, scope).await {
            Ok(applied) => PreconditionResult::ok(kind.name(), applied),
            Err(err) => {
                warn!(kind = kind.name(), error = %err, "precondition failed");
                PreconditionResult::failed(kind.name(), err.to_string())
            }
        }
    }

    /// Run every precondition in order; a failure does not stop the rest.
    pub async fn apply_all(&self, preconditions: &[Precondition]) -> PreconditionBatch {
        self.apply_all_until(preconditions, &CancellationToken::new())
            .await
    }

    /// Like [`apply_all`](Self::apply_all), but abandons the batch once
    /// `cancel` fires: the operation in flight is dropped at its next await
    /// and the rest never run.
    pub async fn apply_all_until(
        &self,
        preconditions: &[Precondition],
        cancel: &CancellationToken,
    ) -> PreconditionBatch {
        let scope = self.scope(cancel);
        let mut results = Vec::with_capacity(preconditions.len());
        for precondition in preconditions {
            if cancel.is_cancelled() {
                break;
            }
            match cancel
                .run_until_cancelled(self.apply_in(precondition, &scope))
                .await
            {
                Some(result) => results.push(result),
                None => break,
            }
        }

        if cancel.is_cancelled() {
            debug!(
                applied = results.len(),
                total = preconditions.len(),
                "precondition batch cancelled"
            );
            return PreconditionBatch::from_results(results).into_cancelled();
        }
        let batch = PreconditionBatch::from_results(results);
        if !batch.success {
            info!(
                failed = batch.failed.len(),
                total = batch.results.len(),
                "preconditions finished with failures"
            );
        }
        batch
    }

    async fn run(
        &self,
        kind: PreconditionKind,
        precondition: &Precondition,
        scope: &RunScope,
    ) -> Result<Applied, PreconditionError> {
        match kind {
            PreconditionKind::EnsureEditor => self.ensure_editor().await,
            PreconditionKind::EnsureSidebarOpen => {
                self.ensure_sidebar_open(precondition.param_str("sidebar"))
                    .await
            }
            PreconditionKind::EnsureSidebarClosed => self.ensure_sidebar_closed().await,
            PreconditionKind::SelectSidebarTab => {
                let tab = required(precondition, kind, "tab")?;
                self.select_sidebar_tab(tab).await
            }
            PreconditionKind::OpenInserter => self.set_inserter(true).await,
            PreconditionKind::CloseInserter => self.set_inserter(false).await,
            PreconditionKind::SelectBlock => {
                let block = ["clientId", "blockId", "id"]
                    .iter()
                    .find_map(|key| precondition.param_str(key))
                    .ok_or(PreconditionError::MissingParam {
                        kind: kind.name(),
                        param: "clientId",
                    })?;
                self.select_block(block).await
            }
            PreconditionKind::FocusElement => {
                let selector = required(precondition, kind, "selector")?;
                self.focus_element(selector).await
            }
            PreconditionKind::ScrollIntoView => {
                let selector = required(precondition, kind, "selector")?;
                self.scroll_to(selector).await
            }
            PreconditionKind::OpenModal => {
                let trigger = required(precondition, kind, "trigger")?;
                self.open_modal(trigger, precondition.param_str("modal"))
                    .await
            }
            PreconditionKind::CloseModal => self.close_modal(precondition.param_str("modal")).await,
            PreconditionKind::InsertBlock => {
                let name = precondition
                    .param_str("blockName")
                    .or_else(|| precondition.param_str("name"))
                    .ok_or(PreconditionError::MissingParam {
                        kind: kind.name(),
                        param: "blockName",
                    })?;
                let attributes = precondition
                    .params
                    .get("attributes")
                    .cloned()
                    .unwrap_or_else(|| serde_json::json!({}));
                let marker = precondition.param_str("markerId").unwrap_or(name);
                self.insert_block(name, attributes, marker, scope).await
            }
        }
    }

    /// Poll `probe` with the precondition timeout.
    pub(crate) async fn wait_until<E, F, Fut>(
        &self,
        condition: &str,
        probe: F,
    ) -> Result<(), PreconditionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, E>>,
        E: Display,
    {
        let timeout = self.config.precondition_timeout();
        if poll_until(probe, timeout, self.config.poll_interval()).await {
            Ok(())
        } else {
            Err(PreconditionError::timeout(
                condition,
                timeout.as_millis() as u64,
            ))
        }
    }

    /// Poll `probe` for a value with an explicit timeout.
    pub(crate) async fn wait_for<T, E, F, Fut>(
        &self,
        condition: &str,
        timeout: std::time::Duration,
        probe: F,
    ) -> Result<T, PreconditionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        E: Display,
    {
        poll_for(probe, timeout, self.config.poll_interval())
            .await
            .ok_or_else(|| PreconditionError::timeout(condition, timeout.as_millis() as u64))
    }
}

fn required<'a>(
    precondition: &'a Precondition,
    kind: PreconditionKind,
    param: &'static str,
) -> Result<&'a str, PreconditionError> {
    precondition
        .param_str(param)
        .ok_or(PreconditionError::MissingParam {
            kind: kind.name(),
            param,
        })
}

/// `block` -> `edit-post/block`; fully qualified names pass through.
pub fn normalize_sidebar(name: &str) -> String {
    let name = name.trim();
    if name.contains('/') {
        return name.to_string();
    }
    match name {
        "post" | "document" => "edit-post/document".to_string(),
        other => format!("edit-post/{other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidebar_names_are_qualified() {
        assert_eq!(normalize_sidebar("block"), "edit-post/block");
        assert_eq!(normalize_sidebar("post"), "edit-post/document");
        assert_eq!(normalize_sidebar("edit-post/document"), "edit-post/document");
        assert_eq!(normalize_sidebar("my-plugin/panel"), "my-plugin/panel");
    }
}
