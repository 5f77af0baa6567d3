//! Step playback orchestrator
//!
//! Each step entry bumps a generation counter. Every asynchronous stage of
//! the setup re-checks it before committing state or arming a watcher, so a
//! setup superseded by a newer navigation exits without touching anything.
//! Setups are serialized through an async lock: the previous run always
//! finishes (or bails) before the next one starts mutating the page. Each
//! setup also owns a cancellation token, cancelled as soon as it is
//! superseded or the tour ends, which stops its precondition batch between
//! operations instead of after the whole list.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_recursion::async_recursion;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tour_completion::{CompletionOutcome, CompletionWatcher, WatchControl};
use tour_dom::{scroll_into_view, DomPort, ElementHandle};
use tour_editor_state::EditorStore;
use tour_locator::{enclosing_block_id, LocatorError, LocatorResolver, RecoveryHook, Resolution};
use tour_preconditions::PreconditionEngine;
use tourguide_core_types::{Locator, PlaybackConfig, PlaybackMode, PlaybackSession, Step, Tour};

use crate::errors::PlaybackError;
use crate::lookahead::wait_for_next_step_block;
use crate::recovery::StepRecovery;
use crate::types::{FailureContext, PlaybackEvent, PlaybackState, StepEntry, StepPhase};

const EVENT_CAPACITY: usize = 256;

/// Plays one tour at a time against a page and its editor.
///
/// Cheap to clone; clones drive the same playback.
#[derive(Clone)]
pub struct TourPlayer {
    inner: Arc<PlayerInner>,
}

struct PlayerInner {
    dom: Arc<dyn DomPort>,
    editor: Arc<dyn EditorStore>,
    session: PlaybackSession,
    config: Arc<PlaybackConfig>,
    resolver: LocatorResolver,
    preconditions: PreconditionEngine,
    watcher: CompletionWatcher,
    state: Mutex<PlayerState>,
    generation: AtomicU64,
    setup: tokio::sync::Mutex<()>,
    events: broadcast::Sender<PlaybackEvent>,
}

#[derive(Default)]
struct PlayerState {
    tour: Option<Arc<Tour>>,
    snapshot: PlaybackState,
    watch: Option<WatchControl>,
    /// Cancels the setup currently running, if any.
    setup_cancel: Option<CancellationToken>,
    /// Step whose last resolution failed; a repeat failing again is fatal.
    failed_resolution: Option<usize>,
}

fn describe(locator: &Locator) -> String {
    format!("{}:{}", locator.kind.name(), locator.value)
}

impl TourPlayer {
    pub fn new(
        dom: Arc<dyn DomPort>,
        editor: Arc<dyn EditorStore>,
        session: PlaybackSession,
        config: Arc<PlaybackConfig>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(PlayerInner {
                resolver: LocatorResolver::new(
                    dom.clone(),
                    editor.clone(),
                    session.clone(),
                    config.clone(),
                ),
                preconditions: PreconditionEngine::new(
                    dom.clone(),
                    editor.clone(),
                    session.clone(),
                    config.clone(),
                ),
                watcher: CompletionWatcher::new(
                    dom.clone(),
                    editor.clone(),
                    session.clone(),
                    config.clone(),
                ),
                dom,
                editor,
                session,
                config,
                state: Mutex::new(PlayerState::default()),
                generation: AtomicU64::new(0),
                setup: tokio::sync::Mutex::new(()),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.inner.events.subscribe()
    }

    pub fn snapshot(&self) -> PlaybackState {
        self.inner.state.lock().snapshot.clone()
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.inner.session
    }

    pub fn is_playing(&self) -> bool {
        self.inner.state.lock().tour.is_some()
    }

    /// Start `tour` from its first step, ending any tour already playing.
    pub async fn start_tour(&self, mut tour: Tour, mode: PlaybackMode) -> Result<(), PlaybackError> {
        if tour.steps.is_empty() {
            return Err(PlaybackError::EmptyTour);
        }
        if self.is_playing() {
            self.end_tour(false);
        }
        tour.normalize();
        for issue in tour.validate() {
            debug!(step = ?issue.step, "tour issue: {}", issue.message);
        }

        info!(title = %tour.title, steps = tour.steps.len(), mode = mode.name(), "starting tour");
        let step_count = tour.steps.len();
        {
            let mut state = self.inner.state.lock();
            state.snapshot = PlaybackState {
                tour_id: tour.id,
                tour_title: Some(tour.title.clone()),
                step_count,
                mode: Some(mode),
                ..PlaybackState::default()
            };
            state.tour = Some(Arc::new(tour));
            state.failed_resolution = None;
        }
        self.emit(PlaybackEvent::TourStarted { step_count });
        self.enter_step(0, StepEntry::Start).await
    }

    pub async fn next(&self) -> Result<(), PlaybackError> {
        let (index, count) = self.position()?;
        if index + 1 < count {
            self.enter_step(index + 1, StepEntry::Advance).await
        } else {
            self.end_tour(true);
            Ok(())
        }
    }

    /// Step back one; on the first step this is a no-op.
    pub async fn previous(&self) -> Result<(), PlaybackError> {
        let (index, _) = self.position()?;
        if index == 0 {
            return Ok(());
        }
        self.enter_step(index - 1, StepEntry::Previous).await
    }

    /// Re-run the full setup of the current step.
    pub async fn repeat(&self) -> Result<(), PlaybackError> {
        let (index, _) = self.position()?;
        self.inner.state.lock().snapshot.repeat_count += 1;
        self.enter_step(index, StepEntry::Repeat).await
    }

    pub async fn skip(&self) -> Result<(), PlaybackError> {
        let (index, count) = self.position()?;
        {
            let mut state = self.inner.state.lock();
            if !state.snapshot.skipped_steps.contains(&index) {
                state.snapshot.skipped_steps.push(index);
            }
        }
        info!(step = index, "step skipped");
        self.emit(PlaybackEvent::StepSkipped { index });
        if index + 1 < count {
            self.enter_step(index + 1, StepEntry::Skip).await
        } else {
            self.end_tour(true);
            Ok(())
        }
    }

    pub async fn go_to_step(&self, index: usize) -> Result<(), PlaybackError> {
        let (_, count) = self.position()?;
        if index >= count {
            return Err(PlaybackError::StepOutOfRange(index));
        }
        self.enter_step(index, StepEntry::Jump).await
    }

    /// End the tour early. Safe to call when nothing is playing.
    pub fn stop(&self) {
        if self.is_playing() {
            self.end_tour(false);
        }
    }

    /// Satisfy the current step's manual completion rule.
    pub fn confirm(&self) -> bool {
        self.inner
            .state
            .lock()
            .watch
            .as_ref()
            .map_or(false, WatchControl::confirm)
    }

    /// Whether the current step is waiting on a manual confirmation.
    pub fn awaiting_confirm(&self) -> bool {
        self.inner
            .state
            .lock()
            .watch
            .as_ref()
            .map_or(false, WatchControl::accepts_confirm)
    }

    fn position(&self) -> Result<(usize, usize), PlaybackError> {
        let state = self.inner.state.lock();
        let tour = state.tour.as_ref().ok_or(PlaybackError::NotPlaying)?;
        let index = state
            .snapshot
            .current_step_index
            .ok_or(PlaybackError::NotPlaying)?;
        Ok((index, tour.steps.len()))
    }

    fn emit(&self, event: PlaybackEvent) {
        let _ = self.inner.events.send(event);
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) != generation
    }

    /// Apply `update` only while `generation` is still the current setup.
    fn commit(&self, generation: u64, update: impl FnOnce(&mut PlayerState)) -> bool {
        let mut state = self.inner.state.lock();
        if self.is_stale(generation) {
            return false;
        }
        update(&mut state);
        true
    }

    #[async_recursion]
    async fn enter_step(&self, index: usize, entry: StepEntry) -> Result<(), PlaybackError> {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (tour, previous, cancel) = {
            let mut state = self.inner.state.lock();
            if self.is_stale(generation) {
                debug!(step = index, "superseded before setup was queued");
                return Ok(());
            }
            if let Some(watch) = state.watch.take() {
                watch.cancel();
            }
            let tour = state.tour.clone().ok_or(PlaybackError::NotPlaying)?;
            let cancel = CancellationToken::new();
            if let Some(superseded) = state.setup_cancel.replace(cancel.clone()) {
                superseded.cancel();
            }
            (tour, state.snapshot.current_step_index, cancel)
        };
        let step = tour.step(index).ok_or(PlaybackError::StepOutOfRange(index))?;

        let _setup = self.inner.setup.lock().await;
        if self.is_stale(generation) {
            debug!(step = index, "superseded before setup started");
            return Ok(());
        }

        if let Some(previous) = previous {
            debug!(step = previous, "leaving step");
            self.inner.dom.blur_active();
        }
        self.inner.session.enter_step(index);

        let entered = self.commit(generation, |state| {
            state.snapshot.reset_step(index);
            state.snapshot.phase = StepPhase::ApplyingPreconditions;
            state.snapshot.is_applying_preconditions = true;
        });
        if !entered {
            return Ok(());
        }
        info!(step = index, title = %step.title, ?entry, "entering step");
        self.emit(PlaybackEvent::StepEntered { index, entry });

        let batch = self
            .inner
            .preconditions
            .apply_all_until(&step.preconditions, &cancel)
            .await;
        let applied = self.commit(generation, |state| {
            state.snapshot.is_applying_preconditions = false;
            state.snapshot.failed_preconditions = batch.failed.clone();
            state.snapshot.phase = StepPhase::ResolvingTarget;
        });
        if !applied {
            debug!(step = index, "superseded while applying preconditions");
            return Ok(());
        }
        self.emit(PlaybackEvent::PreconditionsApplied {
            index,
            success: batch.success,
            failed: batch.failed.len(),
        });

        let resolved = if step.target.is_empty() {
            None
        } else {
            let outcome = self.resolve(step, &cancel).await;
            if self.is_stale(generation) {
                debug!(step = index, "superseded while resolving");
                return Ok(());
            }
            match outcome {
                Ok(resolution) => Some(self.present(generation, index, resolution).await),
                Err(err) => return self.resolution_failed(generation, index, step, entry, err),
            }
        };
        if self.is_stale(generation) {
            return Ok(());
        }

        let Some(completion) = step.completion.as_ref() else {
            self.commit(generation, |state| {
                state.snapshot.phase = StepPhase::AwaitingCompletion;
            });
            return Ok(());
        };
        if resolved.is_none() && completion.kind.needs_target() {
            warn!(
                step = index,
                rule = completion.kind.name(),
                "completion rule needs a target but the step has none"
            );
            return Ok(());
        }

        sleep(self.inner.config.completion_settle()).await;
        if self.is_stale(generation) {
            return Ok(());
        }

        let watch = match self.inner.watcher.watch(completion, resolved) {
            Ok(watch) => watch,
            Err(err) => {
                warn!(step = index, error = %err, "completion rule could not be armed");
                return Ok(());
            }
        };
        let control = watch.control();
        let armed = self.commit(generation, |state| {
            state.watch = Some(control);
            state.snapshot.phase = StepPhase::AwaitingCompletion;
        });
        if !armed {
            watch.cancel();
            return Ok(());
        }
        self.emit(PlaybackEvent::WatchingCompletion {
            index,
            rule: completion.kind.name().to_string(),
        });

        let player = self.clone();
        tokio::spawn(async move {
            let outcome = watch.wait().await;
            player.on_completion(generation, index, outcome).await;
        });
        Ok(())
    }

    async fn resolve(&self, step: &Step, cancel: &CancellationToken) -> Result<Resolution, LocatorError> {
        let recovery = StepRecovery::new(&self.inner.preconditions, step.recovery.as_deref(), cancel);
        self.inner
            .resolver
            .resolve_with_recovery(&step.target, Some(&recovery as &dyn RecoveryHook))
            .await
    }

    /// Select the enclosing block, scroll and highlight the resolved element.
    async fn present(&self, generation: u64, index: usize, resolution: Resolution) -> ElementHandle {
        let dom = self.inner.dom.as_ref();
        let element = resolution.element;

        if let Some(block_id) = enclosing_block_id(dom, element) {
            let selected = self.inner.editor.selected_block_id().await.ok().flatten();
            if selected.as_deref() != Some(block_id.as_str()) && !self.is_stale(generation) {
                if let Err(err) = self.inner.editor.select_block(&block_id).await {
                    debug!(%block_id, error = %err, "could not select enclosing block");
                }
            }
        }

        let locator = describe(&resolution.used_locator);
        let committed = self.commit(generation, |state| {
            state.snapshot.resolved_element = Some(element);
            state.snapshot.resolved_locator = Some(locator.clone());
            state.snapshot.resolution_attempts += 1;
            state.failed_resolution = None;
        });
        if committed {
            scroll_into_view(dom, element);
            dom.highlight(Some(element));
            info!(step = index, %element, %locator, recovered = resolution.recovered, "step target resolved");
            self.emit(PlaybackEvent::StepResolved {
                index,
                element,
                locator,
                recovered: resolution.recovered,
            });
        }
        element
    }

    fn resolution_failed(
        &self,
        generation: u64,
        index: usize,
        step: &Step,
        entry: StepEntry,
        err: LocatorError,
    ) -> Result<(), PlaybackError> {
        self.inner.dom.highlight(None);
        let reason = err.to_string();

        let mut fatal = false;
        let committed = self.commit(generation, |state| {
            fatal = entry == StepEntry::Repeat && state.failed_resolution == Some(index);
            state.failed_resolution = Some(index);
            state.snapshot.resolution_attempts += 1;
            state.snapshot.resolution_error = Some(reason.clone());
        });
        if !committed {
            return Ok(());
        }
        if fatal {
            return Err(self.fail_tour(index, step, reason));
        }

        warn!(step = index, error = %reason, "step target could not be resolved");
        self.emit(PlaybackEvent::StepFailed {
            index,
            error: reason,
        });
        Ok(())
    }

    /// Record why the tour cannot continue, then end it.
    fn fail_tour(&self, index: usize, step: &Step, reason: String) -> PlaybackError {
        let message = format!(
            "Step {} (\"{}\") could not be found after retrying: {}",
            index + 1,
            step.title,
            reason
        );
        {
            let mut state = self.inner.state.lock();
            let context = FailureContext {
                step_index: index,
                step_title: step.title.clone(),
                error: reason.clone(),
                locators: step.target.ordered_locators().into_iter().map(describe).collect(),
                failed_preconditions: state
                    .snapshot
                    .failed_preconditions
                    .iter()
                    .map(|result| result.kind.clone())
                    .collect(),
            };
            state.snapshot.tour_error = Some(message.clone());
            state.snapshot.last_failure_context = serde_json::to_value(&context).ok();
        }
        warn!(step = index, "{}", message);
        self.emit(PlaybackEvent::TourError { error: message });
        self.end_tour(false);
        PlaybackError::Unrecoverable {
            step: index,
            reason,
        }
    }

    async fn on_completion(&self, generation: u64, index: usize, outcome: CompletionOutcome) {
        if self.is_stale(generation) {
            return;
        }
        if !outcome.success {
            debug!(
                step = index,
                timed_out = outcome.timed_out,
                cancelled = outcome.cancelled,
                "completion not reached; waiting for the user"
            );
            return;
        }

        let mut tour = None;
        let committed = self.commit(generation, |state| {
            state.watch = None;
            state.snapshot.completion_satisfied = true;
            state.snapshot.phase = StepPhase::Advancing;
            tour = state.tour.clone();
        });
        let Some(tour) = tour.filter(|_| committed) else {
            return;
        };
        info!(step = index, event = ?outcome.event, "step completed");
        self.emit(PlaybackEvent::StepCompleted {
            index,
            event: outcome.event,
        });

        let Some(next) = tour.step(index + 1) else {
            self.end_tour(true);
            return;
        };
        let result = wait_for_next_step_block(
            self.inner.dom.as_ref(),
            self.inner.editor.as_ref(),
            next,
            self.inner.config.lookahead_timeout(),
            self.inner.config.poll_interval(),
        )
        .await;
        if self.is_stale(generation) {
            return;
        }
        self.emit(PlaybackEvent::LookedAhead {
            index: index + 1,
            result,
        });
        if let Err(err) = self.enter_step(index + 1, StepEntry::Advance).await {
            warn!(step = index + 1, error = %err, "advancing failed");
        }
    }

    fn end_tour(&self, completed: bool) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let watch = {
            let mut state = self.inner.state.lock();
            let previous = std::mem::take(&mut state.snapshot);
            state.snapshot = PlaybackState {
                phase: StepPhase::TourEnded,
                skipped_steps: previous.skipped_steps,
                tour_error: previous.tour_error,
                last_failure_context: previous.last_failure_context,
                ..PlaybackState::default()
            };
            state.tour = None;
            state.failed_resolution = None;
            if let Some(setup) = state.setup_cancel.take() {
                setup.cancel();
            }
            state.watch.take()
        };
        if let Some(watch) = watch {
            watch.cancel();
        }
        self.inner.session.clear();
        self.inner.dom.highlight(None);
        info!(completed, "tour ended");
        self.emit(PlaybackEvent::TourEnded { completed });
    }
}
