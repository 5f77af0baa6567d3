//! Completion watcher
//!
//! `watch` validates the rule, subscribes to the event sources it needs and
//! spawns one task that races the rule against cancellation and the
//! optional timeout. The task reports exactly once through a oneshot.

use std::collections::HashSet;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, oneshot, Notify};
use tokio::time::{sleep, Instant};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info};

use tour_dom::{contains, element_identity, query_everywhere, DomEvent, DomEventKind, DomPort, ElementHandle};
use tour_editor_state::{EditorChange, EditorStore};
use tourguide_core_types::{Completion, PlaybackConfig, PlaybackSession};

use crate::conditions::{observe_value, Condition, WpDataQuery};
use crate::errors::CompletionError;
use crate::types::CompletionOutcome;

/// Arms completion watchers against one page and editor.
#[derive(Clone)]
pub struct CompletionWatcher {
    dom: Arc<dyn DomPort>,
    editor: Arc<dyn EditorStore>,
    session: PlaybackSession,
    config: Arc<PlaybackConfig>,
}

/// Cloneable handle for ending a watch early.
#[derive(Clone)]
pub struct WatchControl {
    cancel: CancellationToken,
    confirm: Option<Arc<Notify>>,
}

impl WatchControl {
    /// Resolve as cancelled. Has no effect once the watch has settled.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Satisfy a manual watch. Returns false for rules that cannot be
    /// confirmed.
    pub fn confirm(&self) -> bool {
        match &self.confirm {
            Some(confirm) => {
                confirm.notify_one();
                true
            }
            None => false,
        }
    }

    pub fn accepts_confirm(&self) -> bool {
        self.confirm.is_some()
    }
}

/// A running watch. Dropping it without waiting cancels the watch.
pub struct CompletionWatch {
    control: WatchControl,
    result: oneshot::Receiver<CompletionOutcome>,
    _guard: DropGuard,
}

impl CompletionWatch {
    pub fn control(&self) -> WatchControl {
        self.control.clone()
    }

    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn confirm(&self) -> bool {
        self.control.confirm()
    }

    /// Wait for the watch to settle.
    pub async fn wait(mut self) -> CompletionOutcome {
        (&mut self.result)
            .await
            .unwrap_or_else(|_| CompletionOutcome::cancelled())
    }
}

/// A condition with its event subscriptions taken at arm time.
enum Armed {
    Click {
        target: ElementHandle,
        events: broadcast::Receiver<DomEvent>,
        armed_at: Instant,
        grace: Duration,
    },
    Value {
        target: ElementHandle,
        attribute: Option<String>,
        expected: Option<String>,
        snapshot: Option<String>,
        events: broadcast::Receiver<DomEvent>,
    },
    WpData {
        query: WpDataQuery,
        changes: broadcast::Receiver<EditorChange>,
    },
    Manual {
        confirm: Arc<Notify>,
    },
    Appear {
        selector: String,
        known: HashSet<String>,
        interval: Duration,
    },
    Disappear {
        selector: String,
        interval: Duration,
    },
    Custom {
        name: String,
        target: Option<String>,
        events: broadcast::Receiver<DomEvent>,
    },
}

impl CompletionWatcher {
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

    /// Arm a watcher for `completion`, optionally bound to a resolved element.
    ///
    /// Must be called inside a tokio runtime.
    pub fn watch(
        &self,
        completion: &Completion,
        target: Option<ElementHandle>,
    ) -> Result<CompletionWatch, CompletionError> {
        let condition = Condition::from_completion(completion, target)?;
        let name = condition.name();
        let timeout = completion
            .timeout
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        let armed = self.arm(condition);
        let confirm = match &armed {
            Armed::Manual { confirm } => Some(confirm.clone()),
            _ => None,
        };

        let cancel = CancellationToken::new();
        let (tx, result) = oneshot::channel();
        let token = cancel.clone();
        let dom = self.dom.clone();
        let editor = self.editor.clone();
        let session = self.session.clone();

        debug!(rule = name, ?timeout, "arming completion watcher");
        tokio::spawn(async move {
            let outcome = select! {
                biased;
                _ = token.cancelled() => CompletionOutcome::cancelled(),
                _ = deadline(timeout) => CompletionOutcome::timed_out(),
                event = armed.run(dom.as_ref(), editor.as_ref(), &session) => {
                    CompletionOutcome::satisfied(event)
                }
            };
            if outcome.success {
                info!(rule = name, event = ?outcome.event, "step completion satisfied");
            } else {
                debug!(rule = name, timed_out = outcome.timed_out, "completion watcher ended");
            }
            let _ = tx.send(outcome);
        });

        Ok(CompletionWatch {
            control: WatchControl {
                cancel: cancel.clone(),
                confirm,
            },
            result,
            _guard: cancel.drop_guard(),
        })
    }

    fn arm(&self, condition: Condition) -> Armed {
        let dom = self.dom.as_ref();
        let interval = self.config.poll_interval();
        match condition {
            Condition::ClickTarget { target } => Armed::Click {
                target,
                events: dom.subscribe(),
                armed_at: Instant::now(),
                grace: self.config.click_grace(),
            },
            Condition::ValueChanged {
                target,
                attribute,
                expected,
            } => Armed::Value {
                snapshot: observe_value(dom, target, attribute.as_deref()),
                events: dom.subscribe(),
                target,
                attribute,
                expected,
            },
            Condition::WpData(query) => Armed::WpData {
                query,
                changes: self.editor.subscribe(),
            },
            Condition::Manual => Armed::Manual {
                confirm: Arc::new(Notify::new()),
            },
            Condition::ElementAppear { selector } => Armed::Appear {
                known: query_everywhere(dom, &selector)
                    .into_iter()
                    .map(|element| element_identity(dom, element))
                    .collect(),
                selector,
                interval,
            },
            Condition::ElementDisappear { selector } => Armed::Disappear { selector, interval },
            Condition::CustomEvent { name, target } => Armed::Custom {
                name,
                target,
                events: dom.subscribe(),
            },
        }
    }
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => sleep(timeout).await,
        None => pending().await,
    }
}

/// Next event; `None` once the source is gone. Lagging is reported as an
/// event-less wakeup so callers can re-check their condition.
async fn next<T: Clone>(events: &mut broadcast::Receiver<T>) -> Option<Option<T>> {
    match events.recv().await {
        Ok(event) => Some(Some(event)),
        Err(RecvError::Lagged(skipped)) => {
            debug!(skipped, "completion watcher lagged behind events");
            Some(None)
        }
        Err(RecvError::Closed) => None,
    }
}

impl Armed {
    /// Resolves with the event name once satisfied; never returns otherwise.
    async fn run(self, dom: &dyn DomPort, editor: &dyn EditorStore, session: &PlaybackSession) -> String {
        match self {
            Armed::Click {
                target,
                mut events,
                armed_at,
                grace,
            } => {
                while let Some(event) = next(&mut events).await {
                    let Some(DomEvent {
                        kind: DomEventKind::Click,
                        target: Some(clicked),
                        ..
                    }) = event
                    else {
                        continue;
                    };
                    if armed_at.elapsed() < grace {
                        debug!(element = %clicked, "click inside grace period ignored");
                        continue;
                    }
                    if contains(dom, target, clicked) {
                        return "click".to_string();
                    }
                }
            }

            Armed::Value {
                target,
                attribute,
                expected,
                snapshot,
                mut events,
            } => {
                let changed = |current: Option<String>| match &expected {
                    Some(expected) => current.as_deref() == Some(expected.as_str()),
                    None => current != snapshot,
                };
                if expected.is_some() && changed(observe_value(dom, target, attribute.as_deref())) {
                    return "valueChanged".to_string();
                }
                while let Some(event) = next(&mut events).await {
                    let relevant = match &event {
                        Some(event) => {
                            matches!(
                                event.kind,
                                DomEventKind::Input | DomEventKind::Change | DomEventKind::Mutation
                            ) && event.target.map_or(true, |t| contains(dom, target, t))
                        }
                        None => true,
                    };
                    if relevant && changed(observe_value(dom, target, attribute.as_deref())) {
                        return "valueChanged".to_string();
                    }
                }
            }

            Armed::WpData { query, mut changes } => {
                if check_query(editor, &query).await {
                    return "wpData".to_string();
                }
                while next(&mut changes).await.is_some() {
                    if check_query(editor, &query).await {
                        return "wpData".to_string();
                    }
                }
            }

            Armed::Manual { confirm } => {
                confirm.notified().await;
                return "manual".to_string();
            }

            Armed::Appear {
                selector,
                known,
                interval,
            } => loop {
                let fresh = query_everywhere(dom, &selector)
                    .into_iter()
                    .map(|element| element_identity(dom, element))
                    .find(|identity| !known.contains(identity));
                if let Some(identity) = fresh {
                    debug!(%identity, %selector, "new element appeared");
                    session.set_last_appeared(identity);
                    return "elementAppear".to_string();
                }
                sleep(interval).await;
            },

            Armed::Disappear { selector, interval } => loop {
                if query_everywhere(dom, &selector).is_empty() {
                    return "elementDisappear".to_string();
                }
                sleep(interval).await;
            },

            Armed::Custom {
                name,
                target,
                mut events,
            } => {
                while let Some(event) = next(&mut events).await {
                    let Some(event) = event else { continue };
                    if event.kind != DomEventKind::Custom(name.clone()) {
                        continue;
                    }
                    let on_target = match (&target, event.target) {
                        (None, _) => true,
                        (Some(_), None) => false,
                        (Some(selector), Some(element)) => query_everywhere(dom, selector)
                            .into_iter()
                            .any(|candidate| contains(dom, candidate, element)),
                    };
                    if on_target {
                        return name;
                    }
                }
            }
        }

        // Event source closed: only cancellation or the timeout can end the watch.
        pending().await
    }
}

async fn check_query(editor: &dyn EditorStore, query: &WpDataQuery) -> bool {
    match editor.query(&query.store, &query.selector, &query.args).await {
        Ok(actual) => query.operator.evaluate(&actual, &query.expected),
        Err(err) => {
            debug!(selector = %query.selector, error = %err, "wpData query not ready");
            false
        }
    }
}
