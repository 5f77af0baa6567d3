//! Tour playback against a page fixture
//!
//! Events are printed as they arrive. With `--auto-confirm` the command also
//! plays the learner: manual steps are confirmed, click targets are clicked
//! once the grace period has passed, failed steps are repeated once, and
//! rules a static page cannot satisfy are stepped past with `next`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Args, ValueEnum};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, warn};

use tour_dom::DomPort;
use tour_playback::{PlaybackEvent, PlaybackState, TourPlayer};
use tourguide_core_types::{CompletionType, PlaybackMode, PlaybackSession, Step, Tour};

use super::context::CliContext;
use super::output::{emit_line, OutputFormat};
use crate::page::{read_page, read_tour, LoadedPage};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ModeArg {
    /// Author previewing a tour
    Educator,
    /// Learner following a published tour
    Pupil,
}

impl From<ModeArg> for PlaybackMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Educator => PlaybackMode::Educator,
            ModeArg::Pupil => PlaybackMode::Pupil,
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct PlayArgs {
    /// Page fixture (document plus editor blocks)
    #[arg(long, value_name = "FILE")]
    pub dom: PathBuf,

    /// Tour file (JSON, or YAML by extension)
    #[arg(long, value_name = "FILE")]
    pub tour: PathBuf,

    /// Drive completions automatically instead of waiting
    #[arg(long)]
    pub auto_confirm: bool,

    #[arg(long, value_enum, default_value = "pupil")]
    pub mode: ModeArg,

    /// Give up and stop the tour after this many seconds
    #[arg(long, default_value_t = 60)]
    pub timeout_secs: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlayReport {
    completed: bool,
    state: PlaybackState,
}

pub async fn cmd_play(args: PlayArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let page = read_page(&args.dom).await?;
    let mut tour = read_tour(&args.tour).await?;
    tour.normalize();
    let tour = Arc::new(tour);

    let player = TourPlayer::new(
        page.dom.clone(),
        page.editor.clone(),
        PlaybackSession::new(),
        ctx.playback_config(),
    );
    let mut events = player.subscribe();
    let deadline = Instant::now() + Duration::from_secs(args.timeout_secs);

    // An unrecoverable first step still reports through the event stream.
    if let Err(err) = player.start_tour(tour.as_ref().clone(), args.mode.into()).await {
        if player.snapshot().tour_error.is_none() {
            return Err(err.into());
        }
    }

    let mut completed = false;
    loop {
        let event = match timeout_at(deadline, events.recv()).await {
            Err(_) => {
                warn!(secs = args.timeout_secs, "playback timed out; stopping tour");
                player.stop();
                break;
            }
            Ok(Err(RecvError::Lagged(missed))) => {
                warn!(missed, "playback events dropped");
                continue;
            }
            Ok(Err(RecvError::Closed)) => break,
            Ok(Ok(event)) => event,
        };

        emit_line(output, &event, |event| println!("{}", describe(event, &tour)))?;

        match &event {
            PlaybackEvent::TourEnded { completed: done } => {
                completed = *done;
                break;
            }
            _ if !args.auto_confirm => {
                if let PlaybackEvent::StepFailed { index, .. } = &event {
                    debug!(step = index, "step failed; stopping");
                    player.stop();
                }
            }
            _ => drive(&player, &page, ctx, &tour, &event).await,
        }
    }

    let state = player.snapshot();
    let report = PlayReport { completed, state };
    emit_line(output, &report, |report| {
        let status = if report.completed { "completed" } else { "ended early" };
        println!("Tour {status}");
        if !report.state.skipped_steps.is_empty() {
            let skipped: Vec<String> = report
                .state
                .skipped_steps
                .iter()
                .map(|index| (index + 1).to_string())
                .collect();
            println!("  skipped steps: {}", skipped.join(", "));
        }
    })?;

    if let Some(error) = report.state.tour_error {
        bail!(error);
    }
    Ok(())
}

/// React to `event` the way an attentive learner would.
async fn drive(
    player: &TourPlayer,
    page: &LoadedPage,
    ctx: &CliContext,
    tour: &Tour,
    event: &PlaybackEvent,
) {
    let result = match event {
        PlaybackEvent::StepFailed { index, .. } => {
            debug!(step = index, "repeating failed step");
            player.repeat().await
        }
        PlaybackEvent::StepResolved { index, .. } if step_at(tour, *index).completion.is_none() => {
            player.next().await
        }
        PlaybackEvent::PreconditionsApplied { index, .. } if stalls_without_target(step_at(tour, *index)) => {
            player.next().await
        }
        PlaybackEvent::WatchingCompletion { index, .. } => {
            let kind = step_at(tour, *index)
                .completion
                .as_ref()
                .map_or(CompletionType::Manual, |completion| completion.kind);
            match kind {
                CompletionType::Manual | CompletionType::Unknown => {
                    if player.confirm() {
                        Ok(())
                    } else {
                        player.next().await
                    }
                }
                CompletionType::ClickTarget => {
                    let config = ctx.playback_config();
                    sleep(config.click_grace() + config.poll_interval()).await;
                    let state = player.snapshot();
                    match state.resolved_element {
                        Some(element) if state.current_step_index == Some(*index) => {
                            if let Err(err) = page.dom.click(element) {
                                warn!(step = index, error = %err, "simulated click failed");
                            }
                            Ok(())
                        }
                        _ => Ok(()),
                    }
                }
                _ => player.next().await,
            }
        }
        _ => Ok(()),
    };

    if let Err(err) = result {
        debug!(error = %err, "playback command rejected");
    }
}

fn step_at(tour: &Tour, index: usize) -> &Step {
    &tour.steps[index.min(tour.steps.len().saturating_sub(1))]
}

/// Steps with nothing to point at and nothing the watcher can wait for.
fn stalls_without_target(step: &Step) -> bool {
    step.target.is_empty()
        && step
            .completion
            .as_ref()
            .map_or(true, |completion| completion.kind.needs_target())
}

fn describe(event: &PlaybackEvent, tour: &Tour) -> String {
    let title = |index: &usize| {
        tour.steps
            .get(*index)
            .map(|step| step.title.as_str())
            .unwrap_or("?")
    };
    match event {
        PlaybackEvent::TourStarted { step_count } => {
            format!("Starting \"{}\" ({step_count} steps)", tour.title)
        }
        PlaybackEvent::StepEntered { index, entry } => {
            format!("Step {}: {} [{entry:?}]", index + 1, title(index))
        }
        PlaybackEvent::PreconditionsApplied {
            index,
            success,
            failed,
        } => {
            if *success {
                format!("  step {}: preconditions applied", index + 1)
            } else {
                format!("  step {}: {failed} precondition(s) failed", index + 1)
            }
        }
        PlaybackEvent::StepResolved {
            index,
            locator,
            recovered,
            ..
        } => {
            let note = if *recovered { " after recovery" } else { "" };
            format!("  step {}: target found via {locator}{note}", index + 1)
        }
        PlaybackEvent::StepFailed { index, error } => {
            format!("  step {}: target not found: {error}", index + 1)
        }
        PlaybackEvent::WatchingCompletion { index, rule } => {
            format!("  step {}: waiting for {rule}", index + 1)
        }
        PlaybackEvent::StepCompleted { index, event } => match event {
            Some(event) => format!("  step {}: completed ({event})", index + 1),
            None => format!("  step {}: completed", index + 1),
        },
        PlaybackEvent::LookedAhead { index, result } => format!(
            "  step {}: waited for next block {} ({})",
            index + 1,
            result.block_type.as_deref().unwrap_or("-"),
            if result.success { "present" } else { "timed out" }
        ),
        PlaybackEvent::StepSkipped { index } => format!("  step {}: skipped", index + 1),
        PlaybackEvent::TourEnded { completed } => {
            if *completed {
                "Tour finished".to_string()
            } else {
                "Tour stopped".to_string()
            }
        }
        PlaybackEvent::TourError { error } => format!("Error: {error}"),
    }
}
