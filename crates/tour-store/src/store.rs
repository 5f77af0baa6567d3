//! Authoring state for one tour
//!
//! Holds the tour being edited, picker mode and the AI generation state.
//! Service calls never run under the state lock: inputs are copied out,
//! the request is awaited, and the result is written back. Every edit bumps
//! a revision, so a save only replaces the open tour when nothing changed
//! while it was in flight.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use tour_dom::{DomPort, ElementHandle};
use tour_locator::{capture, capture_element_context};
use tourguide_core_types::{Step, StepId, Target, Tour, TourId};

use crate::api::TourApi;
use crate::errors::StoreError;
use crate::types::{AiTask, AiTourRequest, DraftRequest, StepDraft, StoreState};

#[derive(Default)]
struct Authoring {
    tours: Vec<Tour>,
    current: Option<Tour>,
    dirty: bool,
    /// Bumped by every edit of the open tour.
    revision: u64,
    /// Bumped whenever a different tour is opened.
    opened: u64,
    saving: bool,
    picking: Option<StepId>,
    drafting: Option<StepId>,
    generating: bool,
    last_ai_request: Option<AiTourRequest>,
    ai_tour_error: Option<String>,
    last_failure_context: Option<Value>,
    last_error: Option<String>,
}

impl Authoring {
    fn touch(&mut self) {
        self.dirty = true;
        self.revision += 1;
    }

    fn tour_mut(&mut self) -> Result<&mut Tour, StoreError> {
        self.current.as_mut().ok_or(StoreError::NoTour)
    }

    fn step_mut(&mut self, id: &StepId) -> Result<&mut Step, StoreError> {
        let tour = self.tour_mut()?;
        tour.steps
            .iter_mut()
            .find(|step| &step.id == id)
            .ok_or_else(|| StoreError::UnknownStep(id.clone()))
    }

    fn position(&self, id: &StepId) -> Result<usize, StoreError> {
        self.current
            .as_ref()
            .ok_or(StoreError::NoTour)?
            .step_index(id)
            .ok_or_else(|| StoreError::UnknownStep(id.clone()))
    }

    /// Record a service failure for the presentation layer and pass it on.
    fn failed(&mut self, err: StoreError) -> StoreError {
        self.last_error = Some(err.to_string());
        err
    }
}

pub struct TourStore {
    api: Arc<dyn TourApi>,
    dom: Arc<dyn DomPort>,
    post_type: String,
    state: Mutex<Authoring>,
}

impl TourStore {
    pub fn new(api: Arc<dyn TourApi>, dom: Arc<dyn DomPort>, post_type: impl Into<String>) -> Self {
        Self {
            api,
            dom,
            post_type: post_type.into(),
            state: Mutex::new(Authoring::default()),
        }
    }

    pub fn state(&self) -> StoreState {
        let state = self.state.lock();
        StoreState {
            tour_id: state.current.as_ref().and_then(|tour| tour.id),
            step_count: state.current.as_ref().map_or(0, |tour| tour.steps.len()),
            is_dirty: state.dirty,
            is_saving: state.saving,
            is_picker_active: state.picking.is_some(),
            picking_step_id: state.picking.clone(),
            drafting_step_id: state.drafting.clone(),
            is_generating: state.generating,
            ai_tour_error: state.ai_tour_error.clone(),
            last_failure_context: state.last_failure_context.clone(),
            last_error: state.last_error.clone(),
        }
    }

    pub fn current(&self) -> Option<Tour> {
        self.state.lock().current.clone()
    }

    /// Tours from the last `load_tours`.
    pub fn tours(&self) -> Vec<Tour> {
        self.state.lock().tours.clone()
    }

    // ---- persistence ----

    pub async fn load_tours(&self) -> Result<Vec<Tour>, StoreError> {
        match self.api.list_tours().await {
            Ok(mut tours) => {
                tours.iter_mut().for_each(Tour::normalize);
                info!(count = tours.len(), "tours loaded");
                let mut state = self.state.lock();
                state.tours = tours.clone();
                state.last_error = None;
                Ok(tours)
            }
            Err(err) => Err(self.state.lock().failed(err)),
        }
    }

    /// Fetch a tour and make it the one being edited.
    pub async fn load_tour(&self, id: TourId) -> Result<Tour, StoreError> {
        match self.api.get_tour(id).await {
            Ok(mut tour) => {
                tour.normalize();
                self.edit(tour.clone());
                Ok(tour)
            }
            Err(err) => Err(self.state.lock().failed(err)),
        }
    }

    /// Replace the tour being edited; leaves picker mode.
    pub fn edit(&self, mut tour: Tour) {
        tour.normalize();
        let mut state = self.state.lock();
        state.current = Some(tour);
        state.dirty = false;
        state.opened += 1;
        state.picking = None;
        state.drafting = None;
    }

    pub fn new_tour(&self, title: impl Into<String>) {
        let mut tour = Tour::new(title);
        tour.post_types = vec![self.post_type.clone()];
        self.edit(tour);
        self.state.lock().touch();
    }

    /// Create or update the tour on the server. Generated tours are refused.
    ///
    /// Edits made while the request is in flight stay in the open tour,
    /// which keeps the server-assigned id and stays dirty.
    pub async fn save_tour(&self) -> Result<Tour, StoreError> {
        let (tour, revision, opened) = {
            let mut state = self.state.lock();
            let tour = state.current.clone().ok_or(StoreError::NoTour)?;
            if tour.ephemeral {
                return Err(StoreError::EphemeralTour);
            }
            state.saving = true;
            (tour, state.revision, state.opened)
        };

        let saved = match tour.id {
            Some(id) => self.api.update_tour(id, &tour).await,
            None => self.api.create_tour(&tour).await,
        };

        let mut state = self.state.lock();
        state.saving = false;
        match saved {
            Ok(mut saved) => {
                saved.normalize();
                info!(id = ?saved.id, steps = saved.steps.len(), "tour saved");
                if let Some(id) = saved.id {
                    match state.tours.iter().position(|tour| tour.id == Some(id)) {
                        Some(index) => state.tours[index] = saved.clone(),
                        None => state.tours.push(saved.clone()),
                    }
                }
                if state.opened != opened {
                    debug!("another tour was opened while saving");
                } else if state.revision == revision {
                    state.current = Some(saved.clone());
                    state.dirty = false;
                } else if let Some(current) = state.current.as_mut() {
                    debug!("tour edited while saving; keeping local edits");
                    current.id = saved.id;
                }
                state.last_error = None;
                Ok(saved)
            }
            Err(err) => Err(state.failed(err)),
        }
    }

    // ---- step authoring ----

    /// Append a step; returns its id.
    pub fn add_step(&self, step: Step) -> Result<StepId, StoreError> {
        let mut state = self.state.lock();
        let tour = state.tour_mut()?;
        let id = step.id.clone();
        tour.steps.push(step);
        tour.reindex();
        state.touch();
        Ok(id)
    }

    pub fn update_step(&self, id: &StepId, update: impl FnOnce(&mut Step)) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let step = state.step_mut(id)?;
        let keep = (step.id.clone(), step.order);
        update(step);
        (step.id, step.order) = keep;
        state.touch();
        Ok(())
    }

    pub fn delete_step(&self, id: &StepId) -> Result<Step, StoreError> {
        let mut state = self.state.lock();
        let index = state.position(id)?;
        let tour = state.tour_mut()?;
        let removed = tour.steps.remove(index);
        tour.reindex();
        if state.picking.as_ref() == Some(id) {
            state.picking = None;
        }
        state.touch();
        Ok(removed)
    }

    /// Move a step to position `to`, shifting the others.
    pub fn move_step(&self, id: &StepId, to: usize) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let from = state.position(id)?;
        let tour = state.tour_mut()?;
        if to >= tour.steps.len() {
            return Err(StoreError::StepOutOfRange(to));
        }
        let step = tour.steps.remove(from);
        tour.steps.insert(to, step);
        tour.reindex();
        state.touch();
        Ok(())
    }

    /// Copy a step under a fresh id, right after the original.
    pub fn duplicate_step(&self, id: &StepId) -> Result<StepId, StoreError> {
        let mut state = self.state.lock();
        let index = state.position(id)?;
        let tour = state.tour_mut()?;
        let mut copy = tour.steps[index].clone();
        copy.id = StepId::new();
        let new_id = copy.id.clone();
        tour.steps.insert(index + 1, copy);
        tour.reindex();
        state.touch();
        Ok(new_id)
    }

    // ---- picker ----

    pub fn start_picking(&self, id: &StepId) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.position(id)?;
        debug!(step = %id, "picker active");
        state.picking = Some(id.clone());
        Ok(())
    }

    pub fn cancel_picking(&self) {
        self.state.lock().picking = None;
    }

    /// Capture `element` into the picking step's target and leave picker mode.
    pub fn complete_pick(&self, element: ElementHandle) -> Result<Target, StoreError> {
        let id = self.state.lock().picking.clone().ok_or(StoreError::NotPicking)?;
        let target = capture(self.dom.as_ref(), element);

        let mut state = self.state.lock();
        state.picking = None;
        let step = state.step_mut(&id)?;
        step.target = target.clone();
        state.touch();
        info!(step = %id, locators = target.locators.len(), "element picked");
        Ok(target)
    }

    // ---- AI drafting ----

    /// Ask the drafting service for step copy based on `element`, and merge
    /// whatever it suggests into the step.
    pub async fn request_step_draft(
        &self,
        id: &StepId,
        element: ElementHandle,
    ) -> Result<StepDraft, StoreError> {
        {
            let mut state = self.state.lock();
            state.position(id)?;
            state.drafting = Some(id.clone());
        }
        let request = DraftRequest {
            element_context: capture_element_context(self.dom.as_ref(), element),
            post_type: self.post_type.clone(),
        };
        let result = self.api.generate_draft(&request).await;

        let mut state = self.state.lock();
        state.drafting = None;
        let draft = result.map_err(|err| state.failed(err))?;
        let step = state.step_mut(id)?;
        if let Some(title) = draft.title.as_ref().filter(|title| !title.trim().is_empty()) {
            step.title = title.clone();
        }
        if let Some(content) = draft.content.as_ref().filter(|content| !content.trim().is_empty()) {
            step.content = content.clone();
        }
        if let Some(completion) = &draft.completion {
            step.completion = Some(completion.clone());
        }
        state.touch();
        Ok(draft)
    }

    pub async fn fetch_ai_tasks(&self) -> Result<Vec<AiTask>, StoreError> {
        self.api
            .ai_tasks()
            .await
            .map_err(|err| self.state.lock().failed(err))
    }

    /// Generate a one-off tour. Failures are kept in `aiTourError`.
    pub async fn generate_ai_tour(&self, mut request: AiTourRequest) -> Result<Tour, StoreError> {
        if request.post_type.is_empty() {
            request.post_type = self.post_type.clone();
        }
        {
            let mut state = self.state.lock();
            state.generating = true;
            state.ai_tour_error = None;
            state.last_ai_request = Some(request.clone());
        }

        let result = self.api.generate_tour(&request).await;
        let mut state = self.state.lock();
        state.generating = false;
        match result {
            Ok(mut tour) if !tour.steps.is_empty() => {
                tour.ephemeral = true;
                tour.id = None;
                tour.normalize();
                info!(title = %tour.title, steps = tour.steps.len(), "generated tour ready");
                state.last_failure_context = None;
                Ok(tour)
            }
            Ok(_) => {
                let err = StoreError::Decode("generated tour has no steps".to_string());
                warn!("{}", err);
                state.ai_tour_error = Some(err.to_string());
                Err(err)
            }
            Err(err) => {
                warn!(error = %err, "tour generation failed");
                state.ai_tour_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Remember why playback of a generated tour failed, for the next retry.
    pub fn record_playback_failure(&self, error: Option<String>, context: Option<Value>) {
        let mut state = self.state.lock();
        if error.is_some() {
            state.ai_tour_error = error;
        }
        if context.is_some() {
            state.last_failure_context = context;
        }
    }

    /// Replay the last generation request with the recorded failure context.
    pub async fn retry_ai_tour(&self) -> Result<Tour, StoreError> {
        let request = {
            let state = self.state.lock();
            let mut request = state
                .last_ai_request
                .clone()
                .ok_or(StoreError::NothingToRetry)?;
            request.failure_context = state.last_failure_context.clone();
            request
        };
        debug!(has_context = request.failure_context.is_some(), "retrying tour generation");
        self.generate_ai_tour(request).await
    }
}
