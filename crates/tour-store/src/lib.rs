//! Tour/Step store
//!
//! [`TourStore`] owns the tour being authored: step add/update/delete/move/
//! duplicate with dense ordering, picker mode (capture a clicked element
//! into a step's target), AI step drafting and generated tours, and
//! persistence through a [`TourApi`]. [`HttpTourApi`] is the REST client.

pub mod api;
pub mod errors;
pub mod store;
pub mod types;

pub use api::{ApiConfig, HttpTourApi, TourApi};
pub use errors::StoreError;
pub use store::TourStore;
pub use types::{AiTask, AiTourRequest, DraftRequest, StepDraft, StoreState};
