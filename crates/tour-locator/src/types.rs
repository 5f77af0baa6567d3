//! Resolution results and the recovery seam

use async_trait::async_trait;
use serde::Serialize;
use tour_dom::{ElementHandle, SearchScope};
use tourguide_core_types::Locator;

/// A target resolved to exactly one element.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub element: ElementHandle,
    pub used_locator: Locator,
    /// Document the search ran against.
    pub scope: SearchScope,
    /// Candidates left after filtering, for the locator that won.
    pub candidates: usize,
    /// Found only after the recovery hook ran.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub recovered: bool,
}

/// Invoked between the first failed resolution and the single retry.
#[async_trait]
pub trait RecoveryHook: Send + Sync {
    async fn recover(&self);
}
