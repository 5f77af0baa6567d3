//! Tour persistence and AI drafting services

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use tourguide_core_types::{Tour, TourId};

use crate::errors::StoreError;
use crate::types::{AiTask, AiTourRequest, DraftRequest, StepDraft};

/// The remote collaborators the store talks to.
#[async_trait]
pub trait TourApi: Send + Sync {
    /// `GET /tours`
    async fn list_tours(&self) -> Result<Vec<Tour>, StoreError>;

    /// `GET /tours/{id}`
    async fn get_tour(&self, id: TourId) -> Result<Tour, StoreError>;

    /// `POST /tours`; the response carries the assigned id.
    async fn create_tour(&self, tour: &Tour) -> Result<Tour, StoreError>;

    /// `PUT /tours/{id}`
    async fn update_tour(&self, id: TourId, tour: &Tour) -> Result<Tour, StoreError>;

    /// `POST /ai/generate-draft`
    async fn generate_draft(&self, request: &DraftRequest) -> Result<StepDraft, StoreError>;

    /// `POST /ai/generate-tour`
    async fn generate_tour(&self, request: &AiTourRequest) -> Result<Tour, StoreError>;

    /// `GET /ai/tasks`
    async fn ai_tasks(&self) -> Result<Vec<AiTask>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// REST namespace root, e.g. `https://example.com/wp-json/tourguide/v1`.
    pub base_url: String,
    pub timeout_ms: u64,
    /// Sent as `X-WP-Nonce` when present.
    pub nonce: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/wp-json/tourguide/v1".to_string(),
            timeout_ms: 30_000,
            nonce: None,
        }
    }
}

/// [`TourApi`] over HTTP with JSON bodies.
pub struct HttpTourApi {
    client: Client,
    config: ApiConfig,
}

/// Error body shape used by the REST backend.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl HttpTourApi {
    pub fn new(config: ApiConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| StoreError::Config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.nonce {
            Some(nonce) => request.header("X-WP-Nonce", nonce),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StoreError> {
        let response = self.authorize(request).send().await?;
        let response = check_status(response).await?;
        Ok(response.json::<T>().await?)
    }
}

async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "<response unavailable>".to_string());
    let message = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(ErrorBody {
            message: Some(message),
            ..
        }) => message,
        Ok(ErrorBody {
            code: Some(code), ..
        }) => code,
        _ => text,
    };
    warn!(status = status.as_u16(), %message, "tour service request failed");
    Err(StoreError::http(status.as_u16(), message))
}

#[async_trait]
impl TourApi for HttpTourApi {
    async fn list_tours(&self) -> Result<Vec<Tour>, StoreError> {
        debug!("fetching tours");
        self.send(self.client.get(self.url("tours"))).await
    }

    async fn get_tour(&self, id: TourId) -> Result<Tour, StoreError> {
        debug!(%id, "fetching tour");
        match self.send(self.client.get(self.url(&format!("tours/{id}")))).await {
            Err(StoreError::Http { status: 404, .. }) => Err(StoreError::TourNotFound(id)),
            other => other,
        }
    }

    async fn create_tour(&self, tour: &Tour) -> Result<Tour, StoreError> {
        debug!(title = %tour.title, "creating tour");
        self.send(self.client.post(self.url("tours")).json(tour)).await
    }

    async fn update_tour(&self, id: TourId, tour: &Tour) -> Result<Tour, StoreError> {
        debug!(%id, "updating tour");
        self.send(self.client.put(self.url(&format!("tours/{id}"))).json(tour))
            .await
    }

    async fn generate_draft(&self, request: &DraftRequest) -> Result<StepDraft, StoreError> {
        self.send(self.client.post(self.url("ai/generate-draft")).json(request))
            .await
    }

    async fn generate_tour(&self, request: &AiTourRequest) -> Result<Tour, StoreError> {
        self.send(self.client.post(self.url("ai/generate-tour")).json(request))
            .await
    }

    async fn ai_tasks(&self) -> Result<Vec<AiTask>, StoreError> {
        self.send(self.client.get(self.url("ai/tasks"))).await
    }
}
