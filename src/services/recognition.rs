use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::models::queue::QueueItem;

/// Downstream consumer of recognition work.
///
/// The face-matching pipeline itself is opaque to this crate; processing an
/// item means handing the stored photo's reference to the recognition
/// service and waiting for acknowledgement.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn process(&self, item: &QueueItem) -> Result<(), RecognitionError>;
}

/// HTTP client for the face recognition service.
pub struct FaceApiClient {
    http: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ProcessResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

impl FaceApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Recognizer for FaceApiClient {
    /// Submit a stored photo for face extraction and indexing.
    async fn process(&self, item: &QueueItem) -> Result<(), RecognitionError> {
        let url = format!("{}/process", self.base_url);

        let body = serde_json::json!({
            "photo_id": item.photo_id,
            "photo_ref": item.storage_key,
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(RecognitionError::Http)?;

        if !response.status().is_success() {
            return Err(RecognitionError::Service(format!(
                "recognition service returned {}",
                response.status()
            )));
        }

        let parsed: ProcessResponse = response.json().await.map_err(RecognitionError::Http)?;
        if parsed.status != "ok" {
            return Err(RecognitionError::Service(
                parsed.error.unwrap_or_else(|| parsed.status.clone()),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Recognition service error: {0}")]
    Service(String),
}
