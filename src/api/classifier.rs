//! Remote emotion classification.
//!
//! One request per image and no retry: the endpoint records the
//! analysis server-side, so a blind retry after an ambiguous failure
//! could store it twice.

use super::client::BackendClient;
use crate::error::{AnimaError, Result};
use crate::models::{CapturedImage, EmotionResult, Track};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const ANALYZE_PATH: &str = "/emociones/analizar";
const PROVIDER_TOKEN_HEADER: &str = "x-spotify-token";
const DEFAULT_FAILURE_REASON: &str = "No se pudo analizar la emoción";

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    image: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    emotion: EmotionResult,
    #[serde(default)]
    playlist: Option<Vec<Track>>,
}

/// Emotion plus the candidate tracks recommended for it
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub emotion: EmotionResult,
    /// Empty when the provider account is not linked
    pub tracks: Vec<Track>,
}

impl Classification {
    pub fn has_playlist(&self) -> bool {
        !self.tracks.is_empty()
    }
}

/// Request/response wrapper around the classification endpoint
#[derive(Clone)]
pub struct EmotionClassifierClient {
    backend: BackendClient,
}

impl EmotionClassifierClient {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }

    pub async fn classify(
        &self,
        image: &CapturedImage,
        auth_token: &str,
        provider_token: Option<&str>,
    ) -> Result<Classification> {
        let data_url = image.to_data_url();
        debug!(
            "Submitting {} byte image for classification",
            image.len()
        );

        let response = self
            .backend
            .post(ANALYZE_PATH, auth_token)
            .header(PROVIDER_TOKEN_HEADER, provider_token.unwrap_or(""))
            .json(&AnalyzeRequest { image: &data_url })
            .send()
            .await
            .map_err(|e| self.backend.transport_error(e, "emotion classification"))?;

        let status = response.status();
        if !status.is_success() {
            let reason = BackendClient::error_message(response)
                .await
                .unwrap_or_else(|| DEFAULT_FAILURE_REASON.to_string());
            warn!("Classification failed with status {}: {}", status, reason);
            return Err(AnimaError::ClassificationFailed { reason });
        }

        let body: AnalyzeResponse = response
            .json()
            .await
            .map_err(|e| self.backend.transport_error(e, "emotion classification"))?;

        let tracks = body.playlist.unwrap_or_default();
        info!(
            "Detected {} ({:.1}%), {} candidate tracks",
            body.emotion.name,
            body.emotion.confidence,
            tracks.len()
        );

        Ok(Classification {
            emotion: body.emotion,
            tracks,
        })
    }
}
