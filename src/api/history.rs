use super::client::BackendClient;
use super::tokens::TokenStore;
use crate::error::{AnimaError, Result};
use crate::events::{AnimaEvent, EventBus};
use crate::models::{HistoryRecord, Track};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const RECORD_PATH: &str = "/api/playback/add";
const RECENT_PATH: &str = "/api/playback/recent";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordRequest<'a> {
    track_uri: &'a str,
    track_name: &'a str,
    artist: &'a str,
    album: &'a str,
    album_image: Option<&'a str>,
    external_url: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RecentResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    tracks: Option<Vec<HistoryRecord>>,
}

/// Appends successful plays to the remote log and keeps the recent list fresh
pub struct HistoryRecorder {
    backend: BackendClient,
    tokens: TokenStore,
    event_bus: Arc<EventBus>,
    recent_limit: usize,
    recent: RwLock<Vec<HistoryRecord>>,
}

impl HistoryRecorder {
    pub fn new(
        backend: BackendClient,
        tokens: TokenStore,
        event_bus: Arc<EventBus>,
        recent_limit: usize,
    ) -> Self {
        Self {
            backend,
            tokens,
            event_bus,
            recent_limit,
            recent: RwLock::new(Vec::new()),
        }
    }

    /// Append a play to the log. Best-effort: failures are logged, never returned.
    pub async fn record(&self, track: &Track) -> bool {
        let token = match self.tokens.backend() {
            Some(token) => token,
            None => {
                warn!("Cannot record {} in history: no backend token", track.uri);
                return false;
            }
        };

        let body = RecordRequest {
            track_uri: &track.uri,
            track_name: &track.name,
            artist: &track.artist,
            album: &track.album,
            album_image: track.album_image.as_deref(),
            external_url: track.external_url.as_deref(),
        };

        let response = self.backend.post(RECORD_PATH, &token).json(&body).send().await;
        match response {
            Ok(response) if response.status().is_success() => {
                info!("Recorded {} in playback history", track.name);
                self.event_bus.publish(AnimaEvent::HistoryRecorded {
                    track_uri: track.uri.clone(),
                });
            }
            Ok(response) => {
                warn!(
                    "History append for {} returned status {}",
                    track.uri,
                    response.status()
                );
                return false;
            }
            Err(e) => {
                warn!("History append for {} failed: {}", track.uri, e);
                return false;
            }
        }

        if let Err(e) = self.refresh().await {
            warn!("Failed to refresh recent plays: {}", e);
        }
        true
    }

    /// Fetch the most recent `limit` plays, newest first.
    ///
    /// An empty or absent list is a valid "no history yet" answer.
    pub async fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>> {
        let token = self.tokens.require_backend()?;

        let response = self
            .backend
            .get(RECENT_PATH, &token)
            .query(&[("limit", limit)])
            .send()
            .await
            .map_err(|e| self.backend.transport_error(e, "recent plays"))?;

        let status = response.status();
        if !status.is_success() {
            let details = BackendClient::error_message(response)
                .await
                .unwrap_or_else(|| format!("status {}", status));
            return Err(AnimaError::network(format!(
                "Error al cargar historial: {}",
                details
            )));
        }

        let body: RecentResponse = response
            .json()
            .await
            .map_err(|e| self.backend.transport_error(e, "recent plays"))?;

        let mut records = if body.success {
            body.tracks.unwrap_or_default()
        } else {
            Vec::new()
        };

        // Newest first; undated records sink to the end in server order
        records.sort_by_key(|record| std::cmp::Reverse(record.played_at));
        records.truncate(limit);

        if records.is_empty() {
            debug!("No playback history yet");
        }
        Ok(records)
    }

    /// Reload the cached recent list with the configured limit
    pub async fn refresh(&self) -> Result<Vec<HistoryRecord>> {
        let records = self.recent(self.recent_limit).await?;
        *self.recent.write() = records.clone();
        Ok(records)
    }

    /// Last loaded recent list
    pub fn cached_recent(&self) -> Vec<HistoryRecord> {
        self.recent.read().clone()
    }

    pub fn recent_limit(&self) -> usize {
        self.recent_limit
    }
}
