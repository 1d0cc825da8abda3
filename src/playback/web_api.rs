use super::sdk::PlayerState;
use crate::config::ProviderConfig;
use crate::error::{AnimaError, Result};
use crate::models::Track;
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace};

/// Entitlement-denied reason reported on 403 responses
pub const PREMIUM_REQUIRED_REASON: &str = "PREMIUM_REQUIRED";

/// Raw outcome of a provider command; status classification is the caller's job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

impl ProviderResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn error_detail(&self) -> Option<ProviderErrorDetail> {
        serde_json::from_str::<ProviderErrorBody>(&self.body)
            .ok()
            .map(|body| body.error)
    }

    /// Machine-readable rejection reason, e.g. `PREMIUM_REQUIRED`
    pub fn error_reason(&self) -> Option<String> {
        self.error_detail().and_then(|detail| detail.reason)
    }

    /// Provider message, falling back to the raw body
    pub fn error_message(&self) -> String {
        self.error_detail()
            .and_then(|detail| detail.message)
            .unwrap_or_else(|| {
                if self.body.is_empty() {
                    format!("status {}", self.status)
                } else {
                    self.body.clone()
                }
            })
    }
}

/// Provider REST surface used by the play command
#[async_trait]
pub trait PlaybackApi: Send + Sync {
    /// Scope playback to `device_id` without starting it
    async fn transfer(&self, device_id: &str, token: &str) -> Result<ProviderResponse>;

    /// Start `uri` on `device_id` from position 0
    async fn play(&self, device_id: &str, uri: &str, token: &str) -> Result<ProviderResponse>;

    /// Id of the device the provider currently considers active
    async fn active_device_id(&self, token: &str) -> Result<Option<String>>;
}

#[derive(Debug, Serialize)]
struct TransferRequest<'a> {
    device_ids: [&'a str; 1],
    play: bool,
}

#[derive(Debug, Serialize)]
struct PlayRequest<'a> {
    device_id: &'a str,
    uris: [&'a str; 1],
    position_ms: u64,
}

/// Entry of the provider's device list
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ConnectDevice {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
struct DevicesResponse {
    #[serde(default)]
    devices: Vec<ConnectDevice>,
}

#[derive(Debug, Deserialize)]
struct PlaybackStateResponse {
    #[serde(default)]
    device: Option<ConnectDevice>,
    #[serde(default)]
    is_playing: bool,
    #[serde(default)]
    progress_ms: Option<u64>,
    #[serde(default)]
    item: Option<PlaybackItem>,
}

#[derive(Debug, Deserialize)]
struct PlaybackItem {
    uri: String,
    name: String,
    #[serde(default)]
    duration_ms: u64,
    #[serde(default)]
    artists: Vec<NamedEntity>,
    #[serde(default)]
    album: Option<AlbumEntity>,
    #[serde(default)]
    external_urls: Option<ExternalUrls>,
}

#[derive(Debug, Deserialize)]
struct NamedEntity {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AlbumEntity {
    name: String,
    #[serde(default)]
    images: Vec<ImageEntity>,
}

#[derive(Debug, Deserialize)]
struct ImageEntity {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ExternalUrls {
    #[serde(default)]
    spotify: Option<String>,
}

impl PlaybackItem {
    fn into_track(self) -> Track {
        let artist = self
            .artists
            .iter()
            .map(|artist| artist.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let (album, album_image) = match self.album {
            Some(album) => (album.name, album.images.into_iter().next().map(|i| i.url)),
            None => (String::new(), None),
        };
        Track {
            uri: self.uri,
            name: self.name,
            artist,
            album,
            album_image,
            external_url: self.external_urls.and_then(|urls| urls.spotify),
        }
    }
}

/// Currently-playing snapshot together with the device it is playing on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentPlayback {
    pub device_id: Option<String>,
    pub state: PlayerState,
}

/// reqwest client for the provider's Web API
#[derive(Clone)]
pub struct SpotifyWebApi {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl SpotifyWebApi {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AnimaError::system(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: &ProviderConfig) -> Self {
        Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            timeout: config.request_timeout(),
        }
    }

    fn request(&self, method: Method, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .timeout(self.timeout)
    }

    async fn send(&self, request: reqwest::RequestBuilder, operation: &str) -> Result<ProviderResponse> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AnimaError::timeout(operation, self.timeout)
            } else {
                AnimaError::from(e)
            }
        })?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        trace!("Provider {} -> {}", operation, status);
        Ok(ProviderResponse { status, body })
    }

    /// Turn a non-2xx control response into an error
    fn ensure_success(response: ProviderResponse, operation: &str) -> Result<ProviderResponse> {
        if response.is_success() {
            return Ok(response);
        }
        match response.status {
            401 => Err(AnimaError::PermissionDenied {
                details: format!("{}: {}", operation, response.error_message()),
            }),
            404 => Err(AnimaError::DeviceNotReady),
            status => Err(AnimaError::PlaybackFailed {
                status: Some(status),
                details: format!("{}: {}", operation, response.error_message()),
            }),
        }
    }

    pub async fn devices(&self, token: &str) -> Result<Vec<ConnectDevice>> {
        let response = self
            .send(self.request(Method::GET, "/me/player/devices", token), "device list")
            .await?;
        let response = Self::ensure_success(response, "device list")?;
        let body: DevicesResponse = serde_json::from_str(&response.body)?;
        Ok(body.devices)
    }

    /// What is playing right now, `None` when nothing is (HTTP 204)
    pub async fn current_playback(&self, token: &str) -> Result<Option<CurrentPlayback>> {
        let response = self
            .send(self.request(Method::GET, "/me/player", token), "playback state")
            .await?;
        let response = Self::ensure_success(response, "playback state")?;
        if response.status == 204 || response.body.trim().is_empty() {
            return Ok(None);
        }

        let body: PlaybackStateResponse = serde_json::from_str(&response.body)?;
        let duration_ms = body.item.as_ref().map(|item| item.duration_ms).unwrap_or(0);
        Ok(Some(CurrentPlayback {
            device_id: body.device.and_then(|device| device.id),
            state: PlayerState {
                track: body.item.map(PlaybackItem::into_track),
                paused: !body.is_playing,
                position_ms: body.progress_ms.unwrap_or(0),
                duration_ms,
            },
        }))
    }

    pub async fn pause(&self, device_id: &str, token: &str) -> Result<()> {
        let request = self
            .request(Method::PUT, "/me/player/pause", token)
            .query(&[("device_id", device_id)]);
        Self::ensure_success(self.send(request, "pause").await?, "pause").map(|_| ())
    }

    /// Resume the current context without changing what is queued
    pub async fn resume(&self, device_id: &str, token: &str) -> Result<()> {
        let request = self
            .request(Method::PUT, "/me/player/play", token)
            .query(&[("device_id", device_id)]);
        Self::ensure_success(self.send(request, "resume").await?, "resume").map(|_| ())
    }

    pub async fn next(&self, device_id: &str, token: &str) -> Result<()> {
        let request = self
            .request(Method::POST, "/me/player/next", token)
            .query(&[("device_id", device_id)]);
        Self::ensure_success(self.send(request, "next track").await?, "next track").map(|_| ())
    }

    pub async fn previous(&self, device_id: &str, token: &str) -> Result<()> {
        let request = self
            .request(Method::POST, "/me/player/previous", token)
            .query(&[("device_id", device_id)]);
        Self::ensure_success(self.send(request, "previous track").await?, "previous track")
            .map(|_| ())
    }

    pub async fn seek(&self, device_id: &str, position_ms: u64, token: &str) -> Result<()> {
        let position = position_ms.to_string();
        let request = self
            .request(Method::PUT, "/me/player/seek", token)
            .query(&[("device_id", device_id), ("position_ms", position.as_str())]);
        Self::ensure_success(self.send(request, "seek").await?, "seek").map(|_| ())
    }
}

#[async_trait]
impl PlaybackApi for SpotifyWebApi {
    async fn transfer(&self, device_id: &str, token: &str) -> Result<ProviderResponse> {
        debug!("Transferring playback to device {}", device_id);
        let request = self
            .request(Method::PUT, "/me/player", token)
            .json(&TransferRequest {
                device_ids: [device_id],
                play: false,
            });
        self.send(request, "device transfer").await
    }

    async fn play(&self, device_id: &str, uri: &str, token: &str) -> Result<ProviderResponse> {
        debug!("Requesting playback of {} on {}", uri, device_id);
        let request = self
            .request(Method::PUT, "/me/player/play", token)
            .json(&PlayRequest {
                device_id,
                uris: [uri],
                position_ms: 0,
            });
        self.send(request, "play").await
    }

    async fn active_device_id(&self, token: &str) -> Result<Option<String>> {
        let devices = self.devices(token).await?;
        Ok(devices
            .into_iter()
            .find(|device| device.is_active)
            .and_then(|device| device.id))
    }
}

#[cfg(test)]
pub(crate) fn premium_required_body() -> String {
    serde_json::json!({
        "error": {
            "status": 403,
            "message": "Player command failed: Premium required",
            "reason": PREMIUM_REQUIRED_REASON
        }
    })
    .to_string()
}
