//! Session orchestration: capture, analyze, play, logout.
//!
//! Every failure is reported twice: returned to the caller and published
//! as an error notification, which is how the presentation layer renders
//! it. No failure here ends the session; only [`AnimaSession::logout`] does.

use crate::analytics::{AnalyticsAggregator, EmotionSummary, HistoryView};
use crate::api::{
    BackendClient, Classification, EmotionClassifierClient, EmotionHistoryClient, HistoryQuery,
    HistoryRecorder, TokenStore,
};
use crate::capture::{CameraBackend, CaptureCloser, CaptureSession, CaptureState};
use crate::config::AnimaConfig;
use crate::error::{AnimaError, Result};
use crate::events::{AnimaEvent, EventBus};
use crate::models::{CapturedImage, HistoryRecord, Track};
use crate::playback::{
    ConnectSdk, DeviceHandle, PlayHistory, PlaybackApi, PlaybackDeviceController, ReadySdk,
    SdkLatch, SpotifyWebApi, TokenSource, TrackPlaybackCommander,
};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Result of analyzing the live image: the emotion and its recommended tracks
pub type AnalysisOutcome = Classification;

/// Number of analysis records loaded for history browsing
const HISTORY_BROWSE_LIMIT: usize = 50;

pub struct AnimaSession {
    config: AnimaConfig,
    tokens: TokenStore,
    event_bus: Arc<EventBus>,
    capture: Mutex<CaptureSession>,
    closer: CaptureCloser,
    backend: BackendClient,
    classifier: EmotionClassifierClient,
    emotions: EmotionHistoryClient,
    history: Arc<HistoryRecorder>,
    device: PlaybackDeviceController,
    commander: TrackPlaybackCommander,
    aggregator: AnalyticsAggregator,
    outcome: RwLock<Option<AnalysisOutcome>>,
}

impl AnimaSession {
    /// Wire a session with explicit playback collaborators
    pub fn new(
        config: AnimaConfig,
        tokens: TokenStore,
        camera: Arc<dyn CameraBackend>,
        sdk: Arc<SdkLatch>,
        playback_api: Arc<dyn PlaybackApi>,
    ) -> Result<Self> {
        config.validate()?;

        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let backend = BackendClient::new(&config.api)?;
        let capture = CaptureSession::new(camera, config.capture.clone(), Arc::clone(&event_bus));
        let closer = capture.closer();

        let history = Arc::new(HistoryRecorder::new(
            backend.clone(),
            tokens.clone(),
            Arc::clone(&event_bus),
            config.history.recent_limit,
        ));

        let device = PlaybackDeviceController::new(
            sdk,
            &config.provider,
            config.playback.clone(),
            Arc::clone(&event_bus),
        );
        let commander = TrackPlaybackCommander::new(
            playback_api,
            device.device(),
            Some(Arc::clone(&history) as Arc<dyn PlayHistory>),
            Arc::clone(&event_bus),
            config.playback.clone(),
        );

        Ok(Self {
            aggregator: AnalyticsAggregator::from_config(&config.analytics)?,
            classifier: EmotionClassifierClient::new(backend.clone()),
            emotions: EmotionHistoryClient::new(backend.clone()),
            config,
            tokens,
            event_bus,
            capture: Mutex::new(capture),
            closer,
            backend,
            history,
            device,
            commander,
            outcome: RwLock::new(None),
        })
    }

    /// Wire a session against the provider's Web API and Connect devices
    pub fn connect(
        config: AnimaConfig,
        tokens: TokenStore,
        camera: Arc<dyn CameraBackend>,
    ) -> Result<Self> {
        let web_api = SpotifyWebApi::new(&config.provider)?;
        let sdk = ConnectSdk::new(
            web_api.clone(),
            Duration::from_millis(config.playback.device_poll_ms),
        );
        let latch = Arc::new(SdkLatch::new(Arc::new(ReadySdk::new(Arc::new(sdk)))));
        Self::new(config, tokens, camera, latch, Arc::new(web_api))
    }

    pub fn config(&self) -> &AnimaConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    fn notify_error(&self, message: impl Into<String>) {
        self.event_bus.publish(AnimaEvent::error(message));
    }

    fn notify_info(&self, message: impl Into<String>) {
        self.event_bus.publish(AnimaEvent::info(message));
    }

    pub async fn capture_state(&self) -> CaptureState {
        self.capture.lock().await.state()
    }

    pub fn is_camera_streaming(&self) -> bool {
        self.closer.is_streaming()
    }

    pub async fn start_camera(&self) -> Result<()> {
        let result = self.capture.lock().await.start().await;
        match &result {
            Ok(()) => self.notify_info("Cámara activada correctamente"),
            Err(e) => {
                warn!("Camera start failed: {}", e);
                self.notify_error("Error al acceder a la cámara");
            }
        }
        result
    }

    pub async fn capture_photo(&self) -> Result<CapturedImage> {
        let mut capture = self.capture.lock().await;
        match capture.capture().await {
            Ok(image) => {
                let image = image.clone();
                self.notify_info("Foto capturada correctamente");
                Ok(image)
            }
            Err(e @ AnimaError::InvalidState { .. }) => {
                self.notify_error("Activa la cámara primero");
                Err(e)
            }
            Err(e) => {
                self.notify_error("Error al capturar foto");
                Err(e)
            }
        }
    }

    pub async fn import_file(&self, data: Vec<u8>, mime_type: &str) -> Result<CapturedImage> {
        let mut capture = self.capture.lock().await;
        match capture.import_file(data, mime_type) {
            Ok(image) => {
                let image = image.clone();
                *self.outcome.write() = None;
                self.notify_info("Imagen cargada correctamente");
                Ok(image)
            }
            Err(e) => {
                self.notify_error(e.user_message());
                Err(e)
            }
        }
    }

    pub async fn retake(&self) {
        self.capture.lock().await.retake();
        *self.outcome.write() = None;
        self.notify_info("Preparando cámara nuevamente...");
    }

    /// Close the capture modal. Stops the camera synchronously, even while
    /// `start_camera` or `capture_photo` is still awaiting.
    pub fn close_capture(&self) {
        self.closer.close();
        *self.outcome.write() = None;
    }

    /// Classify the captured image. On failure the image stays captured so
    /// the user can retry or retake.
    pub async fn analyze(&self) -> Result<AnalysisOutcome> {
        let token = match self.tokens.require_backend() {
            Ok(token) => token,
            Err(e) => {
                self.notify_error(e.user_message());
                return Err(e);
            }
        };

        let image = {
            let capture = self.capture.lock().await;
            match (capture.state(), capture.image()) {
                (CaptureState::Captured, Some(image)) => image.clone(),
                (state, _) => {
                    let e = AnimaError::invalid_state("analyze", state.to_string());
                    self.notify_error("Captura o sube una foto primero");
                    return Err(e);
                }
            }
        };

        self.notify_info("Analizando emoción con inteligencia artificial... 🧠");
        let provider_token = self.tokens.provider();
        let outcome = match self
            .classifier
            .classify(&image, &token, provider_token.as_deref())
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.notify_error(e.user_message());
                return Err(e);
            }
        };

        self.event_bus.publish(AnimaEvent::AnalysisCompleted {
            emotion: outcome.emotion.name.clone(),
            confidence: outcome.emotion.confidence,
            track_count: outcome.tracks.len(),
        });
        if outcome.has_playlist() {
            self.notify_info(format!(
                "✅ Playlist generada con {} canciones",
                outcome.tracks.len()
            ));
        } else {
            debug!("Analysis returned no playlist; provider account not linked");
        }

        *self.outcome.write() = Some(outcome.clone());
        Ok(outcome)
    }

    /// Most recent analysis of the live image
    pub fn outcome(&self) -> Option<AnalysisOutcome> {
        self.outcome.read().clone()
    }

    fn token_source(&self) -> TokenSource {
        let tokens = self.tokens.clone();
        Arc::new(move || tokens.provider())
    }

    /// Bring up the playback device; resolves with its id once ready
    pub async fn connect_player(&self) -> Result<String> {
        if let Err(e) = self.tokens.require_provider() {
            self.notify_error(e.user_message());
            return Err(e);
        }
        self.device.initialize(self.token_source()).await
    }

    pub fn device(&self) -> DeviceHandle {
        self.device.device()
    }

    /// Player controls and state projection
    pub fn player(&self) -> &PlaybackDeviceController {
        &self.device
    }

    pub async fn play(&self, track: &Track) -> Result<()> {
        let token = match self.tokens.require_provider() {
            Ok(token) => token,
            Err(e) => {
                self.notify_error(e.user_message());
                return Err(e);
            }
        };

        match self.commander.play_when_ready(track, &token).await {
            Ok(()) => {
                self.notify_info(format!("🎵 Reproduciendo: {}", track.name));
                Ok(())
            }
            Err(e) => {
                self.notify_error(e.user_message());
                Err(e)
            }
        }
    }

    /// Play a track from the recent-plays list
    pub async fn play_recent(&self, record: &HistoryRecord) -> Result<()> {
        self.play(&record.track).await
    }

    /// Reload the recent-plays list
    pub async fn recent_tracks(&self) -> Result<Vec<HistoryRecord>> {
        self.history.refresh().await
    }

    pub fn cached_recent_tracks(&self) -> Vec<HistoryRecord> {
        self.history.cached_recent()
    }

    /// Dashboard figures for a server-side period such as `semana`
    pub async fn dashboard(&self, period: &str) -> Result<EmotionSummary> {
        let token = self.tokens.require_backend()?;
        let records = self
            .emotions
            .history(&HistoryQuery::period(period), &token)
            .await?;
        Ok(self.aggregator.summarize(&records))
    }

    /// Analysis history for browsing by label and page
    pub async fn history_view(&self) -> Result<HistoryView> {
        let token = self.tokens.require_backend()?;
        let records = self
            .emotions
            .history(&HistoryQuery::page(HISTORY_BROWSE_LIMIT, 0), &token)
            .await?;
        Ok(HistoryView::new(records, self.config.analytics.page_size))
    }

    /// Server-computed statistics, untouched
    pub async fn emotion_stats(&self) -> Result<serde_json::Value> {
        let token = self.tokens.require_backend()?;
        self.emotions.stats(&token).await
    }

    /// Let pending history writes finish; they need the backend token
    async fn flush_history(&self) {
        // Each write is an append plus a refresh of the recent list
        let limit = self.config.api.request_timeout() * 2;
        if !self.commander.flush(limit).await {
            warn!("Some plays may be missing from the history log");
        }
    }

    /// End the run: finish history writes, disconnect the device and
    /// release the camera. Tokens are kept.
    pub async fn shutdown(&self) {
        self.flush_history().await;
        self.device.teardown().await;
        self.close_capture();
        debug!("Session shut down");
    }

    /// Release the camera, disconnect the device and forget all credentials
    pub async fn logout(&self) {
        info!("Logging out");
        self.notify_info("Cerrando sesión...");

        self.flush_history().await;
        self.capture.lock().await.dispose();
        self.device.teardown().await;

        if let Some(token) = self.tokens.backend() {
            self.backend.logout(&token).await;
        }
        self.tokens.clear();
        *self.outcome.write() = None;

        self.event_bus.publish(AnimaEvent::SessionEnded {
            reason: "logout".to_string(),
        });
        self.notify_info("Sesión cerrada correctamente ✅");
    }
}
