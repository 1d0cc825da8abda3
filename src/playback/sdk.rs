//! Provider playback SDK modelled as a capability interface.
//!
//! The controller only talks to these traits. Production builds use the
//! Connect-device implementation; tests substitute fakes.

use crate::error::Result;
use crate::models::Track;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, OnceCell};
use tracing::{debug, info};

/// Supplies the current provider access token whenever the SDK asks for one
pub type TokenSource = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Options for constructing the single device instance of a session
#[derive(Clone)]
pub struct PlayerOptions {
    pub name: String,
    pub volume: f64,
    pub token_source: TokenSource,
}

impl std::fmt::Debug for PlayerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerOptions")
            .field("name", &self.name)
            .field("volume", &self.volume)
            .finish_non_exhaustive()
    }
}

/// Snapshot reported by the SDK for the device's current playback
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlayerState {
    pub track: Option<Track>,
    pub paused: bool,
    pub position_ms: u64,
    pub duration_ms: u64,
}

/// Listener callbacks, delivered as a stream
#[derive(Debug, Clone, PartialEq)]
pub enum SdkEvent {
    Ready { device_id: String },
    NotReady { device_id: String },
    StateChanged(Option<PlayerState>),
    AuthenticationError(String),
    AccountError(String),
    PlaybackError(String),
}

/// One SDK-managed device instance
#[async_trait]
pub trait PlayerInstance: Send + Sync {
    /// Start the device handshake; `false` means the SDK refused to connect
    async fn connect(&self) -> Result<bool>;

    async fn disconnect(&self);

    /// Listener registration. Subscribe before `connect` to observe `Ready`.
    fn subscribe(&self) -> broadcast::Receiver<SdkEvent>;

    async fn toggle_play(&self) -> Result<()>;

    async fn next_track(&self) -> Result<()>;

    async fn previous_track(&self) -> Result<()>;

    async fn seek(&self, position_ms: u64) -> Result<()>;

    async fn get_current_state(&self) -> Result<Option<PlayerState>>;
}

/// A loaded SDK, able to construct device instances
pub trait PlaybackSdk: Send + Sync {
    fn create_player(&self, options: PlayerOptions) -> Result<Arc<dyn PlayerInstance>>;
}

/// Loads the SDK; may be slow
#[async_trait]
pub trait SdkSource: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn PlaybackSdk>>;
}

/// Source for an SDK that needs no loading step
pub struct ReadySdk {
    sdk: Arc<dyn PlaybackSdk>,
}

impl ReadySdk {
    pub fn new(sdk: Arc<dyn PlaybackSdk>) -> Self {
        Self { sdk }
    }
}

#[async_trait]
impl SdkSource for ReadySdk {
    async fn load(&self) -> Result<Arc<dyn PlaybackSdk>> {
        Ok(Arc::clone(&self.sdk))
    }
}

/// Loads the SDK at most once per process.
///
/// Concurrent callers await the same in-flight load. A failed load leaves
/// the latch empty so a later call can try again.
pub struct SdkLatch {
    source: Arc<dyn SdkSource>,
    sdk: OnceCell<Arc<dyn PlaybackSdk>>,
}

impl SdkLatch {
    pub fn new(source: Arc<dyn SdkSource>) -> Self {
        Self {
            source,
            sdk: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<Arc<dyn PlaybackSdk>> {
        if let Some(sdk) = self.sdk.get() {
            return Ok(Arc::clone(sdk));
        }

        debug!("Playback SDK not loaded yet, loading");
        let sdk = self
            .sdk
            .get_or_try_init(|| async {
                let sdk = self.source.load().await?;
                info!("Playback SDK loaded");
                Ok::<_, crate::error::AnimaError>(sdk)
            })
            .await?;
        Ok(Arc::clone(sdk))
    }

    pub fn is_loaded(&self) -> bool {
        self.sdk.initialized()
    }
}
