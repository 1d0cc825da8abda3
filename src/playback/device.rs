use super::sdk::{PlayerInstance, PlayerOptions, PlayerState, SdkEvent, SdkLatch, TokenSource};
use crate::config::{PlaybackConfig, ProviderConfig};
use crate::error::{AnimaError, Result};
use crate::events::{AnimaEvent, EventBus, SdkErrorKind};
use crate::models::{PlaybackDevice, Readiness, Track};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Lifecycle of the session's playback device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Uninitialized,
    SdkLoading,
    AuthenticatingDevice,
    Ready,
    Disconnected,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerState::Uninitialized => "uninitialized",
            ControllerState::SdkLoading => "loading SDK",
            ControllerState::AuthenticatingDevice => "authenticating device",
            ControllerState::Ready => "ready",
            ControllerState::Disconnected => "disconnected",
        };
        write!(f, "{}", name)
    }
}

/// What a mini-player shows. Read-only; never used for control decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerStateProjection {
    pub track: Option<Track>,
    pub paused: bool,
    pub position_ms: u64,
    pub duration_ms: u64,
}

impl PlayerStateProjection {
    pub fn is_playing(&self) -> bool {
        self.track.is_some() && !self.paused
    }

    fn from_state(state: PlayerState) -> Self {
        Self {
            track: state.track,
            paused: state.paused,
            position_ms: state.position_ms,
            duration_ms: state.duration_ms,
        }
    }
}

/// Read-only view of the session's playback device
#[derive(Clone)]
pub struct DeviceHandle {
    device: watch::Receiver<PlaybackDevice>,
}

impl DeviceHandle {
    pub fn current(&self) -> PlaybackDevice {
        self.device.borrow().clone()
    }

    /// Device id, only while the device is ready
    pub fn ready_id(&self) -> Option<String> {
        self.device.borrow().ready_id().map(str::to_string)
    }

    pub fn readiness(&self) -> Readiness {
        self.device.borrow().readiness
    }

    /// Wait until the device reports ready, bounded by `limit`
    pub async fn wait_ready(&self, limit: Duration) -> Result<String> {
        let mut device = self.device.clone();
        let wait = async {
            loop {
                if let Some(id) = device.borrow_and_update().ready_id() {
                    return Ok(id.to_string());
                }
                if device.changed().await.is_err() {
                    return Err(AnimaError::DeviceNotReady);
                }
            }
        };
        tokio::time::timeout(limit, wait)
            .await
            .map_err(|_| AnimaError::timeout("playback device ready", limit))?
    }
}

/// Shared state written by the listener task
struct Shared {
    state: RwLock<ControllerState>,
    device: watch::Sender<PlaybackDevice>,
    projection: watch::Sender<PlayerStateProjection>,
    event_bus: Arc<EventBus>,
}

impl Shared {
    fn set_state(&self, state: ControllerState) {
        let mut current = self.state.write();
        if *current != state {
            debug!("Playback device controller: {} -> {}", *current, state);
            *current = state;
        }
    }

    fn handle_event(&self, event: SdkEvent) {
        match event {
            SdkEvent::Ready { device_id } => {
                self.set_state(ControllerState::Ready);
                self.device.send_replace(PlaybackDevice {
                    device_id: Some(device_id.clone()),
                    readiness: Readiness::Ready,
                });
                self.event_bus.publish(AnimaEvent::DeviceReady { device_id });
            }
            SdkEvent::NotReady { device_id } => {
                {
                    let mut state = self.state.write();
                    if *state == ControllerState::Ready {
                        *state = ControllerState::Disconnected;
                    }
                }
                self.device.send_modify(|device| {
                    if device.device_id.is_some() {
                        device.readiness = Readiness::Disconnected;
                    }
                });
                self.event_bus.publish(AnimaEvent::DeviceNotReady {
                    device_id: Some(device_id),
                });
            }
            SdkEvent::StateChanged(Some(state)) => self.apply_state(state),
            SdkEvent::StateChanged(None) => {
                trace!("Player state change without state");
            }
            SdkEvent::AuthenticationError(message) => {
                self.sdk_error(SdkErrorKind::Authentication, message)
            }
            SdkEvent::AccountError(message) => self.sdk_error(SdkErrorKind::Account, message),
            SdkEvent::PlaybackError(message) => self.sdk_error(SdkErrorKind::Playback, message),
        }
    }

    fn apply_state(&self, state: PlayerState) {
        let projection = PlayerStateProjection::from_state(state);
        let changed = self.projection.send_if_modified(|current| {
            if *current == projection {
                false
            } else {
                *current = projection.clone();
                true
            }
        });
        if changed {
            self.event_bus.publish(AnimaEvent::PlayerStateChanged {
                paused: projection.paused,
                position_ms: projection.position_ms,
                duration_ms: projection.duration_ms,
            });
        }
    }

    fn sdk_error(&self, kind: SdkErrorKind, message: String) {
        self.event_bus.publish(AnimaEvent::SdkError { kind, message });
    }
}

/// Owns the one SDK device instance of an authenticated session.
///
/// The device id is assigned only by the SDK's ready callback and exposed
/// to everyone else through [`DeviceHandle`].
pub struct PlaybackDeviceController {
    latch: Arc<SdkLatch>,
    config: PlaybackConfig,
    player_name: String,
    volume: f64,
    shared: Arc<Shared>,
    player: Mutex<Option<Arc<dyn PlayerInstance>>>,
    listener: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    init_lock: tokio::sync::Mutex<()>,
}

impl PlaybackDeviceController {
    pub fn new(
        latch: Arc<SdkLatch>,
        provider: &ProviderConfig,
        config: PlaybackConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let (device, _) = watch::channel(PlaybackDevice::not_ready());
        let (projection, _) = watch::channel(PlayerStateProjection::default());

        Self {
            latch,
            config,
            player_name: provider.player_name.clone(),
            volume: provider.volume,
            shared: Arc::new(Shared {
                state: RwLock::new(ControllerState::Uninitialized),
                device,
                projection,
                event_bus,
            }),
            player: Mutex::new(None),
            listener: Mutex::new(None),
            init_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> ControllerState {
        *self.shared.state.read()
    }

    pub fn device(&self) -> DeviceHandle {
        DeviceHandle {
            device: self.shared.device.subscribe(),
        }
    }

    pub fn projection(&self) -> watch::Receiver<PlayerStateProjection> {
        self.shared.projection.subscribe()
    }

    /// Load the SDK, create the device and wait for it to report ready.
    ///
    /// Idempotent: once a device exists this only waits for readiness.
    pub async fn initialize(&self, token_source: TokenSource) -> Result<String> {
        let _guard = self.init_lock.lock().await;
        let ready_timeout = Duration::from_millis(self.config.ready_timeout_ms);

        if self.player.lock().is_some() {
            debug!("Playback device already initialized ({})", self.state());
            return self.device().wait_ready(ready_timeout).await;
        }

        self.shared.set_state(ControllerState::SdkLoading);
        let sdk = match self.latch.get().await {
            Ok(sdk) => sdk,
            Err(e) => {
                error!("Failed to load playback SDK: {}", e);
                self.shared.set_state(ControllerState::Uninitialized);
                return Err(e);
            }
        };

        self.shared.set_state(ControllerState::AuthenticatingDevice);
        let player = match sdk.create_player(PlayerOptions {
            name: self.player_name.clone(),
            volume: self.volume,
            token_source,
        }) {
            Ok(player) => player,
            Err(e) => {
                self.shared.set_state(ControllerState::Uninitialized);
                return Err(e);
            }
        };

        // Listeners go up before connect so the ready callback is never missed
        let events = player.subscribe();
        self.spawn_listener(Arc::clone(&player), events);
        *self.player.lock() = Some(Arc::clone(&player));

        match player.connect().await {
            Ok(true) => info!("Playback device '{}' connecting", self.player_name),
            Ok(false) => {
                warn!("Playback SDK refused to connect");
                self.teardown().await;
                return Err(AnimaError::DeviceUnavailable {
                    details: "playback SDK refused to connect".to_string(),
                });
            }
            Err(e) => {
                error!("Playback device connect failed: {}", e);
                self.teardown().await;
                return Err(e);
            }
        }

        self.device().wait_ready(ready_timeout).await
    }

    fn spawn_listener(
        &self,
        player: Arc<dyn PlayerInstance>,
        mut events: broadcast::Receiver<SdkEvent>,
    ) {
        let shared = Arc::clone(&self.shared);
        let cancel = CancellationToken::new();
        let cancelled = cancel.clone();
        let poll_every = Duration::from_millis(self.config.position_poll_ms);

        let handle = tokio::spawn(async move {
            let mut position_poll = interval(poll_every);
            position_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => {
                        debug!("Playback device listener stopping");
                        break;
                    }

                    event = events.recv() => match event {
                        Ok(event) => shared.handle_event(event),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Playback device listener lagged by {} events", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("Playback SDK event stream closed");
                            break;
                        }
                    },

                    _ = position_poll.tick() => {
                        if !shared.projection.borrow().is_playing() {
                            continue;
                        }
                        match player.get_current_state().await {
                            Ok(Some(state)) => shared.apply_state(state),
                            Ok(None) => {}
                            Err(e) => trace!("Position poll failed: {}", e),
                        }
                    }
                }
            }
        });

        if let Some((previous, _)) = self.listener.lock().replace((cancel, handle)) {
            previous.cancel();
        }
    }

    /// Disconnect the device and forget its identity. Safe to call repeatedly.
    pub async fn teardown(&self) {
        let listener = self.listener.lock().take();
        if let Some((cancel, handle)) = listener {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!("Playback device listener ended abnormally: {}", e);
            }
        }

        let player = self.player.lock().take();
        match player {
            Some(player) => {
                player.disconnect().await;
                info!("Playback device disconnected");
            }
            None => debug!("Playback device teardown with no device"),
        }

        self.shared.set_state(ControllerState::Uninitialized);
        self.shared.device.send_replace(PlaybackDevice::not_ready());
        self.shared
            .projection
            .send_replace(PlayerStateProjection::default());
    }

    fn player(&self) -> Result<Arc<dyn PlayerInstance>> {
        if self.state() != ControllerState::Ready {
            return Err(AnimaError::DeviceNotReady);
        }
        self.player.lock().clone().ok_or(AnimaError::DeviceNotReady)
    }

    pub async fn toggle_play(&self) -> Result<()> {
        self.player()?.toggle_play().await
    }

    pub async fn next_track(&self) -> Result<()> {
        self.player()?.next_track().await
    }

    pub async fn previous_track(&self) -> Result<()> {
        self.player()?.previous_track().await
    }

    pub async fn seek(&self, position_ms: u64) -> Result<()> {
        self.player()?.seek(position_ms).await
    }
}

impl Drop for PlaybackDeviceController {
    fn drop(&mut self) {
        if let Some((cancel, _)) = self.listener.lock().take() {
            cancel.cancel();
        }
        if let Some(player) = self.player.lock().take() {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move { player.disconnect().await });
            }
        }
    }
}
