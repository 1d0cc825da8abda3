//! Native playback SDK over the provider's Connect REST API.
//!
//! The device is a Connect endpoint registered under the configured player
//! name (a desktop or speaker client already logged in to the account).
//! Readiness is discovered by polling the device list.

use super::sdk::{PlaybackSdk, PlayerInstance, PlayerOptions, PlayerState, SdkEvent, TokenSource};
use super::web_api::{ConnectDevice, SpotifyWebApi};
use crate::error::{AnimaError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 32;

pub struct ConnectSdk {
    api: SpotifyWebApi,
    poll_every: Duration,
}

impl ConnectSdk {
    pub fn new(api: SpotifyWebApi, poll_every: Duration) -> Self {
        Self { api, poll_every }
    }
}

impl PlaybackSdk for ConnectSdk {
    fn create_player(&self, options: PlayerOptions) -> Result<Arc<dyn PlayerInstance>> {
        debug!(
            "Creating Connect player '{}' (volume {:.2})",
            options.name, options.volume
        );
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Arc::new(ConnectPlayer {
            api: self.api.clone(),
            name: options.name,
            token_source: options.token_source,
            poll_every: self.poll_every,
            events,
            device_id: Arc::new(Mutex::new(None)),
            cancel: Mutex::new(None),
        }))
    }
}

pub struct ConnectPlayer {
    api: SpotifyWebApi,
    name: String,
    token_source: TokenSource,
    poll_every: Duration,
    events: broadcast::Sender<SdkEvent>,
    device_id: Arc<Mutex<Option<String>>>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl ConnectPlayer {
    fn token(&self) -> Result<String> {
        (self.token_source)().ok_or(AnimaError::MissingToken {
            token: crate::error::PROVIDER_TOKEN,
        })
    }

    fn device_id(&self) -> Result<String> {
        self.device_id.lock().clone().ok_or(AnimaError::DeviceNotReady)
    }

    fn find_device<'a>(devices: &'a [ConnectDevice], name: &str) -> Option<&'a ConnectDevice> {
        devices
            .iter()
            .find(|device| device.id.is_some() && device.name == name)
    }
}

/// One device-list poll; emits readiness transitions
async fn poll_devices(
    api: &SpotifyWebApi,
    name: &str,
    token_source: &TokenSource,
    device_id: &Mutex<Option<String>>,
    events: &broadcast::Sender<SdkEvent>,
) {
    let Some(token) = token_source() else {
        let _ = events.send(SdkEvent::AuthenticationError(
            "no provider token available".to_string(),
        ));
        return;
    };

    let devices = match api.devices(&token).await {
        Ok(devices) => devices,
        Err(AnimaError::PermissionDenied { details }) => {
            let _ = events.send(SdkEvent::AuthenticationError(details));
            return;
        }
        Err(e) => {
            warn!("Device list poll failed: {}", e);
            return;
        }
    };

    let found = ConnectPlayer::find_device(&devices, name).and_then(|device| device.id.clone());
    let previous = device_id.lock().clone();

    match (previous, found) {
        (None, Some(id)) => {
            info!("Connect device '{}' is available as {}", name, id);
            *device_id.lock() = Some(id.clone());
            let _ = events.send(SdkEvent::Ready { device_id: id });
        }
        (Some(old), Some(id)) if old != id => {
            *device_id.lock() = Some(id.clone());
            let _ = events.send(SdkEvent::NotReady { device_id: old });
            let _ = events.send(SdkEvent::Ready { device_id: id });
        }
        (Some(old), None) => {
            warn!("Connect device '{}' disappeared", name);
            *device_id.lock() = None;
            let _ = events.send(SdkEvent::NotReady { device_id: old });
        }
        (Some(id), Some(_)) => {
            // Still there; forward what it is playing
            match api.current_playback(&token).await {
                Ok(Some(current)) if current.device_id.as_deref() == Some(id.as_str()) => {
                    let _ = events.send(SdkEvent::StateChanged(Some(current.state)));
                }
                Ok(_) => {}
                Err(e) => debug!("Playback state poll failed: {}", e),
            }
        }
        (None, None) => debug!("Connect device '{}' not visible yet", name),
    }
}

#[async_trait]
impl PlayerInstance for ConnectPlayer {
    async fn connect(&self) -> Result<bool> {
        if self.cancel.lock().is_some() {
            return Ok(true);
        }
        self.token()?;

        let cancel = CancellationToken::new();
        *self.cancel.lock() = Some(cancel.clone());

        let api = self.api.clone();
        let name = self.name.clone();
        let token_source = Arc::clone(&self.token_source);
        let device_id = Arc::clone(&self.device_id);
        let events = self.events.clone();
        let poll_every = self.poll_every;

        tokio::spawn(async move {
            let mut ticker = interval(poll_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        poll_devices(&api, &name, &token_source, &device_id, &events).await;
                    }
                }
            }
            debug!("Connect device poller for '{}' stopped", name);
        });

        Ok(true)
    }

    async fn disconnect(&self) {
        if let Some(cancel) = self.cancel.lock().take() {
            cancel.cancel();
        }
        *self.device_id.lock() = None;
    }

    fn subscribe(&self) -> broadcast::Receiver<SdkEvent> {
        self.events.subscribe()
    }

    async fn toggle_play(&self) -> Result<()> {
        let device_id = self.device_id()?;
        let token = self.token()?;
        let paused = self
            .get_current_state()
            .await?
            .map(|state| state.paused)
            .unwrap_or(true);
        if paused {
            self.api.resume(&device_id, &token).await
        } else {
            self.api.pause(&device_id, &token).await
        }
    }

    async fn next_track(&self) -> Result<()> {
        let device_id = self.device_id()?;
        self.api.next(&device_id, &self.token()?).await
    }

    async fn previous_track(&self) -> Result<()> {
        let device_id = self.device_id()?;
        self.api.previous(&device_id, &self.token()?).await
    }

    async fn seek(&self, position_ms: u64) -> Result<()> {
        let device_id = self.device_id()?;
        self.api.seek(&device_id, position_ms, &self.token()?).await
    }

    async fn get_current_state(&self) -> Result<Option<PlayerState>> {
        let device_id = self.device_id()?;
        let current = self.api.current_playback(&self.token()?).await?;
        Ok(current
            .filter(|current| current.device_id.as_deref() == Some(device_id.as_str()))
            .map(|current| current.state))
    }
}

impl Drop for ConnectPlayer {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.lock().take() {
            cancel.cancel();
        }
    }
}
