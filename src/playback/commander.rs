//! Play a track on the session's device.
//!
//! The provider's transfer is asynchronous on its side, so play is issued
//! only after a settle step. With the `delay` strategy this is a fixed
//! sleep and remains a race mitigation, not a guarantee; `poll` waits for
//! the provider to report the device active, bounded by the same interval.

use super::device::DeviceHandle;
use super::web_api::{PlaybackApi, ProviderResponse, PREMIUM_REQUIRED_REASON};
use crate::api::HistoryRecorder;
use crate::config::{PlaybackConfig, SettleStrategy};
use crate::error::{AnimaError, Result};
use crate::events::{AnimaEvent, EventBus};
use crate::models::Track;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Receiver of successful plays
#[async_trait]
pub trait PlayHistory: Send + Sync {
    async fn record(&self, track: &Track) -> bool;
}

#[async_trait]
impl PlayHistory for HistoryRecorder {
    async fn record(&self, track: &Track) -> bool {
        HistoryRecorder::record(self, track).await
    }
}

/// Map the provider's answer to a play command
pub fn classify_play_response(response: &ProviderResponse) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }

    match response.status {
        403 if response.error_reason().as_deref() == Some(PREMIUM_REQUIRED_REASON) => {
            Err(AnimaError::PremiumRequired {
                details: response.error_message(),
            })
        }
        403 => Err(AnimaError::PermissionDenied {
            details: response.error_message(),
        }),
        status => Err(AnimaError::PlaybackFailed {
            status: Some(status),
            details: response.error_message(),
        }),
    }
}

pub struct TrackPlaybackCommander {
    api: Arc<dyn PlaybackApi>,
    device: DeviceHandle,
    history: Option<Arc<dyn PlayHistory>>,
    event_bus: Arc<EventBus>,
    config: PlaybackConfig,
    // One transfer/play pair in flight per device
    command_lock: tokio::sync::Mutex<()>,
    // History writes still in flight
    pending: TaskTracker,
}

impl TrackPlaybackCommander {
    pub fn new(
        api: Arc<dyn PlaybackApi>,
        device: DeviceHandle,
        history: Option<Arc<dyn PlayHistory>>,
        event_bus: Arc<EventBus>,
        config: PlaybackConfig,
    ) -> Self {
        Self {
            api,
            device,
            history,
            event_bus,
            config,
            command_lock: tokio::sync::Mutex::new(()),
            pending: TaskTracker::new(),
        }
    }

    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    /// Transfer to the device, settle, then play `track` from the start.
    ///
    /// Fails with [`AnimaError::DeviceNotReady`] without touching the
    /// provider when the device is not ready.
    pub async fn play(&self, track: &Track, token: &str) -> Result<()> {
        self.device.ready_id().ok_or(AnimaError::DeviceNotReady)?;

        let _command = self.command_lock.lock().await;
        // The device may have dropped while this command was queued
        let device_id = self.device.ready_id().ok_or(AnimaError::DeviceNotReady)?;

        match self.issue(track, &device_id, token).await {
            Ok(()) => {
                info!("Playing {} on {}", track, device_id);
                self.event_bus.publish(AnimaEvent::PlaybackStarted {
                    track: track.clone(),
                });
                self.record_history(track);
                Ok(())
            }
            Err(e) => {
                warn!("Playback of {} rejected: {}", track.uri, e);
                self.event_bus.publish(AnimaEvent::PlaybackRejected {
                    track_uri: track.uri.clone(),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn issue(&self, track: &Track, device_id: &str, token: &str) -> Result<()> {
        let transfer = self.api.transfer(device_id, token).await?;
        if !transfer.is_success() {
            // Play reports the authoritative failure
            warn!(
                "Transfer to {} returned status {}: {}",
                device_id,
                transfer.status,
                transfer.error_message()
            );
        }

        self.settle(device_id, token).await;

        let response = self.api.play(device_id, &track.uri, token).await?;
        classify_play_response(&response)
    }

    async fn settle(&self, device_id: &str, token: &str) {
        let window = Duration::from_millis(self.config.transfer_settle_ms);
        match self.config.settle_strategy {
            SettleStrategy::Delay => sleep(window).await,
            SettleStrategy::Poll => {
                let deadline = Instant::now() + window;
                let every = Duration::from_millis(self.config.settle_poll_interval_ms);
                loop {
                    match self.api.active_device_id(token).await {
                        Ok(Some(active)) if active == device_id => {
                            debug!("Device {} active after transfer", device_id);
                            return;
                        }
                        Ok(_) => {}
                        Err(e) => debug!("Active device poll failed: {}", e),
                    }
                    if Instant::now() + every > deadline {
                        debug!("Settle window elapsed without confirmation for {}", device_id);
                        sleep(deadline.saturating_duration_since(Instant::now())).await;
                        return;
                    }
                    sleep(every).await;
                }
            }
        }
    }

    fn record_history(&self, track: &Track) {
        let Some(history) = self.history.clone() else {
            return;
        };
        let track = track.clone();
        self.pending.spawn(async move {
            if !history.record(&track).await {
                debug!("Play of {} not recorded in history", track.uri);
            }
        });
    }

    /// Wait for in-flight history writes, bounded by `limit`.
    ///
    /// Returns `false` when some write was still running at the deadline.
    pub async fn flush(&self, limit: Duration) -> bool {
        self.pending.close();
        let drained = timeout(limit, self.pending.wait()).await.is_ok();
        self.pending.reopen();
        if !drained {
            warn!(
                "{} history writes still pending after {:?}",
                self.pending.len(),
                limit
            );
        }
        drained
    }

    /// [`Self::play`], retrying while the device is still coming up
    pub async fn play_when_ready(&self, track: &Track, token: &str) -> Result<()> {
        let attempts = self.config.ready_retry_attempts;
        let delay = Duration::from_millis(self.config.ready_retry_delay_ms);
        let mut attempt = 0;

        loop {
            match self.play(track, token).await {
                Err(AnimaError::DeviceNotReady) if attempt < attempts => {
                    attempt += 1;
                    debug!(
                        "Device not ready, retrying play in {:?} (attempt {}/{})",
                        delay, attempt, attempts
                    );
                    sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}
