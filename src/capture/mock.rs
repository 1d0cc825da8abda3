use super::camera::{CameraBackend, CameraStream};
use crate::error::{AnimaError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// How the mock camera answers an access request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockAccess {
    Grant,
    Deny,
    Unavailable,
}

#[derive(Debug)]
struct MockCameraState {
    access: parking_lot::Mutex<MockAccess>,
    fail_snapshot: AtomicBool,
    live_streams: AtomicUsize,
    opened: AtomicUsize,
    frame_counter: AtomicU64,
    resolution: (u32, u32),
}

/// Camera backend producing synthetic JPEG frames, for tests and headless runs
#[derive(Debug, Clone)]
pub struct MockCamera {
    state: Arc<MockCameraState>,
}

impl MockCamera {
    pub fn new(resolution: (u32, u32)) -> Self {
        Self {
            state: Arc::new(MockCameraState {
                access: parking_lot::Mutex::new(MockAccess::Grant),
                fail_snapshot: AtomicBool::new(false),
                live_streams: AtomicUsize::new(0),
                opened: AtomicUsize::new(0),
                frame_counter: AtomicU64::new(0),
                resolution,
            }),
        }
    }

    pub fn set_access(&self, access: MockAccess) {
        *self.state.access.lock() = access;
    }

    pub fn set_fail_snapshot(&self, fail: bool) {
        self.state.fail_snapshot.store(fail, Ordering::SeqCst);
    }

    /// Streams currently holding the (fake) hardware
    pub fn live_streams(&self) -> usize {
        self.state.live_streams.load(Ordering::SeqCst)
    }

    /// Total successful access grants
    pub fn open_count(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new((640, 480))
    }
}

#[async_trait]
impl CameraBackend for MockCamera {
    async fn open(&self) -> Result<Arc<dyn CameraStream>> {
        let access = *self.state.access.lock();
        match access {
            MockAccess::Grant => {
                self.state.opened.fetch_add(1, Ordering::SeqCst);
                self.state.live_streams.fetch_add(1, Ordering::SeqCst);
                debug!("Mock camera access granted");
                Ok(Arc::new(MockStream {
                    state: Arc::clone(&self.state),
                    live: AtomicBool::new(true),
                }))
            }
            MockAccess::Deny => Err(AnimaError::PermissionDenied {
                details: "camera access denied by user".to_string(),
            }),
            MockAccess::Unavailable => Err(AnimaError::DeviceUnavailable {
                details: "no camera attached".to_string(),
            }),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

struct MockStream {
    state: Arc<MockCameraState>,
    live: AtomicBool,
}

#[async_trait]
impl CameraStream for MockStream {
    async fn snapshot(&self) -> Result<Bytes> {
        if !self.live.load(Ordering::SeqCst) {
            return Err(AnimaError::DeviceUnavailable {
                details: "stream already stopped".to_string(),
            });
        }
        if self.state.fail_snapshot.load(Ordering::SeqCst) {
            return Err(AnimaError::DeviceUnavailable {
                details: "mock snapshot failure".to_string(),
            });
        }

        let frame_id = self.state.frame_counter.fetch_add(1, Ordering::SeqCst);

        let mut data = vec![
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x01,
            0x00, 0x48, 0x00, 0x48, 0x00, 0x00,
        ];
        let pattern_size = 1000 + (frame_id % 500) as usize;
        let pattern_byte = (frame_id % 256) as u8;
        data.extend(vec![pattern_byte; pattern_size]);
        data.extend_from_slice(&[0xFF, 0xD9]);

        trace!(
            "Generated mock JPEG still {} ({}x{}, {} bytes)",
            frame_id,
            self.state.resolution.0,
            self.state.resolution.1,
            data.len()
        );

        Ok(Bytes::from(data))
    }

    fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            self.state.live_streams.fetch_sub(1, Ordering::SeqCst);
            debug!("Mock camera stream stopped");
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.stop();
    }
}
