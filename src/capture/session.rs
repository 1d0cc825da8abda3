use super::camera::{CameraBackend, CameraStream};
use crate::config::CaptureConfig;
use crate::error::{AnimaError, Result};
use crate::events::{AnimaEvent, EventBus};
use crate::models::{CapturedImage, ImageEncoding, ImageSource};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Capture lifecycle: `Idle -> Requesting -> Active -> Captured -> Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Requesting,
    Active,
    Captured,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureState::Idle => "idle",
            CaptureState::Requesting => "requesting camera",
            CaptureState::Active => "camera active",
            CaptureState::Captured => "photo captured",
        };
        f.write_str(name)
    }
}

/// Stream slot and close generation shared with [`CaptureCloser`]
#[derive(Default)]
struct StreamGuard {
    slot: parking_lot::Mutex<Option<Arc<dyn CameraStream>>>,
    generation: AtomicU64,
}

impl StreamGuard {
    fn release(&self) -> bool {
        if let Some(stream) = self.slot.lock().take() {
            stream.stop();
            true
        } else {
            false
        }
    }

    fn is_streaming(&self) -> bool {
        self.slot
            .lock()
            .as_ref()
            .map(|stream| stream.is_live())
            .unwrap_or(false)
    }
}

/// Synchronous close handle for a [`CaptureSession`].
///
/// Usable while another task is suspended inside `start()` or
/// `capture()`: the hardware stream is stopped immediately and the
/// session falls back to `Idle` the next time it is touched.
#[derive(Clone)]
pub struct CaptureCloser {
    guard: Arc<StreamGuard>,
}

impl CaptureCloser {
    pub fn close(&self) {
        self.guard.generation.fetch_add(1, Ordering::SeqCst);
        if self.guard.release() {
            info!("Capture closed, camera released");
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.guard.is_streaming()
    }
}

/// Owns the camera handle and the single live captured image
pub struct CaptureSession {
    camera: Arc<dyn CameraBackend>,
    config: CaptureConfig,
    event_bus: Arc<EventBus>,
    state: CaptureState,
    image: Option<CapturedImage>,
    guard: Arc<StreamGuard>,
    seen_generation: u64,
}

impl CaptureSession {
    pub fn new(
        camera: Arc<dyn CameraBackend>,
        config: CaptureConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            camera,
            config,
            event_bus,
            state: CaptureState::Idle,
            image: None,
            guard: Arc::new(StreamGuard::default()),
            seen_generation: 0,
        }
    }

    pub fn closer(&self) -> CaptureCloser {
        CaptureCloser {
            guard: Arc::clone(&self.guard),
        }
    }

    pub fn state(&self) -> CaptureState {
        if self.closed_externally() {
            CaptureState::Idle
        } else {
            self.state
        }
    }

    /// The live image, if one is held
    pub fn image(&self) -> Option<&CapturedImage> {
        if self.closed_externally() {
            None
        } else {
            self.image.as_ref()
        }
    }

    /// Whether the camera hardware is currently held
    pub fn is_streaming(&self) -> bool {
        self.guard.is_streaming()
    }

    /// Request camera access and open a live stream.
    ///
    /// No-op while already requesting or active. A held image is
    /// discarded first since a new capture invalidates it.
    pub async fn start(&mut self) -> Result<()> {
        self.sync_with_closer();

        match self.state {
            CaptureState::Requesting | CaptureState::Active => {
                debug!("Camera already {}, ignoring start", self.state);
                return Ok(());
            }
            CaptureState::Captured => {
                self.discard_image();
            }
            CaptureState::Idle => {}
        }

        info!("Requesting camera access from {} backend", self.camera.name());
        self.state = CaptureState::Requesting;
        let generation = self.guard.generation.load(Ordering::SeqCst);
        let open_timeout = Duration::from_millis(self.config.open_timeout_ms);

        let opened = tokio::time::timeout(open_timeout, self.camera.open()).await;

        let stream = match opened {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!("Camera access failed: {}", e);
                self.state = CaptureState::Idle;
                return Err(e);
            }
            Err(_) => {
                warn!("Camera access not granted within {:?}", open_timeout);
                self.state = CaptureState::Idle;
                return Err(AnimaError::timeout("camera access", open_timeout));
            }
        };

        if self.guard.generation.load(Ordering::SeqCst) != generation {
            // Closed while the permission prompt was pending
            stream.stop();
            self.sync_with_closer();
            return Err(AnimaError::invalid_state("start camera", "capture closed"));
        }

        *self.guard.slot.lock() = Some(stream);
        self.state = CaptureState::Active;
        self.event_bus.publish(AnimaEvent::CameraStarted {
            timestamp: SystemTime::now(),
        });
        info!("Camera active");
        Ok(())
    }

    /// Snapshot the current frame and release the camera immediately
    pub async fn capture(&mut self) -> Result<&CapturedImage> {
        self.sync_with_closer();

        if self.state != CaptureState::Active {
            return Err(AnimaError::invalid_state("capture photo", self.state.to_string()));
        }

        let stream = self.guard.slot.lock().clone();
        let stream = match stream {
            Some(stream) => stream,
            None => {
                self.state = CaptureState::Idle;
                return Err(AnimaError::DeviceUnavailable {
                    details: "camera stream lost".to_string(),
                });
            }
        };
        let generation = self.guard.generation.load(Ordering::SeqCst);

        let snapshot = stream.snapshot().await;

        // The still is taken (or failed); the hardware is not held past this point
        self.release_stream();

        if self.guard.generation.load(Ordering::SeqCst) != generation {
            self.sync_with_closer();
            return Err(AnimaError::invalid_state("capture photo", "capture closed"));
        }

        let data = match snapshot {
            Ok(data) => data,
            Err(e) => {
                warn!("Snapshot failed, camera released: {}", e);
                self.state = CaptureState::Idle;
                return Err(e);
            }
        };

        let image = CapturedImage::new(data, ImageEncoding::Jpeg, ImageSource::Camera);
        self.event_bus.publish(AnimaEvent::PhotoCaptured {
            source: ImageSource::Camera,
            bytes: image.len(),
        });
        info!("Photo captured ({} bytes)", image.len());

        self.state = CaptureState::Captured;
        Ok(self.image.insert(image))
    }

    /// Produce the live image from an uploaded file, bypassing the camera
    pub fn import_file(&mut self, data: Vec<u8>, mime_type: &str) -> Result<&CapturedImage> {
        self.sync_with_closer();

        match self.state {
            CaptureState::Idle | CaptureState::Captured => {}
            state => {
                return Err(AnimaError::invalid_state("import file", state.to_string()));
            }
        }

        let encoding = ImageEncoding::from_mime(mime_type).ok_or_else(|| {
            AnimaError::validation("Por favor selecciona un archivo de imagen válido")
        })?;

        if data.len() > self.config.max_upload_bytes {
            return Err(AnimaError::validation(format!(
                "La imagen es demasiado grande. Máximo {}MB",
                self.config.max_upload_bytes / (1024 * 1024)
            )));
        }

        self.discard_image();
        let image = CapturedImage::new(data, encoding, ImageSource::Upload);
        self.event_bus.publish(AnimaEvent::PhotoCaptured {
            source: ImageSource::Upload,
            bytes: image.len(),
        });
        debug!("Imported {} upload ({} bytes)", mime_type, image.len());

        self.state = CaptureState::Captured;
        Ok(self.image.insert(image))
    }

    /// Discard the captured image and return to `Idle`
    pub fn retake(&mut self) {
        self.sync_with_closer();
        if self.state == CaptureState::Captured {
            info!("Retaking photo");
        }
        self.release_stream();
        self.discard_image();
        self.state = CaptureState::Idle;
    }

    /// Stop any hardware stream and drop the image
    pub fn dispose(&mut self) {
        self.release_stream();
        self.discard_image();
        self.state = CaptureState::Idle;
        self.seen_generation = self.guard.generation.load(Ordering::SeqCst);
    }

    fn release_stream(&self) {
        if self.guard.release() {
            self.event_bus.publish(AnimaEvent::CameraStopped {
                timestamp: SystemTime::now(),
            });
        }
    }

    fn discard_image(&mut self) {
        if self.image.take().is_some() {
            self.event_bus.publish(AnimaEvent::CaptureDiscarded);
        }
    }

    fn closed_externally(&self) -> bool {
        self.guard.generation.load(Ordering::SeqCst) != self.seen_generation
    }

    fn sync_with_closer(&mut self) {
        if self.closed_externally() {
            debug!("Capture was closed externally, resetting to idle");
            self.release_stream();
            self.discard_image();
            self.state = CaptureState::Idle;
            self.seen_generation = self.guard.generation.load(Ordering::SeqCst);
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if self.guard.release() {
            debug!("Capture session dropped, camera released");
        }
    }
}
