use super::camera::{CameraBackend, CameraStream};
use crate::config::CaptureConfig;
use crate::error::{AnimaError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// V4L2 camera opened through a GStreamer MJPEG pipeline
pub struct GstCamera {
    config: CaptureConfig,
}

impl GstCamera {
    pub fn new(config: CaptureConfig) -> Result<Self> {
        gstreamer::init().map_err(|e| AnimaError::DeviceUnavailable {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;
        Ok(Self { config })
    }

    fn build_pipeline_string(&self) -> String {
        let (width, height) = self.config.resolution;
        format!(
            "v4l2src device=/dev/video{} io-mode=mmap ! \
             image/jpeg,width={},height={} ! \
             appsink name=sink sync=false max-buffers=1 drop=true emit-signals=false",
            self.config.camera_index, width, height
        )
    }

    fn open_blocking(pipeline_desc: String) -> Result<GstStream> {
        info!("Creating GStreamer pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| AnimaError::DeviceUnavailable {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| AnimaError::DeviceUnavailable {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| AnimaError::DeviceUnavailable {
                details: "Failed to get appsink element".to_string(),
            })?
            .downcast::<AppSink>()
            .map_err(|_| AnimaError::DeviceUnavailable {
                details: "Failed to downcast to AppSink".to_string(),
            })?;

        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            let _ = pipeline.set_state(gstreamer::State::Null);
            let details = format!("Failed to start camera pipeline: {}", e);
            return Err(classify_open_error(details));
        }

        Ok(GstStream {
            pipeline,
            appsink,
            live: AtomicBool::new(true),
        })
    }
}

/// V4L2 reports EACCES for devices the user may not open
fn classify_open_error(details: String) -> AnimaError {
    if details.to_ascii_lowercase().contains("permission denied") {
        AnimaError::PermissionDenied { details }
    } else {
        AnimaError::DeviceUnavailable { details }
    }
}

#[async_trait]
impl CameraBackend for GstCamera {
    async fn open(&self) -> Result<Arc<dyn CameraStream>> {
        let pipeline_desc = self.build_pipeline_string();
        let stream = tokio::task::spawn_blocking(move || Self::open_blocking(pipeline_desc))
            .await
            .map_err(|e| AnimaError::system(format!("Camera open task failed: {}", e)))??;
        Ok(Arc::new(stream))
    }

    fn name(&self) -> &str {
        "gstreamer"
    }
}

struct GstStream {
    pipeline: Pipeline,
    appsink: AppSink,
    live: AtomicBool,
}

#[async_trait]
impl CameraStream for GstStream {
    async fn snapshot(&self) -> Result<Bytes> {
        if !self.live.load(Ordering::SeqCst) {
            return Err(AnimaError::DeviceUnavailable {
                details: "stream already stopped".to_string(),
            });
        }

        let appsink = self.appsink.clone();
        tokio::task::spawn_blocking(move || {
            // First frame after start can take a while on USB cameras
            let timeout = gstreamer::ClockTime::from_seconds(3);
            let sample = appsink
                .try_pull_sample(timeout)
                .ok_or_else(|| AnimaError::DeviceUnavailable {
                    details: "No frame received from camera".to_string(),
                })?;

            let buffer = sample.buffer().ok_or_else(|| AnimaError::DeviceUnavailable {
                details: "No buffer in sample".to_string(),
            })?;

            let map = buffer
                .map_readable()
                .map_err(|e| AnimaError::DeviceUnavailable {
                    details: format!("Failed to map buffer: {}", e),
                })?;

            debug!("Captured camera still ({} bytes)", map.len());
            Ok(Bytes::copy_from_slice(map.as_slice()))
        })
        .await
        .map_err(|e| AnimaError::system(format!("Camera snapshot task failed: {}", e)))?
    }

    fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
                warn!("Failed to stop camera pipeline: {}", e);
            } else {
                info!("Camera pipeline stopped");
            }
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

impl Drop for GstStream {
    fn drop(&mut self) {
        self.stop();
    }
}
