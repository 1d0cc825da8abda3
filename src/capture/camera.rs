use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Source of live camera streams (the "getUserMedia" capability)
#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Request camera access and open a live stream.
    ///
    /// Fails with `PermissionDenied` when access is refused and with
    /// `DeviceUnavailable` when no usable camera exists.
    async fn open(&self) -> Result<Arc<dyn CameraStream>>;

    fn name(&self) -> &str;
}

/// A live hardware stream. Holding one keeps the camera indicator on.
#[async_trait]
pub trait CameraStream: Send + Sync {
    /// Grab the current frame as a JPEG still
    async fn snapshot(&self) -> Result<Bytes>;

    /// Release the hardware. Must be idempotent and must not block.
    fn stop(&self);

    fn is_live(&self) -> bool;
}
