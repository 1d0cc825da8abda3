mod camera;
#[cfg(all(feature = "camera", target_os = "linux"))]
mod gst_camera;
mod mock;
mod session;

pub use camera::{CameraBackend, CameraStream};
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use gst_camera::GstCamera;
pub use mock::{MockAccess, MockCamera};
pub use session::{CaptureCloser, CaptureSession, CaptureState};
