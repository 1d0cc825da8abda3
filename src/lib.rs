pub mod analytics;
pub mod api;
pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod playback;
pub mod session;

#[cfg(test)]
mod test_support;

pub use analytics::{AnalyticsAggregator, EmotionSummary, HistoryView};
pub use api::{BackendClient, Classification, EmotionClassifierClient, HistoryRecorder, TokenStore};
pub use capture::{CameraBackend, CaptureCloser, CaptureSession, CaptureState, MockCamera};
pub use config::AnimaConfig;
pub use error::{AnimaError, Result};
pub use events::{AnimaEvent, EventBus, EventFilter, EventReceiver, NotificationLevel};
pub use models::{
    CapturedImage, EmotionRecord, EmotionResult, HistoryRecord, ImageEncoding, ImageSource,
    PlaybackDevice, Readiness, Track,
};
pub use playback::{DeviceHandle, PlaybackDeviceController, TrackPlaybackCommander};
pub use session::{AnalysisOutcome, AnimaSession};
