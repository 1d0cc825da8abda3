use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AnimaConfig {
    pub api: ApiConfig,
    pub provider: ProviderConfig,
    pub capture: CaptureConfig,
    pub playback: PlaybackConfig,
    pub history: HistoryConfig,
    pub analytics: AnalyticsConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    /// Base URL of the backend (classifier, history, auth)
    #[serde(default = "default_api_base_url")]
    pub base_url: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_api_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderConfig {
    /// Base URL of the streaming provider's Web API
    #[serde(default = "default_provider_api_base_url")]
    pub api_base_url: String,

    /// Name the playback device registers under
    #[serde(default = "default_player_name")]
    pub player_name: String,

    /// Initial player volume (0.0 - 1.0)
    #[serde(default = "default_player_volume")]
    pub volume: f64,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_provider_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    /// Upload size ceiling in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Camera device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_camera_index")]
    pub camera_index: u32,

    /// Still resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// How long to wait for camera access before giving up
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SettleStrategy {
    /// Sleep a fixed interval between transfer and play
    Delay,
    /// Poll the provider until the device reports active, bounded by the settle interval
    Poll,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlaybackConfig {
    /// How to wait for a device transfer to land before issuing play
    #[serde(default = "default_settle_strategy")]
    pub settle_strategy: SettleStrategy,

    /// Delay (or polling ceiling) between transfer and play
    #[serde(default = "default_transfer_settle_ms")]
    pub transfer_settle_ms: u64,

    /// Polling interval for the `poll` settle strategy
    #[serde(default = "default_settle_poll_interval_ms")]
    pub settle_poll_interval_ms: u64,

    /// Upper bound on waiting for the device ready callback
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,

    /// Retries of a play command while the device is not ready yet
    #[serde(default = "default_ready_retry_attempts")]
    pub ready_retry_attempts: u32,

    /// Delay between not-ready retries
    #[serde(default = "default_ready_retry_delay_ms")]
    pub ready_retry_delay_ms: u64,

    /// Position refresh interval while playing
    #[serde(default = "default_position_poll_ms")]
    pub position_poll_ms: u64,

    /// Device list polling interval for the Connect SDK
    #[serde(default = "default_device_poll_ms")]
    pub device_poll_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HistoryConfig {
    /// Number of recent plays to keep in view
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AnalyticsConfig {
    /// IANA timezone used to derive weekdays from record timestamps
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Records per page when browsing analysis history
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl AnimaConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("anima.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("api.base_url", default_api_base_url())?
            .set_default(
                "api.request_timeout_ms",
                default_api_request_timeout_ms(),
            )?
            .set_default("provider.api_base_url", default_provider_api_base_url())?
            .set_default("provider.player_name", default_player_name())?
            .set_default("provider.volume", default_player_volume())?
            .set_default(
                "provider.request_timeout_ms",
                default_provider_request_timeout_ms(),
            )?
            .set_default(
                "capture.max_upload_bytes",
                default_max_upload_bytes() as i64,
            )?
            .set_default("capture.camera_index", default_camera_index())?
            .set_default(
                "capture.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("capture.open_timeout_ms", default_open_timeout_ms())?
            .set_default("playback.settle_strategy", "delay")?
            .set_default("playback.transfer_settle_ms", default_transfer_settle_ms())?
            .set_default(
                "playback.settle_poll_interval_ms",
                default_settle_poll_interval_ms(),
            )?
            .set_default("playback.ready_timeout_ms", default_ready_timeout_ms())?
            .set_default(
                "playback.ready_retry_attempts",
                default_ready_retry_attempts(),
            )?
            .set_default(
                "playback.ready_retry_delay_ms",
                default_ready_retry_delay_ms(),
            )?
            .set_default("playback.position_poll_ms", default_position_poll_ms())?
            .set_default("playback.device_poll_ms", default_device_poll_ms())?
            .set_default("history.recent_limit", default_recent_limit() as i64)?
            .set_default("analytics.timezone", default_timezone())?
            .set_default("analytics.page_size", default_page_size() as i64)?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables, e.g. ANIMA_API__BASE_URL
            .add_source(
                Environment::with_prefix("ANIMA")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: AnimaConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(ConfigError::Message(format!(
                "API base_url must be an http(s) URL, got '{}'",
                self.api.base_url
            )));
        }

        if !self.provider.api_base_url.starts_with("http://")
            && !self.provider.api_base_url.starts_with("https://")
        {
            return Err(ConfigError::Message(format!(
                "Provider api_base_url must be an http(s) URL, got '{}'",
                self.provider.api_base_url
            )));
        }

        if !(0.0..=1.0).contains(&self.provider.volume) {
            return Err(ConfigError::Message(
                "Provider volume must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.capture.max_upload_bytes == 0 {
            return Err(ConfigError::Message(
                "Capture max_upload_bytes must be greater than 0".to_string(),
            ));
        }

        if self.capture.resolution.0 == 0 || self.capture.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.playback.ready_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Playback ready_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.playback.settle_strategy == SettleStrategy::Poll
            && self.playback.settle_poll_interval_ms == 0
        {
            return Err(ConfigError::Message(
                "Playback settle_poll_interval_ms must be greater than 0 when polling".to_string(),
            ));
        }

        if self.playback.position_poll_ms == 0 || self.playback.device_poll_ms == 0 {
            return Err(ConfigError::Message(
                "Playback polling intervals must be greater than 0".to_string(),
            ));
        }

        if self.history.recent_limit == 0 {
            return Err(ConfigError::Message(
                "History recent_limit must be greater than 0".to_string(),
            ));
        }

        if self.analytics.page_size == 0 {
            return Err(ConfigError::Message(
                "Analytics page_size must be greater than 0".to_string(),
            ));
        }

        self.analytics.timezone()?;

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl AnalyticsConfig {
    pub fn timezone(&self) -> Result<chrono_tz::Tz, ConfigError> {
        self.timezone.parse::<chrono_tz::Tz>().map_err(|e| {
            ConfigError::Message(format!("Invalid analytics timezone '{}': {}", self.timezone, e))
        })
    }
}

impl Default for AnimaConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: default_api_base_url(),
                request_timeout_ms: default_api_request_timeout_ms(),
            },
            provider: ProviderConfig {
                api_base_url: default_provider_api_base_url(),
                player_name: default_player_name(),
                volume: default_player_volume(),
                request_timeout_ms: default_provider_request_timeout_ms(),
            },
            capture: CaptureConfig {
                max_upload_bytes: default_max_upload_bytes(),
                camera_index: default_camera_index(),
                resolution: default_camera_resolution(),
                open_timeout_ms: default_open_timeout_ms(),
            },
            playback: PlaybackConfig {
                settle_strategy: default_settle_strategy(),
                transfer_settle_ms: default_transfer_settle_ms(),
                settle_poll_interval_ms: default_settle_poll_interval_ms(),
                ready_timeout_ms: default_ready_timeout_ms(),
                ready_retry_attempts: default_ready_retry_attempts(),
                ready_retry_delay_ms: default_ready_retry_delay_ms(),
                position_poll_ms: default_position_poll_ms(),
                device_poll_ms: default_device_poll_ms(),
            },
            history: HistoryConfig {
                recent_limit: default_recent_limit(),
            },
            analytics: AnalyticsConfig {
                timezone: default_timezone(),
                page_size: default_page_size(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_api_base_url() -> String {
    "http://localhost:4000".to_string()
}
fn default_api_request_timeout_ms() -> u64 {
    15_000
}

fn default_provider_api_base_url() -> String {
    "https://api.spotify.com/v1".to_string()
}
fn default_player_name() -> String {
    "Ánima Web Player".to_string()
}
fn default_player_volume() -> f64 {
    0.5
}
fn default_provider_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_camera_index() -> u32 {
    0
}
fn default_camera_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_open_timeout_ms() -> u64 {
    30_000
}

fn default_settle_strategy() -> SettleStrategy {
    SettleStrategy::Delay
}
fn default_transfer_settle_ms() -> u64 {
    500
}
fn default_settle_poll_interval_ms() -> u64 {
    100
}
fn default_ready_timeout_ms() -> u64 {
    20_000
}
fn default_ready_retry_attempts() -> u32 {
    3
}
fn default_ready_retry_delay_ms() -> u64 {
    1_000
}
fn default_position_poll_ms() -> u64 {
    1_000
}
fn default_device_poll_ms() -> u64 {
    2_000
}

fn default_recent_limit() -> usize {
    5
}

fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_page_size() -> usize {
    9
}

fn default_event_bus_capacity() -> usize {
    100
}
