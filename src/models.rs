use base64::Engine as _;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::SystemTime;

const BASE64_ENGINE: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// Image encodings accepted for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageEncoding {
    Jpeg,
    Png,
    Webp,
    Gif,
    Bmp,
}

impl ImageEncoding {
    /// Resolve an upload MIME type; anything outside the supported set is rejected
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::Webp),
            "image/gif" => Some(Self::Gif),
            "image/bmp" => Some(Self::Bmp),
            _ => None,
        }
    }

    /// Guess the MIME type from a file extension
    pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
        match extension.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some("image/jpeg"),
            "png" => Some("image/png"),
            "webp" => Some("image/webp"),
            "gif" => Some("image/gif"),
            "bmp" => Some("image/bmp"),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
        }
    }
}

/// Where a captured image came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageSource {
    Camera,
    Upload,
}

/// The single live image of an analysis session
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub data: Bytes,
    pub encoding: ImageEncoding,
    pub source: ImageSource,
    pub captured_at: SystemTime,
}

impl CapturedImage {
    pub fn new(data: impl Into<Bytes>, encoding: ImageEncoding, source: ImageSource) -> Self {
        Self {
            data: data.into(),
            encoding,
            source,
            captured_at: SystemTime::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Encode as a `data:<mime>;base64,...` URL, the classifier's wire format
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.encoding.mime_type(),
            BASE64_ENGINE.encode(&self.data)
        )
    }
}

/// Classifier verdict for one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionResult {
    pub name: String,
    pub icon: String,
    /// 0 - 100
    pub confidence: f64,
}

/// A playable unit in the provider catalog; only `uri` is needed to play it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    #[serde(alias = "trackUri")]
    pub uri: String,
    #[serde(alias = "trackName")]
    pub name: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub album_image: Option<String>,
    #[serde(default)]
    pub external_url: Option<String>,
}

impl Track {
    pub fn new(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            artist: String::new(),
            album: String::new(),
            album_image: None,
            external_url: None,
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.artist.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} - {}", self.name, self.artist)
        }
    }
}

/// Readiness of the SDK-managed playback device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Readiness {
    NotReady,
    Ready,
    Disconnected,
}

/// The one playback device of an authenticated session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackDevice {
    /// Assigned by the provider's ready callback, `None` until then
    pub device_id: Option<String>,
    pub readiness: Readiness,
}

impl PlaybackDevice {
    pub fn not_ready() -> Self {
        Self {
            device_id: None,
            readiness: Readiness::NotReady,
        }
    }

    /// Device id, only while the device is ready
    pub fn ready_id(&self) -> Option<&str> {
        match self.readiness {
            Readiness::Ready => self.device_id.as_deref(),
            _ => None,
        }
    }
}

impl Default for PlaybackDevice {
    fn default() -> Self {
        Self::not_ready()
    }
}

/// One successful play, as stored in the remote log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(flatten)]
    pub track: Track,
    #[serde(default, rename = "playedAt", alias = "played_at")]
    pub played_at: Option<DateTime<Utc>>,
}

/// One server-held classification, input to the analytics aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionRecord {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(rename = "emocion_detectada", alias = "emotion")]
    pub emotion: String,
    #[serde(
        rename = "confianza",
        alias = "confidence",
        default,
        deserialize_with = "deserialize_confidence"
    )]
    pub confidence: f64,
    #[serde(rename = "fecha_analisis", alias = "timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl EmotionRecord {
    pub fn new(emotion: impl Into<String>, confidence: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: None,
            emotion: emotion.into(),
            confidence,
            timestamp,
        }
    }
}

/// The backend stores confidence as NUMERIC and may serialize it as a string
fn deserialize_confidence<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
        Null(Option<()>),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|e| serde::de::Error::custom(format!("invalid confidence '{}': {}", text, e))),
        Raw::Null(_) => Ok(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_url_encoding() {
        let image = CapturedImage::new(vec![0xFF, 0xD8, 0xFF, 0xD9], ImageEncoding::Jpeg, ImageSource::Camera);
        assert_eq!(image.to_data_url(), "data:image/jpeg;base64,/9j/2Q==");
    }

    #[test]
    fn test_mime_resolution() {
        assert_eq!(ImageEncoding::from_mime("image/jpg"), Some(ImageEncoding::Jpeg));
        assert_eq!(ImageEncoding::from_mime("IMAGE/PNG"), Some(ImageEncoding::Png));
        assert_eq!(ImageEncoding::from_mime("image/tiff"), None);
        assert_eq!(ImageEncoding::from_mime("application/pdf"), None);
    }

    #[test]
    fn test_track_wire_format() {
        let track: Track = serde_json::from_str(
            r#"{"uri":"spotify:track:1","name":"Song","artist":"Band","album":"LP",
                "albumImage":"https://img/1.jpg","externalUrl":"https://open/1"}"#,
        )
        .unwrap();
        assert_eq!(track.album_image.as_deref(), Some("https://img/1.jpg"));

        let json = serde_json::to_value(&track).unwrap();
        assert_eq!(json["externalUrl"], "https://open/1");
    }

    #[test]
    fn test_emotion_record_accepts_string_confidence() {
        let record: EmotionRecord = serde_json::from_str(
            r#"{"id":3,"emocion_detectada":"Calma","confianza":"87.50",
                "fecha_analisis":"2024-05-02T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(record.emotion, "Calma");
        assert_eq!(record.confidence, 87.5);
    }

    #[test]
    fn test_playback_device_ready_id() {
        let mut device = PlaybackDevice {
            device_id: Some("abc".to_string()),
            readiness: Readiness::Ready,
        };
        assert_eq!(device.ready_id(), Some("abc"));
        device.readiness = Readiness::Disconnected;
        assert_eq!(device.ready_id(), None);
    }
}
