use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnimaError {
    #[error("Permission denied: {details}")]
    PermissionDenied { details: String },

    #[error("Device unavailable: {details}")]
    DeviceUnavailable { details: String },

    #[error("Validation error: {details}")]
    Validation { details: String },

    #[error("Network error: {details}")]
    Network { details: String },

    #[error("Classification failed: {reason}")]
    ClassificationFailed { reason: String },

    #[error("Playback device is not ready")]
    DeviceNotReady,

    #[error("Premium account required: {details}")]
    PremiumRequired { details: String },

    #[error("Playback failed (status {status:?}): {details}")]
    PlaybackFailed { status: Option<u16>, details: String },

    #[error("Timed out after {millis}ms waiting for {operation}")]
    Timeout { operation: String, millis: u64 },

    #[error("Invalid state: cannot {operation} while {state}")]
    InvalidState { operation: String, state: String },

    #[error("Missing {token} token")]
    MissingToken { token: &'static str },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("System error: {message}")]
    System { message: String },
}

impl AnimaError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn validation<S: Into<String>>(details: S) -> Self {
        Self::Validation {
            details: details.into(),
        }
    }

    pub fn network<S: Into<String>>(details: S) -> Self {
        Self::Network {
            details: details.into(),
        }
    }

    pub fn invalid_state<S: Into<String>, T: Into<String>>(operation: S, state: T) -> Self {
        Self::InvalidState {
            operation: operation.into(),
            state: state.into(),
        }
    }

    pub fn timeout<S: Into<String>>(operation: S, duration: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            millis: duration.as_millis() as u64,
        }
    }

    /// Whether retrying the same action later can reasonably succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            AnimaError::DeviceNotReady
            | AnimaError::Network { .. }
            | AnimaError::Timeout { .. }
            | AnimaError::DeviceUnavailable { .. }
            | AnimaError::PlaybackFailed { .. } => true,
            AnimaError::PermissionDenied { .. }
            | AnimaError::Validation { .. }
            | AnimaError::ClassificationFailed { .. }
            | AnimaError::PremiumRequired { .. }
            | AnimaError::InvalidState { .. }
            | AnimaError::MissingToken { .. }
            | AnimaError::Config(_)
            | AnimaError::Io(_)
            | AnimaError::Serialization(_)
            | AnimaError::System { .. } => false,
        }
    }

    /// Notification text shown to the user at the UI boundary
    pub fn user_message(&self) -> String {
        match self {
            AnimaError::PermissionDenied { .. } => "Permiso denegado".to_string(),
            AnimaError::DeviceUnavailable { .. } => {
                "Error al acceder a la cámara".to_string()
            }
            AnimaError::Validation { details } => details.clone(),
            AnimaError::Network { .. } => "Error al conectar con el servidor".to_string(),
            AnimaError::ClassificationFailed { reason } => reason.clone(),
            AnimaError::DeviceNotReady => {
                "Esperando conexión con Spotify... Intenta de nuevo en unos segundos"
                    .to_string()
            }
            AnimaError::PremiumRequired { .. } => "Se requiere Spotify Premium".to_string(),
            AnimaError::PlaybackFailed { .. } => "Error al reproducir".to_string(),
            AnimaError::Timeout { .. } => {
                "La operación tardó demasiado. Intenta de nuevo".to_string()
            }
            AnimaError::MissingToken { token } if *token == PROVIDER_TOKEN => {
                "Inicia sesión con Spotify para reproducir música".to_string()
            }
            AnimaError::MissingToken { .. } => "Inicia sesión para continuar".to_string(),
            AnimaError::InvalidState { .. }
            | AnimaError::Config(_)
            | AnimaError::Io(_)
            | AnimaError::Serialization(_)
            | AnimaError::System { .. } => "Ocurrió un error inesperado".to_string(),
        }
    }
}

/// Token names used by [`AnimaError::MissingToken`]
pub const BACKEND_TOKEN: &str = "backend";
pub const PROVIDER_TOKEN: &str = "provider";

impl From<reqwest::Error> for AnimaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AnimaError::Timeout {
                operation: err
                    .url()
                    .map(|url| url.path().to_string())
                    .unwrap_or_else(|| "request".to_string()),
                millis: 0,
            }
        } else if err.is_decode() {
            AnimaError::network(format!("Malformed response body: {}", err))
        } else {
            AnimaError::network(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, AnimaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_not_ready_is_recoverable() {
        assert!(AnimaError::DeviceNotReady.is_recoverable());
        assert!(!AnimaError::PremiumRequired {
            details: "PREMIUM_REQUIRED".to_string()
        }
        .is_recoverable());
    }

    #[test]
    fn test_user_message_uses_server_reason() {
        let err = AnimaError::ClassificationFailed {
            reason: "No se detectó ningún rostro".to_string(),
        };
        assert_eq!(err.user_message(), "No se detectó ningún rostro");
    }

    #[test]
    fn test_missing_provider_token_message() {
        let err = AnimaError::MissingToken {
            token: PROVIDER_TOKEN,
        };
        assert!(err.user_message().contains("Spotify"));
    }
}
