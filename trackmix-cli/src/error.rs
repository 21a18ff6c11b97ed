use std::fmt::{Display, Formatter};

use trackmix_lib::MixerError;

/// Failures surfaced by CLI commands.
#[derive(Debug)]
pub enum RunError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Decode(symphonia::core::errors::Error),
    Wav(hound::Error),
    Mixer(MixerError),
    /// A scene that parsed but cannot be rendered.
    Scene(String),
}

impl Display for RunError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {}", err),
            Self::Json(err) => write!(f, "scene parse error: {}", err),
            Self::Decode(err) => write!(f, "decode error: {}", err),
            Self::Wav(err) => write!(f, "wav error: {}", err),
            Self::Mixer(err) => write!(f, "mixer error: {}", err),
            Self::Scene(message) => write!(f, "invalid scene: {}", message),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::Decode(err) => Some(err),
            Self::Wav(err) => Some(err),
            Self::Mixer(err) => Some(err),
            Self::Scene(_) => None,
        }
    }
}

impl From<std::io::Error> for RunError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for RunError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

impl From<symphonia::core::errors::Error> for RunError {
    fn from(err: symphonia::core::errors::Error) -> Self {
        Self::Decode(err)
    }
}

impl From<hound::Error> for RunError {
    fn from(err: hound::Error) -> Self {
        Self::Wav(err)
    }
}

impl From<MixerError> for RunError {
    fn from(err: MixerError) -> Self {
        Self::Mixer(err)
    }
}
