use std::fmt::{Display, Formatter};

use crate::format::{ChannelMask, SampleFormat};
use crate::mixer::{BusId, TrackName};

/// A track or mixer setting that was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// Empty mask, unknown positions, or more channels than can be downmixed.
    InvalidChannelMask(ChannelMask),
    /// More than two channels requested and no downmixer covers the layout.
    DownmixUnavailable(ChannelMask),
    /// Track input rate outside `(0, max]`.
    InvalidSampleRate { rate: u32, max: u32 },
    /// Non-finite gain value.
    InvalidGain(f32),
    /// Bus index beyond the buses the mixer was built with.
    InvalidBus(BusId),
    /// Name not currently allocated.
    UnknownTrack(TrackName),
    /// Provider frames do not match the track's channel mask or format.
    ProviderMismatch {
        channels: usize,
        format: SampleFormat,
        expected_channels: usize,
        expected_format: SampleFormat,
    },
    /// Mixer built with an unusable setting.
    InvalidConfig(String),
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidChannelMask(mask) => write!(f, "invalid channel mask {}", mask),
            Self::DownmixUnavailable(mask) => {
                write!(f, "no downmixer available for channel mask {}", mask)
            }
            Self::InvalidSampleRate { rate, max } => {
                write!(f, "invalid sample rate {} (must be in 1..={})", rate, max)
            }
            Self::InvalidGain(gain) => write!(f, "invalid gain {}", gain),
            Self::InvalidBus(bus) => write!(f, "unknown bus {}", bus),
            Self::UnknownTrack(name) => write!(f, "unknown track {}", name),
            Self::ProviderMismatch {
                channels,
                format,
                expected_channels,
                expected_format,
            } => write!(
                f,
                "provider delivers {} channel {} frames, track expects {} channel {}",
                channels, format, expected_channels, expected_format
            ),
            Self::InvalidConfig(reason) => write!(f, "invalid mixer config: {}", reason),
        }
    }
}

impl std::error::Error for ConfigurationError {}

/// Error type for mixer configuration calls.
#[derive(Debug, Clone, PartialEq)]
pub enum MixerError {
    Configuration(ConfigurationError),
    /// Every track slot is in use.
    ResourceExhausted { capacity: usize },
}

impl Display for MixerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(err) => write!(f, "configuration error: {}", err),
            Self::ResourceExhausted { capacity } => {
                write!(f, "all {} track slots are in use", capacity)
            }
        }
    }
}

impl std::error::Error for MixerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Configuration(err) => Some(err),
            Self::ResourceExhausted { .. } => None,
        }
    }
}

impl From<ConfigurationError> for MixerError {
    fn from(value: ConfigurationError) -> Self {
        Self::Configuration(value)
    }
}
