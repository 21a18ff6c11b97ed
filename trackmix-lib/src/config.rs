//! Mixer construction settings.

use serde::{Deserialize, Serialize};

use crate::constants::{FRAME_COUNT, MAX_NUM_TRACKS, SAMPLE_RATE};
use crate::error::ConfigurationError;
use crate::format::MixFormat;
use crate::resampler::ResamplerQuality;

/// Serialized configuration for an [`AudioMixer`](crate::mixer::AudioMixer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Frames rendered per `process` call.
    #[serde(alias = "frames")]
    pub frame_count: usize,
    /// Mix rate in Hz.
    #[serde(alias = "rate")]
    pub sample_rate: u32,
    /// Track slots available, at most 32.
    pub max_tracks: usize,
    /// Frames a volume ramp lasts; defaults to one block.
    pub ramp_frames: Option<usize>,
    /// Representation tracks are converted to before mixing.
    pub mixer_in_format: MixFormat,
    /// Main bus format given to newly allocated tracks.
    pub output_format: MixFormat,
    /// Number of stereo main buses.
    pub main_buses: usize,
    /// Number of mono auxiliary buses.
    pub aux_buses: usize,
    pub resampler_quality: ResamplerQuality,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            frame_count: FRAME_COUNT,
            sample_rate: SAMPLE_RATE,
            max_tracks: MAX_NUM_TRACKS,
            ramp_frames: None,
            mixer_in_format: MixFormat::Float,
            output_format: MixFormat::Pcm16,
            main_buses: 1,
            aux_buses: 1,
            resampler_quality: ResamplerQuality::Linear,
        }
    }
}

impl MixerConfig {
    /// Create a config with default settings for the given block size and rate.
    pub fn new(frame_count: usize, sample_rate: u32) -> Self {
        Self {
            frame_count,
            sample_rate,
            ..Self::default()
        }
    }

    /// Frames a volume ramp lasts.
    pub fn ramp_frames(&self) -> usize {
        self.ramp_frames.unwrap_or(self.frame_count)
    }

    /// Check every setting is usable.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.frame_count == 0 {
            return Err(ConfigurationError::InvalidConfig(
                "frame_count must be positive".to_string(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(ConfigurationError::InvalidConfig(
                "sample_rate must be positive".to_string(),
            ));
        }
        if self.max_tracks == 0 || self.max_tracks > MAX_NUM_TRACKS {
            return Err(ConfigurationError::InvalidConfig(format!(
                "max_tracks must be in 1..={}, got {}",
                MAX_NUM_TRACKS, self.max_tracks
            )));
        }
        if self.main_buses == 0 {
            return Err(ConfigurationError::InvalidConfig(
                "at least one main bus is required".to_string(),
            ));
        }
        Ok(())
    }
}
