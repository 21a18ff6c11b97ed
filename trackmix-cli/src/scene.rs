//! JSON scene descriptions rendered by `trackmix render`.
//!
//! A scene holds a mixer configuration, a duration and a list of tracks. Each
//! track names a source (a generated tone or an audio file), the sample format
//! it is delivered to the mixer in, its routing and gains, and optional gain
//! events applied at block boundaries.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

use trackmix_lib::constants::UNITY_GAIN;
use trackmix_lib::format::{MixFormat, SampleFormat};
use trackmix_lib::gain::deserialize_linear_gain;
use trackmix_lib::provider::DownmixType;
use trackmix_lib::MixerConfig;

use crate::error::RunError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    pub mixer: MixerConfig,
    #[serde(alias = "duration")]
    pub duration_ms: u64,
    pub tracks: Vec<TrackSpec>,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            mixer: MixerConfig::default(),
            duration_ms: 1_000,
            tracks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSpec {
    Tone {
        frequency: f32,
        #[serde(default = "default_tone_channels")]
        channels: usize,
        #[serde(default = "default_tone_rate")]
        sample_rate: u32,
        #[serde(default = "default_tone_seconds")]
        seconds: f32,
        #[serde(default = "default_tone_amplitude")]
        amplitude: f32,
    },
    /// Decoded in full before rendering; relative paths resolve against the scene file.
    File { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSpec {
    pub source: SourceSpec,
    /// Representation the decoded source is handed to the mixer in.
    #[serde(default = "default_track_format")]
    pub format: SampleFormat,
    #[serde(default)]
    pub looping: bool,
    #[serde(
        default = "default_unity_gain",
        deserialize_with = "deserialize_linear_gain"
    )]
    pub gain: f32,
    #[serde(default, deserialize_with = "deserialize_linear_gain")]
    pub aux_level: f32,
    #[serde(default)]
    pub bus: usize,
    #[serde(default)]
    pub aux_bus: Option<usize>,
    #[serde(default)]
    pub mixer_format: Option<MixFormat>,
    #[serde(default)]
    pub downmix: DownmixType,
    #[serde(default)]
    pub start_ms: u64,
    #[serde(default)]
    pub events: Vec<TrackEvent>,
}

/// Changes applied to a track once rendering reaches `at_ms`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackEvent {
    pub at_ms: u64,
    #[serde(deserialize_with = "deserialize_optional_gain")]
    pub gain: Option<f32>,
    #[serde(deserialize_with = "deserialize_optional_gain")]
    pub aux_level: Option<f32>,
    /// Ramp gain changes over the mixer's ramp length instead of jumping.
    pub ramp: bool,
    pub enabled: Option<bool>,
}

fn default_tone_channels() -> usize {
    1
}

fn default_tone_rate() -> u32 {
    48_000
}

fn default_tone_seconds() -> f32 {
    1.0
}

fn default_tone_amplitude() -> f32 {
    0.5
}

fn default_track_format() -> SampleFormat {
    SampleFormat::Pcm16
}

fn default_unity_gain() -> f32 {
    UNITY_GAIN
}

fn deserialize_optional_gain<'de, D>(deserializer: D) -> Result<Option<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Gain(#[serde(deserialize_with = "deserialize_linear_gain")] f32);

    Ok(Option::<Gain>::deserialize(deserializer)?.map(|Gain(gain)| gain))
}

impl Scene {
    /// Parse a scene from JSON text.
    pub fn from_json(text: &str) -> Result<Self, RunError> {
        let scene: Scene = serde_json::from_str(text)?;
        scene.validate()?;
        Ok(scene)
    }

    /// Reject settings the mixer would accept but that cannot be rendered.
    pub fn validate(&self) -> Result<(), RunError> {
        self.mixer
            .validate()
            .map_err(|err| RunError::Scene(err.to_string()))?;
        for (index, track) in self.tracks.iter().enumerate() {
            if let SourceSpec::Tone {
                frequency,
                channels,
                sample_rate,
                seconds,
                ..
            } = &track.source
            {
                if *channels == 0 || *sample_rate == 0 {
                    return Err(RunError::Scene(format!(
                        "track {} tone needs channels and a sample rate",
                        index
                    )));
                }
                if !frequency.is_finite() || !seconds.is_finite() || *seconds <= 0.0 {
                    return Err(RunError::Scene(format!(
                        "track {} tone needs a finite frequency and positive length",
                        index
                    )));
                }
            }
        }
        Ok(())
    }

    /// Number of blocks needed to cover `duration_ms`.
    pub fn block_count(&self) -> usize {
        let frames = ms_to_frames(self.duration_ms, self.mixer.sample_rate);
        frames.div_ceil(self.mixer.frame_count.max(1))
    }

    /// Sample format written for main bus `bus`.
    ///
    /// A bus holding any float track is written as float for the whole
    /// render, whenever that track starts.
    pub fn bus_format(&self, bus: usize) -> MixFormat {
        let mut routed = self
            .tracks
            .iter()
            .filter(|track| track.bus == bus)
            .map(|track| track.mixer_format.unwrap_or(self.mixer.output_format))
            .peekable();
        if routed.peek().is_none() {
            return self.mixer.output_format;
        }
        if routed.any(|format| format == MixFormat::Float) {
            MixFormat::Float
        } else {
            MixFormat::Pcm16
        }
    }

    /// Scene printed by `trackmix create scene-json`.
    pub fn example() -> Self {
        Self {
            mixer: MixerConfig::default(),
            duration_ms: 2_000,
            tracks: vec![
                TrackSpec {
                    source: SourceSpec::Tone {
                        frequency: 440.0,
                        channels: 1,
                        sample_rate: 48_000,
                        seconds: 2.0,
                        amplitude: 0.5,
                    },
                    format: SampleFormat::Pcm16,
                    looping: false,
                    gain: 0.5,
                    aux_level: 0.0,
                    bus: 0,
                    aux_bus: None,
                    mixer_format: None,
                    downmix: DownmixType::Fold,
                    start_ms: 0,
                    events: vec![TrackEvent {
                        at_ms: 1_000,
                        gain: Some(0.1),
                        ramp: true,
                        ..TrackEvent::default()
                    }],
                },
                TrackSpec {
                    source: SourceSpec::File {
                        path: PathBuf::from("input.wav"),
                    },
                    format: SampleFormat::Float,
                    looping: true,
                    gain: UNITY_GAIN,
                    aux_level: 0.25,
                    bus: 0,
                    aux_bus: Some(0),
                    mixer_format: None,
                    downmix: DownmixType::Fold,
                    start_ms: 500,
                    events: Vec::new(),
                },
            ],
        }
    }
}

/// Frames covering `ms` milliseconds at `rate`, rounded down.
pub fn ms_to_frames(ms: u64, rate: u32) -> usize {
    (ms as u128 * rate as u128 / 1_000) as usize
}
