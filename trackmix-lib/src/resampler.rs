//! Per-track sample-rate conversion.
//!
//! The resampler pulls frames from a track's provider into a fixed staging
//! area and interpolates between them with a 32.32 fixed-point phase
//! accumulator. Upstream frames are released as soon as they are staged; the
//! frames staged but not yet stepped over are reported by
//! [`Resampler::unreleased_frames`].

use serde::{Deserialize, Serialize};

use crate::convert::samples_to_f32;
use crate::provider::BufferProvider;

/// Largest supported ratio of input rate to output rate.
pub const MAX_RATE_RATIO: u32 = 2;

const PHASE_BITS: u32 = 32;
const PHASE_SCALE: f32 = (1u64 << PHASE_BITS) as f32;

/// Interpolation used between input frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResamplerQuality {
    /// Two-point linear interpolation.
    #[default]
    Linear,
    /// Four-point Catmull-Rom interpolation.
    Cubic,
}

impl ResamplerQuality {
    /// Frames kept behind the read position.
    fn history(self) -> usize {
        match self {
            Self::Linear => 0,
            Self::Cubic => 1,
        }
    }

    /// Frames needed ahead of the read position.
    fn lookahead(self) -> usize {
        match self {
            Self::Linear => 1,
            Self::Cubic => 2,
        }
    }
}

/// Fixed-point phase increment for converting `input_rate` to `output_rate`.
fn phase_increment(input_rate: u32, output_rate: u32) -> u64 {
    (u64::from(input_rate) << PHASE_BITS) / u64::from(output_rate.max(1))
}

#[inline]
fn cubic(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let a0 = -0.5 * p0 + 1.5 * p1 - 1.5 * p2 + 0.5 * p3;
    let a1 = p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3;
    let a2 = -0.5 * p0 + 0.5 * p2;
    ((a0 * t + a1) * t + a2) * t + p1
}

/// Sample-rate converter producing unity-gain interleaved float frames.
#[derive(Debug, Clone)]
pub struct Resampler {
    quality: ResamplerQuality,
    channels: usize,
    input_rate: u32,
    output_rate: u32,
    increment: u64,
    fraction: u32,
    staging: Vec<f32>,
    /// Frames currently staged, including history.
    staged: usize,
    /// Integer read position in frames.
    index: usize,
}

impl Resampler {
    /// Create a resampler.
    ///
    /// # Arguments
    /// - `quality`: Interpolation to use.
    /// - `channels`: Interleaved channel count (1 or 2).
    /// - `input_rate`: Rate of the upstream provider.
    /// - `output_rate`: Rate frames are produced at.
    /// - `max_output_frames`: Largest block requested from [`Resampler::resample`].
    pub fn new(
        quality: ResamplerQuality,
        channels: usize,
        input_rate: u32,
        output_rate: u32,
        max_output_frames: usize,
    ) -> Self {
        let channels = channels.max(1);
        let capacity = max_output_frames.max(1) * MAX_RATE_RATIO as usize
            + quality.history()
            + quality.lookahead()
            + 1;
        let history = quality.history();
        Self {
            quality,
            channels,
            input_rate,
            output_rate,
            increment: phase_increment(input_rate, output_rate),
            fraction: 0,
            staging: vec![0.0; capacity * channels],
            staged: history,
            index: history,
        }
    }

    pub fn quality(&self) -> ResamplerQuality {
        self.quality
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Change the input rate, keeping the current phase and staged frames.
    pub fn set_sample_rate(&mut self, input_rate: u32) {
        self.input_rate = input_rate;
        self.increment = phase_increment(input_rate, self.output_rate);
    }

    /// Discard staged frames and restart the phase at zero.
    pub fn reset(&mut self) {
        let history = self.quality.history();
        self.staging[..history * self.channels].fill(0.0);
        self.staged = history;
        self.index = history;
        self.fraction = 0;
    }

    /// Frames pulled from upstream that have not been stepped over yet.
    pub fn unreleased_frames(&self) -> usize {
        self.staged.saturating_sub(self.index)
    }

    /// Produce up to `frames` interleaved frames into `output`.
    ///
    /// `pts` is the presentation time of the first produced frame; requests
    /// to `provider` carry the time of the output frame being produced.
    ///
    /// # Returns
    /// Frames written. Fewer than `frames` means `provider` ran dry.
    pub fn resample(
        &mut self,
        output: &mut [f32],
        frames: usize,
        provider: &mut dyn BufferProvider,
        pts: Option<i64>,
    ) -> usize {
        let channels = self.channels;
        let lookahead = self.quality.lookahead();
        let frames = frames.min(output.len() / channels);
        let mut produced = 0;
        while produced < frames {
            if self.index + lookahead >= self.staged {
                let frame_pts =
                    pts.map(|pts| pts + frames_to_nanos(produced, self.output_rate));
                if !self.fill(provider, frame_pts) {
                    break;
                }
                continue;
            }

            let t = self.fraction as f32 / PHASE_SCALE;
            let base = self.index * channels;
            let out = &mut output[produced * channels..(produced + 1) * channels];
            match self.quality {
                ResamplerQuality::Linear => {
                    for (channel, slot) in out.iter_mut().enumerate() {
                        let a = self.staging[base + channel];
                        let b = self.staging[base + channels + channel];
                        *slot = a + (b - a) * t;
                    }
                }
                ResamplerQuality::Cubic => {
                    for (channel, slot) in out.iter_mut().enumerate() {
                        let at = |offset: usize| self.staging[base + offset + channel - channels];
                        *slot = cubic(at(0), at(channels), at(2 * channels), at(3 * channels), t);
                    }
                }
            }

            produced += 1;
            let phase = u64::from(self.fraction) + self.increment;
            self.index += (phase >> PHASE_BITS) as usize;
            self.fraction = phase as u32;
        }
        produced
    }

    /// Compact the staging area and pull more frames from `provider`.
    fn fill(&mut self, provider: &mut dyn BufferProvider, pts: Option<i64>) -> bool {
        let channels = self.channels;
        let keep_from = (self.index - self.quality.history()).min(self.staged);
        if keep_from > 0 {
            self.staging
                .copy_within(keep_from * channels..self.staged * channels, 0);
            self.staged -= keep_from;
            self.index -= keep_from;
        }

        let capacity = self.staging.len() / channels;
        let room = capacity - self.staged;
        let granted = match provider.get_next_buffer(room, pts) {
            Some(buffer) => {
                let granted = buffer.frames.min(room);
                let start = self.staged * channels;
                samples_to_f32(
                    &buffer.samples,
                    &mut self.staging[start..start + granted * channels],
                );
                granted
            }
            None => return false,
        };
        provider.release_buffer(granted);
        self.staged += granted;
        granted > 0
    }
}

/// Duration of `frames` frames at `rate`, in nanoseconds.
pub fn frames_to_nanos(frames: usize, rate: u32) -> i64 {
    (frames as i64).saturating_mul(1_000_000_000) / i64::from(rate.max(1))
}
