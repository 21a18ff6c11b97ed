//! Multichannel to stereo reduction.
//!
//! Downmixing is a pluggable capability: the mixer asks a [`DownmixFactory`]
//! for a [`Downmixer`] matching a track's channel mask and wraps the track's
//! provider in a [`DownmixProvider`]. Output is always interleaved float
//! stereo.

use serde::{Deserialize, Serialize};

use super::{Buffer, BufferProvider, Samples};
use crate::convert::samples_to_f32;
use crate::format::{ChannelMask, SampleFormat, MAX_NUM_CHANNELS, MAX_NUM_CHANNELS_TO_DOWNMIX};

/// -3 dB, applied to positions shared by both output channels.
const MINUS_3_DB: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// How multichannel content is reduced to stereo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownmixType {
    /// Fold every position into the front pair.
    #[default]
    Fold,
    /// Keep the front pair and discard everything else.
    Strip,
}

/// Converts interleaved multichannel float frames into stereo.
pub trait Downmixer: Send {
    /// Number of interleaved input channels expected by [`Downmixer::process`].
    fn input_channels(&self) -> usize;

    /// Reduce `frames` frames from `input` into interleaved stereo `output`.
    fn process(&mut self, input: &[f32], output: &mut [f32], frames: usize);
}

/// Builds downmixers for channel layouts it supports.
pub trait DownmixFactory: Send + Sync {
    /// Return `true` when [`DownmixFactory::create`] would succeed.
    fn supports(&self, mask: ChannelMask, kind: DownmixType) -> bool;

    fn create(&self, mask: ChannelMask, kind: DownmixType) -> Option<Box<dyn Downmixer>>;
}

/// Matrix downmixer covering every layout of up to eight known positions.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDownmixFactory;

impl StandardDownmixFactory {
    /// Look up the downmix capability available to new mixers.
    pub fn probe() -> Option<Box<dyn DownmixFactory>> {
        Some(Box::new(StandardDownmixFactory))
    }
}

impl DownmixFactory for StandardDownmixFactory {
    fn supports(&self, mask: ChannelMask, kind: DownmixType) -> bool {
        let channels = mask.channel_count();
        if !mask.is_valid() || channels <= MAX_NUM_CHANNELS || channels > MAX_NUM_CHANNELS_TO_DOWNMIX
        {
            return false;
        }
        match kind {
            DownmixType::Fold => true,
            DownmixType::Strip => {
                mask.contains(ChannelMask::FRONT_LEFT) && mask.contains(ChannelMask::FRONT_RIGHT)
            }
        }
    }

    fn create(&self, mask: ChannelMask, kind: DownmixType) -> Option<Box<dyn Downmixer>> {
        if !self.supports(mask, kind) {
            return None;
        }
        Some(Box::new(MatrixDownmixer::new(mask, kind)))
    }
}

/// Per-position `(left, right)` contributions for a fold.
fn fold_gains(position: u32) -> (f32, f32) {
    match position {
        ChannelMask::FRONT_LEFT
        | ChannelMask::BACK_LEFT
        | ChannelMask::SIDE_LEFT
        | ChannelMask::FRONT_LEFT_OF_CENTER => (1.0, 0.0),
        ChannelMask::FRONT_RIGHT
        | ChannelMask::BACK_RIGHT
        | ChannelMask::SIDE_RIGHT
        | ChannelMask::FRONT_RIGHT_OF_CENTER => (0.0, 1.0),
        ChannelMask::FRONT_CENTER | ChannelMask::LOW_FREQUENCY | ChannelMask::BACK_CENTER => {
            (MINUS_3_DB, MINUS_3_DB)
        }
        _ => (0.0, 0.0),
    }
}

fn strip_gains(position: u32) -> (f32, f32) {
    match position {
        ChannelMask::FRONT_LEFT => (1.0, 0.0),
        ChannelMask::FRONT_RIGHT => (0.0, 1.0),
        _ => (0.0, 0.0),
    }
}

#[derive(Debug, Clone)]
struct MatrixDownmixer {
    channels: usize,
    gains: [(f32, f32); MAX_NUM_CHANNELS_TO_DOWNMIX],
}

impl MatrixDownmixer {
    fn new(mask: ChannelMask, kind: DownmixType) -> Self {
        let mut gains = [(0.0, 0.0); MAX_NUM_CHANNELS_TO_DOWNMIX];
        for (slot, position) in gains.iter_mut().zip(mask.positions()) {
            *slot = match kind {
                DownmixType::Fold => fold_gains(position),
                DownmixType::Strip => strip_gains(position),
            };
        }
        Self {
            channels: mask.channel_count(),
            gains,
        }
    }
}

impl Downmixer for MatrixDownmixer {
    fn input_channels(&self) -> usize {
        self.channels
    }

    fn process(&mut self, input: &[f32], output: &mut [f32], frames: usize) {
        let gains = &self.gains[..self.channels];
        for (frame, out) in input
            .chunks_exact(self.channels)
            .zip(output.chunks_exact_mut(MAX_NUM_CHANNELS))
            .take(frames)
        {
            let mut left = 0.0;
            let mut right = 0.0;
            for (&sample, &(gain_left, gain_right)) in frame.iter().zip(gains) {
                left += sample * gain_left;
                right += sample * gain_right;
            }
            out[0] = left.clamp(-1.0, 1.0);
            out[1] = right.clamp(-1.0, 1.0);
        }
    }
}

/// Presents a multichannel provider as interleaved float stereo.
pub struct DownmixProvider<P> {
    inner: P,
    downmixer: Box<dyn Downmixer>,
    input: Vec<f32>,
    output: Vec<f32>,
}

impl<P: BufferProvider> DownmixProvider<P> {
    /// Wrap `inner`, converting at most `max_frames` frames per request.
    pub fn new(inner: P, downmixer: Box<dyn Downmixer>, max_frames: usize) -> Self {
        let max_frames = max_frames.max(1);
        let input = vec![0.0; max_frames * downmixer.input_channels()];
        Self {
            inner,
            downmixer,
            input,
            output: vec![0.0; max_frames * MAX_NUM_CHANNELS],
        }
    }

    pub fn input_channels(&self) -> usize {
        self.downmixer.input_channels()
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Drop the wrapper and hand back the wrapped provider.
    pub fn into_inner(self) -> P {
        self.inner
    }
}

impl<P: BufferProvider> BufferProvider for DownmixProvider<P> {
    fn get_next_buffer(&mut self, frames: usize, pts: Option<i64>) -> Option<Buffer<'_>> {
        let channels = self.downmixer.input_channels();
        let request = frames.min(self.output.len() / MAX_NUM_CHANNELS);
        let granted = {
            let buffer = self.inner.get_next_buffer(request, pts)?;
            let granted = buffer.frames.min(request);
            samples_to_f32(&buffer.samples, &mut self.input[..granted * channels]);
            granted
        };
        self.downmixer.process(
            &self.input[..granted * channels],
            &mut self.output[..granted * MAX_NUM_CHANNELS],
            granted,
        );
        Some(Buffer::new(
            granted,
            Samples::Float(&self.output[..granted * MAX_NUM_CHANNELS]),
        ))
    }

    fn release_buffer(&mut self, frames: usize) {
        self.inner.release_buffer(frames);
    }

    fn channel_count(&self) -> usize {
        MAX_NUM_CHANNELS
    }

    fn format(&self) -> SampleFormat {
        SampleFormat::Float
    }
}

impl<P> std::fmt::Debug for DownmixProvider<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownmixProvider")
            .field("input_channels", &self.downmixer.input_channels())
            .field("max_frames", &(self.output.len() / MAX_NUM_CHANNELS))
            .finish()
    }
}
