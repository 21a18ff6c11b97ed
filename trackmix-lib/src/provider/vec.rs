//! Provider over an owned vector of decoded samples.

use super::{Buffer, BufferProvider, Samples};
use crate::format::SampleFormat;

#[derive(Debug, Clone)]
enum OwnedSamples {
    Pcm16(Vec<i16>),
    Pcm24Packed(Vec<u8>),
    Pcm32(Vec<i32>),
    Float(Vec<f32>),
}

impl OwnedSamples {
    fn sample_count(&self) -> usize {
        match self {
            Self::Pcm16(data) => data.len(),
            Self::Pcm24Packed(data) => data.len() / 3,
            Self::Pcm32(data) => data.len(),
            Self::Float(data) => data.len(),
        }
    }

    fn slice(&self, start: usize, end: usize) -> Samples<'_> {
        match self {
            Self::Pcm16(data) => Samples::Pcm16(&data[start..end]),
            Self::Pcm24Packed(data) => Samples::Pcm24Packed(&data[start * 3..end * 3]),
            Self::Pcm32(data) => Samples::Pcm32(&data[start..end]),
            Self::Float(data) => Samples::Float(&data[start..end]),
        }
    }
}

/// Plays back an in-memory interleaved sample vector, optionally looping.
#[derive(Debug, Clone)]
pub struct VecProvider {
    samples: OwnedSamples,
    channels: usize,
    frame_count: usize,
    position: usize,
    looping: bool,
    last_pts: Option<i64>,
}

impl VecProvider {
    fn from_owned(channels: usize, samples: OwnedSamples) -> Self {
        let channels = channels.max(1);
        let frame_count = samples.sample_count() / channels;
        Self {
            samples,
            channels,
            frame_count,
            position: 0,
            looping: false,
            last_pts: None,
        }
    }

    /// Provider over signed 16-bit interleaved samples.
    pub fn pcm16(channels: usize, samples: Vec<i16>) -> Self {
        Self::from_owned(channels, OwnedSamples::Pcm16(samples))
    }

    /// Provider over packed 24-bit interleaved samples (3 bytes each).
    pub fn pcm24_packed(channels: usize, bytes: Vec<u8>) -> Self {
        Self::from_owned(channels, OwnedSamples::Pcm24Packed(bytes))
    }

    /// Provider over signed 32-bit interleaved samples.
    pub fn pcm32(channels: usize, samples: Vec<i32>) -> Self {
        Self::from_owned(channels, OwnedSamples::Pcm32(samples))
    }

    /// Provider over float interleaved samples.
    pub fn float(channels: usize, samples: Vec<f32>) -> Self {
        Self::from_owned(channels, OwnedSamples::Float(samples))
    }

    /// Restart from the first frame once the end is reached.
    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn format(&self) -> SampleFormat {
        match self.samples {
            OwnedSamples::Pcm16(_) => SampleFormat::Pcm16,
            OwnedSamples::Pcm24Packed(_) => SampleFormat::Pcm24Packed,
            OwnedSamples::Pcm32(_) => SampleFormat::Pcm32,
            OwnedSamples::Float(_) => SampleFormat::Float,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Total number of frames held.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Index of the next frame to be handed out.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Frames left before the end (ignores looping).
    pub fn frames_remaining(&self) -> usize {
        self.frame_count - self.position
    }

    /// Presentation time passed with the most recent request.
    pub fn last_pts(&self) -> Option<i64> {
        self.last_pts
    }
}

impl BufferProvider for VecProvider {
    fn get_next_buffer(&mut self, frames: usize, pts: Option<i64>) -> Option<Buffer<'_>> {
        self.last_pts = pts;
        if self.position >= self.frame_count {
            if !self.looping || self.frame_count == 0 {
                return None;
            }
            self.position = 0;
        }
        let granted = frames.min(self.frame_count - self.position);
        if granted == 0 {
            return None;
        }
        let start = self.position * self.channels;
        let end = start + granted * self.channels;
        Some(Buffer::new(granted, self.samples.slice(start, end)))
    }

    fn release_buffer(&mut self, frames: usize) {
        self.position = (self.position + frames).min(self.frame_count);
    }

    fn channel_count(&self) -> usize {
        self.channels
    }

    fn format(&self) -> SampleFormat {
        VecProvider::format(self)
    }
}
