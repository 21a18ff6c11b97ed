//! Helpers for turning mixer output into `rodio` sources.

use rodio::buffer::SamplesBuffer;
use rodio::{ChannelCount, SampleRate, Source};
use std::time::Duration;

use crate::format::MAX_NUM_CHANNELS;
use crate::mixer::{AudioMixer, BusId, OutputBuffer};
use crate::resampler::frames_to_nanos;

/// Pull-driven [`Source`] rendering one main bus of a mixer.
///
/// Each time the current block is exhausted the mixer renders the next one.
/// The source ends after `blocks` blocks, or never when `blocks` is `None`.
///
/// # Example
/// ```rust
/// use trackmix_lib::audio::samples::MixerSource;
/// use trackmix_lib::config::MixerConfig;
/// use trackmix_lib::mixer::{AudioMixer, BusId};
///
/// let mixer = AudioMixer::new(MixerConfig::new(64, 48_000)).unwrap();
/// let source = MixerSource::new(mixer, BusId(0), Some(2));
/// assert_eq!(source.count(), 2 * 64 * 2);
/// ```
#[derive(Debug)]
pub struct MixerSource {
    mixer: AudioMixer,
    bus: BusId,
    position: usize,
    block_len: usize,
    remaining_blocks: Option<usize>,
    next_pts: i64,
}

impl MixerSource {
    pub fn new(mixer: AudioMixer, bus: BusId, blocks: Option<usize>) -> Self {
        let block_len = mixer.frame_count() * MAX_NUM_CHANNELS;
        Self {
            mixer,
            bus,
            position: block_len,
            block_len,
            remaining_blocks: blocks,
            next_pts: 0,
        }
    }

    pub fn mixer(&self) -> &AudioMixer {
        &self.mixer
    }

    /// Access the mixer between blocks, e.g. to apply parameter changes.
    pub fn mixer_mut(&mut self) -> &mut AudioMixer {
        &mut self.mixer
    }

    pub fn into_mixer(self) -> AudioMixer {
        self.mixer
    }

    fn render_block(&mut self) -> bool {
        match self.remaining_blocks.as_mut() {
            Some(0) => return false,
            Some(remaining) => *remaining -= 1,
            None => {}
        }
        self.mixer.process(Some(self.next_pts));
        self.next_pts += frames_to_nanos(self.mixer.frame_count(), self.mixer.sample_rate());
        self.position = 0;
        true
    }
}

impl Iterator for MixerSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.position >= self.block_len && !self.render_block() {
            return None;
        }
        let sample = match self.mixer.main_buffer(self.bus)? {
            OutputBuffer::Pcm16(data) => crate::convert::i16_to_f32(data[self.position]),
            OutputBuffer::Float(data) => data[self.position],
        };
        self.position += 1;
        Some(sample)
    }
}

impl Source for MixerSource {
    fn current_span_len(&self) -> Option<usize> {
        if self.position < self.block_len {
            Some(self.block_len - self.position)
        } else if self.remaining_blocks == Some(0) {
            Some(0)
        } else {
            Some(self.block_len)
        }
    }

    fn channels(&self) -> ChannelCount {
        MAX_NUM_CHANNELS as ChannelCount
    }

    fn sample_rate(&self) -> SampleRate {
        self.mixer.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// Render `blocks` blocks of one main bus into a [`SamplesBuffer`].
pub fn render_to_samples_buffer(mixer: AudioMixer, bus: BusId, blocks: usize) -> SamplesBuffer {
    let sample_rate = mixer.sample_rate();
    let samples: Vec<f32> = MixerSource::new(mixer, bus, Some(blocks)).collect();
    SamplesBuffer::new(MAX_NUM_CHANNELS as ChannelCount, sample_rate, samples)
}
