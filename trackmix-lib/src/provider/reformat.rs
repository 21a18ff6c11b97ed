//! Provider wrapper converting sample representation.

use super::{Buffer, BufferProvider, Samples};
use crate::convert::{samples_to_f32, samples_to_i16};
use crate::format::{MixFormat, SampleFormat};

#[derive(Debug)]
enum Scratch {
    PassThrough,
    Pcm16(Vec<i16>),
    Float(Vec<f32>),
}

/// Converts frames from the wrapped provider into a mix format.
///
/// Channel count is left untouched. When the input already is the requested
/// output representation the wrapper forwards buffers as-is and owns no
/// scratch memory.
#[derive(Debug)]
pub struct ReformatProvider<P> {
    inner: P,
    channels: usize,
    input_format: SampleFormat,
    output_format: MixFormat,
    scratch: Scratch,
}

impl<P: BufferProvider> ReformatProvider<P> {
    /// Wrap `inner`.
    ///
    /// # Arguments
    /// - `inner`: Provider producing `input_format` frames.
    /// - `channels`: Interleaved channel count of `inner`.
    /// - `input_format`: Representation produced by `inner`.
    /// - `output_format`: Representation handed to the caller.
    /// - `max_frames`: Largest run of frames converted per request.
    pub fn new(
        inner: P,
        channels: usize,
        input_format: SampleFormat,
        output_format: MixFormat,
        max_frames: usize,
    ) -> Self {
        let channels = channels.max(1);
        let samples = max_frames.max(1) * channels;
        let scratch = if input_format == SampleFormat::from(output_format) {
            Scratch::PassThrough
        } else {
            match output_format {
                MixFormat::Pcm16 => Scratch::Pcm16(vec![0; samples]),
                MixFormat::Float => Scratch::Float(vec![0.0; samples]),
            }
        };
        Self {
            inner,
            channels,
            input_format,
            output_format,
            scratch,
        }
    }

    /// Return `true` when frames are converted through a scratch buffer.
    pub fn requires_internal_buffers(&self) -> bool {
        !matches!(self.scratch, Scratch::PassThrough)
    }

    pub fn input_format(&self) -> SampleFormat {
        self.input_format
    }

    pub fn output_format(&self) -> MixFormat {
        self.output_format
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Drop the wrapper and hand back the wrapped provider.
    pub fn into_inner(self) -> P {
        self.inner
    }
}

impl<P: BufferProvider> BufferProvider for ReformatProvider<P> {
    fn get_next_buffer(&mut self, frames: usize, pts: Option<i64>) -> Option<Buffer<'_>> {
        let channels = self.channels;
        match &mut self.scratch {
            Scratch::PassThrough => self.inner.get_next_buffer(frames, pts),
            Scratch::Pcm16(scratch) => {
                let request = frames.min(scratch.len() / channels);
                let granted = {
                    let buffer = self.inner.get_next_buffer(request, pts)?;
                    let granted = buffer.frames.min(request);
                    samples_to_i16(&buffer.samples, &mut scratch[..granted * channels]);
                    granted
                };
                Some(Buffer::new(
                    granted,
                    Samples::Pcm16(&scratch[..granted * channels]),
                ))
            }
            Scratch::Float(scratch) => {
                let request = frames.min(scratch.len() / channels);
                let granted = {
                    let buffer = self.inner.get_next_buffer(request, pts)?;
                    let granted = buffer.frames.min(request);
                    samples_to_f32(&buffer.samples, &mut scratch[..granted * channels]);
                    granted
                };
                Some(Buffer::new(
                    granted,
                    Samples::Float(&scratch[..granted * channels]),
                ))
            }
        }
    }

    fn release_buffer(&mut self, frames: usize) {
        self.inner.release_buffer(frames);
    }

    fn channel_count(&self) -> usize {
        self.channels
    }

    fn format(&self) -> SampleFormat {
        SampleFormat::from(self.output_format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::VecProvider;

    #[test]
    fn matching_formats_pass_through_without_scratch() {
        let inner = VecProvider::float(2, vec![0.5; 8]);
        let mut provider = ReformatProvider::new(inner, 2, SampleFormat::Float, MixFormat::Float, 4);
        assert!(!provider.requires_internal_buffers());
        let buffer = provider.get_next_buffer(4, None).expect("buffer");
        assert_eq!(buffer.frames, 4);
    }

    #[test]
    fn pcm32_converts_to_float() {
        let inner = VecProvider::pcm32(1, vec![0x4000_0000, -0x4000_0000]);
        let mut provider = ReformatProvider::new(inner, 1, SampleFormat::Pcm32, MixFormat::Float, 8);
        assert!(provider.requires_internal_buffers());
        let buffer = provider.get_next_buffer(8, None).expect("buffer");
        match buffer.samples {
            Samples::Float(data) => assert_eq!(data, &[0.5, -0.5]),
            other => panic!("unexpected samples {:?}", other),
        }
    }

    #[test]
    fn release_reaches_the_wrapped_provider() {
        let inner = VecProvider::float(1, vec![0.25, 0.5, 0.75]);
        let mut provider = ReformatProvider::new(inner, 1, SampleFormat::Float, MixFormat::Pcm16, 2);
        let buffer = provider.get_next_buffer(3, None).expect("buffer");
        assert_eq!(buffer.frames, 2);
        match buffer.samples {
            Samples::Pcm16(data) => assert_eq!(data, &[8_192, 16_384]),
            other => panic!("unexpected samples {:?}", other),
        }
        provider.release_buffer(1);
        assert_eq!(provider.inner().position(), 1);
        assert_eq!(provider.into_inner().frames_remaining(), 2);
    }
}
