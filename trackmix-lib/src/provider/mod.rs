//! Frame suppliers feeding mixer tracks.
//!
//! A [`BufferProvider`] hands out contiguous runs of interleaved frames on
//! request and is told afterwards how many of them were consumed. Frames that
//! are not released must be offered again on the next request.
//!
//! - `vec`: a provider over an owned, fully decoded sample vector.
//! - `queue`: a provider fed by another thread through a shared ring buffer.
//! - `reformat`: a wrapper converting between sample representations.
//! - `downmix`: a wrapper reducing multichannel content to stereo.

use crate::format::SampleFormat;

pub mod downmix;
pub mod queue;
pub mod reformat;
pub mod vec;

pub use downmix::{
    DownmixFactory, DownmixProvider, DownmixType, Downmixer, StandardDownmixFactory,
};
pub use queue::{sample_queue, QueueProvider, QueueWriter};
pub use reformat::ReformatProvider;
pub use vec::VecProvider;

/// Interleaved samples borrowed from a provider.
#[derive(Debug, Clone, Copy)]
pub enum Samples<'a> {
    Pcm16(&'a [i16]),
    /// Three little-endian bytes per sample.
    Pcm24Packed(&'a [u8]),
    Pcm32(&'a [i32]),
    Float(&'a [f32]),
}

impl<'a> Samples<'a> {
    /// Representation of the borrowed samples.
    pub fn format(&self) -> SampleFormat {
        match self {
            Self::Pcm16(_) => SampleFormat::Pcm16,
            Self::Pcm24Packed(_) => SampleFormat::Pcm24Packed,
            Self::Pcm32(_) => SampleFormat::Pcm32,
            Self::Float(_) => SampleFormat::Float,
        }
    }

    /// Number of samples (not bytes) in the slice.
    pub fn len(&self) -> usize {
        match self {
            Self::Pcm16(data) => data.len(),
            Self::Pcm24Packed(data) => data.len() / 3,
            Self::Pcm32(data) => data.len(),
            Self::Float(data) => data.len(),
        }
    }

    /// Return `true` when no samples are borrowed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A run of frames granted by [`BufferProvider::get_next_buffer`].
#[derive(Debug, Clone, Copy)]
pub struct Buffer<'a> {
    /// Number of whole frames in `samples`.
    pub frames: usize,
    pub samples: Samples<'a>,
}

impl<'a> Buffer<'a> {
    pub fn new(frames: usize, samples: Samples<'a>) -> Self {
        Self { frames, samples }
    }
}

/// Source of interleaved frames for a mixer track.
///
/// Providers are polled from the render thread, so implementations must not
/// block or allocate inside `get_next_buffer` and `release_buffer`.
pub trait BufferProvider: Send {
    /// Request up to `frames` frames.
    ///
    /// `pts` is the presentation time, in nanoseconds, of the first requested
    /// frame when the caller tracks time. Returns `None` when nothing is
    /// available right now; a returned buffer holds between 1 and `frames`
    /// frames.
    fn get_next_buffer(&mut self, frames: usize, pts: Option<i64>) -> Option<Buffer<'_>>;

    /// Mark the first `frames` frames of the last granted buffer as consumed.
    fn release_buffer(&mut self, frames: usize);

    /// Interleaved channel count of every granted buffer.
    fn channel_count(&self) -> usize;

    /// Sample representation of every granted buffer.
    fn format(&self) -> SampleFormat;
}

impl<P: BufferProvider + ?Sized> BufferProvider for Box<P> {
    fn get_next_buffer(&mut self, frames: usize, pts: Option<i64>) -> Option<Buffer<'_>> {
        (**self).get_next_buffer(frames, pts)
    }

    fn release_buffer(&mut self, frames: usize) {
        (**self).release_buffer(frames)
    }

    fn channel_count(&self) -> usize {
        (**self).channel_count()
    }

    fn format(&self) -> SampleFormat {
        (**self).format()
    }
}

impl std::fmt::Debug for dyn BufferProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferProvider")
            .field("channels", &self.channel_count())
            .field("format", &self.format())
            .finish()
    }
}

/// Type-erased provider handed to the mixer by its caller.
pub type BoxedProvider = Box<dyn BufferProvider>;
