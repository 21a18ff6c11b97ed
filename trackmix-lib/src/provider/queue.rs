//! Shared ring-buffer provider fed by a non-realtime thread.
//!
//! The writer side pushes interleaved float frames into a bounded ring buffer;
//! the provider side drains it into a fixed staging area on the render
//! thread. The render side only ever uses `try_lock`, so a writer holding the
//! lock shows up as a short underrun instead of a stalled callback.

use dasp_ring_buffer::Bounded;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use super::{Buffer, BufferProvider, Samples};
use crate::format::SampleFormat;

/// Shared ring buffer holding interleaved float samples.
pub type SampleQueue = Arc<Mutex<Bounded<Vec<f32>>>>;

/// Create a connected writer/provider pair.
///
/// # Arguments
/// - `channels`: Interleaved channel count of the stream.
/// - `capacity_frames`: Frames the ring buffer can hold.
/// - `staging_frames`: Largest run of frames handed out per request.
pub fn sample_queue(
    channels: usize,
    capacity_frames: usize,
    staging_frames: usize,
) -> (QueueWriter, QueueProvider) {
    let channels = channels.max(1);
    let queue: SampleQueue = Arc::new(Mutex::new(Bounded::from(vec![
        0.0;
        capacity_frames.max(1) * channels
    ])));
    let finished = Arc::new(AtomicBool::new(false));
    let writer = QueueWriter {
        queue: queue.clone(),
        channels,
        finished: finished.clone(),
    };
    let provider = QueueProvider {
        queue,
        channels,
        staging: vec![0.0; staging_frames.max(1) * channels],
        staged: 0,
        offset: 0,
        finished,
    };
    (writer, provider)
}

fn lock_queue(queue: &SampleQueue) -> MutexGuard<'_, Bounded<Vec<f32>>> {
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Producer half of a [`sample_queue`].
#[derive(Debug, Clone)]
pub struct QueueWriter {
    queue: SampleQueue,
    channels: usize,
    finished: Arc<AtomicBool>,
}

impl QueueWriter {
    /// Return the number of whole frames that can be pushed without overwriting.
    pub fn remaining_frames(&self) -> usize {
        let queue = lock_queue(&self.queue);
        queue.max_len().saturating_sub(queue.len()) / self.channels
    }

    /// Push interleaved samples without blocking.
    ///
    /// Only whole frames that fit are accepted.
    ///
    /// # Returns
    /// The number of frames written.
    pub fn push_interleaved(&self, samples: &[f32]) -> usize {
        let mut queue = lock_queue(&self.queue);
        let room = queue.max_len().saturating_sub(queue.len()) / self.channels;
        let frames = room.min(samples.len() / self.channels);
        for &sample in &samples[..frames * self.channels] {
            queue.push(sample);
        }
        frames
    }

    /// Signal that no more frames will be written (idempotent).
    pub fn mark_finished(&self) {
        if !self.finished.swap(true, Ordering::AcqRel) {
            log::debug!("sample queue finished");
        }
    }
}

/// Consumer half of a [`sample_queue`], used as a mixer track source.
#[derive(Debug)]
pub struct QueueProvider {
    queue: SampleQueue,
    channels: usize,
    staging: Vec<f32>,
    staged: usize,
    offset: usize,
    finished: Arc<AtomicBool>,
}

impl QueueProvider {
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Return `true` once the writer finished and every frame was consumed.
    pub fn is_finished(&self) -> bool {
        if !self.finished.load(Ordering::Acquire) || self.offset < self.staged {
            return false;
        }
        lock_queue(&self.queue).is_empty()
    }

    fn refill(&mut self) {
        self.offset = 0;
        self.staged = 0;
        let mut queue = match self.queue.try_lock() {
            Ok(queue) => queue,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return,
        };
        let capacity = self.staging.len() / self.channels;
        let frames = (queue.len() / self.channels).min(capacity);
        for slot in self.staging[..frames * self.channels].iter_mut() {
            *slot = queue.pop().unwrap_or(0.0);
        }
        self.staged = frames;
    }
}

impl BufferProvider for QueueProvider {
    fn get_next_buffer(&mut self, frames: usize, _pts: Option<i64>) -> Option<Buffer<'_>> {
        if self.offset >= self.staged {
            self.refill();
        }
        let granted = frames.min(self.staged - self.offset);
        if granted == 0 {
            return None;
        }
        let start = self.offset * self.channels;
        let end = start + granted * self.channels;
        Some(Buffer::new(granted, Samples::Float(&self.staging[start..end])))
    }

    fn release_buffer(&mut self, frames: usize) {
        self.offset = (self.offset + frames).min(self.staged);
    }

    fn channel_count(&self) -> usize {
        self.channels
    }

    fn format(&self) -> SampleFormat {
        SampleFormat::Float
    }
}
