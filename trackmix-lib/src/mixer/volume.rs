//! Per-track gain state with linear ramps.

use crate::constants::UNITY_GAIN;

/// One gain value, optionally ramping towards a target.
///
/// Frame `k` of a ramp of `R` frames from `g0` to `g1` uses
/// `g0 + k * (g1 - g0) / R`; after `R` frames the gain is exactly `g1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Ramp {
    current: f32,
    target: f32,
    increment: f32,
    remaining: usize,
}

impl Ramp {
    pub(crate) const fn new(gain: f32) -> Self {
        Self {
            current: gain,
            target: gain,
            increment: 0.0,
            remaining: 0,
        }
    }

    /// Gain applied to the next frame.
    #[inline]
    pub(crate) fn gain(&self) -> f32 {
        self.current
    }

    #[inline]
    pub(crate) fn is_ramping(&self) -> bool {
        self.remaining > 0
    }

    /// Jump to `gain` immediately, cancelling any ramp.
    ///
    /// # Returns
    /// `true` when the state changed.
    pub(crate) fn set(&mut self, gain: f32) -> bool {
        let next = Self::new(gain);
        let changed = *self != next;
        *self = next;
        changed
    }

    /// Ramp from the current gain to `gain` over `frames` frames.
    ///
    /// # Returns
    /// `true` when the state changed.
    pub(crate) fn ramp_to(&mut self, gain: f32, frames: usize) -> bool {
        if gain == self.target {
            return false;
        }
        if frames == 0 || gain == self.current {
            return self.set(gain);
        }
        self.target = gain;
        self.increment = (gain - self.current) / frames as f32;
        self.remaining = frames;
        true
    }

    /// Advance one frame.
    #[inline]
    pub(crate) fn step(&mut self) {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.current = if self.remaining == 0 {
                self.target
            } else {
                self.current + self.increment
            };
        }
    }

    /// Advance `frames` frames at once.
    pub(crate) fn skip(&mut self, frames: usize) {
        if frames >= self.remaining {
            self.current = self.target;
            self.remaining = 0;
        } else {
            self.remaining -= frames;
            self.current += self.increment * frames as f32;
        }
    }
}

/// Left, right and auxiliary send gains of a track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TrackVolume {
    pub(crate) left: Ramp,
    pub(crate) right: Ramp,
    pub(crate) aux: Ramp,
}

impl Default for TrackVolume {
    fn default() -> Self {
        Self {
            left: Ramp::new(UNITY_GAIN),
            right: Ramp::new(UNITY_GAIN),
            aux: Ramp::new(0.0),
        }
    }
}

impl TrackVolume {
    #[inline]
    pub(crate) fn is_ramping(&self) -> bool {
        self.left.is_ramping() || self.right.is_ramping() || self.aux.is_ramping()
    }

    /// Both main gains are settled at zero.
    pub(crate) fn is_silent(&self) -> bool {
        self.left.gain() == 0.0
            && self.right.gain() == 0.0
            && !self.left.is_ramping()
            && !self.right.is_ramping()
    }

    /// The aux send is non-zero or on its way somewhere.
    pub(crate) fn sends_aux(&self) -> bool {
        self.aux.gain() != 0.0 || self.aux.is_ramping()
    }

    #[inline]
    pub(crate) fn step(&mut self) {
        self.left.step();
        self.right.step();
        self.aux.step();
    }

    pub(crate) fn skip(&mut self, frames: usize) {
        self.left.skip(frames);
        self.right.skip(frames);
        self.aux.skip(frames);
    }
}
