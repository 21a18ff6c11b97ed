//! Track handles and the parameters that can be set on them.

use std::fmt::{Display, Formatter};

use crate::format::{ChannelMask, MixFormat, SampleFormat};
use crate::provider::DownmixType;

/// Handle to an allocated track slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackName(u8);

impl TrackName {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u8)
    }

    /// Slot index, `0..32`.
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// Bit of this track in the mixer's name masks.
    pub fn bit(self) -> u32 {
        1 << self.0
    }
}

impl Display for TrackName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "track{}", self.0)
    }
}

/// Index of a main or auxiliary bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BusId(pub usize);

impl Display for BusId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "bus{}", self.0)
    }
}

/// Structural track settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackParameter {
    ChannelMask(ChannelMask),
    Format(SampleFormat),
    /// Stereo bus the track is mixed into.
    MainBuffer(BusId),
    /// Mono bus receiving the track's effect send, or none.
    AuxBuffer(Option<BusId>),
    DownmixType(DownmixType),
    /// Representation of the main bus the track writes.
    MixerFormat(MixFormat),
}

/// Sample-rate conversion settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleParameter {
    /// Rate of the track's provider, in Hz.
    SampleRate(u32),
    /// Drop staged frames and restart the interpolation phase.
    Reset,
    /// Drop the resampler and return to the mix rate.
    Remove,
}

/// Gain settings, linear and clamped to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VolumeParameter {
    Volume0(f32),
    Volume1(f32),
    AuxLevel(f32),
}

/// A parameter write addressed to one track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Parameter {
    Track(TrackParameter),
    Resample(ResampleParameter),
    /// Gain change ramped linearly over the configured ramp length.
    RampVolume(VolumeParameter),
    /// Gain change applied from the next frame.
    Volume(VolumeParameter),
}

impl From<TrackParameter> for Parameter {
    fn from(value: TrackParameter) -> Self {
        Self::Track(value)
    }
}

impl From<ResampleParameter> for Parameter {
    fn from(value: ResampleParameter) -> Self {
        Self::Resample(value)
    }
}
