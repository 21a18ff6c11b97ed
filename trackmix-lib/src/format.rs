//! Sample representations and channel layouts understood by the mixer.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Maximum channel count written to a main bus.
pub const MAX_NUM_CHANNELS: usize = 2;
/// Maximum channel count accepted upstream of a downmixer.
pub const MAX_NUM_CHANNELS_TO_DOWNMIX: usize = 8;

/// PCM sample representation of a track or provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// Signed 16-bit integer.
    Pcm16,
    /// Signed 24-bit integer packed into 3 little-endian bytes.
    Pcm24Packed,
    /// Signed 32-bit integer.
    Pcm32,
    /// 32-bit float, nominal range [-1.0, 1.0].
    Float,
}

impl Display for SampleFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pcm16 => "pcm16",
            Self::Pcm24Packed => "pcm24-packed",
            Self::Pcm32 => "pcm32",
            Self::Float => "float",
        };
        f.write_str(name)
    }
}

/// Representations the mix kernels read and write directly.
///
/// Every track is converted to one of these before it reaches a kernel, and
/// every main bus is written in one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixFormat {
    Pcm16,
    Float,
}

impl MixFormat {
    /// Narrow a [`SampleFormat`] to a mix format, if it is one.
    pub fn from_sample_format(format: SampleFormat) -> Option<Self> {
        match format {
            SampleFormat::Pcm16 => Some(Self::Pcm16),
            SampleFormat::Float => Some(Self::Float),
            SampleFormat::Pcm24Packed | SampleFormat::Pcm32 => None,
        }
    }
}

impl Default for MixFormat {
    fn default() -> Self {
        Self::Float
    }
}

impl From<MixFormat> for SampleFormat {
    fn from(value: MixFormat) -> Self {
        match value {
            MixFormat::Pcm16 => SampleFormat::Pcm16,
            MixFormat::Float => SampleFormat::Float,
        }
    }
}

impl Display for MixFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        SampleFormat::from(*self).fmt(f)
    }
}

/// Bitmask of output channel positions carried by a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelMask(u32);

impl ChannelMask {
    pub const FRONT_LEFT: u32 = 0x1;
    pub const FRONT_RIGHT: u32 = 0x2;
    pub const FRONT_CENTER: u32 = 0x4;
    pub const LOW_FREQUENCY: u32 = 0x8;
    pub const BACK_LEFT: u32 = 0x10;
    pub const BACK_RIGHT: u32 = 0x20;
    pub const FRONT_LEFT_OF_CENTER: u32 = 0x40;
    pub const FRONT_RIGHT_OF_CENTER: u32 = 0x80;
    pub const BACK_CENTER: u32 = 0x100;
    pub const SIDE_LEFT: u32 = 0x200;
    pub const SIDE_RIGHT: u32 = 0x400;

    const ALL_POSITIONS: u32 = 0x7ff;

    pub const MONO: Self = Self(Self::FRONT_LEFT);
    pub const STEREO: Self = Self(Self::FRONT_LEFT | Self::FRONT_RIGHT);
    pub const QUAD: Self =
        Self(Self::FRONT_LEFT | Self::FRONT_RIGHT | Self::BACK_LEFT | Self::BACK_RIGHT);
    pub const SURROUND: Self =
        Self(Self::FRONT_LEFT | Self::FRONT_RIGHT | Self::FRONT_CENTER | Self::BACK_CENTER);
    pub const FIVE_POINT_ONE: Self = Self(
        Self::FRONT_LEFT
            | Self::FRONT_RIGHT
            | Self::FRONT_CENTER
            | Self::LOW_FREQUENCY
            | Self::BACK_LEFT
            | Self::BACK_RIGHT,
    );
    pub const SEVEN_POINT_ONE: Self = Self(
        Self::FIVE_POINT_ONE.0 | Self::SIDE_LEFT | Self::SIDE_RIGHT,
    );

    /// Build a mask from raw position bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw position bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Number of channels described by the mask.
    pub const fn channel_count(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Return `true` when the mask carries the given position bit.
    pub const fn contains(self, position: u32) -> bool {
        self.0 & position != 0
    }

    /// Return `true` when the mask only uses known positions and is not empty.
    pub const fn is_valid(self) -> bool {
        self.0 != 0 && self.0 & !Self::ALL_POSITIONS == 0
    }

    /// Default layout for a plain channel count.
    pub fn for_channel_count(channels: usize) -> Option<Self> {
        let mask = match channels {
            1 => Self::MONO,
            2 => Self::STEREO,
            3 => Self(Self::STEREO.0 | Self::FRONT_CENTER),
            4 => Self::QUAD,
            5 => Self(Self::QUAD.0 | Self::FRONT_CENTER),
            6 => Self::FIVE_POINT_ONE,
            7 => Self(Self::FIVE_POINT_ONE.0 | Self::BACK_CENTER),
            8 => Self::SEVEN_POINT_ONE,
            _ => return None,
        };
        Some(mask)
    }

    /// Iterate over the position bits present in the mask, lowest first.
    ///
    /// The iteration order is the interleaving order of the channels.
    pub fn positions(self) -> impl Iterator<Item = u32> {
        let bits = self.0;
        (0..32).map(|shift| 1u32 << shift).filter(move |bit| bits & bit != 0)
    }
}

impl Display for ChannelMask {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_counts_follow_mask_bits() {
        assert_eq!(ChannelMask::MONO.channel_count(), 1);
        assert_eq!(ChannelMask::STEREO.channel_count(), 2);
        assert_eq!(ChannelMask::FIVE_POINT_ONE.channel_count(), 6);
        assert_eq!(ChannelMask::SEVEN_POINT_ONE.channel_count(), 8);
    }

    #[test]
    fn default_layouts_cover_one_to_eight_channels() {
        for channels in 1..=MAX_NUM_CHANNELS_TO_DOWNMIX {
            let mask = ChannelMask::for_channel_count(channels).expect("layout");
            assert_eq!(mask.channel_count(), channels);
            assert!(mask.is_valid());
        }
        assert!(ChannelMask::for_channel_count(0).is_none());
        assert!(ChannelMask::for_channel_count(9).is_none());
    }

    #[test]
    fn unknown_position_bits_are_invalid() {
        assert!(!ChannelMask::from_bits(0).is_valid());
        assert!(!ChannelMask::from_bits(0x1000).is_valid());
    }

    #[test]
    fn positions_iterate_in_interleave_order() {
        let positions: Vec<u32> = ChannelMask::FIVE_POINT_ONE.positions().collect();
        assert_eq!(
            positions,
            vec![
                ChannelMask::FRONT_LEFT,
                ChannelMask::FRONT_RIGHT,
                ChannelMask::FRONT_CENTER,
                ChannelMask::LOW_FREQUENCY,
                ChannelMask::BACK_LEFT,
                ChannelMask::BACK_RIGHT,
            ]
        );
    }

    #[test]
    fn mix_format_narrowing() {
        assert_eq!(
            MixFormat::from_sample_format(SampleFormat::Float),
            Some(MixFormat::Float)
        );
        assert_eq!(MixFormat::from_sample_format(SampleFormat::Pcm32), None);
        assert_eq!(SampleFormat::from(MixFormat::Pcm16), SampleFormat::Pcm16);
    }
}
