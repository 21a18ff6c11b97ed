//! Output buses written by `process`.

use crate::convert::f32_to_i16;
use crate::format::{MixFormat, MAX_NUM_CHANNELS};

/// What happened to a bus during the current block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BusState {
    Untouched,
    /// `accumulator` holds the mix; Pcm16 buses still need narrowing.
    Accumulated,
    /// The bus view already holds the final block.
    Final,
}

/// Interleaved stereo main bus.
#[derive(Debug, Clone)]
pub(crate) struct MainBus {
    pub(crate) format: MixFormat,
    pub(crate) state: BusState,
    pub(crate) accumulator: Vec<f32>,
    pub(crate) pcm16: Vec<i16>,
}

impl MainBus {
    pub(crate) fn new(frame_count: usize, format: MixFormat) -> Self {
        Self {
            format,
            state: BusState::Untouched,
            accumulator: vec![0.0; frame_count * MAX_NUM_CHANNELS],
            pcm16: vec![0; frame_count * MAX_NUM_CHANNELS],
        }
    }

    /// Bring the bus view up to date at the end of a block.
    pub(crate) fn finish(&mut self) {
        match self.state {
            BusState::Untouched => {
                self.accumulator.fill(0.0);
                self.pcm16.fill(0);
            }
            BusState::Accumulated => {
                if self.format == MixFormat::Pcm16 {
                    for (dst, &src) in self.pcm16.iter_mut().zip(self.accumulator.iter()) {
                        *dst = f32_to_i16(src);
                    }
                }
            }
            BusState::Final => {}
        }
    }

    pub(crate) fn view(&self) -> OutputBuffer<'_> {
        match self.format {
            MixFormat::Pcm16 => OutputBuffer::Pcm16(&self.pcm16),
            MixFormat::Float => OutputBuffer::Float(&self.accumulator),
        }
    }
}

/// Mono effect-send bus, always float.
#[derive(Debug, Clone)]
pub(crate) struct AuxBus {
    pub(crate) written: bool,
    pub(crate) samples: Vec<f32>,
}

impl AuxBus {
    pub(crate) fn new(frame_count: usize) -> Self {
        Self {
            written: false,
            samples: vec![0.0; frame_count],
        }
    }

    pub(crate) fn finish(&mut self) {
        if !self.written {
            self.samples.fill(0.0);
        }
    }
}

/// Read-only view of a main bus after `process`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputBuffer<'a> {
    Pcm16(&'a [i16]),
    /// Not clamped; values may exceed full scale.
    Float(&'a [f32]),
}

impl<'a> OutputBuffer<'a> {
    pub fn format(&self) -> MixFormat {
        match self {
            Self::Pcm16(_) => MixFormat::Pcm16,
            Self::Float(_) => MixFormat::Float,
        }
    }

    /// Number of interleaved samples.
    pub fn len(&self) -> usize {
        match self {
            Self::Pcm16(data) => data.len(),
            Self::Float(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the block out as float samples.
    pub fn to_f32(&self) -> Vec<f32> {
        match self {
            Self::Pcm16(data) => data
                .iter()
                .map(|&sample| crate::convert::i16_to_f32(sample))
                .collect(),
            Self::Float(data) => data.to_vec(),
        }
    }
}
