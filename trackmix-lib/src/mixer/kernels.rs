//! Inner mix loops, monomorphized over input type and channel count.

use super::bus::MainBus;
use super::volume::TrackVolume;
use crate::convert::{f32_to_i16, i16_to_f32};
use crate::provider::Samples;

/// Sample type a kernel reads.
pub(crate) trait MixInput: Copy {
    fn to_f32(self) -> f32;

    /// Borrow `samples` as this type, if that is its representation.
    fn from_samples(samples: Samples<'_>) -> Option<&[Self]>;
}

impl MixInput for i16 {
    #[inline]
    fn to_f32(self) -> f32 {
        i16_to_f32(self)
    }

    fn from_samples(samples: Samples<'_>) -> Option<&[Self]> {
        match samples {
            Samples::Pcm16(data) => Some(data),
            _ => None,
        }
    }
}

impl MixInput for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    fn from_samples(samples: Samples<'_>) -> Option<&[Self]> {
        match samples {
            Samples::Float(data) => Some(data),
            _ => None,
        }
    }
}

/// Sample type a fused single-track kernel writes.
pub(crate) trait MixOutput: Copy + Default {
    fn from_f32(sample: f32) -> Self;

    /// The bus storage holding this representation.
    fn bus_samples(bus: &mut MainBus) -> &mut [Self];
}

impl MixOutput for i16 {
    #[inline]
    fn from_f32(sample: f32) -> Self {
        f32_to_i16(sample)
    }

    fn bus_samples(bus: &mut MainBus) -> &mut [Self] {
        &mut bus.pcm16
    }
}

impl MixOutput for f32 {
    #[inline]
    fn from_f32(sample: f32) -> Self {
        sample
    }

    fn bus_samples(bus: &mut MainBus) -> &mut [Self] {
        &mut bus.accumulator
    }
}

/// Read frame `frame` as a `(left, right)` pair, duplicating mono.
#[inline(always)]
fn read_frame<T: MixInput, const NCHAN: usize>(input: &[T], frame: usize) -> (f32, f32) {
    if NCHAN == 1 {
        let sample = input[frame].to_f32();
        (sample, sample)
    } else {
        (input[2 * frame].to_f32(), input[2 * frame + 1].to_f32())
    }
}

/// Where and how a track's frames land.
pub(crate) struct MixTarget<'a> {
    /// Interleaved stereo slice, one frame per input frame.
    pub(crate) main: &'a mut [f32],
    /// Add to `main` instead of overwriting it.
    pub(crate) accumulate: bool,
    /// Mono send slice, one sample per input frame.
    pub(crate) aux: Option<&'a mut [f32]>,
    pub(crate) accumulate_aux: bool,
}

/// Mix `frames` frames of `input` into `target`, stepping gain ramps.
///
/// Never reads past the whole frames present in `input`.
pub(crate) fn mix_frames<T: MixInput, const NCHAN: usize>(
    input: &[T],
    frames: usize,
    target: MixTarget<'_>,
    volume: &mut TrackVolume,
) {
    let MixTarget {
        main,
        accumulate,
        mut aux,
        accumulate_aux,
    } = target;
    let frames = frames.min(input.len() / NCHAN);

    if volume.is_ramping() {
        for frame in 0..frames {
            let (left, right) = read_frame::<T, NCHAN>(input, frame);
            let (gain_left, gain_right) = (volume.left.gain(), volume.right.gain());
            write_main(main, frame, left * gain_left, right * gain_right, accumulate);
            if let Some(aux) = aux.as_deref_mut() {
                let send = aux_input::<NCHAN>(left, right) * volume.aux.gain();
                write_aux(aux, frame, send, accumulate_aux);
            }
            volume.step();
        }
        return;
    }

    let (gain_left, gain_right, gain_aux) = (
        volume.left.gain(),
        volume.right.gain(),
        volume.aux.gain(),
    );
    for frame in 0..frames {
        let (left, right) = read_frame::<T, NCHAN>(input, frame);
        write_main(main, frame, left * gain_left, right * gain_right, accumulate);
        if let Some(aux) = aux.as_deref_mut() {
            let send = aux_input::<NCHAN>(left, right) * gain_aux;
            write_aux(aux, frame, send, accumulate_aux);
        }
    }
}

/// Write `frames` frames of `input` straight to `output` with static gains.
pub(crate) fn copy_frames<T: MixInput, O: MixOutput, const NCHAN: usize>(
    input: &[T],
    frames: usize,
    output: &mut [O],
    gain_left: f32,
    gain_right: f32,
) {
    let frames = frames.min(input.len() / NCHAN);
    for (frame, out) in output.chunks_exact_mut(2).take(frames).enumerate() {
        let (left, right) = read_frame::<T, NCHAN>(input, frame);
        out[0] = O::from_f32(left * gain_left);
        out[1] = O::from_f32(right * gain_right);
    }
}

#[inline(always)]
fn aux_input<const NCHAN: usize>(left: f32, right: f32) -> f32 {
    if NCHAN == 1 {
        left
    } else {
        (left + right) * 0.5
    }
}

#[inline(always)]
fn write_main(main: &mut [f32], frame: usize, left: f32, right: f32, accumulate: bool) {
    if accumulate {
        main[2 * frame] += left;
        main[2 * frame + 1] += right;
    } else {
        main[2 * frame] = left;
        main[2 * frame + 1] = right;
    }
}

#[inline(always)]
fn write_aux(aux: &mut [f32], frame: usize, sample: f32, accumulate: bool) {
    if accumulate {
        aux[frame] += sample;
    } else {
        aux[frame] = sample;
    }
}
