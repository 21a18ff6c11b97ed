//! Render-thread state and the block strategies run by `process`.
//!
//! Nothing in here allocates, locks, or logs.

use super::bus::{AuxBus, BusState, MainBus};
use super::hooks::{self, Channels, EnabledSummary, ProcessHook, TrackHook};
use super::kernels::{copy_frames, mix_frames, MixInput, MixOutput, MixTarget};
use super::track::{Needs, Track};
use crate::constants::MAX_NUM_TRACKS;
use crate::format::{MixFormat, MAX_NUM_CHANNELS};
use crate::resampler::frames_to_nanos;

/// Indices of the set bits of `mask`, lowest first.
pub(crate) fn track_indices(mask: u32) -> impl Iterator<Item = usize> {
    (0..MAX_NUM_TRACKS).filter(move |index| mask & (1 << index) != 0)
}

#[inline]
fn chunk_pts(pts: Option<i64>, frames_done: usize, sample_rate: u32) -> Option<i64> {
    pts.map(|pts| pts + frames_to_nanos(frames_done, sample_rate))
}

/// Everything `process` touches.
#[derive(Debug)]
pub(crate) struct MixerState {
    pub(crate) enabled_tracks: u32,
    pub(crate) needs_changed: u32,
    pub(crate) frame_count: usize,
    pub(crate) sample_rate: u32,
    pub(crate) hook: ProcessHook,
    pub(crate) tracks: Vec<Track>,
    pub(crate) main_buses: Vec<MainBus>,
    pub(crate) aux_buses: Vec<AuxBus>,
    pub(crate) resample_temp: Vec<f32>,
    pub(crate) underruns: u64,
}

impl MixerState {
    /// Mark tracks as needing reclassification before the next block.
    pub(crate) fn invalidate(&mut self, mask: u32) {
        if mask != 0 {
            self.needs_changed |= mask;
            self.hook = ProcessHook::Validate;
        }
    }

    /// Render one block into every bus.
    pub(crate) fn process(&mut self, pts: Option<i64>) {
        if self.hook == ProcessHook::Validate {
            self.validate();
        }
        for bus in self.main_buses.iter_mut() {
            bus.state = BusState::Untouched;
        }
        for bus in self.aux_buses.iter_mut() {
            bus.written = false;
        }

        match self.hook {
            ProcessHook::Validate | ProcessHook::Nop => self.process_nop(pts),
            ProcessHook::OneTrackNoResample {
                track,
                channels,
                input,
                output,
            } => match (channels, input, output) {
                (Channels::Mono, MixFormat::Pcm16, MixFormat::Pcm16) => {
                    self.process_one_track::<i16, i16, 1>(track, pts)
                }
                (Channels::Mono, MixFormat::Pcm16, MixFormat::Float) => {
                    self.process_one_track::<i16, f32, 1>(track, pts)
                }
                (Channels::Mono, MixFormat::Float, MixFormat::Pcm16) => {
                    self.process_one_track::<f32, i16, 1>(track, pts)
                }
                (Channels::Mono, MixFormat::Float, MixFormat::Float) => {
                    self.process_one_track::<f32, f32, 1>(track, pts)
                }
                (Channels::Stereo, MixFormat::Pcm16, MixFormat::Pcm16) => {
                    self.process_one_track::<i16, i16, 2>(track, pts)
                }
                (Channels::Stereo, MixFormat::Pcm16, MixFormat::Float) => {
                    self.process_one_track::<i16, f32, 2>(track, pts)
                }
                (Channels::Stereo, MixFormat::Float, MixFormat::Pcm16) => {
                    self.process_one_track::<f32, i16, 2>(track, pts)
                }
                (Channels::Stereo, MixFormat::Float, MixFormat::Float) => {
                    self.process_one_track::<f32, f32, 2>(track, pts)
                }
            },
            ProcessHook::Generic => self.process_generic(pts),
        }

        for bus in self.main_buses.iter_mut() {
            bus.finish();
        }
        for bus in self.aux_buses.iter_mut() {
            bus.finish();
        }
    }

    /// Reclassify every enabled track and pick the block strategy.
    pub(crate) fn validate(&mut self) {
        let mut summary = EnabledSummary {
            all_muted: true,
            ..EnabledSummary::default()
        };
        for index in track_indices(self.enabled_tracks) {
            let track = &mut self.tracks[index];
            track.needs = track.compute_needs();
            track.hook =
                hooks::track_hook(track.needs, track.mixer_in_format, track.chain.is_some());

            summary.count += 1;
            if track.hook != TrackHook::Nop {
                summary.all_muted = false;
            }
            if track.needs.contains(Needs::RESAMPLE)
                || track.needs.contains(Needs::RAMP)
                || track.needs.contains(Needs::AUX)
            {
                summary.complex = true;
            }
            if summary.first.is_none() {
                summary.first = Some((index, track.hook, track.mixer_format));
            }
        }

        // a bus takes the format of the lowest-named enabled track routed to it
        for (bus_index, bus) in self.main_buses.iter_mut().enumerate() {
            let owner = track_indices(self.enabled_tracks)
                .map(|index| &self.tracks[index])
                .find(|track| track.main_bus == bus_index);
            if let Some(track) = owner {
                bus.format = track.mixer_format;
            }
        }

        self.hook = hooks::process_hook(&summary);
        self.needs_changed = 0;
    }

    /// Nothing audible: keep muted tracks' providers moving.
    fn process_nop(&mut self, pts: Option<i64>) {
        let (frame_count, sample_rate) = (self.frame_count, self.sample_rate);
        for index in track_indices(self.enabled_tracks) {
            consume(&mut self.tracks[index], frame_count, pts, sample_rate);
        }
    }

    /// One plain track written straight into its bus representation.
    fn process_one_track<T: MixInput, O: MixOutput, const NCHAN: usize>(
        &mut self,
        index: usize,
        pts: Option<i64>,
    ) {
        let frame_count = self.frame_count;
        let track = &mut self.tracks[index];
        let bus = &mut self.main_buses[track.main_bus];
        let output = &mut O::bus_samples(bus)[..frame_count * MAX_NUM_CHANNELS];
        let (gain_left, gain_right) = (track.volume.left.gain(), track.volume.right.gain());

        let mut done = 0;
        if let Some(chain) = track.chain.as_mut() {
            let provider = chain.provider();
            while done < frame_count {
                let frame_pts = chunk_pts(pts, done, self.sample_rate);
                let (frames, mixed) = {
                    let request = frame_count - done;
                    let Some(buffer) = provider.get_next_buffer(request, frame_pts) else {
                        break;
                    };
                    let granted = buffer.frames.min(request);
                    match T::from_samples(buffer.samples) {
                        Some(input) => {
                            let frames = granted.min(input.len() / NCHAN);
                            copy_frames::<T, O, NCHAN>(
                                input,
                                frames,
                                &mut output[done * MAX_NUM_CHANNELS..],
                                gain_left,
                                gain_right,
                            );
                            (frames, true)
                        }
                        // unusable frames are dropped so the provider keeps moving
                        None => (granted, false),
                    }
                };
                provider.release_buffer(frames);
                if !mixed || frames == 0 {
                    break;
                }
                done += frames;
            }
        }
        if done < frame_count {
            output[done * MAX_NUM_CHANNELS..].fill(O::default());
            self.underruns += 1;
        }
        bus.state = BusState::Final;
    }

    /// Every enabled track runs its own hook, accumulating per bus.
    fn process_generic(&mut self, pts: Option<i64>) {
        let Self {
            enabled_tracks,
            needs_changed,
            frame_count,
            sample_rate,
            hook,
            tracks,
            main_buses,
            aux_buses,
            resample_temp,
            underruns,
        } = self;
        let (frame_count, sample_rate) = (*frame_count, *sample_rate);

        for index in track_indices(*enabled_tracks) {
            let track = &mut tracks[index];
            if track.hook == TrackHook::Nop {
                consume(track, frame_count, pts, sample_rate);
                continue;
            }

            let bus = &mut main_buses[track.main_bus];
            let aux = if track.needs.contains(Needs::AUX) {
                track.aux_bus.and_then(|aux| aux_buses.get_mut(aux))
            } else {
                None
            };
            let accumulate_aux = aux.as_ref().map_or(false, |aux| aux.written);
            let target = MixTarget {
                main: &mut bus.accumulator[..frame_count * MAX_NUM_CHANNELS],
                accumulate: bus.state != BusState::Untouched,
                aux: aux.map(|aux| {
                    aux.written = true;
                    &mut aux.samples[..frame_count]
                }),
                accumulate_aux,
            };

            let complete = match track.hook {
                TrackHook::Nop => true,
                TrackHook::NoResample {
                    channels: Channels::Mono,
                    input: MixFormat::Pcm16,
                } => mix_direct::<i16, 1>(track, target, frame_count, pts, sample_rate),
                TrackHook::NoResample {
                    channels: Channels::Mono,
                    input: MixFormat::Float,
                } => mix_direct::<f32, 1>(track, target, frame_count, pts, sample_rate),
                TrackHook::NoResample {
                    channels: Channels::Stereo,
                    input: MixFormat::Pcm16,
                } => mix_direct::<i16, 2>(track, target, frame_count, pts, sample_rate),
                TrackHook::NoResample {
                    channels: Channels::Stereo,
                    input: MixFormat::Float,
                } => mix_direct::<f32, 2>(track, target, frame_count, pts, sample_rate),
                TrackHook::Resample {
                    channels: Channels::Mono,
                } => mix_resampled::<1>(track, target, resample_temp, frame_count, pts),
                TrackHook::Resample {
                    channels: Channels::Stereo,
                } => mix_resampled::<2>(track, target, resample_temp, frame_count, pts),
            };
            bus.state = BusState::Accumulated;
            if !complete {
                *underruns += 1;
            }

            // a finished ramp may unlock a cheaper strategy next block
            if track.needs.contains(Needs::RAMP) && !track.volume.is_ramping() {
                *needs_changed |= 1 << index;
                *hook = ProcessHook::Validate;
            }
        }
    }
}

/// Pull and release a block of frames without mixing them.
fn consume(track: &mut Track, frame_count: usize, pts: Option<i64>, sample_rate: u32) {
    let Some(chain) = track.chain.as_mut() else {
        return;
    };
    let provider = chain.provider();
    let mut done = 0;
    while done < frame_count {
        let frame_pts = chunk_pts(pts, done, sample_rate);
        let frames = match provider.get_next_buffer(frame_count - done, frame_pts) {
            Some(buffer) => buffer.frames.min(frame_count - done),
            None => break,
        };
        provider.release_buffer(frames);
        if frames == 0 {
            break;
        }
        done += frames;
    }
}

/// Mix provider frames straight into the bus.
///
/// # Returns
/// `false` when the provider ran dry before the block was filled.
fn mix_direct<T: MixInput, const NCHAN: usize>(
    track: &mut Track,
    target: MixTarget<'_>,
    frame_count: usize,
    pts: Option<i64>,
    sample_rate: u32,
) -> bool {
    let MixTarget {
        main,
        accumulate,
        mut aux,
        accumulate_aux,
    } = target;
    let Track { chain, volume, .. } = track;

    let mut done = 0;
    if let Some(chain) = chain.as_mut() {
        let provider = chain.provider();
        while done < frame_count {
            let frame_pts = chunk_pts(pts, done, sample_rate);
            let (frames, mixed) = {
                let Some(buffer) = provider.get_next_buffer(frame_count - done, frame_pts) else {
                    break;
                };
                let granted = buffer.frames.min(frame_count - done);
                match T::from_samples(buffer.samples) {
                    Some(input) => {
                        let frames = granted.min(input.len() / NCHAN);
                        let end = done + frames;
                        let chunk = MixTarget {
                            main: &mut main[done * MAX_NUM_CHANNELS..end * MAX_NUM_CHANNELS],
                            accumulate,
                            aux: aux.as_deref_mut().map(|aux| &mut aux[done..end]),
                            accumulate_aux,
                        };
                        mix_frames::<T, NCHAN>(input, frames, chunk, volume);
                        (frames, true)
                    }
                    None => (granted, false),
                }
            };
            provider.release_buffer(frames);
            if !mixed || frames == 0 {
                break;
            }
            done += frames;
        }
    }

    if done == frame_count {
        return true;
    }
    if !accumulate {
        main[done * MAX_NUM_CHANNELS..].fill(0.0);
    }
    if let Some(aux) = aux {
        if !accumulate_aux {
            aux[done..].fill(0.0);
        }
    }
    volume.skip(frame_count - done);
    false
}

/// Resample into scratch at unity gain, then mix the scratch.
///
/// # Returns
/// `false` when the provider ran dry before the block was filled.
fn mix_resampled<const NCHAN: usize>(
    track: &mut Track,
    target: MixTarget<'_>,
    temp: &mut [f32],
    frame_count: usize,
    pts: Option<i64>,
) -> bool {
    let Track {
        chain,
        volume,
        resampler,
        ..
    } = track;
    let temp = &mut temp[..frame_count * NCHAN];
    let produced = match (chain.as_mut(), resampler.as_mut()) {
        (Some(chain), Some(resampler)) => {
            resampler.resample(temp, frame_count, chain.provider(), pts)
        }
        _ => 0,
    };
    temp[produced * NCHAN..].fill(0.0);
    mix_frames::<f32, NCHAN>(temp, frame_count, target, volume);
    produced == frame_count
}
