//! Kernel selection tables.
//!
//! Selection happens during validation only; `process` then matches the
//! cached hooks once per call and dispatches to monomorphized kernels.

use super::track::Needs;
use crate::format::MixFormat;

/// Channels entering a mix kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Channels {
    Mono,
    Stereo,
}

impl Channels {
    pub(crate) fn from_count(count: usize) -> Self {
        if count == 1 {
            Self::Mono
        } else {
            Self::Stereo
        }
    }
}

/// Per-track kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TrackHook {
    /// Pull and discard input; nothing is written.
    Nop,
    /// Mix provider frames directly.
    NoResample { channels: Channels, input: MixFormat },
    /// Resample into scratch float, then mix.
    Resample { channels: Channels },
}

/// Whole-block strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessHook {
    /// Reclassify tracks before rendering.
    Validate,
    /// Every enabled track is muted; buses get silence.
    Nop,
    /// Exactly one enabled track that needs no resampling, ramping or aux.
    OneTrackNoResample {
        track: usize,
        channels: Channels,
        input: MixFormat,
        output: MixFormat,
    },
    /// Each enabled track runs its own hook, in ascending name order.
    Generic,
}

/// Pick a track's kernel from its classification.
pub(crate) fn track_hook(needs: Needs, input: MixFormat, has_provider: bool) -> TrackHook {
    if !has_provider || needs.contains(Needs::MUTE) {
        return TrackHook::Nop;
    }
    let channels = Channels::from_count(needs.channel_count());
    if needs.contains(Needs::RESAMPLE) {
        TrackHook::Resample { channels }
    } else {
        TrackHook::NoResample { channels, input }
    }
}

/// Summary of the enabled tracks gathered during validation.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct EnabledSummary {
    pub(crate) count: usize,
    pub(crate) all_muted: bool,
    /// Any track resamples, ramps or feeds an aux bus.
    pub(crate) complex: bool,
    /// Lowest-named enabled track, with its hook and main bus format.
    pub(crate) first: Option<(usize, TrackHook, MixFormat)>,
}

/// Pick the block strategy for the enabled set.
pub(crate) fn process_hook(summary: &EnabledSummary) -> ProcessHook {
    if summary.count == 0 || summary.all_muted {
        return ProcessHook::Nop;
    }
    if summary.count == 1 && !summary.complex {
        if let Some((track, TrackHook::NoResample { channels, input }, output)) = summary.first {
            return ProcessHook::OneTrackNoResample {
                track,
                channels,
                input,
                output,
            };
        }
    }
    ProcessHook::Generic
}
