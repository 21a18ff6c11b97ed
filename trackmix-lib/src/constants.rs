//! Shared constants for mixer defaults.

/// Default mix rate (Hz).
pub const SAMPLE_RATE: u32 = 48_000;

/// Default number of frames rendered per `process` call.
pub const FRAME_COUNT: usize = 256;

/// Hard upper bound on simultaneously allocated tracks.
///
/// Track names are tracked in a 32-bit mask, one bit per slot.
pub const MAX_NUM_TRACKS: usize = 32;

/// Unity gain.
pub const UNITY_GAIN: f32 = 1.0;
