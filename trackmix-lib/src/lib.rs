//! # Trackmix Library
//!
//! Real-time multi-track audio mixing: up to 32 tracks, each with its own
//! sample format, channel layout and sample rate, are converted, resampled,
//! scaled and summed into stereo main buses and mono effect-send buses, one
//! fixed-size block at a time.
//!
//! Configuration happens through [`mixer::AudioMixer`]'s `&mut self` methods;
//! rendering through [`mixer::AudioMixer::process`], which never allocates.

pub mod audio;
pub mod config;
pub mod constants;
pub mod convert;
pub mod diagnostics;
pub mod error;
pub mod format;
pub mod gain;
pub mod mixer;
pub mod provider;
pub mod resampler;

pub use config::MixerConfig;
pub use error::{ConfigurationError, MixerError};
pub use mixer::AudioMixer;
