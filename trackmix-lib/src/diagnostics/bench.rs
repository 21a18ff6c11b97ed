//! Synthetic benchmarks for the mix loop.

use rand::Rng;

use crate::config::MixerConfig;
use crate::constants::MAX_NUM_TRACKS;
use crate::error::MixerError;
use crate::format::{ChannelMask, SampleFormat};
use crate::mixer::{AudioMixer, Parameter, ResampleParameter, VolumeParameter};
use crate::provider::VecProvider;

/// Configuration parameters for a mixer benchmark run.
#[derive(Debug, Clone, Copy)]
pub struct MixerBenchConfig {
    pub sample_rate: u32,
    pub frame_count: usize,
    /// Tracks mixed at the mix rate.
    pub tracks: usize,
    /// Additional tracks fed at 44.1 kHz and resampled.
    pub resampled_tracks: usize,
    pub iterations: usize,
}

impl Default for MixerBenchConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            frame_count: 256,
            tracks: 8,
            resampled_tracks: 0,
            iterations: 1_000,
        }
    }
}

/// Timing results from a benchmark run.
#[derive(Debug, Clone, Copy)]
pub struct MixerBenchResult {
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    /// Duration of audio one block represents.
    pub block_time_ms: f64,
    pub rt_factor: f64,
}

/// Time `process` over looping random-noise tracks.
pub fn bench_mixer(config: MixerBenchConfig) -> Result<MixerBenchResult, MixerError> {
    let total_tracks = (config.tracks + config.resampled_tracks).min(MAX_NUM_TRACKS);
    let mut mixer = AudioMixer::new(MixerConfig::new(config.frame_count, config.sample_rate))?;
    let mut rng = rand::thread_rng();
    let noise_frames = config.frame_count.max(1) * 16;

    for index in 0..total_tracks {
        let name = mixer.get_track_name(ChannelMask::STEREO, SampleFormat::Float, 0)?;
        let noise: Vec<f32> = (0..noise_frames * 2)
            .map(|_| rng.gen_range(-1.0_f32..1.0_f32))
            .collect();
        let provider = VecProvider::float(2, noise).with_looping(true);
        mixer.set_buffer_provider(name, Some(Box::new(provider)))?;
        mixer.set_parameter(
            name,
            Parameter::Volume(VolumeParameter::Volume0(1.0 / total_tracks as f32)),
        )?;
        mixer.set_parameter(
            name,
            Parameter::Volume(VolumeParameter::Volume1(1.0 / total_tracks as f32)),
        )?;
        if index >= config.tracks {
            let rate = ResampleParameter::SampleRate(44_100);
            mixer.set_parameter(name, Parameter::Resample(rate))?;
        }
        mixer.enable(name)?;
    }

    let mut times: Vec<f64> = Vec::with_capacity(config.iterations.max(1));
    for _ in 0..config.iterations.max(1) {
        let start = std::time::Instant::now();
        mixer.process(None);
        times.push(start.elapsed().as_secs_f64() * 1000.0);
    }

    let min_ms = times.iter().copied().fold(f64::INFINITY, f64::min);
    let max_ms = times.iter().copied().fold(0.0_f64, f64::max);
    let avg_ms = times.iter().sum::<f64>() / times.len() as f64;
    let block_time_ms = config.frame_count as f64 / config.sample_rate.max(1) as f64 * 1000.0;
    let rt_factor = if block_time_ms > 0.0 {
        avg_ms / block_time_ms
    } else {
        0.0
    };

    Ok(MixerBenchResult {
        avg_ms,
        min_ms: if min_ms.is_finite() { min_ms } else { 0.0 },
        max_ms,
        block_time_ms,
        rt_factor,
    })
}
