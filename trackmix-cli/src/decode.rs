//! Source loading: symphonia file decode, tone synthesis, and conversion
//! into mixer providers.

use std::f64::consts::TAU;
use std::fs::File;
use std::io;
use std::path::Path;

use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use trackmix_lib::convert::{f32_to_i16, f32_to_i32, f32_to_packed24};
use trackmix_lib::format::SampleFormat;
use trackmix_lib::provider::VecProvider;

use crate::error::RunError;

/// Fully decoded interleaved audio.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub channels: usize,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1)
    }

    /// Hand the audio to the mixer as `format` samples.
    pub fn into_provider(self, format: SampleFormat, looping: bool) -> VecProvider {
        let channels = self.channels;
        let provider = match format {
            SampleFormat::Pcm16 => {
                VecProvider::pcm16(channels, self.samples.iter().map(|&s| f32_to_i16(s)).collect())
            }
            SampleFormat::Pcm24Packed => VecProvider::pcm24_packed(
                channels,
                self.samples.iter().flat_map(|&s| f32_to_packed24(s)).collect(),
            ),
            SampleFormat::Pcm32 => {
                VecProvider::pcm32(channels, self.samples.iter().map(|&s| f32_to_i32(s)).collect())
            }
            SampleFormat::Float => VecProvider::float(channels, self.samples),
        };
        provider.with_looping(looping)
    }
}

/// Synthesize a sine tone, identical on every channel.
pub fn tone(frequency: f32, channels: usize, sample_rate: u32, seconds: f32, amplitude: f32) -> DecodedAudio {
    let frames = (seconds.max(0.0) as f64 * sample_rate as f64).round() as usize;
    let step = TAU * frequency as f64 / sample_rate.max(1) as f64;
    let mut samples = Vec::with_capacity(frames * channels);
    for frame in 0..frames {
        let value = (amplitude as f64 * (step * frame as f64).sin()) as f32;
        samples.extend(std::iter::repeat(value).take(channels));
    }
    DecodedAudio {
        channels,
        sample_rate,
        samples,
    }
}

/// Decode the first audio track of `path` into interleaved f32 samples.
pub fn decode_file(path: &Path) -> Result<DecodedAudio, RunError> {
    let src = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();
    let probed = symphonia::default::get_probe().format(&hint, mss, &fmt_opts, &meta_opts)?;
    let mut format = probed.format;

    let (track_id, codec_params) = format
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .map(|track| (track.id, track.codec_params.clone()))
        .ok_or(Error::Unsupported("no supported audio tracks"))?;

    let dec_opts: DecoderOptions = Default::default();
    let mut decoder = symphonia::default::get_codecs().make(&codec_params, &dec_opts)?;

    let mut channels = codec_params.channels.map(|c| c.count()).unwrap_or(0);
    let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(Error::IoError(err)) if err.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(Error::ResetRequired) => break,
            Err(err) => return Err(err.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                channels = spec.channels.count();
                sample_rate = spec.rate;
                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            Err(Error::DecodeError(err)) => warn!("decode error: {}", err),
            Err(Error::IoError(err)) if err.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err.into()),
        }
    }

    if channels == 0 || sample_rate == 0 {
        return Err(Error::Unsupported("stream has no channel layout or sample rate").into());
    }

    let audio = DecodedAudio {
        channels,
        sample_rate,
        samples,
    };
    debug!(
        "decoded {}: {} frames, {} channel(s) at {} Hz",
        path.display(),
        audio.frames(),
        audio.channels,
        audio.sample_rate
    );
    Ok(audio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackmix_lib::provider::BufferProvider;

    #[test]
    fn tone_repeats_each_frame_across_channels() {
        let audio = tone(1_000.0, 2, 8_000, 0.01, 0.5);
        assert_eq!(audio.frames(), 80);
        assert_eq!(audio.samples[0], 0.0);
        assert_eq!(audio.samples[2], audio.samples[3]);
        // quarter period at 1 kHz / 8 kHz
        assert!((audio.samples[4] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn provider_carries_requested_format() {
        let audio = tone(100.0, 1, 8_000, 0.01, 0.5);
        let provider = audio.clone().into_provider(SampleFormat::Pcm24Packed, false);
        assert_eq!(provider.format(), SampleFormat::Pcm24Packed);
        assert_eq!(provider.frame_count(), 80);

        let mut provider = audio.into_provider(SampleFormat::Pcm16, true);
        let buffer = provider.get_next_buffer(8, None).expect("buffer");
        assert_eq!(buffer.frames, 8);
    }

    #[test]
    fn decodes_wav_written_by_hound() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("input.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).expect("writer");
        for _ in 0..100 {
            writer.write_sample(16_384_i16).expect("sample");
            writer.write_sample(-16_384_i16).expect("sample");
        }
        writer.finalize().expect("finalize");

        let audio = decode_file(&path).expect("decode");
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.sample_rate, 22_050);
        assert_eq!(audio.frames(), 100);
        assert!((audio.samples[0] - 0.5).abs() < 1e-4);
        assert!((audio.samples[1] + 0.5).abs() < 1e-4);
    }
}
