use std::sync::{Arc, Mutex};

use trackmix_lib::format::{ChannelMask, MixFormat, SampleFormat};
use trackmix_lib::mixer::{
    AudioMixer, BusId, OutputBuffer, Parameter, ResampleParameter, TrackName, TrackParameter,
    VolumeParameter,
};
use trackmix_lib::provider::{sample_queue, Buffer, BufferProvider, Samples, VecProvider};
use trackmix_lib::{ConfigurationError, MixerConfig, MixerError};

fn mixer(frame_count: usize) -> AudioMixer {
    AudioMixer::new(MixerConfig::new(frame_count, 48_000)).expect("mixer")
}

fn add_track(
    mixer: &mut AudioMixer,
    mask: ChannelMask,
    format: SampleFormat,
    provider: impl BufferProvider + 'static,
) -> TrackName {
    let name = mixer.get_track_name(mask, format, 0).expect("name");
    mixer
        .set_buffer_provider(name, Some(Box::new(provider)))
        .expect("provider");
    mixer.enable(name).expect("enable");
    name
}

fn set(mixer: &mut AudioMixer, name: TrackName, parameter: Parameter) {
    mixer.set_parameter(name, parameter).expect("parameter");
}

fn float_output(mixer: &AudioMixer) -> Vec<f32> {
    match mixer.main_buffer(BusId(0)).expect("bus") {
        OutputBuffer::Float(data) => data.to_vec(),
        other => panic!("expected float output, got {:?}", other.format()),
    }
}

fn pcm16_output(mixer: &AudioMixer) -> Vec<i16> {
    match mixer.main_buffer(BusId(0)).expect("bus") {
        OutputBuffer::Pcm16(data) => data.to_vec(),
        other => panic!("expected pcm16 output, got {:?}", other.format()),
    }
}

/// Hands out at most `chunk` frames per request and records request timestamps.
struct RecordingProvider {
    data: Vec<f32>,
    position: usize,
    chunk: usize,
    requests: Arc<Mutex<Vec<Option<i64>>>>,
}

impl BufferProvider for RecordingProvider {
    fn get_next_buffer(&mut self, frames: usize, pts: Option<i64>) -> Option<Buffer<'_>> {
        self.requests.lock().unwrap().push(pts);
        let granted = frames.min(self.chunk).min(self.data.len() - self.position);
        if granted == 0 {
            return None;
        }
        let samples = &self.data[self.position..self.position + granted];
        Some(Buffer::new(granted, Samples::Float(samples)))
    }

    fn release_buffer(&mut self, frames: usize) {
        self.position += frames;
    }

    fn channel_count(&self) -> usize {
        1
    }

    fn format(&self) -> SampleFormat {
        SampleFormat::Float
    }
}

/// Declares mono float frames but hands out 16-bit samples.
struct MislabeledProvider {
    data: Vec<i16>,
    released: Arc<Mutex<usize>>,
}

impl BufferProvider for MislabeledProvider {
    fn get_next_buffer(&mut self, frames: usize, _pts: Option<i64>) -> Option<Buffer<'_>> {
        let position = *self.released.lock().unwrap();
        let granted = frames.min(self.data.len() - position);
        if granted == 0 {
            return None;
        }
        Some(Buffer::new(
            granted,
            Samples::Pcm16(&self.data[position..position + granted]),
        ))
    }

    fn release_buffer(&mut self, frames: usize) {
        *self.released.lock().unwrap() += frames;
    }

    fn channel_count(&self) -> usize {
        1
    }

    fn format(&self) -> SampleFormat {
        SampleFormat::Float
    }
}

#[test]
fn capacity_is_thirty_two_tracks() {
    let mut mixer = mixer(16);
    let names: Vec<TrackName> = (0..32)
        .map(|_| {
            mixer
                .get_track_name(ChannelMask::STEREO, SampleFormat::Pcm16, 0)
                .expect("name")
        })
        .collect();
    assert_eq!(mixer.track_names(), u32::MAX);
    let err = mixer
        .get_track_name(ChannelMask::STEREO, SampleFormat::Pcm16, 0)
        .expect_err("exhausted");
    assert_eq!(err, MixerError::ResourceExhausted { capacity: 32 });

    mixer.delete_track_name(names[5]).expect("delete");
    let reused = mixer
        .get_track_name(ChannelMask::MONO, SampleFormat::Float, 0)
        .expect("name");
    assert_eq!(reused, names[5]);
}

#[test]
fn configured_capacity_limits_names() {
    let config = MixerConfig {
        max_tracks: 2,
        ..MixerConfig::new(16, 48_000)
    };
    let mut mixer = AudioMixer::new(config).expect("mixer");
    for _ in 0..2 {
        mixer
            .get_track_name(ChannelMask::STEREO, SampleFormat::Pcm16, 0)
            .expect("name");
    }
    assert!(matches!(
        mixer.get_track_name(ChannelMask::STEREO, SampleFormat::Pcm16, 0),
        Err(MixerError::ResourceExhausted { capacity: 2 })
    ));
}

#[test]
fn allocate_then_delete_restores_state_for_every_layout() {
    let masks = [
        ChannelMask::MONO,
        ChannelMask::STEREO,
        ChannelMask::QUAD,
        ChannelMask::FIVE_POINT_ONE,
        ChannelMask::SEVEN_POINT_ONE,
    ];
    let formats = [
        SampleFormat::Pcm16,
        SampleFormat::Pcm24Packed,
        SampleFormat::Pcm32,
        SampleFormat::Float,
    ];
    let mut mixer = mixer(16);
    let before = mixer.track_names();
    for mask in masks {
        for format in formats {
            let name = mixer.get_track_name(mask, format, 7).expect("name");
            mixer.enable(name).expect("enable");
            assert!(mixer.is_enabled(name));
            mixer.delete_track_name(name).expect("delete");
            assert_eq!(mixer.track_names(), before, "{} {}", mask, format);
            assert_eq!(mixer.enabled_tracks(), 0, "{} {}", mask, format);
        }
    }
}

#[test]
fn provider_channel_count_must_match_track_mask() {
    let mut mixer = mixer(8);
    let name = mixer
        .get_track_name(ChannelMask::STEREO, SampleFormat::Float, 0)
        .expect("name");
    let err = mixer
        .set_buffer_provider(name, Some(Box::new(VecProvider::float(1, vec![0.5; 64]))))
        .expect_err("mono provider on a stereo track");
    assert_eq!(
        err,
        MixerError::Configuration(ConfigurationError::ProviderMismatch {
            channels: 1,
            format: SampleFormat::Float,
            expected_channels: 2,
            expected_format: SampleFormat::Float,
        })
    );

    mixer
        .set_buffer_provider(name, Some(Box::new(VecProvider::float(2, vec![0.5; 64]))))
        .expect("provider");
    mixer.enable(name).expect("enable");
    let err = mixer
        .set_parameter(name, TrackParameter::ChannelMask(ChannelMask::MONO).into())
        .expect_err("mask no longer matches the provider");
    assert!(matches!(
        err,
        MixerError::Configuration(ConfigurationError::ProviderMismatch { .. })
    ));

    // the rejected mask change left the track as it was
    mixer.process(None);
    assert!(pcm16_output(&mixer).iter().all(|&sample| sample == 16_384));
    assert_eq!(mixer.underruns(), 0);
}

#[test]
fn provider_format_must_match_track_format() {
    let mut mixer = mixer(4);
    let name = mixer
        .get_track_name(ChannelMask::MONO, SampleFormat::Float, 0)
        .expect("name");
    let err = mixer
        .set_buffer_provider(name, Some(Box::new(VecProvider::pcm16(1, vec![8_192; 16]))))
        .expect_err("pcm16 provider on a float track");
    assert_eq!(
        err,
        MixerError::Configuration(ConfigurationError::ProviderMismatch {
            channels: 1,
            format: SampleFormat::Pcm16,
            expected_channels: 1,
            expected_format: SampleFormat::Float,
        })
    );

    mixer
        .set_buffer_provider(name, Some(Box::new(VecProvider::float(1, vec![0.25; 16]))))
        .expect("provider");
    assert!(mixer
        .set_parameter(name, TrackParameter::Format(SampleFormat::Pcm16).into())
        .is_err());
    mixer.enable(name).expect("enable");
    mixer.process(None);
    assert!(pcm16_output(&mixer).iter().all(|&sample| sample == 8_192));
}

#[test]
fn mislabeled_buffers_are_released_and_silenced() {
    for ramp in [false, true] {
        let mut mixer = mixer(4);
        let released = Arc::new(Mutex::new(0));
        let name = add_track(
            &mut mixer,
            ChannelMask::MONO,
            SampleFormat::Float,
            MislabeledProvider {
                data: vec![8_192; 16],
                released: Arc::clone(&released),
            },
        );
        set(&mut mixer, name, TrackParameter::MixerFormat(MixFormat::Float).into());
        if ramp {
            set(
                &mut mixer,
                name,
                Parameter::RampVolume(VolumeParameter::Volume0(0.5)),
            );
        }
        for block in 1..=3 {
            mixer.process(None);
            assert_eq!(*released.lock().unwrap(), 4 * block, "ramp {}", ramp);
        }
        assert_eq!(float_output(&mixer), vec![0.0; 8]);
        assert_eq!(mixer.underruns(), 3);
    }
}

#[test]
fn single_pcm16_track_at_unity_is_bit_exact() {
    let mut mixer = mixer(64);
    let input: Vec<i16> = (0..128).map(|i| (i * 500 - 32_000) as i16).collect();
    add_track(
        &mut mixer,
        ChannelMask::STEREO,
        SampleFormat::Pcm16,
        VecProvider::pcm16(2, input.clone()),
    );
    mixer.process(None);
    assert_eq!(pcm16_output(&mixer), input);
}

#[test]
fn single_float_track_at_unity_is_bit_exact() {
    let mut mixer = mixer(32);
    let input: Vec<f32> = (0..64).map(|i| (i as f32 - 32.0) / 37.0).collect();
    let name = add_track(
        &mut mixer,
        ChannelMask::STEREO,
        SampleFormat::Float,
        VecProvider::float(2, input.clone()),
    );
    set(&mut mixer, name, TrackParameter::MixerFormat(MixFormat::Float).into());
    mixer.process(None);
    assert_eq!(float_output(&mixer), input);
}

#[test]
fn two_quiet_pcm16_tracks_sum_exactly() {
    let mut mixer = mixer(16);
    add_track(
        &mut mixer,
        ChannelMask::STEREO,
        SampleFormat::Pcm16,
        VecProvider::pcm16(2, vec![1_234; 32]),
    );
    add_track(
        &mut mixer,
        ChannelMask::STEREO,
        SampleFormat::Pcm16,
        VecProvider::pcm16(2, vec![-5_678; 32]),
    );
    mixer.process(None);
    assert_eq!(pcm16_output(&mixer), vec![1_234 - 5_678; 32]);
}

#[test]
fn two_loud_tracks_saturate_pcm16_output() {
    let mut mixer = mixer(16);
    for _ in 0..2 {
        add_track(
            &mut mixer,
            ChannelMask::STEREO,
            SampleFormat::Pcm16,
            VecProvider::pcm16(2, vec![24_576; 32]),
        );
    }
    mixer.process(None);
    assert!(pcm16_output(&mixer).iter().all(|&sample| sample == i16::MAX));
}

#[test]
fn float_output_keeps_headroom() {
    let mut mixer = mixer(16);
    for _ in 0..2 {
        let name = add_track(
            &mut mixer,
            ChannelMask::STEREO,
            SampleFormat::Float,
            VecProvider::float(2, vec![0.75; 32]),
        );
        set(&mut mixer, name, TrackParameter::MixerFormat(MixFormat::Float).into());
    }
    mixer.process(None);
    assert!(float_output(&mixer).iter().all(|&sample| sample == 1.5));
}

#[test]
fn volume_ramp_is_linear_and_settles() {
    let mut mixer = mixer(8);
    let name = add_track(
        &mut mixer,
        ChannelMask::MONO,
        SampleFormat::Float,
        VecProvider::float(1, vec![1.0; 64]),
    );
    set(&mut mixer, name, TrackParameter::MixerFormat(MixFormat::Float).into());
    set(&mut mixer, name, Parameter::Volume(VolumeParameter::Volume0(0.0)));
    set(&mut mixer, name, Parameter::Volume(VolumeParameter::Volume1(0.0)));
    mixer.process(None);
    assert!(float_output(&mixer).iter().all(|&sample| sample == 0.0));

    set(&mut mixer, name, Parameter::RampVolume(VolumeParameter::Volume0(1.0)));
    set(&mut mixer, name, Parameter::RampVolume(VolumeParameter::Volume1(1.0)));
    mixer.process(None);
    let output = float_output(&mixer);
    for frame in 0..8 {
        let expected = frame as f32 / 8.0;
        assert_eq!(output[2 * frame], expected);
        assert_eq!(output[2 * frame + 1], expected);
    }

    mixer.process(None);
    assert!(float_output(&mixer).iter().all(|&sample| sample == 1.0));
}

#[test]
fn aux_bus_receives_send() {
    let mut mixer = mixer(8);
    let name = add_track(
        &mut mixer,
        ChannelMask::STEREO,
        SampleFormat::Float,
        VecProvider::float(2, vec![0.5; 16]),
    );
    set(&mut mixer, name, TrackParameter::AuxBuffer(Some(BusId(0))).into());
    set(&mut mixer, name, Parameter::Volume(VolumeParameter::AuxLevel(0.5)));
    mixer.process(None);
    let aux = mixer.aux_buffer(BusId(0)).expect("aux");
    assert!(aux.iter().all(|&sample| sample == 0.25));
    assert!(pcm16_output(&mixer).iter().all(|&sample| sample == 16_384));
}

#[test]
fn buses_take_format_of_lowest_named_track() {
    let config = MixerConfig {
        main_buses: 2,
        ..MixerConfig::new(8, 48_000)
    };
    let mut mixer = AudioMixer::new(config).expect("mixer");
    let first = add_track(
        &mut mixer,
        ChannelMask::MONO,
        SampleFormat::Float,
        VecProvider::float(1, vec![0.25; 8]),
    );
    let second = add_track(
        &mut mixer,
        ChannelMask::MONO,
        SampleFormat::Float,
        VecProvider::float(1, vec![0.5; 8]),
    );
    set(&mut mixer, first, TrackParameter::MixerFormat(MixFormat::Float).into());
    set(&mut mixer, second, TrackParameter::MainBuffer(BusId(1)).into());
    mixer.process(None);

    assert_eq!(
        mixer.main_buffer(BusId(0)).expect("bus").to_f32(),
        vec![0.25; 16]
    );
    match mixer.main_buffer(BusId(1)).expect("bus") {
        OutputBuffer::Pcm16(data) => assert!(data.iter().all(|&sample| sample == 16_384)),
        other => panic!("expected pcm16 output, got {:?}", other.format()),
    }
    assert!(mixer.main_buffer(BusId(2)).is_none());
}

#[test]
fn disabled_tracks_leave_silence() {
    let mut mixer = mixer(8);
    let name = add_track(
        &mut mixer,
        ChannelMask::STEREO,
        SampleFormat::Pcm16,
        VecProvider::pcm16(2, vec![1_000; 64]),
    );
    mixer.process(None);
    assert!(pcm16_output(&mixer).iter().all(|&sample| sample == 1_000));

    mixer.disable(name).expect("disable");
    mixer.process(None);
    assert!(pcm16_output(&mixer).iter().all(|&sample| sample == 0));
}

#[test]
fn muted_tracks_keep_consuming_input() {
    let mut mixer = mixer(8);
    let (writer, provider) = sample_queue(2, 64, 16);
    assert_eq!(writer.push_interleaved(&[0.5; 128]), 64);
    let name = add_track(&mut mixer, ChannelMask::STEREO, SampleFormat::Float, provider);
    set(&mut mixer, name, Parameter::Volume(VolumeParameter::Volume0(0.0)));
    set(&mut mixer, name, Parameter::Volume(VolumeParameter::Volume1(0.0)));

    for _ in 0..3 {
        mixer.process(None);
    }
    assert!(pcm16_output(&mixer).iter().all(|&sample| sample == 0));
    // three blocks of 8 frames drain two 16-frame refills from the queue
    assert_eq!(writer.remaining_frames(), 32);
}

#[test]
fn underrun_fills_remainder_with_silence() {
    let mut mixer = mixer(8);
    add_track(
        &mut mixer,
        ChannelMask::MONO,
        SampleFormat::Pcm16,
        VecProvider::pcm16(1, vec![8_192; 3]),
    );
    mixer.process(None);
    let output = pcm16_output(&mixer);
    assert_eq!(&output[..6], &[8_192; 6]);
    assert!(output[6..].iter().all(|&sample| sample == 0));
    assert_eq!(mixer.underruns(), 1);
}

#[test]
fn chunk_requests_carry_advancing_timestamps() {
    let mut mixer = mixer(8);
    let requests = Arc::new(Mutex::new(Vec::new()));
    let provider = RecordingProvider {
        data: vec![0.1; 32],
        position: 0,
        chunk: 4,
        requests: requests.clone(),
    };
    add_track(&mut mixer, ChannelMask::MONO, SampleFormat::Float, provider);
    mixer.process(Some(1_000));
    let requests = requests.lock().unwrap().clone();
    assert_eq!(requests, vec![Some(1_000), Some(1_000 + 83_333)]);
}

#[test]
fn resampling_track_reports_and_drops_unreleased_frames() {
    let mut mixer = mixer(16);
    let name = add_track(
        &mut mixer,
        ChannelMask::STEREO,
        SampleFormat::Float,
        VecProvider::float(2, vec![0.5; 512]),
    );
    assert_eq!(mixer.unreleased_frames(name), 0);
    set(&mut mixer, name, ResampleParameter::SampleRate(44_100).into());
    mixer.process(None);
    assert!(mixer.unreleased_frames(name) > 0);
    let output = pcm16_output(&mixer);
    assert!(output[4..].iter().all(|&sample| sample == 16_384));

    set(&mut mixer, name, ResampleParameter::Remove.into());
    assert_eq!(mixer.unreleased_frames(name), 0);

    // back at the mix rate the track is a plain copy again
    set(&mut mixer, name, ResampleParameter::SampleRate(48_000).into());
    mixer.process(None);
    assert_eq!(mixer.unreleased_frames(name), 0);
    assert_eq!(pcm16_output(&mixer), vec![16_384; 32]);
}

#[test]
fn resampler_reset_discards_staged_frames() {
    let mut mixer = mixer(16);
    let name = add_track(
        &mut mixer,
        ChannelMask::MONO,
        SampleFormat::Pcm16,
        VecProvider::pcm16(1, vec![100; 256]),
    );
    set(&mut mixer, name, ResampleParameter::SampleRate(32_000).into());
    mixer.process(None);
    assert!(mixer.unreleased_frames(name) > 0);
    set(&mut mixer, name, ResampleParameter::Reset.into());
    assert_eq!(mixer.unreleased_frames(name), 0);
}

#[test]
fn multichannel_tracks_are_folded_to_stereo() {
    let mut mixer = mixer(4);
    // FL FR FC LFE BL BR
    let frame = [0.25f32, 0.0, 0.0, 0.0, 0.25, 0.5];
    let input: Vec<f32> = frame.iter().copied().cycle().take(6 * 8).collect();
    let name = add_track(
        &mut mixer,
        ChannelMask::FIVE_POINT_ONE,
        SampleFormat::Float,
        VecProvider::float(6, input),
    );
    set(&mut mixer, name, TrackParameter::MixerFormat(MixFormat::Float).into());
    mixer.process(None);
    let output = float_output(&mixer);
    for pair in output.chunks_exact(2) {
        assert_eq!(pair, &[0.5, 0.5]);
    }
}

#[test]
fn multichannel_without_downmixer_is_rejected() {
    let mut mixer = AudioMixer::with_downmix(MixerConfig::new(8, 48_000), None).expect("mixer");
    let err = mixer
        .get_track_name(ChannelMask::FIVE_POINT_ONE, SampleFormat::Pcm16, 0)
        .expect_err("downmix");
    assert_eq!(
        err,
        MixerError::Configuration(ConfigurationError::DownmixUnavailable(
            ChannelMask::FIVE_POINT_ONE
        ))
    );

    let name = mixer
        .get_track_name(ChannelMask::STEREO, SampleFormat::Pcm16, 0)
        .expect("name");
    let result = mixer.set_parameter(
        name,
        TrackParameter::ChannelMask(ChannelMask::SEVEN_POINT_ONE).into(),
    );
    assert!(result.is_err());
}

#[test]
fn invalid_masks_are_rejected() {
    let mut mixer = mixer(8);
    assert!(matches!(
        mixer.get_track_name(ChannelMask::from_bits(0), SampleFormat::Pcm16, 0),
        Err(MixerError::Configuration(ConfigurationError::InvalidChannelMask(_)))
    ));
}

#[test]
fn packed_24_bit_input_is_converted() {
    let mut mixer = mixer(4);
    let bytes: Vec<u8> = [0x00, 0x00, 0x40].iter().copied().cycle().take(3 * 4).collect();
    let name = add_track(
        &mut mixer,
        ChannelMask::MONO,
        SampleFormat::Pcm24Packed,
        VecProvider::pcm24_packed(1, bytes),
    );
    set(&mut mixer, name, TrackParameter::MixerFormat(MixFormat::Float).into());
    mixer.process(None);
    assert_eq!(float_output(&mixer), vec![0.5; 8]);
}

#[test]
fn format_change_rebuilds_conversion() {
    let mut mixer = mixer(4);
    let name = mixer
        .get_track_name(ChannelMask::MONO, SampleFormat::Float, 0)
        .expect("name");
    set(&mut mixer, name, TrackParameter::Format(SampleFormat::Pcm32).into());
    mixer
        .set_buffer_provider(name, Some(Box::new(VecProvider::pcm32(1, vec![0x2000_0000; 4]))))
        .expect("provider");
    mixer.enable(name).expect("enable");
    mixer.process(None);
    assert!(pcm16_output(&mixer).iter().all(|&sample| sample == 8_192));
}

#[test]
fn replacing_provider_returns_previous() {
    let mut mixer = mixer(4);
    let name = add_track(
        &mut mixer,
        ChannelMask::MONO,
        SampleFormat::Pcm16,
        VecProvider::pcm16(1, vec![1; 8]),
    );
    let previous = mixer
        .set_buffer_provider(name, Some(Box::new(VecProvider::pcm16(1, vec![2; 8]))))
        .expect("provider");
    assert!(previous.is_some());
    mixer.process(None);
    assert!(pcm16_output(&mixer).iter().all(|&sample| sample == 2));

    let detached = mixer.delete_track_name(name).expect("delete");
    assert!(detached.is_some());
}
