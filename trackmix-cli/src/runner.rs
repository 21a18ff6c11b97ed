use std::fs;
use std::path::{Path, PathBuf};

use clap::ArgMatches;
use hound::{WavSpec, WavWriter};
use log::{debug, info, warn};

use trackmix_lib::convert::{f32_to_i16, i16_to_f32};
use trackmix_lib::format::{ChannelMask, MixFormat};
use trackmix_lib::mixer::{
    AudioMixer, BusId, OutputBuffer, Parameter, ResampleParameter, TrackName, TrackParameter,
    VolumeParameter,
};
use trackmix_lib::resampler::frames_to_nanos;

use crate::cli;
use crate::decode::{decode_file, tone};
use crate::error::RunError;
use crate::scene::{ms_to_frames, Scene, SourceSpec, TrackEvent, TrackSpec};

/// Dispatch the parsed command line and return the process exit code.
pub fn run(args: &ArgMatches) -> Result<i32, RunError> {
    if let Some(code) = cli::bench::maybe_run_bench(args)? {
        return Ok(code);
    }

    match args.subcommand() {
        Some(("render", render_args)) => run_render(render_args),
        Some(("create", create_args)) => match create_args.subcommand_name() {
            Some("scene-json") => {
                println!("{}", serde_json::to_string_pretty(&Scene::example())?);
                Ok(0)
            }
            _ => {
                eprintln!("Specify a payload to create, e.g. `create scene-json`.");
                Ok(1)
            }
        },
        _ => Ok(0),
    }
}

fn run_render(args: &ArgMatches) -> Result<i32, RunError> {
    let scene_path = PathBuf::from(
        args.get_one::<String>("SCENE")
            .ok_or_else(|| RunError::Scene("no scene path given".to_string()))?,
    );
    let out_path = PathBuf::from(
        args.get_one::<String>("out")
            .ok_or_else(|| RunError::Scene("no output path given".to_string()))?,
    );
    let bus = BusId(args.get_one::<usize>("bus").copied().unwrap_or(0));
    let aux_path = args.get_one::<String>("aux-out").map(PathBuf::from);

    let scene = Scene::from_json(&fs::read_to_string(&scene_path)?)?;
    if bus.0 >= scene.mixer.main_buses {
        return Err(RunError::Scene(format!(
            "bus {} not among the scene's {} main bus(es)",
            bus.0, scene.mixer.main_buses
        )));
    }
    if aux_path.is_some() && scene.mixer.aux_buses == 0 {
        return Err(RunError::Scene("scene has no aux bus".to_string()));
    }

    let base_dir = scene_path.parent().unwrap_or_else(|| Path::new("."));
    let mut mixer = AudioMixer::new(scene.mixer.clone())?;
    let mut tracks = Vec::with_capacity(scene.tracks.len());
    for (index, spec) in scene.tracks.iter().enumerate() {
        let name = add_track(&mut mixer, spec, index, base_dir)?;
        tracks.push(ScheduledTrack::new(name, spec, mixer.sample_rate()));
    }

    let rendered = render(&mut mixer, &scene, &mut tracks, bus, &out_path, aux_path.as_deref())?;
    if mixer.underruns() > 0 {
        warn!("{} track underrun(s) while rendering", mixer.underruns());
    }
    info!(
        "Rendered {} frame(s) from {} track(s) to {}",
        rendered,
        tracks.len(),
        out_path.display()
    );
    Ok(0)
}

fn add_track(
    mixer: &mut AudioMixer,
    spec: &TrackSpec,
    index: usize,
    base_dir: &Path,
) -> Result<TrackName, RunError> {
    let audio = match &spec.source {
        SourceSpec::Tone {
            frequency,
            channels,
            sample_rate,
            seconds,
            amplitude,
        } => tone(*frequency, *channels, *sample_rate, *seconds, *amplitude),
        SourceSpec::File { path } => decode_file(&base_dir.join(path))?,
    };

    let mask = ChannelMask::for_channel_count(audio.channels).ok_or_else(|| {
        RunError::Scene(format!(
            "track {} has an unsupported channel count {}",
            index, audio.channels
        ))
    })?;
    let name = mixer.get_track_name(mask, spec.format, index as i32)?;
    let sample_rate = audio.sample_rate;
    mixer.set_parameter(name, TrackParameter::DownmixType(spec.downmix).into())?;
    mixer.set_buffer_provider(name, Some(Box::new(audio.into_provider(spec.format, spec.looping))))?;

    if sample_rate != mixer.sample_rate() {
        debug!("{} resampled from {} Hz", name, sample_rate);
        mixer.set_parameter(name, ResampleParameter::SampleRate(sample_rate).into())?;
    }
    mixer.set_parameter(name, TrackParameter::MainBuffer(BusId(spec.bus)).into())?;
    mixer.set_parameter(name, TrackParameter::AuxBuffer(spec.aux_bus.map(BusId)).into())?;
    if let Some(format) = spec.mixer_format {
        mixer.set_parameter(name, TrackParameter::MixerFormat(format).into())?;
    }
    set_gains(mixer, name, Some(spec.gain), Some(spec.aux_level), false)?;
    Ok(name)
}

fn set_gains(
    mixer: &mut AudioMixer,
    name: TrackName,
    gain: Option<f32>,
    aux_level: Option<f32>,
    ramp: bool,
) -> Result<(), RunError> {
    let wrap = |volume: VolumeParameter| {
        if ramp {
            Parameter::RampVolume(volume)
        } else {
            Parameter::Volume(volume)
        }
    };
    if let Some(gain) = gain {
        mixer.set_parameter(name, wrap(VolumeParameter::Volume0(gain)))?;
        mixer.set_parameter(name, wrap(VolumeParameter::Volume1(gain)))?;
    }
    if let Some(level) = aux_level {
        mixer.set_parameter(name, wrap(VolumeParameter::AuxLevel(level)))?;
    }
    Ok(())
}

/// A track's pending timeline, in mix-rate frames.
struct ScheduledTrack {
    name: TrackName,
    start_frame: usize,
    started: bool,
    events: Vec<(usize, TrackEvent)>,
}

impl ScheduledTrack {
    fn new(name: TrackName, spec: &TrackSpec, rate: u32) -> Self {
        let mut events: Vec<(usize, TrackEvent)> = spec
            .events
            .iter()
            .map(|event| (ms_to_frames(event.at_ms, rate), event.clone()))
            .collect();
        // popped from the back
        events.sort_by_key(|(at, _)| *at);
        events.reverse();
        Self {
            name,
            start_frame: ms_to_frames(spec.start_ms, rate),
            started: false,
            events,
        }
    }

    /// Apply everything due at or before `frame`.
    fn advance(&mut self, mixer: &mut AudioMixer, frame: usize) -> Result<(), RunError> {
        if !self.started && self.start_frame <= frame {
            self.started = true;
            mixer.enable(self.name)?;
        }
        while self.events.last().is_some_and(|(at, _)| *at <= frame) {
            let Some((_, event)) = self.events.pop() else {
                break;
            };
            set_gains(mixer, self.name, event.gain, event.aux_level, event.ramp)?;
            match event.enabled {
                Some(true) => {
                    self.started = true;
                    mixer.enable(self.name)?;
                }
                Some(false) => mixer.disable(self.name)?,
                None => {}
            }
        }
        Ok(())
    }
}

fn render(
    mixer: &mut AudioMixer,
    scene: &Scene,
    tracks: &mut [ScheduledTrack],
    bus: BusId,
    out_path: &Path,
    aux_path: Option<&Path>,
) -> Result<usize, RunError> {
    let frame_count = mixer.frame_count();
    let sample_rate = mixer.sample_rate();
    let blocks = scene.block_count();
    let block_nanos = frames_to_nanos(frame_count, sample_rate);

    let format = scene.bus_format(bus.0);
    let spec = match format {
        MixFormat::Pcm16 => WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        },
        MixFormat::Float => float_spec(2, sample_rate),
    };
    debug!("writing {} output to {}", format, out_path.display());
    let mut writer = WavWriter::create(out_path, spec)?;
    let mut aux_writer = match aux_path {
        Some(path) => Some(WavWriter::create(path, float_spec(1, sample_rate))?),
        None => None,
    };

    for block in 0..blocks {
        let frame = block * frame_count;
        for track in tracks.iter_mut() {
            track.advance(mixer, frame)?;
        }
        mixer.process(Some(block as i64 * block_nanos));

        let output = mixer
            .main_buffer(bus)
            .ok_or_else(|| RunError::Scene(format!("bus {} has no output", bus.0)))?;
        // the bus follows its enabled tracks, so blocks may differ from the file
        match (output, format) {
            (OutputBuffer::Pcm16(samples), MixFormat::Pcm16) => {
                for &sample in samples {
                    writer.write_sample(sample)?;
                }
            }
            (OutputBuffer::Pcm16(samples), MixFormat::Float) => {
                for &sample in samples {
                    writer.write_sample(i16_to_f32(sample))?;
                }
            }
            (OutputBuffer::Float(samples), MixFormat::Float) => {
                for &sample in samples {
                    writer.write_sample(sample)?;
                }
            }
            (OutputBuffer::Float(samples), MixFormat::Pcm16) => {
                for &sample in samples {
                    writer.write_sample(f32_to_i16(sample))?;
                }
            }
        }

        if let (Some(aux_writer), Some(samples)) = (aux_writer.as_mut(), mixer.aux_buffer(BusId(0))) {
            for &sample in samples {
                aux_writer.write_sample(sample)?;
            }
        }
    }

    writer.finalize()?;
    if let Some(aux_writer) = aux_writer {
        aux_writer.finalize()?;
    }
    Ok(blocks * frame_count)
}

fn float_spec(channels: u16, sample_rate: u32) -> WavSpec {
    WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    }
}
