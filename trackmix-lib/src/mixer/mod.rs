//! Multi-track mixing engine.
//!
//! An [`AudioMixer`] owns up to 32 track slots. Each allocated track pulls
//! frames from a [`BufferProvider`](crate::provider::BufferProvider), is
//! optionally downmixed, reformatted and resampled, and is then scaled by its
//! gains and summed into a stereo main bus and, optionally, a mono aux bus.
//!
//! Configuration calls classify tracks lazily: any change that can alter
//! the choice of mix kernel invalidates the cached strategy, and the next
//! [`AudioMixer::process`] call reclassifies before rendering.

use log::{debug, info};

mod bus;
mod hooks;
mod kernels;
mod params;
mod process;
mod track;
mod volume;

pub use bus::OutputBuffer;
pub use params::{
    BusId, Parameter, ResampleParameter, TrackName, TrackParameter, VolumeParameter,
};

use crate::config::MixerConfig;
use crate::constants::MAX_NUM_TRACKS;
use crate::error::{ConfigurationError, MixerError};
use crate::format::{
    ChannelMask, SampleFormat, MAX_NUM_CHANNELS, MAX_NUM_CHANNELS_TO_DOWNMIX,
};
use crate::gain::clamp_track_gain;
use crate::provider::{BoxedProvider, DownmixFactory, DownmixType, StandardDownmixFactory};
use crate::resampler::{Resampler, MAX_RATE_RATIO};
use bus::{AuxBus, MainBus};
use hooks::ProcessHook;
use process::MixerState;
use track::{ProviderChain, Track};

/// Mixes many tracks into a small set of output buses, one block at a time.
///
/// Configuration methods take `&mut self` and must not run concurrently with
/// [`AudioMixer::process`]; move the mixer between threads or wrap it in a
/// lock to share it.
pub struct AudioMixer {
    config: MixerConfig,
    track_names: u32,
    configured_names: u32,
    downmix: Option<Box<dyn DownmixFactory>>,
    state: MixerState,
}

impl std::fmt::Debug for AudioMixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioMixer")
            .field("config", &self.config)
            .field("track_names", &format_args!("{:#010x}", self.track_names))
            .field("downmix", &self.downmix.is_some())
            .field("state", &self.state)
            .finish()
    }
}

impl AudioMixer {
    /// Create a mixer using the standard downmix capability.
    pub fn new(config: MixerConfig) -> Result<Self, MixerError> {
        Self::with_downmix(config, StandardDownmixFactory::probe())
    }

    /// Create a mixer with an explicit downmix capability.
    ///
    /// # Arguments
    /// - `config`: Block size, rate, capacity and bus layout.
    /// - `downmix`: Factory used for tracks with more than two channels; with
    ///   `None` such tracks are rejected.
    pub fn with_downmix(
        config: MixerConfig,
        downmix: Option<Box<dyn DownmixFactory>>,
    ) -> Result<Self, MixerError> {
        config.validate()?;
        let frame_count = config.frame_count;
        let configured_names = if config.max_tracks >= MAX_NUM_TRACKS {
            u32::MAX
        } else {
            (1u32 << config.max_tracks) - 1
        };
        let state = MixerState {
            enabled_tracks: 0,
            needs_changed: 0,
            frame_count,
            sample_rate: config.sample_rate,
            hook: ProcessHook::Validate,
            tracks: (0..MAX_NUM_TRACKS).map(|_| Track::new(&config)).collect(),
            main_buses: (0..config.main_buses)
                .map(|_| MainBus::new(frame_count, config.output_format))
                .collect(),
            aux_buses: (0..config.aux_buses)
                .map(|_| AuxBus::new(frame_count))
                .collect(),
            resample_temp: vec![0.0; frame_count * MAX_NUM_CHANNELS],
            underruns: 0,
        };
        info!(
            "mixer ready: {} frames at {} Hz, {} tracks, {} main / {} aux buses, downmix {}",
            frame_count,
            config.sample_rate,
            config.max_tracks,
            config.main_buses,
            config.aux_buses,
            if downmix.is_some() { "available" } else { "unavailable" }
        );
        Ok(Self {
            config,
            track_names: 0,
            configured_names,
            downmix,
            state,
        })
    }

    /// Allocate the lowest free track slot.
    ///
    /// The track starts disabled, at unity gain, without a provider, routed
    /// to main bus 0 and to no aux bus.
    ///
    /// # Errors
    /// [`ConfigurationError`] for an unusable mask, and
    /// [`MixerError::ResourceExhausted`] when every slot is taken.
    pub fn get_track_name(
        &mut self,
        channel_mask: ChannelMask,
        format: SampleFormat,
        session_id: i32,
    ) -> Result<TrackName, MixerError> {
        self.check_channel_mask(channel_mask, DownmixType::default())?;
        let free = self.configured_names & !self.track_names;
        if free == 0 {
            return Err(MixerError::ResourceExhausted {
                capacity: self.config.max_tracks,
            });
        }
        let name = TrackName::from_index(free.trailing_zeros() as usize);
        self.state.tracks[name.index()].reset(&self.config, channel_mask, format, session_id);
        self.track_names |= name.bit();
        debug!(
            "allocated {} ({} channels, {}, session {})",
            name,
            channel_mask.channel_count(),
            format,
            session_id
        );
        Ok(name)
    }

    /// Release a track slot.
    ///
    /// # Returns
    /// The provider that was attached, so the caller can dispose of it.
    pub fn delete_track_name(&mut self, name: TrackName) -> Result<Option<BoxedProvider>, MixerError> {
        self.ensure_allocated(name)?;
        let track = &mut self.state.tracks[name.index()];
        let source = track.chain.take().map(ProviderChain::into_source);
        track.resampler = None;
        track.enabled = false;
        self.state.enabled_tracks &= !name.bit();
        self.track_names &= !name.bit();
        self.state.invalidate(name.bit());
        debug!("deleted {}", name);
        Ok(source)
    }

    /// Include a track in subsequent blocks.
    pub fn enable(&mut self, name: TrackName) -> Result<(), MixerError> {
        self.ensure_allocated(name)?;
        let track = &mut self.state.tracks[name.index()];
        if !track.enabled {
            track.enabled = true;
            self.state.enabled_tracks |= name.bit();
            self.state.invalidate(name.bit());
        }
        Ok(())
    }

    /// Exclude a track from subsequent blocks. Its provider is left untouched.
    pub fn disable(&mut self, name: TrackName) -> Result<(), MixerError> {
        self.ensure_allocated(name)?;
        let track = &mut self.state.tracks[name.index()];
        if track.enabled {
            track.enabled = false;
            self.state.enabled_tracks &= !name.bit();
            self.state.invalidate(name.bit());
        }
        Ok(())
    }

    /// Apply a parameter write to a track.
    ///
    /// Writing the value a track already has is a no-op and leaves the
    /// cached mix strategy in place.
    pub fn set_parameter(&mut self, name: TrackName, parameter: Parameter) -> Result<(), MixerError> {
        self.ensure_allocated(name)?;
        let result = match parameter {
            Parameter::Track(param) => self.set_track_parameter(name, param),
            Parameter::Resample(param) => self.set_resample_parameter(name, param),
            Parameter::RampVolume(param) => {
                let frames = self.config.ramp_frames();
                self.set_volume(name, param, frames)
            }
            Parameter::Volume(param) => self.set_volume(name, param, 0),
        };
        match result {
            Ok(false) => Ok(()),
            Ok(true) => {
                self.state.invalidate(name.bit());
                Ok(())
            }
            Err(err) => {
                // the track may be half reconfigured; reclassify it either way
                self.state.invalidate(name.bit());
                Err(err.into())
            }
        }
    }

    /// Attach, replace or detach a track's provider.
    ///
    /// Downmix and reformat wrappers are rebuilt around the new provider.
    /// On error the previous provider stays attached.
    ///
    /// # Returns
    /// The previously attached provider.
    pub fn set_buffer_provider(
        &mut self,
        name: TrackName,
        provider: Option<BoxedProvider>,
    ) -> Result<Option<BoxedProvider>, MixerError> {
        self.ensure_allocated(name)?;
        let index = name.index();
        let layout = self.state.tracks[index].layout(self.config.frame_count);
        let chain = match provider {
            Some(source) => Some(ProviderChain::build(source, &layout, self.downmix.as_deref())?),
            None => None,
        };
        let track = &mut self.state.tracks[index];
        let previous = std::mem::replace(&mut track.chain, chain).map(ProviderChain::into_source);
        self.state.invalidate(name.bit());
        Ok(previous)
    }

    /// Render one block of `frame_count` frames into every bus.
    ///
    /// `pts` is the presentation time of the first frame in nanoseconds;
    /// provider requests carry the time of the frame they start at. Buses no
    /// enabled track writes to are filled with silence.
    pub fn process(&mut self, pts: Option<i64>) {
        self.state.process(pts);
    }

    /// Frames a track has pulled from its provider but not yet mixed.
    ///
    /// Zero for unknown tracks and tracks without a resampler.
    pub fn unreleased_frames(&self, name: TrackName) -> usize {
        if self.track_names & name.bit() == 0 {
            return 0;
        }
        self.state.tracks[name.index()].unreleased_frames()
    }

    /// Bitmask of allocated track names.
    pub fn track_names(&self) -> u32 {
        self.track_names
    }

    /// Bitmask of enabled track names.
    pub fn enabled_tracks(&self) -> u32 {
        self.state.enabled_tracks
    }

    pub fn is_enabled(&self, name: TrackName) -> bool {
        self.state.enabled_tracks & name.bit() != 0
    }

    pub fn session_id(&self, name: TrackName) -> Option<i32> {
        (self.track_names & name.bit() != 0).then(|| self.state.tracks[name.index()].session_id)
    }

    pub fn frame_count(&self) -> usize {
        self.config.frame_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    /// Number of tracks that ran out of input mid-block so far.
    pub fn underruns(&self) -> u64 {
        self.state.underruns
    }

    /// Contents of a main bus after the last [`AudioMixer::process`].
    pub fn main_buffer(&self, bus: BusId) -> Option<OutputBuffer<'_>> {
        self.state.main_buses.get(bus.0).map(MainBus::view)
    }

    /// Contents of an aux bus after the last [`AudioMixer::process`].
    pub fn aux_buffer(&self, bus: BusId) -> Option<&[f32]> {
        self.state
            .aux_buses
            .get(bus.0)
            .map(|bus| bus.samples.as_slice())
    }

    fn ensure_allocated(&self, name: TrackName) -> Result<(), ConfigurationError> {
        if self.track_names & name.bit() == 0 {
            return Err(ConfigurationError::UnknownTrack(name));
        }
        Ok(())
    }

    fn check_channel_mask(
        &self,
        mask: ChannelMask,
        kind: DownmixType,
    ) -> Result<(), ConfigurationError> {
        let channels = mask.channel_count();
        if !mask.is_valid() || channels > MAX_NUM_CHANNELS_TO_DOWNMIX {
            return Err(ConfigurationError::InvalidChannelMask(mask));
        }
        if channels > MAX_NUM_CHANNELS {
            let supported = self
                .downmix
                .as_ref()
                .map_or(false, |factory| factory.supports(mask, kind));
            if !supported {
                return Err(ConfigurationError::DownmixUnavailable(mask));
            }
        }
        Ok(())
    }

    fn set_track_parameter(
        &mut self,
        name: TrackName,
        param: TrackParameter,
    ) -> Result<bool, ConfigurationError> {
        let index = name.index();
        let frame_count = self.config.frame_count;
        match param {
            TrackParameter::ChannelMask(mask) => {
                self.check_channel_mask(mask, self.state.tracks[index].downmix_type)?;
                let track = &mut self.state.tracks[index];
                if track.channel_mask == mask {
                    return Ok(false);
                }
                track.check_source_fits(mask, track.format)?;
                let previous_channels = track.mix_channel_count();
                track.channel_mask = mask;
                let channels = track.mix_channel_count();
                if channels != previous_channels {
                    if let Some(previous) = track.resampler.take() {
                        track.resampler = Some(Resampler::new(
                            previous.quality(),
                            channels,
                            previous.input_rate(),
                            previous.output_rate(),
                            frame_count,
                        ));
                    }
                }
                track.rebuild_chain(frame_count, self.downmix.as_deref())?;
                Ok(true)
            }
            TrackParameter::Format(format) => {
                let track = &mut self.state.tracks[index];
                if track.format == format {
                    return Ok(false);
                }
                track.check_source_fits(track.channel_mask, format)?;
                track.format = format;
                track.rebuild_chain(frame_count, self.downmix.as_deref())?;
                Ok(true)
            }
            TrackParameter::MainBuffer(bus) => {
                if bus.0 >= self.state.main_buses.len() {
                    return Err(ConfigurationError::InvalidBus(bus));
                }
                let track = &mut self.state.tracks[index];
                let changed = track.main_bus != bus.0;
                track.main_bus = bus.0;
                Ok(changed)
            }
            TrackParameter::AuxBuffer(bus) => {
                if let Some(bus) = bus {
                    if bus.0 >= self.state.aux_buses.len() {
                        return Err(ConfigurationError::InvalidBus(bus));
                    }
                }
                let track = &mut self.state.tracks[index];
                let bus = bus.map(|bus| bus.0);
                let changed = track.aux_bus != bus;
                track.aux_bus = bus;
                Ok(changed)
            }
            TrackParameter::DownmixType(kind) => {
                let mask = self.state.tracks[index].channel_mask;
                if self.state.tracks[index].downmix_type == kind {
                    return Ok(false);
                }
                self.check_channel_mask(mask, kind)?;
                let track = &mut self.state.tracks[index];
                track.downmix_type = kind;
                if mask.channel_count() > MAX_NUM_CHANNELS {
                    track.rebuild_chain(frame_count, self.downmix.as_deref())?;
                }
                Ok(true)
            }
            TrackParameter::MixerFormat(format) => {
                let track = &mut self.state.tracks[index];
                let changed = track.mixer_format != format;
                track.mixer_format = format;
                Ok(changed)
            }
        }
    }

    fn set_resample_parameter(
        &mut self,
        name: TrackName,
        param: ResampleParameter,
    ) -> Result<bool, ConfigurationError> {
        let mix_rate = self.config.sample_rate;
        let track = &mut self.state.tracks[name.index()];
        match param {
            ResampleParameter::SampleRate(rate) => {
                let max = mix_rate.saturating_mul(MAX_RATE_RATIO);
                if rate == 0 || rate > max {
                    return Err(ConfigurationError::InvalidSampleRate { rate, max });
                }
                if track.sample_rate == rate {
                    return Ok(false);
                }
                track.sample_rate = rate;
                match track.resampler.as_mut() {
                    Some(resampler) => resampler.set_sample_rate(rate),
                    None => {
                        debug!("{}: resampling {} Hz to {} Hz", name, rate, mix_rate);
                        track.resampler = Some(Resampler::new(
                            self.config.resampler_quality,
                            track.mix_channel_count(),
                            rate,
                            mix_rate,
                            self.config.frame_count,
                        ));
                    }
                }
                Ok(true)
            }
            ResampleParameter::Reset => {
                if let Some(resampler) = track.resampler.as_mut() {
                    resampler.reset();
                }
                Ok(false)
            }
            ResampleParameter::Remove => {
                track.sample_rate = mix_rate;
                Ok(track.resampler.take().is_some())
            }
        }
    }

    fn set_volume(
        &mut self,
        name: TrackName,
        param: VolumeParameter,
        ramp_frames: usize,
    ) -> Result<bool, ConfigurationError> {
        let value = match param {
            VolumeParameter::Volume0(value)
            | VolumeParameter::Volume1(value)
            | VolumeParameter::AuxLevel(value) => value,
        };
        let gain = clamp_track_gain(value).ok_or(ConfigurationError::InvalidGain(value))?;
        let track = &mut self.state.tracks[name.index()];
        let before = track.compute_needs();
        let ramp = match param {
            VolumeParameter::Volume0(_) => &mut track.volume.left,
            VolumeParameter::Volume1(_) => &mut track.volume.right,
            VolumeParameter::AuxLevel(_) => &mut track.volume.aux,
        };
        let changed = if ramp_frames == 0 {
            ramp.set(gain)
        } else {
            ramp.ramp_to(gain, ramp_frames)
        };
        Ok(changed && track.compute_needs() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::MixFormat;
    use crate::provider::VecProvider;

    fn mixer(frame_count: usize) -> AudioMixer {
        AudioMixer::new(MixerConfig::new(frame_count, 48_000)).expect("mixer")
    }

    #[test]
    fn names_are_lowest_free_slot() {
        let mut mixer = mixer(16);
        let first = mixer
            .get_track_name(ChannelMask::STEREO, SampleFormat::Pcm16, 0)
            .expect("name");
        let second = mixer
            .get_track_name(ChannelMask::STEREO, SampleFormat::Pcm16, 0)
            .expect("name");
        assert_eq!((first.index(), second.index()), (0, 1));
        mixer.delete_track_name(first).expect("delete");
        let third = mixer
            .get_track_name(ChannelMask::MONO, SampleFormat::Float, 7)
            .expect("name");
        assert_eq!(third.index(), 0);
        assert_eq!(mixer.session_id(third), Some(7));
    }

    #[test]
    fn idempotent_writes_keep_cached_hook() {
        let mut mixer = mixer(16);
        let name = mixer
            .get_track_name(ChannelMask::STEREO, SampleFormat::Float, 0)
            .expect("name");
        mixer
            .set_buffer_provider(name, Some(Box::new(VecProvider::float(2, vec![0.0; 64]))))
            .expect("provider");
        mixer.enable(name).expect("enable");
        mixer.process(None);
        assert!(matches!(
            mixer.state.hook,
            ProcessHook::OneTrackNoResample { .. }
        ));

        mixer
            .set_parameter(name, Parameter::Volume(VolumeParameter::Volume0(1.0)))
            .expect("volume");
        mixer
            .set_parameter(name, Parameter::Track(TrackParameter::MainBuffer(BusId(0))))
            .expect("bus");
        mixer
            .set_parameter(name, Parameter::Resample(ResampleParameter::SampleRate(48_000)))
            .expect("rate");
        assert_ne!(mixer.state.hook, ProcessHook::Validate);

        mixer
            .set_parameter(name, Parameter::Track(TrackParameter::MixerFormat(MixFormat::Float)))
            .expect("format");
        assert_eq!(mixer.state.hook, ProcessHook::Validate);
    }

    #[test]
    fn rate_is_bounded_by_twice_the_mix_rate() {
        let mut mixer = mixer(16);
        let name = mixer
            .get_track_name(ChannelMask::STEREO, SampleFormat::Pcm16, 0)
            .expect("name");
        let err = mixer
            .set_parameter(name, Parameter::Resample(ResampleParameter::SampleRate(96_001)))
            .expect_err("too fast");
        assert_eq!(
            err,
            MixerError::Configuration(ConfigurationError::InvalidSampleRate {
                rate: 96_001,
                max: 96_000
            })
        );
        mixer
            .set_parameter(name, Parameter::Resample(ResampleParameter::SampleRate(96_000)))
            .expect("rate");
    }

    #[test]
    fn unknown_buses_are_rejected() {
        let mut mixer = mixer(16);
        let name = mixer
            .get_track_name(ChannelMask::STEREO, SampleFormat::Pcm16, 0)
            .expect("name");
        let err = mixer
            .set_parameter(name, Parameter::Track(TrackParameter::AuxBuffer(Some(BusId(3)))))
            .expect_err("bus");
        assert_eq!(
            err,
            MixerError::Configuration(ConfigurationError::InvalidBus(BusId(3)))
        );
    }

    #[test]
    fn deleted_names_are_unknown() {
        let mut mixer = mixer(16);
        let name = mixer
            .get_track_name(ChannelMask::STEREO, SampleFormat::Pcm16, 0)
            .expect("name");
        mixer.delete_track_name(name).expect("delete");
        assert!(mixer.enable(name).is_err());
        assert_eq!(mixer.unreleased_frames(name), 0);
        assert_eq!(mixer.session_id(name), None);
    }

    #[test]
    fn non_finite_gain_is_rejected() {
        let mut mixer = mixer(16);
        let name = mixer
            .get_track_name(ChannelMask::STEREO, SampleFormat::Pcm16, 0)
            .expect("name");
        let result = mixer.set_parameter(name, Parameter::Volume(VolumeParameter::Volume1(f32::NAN)));
        assert!(matches!(
            result,
            Err(MixerError::Configuration(ConfigurationError::InvalidGain(_)))
        ));
    }
}
