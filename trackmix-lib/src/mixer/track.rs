//! Track slot state and the provider chain feeding it.

use log::warn;

use super::hooks::TrackHook;
use super::volume::TrackVolume;
use crate::config::MixerConfig;
use crate::error::ConfigurationError;
use crate::format::{ChannelMask, MixFormat, SampleFormat, MAX_NUM_CHANNELS};
use crate::provider::{
    BoxedProvider, BufferProvider, DownmixFactory, DownmixProvider, DownmixType, ReformatProvider,
};
use crate::resampler::Resampler;

/// Classification bits deciding which kernel a track runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Needs(u32);

impl Needs {
    const CHANNEL_COUNT_MASK: u32 = 0x7;
    pub(crate) const MUTE: u32 = 0x100;
    pub(crate) const RESAMPLE: u32 = 0x1000;
    pub(crate) const AUX: u32 = 0x1_0000;
    pub(crate) const RAMP: u32 = 0x10_0000;

    pub(crate) fn channel_count(self) -> usize {
        (self.0 & Self::CHANNEL_COUNT_MASK) as usize + 1
    }

    pub(crate) fn contains(self, flag: u32) -> bool {
        self.0 & flag != 0
    }

    fn with(self, flag: u32, set: bool) -> Self {
        if set {
            Self(self.0 | flag)
        } else {
            self
        }
    }
}

/// Geometry of a track's provider chain.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChainLayout {
    pub(crate) format: SampleFormat,
    pub(crate) channel_mask: ChannelMask,
    pub(crate) downmix_type: DownmixType,
    pub(crate) mixer_in_format: MixFormat,
    pub(crate) max_frames: usize,
}

impl ChainLayout {
    /// Reject a source whose frames disagree with the declared mask or format.
    pub(crate) fn check_source(&self, source: &dyn BufferProvider) -> Result<(), ConfigurationError> {
        let expected_channels = self.channel_mask.channel_count();
        let channels = source.channel_count();
        let format = source.format();
        if channels != expected_channels || format != self.format {
            return Err(ConfigurationError::ProviderMismatch {
                channels,
                format,
                expected_channels,
                expected_format: self.format,
            });
        }
        Ok(())
    }
}

/// The caller's provider plus whatever wrappers bring it to the mix format.
///
/// Downmixing always happens before reformatting.
pub(crate) enum ProviderChain {
    Source(BoxedProvider),
    Reformatted(ReformatProvider<BoxedProvider>),
    Downmixed(DownmixProvider<BoxedProvider>),
    DownmixedReformatted(ReformatProvider<DownmixProvider<BoxedProvider>>),
}

impl ProviderChain {
    /// Wrap `source` for the given layout.
    pub(crate) fn build(
        source: BoxedProvider,
        layout: &ChainLayout,
        downmix: Option<&dyn DownmixFactory>,
    ) -> Result<Self, ConfigurationError> {
        layout.check_source(&*source)?;
        let channels = layout.channel_mask.channel_count();
        if channels > MAX_NUM_CHANNELS {
            let downmixer = downmix
                .and_then(|factory| factory.create(layout.channel_mask, layout.downmix_type))
                .ok_or(ConfigurationError::DownmixUnavailable(layout.channel_mask))?;
            let downmixed = DownmixProvider::new(source, downmixer, layout.max_frames);
            if layout.mixer_in_format == MixFormat::Float {
                return Ok(Self::Downmixed(downmixed));
            }
            return Ok(Self::DownmixedReformatted(ReformatProvider::new(
                downmixed,
                MAX_NUM_CHANNELS,
                SampleFormat::Float,
                layout.mixer_in_format,
                layout.max_frames,
            )));
        }

        if layout.format == SampleFormat::from(layout.mixer_in_format) {
            return Ok(Self::Source(source));
        }
        Ok(Self::Reformatted(ReformatProvider::new(
            source,
            channels,
            layout.format,
            layout.mixer_in_format,
            layout.max_frames,
        )))
    }

    /// Strip every wrapper and return the caller's provider.
    pub(crate) fn into_source(self) -> BoxedProvider {
        match self {
            Self::Source(source) => source,
            Self::Reformatted(reformat) => reformat.into_inner(),
            Self::Downmixed(downmix) => downmix.into_inner(),
            Self::DownmixedReformatted(reformat) => reformat.into_inner().into_inner(),
        }
    }

    /// The caller's provider, below any wrapper.
    pub(crate) fn source(&self) -> &dyn BufferProvider {
        match self {
            Self::Source(source) => &**source,
            Self::Reformatted(reformat) => &**reformat.inner(),
            Self::Downmixed(downmix) => &**downmix.inner(),
            Self::DownmixedReformatted(reformat) => &**reformat.inner().inner(),
        }
    }

    /// Outermost provider of the chain.
    #[inline]
    pub(crate) fn provider(&mut self) -> &mut dyn BufferProvider {
        match self {
            Self::Source(source) => source.as_mut(),
            Self::Reformatted(reformat) => reformat,
            Self::Downmixed(downmix) => downmix,
            Self::DownmixedReformatted(reformat) => reformat,
        }
    }
}

impl std::fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Source(_) => "Source",
            Self::Reformatted(_) => "Reformatted",
            Self::Downmixed(_) => "Downmixed",
            Self::DownmixedReformatted(_) => "DownmixedReformatted",
        };
        f.debug_tuple("ProviderChain").field(&kind).finish()
    }
}

/// One mixer track slot. Slots are allocated once and reused.
#[derive(Debug)]
pub(crate) struct Track {
    pub(crate) needs: Needs,
    pub(crate) hook: TrackHook,
    pub(crate) volume: TrackVolume,
    pub(crate) channel_mask: ChannelMask,
    pub(crate) format: SampleFormat,
    pub(crate) mixer_in_format: MixFormat,
    pub(crate) mixer_format: MixFormat,
    pub(crate) downmix_type: DownmixType,
    pub(crate) session_id: i32,
    pub(crate) sample_rate: u32,
    pub(crate) main_bus: usize,
    pub(crate) aux_bus: Option<usize>,
    pub(crate) enabled: bool,
    pub(crate) resampler: Option<Resampler>,
    pub(crate) chain: Option<ProviderChain>,
}

impl Track {
    pub(crate) fn new(config: &MixerConfig) -> Self {
        Self {
            needs: Needs::default(),
            hook: TrackHook::Nop,
            volume: TrackVolume::default(),
            channel_mask: ChannelMask::STEREO,
            format: SampleFormat::Pcm16,
            mixer_in_format: config.mixer_in_format,
            mixer_format: config.output_format,
            downmix_type: DownmixType::default(),
            session_id: 0,
            sample_rate: config.sample_rate,
            main_bus: 0,
            aux_bus: None,
            enabled: false,
            resampler: None,
            chain: None,
        }
    }

    /// Return the slot to freshly allocated defaults.
    pub(crate) fn reset(
        &mut self,
        config: &MixerConfig,
        channel_mask: ChannelMask,
        format: SampleFormat,
        session_id: i32,
    ) {
        *self = Self::new(config);
        self.channel_mask = channel_mask;
        self.format = format;
        self.session_id = session_id;
    }

    /// Channels handed to the mix kernels (after any downmix).
    pub(crate) fn mix_channel_count(&self) -> usize {
        self.channel_mask.channel_count().min(MAX_NUM_CHANNELS)
    }

    pub(crate) fn layout(&self, max_frames: usize) -> ChainLayout {
        ChainLayout {
            format: self.format,
            channel_mask: self.channel_mask,
            downmix_type: self.downmix_type,
            mixer_in_format: self.mixer_in_format,
            max_frames,
        }
    }

    /// Check that an attached source still fits after a mask or format change.
    pub(crate) fn check_source_fits(
        &self,
        channel_mask: ChannelMask,
        format: SampleFormat,
    ) -> Result<(), ConfigurationError> {
        let Some(chain) = &self.chain else {
            return Ok(());
        };
        let layout = ChainLayout {
            format,
            channel_mask,
            ..self.layout(0)
        };
        layout.check_source(chain.source())
    }

    /// Classify the track from its current settings.
    pub(crate) fn compute_needs(&self) -> Needs {
        let resample = self.resampler.is_some();
        let aux = self.aux_bus.is_some() && self.volume.sends_aux();
        let mute = !resample && !aux && self.volume.is_silent();
        Needs((self.mix_channel_count() - 1) as u32)
            .with(Needs::RESAMPLE, resample)
            .with(Needs::AUX, aux)
            .with(Needs::MUTE, mute)
            .with(Needs::RAMP, self.volume.is_ramping())
    }

    /// Rebuild the provider chain around the current source, if any.
    pub(crate) fn rebuild_chain(
        &mut self,
        max_frames: usize,
        downmix: Option<&dyn DownmixFactory>,
    ) -> Result<(), ConfigurationError> {
        let Some(chain) = self.chain.take() else {
            return Ok(());
        };
        let layout = self.layout(max_frames);
        match ProviderChain::build(chain.into_source(), &layout, downmix) {
            Ok(chain) => {
                self.chain = Some(chain);
                Ok(())
            }
            Err(err) => {
                warn!("dropping provider after failed reconfiguration: {}", err);
                Err(err)
            }
        }
    }

    /// Frames pulled from the provider chain but not yet mixed.
    pub(crate) fn unreleased_frames(&self) -> usize {
        self.resampler
            .as_ref()
            .map(Resampler::unreleased_frames)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{StandardDownmixFactory, VecProvider};

    fn layout(format: SampleFormat, mask: ChannelMask) -> ChainLayout {
        ChainLayout {
            format,
            channel_mask: mask,
            downmix_type: DownmixType::Fold,
            mixer_in_format: MixFormat::Float,
            max_frames: 16,
        }
    }

    #[test]
    fn float_stereo_needs_no_wrappers() {
        let source: BoxedProvider = Box::new(VecProvider::float(2, vec![0.0; 8]));
        let chain = ProviderChain::build(
            source,
            &layout(SampleFormat::Float, ChannelMask::STEREO),
            None,
        )
        .expect("chain");
        assert!(matches!(chain, ProviderChain::Source(_)));
    }

    #[test]
    fn pcm24_is_reformatted() {
        let source: BoxedProvider = Box::new(VecProvider::pcm24_packed(1, vec![0; 6]));
        let chain = ProviderChain::build(
            source,
            &layout(SampleFormat::Pcm24Packed, ChannelMask::MONO),
            None,
        )
        .expect("chain");
        assert!(matches!(chain, ProviderChain::Reformatted(_)));
    }

    #[test]
    fn multichannel_without_factory_is_rejected() {
        let source: BoxedProvider = Box::new(VecProvider::float(6, vec![0.0; 12]));
        let result = ProviderChain::build(
            source,
            &layout(SampleFormat::Float, ChannelMask::FIVE_POINT_ONE),
            None,
        );
        assert!(matches!(
            result,
            Err(ConfigurationError::DownmixUnavailable(_))
        ));
    }

    #[test]
    fn downmix_then_reformat_to_pcm16() {
        let factory = StandardDownmixFactory;
        let source: BoxedProvider = Box::new(VecProvider::pcm32(6, vec![0; 12]));
        let mut layout = layout(SampleFormat::Pcm32, ChannelMask::FIVE_POINT_ONE);
        layout.mixer_in_format = MixFormat::Pcm16;
        let mut chain = ProviderChain::build(source, &layout, Some(&factory)).expect("chain");
        assert!(matches!(chain, ProviderChain::DownmixedReformatted(_)));
        let buffer = chain.provider().get_next_buffer(4, None).expect("buffer");
        assert_eq!(buffer.frames, 2);
        assert_eq!(buffer.samples.format(), SampleFormat::Pcm16);
        assert_eq!(buffer.samples.len(), 4);
        assert_eq!(chain.provider().channel_count(), 2);
        assert_eq!(chain.provider().format(), SampleFormat::Pcm16);
        assert_eq!(chain.source().channel_count(), 6);
        assert_eq!(chain.source().format(), SampleFormat::Pcm32);
    }

    #[test]
    fn source_must_match_layout() {
        let source: BoxedProvider = Box::new(VecProvider::pcm16(2, vec![0; 8]));
        let result = ProviderChain::build(
            source,
            &layout(SampleFormat::Pcm16, ChannelMask::MONO),
            None,
        );
        assert_eq!(
            result.err(),
            Some(ConfigurationError::ProviderMismatch {
                channels: 2,
                format: SampleFormat::Pcm16,
                expected_channels: 1,
                expected_format: SampleFormat::Pcm16,
            })
        );
    }

    #[test]
    fn needs_track_mute_and_channels() {
        let config = MixerConfig::default();
        let mut track = Track::new(&config);
        track.channel_mask = ChannelMask::MONO;
        let needs = track.compute_needs();
        assert_eq!(needs.channel_count(), 1);
        assert!(!needs.contains(Needs::MUTE));

        track.volume.left.set(0.0);
        track.volume.right.set(0.0);
        assert!(track.compute_needs().contains(Needs::MUTE));

        track.resampler = Some(Resampler::new(
            config.resampler_quality,
            1,
            44_100,
            config.sample_rate,
            config.frame_count,
        ));
        let needs = track.compute_needs();
        assert!(needs.contains(Needs::RESAMPLE));
        assert!(!needs.contains(Needs::MUTE));
    }
}
