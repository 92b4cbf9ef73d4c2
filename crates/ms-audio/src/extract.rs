//! Extraction entry point: one spectrogram per frame length.

use std::path::Path;
use std::sync::Arc;

use ms_core::config::{ChannelPolicy, ExtractionConfig, FreqScale};
use ms_core::error::Result;
use ms_core::samples::SampleBuffer;
use ms_core::spectrogram::Spectrogram;
use ms_core::timestamps::Timestamps;

use crate::cache::FilterBankCache;
use crate::channels::{self, ChannelMixer};
use crate::filterbank::{BandProjection, BinSlice, FilterBank, FilterBankParams};
use crate::magnitude::MagnitudeScaler;
use crate::stft::{Framer, FramerOptions};

/// How a filter bank is applied to each spectrum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProjectionStrategy {
    /// Per-filter weights over their support only.
    #[default]
    Compact,
    /// Full `(num_bins × bands)` matrix product.
    Dense,
}

/// One named output array.
#[derive(Clone, Debug, PartialEq)]
pub struct NamedSpectrogram {
    /// Output name, derived from the `featname` template.
    pub name: String,
    /// The spectrogram itself.
    pub spectrogram: Spectrogram,
}

/// Result of [`Extractor::extract`].
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractionOutput {
    /// Named spectrograms, in frame-length order (then channel order for `split`).
    pub spectrograms: Vec<NamedSpectrogram>,
    /// Frame time stamps, when requested.
    pub times: Option<Timestamps>,
}

/// Spectrogram extraction engine.
///
/// Validates its configuration once; every call then frames, transforms,
/// projects and scales the input for each configured frame length.
///
/// # Example
/// ```
/// use ms_audio::extract::Extractor;
/// use ms_core::config::ExtractionConfig;
/// use ms_core::samples::SampleBuffer;
///
/// let config = ExtractionConfig {
///     sample_rate: 16000,
///     frame_lengths: vec![400],
///     bands: 40,
///     min_freq: 20.0,
///     max_freq: 8000.0,
///     ..ExtractionConfig::default()
/// };
/// let extractor = Extractor::new(config).unwrap();
/// let spects = extractor
///     .compute_spectrograms(&SampleBuffer::mono(vec![0.0; 16000]), 16000)
///     .unwrap();
/// assert_eq!(spects[0].shape(), vec![100, 40]);
/// ```
pub struct Extractor {
    config: ExtractionConfig,
    cache: Option<Arc<FilterBankCache>>,
    strategy: ProjectionStrategy,
}

impl Extractor {
    /// Build an extractor for `config`.
    ///
    /// # Errors
    /// Any configuration error reported by [`ExtractionConfig::validate`].
    pub fn new(config: ExtractionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cache: None,
            strategy: ProjectionStrategy::default(),
        })
    }

    /// Reuse filter banks through a shared cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<FilterBankCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Select how filter banks are applied.
    #[must_use]
    pub fn with_strategy(mut self, strategy: ProjectionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    fn projection(&self, frame_len: usize, sample_rate: u32) -> Result<Arc<dyn BandProjection>> {
        let num_bins = frame_len / 2 + 1;
        let c = &self.config;
        if c.freq_scale == FreqScale::Linear {
            let slice: Arc<dyn BandProjection> =
                Arc::new(BinSlice::between(num_bins, sample_rate, c.min_freq, c.max_freq));
            return Ok(slice);
        }

        let params = FilterBankParams {
            num_bins,
            sample_rate,
            num_filters: c.bands,
            min_freq: c.min_freq,
            max_freq: c.max_freq,
            scale: c.freq_scale,
            shape: c.filter_shape,
            normalize: c.normalize_filters,
            preserve_energy: c.effective_preserve_energy(),
        };
        let projection: Arc<dyn BandProjection> = match (self.strategy, &self.cache) {
            (ProjectionStrategy::Compact, Some(cache)) => cache.get_or_build(params)?,
            (ProjectionStrategy::Compact, None) => Arc::new(FilterBank::build(params)?),
            (ProjectionStrategy::Dense, Some(cache)) => cache.get_or_build_dense(params)?,
            (ProjectionStrategy::Dense, None) => Arc::new(FilterBank::build(params)?.to_matrix()),
        };
        Ok(projection)
    }

    /// One spectrogram per configured frame length.
    ///
    /// Shapes are `(frames, bands)`, or `(frames, channels, bands)` under the
    /// `concat` and `split` policies.
    ///
    /// # Errors
    /// `UnsupportedChannelCount` when `mix-before` meets more than two
    /// channels, configuration errors for a `sample_rate` the frame rate
    /// cannot divide, and filter bank errors.
    pub fn compute_spectrograms(
        &self,
        samples: &SampleBuffer,
        sample_rate: u32,
    ) -> Result<Vec<Spectrogram>> {
        let c = &self.config;
        let hop = c.hop_size(sample_rate)?;
        let preserve = c.effective_preserve_energy();
        let mixer = ChannelMixer::new(c.channels, c.generalized_mix);
        let scaler = MagnitudeScaler::new(c.magnitude_scale());
        let prepared = mixer.prepare(samples.clone())?;

        c.frame_lengths
            .iter()
            .map(|&frame_len| {
                let projection = self.projection(frame_len, sample_rate)?;
                let framer = Framer::new(FramerOptions {
                    online: c.online,
                    keep_phases: c.keep_phases,
                    periodic_window: preserve,
                    normalize_fft: preserve,
                    ..FramerOptions::new(frame_len, hop)
                })?;
                let frames = framer.transform(&prepared, projection.as_ref())?;
                let mut frames = mixer.finish(frames);
                scaler.apply(&mut frames, &projection.band_frequencies())?;
                frames.into_spectrogram()
            })
            .collect()
    }

    /// Compute, name and (for `split`) separate the spectrograms, and attach
    /// time stamps if configured.
    ///
    /// # Errors
    /// Same as [`Extractor::compute_spectrograms`].
    pub fn extract(&self, samples: &SampleBuffer, sample_rate: u32) -> Result<ExtractionOutput> {
        let c = &self.config;
        let spects = self.compute_spectrograms(samples, sample_rate)?;

        let times = if c.include_times {
            let frames = spects.first().map_or(0, Spectrogram::frames);
            Some(Timestamps::generate(
                c.times_mode,
                frames,
                c.frame_rate,
                c.frame_lengths[0],
                sample_rate,
            )?)
        } else {
            None
        };

        let mut spectrograms = Vec::with_capacity(spects.len());
        for (&frame_len, spect) in c.frame_lengths.iter().zip(spects) {
            let name = c.feature_name(frame_len);
            if c.channels == ChannelPolicy::Split {
                spectrograms.extend(
                    channels::split(&name, spect)
                        .into_iter()
                        .map(|(name, spectrogram)| NamedSpectrogram { name, spectrogram }),
                );
            } else {
                spectrograms.push(NamedSpectrogram {
                    name,
                    spectrogram: spect,
                });
            }
        }

        log::info!(
            "Extraction : {} spectrogramme(s), {} échantillon(s) × {} canal(aux) @ {} Hz, échelle {} / {}",
            spectrograms.len(),
            samples.num_samples(),
            samples.num_channels(),
            sample_rate,
            c.freq_scale,
            c.mag_scale
        );

        Ok(ExtractionOutput {
            spectrograms,
            times,
        })
    }

    /// Read `path` with [`crate::decode::read_samples`] at the configured
    /// sample rate and extract.
    ///
    /// # Errors
    /// Decoding errors, a sample rate mismatch, or any extraction error.
    pub fn extract_file(&self, path: &Path) -> anyhow::Result<ExtractionOutput> {
        let samples = crate::decode::read_samples(path, self.config.sample_rate)?;
        Ok(self.extract(&samples, self.config.sample_rate)?)
    }
}
