use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::SpectError;

/// Placeholder substituted by the frame length in [`ExtractionConfig::featname`].
pub const LENGTH_PLACEHOLDER: &str = "%(len)s";

/// Full description of one extraction run.
///
/// Serializable in TOML. Every field has a sane default.
///
/// # Example
/// ```
/// use ms_core::config::ExtractionConfig;
/// let config = ExtractionConfig::default();
/// assert_eq!(config.bands, 80);
/// assert_eq!(config.frame_lengths, vec![2048]);
/// ```
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ExtractionConfig {
    // === Input ===
    /// Expected sample rate of the input in Hz.
    pub sample_rate: u32,
    /// What to do with multi-channel input.
    pub channels: ChannelPolicy,
    /// Allow sample-domain downmix of more than two channels by averaging.
    pub generalized_mix: bool,

    // === Framing ===
    /// Output frames per second. The hop size is `floor(sample_rate / frame_rate)`.
    pub frame_rate: f64,
    /// One spectrogram is produced per frame length (in samples).
    pub frame_lengths: Vec<usize>,
    /// Causal framing: each window ends at its reference sample.
    pub online: bool,
    /// Retain phases (complex output).
    pub keep_phases: bool,

    // === Filter bank ===
    /// "mel" | "log" | "linear"
    pub freq_scale: FreqScale,
    /// Number of filters. Ignored for the linear scale.
    pub bands: usize,
    /// Lower edge of the lowest filter in Hz.
    pub min_freq: f64,
    /// Upper edge of the highest filter in Hz.
    pub max_freq: f64,
    /// Filter shape.
    pub filter_shape: FilterShape,
    /// Scale every filter to unit area.
    pub normalize_filters: bool,
    /// Keep the per-bin energy independent of the frame length.
    pub preserve_energy: bool,

    // === Magnitudes ===
    /// "linear" | "power" | "log" | "phon" | "sone"
    pub mag_scale: MagScaleKind,
    /// Stretch in `log(shift + stretch * magnitude)`.
    pub log_stretch: f64,
    /// Shift in `log(shift + stretch * magnitude)`.
    pub log_shift: f64,
    /// Full scale dB SPL equivalent for phon and sone.
    pub db_max: f64,

    // === Output ===
    /// Template for output names, `%(len)s` is replaced by the frame length.
    pub featname: String,
    /// Emit a `times` vector alongside the spectrograms.
    pub include_times: bool,
    /// Layout of the `times` vector.
    pub times_mode: TimesMode,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: ChannelPolicy::MixBefore,
            generalized_mix: false,
            frame_rate: 100.0,
            frame_lengths: vec![2048],
            online: false,
            keep_phases: false,
            freq_scale: FreqScale::Mel,
            bands: 80,
            min_freq: 27.5,
            max_freq: 16000.0,
            filter_shape: FilterShape::Tri,
            normalize_filters: true,
            preserve_energy: false,
            mag_scale: MagScaleKind::Log,
            log_stretch: 1.0,
            log_shift: 0.0,
            db_max: 96.0,
            featname: format!("melspect{LENGTH_PLACEHOLDER}"),
            include_times: false,
            times_mode: TimesMode::Borders,
        }
    }
}

impl ExtractionConfig {
    /// Check every parameter before any computation starts.
    ///
    /// # Errors
    /// Returns a configuration error naming the offending parameter.
    ///
    /// # Example
    /// ```
    /// use ms_core::config::ExtractionConfig;
    /// let mut config = ExtractionConfig::default();
    /// assert!(config.validate().is_ok());
    /// config.frame_lengths.clear();
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), SpectError> {
        if self.sample_rate == 0 {
            return Err(SpectError::config("sample_rate", "doit être > 0"));
        }
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(SpectError::config(
                "frame_rate",
                format!("doit être fini et > 0, reçu {}", self.frame_rate),
            ));
        }
        if self.frame_lengths.is_empty() {
            return Err(SpectError::config("frame_lengths", "liste vide"));
        }
        if let Some(&bad) = self.frame_lengths.iter().find(|&&len| len < 2) {
            return Err(SpectError::config(
                "frame_lengths",
                format!("longueur de trame {bad} < 2"),
            ));
        }
        if self.freq_scale != FreqScale::Linear && self.bands == 0 {
            return Err(SpectError::config("bands", "doit être > 0"));
        }
        // L'échelle log exige une borne basse strictement positive.
        let min_ok = if self.freq_scale == FreqScale::Log {
            self.min_freq > 0.0
        } else {
            self.min_freq >= 0.0
        };
        let valid_range = min_ok && self.min_freq < self.max_freq && self.max_freq.is_finite();
        if !valid_range {
            return Err(SpectError::InvalidRange {
                count: self.bands + 2,
                min_freq: self.min_freq,
                max_freq: self.max_freq,
            });
        }
        if !self.log_stretch.is_finite() || !self.log_shift.is_finite() {
            return Err(SpectError::config("log_stretch", "valeurs non finies"));
        }
        if !self.db_max.is_finite() {
            return Err(SpectError::config("db_max", "valeur non finie"));
        }
        if self.featname.is_empty() {
            return Err(SpectError::config("featname", "nom vide"));
        }
        if self.frame_lengths.len() > 1 && !self.featname.contains(LENGTH_PLACEHOLDER) {
            return Err(SpectError::config(
                "featname",
                format!("plusieurs longueurs de trame mais pas de {LENGTH_PLACEHOLDER}"),
            ));
        }
        self.hop_size(self.sample_rate).map(|_| ())
    }

    /// Hop size in samples for a given sample rate, truncated to an integer.
    ///
    /// # Errors
    /// Fails if the frame rate exceeds the sample rate (hop of zero samples).
    ///
    /// # Example
    /// ```
    /// use ms_core::config::ExtractionConfig;
    /// let config = ExtractionConfig { frame_rate: 70.0, ..ExtractionConfig::default() };
    /// assert_eq!(config.hop_size(22050).unwrap(), 315);
    /// ```
    pub fn hop_size(&self, sample_rate: u32) -> Result<usize, SpectError> {
        let hop = (f64::from(sample_rate) / self.frame_rate) as usize;
        if hop == 0 {
            return Err(SpectError::config(
                "frame_rate",
                format!("{} fps dépasse {sample_rate} Hz", self.frame_rate),
            ));
        }
        Ok(hop)
    }

    /// phon and sone always imply energy preservation.
    #[must_use]
    pub fn effective_preserve_energy(&self) -> bool {
        self.preserve_energy || matches!(self.mag_scale, MagScaleKind::Phon | MagScaleKind::Sone)
    }

    /// Assemble the magnitude scaling mode with its parameters.
    ///
    /// # Example
    /// ```
    /// use ms_core::config::{ExtractionConfig, MagScaleKind, MagnitudeScale};
    /// let config = ExtractionConfig { mag_scale: MagScaleKind::Sone, db_max: 90.0, ..ExtractionConfig::default() };
    /// assert_eq!(config.magnitude_scale(), MagnitudeScale::Sone { db_max: 90.0 });
    /// ```
    #[must_use]
    pub fn magnitude_scale(&self) -> MagnitudeScale {
        match self.mag_scale {
            MagScaleKind::Linear => MagnitudeScale::Linear,
            MagScaleKind::Power => MagnitudeScale::Power,
            MagScaleKind::Log => MagnitudeScale::Log {
                stretch: self.log_stretch,
                shift: self.log_shift,
            },
            MagScaleKind::Phon => MagnitudeScale::Phon {
                db_max: self.db_max,
            },
            MagScaleKind::Sone => MagnitudeScale::Sone {
                db_max: self.db_max,
            },
        }
    }

    /// Output name for a frame length.
    ///
    /// # Example
    /// ```
    /// use ms_core::config::ExtractionConfig;
    /// assert_eq!(ExtractionConfig::default().feature_name(1024), "melspect1024");
    /// ```
    #[must_use]
    pub fn feature_name(&self, frame_len: usize) -> String {
        self.featname
            .replace(LENGTH_PLACEHOLDER, &frame_len.to_string())
    }
}

/// Declares a string-named configuration enum with `FromStr`/`Display`.
macro_rules! named_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $err:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
        #[serde(rename_all = "kebab-case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Command-line / TOML name.
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $label ),+
                }
            }
        }

        impl FromStr for $name {
            type Err = SpectError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $label => Ok(Self::$variant), )+
                    other => Err(SpectError::$err(other.to_string())),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

named_enum! {
    /// Frequency axis of the output bands.
    FreqScale, UnsupportedScale {
        /// Mel-spaced triangular filters.
        Mel => "mel",
        /// Logarithmically spaced filters.
        Log => "log",
        /// Raw FFT bins between min and max frequency, no filter bank.
        Linear => "linear",
    }
}

named_enum! {
    /// Shape of a single band filter.
    FilterShape, UnsupportedShape {
        /// Asymmetric triangle between the neighbouring anchors.
        Tri => "tri",
        /// Symmetric raised cosine over the same bins.
        Hann => "hann",
    }
}

named_enum! {
    /// Name of the magnitude scaling mode (parameters live in [`ExtractionConfig`]).
    MagScaleKind, UnsupportedMode {
        /// Identity.
        Linear => "linear",
        /// Squared magnitude.
        Power => "power",
        /// `log(shift + stretch * magnitude)`.
        Log => "log",
        /// Loudness level in phon.
        Phon => "phon",
        /// Loudness in sone.
        Sone => "sone",
    }
}

named_enum! {
    /// Multi-channel treatment.
    ChannelPolicy, UnsupportedChannelPolicy {
        /// Downmix the signal before computing spectra.
        MixBefore => "mix-before",
        /// Compute spectra per channel, average them before magnitude scaling.
        MixAfter => "mix-after",
        /// Compute spectra per channel, keep a channel axis.
        Concat => "concat",
        /// Like concat, emitted as one output per channel (`name.0`, `name.1`, ...).
        Split => "split",
    }
}

named_enum! {
    /// Layout of the optional timestamp vector.
    TimesMode, UnsupportedTimesMode {
        /// Start time of every frame.
        Beginnings => "beginnings",
        /// Start time shifted by half a frame period.
        Centers => "centers",
        /// N + 1 boundaries between consecutive frames.
        Borders => "borders",
        /// (left, right) pair per frame spanning the first frame length.
        Borders2 => "borders2",
    }
}

/// Magnitude scaling mode with its parameters.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub enum MagnitudeScale {
    /// Identity.
    Linear,
    /// Element-wise square.
    Power,
    /// `log(shift + stretch * magnitude)`.
    Log {
        /// Multiplier applied before the shift.
        stretch: f64,
        /// Additive offset inside the logarithm.
        shift: f64,
    },
    /// Terhardt-corrected dB SPL, clipped at 0.
    Phon {
        /// dB SPL of a full scale sinusoid.
        db_max: f64,
    },
    /// Phon converted to sone.
    Sone {
        /// dB SPL of a full scale sinusoid.
        db_max: f64,
    },
}

/// Structure TOML intermédiaire pour désérialisation avec valeurs optionnelles.
#[derive(Deserialize)]
struct ConfigFile {
    extraction: ExtractionSection,
}

/// Extraction section of the TOML config, all fields optional for partial override.
#[derive(Deserialize)]
struct ExtractionSection {
    sample_rate: Option<u32>,
    channels: Option<ChannelPolicy>,
    generalized_mix: Option<bool>,
    frame_rate: Option<f64>,
    frame_lengths: Option<Vec<usize>>,
    online: Option<bool>,
    keep_phases: Option<bool>,
    freq_scale: Option<FreqScale>,
    bands: Option<usize>,
    min_freq: Option<f64>,
    max_freq: Option<f64>,
    filter_shape: Option<FilterShape>,
    normalize_filters: Option<bool>,
    preserve_energy: Option<bool>,
    mag_scale: Option<MagScaleKind>,
    log_stretch: Option<f64>,
    log_shift: Option<f64>,
    db_max: Option<f64>,
    featname: Option<String>,
    include_times: Option<bool>,
    times_mode: Option<TimesMode>,
}

/// Charge un fichier TOML et fusionne avec les valeurs par défaut.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
///
/// # Example
/// ```no_run
/// use ms_core::config::load_config;
/// use std::path::Path;
/// let config = load_config(Path::new("config/default.toml")).unwrap();
/// ```
pub fn load_config(path: &Path) -> Result<ExtractionConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Impossible de lire {}", path.display()))?;

    let file: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Erreur de parsing TOML dans {}", path.display()))?;

    let mut config = ExtractionConfig::default();

    let e = file.extraction;
    macro_rules! merge {
        ($($field:ident),+ $(,)?) => {
            $(
                if let Some(v) = e.$field {
                    config.$field = v;
                }
            )+
        };
    }
    merge!(
        sample_rate,
        channels,
        generalized_mix,
        frame_rate,
        frame_lengths,
        online,
        keep_phases,
        freq_scale,
        bands,
        min_freq,
        max_freq,
        filter_shape,
        normalize_filters,
        preserve_energy,
        mag_scale,
        log_stretch,
        log_shift,
        db_max,
        featname,
        include_times,
        times_mode,
    );

    log::debug!("Configuration chargée depuis {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn names_round_trip_through_from_str() {
        for policy in [
            ChannelPolicy::MixBefore,
            ChannelPolicy::MixAfter,
            ChannelPolicy::Concat,
            ChannelPolicy::Split,
        ] {
            assert_eq!(policy.as_str().parse::<ChannelPolicy>(), Ok(policy));
        }
        assert_eq!("hann".parse::<FilterShape>(), Ok(FilterShape::Hann));
    }

    #[test]
    fn unknown_names_report_the_value() {
        assert_eq!(
            "bark".parse::<FreqScale>(),
            Err(SpectError::UnsupportedScale("bark".into()))
        );
        assert_eq!(
            "gauss".parse::<FilterShape>(),
            Err(SpectError::UnsupportedShape("gauss".into()))
        );
        assert_eq!(
            "cubic".parse::<MagScaleKind>(),
            Err(SpectError::UnsupportedMode("cubic".into()))
        );
        assert!(matches!(
            "mix".parse::<ChannelPolicy>(),
            Err(SpectError::UnsupportedChannelPolicy(_))
        ));
    }

    #[test]
    fn phon_and_sone_force_energy_preservation() {
        let mut config = ExtractionConfig::default();
        assert!(!config.effective_preserve_energy());
        config.mag_scale = MagScaleKind::Phon;
        assert!(config.effective_preserve_energy());
        config.mag_scale = MagScaleKind::Sone;
        assert!(config.effective_preserve_energy());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let base = ExtractionConfig::default();

        let config = ExtractionConfig {
            min_freq: 8000.0,
            max_freq: 100.0,
            ..base.clone()
        };
        assert!(matches!(
            config.validate(),
            Err(SpectError::InvalidRange { .. })
        ));

        let config = ExtractionConfig {
            freq_scale: FreqScale::Log,
            min_freq: 0.0,
            ..base.clone()
        };
        assert!(matches!(
            config.validate(),
            Err(SpectError::InvalidRange { .. })
        ));
        let config = ExtractionConfig {
            freq_scale: FreqScale::Mel,
            min_freq: 0.0,
            ..base.clone()
        };
        assert!(config.validate().is_ok());

        let config = ExtractionConfig {
            frame_rate: 0.0,
            ..base.clone()
        };
        assert!(matches!(
            config.validate(),
            Err(SpectError::Config {
                param: "frame_rate",
                ..
            })
        ));

        let config = ExtractionConfig {
            frame_rate: 50_000.0,
            ..base.clone()
        };
        assert!(config.validate().is_err());

        let config = ExtractionConfig {
            frame_lengths: vec![1024, 2048],
            featname: "spect".into(),
            ..base.clone()
        };
        assert!(matches!(
            config.validate(),
            Err(SpectError::Config {
                param: "featname",
                ..
            })
        ));

        let config = ExtractionConfig {
            freq_scale: FreqScale::Linear,
            bands: 0,
            ..base
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn hop_size_truncates() {
        let config = ExtractionConfig::default();
        assert_eq!(config.hop_size(44100).ok(), Some(441));
        assert_eq!(config.hop_size(16000).ok(), Some(160));
        let config = ExtractionConfig {
            frame_rate: 30.0,
            ..config
        };
        assert_eq!(config.hop_size(44100).ok(), Some(1470));
    }

    #[test]
    fn load_config_merges_partial_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[extraction]\nsample_rate = 22050\nfreq_scale = \"log\"\nchannels = \"mix-after\"\nframe_lengths = [1024, 4096]\ntimes_mode = \"centers\""
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.sample_rate, 22050);
        assert_eq!(config.freq_scale, FreqScale::Log);
        assert_eq!(config.channels, ChannelPolicy::MixAfter);
        assert_eq!(config.frame_lengths, vec![1024, 4096]);
        assert_eq!(config.times_mode, TimesMode::Centers);
        // untouched fields keep their defaults
        assert_eq!(config.bands, 80);
        assert!((config.db_max - 96.0).abs() < f64::EPSILON);
    }

    #[test]
    fn load_config_rejects_unknown_scale() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[extraction]\nfreq_scale = \"bark\"").unwrap();
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn shipped_default_file_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/default.toml");
        assert_eq!(load_config(&path).unwrap(), ExtractionConfig::default());
    }
}
