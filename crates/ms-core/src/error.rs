use thiserror::Error;

/// Broad classification of a [`SpectError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad parameter or contradictory flags. Raised before any computation.
    Configuration,
    /// The sample buffer itself cannot be processed (rank, channels, rate).
    Input,
}

/// Errors originating from the extraction engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpectError {
    /// Frequency bounds or point count cannot produce a scale.
    #[error("Plage de fréquences invalide : {count} points entre {min_freq} Hz et {max_freq} Hz")]
    InvalidRange {
        /// Requested number of points.
        count: usize,
        /// Lower bound in Hz.
        min_freq: f64,
        /// Upper bound in Hz.
        max_freq: f64,
    },

    /// Unknown frequency scale name.
    #[error("Échelle de fréquence non supportée : {0} (attendu : mel, log, linear)")]
    UnsupportedScale(String),

    /// Unknown filter shape name.
    #[error("Forme de filtre non supportée : {0} (attendu : tri, hann)")]
    UnsupportedShape(String),

    /// Unknown magnitude scaling mode.
    #[error("Mode d'échelle de magnitude non supporté : {0}")]
    UnsupportedMode(String),

    /// Unknown channel policy.
    #[error("Traitement des canaux non supporté : {0}")]
    UnsupportedChannelPolicy(String),

    /// Unknown timestamp layout.
    #[error("Mode d'horodatage non supporté : {0}")]
    UnsupportedTimesMode(String),

    /// Invalid configuration value.
    #[error("Configuration invalide ({param}) : {reason}")]
    Config {
        /// Name of the offending parameter.
        param: &'static str,
        /// Human readable reason.
        reason: String,
    },

    /// Sample buffer is neither 1-D nor channels × samples.
    #[error("Rang d'entrée non supporté : {0} dimensions (attendu 1 ou 2)")]
    UnsupportedRank(usize),

    /// Sample-domain downmix only covers mono and stereo.
    #[error("Nombre de canaux non supporté pour le mixage : {0} (mono ou stéréo)")]
    UnsupportedChannelCount(usize),

    /// Buffer length disagrees with the declared shape.
    #[error("Dimensions incohérentes : attendu {expected}, reçu {actual}")]
    ShapeMismatch {
        /// Expected element count.
        expected: usize,
        /// Actual element count.
        actual: usize,
    },

    /// Input sample rate differs from the configured one.
    #[error("Fréquence d'échantillonnage inattendue : {actual} Hz (attendu {expected} Hz)")]
    SampleRateMismatch {
        /// Configured sample rate.
        expected: u32,
        /// Sample rate found in the input.
        actual: u32,
    },
}

impl SpectError {
    /// Shorthand for [`SpectError::Config`].
    pub fn config(param: &'static str, reason: impl Into<String>) -> Self {
        Self::Config {
            param,
            reason: reason.into(),
        }
    }

    /// Classify the error as configuration or input failure.
    ///
    /// # Example
    /// ```
    /// use ms_core::error::{ErrorKind, SpectError};
    /// assert_eq!(SpectError::UnsupportedRank(3).kind(), ErrorKind::Input);
    /// assert_eq!(SpectError::UnsupportedScale("bark".into()).kind(), ErrorKind::Configuration);
    /// ```
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedRank(_)
            | Self::UnsupportedChannelCount(_)
            | Self::ShapeMismatch { .. }
            | Self::SampleRateMismatch { .. } => ErrorKind::Input,
            _ => ErrorKind::Configuration,
        }
    }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, SpectError>;
