use num_complex::Complex32;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpectError};

/// Element storage of a [`Spectrogram`].
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub enum SpectrogramData {
    /// Scaled magnitudes.
    Real(Vec<f32>),
    /// Scaled magnitudes recombined with the retained phases.
    Complex(Vec<Complex32>),
}

impl SpectrogramData {
    fn len(&self) -> usize {
        match self {
            Self::Real(v) => v.len(),
            Self::Complex(v) => v.len(),
        }
    }
}

/// Feature matrix of shape `(frames, bands)` or `(frames, channels, bands)`,
/// stored row-major.
///
/// # Example
/// ```
/// use ms_core::spectrogram::Spectrogram;
/// let spect = Spectrogram::real(2, None, 3, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
/// assert_eq!(spect.shape(), vec![2, 3]);
/// assert_eq!(spect.real_row(1, 0), Some(&[3.0, 4.0, 5.0][..]));
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Spectrogram {
    frames: usize,
    channels: Option<usize>,
    bands: usize,
    data: SpectrogramData,
}

impl Spectrogram {
    /// Real-valued spectrogram.
    ///
    /// # Errors
    /// `ShapeMismatch` if `data` does not hold `frames * channels * bands` values.
    pub fn real(frames: usize, channels: Option<usize>, bands: usize, data: Vec<f32>) -> Result<Self> {
        Self::new(frames, channels, bands, SpectrogramData::Real(data))
    }

    /// Complex-valued spectrogram.
    ///
    /// # Errors
    /// `ShapeMismatch` if `data` does not hold `frames * channels * bands` values.
    pub fn complex(
        frames: usize,
        channels: Option<usize>,
        bands: usize,
        data: Vec<Complex32>,
    ) -> Result<Self> {
        Self::new(frames, channels, bands, SpectrogramData::Complex(data))
    }

    fn new(
        frames: usize,
        channels: Option<usize>,
        bands: usize,
        data: SpectrogramData,
    ) -> Result<Self> {
        let expected = frames * channels.unwrap_or(1) * bands;
        if data.len() != expected {
            return Err(SpectError::ShapeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            frames,
            channels,
            bands,
            data,
        })
    }

    /// Shape as a list of axis lengths.
    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        match self.channels {
            Some(c) => vec![self.frames, c, self.bands],
            None => vec![self.frames, self.bands],
        }
    }

    /// Number of frames.
    #[must_use]
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Length of the channel axis, if present.
    #[must_use]
    pub fn channels(&self) -> Option<usize> {
        self.channels
    }

    /// Number of bands (filters or bins).
    #[must_use]
    pub fn bands(&self) -> usize {
        self.bands
    }

    /// `true` when phases were retained.
    #[must_use]
    pub fn is_complex(&self) -> bool {
        matches!(self.data, SpectrogramData::Complex(_))
    }

    /// Raw element storage.
    #[must_use]
    pub fn data(&self) -> &SpectrogramData {
        &self.data
    }

    /// Real values, `None` for complex spectrograms.
    #[must_use]
    pub fn as_real(&self) -> Option<&[f32]> {
        match &self.data {
            SpectrogramData::Real(v) => Some(v),
            SpectrogramData::Complex(_) => None,
        }
    }

    /// Complex values, `None` for real spectrograms.
    #[must_use]
    pub fn as_complex(&self) -> Option<&[Complex32]> {
        match &self.data {
            SpectrogramData::Complex(v) => Some(v),
            SpectrogramData::Real(_) => None,
        }
    }

    fn row_offset(&self, frame: usize, channel: usize) -> Option<usize> {
        let channels = self.channels.unwrap_or(1);
        (frame < self.frames && channel < channels)
            .then(|| (frame * channels + channel) * self.bands)
    }

    /// Bands of one (frame, channel) row of a real spectrogram.
    /// Use channel 0 for 2-D spectrograms.
    #[must_use]
    pub fn real_row(&self, frame: usize, channel: usize) -> Option<&[f32]> {
        let start = self.row_offset(frame, channel)?;
        self.as_real().map(|v| &v[start..start + self.bands])
    }

    /// Bands of one (frame, channel) row of a complex spectrogram.
    #[must_use]
    pub fn complex_row(&self, frame: usize, channel: usize) -> Option<&[Complex32]> {
        let start = self.row_offset(frame, channel)?;
        self.as_complex().map(|v| &v[start..start + self.bands])
    }

    /// 2-D `(frames, bands)` copy of one channel of a 3-D spectrogram.
    ///
    /// Returns `None` for 2-D spectrograms or an out-of-range channel.
    ///
    /// # Example
    /// ```
    /// use ms_core::spectrogram::Spectrogram;
    /// let spect = Spectrogram::real(1, Some(2), 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    /// let right = spect.select_channel(1).unwrap();
    /// assert_eq!(right.shape(), vec![1, 2]);
    /// assert_eq!(right.as_real(), Some(&[3.0, 4.0][..]));
    /// ```
    #[must_use]
    pub fn select_channel(&self, channel: usize) -> Option<Self> {
        let channels = self.channels?;
        if channel >= channels {
            return None;
        }
        let rows = (0..self.frames).map(|f| (f * channels + channel) * self.bands);
        let data = match &self.data {
            SpectrogramData::Real(v) => SpectrogramData::Real(
                rows.flat_map(|s| v[s..s + self.bands].iter().copied())
                    .collect(),
            ),
            SpectrogramData::Complex(v) => SpectrogramData::Complex(
                rows.flat_map(|s| v[s..s + self.bands].iter().copied())
                    .collect(),
            ),
        };
        Some(Self {
            frames: self.frames,
            channels: None,
            bands: self.bands,
            data,
        })
    }
}
