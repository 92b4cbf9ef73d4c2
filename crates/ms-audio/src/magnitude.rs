//! Magnitude scaling of projected spectra, including the phon/sone loudness
//! model.
//!
//! Scaling only ever touches magnitudes; retained phases pass through.

use ms_core::config::MagnitudeScale;
use ms_core::error::{Result, SpectError};

use crate::stft::SpectralFrames;

/// Floor applied before the logarithm when the shift is zero.
pub const LOG_EPSILON: f64 = 2.220_446_049_250_313e-16;

/// Added to linear magnitudes before conversion to dB.
pub const DB_BIAS: f64 = 1e-8;

/// Sone exponent below 40 phon.
const SONE_EXPONENT: f64 = 2.642;

/// In-place `log(shift + stretch * x)`.
///
/// A zero shift floors `stretch * x` at [`LOG_EPSILON`]; a shift of one uses
/// `ln_1p` for accuracy near zero.
///
/// # Example
/// ```
/// use ms_audio::magnitude::{logarithmize, LOG_EPSILON};
/// let mut v = [0.0, 1.0];
/// logarithmize(&mut v, 1.0, 0.0);
/// assert_eq!(v, [LOG_EPSILON.ln(), 0.0]);
/// ```
pub fn logarithmize(values: &mut [f64], stretch: f64, shift: f64) {
    if stretch != 1.0 {
        values.iter_mut().for_each(|v| *v *= stretch);
    }
    if shift == 0.0 {
        values.iter_mut().for_each(|v| *v = v.max(LOG_EPSILON).ln());
    } else if shift == 1.0 {
        values.iter_mut().for_each(|v| *v = v.ln_1p());
    } else {
        values.iter_mut().for_each(|v| *v = (*v + shift).ln());
    }
}

/// Terhardt outer-ear transfer function in dB at `freq` Hz.
///
/// # Example
/// ```
/// use ms_audio::magnitude::terhardt_db;
/// // the ear is most sensitive around 3.3 kHz
/// assert!(terhardt_db(3300.0) > terhardt_db(1000.0));
/// assert!(terhardt_db(3300.0) > terhardt_db(10000.0));
/// ```
#[must_use]
pub fn terhardt_db(freq: f64) -> f64 {
    let fk = freq / 1000.0;
    -3.64 * fk.powf(-0.8) + 6.5 * (-0.6 * (fk - 3.3).powi(2)).exp() - 1e-3 * fk.powi(4)
}

/// Loudness level in phon from linear magnitudes.
///
/// Applies `20·log10(x + bias)`, adds the per-band Terhardt correction
/// relative to 1 kHz plus the full scale level, then clips at 0 (below the
/// hearing threshold).
///
/// # Example
/// ```
/// use ms_audio::magnitude::Phonify;
/// let phonify = Phonify::new(&[1000.0], 96.0);
/// let mut v = [1.0, 0.0];
/// phonify.apply(&mut v);
/// assert!((v[0] - 96.0).abs() < 1e-6);
/// assert_eq!(v[1], 0.0);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Phonify {
    corrections: Vec<f64>,
    bias: f64,
    clip: bool,
}

impl Phonify {
    /// Corrections for bands centred at `band_freqs`, full scale at `db_max` dB SPL.
    #[must_use]
    pub fn new(band_freqs: &[f64], db_max: f64) -> Self {
        let reference = terhardt_db(1000.0);
        Self {
            corrections: band_freqs
                .iter()
                .map(|&f| terhardt_db(f) - reference + db_max)
                .collect(),
            bias: DB_BIAS,
            clip: true,
        }
    }

    /// Disable clipping at the hearing threshold.
    #[must_use]
    pub fn without_clip(mut self) -> Self {
        self.clip = false;
        self
    }

    /// Per-band dB offsets.
    #[must_use]
    pub fn corrections(&self) -> &[f64] {
        &self.corrections
    }

    /// Convert rows of `corrections().len()` magnitudes in place.
    pub fn apply(&self, values: &mut [f64]) {
        if self.corrections.is_empty() {
            return;
        }
        for row in values.chunks_mut(self.corrections.len()) {
            for (v, &corr) in row.iter_mut().zip(&self.corrections) {
                let level = 20.0 * (*v + self.bias).log10() + corr;
                *v = if self.clip { level.max(0.0) } else { level };
            }
        }
    }
}

/// Phon to sone: `2^((phon - 40) / 10)` from 40 phon up, `(phon / 40)^2.642` below.
///
/// # Example
/// ```
/// use ms_audio::magnitude::sone_from_phon;
/// assert!((sone_from_phon(40.0) - 1.0).abs() < 1e-12);
/// assert!((sone_from_phon(50.0) - 2.0).abs() < 1e-12);
/// ```
#[must_use]
pub fn sone_from_phon(phon: f64) -> f64 {
    if phon >= 40.0 {
        2f64.powf((phon - 40.0) / 10.0)
    } else {
        (phon / 40.0).powf(SONE_EXPONENT)
    }
}

/// In-place phon to sone conversion.
pub fn sonify(values: &mut [f64]) {
    values.iter_mut().for_each(|v| *v = sone_from_phon(*v));
}

/// Applies one [`MagnitudeScale`] to projected spectra.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MagnitudeScaler {
    scale: MagnitudeScale,
}

impl MagnitudeScaler {
    /// Scaler for `scale`.
    #[must_use]
    pub fn new(scale: MagnitudeScale) -> Self {
        Self { scale }
    }

    /// Configured mode.
    #[must_use]
    pub fn scale(&self) -> MagnitudeScale {
        self.scale
    }

    /// Scale the magnitudes of `frames` in place.
    ///
    /// `band_freqs` gives the center frequency of every band and is only
    /// read by phon and sone.
    ///
    /// # Errors
    /// `ShapeMismatch` if phon/sone get a frequency list whose length differs
    /// from the number of bands.
    pub fn apply(&self, frames: &mut SpectralFrames, band_freqs: &[f64]) -> Result<()> {
        self.apply_values(frames.magnitudes_mut(), band_freqs)
    }

    /// Same as [`MagnitudeScaler::apply`] on a raw row-major buffer whose
    /// last axis holds the bands.
    ///
    /// # Errors
    /// `ShapeMismatch` as in [`MagnitudeScaler::apply`].
    pub fn apply_values(&self, values: &mut [f64], band_freqs: &[f64]) -> Result<()> {
        match self.scale {
            MagnitudeScale::Linear => {}
            MagnitudeScale::Power => values.iter_mut().for_each(|v| *v *= *v),
            MagnitudeScale::Log { stretch, shift } => logarithmize(values, stretch, shift),
            MagnitudeScale::Phon { db_max } | MagnitudeScale::Sone { db_max } => {
                let bands = band_freqs.len();
                if bands == 0 || values.len() % bands != 0 {
                    return Err(SpectError::ShapeMismatch {
                        expected: bands,
                        actual: values.len(),
                    });
                }
                Phonify::new(band_freqs, db_max).apply(values);
                if matches!(self.scale, MagnitudeScale::Sone { .. }) {
                    sonify(values);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_shift_zero_is_floored() {
        let mut v = vec![0.0; 16];
        logarithmize(&mut v, 1.0, 0.0);
        let floor = LOG_EPSILON.ln();
        assert!(v.iter().all(|x| x.is_finite() && (*x - floor).abs() < 1e-12));
        assert!((floor + 36.043_653_389_117_15).abs() < 1e-9);
    }

    #[test]
    fn log_shift_one_uses_log1p() {
        let mut v = [1e-20, 1.0];
        logarithmize(&mut v, 1.0, 1.0);
        assert!((v[0] - 1e-20).abs() < 1e-30);
        assert!((v[1] - 2f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn log_general_shift_and_stretch() {
        let mut v = [2.0];
        logarithmize(&mut v, 10.0, 0.5);
        assert!((v[0] - 20.5f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn sone_is_continuous_and_monotonic() {
        assert!((sone_from_phon(40.0) - 1.0).abs() < 1e-6);
        assert!((sone_from_phon(40.0 - 1e-9) - 1.0).abs() < 1e-6);
        assert_eq!(sone_from_phon(0.0), 0.0);
        let mut prev = sone_from_phon(0.0);
        for i in 1..=1200 {
            let s = sone_from_phon(f64::from(i) * 0.1);
            assert!(s > prev, "not increasing at {} phon", f64::from(i) * 0.1);
            prev = s;
        }
    }

    #[test]
    fn terhardt_reference_is_zero_at_1khz() {
        let phonify = Phonify::new(&[1000.0, 4000.0, 100.0], 96.0);
        let corr = phonify.corrections();
        assert!((corr[0] - 96.0).abs() < 1e-12);
        assert!(corr[1] > 96.0);
        assert!(corr[2] < 96.0);
    }

    #[test]
    fn phon_clips_silence_to_zero() {
        let scaler = MagnitudeScaler::new(MagnitudeScale::Phon { db_max: 96.0 });
        let mut v = vec![0.0; 6];
        scaler.apply_values(&mut v, &[100.0, 1000.0, 5000.0]).unwrap();
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn phon_without_clip_goes_negative() {
        let phonify = Phonify::new(&[1000.0], 96.0).without_clip();
        let mut v = [0.0];
        phonify.apply(&mut v);
        assert!((v[0] - (-160.0 + 96.0)).abs() < 1e-9);
    }

    #[test]
    fn sone_of_full_scale_1khz() {
        let scaler = MagnitudeScaler::new(MagnitudeScale::Sone { db_max: 60.0 });
        let mut v = [1.0];
        scaler.apply_values(&mut v, &[1000.0]).unwrap();
        assert!((v[0] - 4.0).abs() < 1e-6);
    }

    #[test]
    fn phon_needs_matching_band_frequencies() {
        let scaler = MagnitudeScaler::new(MagnitudeScale::Phon { db_max: 96.0 });
        let mut v = vec![0.5; 5];
        assert!(matches!(
            scaler.apply_values(&mut v, &[100.0, 200.0]),
            Err(SpectError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn power_and_linear() {
        let mut v = [0.5, 3.0];
        MagnitudeScaler::new(MagnitudeScale::Power)
            .apply_values(&mut v, &[])
            .unwrap();
        assert_eq!(v, [0.25, 9.0]);
        MagnitudeScaler::new(MagnitudeScale::Linear)
            .apply_values(&mut v, &[])
            .unwrap();
        assert_eq!(v, [0.25, 9.0]);
    }
}
