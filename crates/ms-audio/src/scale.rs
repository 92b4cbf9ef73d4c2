//! Frequency anchor generation for filter banks.
//!
//! Both laws return exactly `count` frequencies, the first equal to `min_freq`
//! and the last equal to `max_freq`.

use ms_core::config::FreqScale;
use ms_core::error::{Result, SpectError};

/// Hz to mel, natural-log form (`1127 * ln(1 + f / 700)`).
#[inline]
#[must_use]
pub fn hz_to_mel(hz: f64) -> f64 {
    1127.0 * (hz / 700.0).ln_1p()
}

/// Mel to Hz, inverse of [`hz_to_mel`].
#[inline]
#[must_use]
pub fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (mel / 1127.0).exp_m1()
}

fn check_range(count: usize, min_freq: f64, max_freq: f64) -> Result<()> {
    let valid = count >= 2 && min_freq.is_finite() && max_freq.is_finite() && min_freq < max_freq;
    if valid {
        Ok(())
    } else {
        Err(SpectError::InvalidRange {
            count,
            min_freq,
            max_freq,
        })
    }
}

/// Interpolates `count` points linearly between `lo` and `hi` in a warped
/// domain and maps them back with `unwarp`. The end points are pinned to the
/// exact bounds so they survive the round trip.
fn spaced(
    count: usize,
    (min_freq, max_freq): (f64, f64),
    (lo, hi): (f64, f64),
    unwarp: impl Fn(f64) -> f64,
) -> Vec<f64> {
    let spacing = (hi - lo) / (count - 1) as f64;
    let mut freqs: Vec<f64> = (0..count).map(|i| unwarp(lo + i as f64 * spacing)).collect();
    freqs[0] = min_freq;
    freqs[count - 1] = max_freq;
    freqs
}

/// `count` frequencies equally spaced on the mel scale.
///
/// # Errors
/// `InvalidRange` if `count < 2` or `min_freq >= max_freq`.
///
/// # Example
/// ```
/// use ms_audio::scale::mel_spaced;
/// let f = mel_spaced(5, 0.0, 8000.0).unwrap();
/// assert_eq!(f.len(), 5);
/// assert_eq!(f[0], 0.0);
/// assert_eq!(f[4], 8000.0);
/// ```
pub fn mel_spaced(count: usize, min_freq: f64, max_freq: f64) -> Result<Vec<f64>> {
    check_range(count, min_freq, max_freq)?;
    Ok(spaced(
        count,
        (min_freq, max_freq),
        (hz_to_mel(min_freq), hz_to_mel(max_freq)),
        mel_to_hz,
    ))
}

/// `count` frequencies in geometric progression.
///
/// # Errors
/// `InvalidRange` if `count < 2`, `min_freq <= 0` or `min_freq >= max_freq`.
///
/// # Example
/// ```
/// use ms_audio::scale::log_spaced;
/// let f = log_spaced(3, 100.0, 10000.0).unwrap();
/// assert!((f[1] - 1000.0).abs() < 1e-6);
/// ```
pub fn log_spaced(count: usize, min_freq: f64, max_freq: f64) -> Result<Vec<f64>> {
    check_range(count, min_freq, max_freq)?;
    if min_freq <= 0.0 {
        return Err(SpectError::InvalidRange {
            count,
            min_freq,
            max_freq,
        });
    }
    Ok(spaced(
        count,
        (min_freq, max_freq),
        (min_freq.ln(), max_freq.ln()),
        f64::exp,
    ))
}

/// Dispatch on the configured scale.
///
/// # Errors
/// `UnsupportedScale` for [`FreqScale::Linear`], which has no anchors
/// (linear spectrograms slice FFT bins instead), and `InvalidRange` as above.
pub fn generate(scale: FreqScale, count: usize, min_freq: f64, max_freq: f64) -> Result<Vec<f64>> {
    match scale {
        FreqScale::Mel => mel_spaced(count, min_freq, max_freq),
        FreqScale::Log => log_spaced(count, min_freq, max_freq),
        FreqScale::Linear => Err(SpectError::UnsupportedScale(scale.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_monotonic(freqs: &[f64]) {
        for pair in freqs.windows(2) {
            assert!(pair[1] > pair[0], "{} !> {}", pair[1], pair[0]);
        }
    }

    #[test]
    fn mel_round_trip() {
        for hz in [0.0, 27.5, 440.0, 1000.0, 16000.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 1e-6);
        }
        // 1000 Hz sits close to 1000 mel with the 1127 constant
        assert!((hz_to_mel(1000.0) - 999.991).abs() < 1e-3);
    }

    #[test]
    fn endpoints_and_monotonicity() {
        for scale in [FreqScale::Mel, FreqScale::Log] {
            for (count, lo, hi) in [(2, 20.0, 8000.0), (42, 27.5, 16000.0), (82, 130.0, 6854.0)] {
                let f = generate(scale, count, lo, hi).unwrap();
                assert_eq!(f.len(), count);
                assert!((f[0] - lo).abs() < 1e-6);
                assert!((f[count - 1] - hi).abs() < 1e-6);
                assert_monotonic(&f);
            }
        }
    }

    #[test]
    fn mel_points_are_equidistant_in_mel() {
        let f = mel_spaced(10, 50.0, 5000.0).unwrap();
        let mels: Vec<f64> = f.iter().map(|&x| hz_to_mel(x)).collect();
        let step = mels[1] - mels[0];
        for pair in mels.windows(2) {
            assert!((pair[1] - pair[0] - step).abs() < 1e-6);
        }
    }

    #[test]
    fn log_points_have_constant_ratio() {
        let f = log_spaced(6, 100.0, 3200.0).unwrap();
        for pair in f.windows(2) {
            assert!((pair[1] / pair[0] - 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn invalid_ranges() {
        assert!(matches!(
            mel_spaced(1, 20.0, 8000.0),
            Err(SpectError::InvalidRange { count: 1, .. })
        ));
        assert!(mel_spaced(10, 8000.0, 8000.0).is_err());
        assert!(mel_spaced(10, 9000.0, 8000.0).is_err());
        assert!(log_spaced(10, 0.0, 8000.0).is_err());
    }

    #[test]
    fn linear_has_no_anchors() {
        assert_eq!(
            generate(FreqScale::Linear, 10, 20.0, 8000.0),
            Err(SpectError::UnsupportedScale("linear".into()))
        );
    }
}
