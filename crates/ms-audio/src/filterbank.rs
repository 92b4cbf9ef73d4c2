//! Mel / log filter banks over a linear FFT frequency axis.
//!
//! A [`FilterBank`] stores every filter as `(start_bin, weights)` so it can be
//! applied without touching the zero regions. [`DenseFilterMatrix`] holds the
//! same filters as a `(num_bins × num_filters)` matrix, and [`BinSlice`] is the
//! filter-less band selection used for linear spectrograms. All three
//! implement [`BandProjection`], which is what the framer consumes.

use ms_core::config::{FilterShape, FreqScale};
use ms_core::error::{Result, SpectError};
use realfft::num_complex::Complex64;

use crate::scale;

/// Projects one magnitude (or complex) spectrum onto output bands.
pub trait BandProjection: Send + Sync {
    /// Expected spectrum length (`frame_len / 2 + 1`).
    fn num_bins(&self) -> usize;

    /// Number of output bands.
    fn num_bands(&self) -> usize;

    /// Representative frequency of every band in Hz (filter centers or bin
    /// frequencies). Used by loudness scaling.
    fn band_frequencies(&self) -> Vec<f64>;

    /// Writes `num_bands()` values into `out`.
    ///
    /// CONTRAT : `spectrum.len() == num_bins()` et `out.len() == num_bands()`.
    fn project(&self, spectrum: &[f64], out: &mut [f64]);

    /// Complex counterpart of [`BandProjection::project`].
    fn project_complex(&self, spectrum: &[Complex64], out: &mut [Complex64]);
}

/// Frequency of every FFT bin: `num_bins` points from 0 to Nyquist inclusive.
///
/// # Example
/// ```
/// use ms_audio::filterbank::bin_frequencies;
/// assert_eq!(bin_frequencies(5, 16000), vec![0.0, 2000.0, 4000.0, 6000.0, 8000.0]);
/// ```
#[must_use]
pub fn bin_frequencies(num_bins: usize, sample_rate: u32) -> Vec<f64> {
    let nyquist = f64::from(sample_rate) / 2.0;
    match num_bins {
        0 => Vec::new(),
        1 => vec![0.0],
        n => {
            let step = nyquist / (n - 1) as f64;
            let mut freqs: Vec<f64> = (0..n).map(|k| k as f64 * step).collect();
            freqs[n - 1] = nyquist;
            freqs
        }
    }
}

/// Index of the first element `>= value` (left-sided sorted search).
#[inline]
fn search_sorted(sorted: &[f64], value: f64) -> usize {
    sorted.partition_point(|&f| f < value)
}

/// Symmetric Hann window of length `len` (`[1.0]` for a single point).
fn symmetric_hann(len: usize) -> Vec<f64> {
    match len {
        0 => Vec::new(),
        1 => vec![1.0],
        n => {
            let denom = (n - 1) as f64;
            (0..n)
                .map(|i| 0.5 - 0.5 * (std::f64::consts::TAU * i as f64 / denom).cos())
                .collect()
        }
    }
}

/// Construction parameters of a [`FilterBank`].
#[derive(Clone, Debug, PartialEq)]
pub struct FilterBankParams {
    /// Length of the spectra the bank is applied to.
    pub num_bins: usize,
    /// Sample rate of the analysed signal in Hz.
    pub sample_rate: u32,
    /// Number of filters (output bands).
    pub num_filters: usize,
    /// Lower edge of the lowest filter in Hz.
    pub min_freq: f64,
    /// Upper edge of the highest filter in Hz.
    pub max_freq: f64,
    /// Anchor spacing law.
    pub scale: FreqScale,
    /// Filter shape.
    pub shape: FilterShape,
    /// Scale each filter to unit area.
    pub normalize: bool,
    /// Make the normalisation independent of `num_bins`.
    pub preserve_energy: bool,
}

impl FilterBankParams {
    /// Mel, triangular, normalised bank between 130 Hz and 6854 Hz.
    #[must_use]
    pub fn new(num_bins: usize, sample_rate: u32, num_filters: usize) -> Self {
        Self {
            num_bins,
            sample_rate,
            num_filters,
            min_freq: 130.0,
            max_freq: 6854.0,
            scale: FreqScale::Mel,
            shape: FilterShape::Tri,
            normalize: true,
            preserve_energy: false,
        }
    }
}

/// One band filter: `weights[i]` applies to bin `start_bin + i`.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    /// First bin covered by the filter.
    pub start_bin: usize,
    /// Non-negative weights over the filter support.
    pub weights: Vec<f64>,
}

impl Filter {
    #[inline]
    fn dot(&self, spectrum: &[f64]) -> f64 {
        spectrum[self.start_bin..self.start_bin + self.weights.len()]
            .iter()
            .zip(&self.weights)
            .map(|(s, w)| s * w)
            .sum()
    }

    #[inline]
    fn dot_complex(&self, spectrum: &[Complex64]) -> Complex64 {
        spectrum[self.start_bin..self.start_bin + self.weights.len()]
            .iter()
            .zip(&self.weights)
            .map(|(s, &w)| s * w)
            .sum()
    }
}

/// Immutable bank of `num_filters` filters placed on scale-spaced anchors.
///
/// Filter `b` rises from anchor `b` to anchor `b + 1` and falls to anchor
/// `b + 2`, so adjacent filters share one anchor and the two outer anchors
/// never serve as a center.
///
/// # Example
/// ```
/// use ms_audio::filterbank::{BandProjection, FilterBank, FilterBankParams};
/// let bank = FilterBank::build(FilterBankParams::new(1025, 44100, 40)).unwrap();
/// assert_eq!(bank.num_bands(), 40);
/// assert_eq!(bank.peak_frequencies().len(), 42);
/// let bands = bank.apply(&vec![1.0; 1025]).unwrap();
/// assert!(bands.iter().all(|&b| b >= 0.0));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct FilterBank {
    params: FilterBankParams,
    peaks: Vec<f64>,
    filters: Vec<Filter>,
}

impl FilterBank {
    /// Design the bank.
    ///
    /// # Errors
    /// `UnsupportedScale` for the linear scale, `InvalidRange` for bad
    /// frequency bounds, `Config` for zero bins, filters or sample rate.
    pub fn build(params: FilterBankParams) -> Result<Self> {
        if params.num_bins == 0 {
            return Err(SpectError::config("num_bins", "doit être > 0"));
        }
        if params.num_filters == 0 {
            return Err(SpectError::config("bands", "doit être > 0"));
        }
        if params.sample_rate == 0 {
            return Err(SpectError::config("sample_rate", "doit être > 0"));
        }

        let peaks = scale::generate(
            params.scale,
            params.num_filters + 2,
            params.min_freq,
            params.max_freq,
        )?;

        let nyquist = f64::from(params.sample_rate) / 2.0;
        let fft_freqs = bin_frequencies(params.num_bins, params.sample_rate);
        // bin energy (mean) preservation
        let pr_factor = if params.preserve_energy {
            nyquist / params.num_bins as f64
        } else {
            1.0
        };

        let filters = peaks
            .windows(3)
            .map(|anchors| {
                let (left, top, right) = (anchors[0], anchors[1], anchors[2]);
                let l = search_sorted(&fft_freqs, left);
                let t = search_sorted(&fft_freqs, top);
                let r = search_sorted(&fft_freqs, right);

                let mut weights = match params.shape {
                    FilterShape::Tri => {
                        let rising = fft_freqs[l..t].iter().map(|&f| (f - left) / (top - left));
                        let falling = fft_freqs[t..r].iter().map(|&f| (right - f) / (right - top));
                        rising.chain(falling).collect::<Vec<_>>()
                    }
                    FilterShape::Hann => symmetric_hann(r - l),
                };
                if params.normalize {
                    let gain = 2.0 / ((right - left) / pr_factor);
                    weights.iter_mut().for_each(|w| *w *= gain);
                }
                Filter {
                    start_bin: l,
                    weights,
                }
            })
            .collect::<Vec<_>>();

        log::debug!(
            "Banc de filtres : {} filtres {} {:.1}-{:.1} Hz sur {} bins @ {} Hz (forme={}, norm={}, préservation={})",
            filters.len(),
            params.scale,
            params.min_freq,
            params.max_freq,
            params.num_bins,
            params.sample_rate,
            params.shape,
            params.normalize,
            params.preserve_energy
        );

        Ok(Self {
            params,
            peaks,
            filters,
        })
    }

    /// Parameters the bank was built with.
    #[must_use]
    pub fn params(&self) -> &FilterBankParams {
        &self.params
    }

    /// All `num_filters + 2` anchor frequencies.
    #[must_use]
    pub fn peak_frequencies(&self) -> &[f64] {
        &self.peaks
    }

    /// Center frequency of every filter (anchors without the outer two).
    #[must_use]
    pub fn center_frequencies(&self) -> &[f64] {
        &self.peaks[1..self.peaks.len() - 1]
    }

    /// Compact per-filter representation.
    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Materialize as a dense `(num_bins × num_filters)` matrix.
    #[must_use]
    pub fn to_matrix(&self) -> DenseFilterMatrix {
        let cols = self.filters.len();
        let mut data = vec![0.0; self.params.num_bins * cols];
        for (b, filter) in self.filters.iter().enumerate() {
            for (i, &w) in filter.weights.iter().enumerate() {
                data[(filter.start_bin + i) * cols + b] = w;
            }
        }
        DenseFilterMatrix {
            rows: self.params.num_bins,
            cols,
            data,
            centers: self.center_frequencies().to_vec(),
        }
    }

    /// Apply the bank to one spectrum.
    ///
    /// # Errors
    /// `ShapeMismatch` if the spectrum length differs from `num_bins`.
    pub fn apply(&self, spectrum: &[f64]) -> Result<Vec<f64>> {
        if spectrum.len() != self.params.num_bins {
            return Err(SpectError::ShapeMismatch {
                expected: self.params.num_bins,
                actual: spectrum.len(),
            });
        }
        let mut out = vec![0.0; self.filters.len()];
        self.project(spectrum, &mut out);
        Ok(out)
    }
}

impl BandProjection for FilterBank {
    fn num_bins(&self) -> usize {
        self.params.num_bins
    }

    fn num_bands(&self) -> usize {
        self.filters.len()
    }

    fn band_frequencies(&self) -> Vec<f64> {
        self.center_frequencies().to_vec()
    }

    fn project(&self, spectrum: &[f64], out: &mut [f64]) {
        debug_assert_eq!(spectrum.len(), self.params.num_bins);
        for (slot, filter) in out.iter_mut().zip(&self.filters) {
            *slot = filter.dot(spectrum);
        }
    }

    fn project_complex(&self, spectrum: &[Complex64], out: &mut [Complex64]) {
        debug_assert_eq!(spectrum.len(), self.params.num_bins);
        for (slot, filter) in out.iter_mut().zip(&self.filters) {
            *slot = filter.dot_complex(spectrum);
        }
    }
}

/// Dense `(num_bins × num_filters)` transform matrix, row-major.
#[derive(Clone, Debug)]
pub struct DenseFilterMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
    centers: Vec<f64>,
}

impl DenseFilterMatrix {
    /// `(rows, cols)` = `(num_bins, num_filters)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Weight of `bin` in `filter`.
    #[must_use]
    pub fn get(&self, bin: usize, filter: usize) -> f64 {
        self.data[bin * self.cols + filter]
    }

    /// Row-major storage.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

impl BandProjection for DenseFilterMatrix {
    fn num_bins(&self) -> usize {
        self.rows
    }

    fn num_bands(&self) -> usize {
        self.cols
    }

    fn band_frequencies(&self) -> Vec<f64> {
        self.centers.clone()
    }

    fn project(&self, spectrum: &[f64], out: &mut [f64]) {
        debug_assert_eq!(spectrum.len(), self.rows);
        out.fill(0.0);
        for (row, &s) in self.data.chunks_exact(self.cols).zip(spectrum) {
            for (acc, &w) in out.iter_mut().zip(row) {
                *acc += s * w;
            }
        }
    }

    fn project_complex(&self, spectrum: &[Complex64], out: &mut [Complex64]) {
        debug_assert_eq!(spectrum.len(), self.rows);
        out.fill(Complex64::new(0.0, 0.0));
        for (row, &s) in self.data.chunks_exact(self.cols).zip(spectrum) {
            for (acc, &w) in out.iter_mut().zip(row) {
                *acc += s * w;
            }
        }
    }
}

/// Contiguous FFT bin range, used instead of a filter bank on the linear scale.
///
/// # Example
/// ```
/// use ms_audio::filterbank::{BandProjection, BinSlice};
/// let slice = BinSlice::between(9, 16000, 2000.0, 6000.0);
/// assert_eq!(slice.range(), 2..6);
/// assert_eq!(slice.band_frequencies(), vec![2000.0, 3000.0, 4000.0, 5000.0]);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct BinSlice {
    num_bins: usize,
    low: usize,
    high: usize,
    freqs: Vec<f64>,
}

impl BinSlice {
    /// Bins whose frequency lies in `[min_freq, max_freq)`.
    #[must_use]
    pub fn between(num_bins: usize, sample_rate: u32, min_freq: f64, max_freq: f64) -> Self {
        let freqs = bin_frequencies(num_bins, sample_rate);
        let low = search_sorted(&freqs, min_freq);
        let high = search_sorted(&freqs, max_freq).max(low);
        Self {
            num_bins,
            low,
            high,
            freqs: freqs[low..high].to_vec(),
        }
    }

    /// Selected bin range.
    #[must_use]
    pub fn range(&self) -> std::ops::Range<usize> {
        self.low..self.high
    }
}

impl BandProjection for BinSlice {
    fn num_bins(&self) -> usize {
        self.num_bins
    }

    fn num_bands(&self) -> usize {
        self.high - self.low
    }

    fn band_frequencies(&self) -> Vec<f64> {
        self.freqs.clone()
    }

    fn project(&self, spectrum: &[f64], out: &mut [f64]) {
        out.copy_from_slice(&spectrum[self.low..self.high]);
    }

    fn project_complex(&self, spectrum: &[Complex64], out: &mut [Complex64]) {
        out.copy_from_slice(&spectrum[self.low..self.high]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(scale: FreqScale, shape: FilterShape) -> FilterBankParams {
        FilterBankParams {
            min_freq: 20.0,
            max_freq: 8000.0,
            scale,
            shape,
            ..FilterBankParams::new(513, 16000, 40)
        }
    }

    /// Deterministic pseudo-random spectrum in [0, 1).
    fn test_spectrum(len: usize) -> Vec<f64> {
        let mut state = 0x2545_f491_u64;
        (0..len)
            .map(|_| {
                state = state
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                (state >> 11) as f64 / (1u64 << 53) as f64
            })
            .collect()
    }

    #[test]
    fn filters_fit_and_are_non_negative() {
        for scale in [FreqScale::Mel, FreqScale::Log] {
            for shape in [FilterShape::Tri, FilterShape::Hann] {
                let bank = FilterBank::build(params(scale, shape)).unwrap();
                assert_eq!(bank.filters().len(), 40);
                for filter in bank.filters() {
                    assert!(filter.start_bin + filter.weights.len() <= 513);
                    assert!(filter.weights.iter().all(|&w| w >= 0.0));
                }
            }
        }
    }

    #[test]
    fn centers_increase_and_edges_share_anchors() {
        let bank = FilterBank::build(params(FreqScale::Mel, FilterShape::Tri)).unwrap();
        let peaks = bank.peak_frequencies();
        assert_eq!(peaks.len(), 42);
        assert!((peaks[0] - 20.0).abs() < 1e-9);
        assert!((peaks[41] - 8000.0).abs() < 1e-9);
        let centers = bank.center_frequencies();
        assert_eq!(centers.len(), 40);
        assert_eq!(centers[0], peaks[1]);
        for pair in centers.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn triangle_is_asymmetric_on_mel() {
        let mut p = params(FreqScale::Mel, FilterShape::Tri);
        p.normalize = false;
        p.num_bins = 4097;
        let bank = FilterBank::build(p).unwrap();
        let filter = &bank.filters()[30];
        let peak = filter
            .weights
            .iter()
            .copied()
            .fold(f64::MIN, f64::max);
        assert!(peak <= 1.0 && peak > 0.99);
        let argmax = filter
            .weights
            .iter()
            .position(|&w| (w - peak).abs() < f64::EPSILON)
            .unwrap();
        // mel spacing widens with frequency: the falling slope is longer
        assert!(filter.weights.len() - argmax > argmax);
    }

    #[test]
    fn normalized_triangles_have_unit_area() {
        // fine axis (~0.98 Hz per bin) so the discrete sum tracks the integral
        let p = FilterBankParams {
            min_freq: 100.0,
            max_freq: 8000.0,
            ..FilterBankParams::new(8193, 16000, 10)
        };
        let bank = FilterBank::build(p).unwrap();
        let spacing = 8000.0 / 8192.0;
        for filter in bank.filters() {
            let area: f64 = filter.weights.iter().sum::<f64>() * spacing;
            assert!((area - 1.0).abs() < 1e-3, "area {area}");
        }
    }

    #[test]
    fn preserve_energy_rescales_by_bin_width() {
        let plain = FilterBank::build(params(FreqScale::Mel, FilterShape::Tri)).unwrap();
        let mut p = params(FreqScale::Mel, FilterShape::Tri);
        p.preserve_energy = true;
        let preserved = FilterBank::build(p).unwrap();
        let pr_factor = 8000.0 / 513.0;
        for (a, b) in plain.filters().iter().zip(preserved.filters()) {
            assert_eq!(a.start_bin, b.start_bin);
            for (wa, wb) in a.weights.iter().zip(&b.weights) {
                assert!((wa * pr_factor - wb).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn dense_and_compact_agree() {
        for shape in [FilterShape::Tri, FilterShape::Hann] {
            let bank = FilterBank::build(params(FreqScale::Mel, shape)).unwrap();
            let matrix = bank.to_matrix();
            assert_eq!(matrix.shape(), (513, 40));

            let spectrum = test_spectrum(513);
            let compact = bank.apply(&spectrum).unwrap();
            let mut dense = vec![0.0; 40];
            matrix.project(&spectrum, &mut dense);
            for (c, d) in compact.iter().zip(&dense) {
                assert!((c - d).abs() <= 1e-5 * c.abs().max(1e-12), "{c} vs {d}");
            }

            let complex: Vec<Complex64> = spectrum
                .iter()
                .zip(test_spectrum(600).iter().skip(87))
                .map(|(&re, &im)| Complex64::new(re, im - 0.5))
                .collect();
            let mut a = vec![Complex64::new(0.0, 0.0); 40];
            let mut b = vec![Complex64::new(0.0, 0.0); 40];
            bank.project_complex(&complex, &mut a);
            matrix.project_complex(&complex, &mut b);
            for (x, y) in a.iter().zip(&b) {
                assert!((x - y).norm() <= 1e-9);
            }
        }
    }

    #[test]
    fn hann_filters_span_anchor_bins() {
        let mut p = params(FreqScale::Log, FilterShape::Hann);
        p.normalize = false;
        let bank = FilterBank::build(p).unwrap();
        for filter in bank.filters().iter().filter(|f| f.weights.len() > 2) {
            assert!(filter.weights[0].abs() < 1e-12);
            assert!(filter.weights[filter.weights.len() - 1].abs() < 1e-12);
        }
    }

    #[test]
    fn coarse_axis_yields_empty_low_filters() {
        let p = FilterBankParams {
            min_freq: 20.0,
            max_freq: 8000.0,
            ..FilterBankParams::new(9, 16000, 40)
        };
        let bank = FilterBank::build(p).unwrap();
        assert!(bank.filters()[0].weights.is_empty());
        let out = bank.apply(&[1.0; 9]).unwrap();
        assert_eq!(out[0], 0.0);
    }

    #[test]
    fn apply_checks_length() {
        let bank = FilterBank::build(params(FreqScale::Mel, FilterShape::Tri)).unwrap();
        assert_eq!(
            bank.apply(&[0.0; 10]).unwrap_err(),
            SpectError::ShapeMismatch {
                expected: 513,
                actual: 10
            }
        );
    }

    #[test]
    fn linear_scale_is_not_a_bank() {
        let p = params(FreqScale::Linear, FilterShape::Tri);
        assert!(matches!(
            FilterBank::build(p),
            Err(SpectError::UnsupportedScale(_))
        ));
    }

    #[test]
    fn bin_slice_projects_exactly() {
        let slice = BinSlice::between(201, 16000, 20.0, 8000.0);
        // 40 Hz bins: 20 Hz lands on bin 1, 8000 Hz is bin 200 (excluded)
        assert_eq!(slice.range(), 1..200);
        let spectrum = test_spectrum(201);
        let mut out = vec![0.0; slice.num_bands()];
        slice.project(&spectrum, &mut out);
        assert_eq!(out[..], spectrum[1..200]);
    }
}
