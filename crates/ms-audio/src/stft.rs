//! Short-time Fourier transform with filter-bank projection.

use std::sync::Arc;

use ms_core::error::{Result, SpectError};
use ms_core::samples::SampleBuffer;
use ms_core::spectrogram::Spectrogram;
use rayon::prelude::*;
use realfft::num_complex::{Complex32, Complex64};
use realfft::{RealFftPlanner, RealToComplex};

use crate::filterbank::BandProjection;

/// Hann window of length `len`.
///
/// The periodic variant is an `(len + 1)`-point window without its leading
/// zero; the symmetric variant is the standard `len`-point window.
///
/// # Example
/// ```
/// use ms_audio::stft::hann_window;
/// let w = hann_window(4, true);
/// for (a, b) in w.iter().zip([0.5, 1.0, 0.5, 0.0]) {
///     assert!((a - b).abs() < 1e-12);
/// }
/// ```
#[must_use]
pub fn hann_window(len: usize, periodic: bool) -> Vec<f64> {
    let (points, skip) = if periodic { (len + 1, 1) } else { (len, 0) };
    if points < 2 {
        return vec![1.0; len];
    }
    let denom = (points - 1) as f64;
    (skip..points)
        .map(|i| 0.5 - 0.5 * (std::f64::consts::TAU * i as f64 / denom).cos())
        .collect()
}

/// Framing parameters of one transform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FramerOptions {
    /// Window length in samples.
    pub frame_len: usize,
    /// Distance between consecutive frames in samples.
    pub hop_size: usize,
    /// Causal placement: each window ends at its reference sample.
    pub online: bool,
    /// Keep phases alongside the magnitudes.
    pub keep_phases: bool,
    /// Periodic instead of symmetric Hann window.
    pub periodic_window: bool,
    /// Scale the window to unit mean square times `2 / frame_len`.
    pub normalize_fft: bool,
}

impl FramerOptions {
    /// Offline framing with a symmetric, unnormalised window and no phases.
    #[must_use]
    pub fn new(frame_len: usize, hop_size: usize) -> Self {
        Self {
            frame_len,
            hop_size,
            online: false,
            keep_phases: false,
            periodic_window: false,
            normalize_fft: false,
        }
    }

    /// Zeros inserted before the first sample.
    #[must_use]
    pub fn front_padding(&self) -> usize {
        let half = self.frame_len / 2;
        if self.online { 2 * half } else { half }
    }

    /// Zeros appended after the last sample.
    #[must_use]
    pub fn back_padding(&self) -> usize {
        if self.online { 0 } else { self.frame_len / 2 }
    }
}

/// Projected magnitudes (and optional phases) of every frame, before
/// magnitude scaling.
///
/// Layout is `(frames, [channels,] bands)`, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct SpectralFrames {
    pub(crate) frames: usize,
    pub(crate) channels: Option<usize>,
    pub(crate) bands: usize,
    pub(crate) mags: Vec<f64>,
    pub(crate) phases: Option<Vec<f64>>,
}

impl SpectralFrames {
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

    /// Number of bands.
    #[must_use]
    pub fn bands(&self) -> usize {
        self.bands
    }

    /// Magnitudes, row-major.
    #[must_use]
    pub fn magnitudes(&self) -> &[f64] {
        &self.mags
    }

    /// Mutable magnitudes, for in-place scaling.
    pub fn magnitudes_mut(&mut self) -> &mut [f64] {
        &mut self.mags
    }

    /// Phases in radians, when retained.
    #[must_use]
    pub fn phases(&self) -> Option<&[f64]> {
        self.phases.as_deref()
    }

    /// Convert to the single-precision output container.
    ///
    /// # Errors
    /// `ShapeMismatch` if the buffers disagree with the declared shape.
    pub fn into_spectrogram(self) -> Result<Spectrogram> {
        match self.phases {
            Some(phases) => Spectrogram::complex(
                self.frames,
                self.channels,
                self.bands,
                self.mags
                    .iter()
                    .zip(&phases)
                    .map(|(&m, &p)| {
                        let c = Complex64::from_polar(m, p);
                        Complex32::new(c.re as f32, c.im as f32)
                    })
                    .collect(),
            ),
            None => Spectrogram::real(
                self.frames,
                self.channels,
                self.bands,
                self.mags.iter().map(|&m| m as f32).collect(),
            ),
        }
    }
}

/// Per-thread FFT buffers.
struct Scratch {
    input: Vec<f64>,
    spectrum: Vec<Complex64>,
    fft_scratch: Vec<Complex64>,
    magnitudes: Vec<f64>,
    projected: Vec<Complex64>,
}

/// Slices a sample buffer into windowed frames and projects their spectra.
///
/// Owns the FFT plan and the window coefficients; immutable once built, so a
/// single instance can transform several buffers concurrently.
///
/// # Example
/// ```
/// use ms_audio::filterbank::BinSlice;
/// use ms_audio::stft::{Framer, FramerOptions};
/// use ms_core::samples::SampleBuffer;
///
/// let framer = Framer::new(FramerOptions::new(256, 128)).unwrap();
/// let slice = BinSlice::between(129, 8000, 0.0, 4000.0);
/// let frames = framer.transform(&SampleBuffer::mono(vec![0.0; 1024]), &slice).unwrap();
/// assert_eq!(frames.frames(), 8);
/// assert_eq!(frames.bands(), 128);
/// ```
pub struct Framer {
    options: FramerOptions,
    window: Vec<f64>,
    plan: Arc<dyn RealToComplex<f64>>,
}

impl Framer {
    /// Plan the FFT and compute the window.
    ///
    /// # Errors
    /// `Config` if the frame length is below 2 or the hop size is zero.
    pub fn new(options: FramerOptions) -> Result<Self> {
        if options.frame_len < 2 {
            return Err(SpectError::config(
                "frame_lengths",
                format!("longueur de trame {} < 2", options.frame_len),
            ));
        }
        if options.hop_size == 0 {
            return Err(SpectError::config("frame_rate", "pas de saut nul"));
        }

        let mut planner = RealFftPlanner::<f64>::new();
        let plan = planner.plan_fft_forward(options.frame_len);

        let mut window = hann_window(options.frame_len, options.periodic_window);
        if options.normalize_fft {
            let mean_square = window.iter().map(|w| w * w).sum::<f64>() / window.len() as f64;
            let gain = 1.0 / mean_square.sqrt() * 2.0 / options.frame_len as f64;
            window.iter_mut().for_each(|w| *w *= gain);
        }

        Ok(Self {
            options,
            window,
            plan,
        })
    }

    /// Framing parameters.
    #[must_use]
    pub fn options(&self) -> &FramerOptions {
        &self.options
    }

    /// Window coefficients (after optional normalisation).
    #[must_use]
    pub fn window(&self) -> &[f64] {
        &self.window
    }

    /// Spectrum length: `frame_len / 2 + 1`.
    #[must_use]
    pub fn num_bins(&self) -> usize {
        self.options.frame_len / 2 + 1
    }

    /// Number of frames produced for `num_samples` input samples.
    ///
    /// Frames start every `hop_size` samples of the padded signal, as long as
    /// the start lies strictly before `padded_len - frame_len`.
    #[must_use]
    pub fn num_frames(&self, num_samples: usize) -> usize {
        let padded = num_samples + self.options.front_padding() + self.options.back_padding();
        match padded.checked_sub(self.options.frame_len) {
            Some(span) if span > 0 => (span - 1) / self.options.hop_size + 1,
            _ => 0,
        }
    }

    /// Index of the first input sample covered by frame `k` (negative inside
    /// the leading zero padding).
    #[must_use]
    pub fn frame_start(&self, k: usize) -> isize {
        (k * self.options.hop_size) as isize - self.options.front_padding() as isize
    }

    fn pad(&self, channel: &[f32]) -> Vec<f64> {
        let front = self.options.front_padding();
        let mut padded = vec![0.0; front + channel.len() + self.options.back_padding()];
        for (slot, &s) in padded[front..].iter_mut().zip(channel) {
            *slot = f64::from(s);
        }
        padded
    }

    fn make_scratch(&self, bands: usize) -> Scratch {
        Scratch {
            input: self.plan.make_input_vec(),
            spectrum: self.plan.make_output_vec(),
            fft_scratch: self.plan.make_scratch_vec(),
            magnitudes: vec![0.0; self.num_bins()],
            projected: vec![Complex64::new(0.0, 0.0); bands],
        }
    }

    /// Transform one frame of one channel, writing `bands` magnitudes (and
    /// phases) into the output rows.
    fn process_frame(
        &self,
        scratch: &mut Scratch,
        frame: &[f64],
        projection: &dyn BandProjection,
        mags: &mut [f64],
        phases: Option<&mut [f64]>,
    ) {
        for ((slot, &s), &w) in scratch.input.iter_mut().zip(frame).zip(&self.window) {
            *slot = s * w;
        }

        if self
            .plan
            .process_with_scratch(
                &mut scratch.input,
                &mut scratch.spectrum,
                &mut scratch.fft_scratch,
            )
            .is_err()
        {
            log::warn!("FFT a échoué sur une trame, remplacée par du silence");
            scratch.spectrum.fill(Complex64::new(0.0, 0.0));
        }

        for (m, c) in scratch.magnitudes.iter_mut().zip(&scratch.spectrum) {
            *m = c.norm();
        }
        projection.project(&scratch.magnitudes, mags);

        // Phase of the projected complex spectrum. Approximate for overlapping
        // filters, exact for a plain bin slice.
        if let Some(phases) = phases {
            projection.project_complex(&scratch.spectrum, &mut scratch.projected);
            for (p, c) in phases.iter_mut().zip(&scratch.projected) {
                *p = c.arg();
            }
        }
    }

    /// Frame, window, transform and project every channel of `samples`.
    ///
    /// 1-D input yields `(frames, bands)`, 2-D input `(frames, channels, bands)`.
    ///
    /// # Errors
    /// `ShapeMismatch` if the projection expects a different spectrum length.
    pub fn transform(
        &self,
        samples: &SampleBuffer,
        projection: &dyn BandProjection,
    ) -> Result<SpectralFrames> {
        if projection.num_bins() != self.num_bins() {
            return Err(SpectError::ShapeMismatch {
                expected: self.num_bins(),
                actual: projection.num_bins(),
            });
        }

        let frame_len = self.options.frame_len;
        let hop = self.options.hop_size;
        let bands = projection.num_bands();
        let num_channels = samples.num_channels();
        let num_frames = self.num_frames(samples.num_samples());
        let keep_phases = self.options.keep_phases;
        let row = num_channels * bands;

        let padded: Vec<Vec<f64>> = samples.channel_rows().map(|c| self.pad(c)).collect();

        let rows: Vec<(Vec<f64>, Vec<f64>)> = (0..num_frames)
            .into_par_iter()
            .map_init(
                || self.make_scratch(bands),
                |scratch, k| {
                    let pos = k * hop;
                    let mut mags = vec![0.0; row];
                    let mut phases = if keep_phases { vec![0.0; row] } else { Vec::new() };
                    for (c, channel) in padded.iter().enumerate() {
                        let out = c * bands..(c + 1) * bands;
                        let phase_row = if keep_phases {
                            Some(&mut phases[out.clone()])
                        } else {
                            None
                        };
                        self.process_frame(
                            scratch,
                            &channel[pos..pos + frame_len],
                            projection,
                            &mut mags[out],
                            phase_row,
                        );
                    }
                    (mags, phases)
                },
            )
            .collect();

        let mut mags = Vec::with_capacity(num_frames * row);
        let mut phases = keep_phases.then(|| Vec::with_capacity(num_frames * row));
        for (m, p) in rows {
            mags.extend_from_slice(&m);
            if let Some(all) = phases.as_mut() {
                all.extend_from_slice(&p);
            }
        }

        log::debug!(
            "STFT: {num_frames} trames de {frame_len} échantillons (saut {hop}, {num_channels} canal(aux), {bands} bandes)"
        );

        Ok(SpectralFrames {
            frames: num_frames,
            channels: samples.has_channel_axis().then_some(num_channels),
            bands,
            mags,
            phases,
        })
    }
}
