//! Multi-channel handling around the framer.
//!
//! A [`ChannelMixer`] runs once before framing (downmix or promotion to a
//! channel axis) and once after projection (average of spectra).

use ms_core::config::ChannelPolicy;
use ms_core::error::{Result, SpectError};
use ms_core::samples::SampleBuffer;
use ms_core::spectrogram::Spectrogram;
use realfft::num_complex::Complex64;

use crate::stft::SpectralFrames;

/// Downmix to a 1-D buffer.
///
/// Mono input passes through, a single-channel 2-D buffer is squeezed and
/// stereo is averaged. More than two channels are averaged only when
/// `generalized` is set.
///
/// # Errors
/// `UnsupportedChannelCount` for more than two channels without `generalized`.
///
/// # Example
/// ```
/// use ms_audio::channels::premix;
/// use ms_core::samples::SampleBuffer;
/// let stereo = SampleBuffer::from_channels(vec![vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
/// let mono = premix(stereo, false).unwrap();
/// assert_eq!(mono.channel(0), &[0.5, 0.5]);
/// ```
pub fn premix(samples: SampleBuffer, generalized: bool) -> Result<SampleBuffer> {
    if !samples.has_channel_axis() {
        return Ok(samples);
    }
    let channels = samples.num_channels();
    match channels {
        1 => Ok(samples.into_mono()),
        2 => {
            let mixed = samples
                .channel(0)
                .iter()
                .zip(samples.channel(1))
                .map(|(&l, &r)| (l + r) / 2.0)
                .collect();
            Ok(SampleBuffer::mono(mixed))
        }
        _ if generalized => {
            let mut mixed = vec![0.0f32; samples.num_samples()];
            for row in samples.channel_rows() {
                for (m, &s) in mixed.iter_mut().zip(row) {
                    *m += s;
                }
            }
            let scale = 1.0 / channels as f32;
            mixed.iter_mut().for_each(|m| *m *= scale);
            Ok(SampleBuffer::mono(mixed))
        }
        _ => Err(SpectError::UnsupportedChannelCount(channels)),
    }
}

/// Average projected spectra over the channel axis.
///
/// With retained phases the complex values are averaged, so the magnitude of
/// the result reflects interference between channels. Frames without a
/// channel axis are returned unchanged.
#[must_use]
pub fn postmix(frames: SpectralFrames) -> SpectralFrames {
    let Some(channels) = frames.channels else {
        return frames;
    };
    let bands = frames.bands;
    let row = channels * bands;
    let out_len = frames.frames * bands;
    let scale = 1.0 / channels as f64;

    match frames.phases {
        Some(ref phases) => {
            let mut sums = vec![Complex64::new(0.0, 0.0); out_len];
            for (f, out) in sums.chunks_mut(bands.max(1)).enumerate().take(frames.frames) {
                for c in 0..channels {
                    let at = f * row + c * bands;
                    let mags = &frames.mags[at..at + bands];
                    let args = &phases[at..at + bands];
                    for ((o, &m), &p) in out.iter_mut().zip(mags).zip(args) {
                        *o += Complex64::from_polar(m, p);
                    }
                }
            }
            SpectralFrames {
                frames: frames.frames,
                channels: None,
                bands,
                mags: sums.iter().map(|z| z.norm() * scale).collect(),
                phases: Some(sums.iter().map(|z| z.arg()).collect()),
            }
        }
        None => {
            let mut mags = vec![0.0; out_len];
            for (f, out) in mags.chunks_mut(bands.max(1)).enumerate().take(frames.frames) {
                for c in 0..channels {
                    let at = f * row + c * bands;
                    for (o, &m) in out.iter_mut().zip(&frames.mags[at..at + bands]) {
                        *o += m;
                    }
                }
                out.iter_mut().for_each(|o| *o *= scale);
            }
            SpectralFrames {
                frames: frames.frames,
                channels: None,
                bands,
                mags,
                phases: None,
            }
        }
    }
}

/// Split a `(frames, channels, bands)` spectrogram into one 2-D spectrogram
/// per channel, named `"{name}.{index}"`.
///
/// A spectrogram without channel axis is returned as is, under `name`.
#[must_use]
pub fn split(name: &str, spectrogram: Spectrogram) -> Vec<(String, Spectrogram)> {
    let Some(channels) = spectrogram.channels() else {
        return vec![(name.to_owned(), spectrogram)];
    };
    (0..channels)
        .filter_map(|c| {
            spectrogram
                .select_channel(c)
                .map(|s| (format!("{name}.{c}"), s))
        })
        .collect()
}

/// Channel handling of one extraction call.
///
/// # Example
/// ```
/// use ms_audio::channels::ChannelMixer;
/// use ms_core::config::ChannelPolicy;
/// use ms_core::samples::SampleBuffer;
///
/// let mixer = ChannelMixer::new(ChannelPolicy::Concat, false);
/// let prepared = mixer.prepare(SampleBuffer::mono(vec![0.0; 8])).unwrap();
/// assert!(prepared.has_channel_axis());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelMixer {
    policy: ChannelPolicy,
    generalized: bool,
}

impl ChannelMixer {
    /// Mixer for `policy`. `generalized` allows downmixing more than two
    /// channels under `mix-before`.
    #[must_use]
    pub fn new(policy: ChannelPolicy, generalized: bool) -> Self {
        Self {
            policy,
            generalized,
        }
    }

    /// Configured policy.
    #[must_use]
    pub fn policy(&self) -> ChannelPolicy {
        self.policy
    }

    /// Stage run on the samples before framing.
    ///
    /// `mix-before` downmixes, `concat` and `split` give mono input a channel
    /// axis of length 1, `mix-after` leaves the buffer alone.
    ///
    /// # Errors
    /// `UnsupportedChannelCount` from [`premix`].
    pub fn prepare(&self, samples: SampleBuffer) -> Result<SampleBuffer> {
        match self.policy {
            ChannelPolicy::MixBefore => premix(samples, self.generalized),
            ChannelPolicy::MixAfter => Ok(samples),
            ChannelPolicy::Concat | ChannelPolicy::Split => Ok(samples.with_channel_axis()),
        }
    }

    /// Stage run on projected spectra, before magnitude scaling.
    #[must_use]
    pub fn finish(&self, frames: SpectralFrames) -> SpectralFrames {
        match self.policy {
            ChannelPolicy::MixAfter => postmix(frames),
            _ => frames,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(mags: Vec<f64>, phases: Option<Vec<f64>>, channels: usize, bands: usize) -> SpectralFrames {
        SpectralFrames {
            frames: mags.len() / (channels * bands),
            channels: Some(channels),
            bands,
            mags,
            phases,
        }
    }

    #[test]
    fn premix_rejects_many_channels() {
        let buf = SampleBuffer::from_channels(vec![vec![0.0; 4]; 3]).unwrap();
        assert_eq!(
            premix(buf, false),
            Err(SpectError::UnsupportedChannelCount(3))
        );
        let mixed = premix(
            SampleBuffer::from_channels(vec![vec![3.0; 4], vec![0.0; 4], vec![0.0; 4]]).unwrap(),
            true,
        )
        .unwrap();
        assert!(!mixed.has_channel_axis());
        assert!(mixed.channel(0).iter().all(|&s| (s - 1.0).abs() < 1e-6));
    }

    #[test]
    fn premix_squeezes_single_channel() {
        let buf = SampleBuffer::from_shape(&[1, 3], vec![1.0, 2.0, 3.0]).unwrap();
        let mono = premix(buf, false).unwrap();
        assert_eq!(mono.ndim(), 1);
        assert_eq!(mono.channel(0), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn postmix_averages_magnitudes() {
        // 2 frames, 2 channels, 2 bands
        let mixed = postmix(frames(vec![1.0, 2.0, 3.0, 4.0, 0.0, 0.0, 2.0, 2.0], None, 2, 2));
        assert_eq!(mixed.channels(), None);
        assert_eq!(mixed.magnitudes(), &[2.0, 3.0, 1.0, 1.0]);
    }

    #[test]
    fn postmix_with_phases_is_a_complex_mean() {
        use std::f64::consts::PI;
        // opposite phases cancel, equal phases add
        let mixed = postmix(frames(vec![1.0, 1.0, 1.0, 1.0], Some(vec![0.0, 0.5, PI, 0.5]), 2, 2));
        let mags = mixed.magnitudes();
        assert!(mags[0].abs() < 1e-12);
        assert!((mags[1] - 1.0).abs() < 1e-12);
        let phases = mixed.phases().unwrap();
        assert!((phases[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn split_names_channels() {
        let spect = Spectrogram::real(1, Some(3), 2, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let parts = split("melspect", spect);
        let names: Vec<&str> = parts.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["melspect.0", "melspect.1", "melspect.2"]);
        assert_eq!(parts[2].1.shape(), vec![1, 2]);
        assert_eq!(parts[2].1.as_real().unwrap(), &[4.0, 5.0]);
    }

    #[test]
    fn prepare_per_policy() {
        let stereo = SampleBuffer::from_channels(vec![vec![1.0; 4], vec![0.0; 4]]).unwrap();
        let before = ChannelMixer::new(ChannelPolicy::MixBefore, false)
            .prepare(stereo.clone())
            .unwrap();
        assert_eq!(before.ndim(), 1);
        let after = ChannelMixer::new(ChannelPolicy::MixAfter, false)
            .prepare(stereo)
            .unwrap();
        assert_eq!(after.num_channels(), 2);
        let mono = ChannelMixer::new(ChannelPolicy::MixAfter, false)
            .prepare(SampleBuffer::mono(vec![0.0; 4]))
            .unwrap();
        assert_eq!(mono.ndim(), 1);
    }
}
