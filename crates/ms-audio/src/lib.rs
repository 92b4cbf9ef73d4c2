// Spectrogram extraction engine for melspect: framing, FFT, filter banks and magnitude scaling.

pub mod cache;
pub mod channels;
pub mod decode;
pub mod extract;
pub mod filterbank;
pub mod magnitude;
pub mod scale;
pub mod stft;

pub use extract::{ExtractionOutput, Extractor, NamedSpectrogram, ProjectionStrategy};
