/// Configuration, types, and shared structures for melspect.
///
/// This crate contains the configuration, error taxonomy, input buffers and
/// result containers shared by the extraction engine and the command-line tool.

pub mod config;
pub mod error;
pub mod samples;
pub mod spectrogram;
pub mod timestamps;

pub use config::ExtractionConfig;
pub use error::{ErrorKind, SpectError};
pub use samples::SampleBuffer;
pub use spectrogram::{Spectrogram, SpectrogramData};
pub use timestamps::{TimesMode, Timestamps};
