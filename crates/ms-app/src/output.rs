use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use ms_audio::extract::ExtractionOutput;
use ms_core::config::ExtractionConfig;
use ms_core::spectrogram::Spectrogram;
use ms_core::timestamps::Timestamps;
use serde::{Deserialize, Serialize};

/// Name of the time stamp array in a named artifact.
pub const TIMES_NAME: &str = "times";

/// Content of one named array.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub enum ArrayData {
    Spectrogram(Spectrogram),
    Times(Timestamps),
}

/// One named array of the artifact.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct NamedArray {
    pub name: String,
    pub data: ArrayData,
}

/// Everything written to the output file.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub enum Artifact {
    /// A lone spectrogram, without metadata.
    Single(Spectrogram),
    /// Named arrays plus the configuration that produced them.
    Named {
        arrays: Vec<NamedArray>,
        metadata: ExtractionConfig,
    },
}

impl Artifact {
    /// Package an extraction result.
    ///
    /// A single spectrogram without time stamps is stored bare; anything
    /// else keeps its names and the configuration.
    #[must_use]
    pub fn from_output(output: ExtractionOutput, metadata: ExtractionConfig) -> Self {
        let ExtractionOutput {
            mut spectrograms,
            times,
        } = output;
        if spectrograms.len() == 1 && times.is_none() {
            return Self::Single(spectrograms.swap_remove(0).spectrogram);
        }
        let mut arrays: Vec<NamedArray> = spectrograms
            .into_iter()
            .map(|s| NamedArray {
                name: s.name,
                data: ArrayData::Spectrogram(s.spectrogram),
            })
            .collect();
        if let Some(times) = times {
            arrays.push(NamedArray {
                name: TIMES_NAME.to_owned(),
                data: ArrayData::Times(times),
            });
        }
        Self::Named { arrays, metadata }
    }

    /// Number of stored arrays.
    #[must_use]
    pub fn array_count(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Named { arrays, .. } => arrays.len(),
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

/// Write `artifact` to `path`: JSON for a `.json` extension, bincode otherwise.
///
/// # Errors
/// Returns an error if the file cannot be created or serialization fails.
pub fn write_artifact(path: &Path, artifact: &Artifact) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Impossible de créer {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    if is_json(path) {
        serde_json::to_writer(&mut writer, artifact)
            .with_context(|| format!("Erreur de sérialisation JSON vers {}", path.display()))?;
    } else {
        bincode::serialize_into(&mut writer, artifact)
            .with_context(|| format!("Erreur de sérialisation bincode vers {}", path.display()))?;
    }
    writer.flush()?;
    log::info!("{} tableau(x) écrit(s) dans {}", artifact.array_count(), path.display());
    Ok(())
}

/// Read back an artifact written by [`write_artifact`].
#[cfg(test)]
pub(crate) fn read_artifact(path: &Path) -> Result<Artifact> {
    let reader = std::io::BufReader::new(File::open(path)?);
    if is_json(path) {
        Ok(serde_json::from_reader(reader)?)
    } else {
        Ok(bincode::deserialize_from(reader)?)
    }
}
