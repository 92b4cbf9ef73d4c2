mod cli;
mod output;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use ms_audio::extract::Extractor;
use ms_core::config::ExtractionConfig;

fn main() -> Result<()> {
    // 1. Parser CLI
    let cli = cli::Cli::parse();

    // 2. Initialiser le logging
    env_logger::Builder::new()
        .filter_level(cli.log_level.parse().unwrap_or(log::LevelFilter::Warn))
        .init();

    // 3. Charger la config, puis appliquer les overrides CLI
    let mut config = resolve_config(&cli)?;
    cli.apply_overrides(&mut config);

    run(&cli.infile, &cli.outfile, config)
}

/// Extract `infile` with `config` and write the artifact to `outfile`.
fn run(infile: &Path, outfile: &Path, mut config: ExtractionConfig) -> Result<()> {
    // phon et sone impliquent la préservation d'énergie ; on l'inscrit dans les métadonnées.
    config.preserve_energy = config.effective_preserve_energy();

    let extractor = Extractor::new(config).context("Configuration invalide")?;
    let extracted = extractor
        .extract_file(infile)
        .with_context(|| format!("Échec de l'extraction de {}", infile.display()))?;
    let artifact = output::Artifact::from_output(extracted, extractor.config().clone());
    output::write_artifact(outfile, &artifact)
}

fn resolve_config(cli: &cli::Cli) -> Result<ExtractionConfig> {
    if cli.config.exists() {
        ms_core::config::load_config(&cli.config)
    } else {
        log::info!(
            "Pas de fichier {} : configuration par défaut",
            cli.config.display()
        );
        Ok(ExtractionConfig::default())
    }
}
