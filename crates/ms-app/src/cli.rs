use std::path::PathBuf;

use clap::Parser;
use ms_core::config::{ChannelPolicy, ExtractionConfig, FilterShape, FreqScale, MagScaleKind};
use ms_core::timestamps::TimesMode;

/// melspect — Extraction de spectrogrammes mel/log (magnitudes log, phon ou sone).
#[derive(Parser, Debug)]
#[command(name = "melspect", version, about, long_about = None)]
pub struct Cli {
    /// Fichier audio d'entrée : WAV, ou .raw (f32 little-endian mono).
    pub infile: PathBuf,

    /// Fichier de sortie : JSON si l'extension est .json, bincode sinon.
    pub outfile: PathBuf,

    /// Fréquence d'échantillonnage attendue en Hz.
    #[arg(short = 'r', long)]
    pub sample_rate: Option<u32>,

    /// Trames de spectrogramme par seconde.
    #[arg(short = 'f', long)]
    pub frame_rate: Option<f64>,

    /// Longueurs de trame en échantillons, séparées par des virgules.
    #[arg(short = 'l', long, value_delimiter = ',')]
    pub frame_lengths: Option<Vec<usize>>,

    /// Traitement multi-canal : mix-before, mix-after, concat, split.
    #[arg(long, value_name = "TREATMENT")]
    pub channels: Option<ChannelPolicy>,

    /// Autoriser le mixage de plus de deux canaux (moyenne).
    #[arg(long, default_value_t = false)]
    pub generalized_mix: bool,

    /// Fenêtres causales : chaque trame n'utilise que le passé.
    #[arg(short = 'o', long, default_value_t = false)]
    pub online: bool,

    /// Échelle de fréquence : mel, log, linear (--bands ignoré pour linear).
    #[arg(short = 't', long)]
    pub freq_scale: Option<FreqScale>,

    /// Nombre de filtres.
    #[arg(short = 'b', long)]
    pub bands: Option<usize>,

    /// Fréquence minimale du filtre le plus bas en Hz.
    #[arg(short = 'm', long)]
    pub min_freq: Option<f64>,

    /// Fréquence maximale du filtre le plus haut en Hz.
    #[arg(short = 'M', long)]
    pub max_freq: Option<f64>,

    /// Forme des filtres : tri, hann.
    #[arg(long)]
    pub filter_shape: Option<FilterShape>,

    /// Échelle des magnitudes : linear, power, log, phon, sone.
    #[arg(short = 's', long)]
    pub mag_scale: Option<MagScaleKind>,

    /// Facteur d'étirement de log(shift + stretch * magnitude).
    #[arg(long)]
    pub log_stretch: Option<f64>,

    /// Décalage de log(shift + stretch * magnitude).
    #[arg(long, allow_negative_numbers = true)]
    pub log_shift: Option<f64>,

    /// Niveau pleine échelle en dB SPL (phon, sone).
    #[arg(long)]
    pub db_max: Option<f64>,

    /// Conserver les phases (spectres complexes).
    #[arg(long, default_value_t = false)]
    pub keep_phases: bool,

    /// Préserver l'énergie par bin (toujours actif pour phon et sone).
    #[arg(long, default_value_t = false)]
    pub preserve_energy: bool,

    /// Modèle de nom des matrices ; %(len)s est remplacé par la longueur de trame.
    #[arg(long)]
    pub featname: Option<String>,

    /// Ajouter un vecteur "times" d'horodatages.
    #[arg(long, default_value_t = false)]
    pub include_times: bool,

    /// Forme des horodatages : beginnings, centers, borders, borders2.
    #[arg(long)]
    pub times_mode: Option<TimesMode>,

    /// Fichier de configuration TOML. Défaut : config/default.toml.
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Niveau de log : error, warn, info, debug, trace.
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl Cli {
    /// Apply command-line values over a loaded configuration.
    ///
    /// Switches only ever enable their option; absent values keep the
    /// configuration file's choice.
    pub fn apply_overrides(&self, config: &mut ExtractionConfig) {
        macro_rules! set {
            ($($field:ident),+ $(,)?) => {
                $(
                    if let Some(v) = self.$field {
                        config.$field = v;
                    }
                )+
            };
        }
        macro_rules! enable {
            ($($field:ident),+ $(,)?) => {
                $(
                    if self.$field {
                        config.$field = true;
                    }
                )+
            };
        }
        set!(
            sample_rate,
            frame_rate,
            channels,
            freq_scale,
            bands,
            min_freq,
            max_freq,
            filter_shape,
            mag_scale,
            log_stretch,
            log_shift,
            db_max,
            times_mode,
        );
        if let Some(lengths) = &self.frame_lengths {
            config.frame_lengths.clone_from(lengths);
        }
        if let Some(name) = &self.featname {
            config.featname.clone_from(name);
        }
        enable!(
            generalized_mix,
            online,
            keep_phases,
            preserve_energy,
            include_times,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_options() {
        let cli = Cli::try_parse_from([
            "melspect", "in.wav", "out.json", "-r", "22050", "-f", "70", "-l", "1024,2048",
            "-t", "log", "-b", "40", "-m", "30", "-M", "8000", "-s", "sone", "-o",
        ])
        .unwrap();
        let mut config = ExtractionConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.sample_rate, 22050);
        assert!((config.frame_rate - 70.0).abs() < f64::EPSILON);
        assert_eq!(config.frame_lengths, vec![1024, 2048]);
        assert_eq!(config.freq_scale, FreqScale::Log);
        assert_eq!(config.bands, 40);
        assert_eq!(config.mag_scale, MagScaleKind::Sone);
        assert!(config.online);
        assert!(!config.keep_phases);
    }

    #[test]
    fn long_options_and_enums() {
        let cli = Cli::try_parse_from([
            "melspect",
            "in.raw",
            "out.bin",
            "--channels",
            "split",
            "--times-mode",
            "borders2",
            "--include-times",
            "--keep-phases",
            "--log-shift",
            "-0.5",
            "--featname",
            "spect",
        ])
        .unwrap();
        let mut config = ExtractionConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.channels, ChannelPolicy::Split);
        assert_eq!(config.times_mode, TimesMode::Borders2);
        assert!(config.include_times);
        assert!(config.keep_phases);
        assert!((config.log_shift + 0.5).abs() < f64::EPSILON);
        assert_eq!(config.featname, "spect");
    }

    #[test]
    fn unknown_choice_is_rejected() {
        assert!(Cli::try_parse_from(["melspect", "a.wav", "b.json", "-t", "bark"]).is_err());
        assert!(Cli::try_parse_from(["melspect", "a.wav", "b.json", "--channels", "mono"]).is_err());
    }

    #[test]
    fn absent_options_keep_config() {
        let cli = Cli::try_parse_from(["melspect", "a.wav", "b.json"]).unwrap();
        let mut config = ExtractionConfig {
            bands: 120,
            online: true,
            ..ExtractionConfig::default()
        };
        cli.apply_overrides(&mut config);
        assert_eq!(config.bands, 120);
        assert!(config.online);
    }
}
