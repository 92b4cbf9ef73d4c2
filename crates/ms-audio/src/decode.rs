use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use ms_core::error::SpectError;
use ms_core::samples::SampleBuffer;
use symphonia::core::audio::{Channels, SampleBuffer as DecodeBuffer};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Read an input signal and check its sample rate.
///
/// `.raw` files hold headerless little-endian `f32` mono samples and are
/// assumed to be at `expected_sr`. Anything else goes through symphonia
/// (WAV): mono files give a 1-D buffer, multi-channel files a
/// `channels × samples` buffer.
///
/// # Errors
/// I/O or decoding failure, or [`SpectError::SampleRateMismatch`] when the
/// file rate differs from `expected_sr`.
///
/// # Example
/// ```no_run
/// use ms_audio::decode::read_samples;
/// let samples = read_samples("speech.wav", 16000).unwrap();
/// println!("{} canal(aux)", samples.num_channels());
/// ```
pub fn read_samples(path: impl AsRef<Path>, expected_sr: u32) -> Result<SampleBuffer> {
    let path = path.as_ref();
    let is_raw = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("raw"));
    if is_raw {
        return read_raw(path);
    }

    let (interleaved, channels, sample_rate) = decode_interleaved(path)?;
    if sample_rate != expected_sr {
        return Err(SpectError::SampleRateMismatch {
            expected: expected_sr,
            actual: sample_rate,
        }
        .into());
    }
    if channels <= 1 {
        Ok(SampleBuffer::mono(interleaved))
    } else {
        Ok(SampleBuffer::from_interleaved(&interleaved, channels)?)
    }
}

/// Headerless little-endian `f32` mono samples. A trailing partial sample is
/// ignored.
fn read_raw(path: &Path) -> Result<SampleBuffer> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Impossible de lire {}", path.display()))?;
    let samples: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    log::info!("{} échantillons bruts lus depuis {}", samples.len(), path.display());
    Ok(SampleBuffer::mono(samples))
}

/// Decode the default track, keeping channels interleaved.
fn decode_interleaved(path: &Path) -> Result<(Vec<f32>, usize, u32)> {
    let file = File::open(path)
        .with_context(|| format!("Impossible d'ouvrir le fichier audio : {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("Format audio non reconnu")?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .context("Aucune piste audio par défaut")?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .context("Fréquence d'échantillonnage absente de l'en-tête")?;
    let mut channels = track.codec_params.channels.map_or(1, Channels::count);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Impossible de créer le décodeur audio")?;

    let track_id = track.id;
    let mut interleaved: Vec<f32> = Vec::new();
    let mut sample_buf: Option<DecodeBuffer<f32>> = None;
    let mut max_sample_frames: usize = 0;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                log::warn!("Erreur de lecture de paquet : {e}");
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("Erreur de décodage de trame : {e}");
                continue;
            }
        };

        let spec = *decoded.spec();
        channels = spec.channels.count();
        let num_frames = decoded.capacity();
        if sample_buf.is_none() || num_frames > max_sample_frames {
            sample_buf = Some(DecodeBuffer::<f32>::new(num_frames as u64, spec));
            max_sample_frames = num_frames;
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(buf.samples());
    }

    log::info!(
        "Décodé {} échantillons ({} canal(aux)) @ {} Hz depuis {}",
        interleaved.len() / channels.max(1),
        channels,
        sample_rate,
        path.display()
    );

    Ok((interleaved, channels, sample_rate))
}
