// SPDX-License-Identifier: GPL-3.0-or-later

//! Fingerprints for audio files that are not in the library.
//!
//! Ad hoc file comparison needs a fingerprint for each file. Audio is decoded
//! with symphonia, down-mixed to mono 16-bit PCM and handed to the Chromaprint
//! library, which returns the compressed text fingerprint. Nothing here
//! implements fingerprinting itself.
//!
//! # Supported Formats
//!
//! - FLAC
//! - MP3
//!
//! ```no_run
//! use echotrace_fingerprint::generator::FingerprintGenerator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let generator = FingerprintGenerator::new();
//! let encoded = generator.generate_from_file("song.flac").await?;
//! println!("fingerprint: {}", encoded);
//! # Ok(())
//! # }
//! ```

use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;

use chromaprint::Chromaprint;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use tracing::{debug, instrument};

use crate::{EncodedFingerprint, FingerprintError, Result};

/// Maximum duration fed to the fingerprinter (in seconds).
const MAX_FINGERPRINT_DURATION_SECS: u32 = 120;

/// Fallback sample rate when the container does not report one.
const SAMPLE_RATE: u32 = 44100;

/// Audio samples: mono, 16-bit PCM at a given sample rate.
struct AudioSamples {
    samples: Vec<i16>,
    sample_rate: u32,
    duration_secs: u32,
}

impl AudioSamples {
    fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        let duration_secs = if samples.is_empty() {
            0
        } else {
            (samples.len() as u32 / sample_rate.max(1)).max(1)
        };

        Self {
            samples,
            sample_rate,
            duration_secs,
        }
    }

    /// Keep only the first 120 seconds.
    fn limit_to_fingerprint_duration(&mut self) {
        let max_samples = max_fingerprint_samples(self.sample_rate);
        if self.samples.len() > max_samples {
            debug!(
                original_len = self.samples.len(),
                max_samples, "truncating audio samples to fingerprint duration limit"
            );
            self.samples.truncate(max_samples);
            self.duration_secs = MAX_FINGERPRINT_DURATION_SECS;
        }
    }
}

/// Number of mono samples covering the fingerprinted duration at `sample_rate`.
fn max_fingerprint_samples(sample_rate: u32) -> usize {
    sample_rate.max(1) as usize * MAX_FINGERPRINT_DURATION_SECS as usize
}

/// Produces encoded fingerprints for audio files.
#[derive(Debug, Clone, Copy, Default)]
pub struct FingerprintGenerator;

impl FingerprintGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Fingerprint an audio file.
    ///
    /// Decoding runs on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, its format is not
    /// supported, decoding fails, or the fingerprinter rejects the audio.
    #[instrument(skip_all, fields(file = %path.as_ref().display()))]
    pub async fn generate_from_file<P: AsRef<Path>>(&self, path: P) -> Result<EncodedFingerprint> {
        let path = path.as_ref();

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|s| s.to_lowercase())
            .ok_or_else(|| {
                FingerprintError::AudioProcessing("Cannot determine audio format".to_string())
            })?;

        if !matches!(extension.as_str(), "flac" | "mp3") {
            return Err(FingerprintError::AudioProcessing(format!(
                "Unsupported audio format: {}",
                extension
            )));
        }

        debug!("opening audio file for fingerprinting");
        let file = File::open(path).map_err(|e| {
            FingerprintError::AudioProcessing(format!("Failed to open audio file: {}", e))
        })?;

        tokio::task::spawn_blocking(move || {
            let samples = decode_audio(file, &extension)?;
            fingerprint_samples(samples)
        })
        .await
        .map_err(|e| FingerprintError::AudioProcessing(format!("Decoder task failed: {}", e)))?
    }
}

/// Decode the default track of `file` into mono PCM samples.
fn decode_audio(file: File, extension: &str) -> Result<AudioSamples> {
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(extension);

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| {
            FingerprintError::AudioProcessing(format!("Failed to probe {} stream: {}", extension, e))
        })?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| FingerprintError::AudioProcessing("No audio tracks found".to_string()))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| {
            FingerprintError::AudioProcessing(format!(
                "Failed to create decoder for {}: {}",
                extension, e
            ))
        })?;

    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(SAMPLE_RATE);
    let mut samples: Vec<i16> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => {
                return Err(FingerprintError::AudioProcessing(format!(
                    "Error reading {} packet: {}",
                    extension, e
                )))
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder.decode(&packet).map_err(|e| {
            FingerprintError::AudioProcessing(format!("Failed to decode {} frame: {}", extension, e))
        })?;

        let rate = match decoded {
            AudioBufferRef::F32(buf) => mix_down(&*buf, &mut samples, f64::from),
            AudioBufferRef::S16(buf) => {
                mix_down(&*buf, &mut samples, |s| f64::from(s) / f64::from(i16::MAX))
            }
            AudioBufferRef::S32(buf) => {
                mix_down(&*buf, &mut samples, |s| f64::from(s) / f64::from(i32::MAX))
            }
            _ => {
                return Err(FingerprintError::AudioProcessing(format!(
                    "Unsupported sample format for {}",
                    extension
                )))
            }
        };
        if rate > 0 {
            sample_rate = rate;
        }

        // the fingerprinter only looks at the first two minutes
        if samples.len() >= max_fingerprint_samples(sample_rate) {
            break;
        }
    }

    let mut audio = AudioSamples::new(samples, sample_rate);
    audio.limit_to_fingerprint_duration();
    Ok(audio)
}

/// Average all channels of `buf` into `out` and return the buffer's sample rate.
fn mix_down<S, F>(buf: &AudioBuffer<S>, out: &mut Vec<i16>, normalize: F) -> u32
where
    S: Sample,
    F: Fn(S) -> f64,
{
    let spec = buf.spec();
    let channels = spec.channels.count().max(1);

    for frame_idx in 0..buf.frames() {
        let mut mixed = 0.0f64;
        for ch in 0..channels {
            mixed += normalize(buf.chan(ch)[frame_idx]);
        }
        let clipped = (mixed / channels as f64).clamp(-1.0, 1.0);
        out.push((clipped * f64::from(i16::MAX)) as i16);
    }

    spec.rate
}

fn fingerprint_samples(mut samples: AudioSamples) -> Result<EncodedFingerprint> {
    if samples.samples.is_empty() {
        return Err(FingerprintError::AudioProcessing(
            "No audio samples available".to_string(),
        ));
    }

    samples.limit_to_fingerprint_duration();

    debug!(
        sample_count = samples.samples.len(),
        duration_secs = samples.duration_secs,
        sample_rate = samples.sample_rate,
        "generating fingerprint from audio samples"
    );

    let mut ctx = Chromaprint::new();

    if !ctx.start(samples.sample_rate as i32, 1) {
        return Err(FingerprintError::AudioProcessing(
            "Failed to start Chromaprint".to_string(),
        ));
    }

    if !ctx.feed(&samples.samples) {
        return Err(FingerprintError::AudioProcessing(
            "Failed to feed samples to Chromaprint".to_string(),
        ));
    }

    if !ctx.finish() {
        return Err(FingerprintError::AudioProcessing(
            "Chromaprint finalize failed".to_string(),
        ));
    }

    let hash = ctx.fingerprint().ok_or_else(|| {
        FingerprintError::AudioProcessing("Chromaprint did not return a fingerprint".to_string())
    })?;

    Ok(EncodedFingerprint::new(hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_samples_duration() {
        let audio = AudioSamples::new(vec![1i16, 2, 3], 44100);
        assert_eq!(audio.sample_rate, 44100);
        assert_eq!(audio.duration_secs, 1);

        let audio = AudioSamples::new(vec![0i16; 44100 * 60], 44100);
        assert_eq!(audio.duration_secs, 60);
    }

    #[test]
    fn test_audio_samples_limit_to_fingerprint_duration() {
        let mut audio = AudioSamples::new(vec![10i16; 22050 * 150], 22050);
        audio.limit_to_fingerprint_duration();

        assert_eq!(audio.samples.len(), 22050 * 120);
        assert_eq!(audio.duration_secs, 120);
    }

    #[test]
    fn test_audio_samples_no_limit_needed() {
        let mut audio = AudioSamples::new(vec![10i16; 44100 * 30], 44100);
        audio.limit_to_fingerprint_duration();
        assert_eq!(audio.samples.len(), 44100 * 30);
        assert_eq!(audio.duration_secs, 30);
    }

    #[test]
    fn test_decode_limit_is_two_minutes_of_mono_audio() {
        assert_eq!(max_fingerprint_samples(44100), 44100 * 120);
        assert_eq!(max_fingerprint_samples(22050), 22050 * 120);
        assert_eq!(max_fingerprint_samples(0), 120);

        let mut audio = AudioSamples::new(vec![1i16; max_fingerprint_samples(8000) + 1], 8000);
        audio.limit_to_fingerprint_duration();
        assert_eq!(audio.samples.len(), max_fingerprint_samples(8000));
    }

    #[test]
    fn test_empty_samples_are_rejected() {
        let err = fingerprint_samples(AudioSamples::new(vec![], 44100)).unwrap_err();
        assert!(err.to_string().contains("No audio samples"));
    }

    #[tokio::test]
    async fn test_unsupported_format_error() {
        let err = FingerprintGenerator::new()
            .generate_from_file("notes.txt")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported audio format"));
    }

    #[tokio::test]
    async fn test_missing_file_error() {
        let path = std::path::Path::new("nonexistent").join("song.flac");
        let err = FingerprintGenerator::new()
            .generate_from_file(&path)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to open"));
    }

    #[tokio::test]
    async fn test_extensionless_path_error() {
        let err = FingerprintGenerator::new()
            .generate_from_file("README")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Cannot determine audio format"));
    }
}
