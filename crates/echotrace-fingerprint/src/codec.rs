// SPDX-License-Identifier: GPL-3.0-or-later

//! Fingerprint codec boundary.
//!
//! Songs carry their fingerprint as opaque text produced by the fingerprinting
//! library. [`FingerprintDecoder`] is the single seam through which that text
//! becomes a sequence of sub-fingerprints; the similarity engine never looks
//! at the encoded form.
//!
//! [`ChromaprintCodec`] hands the text to libchromaprint's own compressed
//! fingerprint codec.

use chromaprint::{Chromaprint, CHROMAPRINT_ALGORITHM_DEFAULT};
use tracing::trace;

use crate::fingerprint::{EncodedFingerprint, Fingerprint};
use crate::{FingerprintError, Result};

/// Algorithm tag Chromaprint uses by default (`CHROMAPRINT_ALGORITHM_TEST2`).
pub const DEFAULT_ALGORITHM: u8 = CHROMAPRINT_ALGORITHM_DEFAULT as u8;

/// Turns an opaque encoded fingerprint into its sub-fingerprints.
///
/// A decode error is a per-song failure; callers skip the song and carry on.
pub trait FingerprintDecoder: Send + Sync {
    fn decode(&self, encoded: &EncodedFingerprint) -> Result<Fingerprint>;
}

/// Codec for Chromaprint's compressed text fingerprints.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromaprintCodec;

impl ChromaprintCodec {
    pub fn new() -> Self {
        Self
    }

    /// Decode fingerprint text without validating the alphabet first.
    pub fn decode_str(&self, text: &str) -> Result<Fingerprint> {
        let (raw, algorithm) = Chromaprint::decode(text.trim().as_bytes(), true).ok_or_else(|| {
            FingerprintError::Decode("chromaprint could not decode the fingerprint".to_string())
        })?;
        let algorithm = u8::try_from(algorithm).map_err(|_| {
            FingerprintError::Decode(format!("unknown fingerprint algorithm {algorithm}"))
        })?;

        // sub-fingerprints are unsigned; the library hands them out as c_int
        let frames = raw.into_iter().map(|frame| frame as u32).collect();
        let fingerprint = Fingerprint::new(algorithm, frames);
        trace!(
            target: "fingerprint",
            algorithm = fingerprint.algorithm(),
            frames = fingerprint.len(),
            "decoded fingerprint"
        );
        Ok(fingerprint)
    }

    /// Encode a fingerprint into the compressed text form.
    pub fn encode(&self, fingerprint: &Fingerprint) -> Result<EncodedFingerprint> {
        let raw: Vec<i32> = fingerprint.frames().iter().map(|&frame| frame as i32).collect();
        let bytes = Chromaprint::encode(&raw, i32::from(fingerprint.algorithm()), true)
            .ok_or_else(|| {
                FingerprintError::InvalidFingerprint("chromaprint could not encode the fingerprint".to_string())
            })?;
        let text = String::from_utf8(bytes)
            .map_err(|e| FingerprintError::InvalidFingerprint(e.to_string()))?;
        Ok(EncodedFingerprint::new(text))
    }
}

impl FingerprintDecoder for ChromaprintCodec {
    fn decode(&self, encoded: &EncodedFingerprint) -> Result<Fingerprint> {
        encoded.validate()?;
        self.decode_str(encoded.as_str())
    }
}
