// SPDX-License-Identifier: GPL-3.0-or-later

use serde::{Deserialize, Serialize};

/// Number of bits in one sub-fingerprint.
pub const BITS_PER_FRAME: u32 = 32;

/// Opaque, library-encoded fingerprint as stored next to a song.
///
/// The text is Chromaprint's compressed representation in URL-safe base64
/// without padding. It is only ever compared byte-for-byte or handed to a
/// [`crate::FingerprintDecoder`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct EncodedFingerprint {
    pub hash: String,
}

impl EncodedFingerprint {
    pub fn new(hash: impl Into<String>) -> Self {
        Self { hash: hash.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.hash
    }

    /// Validate the fingerprint text.
    ///
    /// A valid fingerprint is non-empty and uses only the URL-safe base64
    /// alphabet. Padding is never emitted by the encoder, so `=` is rejected.
    pub fn validate(&self) -> crate::Result<()> {
        if self.hash.is_empty() {
            return Err(crate::FingerprintError::InvalidFingerprint(
                "fingerprint hash is empty".to_string(),
            ));
        }

        if self.hash.contains('=') {
            return Err(crate::FingerprintError::InvalidFingerprint(
                "padding character '=' is not used by encoded fingerprints".to_string(),
            ));
        }

        if !self
            .hash
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(crate::FingerprintError::InvalidFingerprint(
                "fingerprint contains invalid characters".to_string(),
            ));
        }

        Ok(())
    }
}

impl std::fmt::Display for EncodedFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.hash)
    }
}

/// Decoded fingerprint: an ordered sequence of 32-bit sub-fingerprints.
///
/// Each frame summarizes a short, fixed-duration window of audio. The frames
/// are never mutated after decoding; shifted comparisons are expressed as
/// index offsets by [`crate::alignment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    algorithm: u8,
    frames: Vec<u32>,
}

impl Fingerprint {
    pub fn new(algorithm: u8, frames: Vec<u32>) -> Self {
        Self { algorithm, frames }
    }

    /// Algorithm version tag reported by the codec.
    pub fn algorithm(&self) -> u8 {
        self.algorithm
    }

    pub fn frames(&self) -> &[u32] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl From<Vec<u32>> for Fingerprint {
    fn from(frames: Vec<u32>) -> Self {
        Self::new(crate::codec::DEFAULT_ALGORITHM, frames)
    }
}
