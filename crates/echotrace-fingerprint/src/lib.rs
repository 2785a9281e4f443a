// SPDX-License-Identifier: GPL-3.0-or-later

//! Audio fingerprint comparison.
//!
//! This crate provides:
//! - Decoding of Chromaprint's compressed fingerprints into 32-bit frames
//! - Bit similarity scoring with early cancellation
//! - Bounded offset search between two fingerprints
//! - Fingerprint generation for audio files outside the library

pub mod alignment;
pub mod codec;
pub mod error;
pub mod fingerprint;
pub mod generator;
pub mod similarity;

pub use alignment::{align_frames, Alignment};
pub use codec::{ChromaprintCodec, FingerprintDecoder};
pub use error::{FingerprintError, Result};
pub use fingerprint::{EncodedFingerprint, Fingerprint};
pub use generator::FingerprintGenerator;
pub use similarity::{score, ScoreThresholds};
