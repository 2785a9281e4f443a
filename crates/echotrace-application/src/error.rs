// SPDX-License-Identifier: GPL-3.0-or-later
use echotrace_fingerprint::FingerprintError;
use thiserror::Error;

/// Errors that abort a duplicate scan.
///
/// Per-song decode failures are not errors; the scan skips those songs.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The similarity store rejected a write or a commit
    #[error("similarity store failed: {0:#}")]
    Store(anyhow::Error),

    /// Loading the corpus failed
    #[error("failed to load songs: {0:#}")]
    Corpus(anyhow::Error),

    /// The blocking alignment task panicked or was cancelled
    #[error("alignment worker failed: {0}")]
    Alignment(String),
}

/// Errors from an ad hoc comparison of two songs or files.
#[derive(Debug, Error)]
pub enum CompareError {
    /// The similarity store rejected a write or a commit
    #[error("similarity store failed: {0:#}")]
    Store(anyhow::Error),

    /// Looking a song up in the library failed
    #[error("failed to look up song: {0:#}")]
    Lookup(anyhow::Error),

    /// An id or path did not resolve to exactly one song
    #[error("no match or more than one match for '{query}' ({matches} found)")]
    SongResolution { query: String, matches: usize },

    /// A song has no stored fingerprint
    #[error("song has no fingerprint: {0}")]
    MissingFingerprint(String),

    /// Fingerprint generation or decoding failed
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),
}

pub type ScanResult<T> = Result<T, ScanError>;
pub type CompareResult<T> = Result<T, CompareError>;
