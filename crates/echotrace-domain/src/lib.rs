// SPDX-License-Identifier: GPL-3.0-or-later
use serde::{Deserialize, Serialize};

// ============================================================================
// Value Objects & IDs
// ============================================================================

/// Library identifier of a song. Scans walk songs in ascending id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SongId(pub i64);

impl SongId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for SongId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SongId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content hashes recorded for a song file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongChecksums {
    /// SHA-256 of the whole file, tags included.
    pub file_hash: Option<String>,
    /// SHA-256 of the decoded audio track only.
    pub audio_hash: Option<String>,
}

impl SongChecksums {
    pub fn new(file_hash: Option<String>, audio_hash: Option<String>) -> Self {
        Self {
            file_hash,
            audio_hash,
        }
    }
}

// ============================================================================
// Enums
// ============================================================================

/// How two songs that matched on audio similarity relate to each other.
///
/// Only affects reporting; scores and stored edges are the same for all kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateKind {
    /// Byte-identical files.
    ExactFile,
    /// Same audio track, different tags.
    SameAudio,
    /// Audio is similar but the tracks differ.
    Similar,
}

impl DuplicateKind {
    /// Classify a matching pair by comparing hashes present on both sides.
    pub fn classify(a: &SongChecksums, b: &SongChecksums) -> Self {
        fn same(x: &Option<String>, y: &Option<String>) -> bool {
            matches!((x, y), (Some(x), Some(y)) if x == y)
        }

        if same(&a.file_hash, &b.file_hash) {
            Self::ExactFile
        } else if same(&a.audio_hash, &b.audio_hash) {
            Self::SameAudio
        } else {
            Self::Similar
        }
    }
}

impl std::fmt::Display for DuplicateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExactFile => write!(f, "exact-file"),
            Self::SameAudio => write!(f, "same-audio"),
            Self::Similar => write!(f, "similar"),
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A library song as seen by the similarity engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongRecord {
    pub id: SongId,
    pub path: String,
    /// Opaque encoded fingerprint.
    pub fingerprint: String,
    pub checksums: SongChecksums,
    /// Tag completeness score, used for reporting only.
    pub completeness: Option<i64>,
}

impl SongRecord {
    pub fn new(id: SongId, path: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            id,
            path: path.into(),
            fingerprint: fingerprint.into(),
            checksums: SongChecksums::default(),
            completeness: None,
        }
    }

    pub fn with_checksums(mut self, checksums: SongChecksums) -> Self {
        self.checksums = checksums;
        self
    }
}

/// Persisted similarity between two songs.
///
/// `song_a`/`song_b` follow comparison order; the relation itself is
/// undirected. `offset` is in fingerprint frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityEdge {
    pub song_a: SongId,
    pub song_b: SongId,
    pub offset: i32,
    pub score: f64,
}

impl SimilarityEdge {
    pub fn new(song_a: SongId, song_b: SongId, offset: i32, score: f64) -> Self {
        Self {
            song_a,
            song_b,
            offset,
            score,
        }
    }
}

// ============================================================================
// Domain Validation
// ============================================================================

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

pub trait Validate {
    fn validate(&self) -> Result<(), Vec<ValidationError>>;
}

impl Validate for SimilarityEdge {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if self.song_a == self.song_b {
            errors.push(ValidationError {
                field: "song_b",
                message: "a song cannot be similar to itself".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.score) {
            errors.push(ValidationError {
                field: "score",
                message: format!("score {} is outside [0, 1]", self.score),
            });
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
