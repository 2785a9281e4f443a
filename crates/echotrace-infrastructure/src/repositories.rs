// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::Result;
use echotrace_domain::{SimilarityEdge, SongId, SongRecord};

// ============================================================================
// Repository Traits
// ============================================================================

/// Read access to library songs.
#[async_trait::async_trait]
pub trait SongRepository: Send + Sync {
    /// Every song that has a fingerprint, ascending by id.
    async fn list_for_scan(&self) -> Result<Vec<SongRecord>>;
    async fn get_by_id(&self, id: SongId) -> Result<Option<SongRecord>>;
    /// Absolute paths match exactly, anything else matches as a substring.
    async fn find_by_path(&self, path: &str) -> Result<Vec<SongRecord>>;
    /// Songs with a recorded audio-track hash, ascending by id.
    async fn list_with_audio_hash(&self) -> Result<Vec<SongRecord>>;
}

/// Write side for similarity edges.
///
/// Inserts become durable at the next `commit`.
#[async_trait::async_trait]
pub trait SimilarityStore: Send {
    async fn add_similarity(&mut self, edge: &SimilarityEdge) -> Result<()>;
    async fn commit(&mut self) -> Result<()>;
}
