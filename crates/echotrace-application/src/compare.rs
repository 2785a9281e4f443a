// SPDX-License-Identifier: GPL-3.0-or-later
//! Ad hoc comparison of two songs or two audio files.

use std::path::Path;

use echotrace_config::SimilarityConfig;
use echotrace_domain::{DuplicateKind, SimilarityEdge, SongChecksums, SongId, SongRecord};
use echotrace_fingerprint::{
    align_frames, EncodedFingerprint, FingerprintDecoder, FingerprintGenerator, ScoreThresholds,
};
use echotrace_infrastructure::{SimilarityStore, SongRepository};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::{CompareError, CompareResult};

/// One side of a comparison.
#[derive(Debug, Clone)]
pub struct ComparedSong {
    /// Library id, `None` for files outside the library.
    pub id: Option<SongId>,
    pub path: String,
    pub fingerprint: EncodedFingerprint,
    pub checksums: SongChecksums,
    pub completeness: Option<i64>,
}

impl ComparedSong {
    pub fn from_file(path: impl Into<String>, fingerprint: EncodedFingerprint) -> Self {
        Self {
            id: None,
            path: path.into(),
            fingerprint,
            checksums: SongChecksums::default(),
            completeness: None,
        }
    }
}

impl From<SongRecord> for ComparedSong {
    fn from(song: SongRecord) -> Self {
        Self {
            id: Some(song.id),
            path: song.path,
            fingerprint: EncodedFingerprint::new(song.fingerprint),
            checksums: song.checksums,
            completeness: song.completeness,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "verdict", content = "kind")]
pub enum Verdict {
    Duplicate(DuplicateKind),
    NotSimilar,
}

/// Result of comparing two songs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonOutcome {
    pub offset: Option<i32>,
    pub score: Option<f64>,
    #[serde(flatten)]
    pub verdict: Verdict,
    /// Whether a similarity edge was written.
    pub stored: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct CompareOptions {
    pub match_threshold: f64,
    pub store_threshold: f64,
    pub max_offset: u32,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self::from(&SimilarityConfig::default())
    }
}

impl From<&SimilarityConfig> for CompareOptions {
    fn from(config: &SimilarityConfig) -> Self {
        Self {
            match_threshold: config.match_threshold,
            store_threshold: config.store_threshold,
            max_offset: config.compare_max_offset,
        }
    }
}

/// Compares pairs of songs with a wider offset window than library scans.
pub struct SongComparator<D> {
    decoder: D,
    options: CompareOptions,
}

impl<D: FingerprintDecoder> SongComparator<D> {
    pub fn new(decoder: D, options: CompareOptions) -> Self {
        Self { decoder, options }
    }

    /// Score a pair without persisting anything.
    pub fn evaluate(&self, a: &ComparedSong, b: &ComparedSong) -> CompareResult<ComparisonOutcome> {
        let first = self.decode(a)?;
        let second = self.decode(b)?;

        let thresholds = ScoreThresholds::new(self.options.match_threshold, self.options.store_threshold);
        let alignment = align_frames(first.frames(), second.frames(), self.options.max_offset, thresholds);

        let verdict = if alignment.reaches(self.options.match_threshold) {
            Verdict::Duplicate(DuplicateKind::classify(&a.checksums, &b.checksums))
        } else {
            Verdict::NotSimilar
        };

        debug!(
            target: "compare",
            first = %a.path,
            second = %b.path,
            offset = ?alignment.offset,
            score = ?alignment.score,
            "compared"
        );

        Ok(ComparisonOutcome {
            offset: alignment.offset,
            score: alignment.score,
            verdict,
            stored: false,
        })
    }

    /// Score a pair and store the edge when both songs are distinct library
    /// songs and the score reaches the store threshold.
    #[instrument(skip_all, fields(first = %a.path, second = %b.path))]
    pub async fn compare<S>(
        &self,
        a: &ComparedSong,
        b: &ComparedSong,
        store: &mut S,
    ) -> CompareResult<ComparisonOutcome>
    where
        S: SimilarityStore + ?Sized,
    {
        let mut outcome = self.evaluate(a, b)?;

        if let (Some(id_a), Some(id_b), Some(score)) = (a.id, b.id, outcome.score) {
            if id_a != id_b && score >= self.options.store_threshold {
                let edge = SimilarityEdge::new(id_a, id_b, outcome.offset.unwrap_or(0), score);
                store.add_similarity(&edge).await.map_err(CompareError::Store)?;
                store.commit().await.map_err(CompareError::Store)?;
                outcome.stored = true;
            }
        }

        info!(
            target: "compare",
            first_completeness = ?a.completeness,
            second_completeness = ?b.completeness,
            offset = ?outcome.offset,
            score = ?outcome.score,
            verdict = ?outcome.verdict,
            stored = outcome.stored,
            "comparison finished"
        );
        Ok(outcome)
    }

    /// Fingerprint two audio files and compare them. Nothing is stored.
    pub async fn compare_files(
        &self,
        generator: &FingerprintGenerator,
        first: &Path,
        second: &Path,
    ) -> CompareResult<ComparisonOutcome> {
        let a = ComparedSong::from_file(
            first.display().to_string(),
            generator.generate_from_file(first).await?,
        );
        let b = ComparedSong::from_file(
            second.display().to_string(),
            generator.generate_from_file(second).await?,
        );
        let outcome = self.evaluate(&a, &b)?;
        info!(target: "compare", offset = ?outcome.offset, score = ?outcome.score, verdict = ?outcome.verdict, "file comparison finished");
        Ok(outcome)
    }

    fn decode(&self, song: &ComparedSong) -> CompareResult<echotrace_fingerprint::Fingerprint> {
        if song.fingerprint.as_str().is_empty() {
            return Err(CompareError::MissingFingerprint(song.path.clone()));
        }
        Ok(self.decoder.decode(&song.fingerprint)?)
    }
}

/// Resolve a command-line song reference.
///
/// An integer is a song id. Otherwise an absolute path must match exactly
/// and a relative one matches as a substring. Exactly one song must match.
pub async fn resolve_song<R>(repo: &R, query: &str) -> CompareResult<SongRecord>
where
    R: SongRepository + ?Sized,
{
    let mut found = match query.trim().parse::<i64>() {
        Ok(id) => repo
            .get_by_id(SongId(id))
            .await
            .map_err(CompareError::Lookup)?
            .into_iter()
            .collect::<Vec<_>>(),
        Err(_) => repo.find_by_path(query).await.map_err(CompareError::Lookup)?,
    };

    if found.len() != 1 {
        return Err(CompareError::SongResolution {
            query: query.to_string(),
            matches: found.len(),
        });
    }
    Ok(found.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use echotrace_fingerprint::{ChromaprintCodec, Fingerprint, FingerprintError};

    #[derive(Default)]
    struct RecordingStore {
        edges: Vec<SimilarityEdge>,
        commits: usize,
    }

    #[async_trait::async_trait]
    impl SimilarityStore for RecordingStore {
        async fn add_similarity(&mut self, edge: &SimilarityEdge) -> anyhow::Result<()> {
            self.edges.push(edge.clone());
            Ok(())
        }

        async fn commit(&mut self) -> anyhow::Result<()> {
            self.commits += 1;
            Ok(())
        }
    }

    struct MemoryRepository(Vec<SongRecord>);

    #[async_trait::async_trait]
    impl SongRepository for MemoryRepository {
        async fn list_for_scan(&self) -> anyhow::Result<Vec<SongRecord>> {
            Ok(self.0.clone())
        }

        async fn get_by_id(&self, id: SongId) -> anyhow::Result<Option<SongRecord>> {
            Ok(self.0.iter().find(|s| s.id == id).cloned())
        }

        async fn find_by_path(&self, path: &str) -> anyhow::Result<Vec<SongRecord>> {
            let absolute = Path::new(path).is_absolute();
            Ok(self
                .0
                .iter()
                .filter(|s| if absolute { s.path == path } else { s.path.contains(path) })
                .cloned()
                .collect())
        }

        async fn list_with_audio_hash(&self) -> anyhow::Result<Vec<SongRecord>> {
            Ok(Vec::new())
        }
    }

    fn encode(frames: Vec<u32>) -> String {
        ChromaprintCodec::new()
            .encode(&Fingerprint::from(frames))
            .unwrap()
            .hash
    }

    fn frames(len: u32) -> Vec<u32> {
        noise(len, 3)
    }

    fn noise(len: u32, seed: u32) -> Vec<u32> {
        (0..len)
            .map(|i| {
                let mut x = i.wrapping_add(seed.wrapping_mul(0x9E37_79B9));
                x ^= x >> 16;
                x = x.wrapping_mul(0x7FEB_352D);
                x ^= x >> 15;
                x = x.wrapping_mul(0x846C_A68B);
                x ^= x >> 16;
                x
            })
            .collect()
    }

    fn comparator() -> SongComparator<ChromaprintCodec> {
        SongComparator::new(ChromaprintCodec::new(), CompareOptions::default())
    }

    #[test]
    fn default_window_is_wider_than_scans() {
        assert_eq!(CompareOptions::default().max_offset, 120);
    }

    #[tokio::test]
    async fn library_songs_are_stored_when_similar() {
        let fp = encode(frames(60));
        let a = ComparedSong::from(SongRecord::new(SongId(4), "/m/a.flac", fp.clone()));
        let b = ComparedSong::from(SongRecord::new(SongId(9), "/m/b.flac", fp));
        let mut store = RecordingStore::default();

        let outcome = comparator().compare(&a, &b, &mut store).await.unwrap();

        assert_eq!(outcome.score, Some(1.0));
        assert_eq!(outcome.offset, Some(0));
        assert_eq!(outcome.verdict, Verdict::Duplicate(DuplicateKind::Similar));
        assert!(outcome.stored);
        assert_eq!(store.edges, vec![SimilarityEdge::new(SongId(4), SongId(9), 0, 1.0)]);
        assert_eq!(store.commits, 1);
    }

    #[tokio::test]
    async fn offsets_beyond_scan_window_are_found() {
        let base = noise(200, 5);
        let mut padded = vec![0u32; 90];
        padded.extend_from_slice(&base);

        let a = ComparedSong::from(SongRecord::new(SongId(1), "/m/a.flac", encode(padded)));
        let b = ComparedSong::from(SongRecord::new(SongId(2), "/m/b.flac", encode(base)));
        let mut store = RecordingStore::default();

        let outcome = comparator().compare(&a, &b, &mut store).await.unwrap();
        assert_eq!(outcome.offset, Some(-90));
        assert_eq!(outcome.score, Some(1.0));
    }

    #[tokio::test]
    async fn files_without_ids_are_never_stored() {
        let fp = EncodedFingerprint::new(encode(frames(60)));
        let a = ComparedSong::from_file("a.mp3", fp.clone());
        let b = ComparedSong::from_file("b.mp3", fp);
        let mut store = RecordingStore::default();

        let outcome = comparator().compare(&a, &b, &mut store).await.unwrap();
        assert_eq!(outcome.score, Some(1.0));
        assert!(!outcome.stored);
        assert!(store.edges.is_empty());
    }

    #[tokio::test]
    async fn dissimilar_songs_are_not_similar() {
        let base = frames(60);
        let inverted: Vec<u32> = base.iter().map(|f| !f).collect();
        let a = ComparedSong::from(SongRecord::new(SongId(1), "/m/a.flac", encode(base)));
        let b = ComparedSong::from(SongRecord::new(SongId(2), "/m/b.flac", encode(inverted)));
        let mut store = RecordingStore::default();

        let outcome = comparator().compare(&a, &b, &mut store).await.unwrap();
        assert_eq!(outcome.verdict, Verdict::NotSimilar);
        assert!(!outcome.stored);
    }

    #[tokio::test]
    async fn scores_between_thresholds_are_stored_but_not_duplicates() {
        let base = frames(64);
        // 20 of 64 frames disagree on every bit: 44 / 64 = 0.6875
        let partly_inverted: Vec<u32> = base
            .iter()
            .enumerate()
            .map(|(i, f)| if i < 20 { !f } else { *f })
            .collect();
        let a = ComparedSong::from(SongRecord::new(SongId(1), "/m/a.flac", encode(base)));
        let b = ComparedSong::from(SongRecord::new(SongId(2), "/m/b.flac", encode(partly_inverted)));
        let mut store = RecordingStore::default();

        let outcome = comparator().compare(&a, &b, &mut store).await.unwrap();

        assert_eq!(outcome.offset, Some(0));
        assert_eq!(outcome.score, Some(0.6875));
        assert_eq!(outcome.verdict, Verdict::NotSimilar);
        assert!(outcome.stored);
        assert_eq!(store.edges, vec![SimilarityEdge::new(SongId(1), SongId(2), 0, 0.6875)]);
        assert_eq!(store.commits, 1);
    }

    #[tokio::test]
    async fn comparing_a_song_with_itself_stores_nothing() {
        let song = ComparedSong::from(SongRecord::new(SongId(7), "/m/a.flac", encode(frames(60))));
        let mut store = RecordingStore::default();

        let outcome = comparator().compare(&song, &song.clone(), &mut store).await.unwrap();

        assert_eq!(outcome.score, Some(1.0));
        assert_eq!(outcome.verdict, Verdict::Duplicate(DuplicateKind::Similar));
        assert!(!outcome.stored);
        assert!(store.edges.is_empty());
        assert_eq!(store.commits, 0);
    }

    #[test]
    fn missing_and_malformed_fingerprints_are_errors() {
        let good = ComparedSong::from(SongRecord::new(SongId(1), "/m/a.flac", encode(frames(10))));
        let missing = ComparedSong::from(SongRecord::new(SongId(2), "/m/b.flac", ""));
        let broken = ComparedSong::from(SongRecord::new(SongId(3), "/m/c.flac", "AQA"));

        assert!(matches!(
            comparator().evaluate(&good, &missing),
            Err(CompareError::MissingFingerprint(path)) if path == "/m/b.flac"
        ));
        assert!(matches!(
            comparator().evaluate(&good, &broken),
            Err(CompareError::Fingerprint(FingerprintError::Decode(_)))
        ));
    }

    #[test]
    fn outcome_serializes_verdict_and_kind() {
        let outcome = ComparisonOutcome {
            offset: Some(2),
            score: Some(0.9),
            verdict: Verdict::Duplicate(DuplicateKind::ExactFile),
            stored: true,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["verdict"], "duplicate");
        assert_eq!(json["kind"], "exact-file");
        assert_eq!(json["offset"], 2);
    }

    #[tokio::test]
    async fn songs_resolve_by_id_or_path() {
        let repo = MemoryRepository(vec![
            SongRecord::new(SongId(1), "/music/a/one.flac", "x"),
            SongRecord::new(SongId(2), "/music/a/one.flac.old", "y"),
            SongRecord::new(SongId(3), "/music/b/two.flac", "z"),
        ]);

        assert_eq!(resolve_song(&repo, "3").await.unwrap().id, SongId(3));
        assert_eq!(
            resolve_song(&repo, "/music/a/one.flac").await.unwrap().id,
            SongId(1)
        );
        assert_eq!(resolve_song(&repo, "b/two").await.unwrap().id, SongId(3));
    }

    #[tokio::test]
    async fn ambiguous_or_unknown_references_are_rejected() {
        let repo = MemoryRepository(vec![
            SongRecord::new(SongId(1), "/music/a/one.flac", "x"),
            SongRecord::new(SongId(2), "/music/a/one.flac.old", "y"),
        ]);

        assert!(matches!(
            resolve_song(&repo, "a/one").await,
            Err(CompareError::SongResolution { matches: 2, .. })
        ));
        assert!(matches!(
            resolve_song(&repo, "42").await,
            Err(CompareError::SongResolution { matches: 0, .. })
        ));
    }
}
