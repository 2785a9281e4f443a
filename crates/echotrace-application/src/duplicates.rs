// SPDX-License-Identifier: GPL-3.0-or-later
//! Audio duplicate scan over the whole library.
//!
//! Songs are visited in ascending id order and aligned against every song
//! seen before them. Pairs above the store threshold become similarity
//! edges; pairs above the match threshold are reported as duplicates.
//! Songs below the start id only seed the index, they are assumed to have
//! been compared by an earlier run.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use echotrace_config::{MatchPolicy, SimilarityConfig};
use echotrace_domain::{DuplicateKind, SimilarityEdge, SongId, SongRecord};
use echotrace_fingerprint::{
    align_frames, Alignment, EncodedFingerprint, Fingerprint, FingerprintDecoder, ScoreThresholds,
};
use echotrace_infrastructure::{SimilarityStore, SongRepository};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::{ScanError, ScanResult};

/// Parameters of one scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Songs with a smaller id are indexed without being compared.
    pub start_id: SongId,
    pub match_threshold: f64,
    pub store_threshold: f64,
    pub max_offset: u32,
    /// Commit the store after this many stored edges.
    pub commit_every: usize,
    pub match_policy: MatchPolicy,
    pub parallel: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from(&SimilarityConfig::default())
    }
}

impl From<&SimilarityConfig> for ScanOptions {
    fn from(config: &SimilarityConfig) -> Self {
        Self {
            start_id: SongId(0),
            match_threshold: config.match_threshold,
            store_threshold: config.store_threshold,
            max_offset: config.scan_max_offset,
            commit_every: config.commit_every,
            match_policy: config.match_policy,
            parallel: config.parallel,
        }
    }
}

impl ScanOptions {
    pub fn with_start_id(mut self, start_id: SongId) -> Self {
        self.start_id = start_id;
        self
    }

    /// Pruning never cancels a pair that could still reach the store threshold.
    fn thresholds(&self) -> ScoreThresholds {
        ScoreThresholds::new(self.match_threshold, self.store_threshold)
    }
}

/// A pair that reached the match threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateMatch {
    pub existing: SongId,
    pub existing_path: String,
    pub candidate: SongId,
    pub candidate_path: String,
    pub offset: i32,
    pub score: f64,
    pub kind: DuplicateKind,
}

/// Summary of a finished scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub songs_seen: usize,
    pub warm_up: usize,
    pub songs_compared: usize,
    pub decode_failures: usize,
    pub comparisons: usize,
    pub edges_stored: usize,
    pub matches: Vec<DuplicateMatch>,
}

impl ScanReport {
    fn started() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            songs_seen: 0,
            warm_up: 0,
            songs_compared: 0,
            decode_failures: 0,
            comparisons: 0,
            edges_stored: 0,
            matches: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct IndexEntry {
    song: SongRecord,
    fingerprint: Arc<Fingerprint>,
}

/// Decoded fingerprints of every song already visited, in insertion order.
///
/// Keyed by the encoded fingerprint: inserting a song whose encoded
/// fingerprint is already present replaces that entry in place.
#[derive(Debug, Default)]
pub struct FingerprintIndex {
    entries: Vec<IndexEntry>,
    positions: HashMap<String, usize>,
}

impl FingerprintIndex {
    pub fn insert(&mut self, song: SongRecord, fingerprint: impl Into<Arc<Fingerprint>>) {
        let entry = IndexEntry {
            song,
            fingerprint: fingerprint.into(),
        };
        match self.positions.get(&entry.song.fingerprint) {
            Some(&pos) => self.entries[pos] = entry,
            None => {
                self.positions
                    .insert(entry.song.fingerprint.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn fingerprints(&self) -> Vec<Arc<Fingerprint>> {
        self.entries.iter().map(|e| Arc::clone(&e.fingerprint)).collect()
    }
}

/// Runs duplicate scans with a given fingerprint decoder.
pub struct DuplicateScanner<D> {
    decoder: D,
    options: ScanOptions,
}

impl<D: FingerprintDecoder> DuplicateScanner<D> {
    pub fn new(decoder: D, options: ScanOptions) -> Self {
        Self { decoder, options }
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Load the fingerprinted songs from `repo` and scan them.
    pub async fn scan_repository<R, S>(&self, repo: &R, store: &mut S) -> ScanResult<ScanReport>
    where
        R: SongRepository + ?Sized,
        S: SimilarityStore + ?Sized,
    {
        let corpus = repo.list_for_scan().await.map_err(ScanError::Corpus)?;
        self.scan(corpus, store).await
    }

    /// Scan `corpus`, writing similarity edges to `store`.
    ///
    /// Decode failures skip the song. Any store failure aborts the scan;
    /// edges committed before the failure stay committed.
    #[instrument(skip_all, fields(start_id = %self.options.start_id, songs = corpus.len()))]
    pub async fn scan<S>(&self, mut corpus: Vec<SongRecord>, store: &mut S) -> ScanResult<ScanReport>
    where
        S: SimilarityStore + ?Sized,
    {
        corpus.sort_by_key(|song| song.id);

        let options = &self.options;
        let commit_every = options.commit_every.max(1);

        let mut report = ScanReport::started();
        let mut index = FingerprintIndex::default();
        let mut uncommitted = 0usize;

        info!(target: "scan", policy = ?options.match_policy, parallel = options.parallel, "starting duplicate scan");

        for song in corpus {
            report.songs_seen += 1;

            let Some(fingerprint) = self.decode(&song).map(Arc::new) else {
                report.decode_failures += 1;
                continue;
            };

            if song.id < options.start_id {
                report.warm_up += 1;
                index.insert(song, fingerprint);
                continue;
            }

            report.songs_compared += 1;
            debug!(target: "scan", song_id = %song.id, indexed = index.len(), "comparing song");

            let alignments = self.align_against(&index, &fingerprint).await?;

            for (entry, alignment) in index.entries.iter().zip(alignments) {
                report.comparisons += 1;

                let Some(score) = alignment.score else {
                    debug!(target: "scan", other_id = %entry.song.id, song_id = %song.id, "different");
                    continue;
                };
                let offset = alignment.offset.unwrap_or(0);

                if score < options.store_threshold {
                    debug!(target: "scan", other_id = %entry.song.id, song_id = %song.id, offset, score, "different");
                    continue;
                }

                let edge = SimilarityEdge::new(entry.song.id, song.id, offset, score);
                store.add_similarity(&edge).await.map_err(ScanError::Store)?;
                report.edges_stored += 1;
                uncommitted += 1;
                if uncommitted >= commit_every {
                    store.commit().await.map_err(ScanError::Store)?;
                    uncommitted = 0;
                }
                info!(target: "scan", other_id = %entry.song.id, song_id = %song.id, offset, score, "stored similarity");

                if score >= options.match_threshold {
                    let found = classify(&entry.song, &song, offset, score);
                    report.matches.push(found);
                    if options.match_policy == MatchPolicy::FirstMatch {
                        break;
                    }
                }
            }

            index.insert(song, fingerprint);
        }

        store.commit().await.map_err(ScanError::Store)?;

        report.finished_at = Some(Utc::now());
        info!(
            target: "scan",
            songs = report.songs_seen,
            compared = report.songs_compared,
            skipped = report.decode_failures,
            edges = report.edges_stored,
            duplicates = report.matches.len(),
            "duplicate scan finished"
        );
        Ok(report)
    }

    /// Align `fingerprint` against the index on the blocking pool.
    ///
    /// Results follow index order. Sequential runs stop after the first
    /// alignment the walk would break on, parallel runs align everything.
    async fn align_against(
        &self,
        index: &FingerprintIndex,
        fingerprint: &Arc<Fingerprint>,
    ) -> ScanResult<Vec<Alignment>> {
        let indexed = index.fingerprints();
        let fingerprint = Arc::clone(fingerprint);
        let options = &self.options;
        let max_offset = options.max_offset;
        let thresholds = options.thresholds();
        let parallel = options.parallel;
        let stop_at = (options.match_policy == MatchPolicy::FirstMatch)
            .then(|| options.match_threshold.max(options.store_threshold));

        tokio::task::spawn_blocking(move || {
            if parallel {
                align_all(&indexed, &fingerprint, max_offset, thresholds)
            } else {
                align_until(&indexed, &fingerprint, max_offset, thresholds, stop_at)
            }
        })
        .await
        .map_err(|e| ScanError::Alignment(e.to_string()))
    }

    fn decode(&self, song: &SongRecord) -> Option<Fingerprint> {
        let encoded = EncodedFingerprint::new(song.fingerprint.clone());
        match self.decoder.decode(&encoded) {
            Ok(fingerprint) if fingerprint.is_empty() => {
                warn!(target: "scan", song_id = %song.id, path = %song.path, "empty fingerprint, skipping song");
                None
            }
            Ok(fingerprint) => Some(fingerprint),
            Err(e) => {
                warn!(target: "scan", song_id = %song.id, path = %song.path, error = %e, "error decoding fingerprint, skipping song");
                None
            }
        }
    }
}

/// Align on the rayon pool. Results keep index order.
fn align_all(
    indexed: &[Arc<Fingerprint>],
    fingerprint: &Fingerprint,
    max_offset: u32,
    thresholds: ScoreThresholds,
) -> Vec<Alignment> {
    indexed
        .par_iter()
        .map(|other| align_frames(other.frames(), fingerprint.frames(), max_offset, thresholds))
        .collect()
}

/// Align in index order, stopping after the first score reaching `stop_at`.
fn align_until(
    indexed: &[Arc<Fingerprint>],
    fingerprint: &Fingerprint,
    max_offset: u32,
    thresholds: ScoreThresholds,
    stop_at: Option<f64>,
) -> Vec<Alignment> {
    let mut alignments = Vec::with_capacity(indexed.len());
    for other in indexed {
        let alignment = align_frames(other.frames(), fingerprint.frames(), max_offset, thresholds);
        alignments.push(alignment);
        if stop_at.is_some_and(|threshold| alignment.reaches(threshold)) {
            break;
        }
    }
    alignments
}

fn classify(existing: &SongRecord, candidate: &SongRecord, offset: i32, score: f64) -> DuplicateMatch {
    let kind = DuplicateKind::classify(&existing.checksums, &candidate.checksums);
    let message = match kind {
        DuplicateKind::ExactFile => "exact file duplicate",
        DuplicateKind::SameAudio => "same audio, different tags",
        DuplicateKind::Similar => "similar audio",
    };
    info!(
        target: "scan",
        existing = %existing.id,
        existing_path = %existing.path,
        existing_completeness = ?existing.completeness,
        candidate = %candidate.id,
        candidate_path = %candidate.path,
        candidate_completeness = ?candidate.completeness,
        %kind,
        score,
        "{message}"
    );

    DuplicateMatch {
        existing: existing.id,
        existing_path: existing.path.clone(),
        candidate: candidate.id,
        candidate_path: candidate.path.clone(),
        offset,
        score,
        kind,
    }
}
