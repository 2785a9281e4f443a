// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::Path;

use anyhow::{anyhow, bail, Result};
use echotrace_domain::{SimilarityEdge, SongChecksums, SongId, SongRecord, Validate};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::debug;

use crate::repositories::{SimilarityStore, SongRepository};

const SONG_SELECT: &str = r#"
    SELECT
        songs.id AS id,
        songs.path AS path,
        COALESCE(fingerprints.fingerprint, '') AS fingerprint,
        checksums.sha256sum AS sha256sum,
        checksums.audio_sha256sum AS audio_sha256sum,
        properties.completeness AS completeness
    FROM songs
    LEFT JOIN fingerprints ON fingerprints.song_id = songs.id
    LEFT JOIN checksums ON checksums.song_id = songs.id
    LEFT JOIN properties ON properties.song_id = songs.id
"#;

/// SQLx-backed song repository
pub struct SqliteSongRepository {
    pool: SqlitePool,
}

impl SqliteSongRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, sql: &str, bind: Option<String>) -> Result<Vec<SongRecord>> {
        let mut query = sqlx::query(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            out.push(row_to_song(&r)?);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl SongRepository for SqliteSongRepository {
    async fn list_for_scan(&self) -> Result<Vec<SongRecord>> {
        debug!(target: "repository", "listing fingerprinted songs");
        let sql = format!(
            "{SONG_SELECT} WHERE fingerprints.fingerprint IS NOT NULL ORDER BY songs.id"
        );
        self.fetch(&sql, None).await
    }

    async fn get_by_id(&self, id: SongId) -> Result<Option<SongRecord>> {
        debug!(target: "repository", song_id = %id, "fetching song by id");
        let sql = format!("{SONG_SELECT} WHERE songs.id = ? LIMIT 1");
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_song(&r)).transpose()
    }

    async fn find_by_path(&self, path: &str) -> Result<Vec<SongRecord>> {
        debug!(target: "repository", path, "fetching songs by path");
        let sql = if Path::new(path).is_absolute() {
            format!("{SONG_SELECT} WHERE songs.path = ? ORDER BY songs.id")
        } else {
            format!("{SONG_SELECT} WHERE instr(songs.path, ?) > 0 ORDER BY songs.id")
        };
        self.fetch(&sql, Some(path.to_string())).await
    }

    async fn list_with_audio_hash(&self) -> Result<Vec<SongRecord>> {
        debug!(target: "repository", "listing songs with audio checksums");
        let sql = format!(
            "{SONG_SELECT} WHERE checksums.audio_sha256sum IS NOT NULL ORDER BY songs.id"
        );
        self.fetch(&sql, None).await
    }
}

/// Similarity edges written inside one open transaction per commit batch.
///
/// Dropping the store with uncommitted edges rolls them back.
pub struct SqliteSimilarityStore {
    pool: SqlitePool,
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteSimilarityStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, tx: None }
    }
}

#[async_trait::async_trait]
impl SimilarityStore for SqliteSimilarityStore {
    async fn add_similarity(&mut self, edge: &SimilarityEdge) -> Result<()> {
        debug!(
            target: "repository",
            song_a = %edge.song_a,
            song_b = %edge.song_b,
            offset = edge.offset,
            score = edge.score,
            "storing similarity"
        );
        if let Err(errors) = edge.validate() {
            let details: Vec<String> = errors
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            bail!("invalid similarity edge: {}", details.join(", "));
        }
        if self.tx.is_none() {
            self.tx = Some(self.pool.begin().await?);
        }
        let tx = self
            .tx
            .as_mut()
            .ok_or_else(|| anyhow!("similarity transaction is not open"))?;

        // edges are immutable once written
        let q = r#"
            INSERT INTO similarities (song_id1, song_id2, match_offset, similarity)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (song_id1, song_id2) DO NOTHING
        "#;
        sqlx::query(q)
            .bind(edge.song_a.get())
            .bind(edge.song_b.get())
            .bind(edge.offset)
            .bind(edge.score)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            debug!(target: "repository", "committing similarities");
            tx.commit().await?;
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

fn row_to_song(r: &SqliteRow) -> Result<SongRecord> {
    let id: i64 = r.try_get("id")?;
    let path: String = r.try_get("path")?;
    let fingerprint: String = r.try_get("fingerprint")?;
    let file_hash: Option<String> = r.try_get("sha256sum")?;
    let audio_hash: Option<String> = r.try_get("audio_sha256sum")?;
    let completeness: Option<i64> = r.try_get("completeness")?;

    Ok(SongRecord {
        id: SongId(id),
        path,
        fingerprint,
        checksums: SongChecksums::new(file_hash, audio_hash),
        completeness,
    })
}
