// SPDX-License-Identifier: GPL-3.0-or-later
pub mod repositories;
pub mod sqlite_adapters;

use anyhow::Result;
use echotrace_config::AppConfig;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;

pub use repositories::{SimilarityStore, SongRepository};
pub use sqlite_adapters::{SqliteSimilarityStore, SqliteSongRepository};

/// Open the library database and bring its schema up to date.
pub async fn init_database(config: &AppConfig) -> Result<SqlitePool> {
    info!(target: "infrastructure", "initializing database");

    let db_url = normalize_database_url(&config.database.url)?;
    info!(target: "infrastructure", db_url = %db_url, "connecting to database");

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.pool_max_size)
        .connect(&db_url)
        .await?;

    info!(target: "infrastructure", "running migrations");
    sqlx::migrate!("../../migrations").run(&pool).await?;

    info!(target: "infrastructure", "database initialized");
    Ok(pool)
}

/// File-backed SQLite URLs become absolute, forward-slashed and create-on-open.
/// Their parent directory is created if missing.
fn normalize_database_url(url: &str) -> Result<String> {
    if !url.starts_with("sqlite://") || url.starts_with("sqlite://:memory:") {
        return Ok(url.to_string());
    }

    let db_path = url.trim_start_matches("sqlite://");
    let path = Path::new(db_path);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let absolute_path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let path_str = absolute_path.to_string_lossy().replace('\\', "/");
    Ok(format!("sqlite://{}?mode=rwc", path_str))
}
