// SPDX-License-Identifier: GPL-3.0-or-later
use echotrace_config::AppConfig;
pub mod checksums;
pub mod compare;
pub mod duplicates;
pub mod error;

pub use checksums::{find_checksum_duplicates, ChecksumGroup};
pub use compare::{resolve_song, CompareOptions, ComparedSong, ComparisonOutcome, SongComparator, Verdict};
pub use duplicates::{DuplicateMatch, DuplicateScanner, FingerprintIndex, ScanOptions, ScanReport};
pub use error::{CompareError, ScanError};

use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn on_start(&self) {
        info!(target: "application", "application state initialized");
    }

    /// Scan parameters from the `similarity` section, starting at id 0.
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions::from(&self.config.similarity)
    }

    pub fn compare_options(&self) -> CompareOptions {
        CompareOptions::from(&self.config.similarity)
    }
}
