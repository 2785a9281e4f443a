// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use echotrace_application::{
    find_checksum_duplicates, resolve_song, AppState, ChecksumGroup, ComparisonOutcome,
    DuplicateScanner, ScanOptions, ScanReport, SongComparator, Verdict,
};
use echotrace_config::{load as load_config, MatchPolicy};
use echotrace_domain::SongId;
use echotrace_fingerprint::{ChromaprintCodec, FingerprintGenerator};
use echotrace_infrastructure::{init_database, SqliteSimilarityStore, SqliteSongRepository};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "echotrace", version, about = "Find duplicate songs by audio fingerprint similarity")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan the library for songs with similar audio
    FindAudioDuplicates {
        /// Songs below this id are indexed but not compared again
        #[arg(long, default_value_t = 0, value_name = "ID")]
        from_song_id: i64,

        /// Keep comparing a song after its first match
        #[arg(long)]
        all_matches: bool,

        /// Compare each song against the index on all cores
        #[arg(long)]
        parallel: bool,

        /// Offset window in frames
        #[arg(long, value_name = "FRAMES", value_parser = clap::value_parser!(u32).range(1..))]
        max_offset: Option<u32>,
    },
    /// Compare two library songs given by id or path
    CompareSongs {
        first: String,
        second: String,

        #[arg(long, value_name = "FRAMES", value_parser = clap::value_parser!(u32).range(1..))]
        max_offset: Option<u32>,
    },
    /// Fingerprint and compare two audio files
    CompareFiles {
        first: PathBuf,
        second: PathBuf,

        #[arg(long, value_name = "FRAMES", value_parser = clap::value_parser!(u32).range(1..))]
        max_offset: Option<u32>,
    },
    /// List songs with identical audio checksums
    FindDuplicates,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.telemetry.log_level);

    let state = AppState::new(config);
    state.on_start();

    run(cli.command, cli.json, &state).await
}

async fn run(command: Command, json: bool, state: &AppState) -> Result<()> {
    match command {
        Command::FindAudioDuplicates {
            from_song_id,
            all_matches,
            parallel,
            max_offset,
        } => {
            let options = scan_options(state, from_song_id, all_matches, parallel, max_offset);
            let pool = init_database(&state.config).await?;
            let repo = SqliteSongRepository::new(pool.clone());
            let mut store = SqliteSimilarityStore::new(pool);

            let scanner = DuplicateScanner::new(ChromaprintCodec::new(), options);
            let report = scanner.scan_repository(&repo, &mut store).await?;
            emit(json, &report, print_scan_report)
        }
        Command::CompareSongs {
            first,
            second,
            max_offset,
        } => {
            let pool = init_database(&state.config).await?;
            let repo = SqliteSongRepository::new(pool.clone());
            let mut store = SqliteSimilarityStore::new(pool);

            let a = resolve_song(&repo, &first).await?;
            let b = resolve_song(&repo, &second).await?;
            info!(target: "cli", first = %a.id, second = %b.id, "comparing songs");

            let comparator = comparator(state, max_offset);
            let outcome = comparator.compare(&a.into(), &b.into(), &mut store).await?;
            emit(json, &outcome, print_outcome)
        }
        Command::CompareFiles {
            first,
            second,
            max_offset,
        } => {
            let comparator = comparator(state, max_offset);
            let outcome = comparator
                .compare_files(&FingerprintGenerator::new(), &first, &second)
                .await?;
            emit(json, &outcome, print_outcome)
        }
        Command::FindDuplicates => {
            let pool = init_database(&state.config).await?;
            let repo = SqliteSongRepository::new(pool);
            let groups = find_checksum_duplicates(&repo).await?;
            emit(json, &groups, |groups: &Vec<ChecksumGroup>| print_groups(groups))
        }
    }
}

fn scan_options(
    state: &AppState,
    from_song_id: i64,
    all_matches: bool,
    parallel: bool,
    max_offset: Option<u32>,
) -> ScanOptions {
    let mut options = state.scan_options().with_start_id(SongId::from(from_song_id));
    if all_matches {
        options.match_policy = MatchPolicy::AllMatches;
    }
    options.parallel |= parallel;
    if let Some(max_offset) = max_offset {
        options.max_offset = max_offset;
    }
    options
}

fn comparator(state: &AppState, max_offset: Option<u32>) -> SongComparator<ChromaprintCodec> {
    let mut options = state.compare_options();
    if let Some(max_offset) = max_offset {
        options.max_offset = max_offset;
    }
    SongComparator::new(ChromaprintCodec::new(), options)
}

fn emit<T: Serialize>(json: bool, value: &T, human: impl Fn(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

fn print_scan_report(report: &ScanReport) {
    for found in &report.matches {
        println!(
            "{} {} offset {} score {:.3} {}: {} <-> {}",
            found.existing,
            found.candidate,
            found.offset,
            found.score,
            found.kind,
            found.existing_path,
            found.candidate_path
        );
    }
    println!(
        "{} songs, {} compared, {} skipped, {} similarities stored, {} duplicates",
        report.songs_seen,
        report.songs_compared,
        report.decode_failures,
        report.edges_stored,
        report.matches.len()
    );
}

fn print_outcome(outcome: &ComparisonOutcome) {
    println!("{}", describe_outcome(outcome));
}

fn describe_outcome(outcome: &ComparisonOutcome) -> String {
    let score = outcome
        .score
        .map_or_else(|| "none".to_string(), |s| format!("{s:.3}"));
    let offset = outcome
        .offset
        .map_or_else(|| "none".to_string(), |o| o.to_string());
    let verdict = match outcome.verdict {
        Verdict::Duplicate(kind) => format!("duplicate ({kind})"),
        Verdict::NotSimilar => "different".to_string(),
    };
    let stored = if outcome.stored { ", stored" } else { "" };
    format!("offset {offset} score {score}: {verdict}{stored}")
}

fn print_groups(groups: &[ChecksumGroup]) {
    for group in groups {
        println!("{}", group.audio_hash);
        for song in &group.songs {
            println!("  {} {}", song.id, song.path);
        }
    }
}

fn init_tracing(default_level: &str) {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
