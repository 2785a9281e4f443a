// SPDX-License-Identifier: GPL-3.0-or-later
use std::collections::HashMap;

use anyhow::Result;
use echotrace_domain::SongRecord;
use echotrace_infrastructure::SongRepository;
use serde::Serialize;
use tracing::info;

/// Songs sharing one audio-track hash.
#[derive(Debug, Clone, Serialize)]
pub struct ChecksumGroup {
    pub audio_hash: String,
    pub songs: Vec<SongRecord>,
}

/// Find songs whose audio track is byte-identical.
pub async fn find_checksum_duplicates<R>(repo: &R) -> Result<Vec<ChecksumGroup>>
where
    R: SongRepository + ?Sized,
{
    let songs = repo.list_with_audio_hash().await?;
    let groups = group_by_audio_hash(songs);
    info!(target: "scan", groups = groups.len(), "checksum duplicate search finished");
    Ok(groups)
}

/// Groups with more than one member, ordered by their lowest song id.
pub fn group_by_audio_hash(mut songs: Vec<SongRecord>) -> Vec<ChecksumGroup> {
    songs.sort_by_key(|song| song.id);

    let mut groups: Vec<ChecksumGroup> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for song in songs {
        let Some(hash) = song.checksums.audio_hash.clone() else {
            continue;
        };
        match positions.get(&hash) {
            Some(&pos) => groups[pos].songs.push(song),
            None => {
                positions.insert(hash.clone(), groups.len());
                groups.push(ChecksumGroup {
                    audio_hash: hash,
                    songs: vec![song],
                });
            }
        }
    }

    groups.retain(|group| group.songs.len() > 1);
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use echotrace_domain::{SongChecksums, SongId};

    fn song(id: i64, audio: Option<&str>) -> SongRecord {
        SongRecord::new(SongId(id), format!("/m/{id}.mp3"), "")
            .with_checksums(SongChecksums::new(None, audio.map(str::to_string)))
    }

    #[test]
    fn groups_songs_by_audio_hash() {
        let groups = group_by_audio_hash(vec![
            song(5, Some("b")),
            song(1, Some("a")),
            song(2, Some("b")),
            song(3, Some("c")),
            song(4, Some("a")),
            song(6, None),
        ]);

        let summary: Vec<(String, Vec<i64>)> = groups
            .into_iter()
            .map(|g| (g.audio_hash, g.songs.iter().map(|s| s.id.get()).collect()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("a".to_string(), vec![1, 4]),
                ("b".to_string(), vec![2, 5]),
            ]
        );
    }

    #[test]
    fn unique_hashes_produce_no_groups() {
        assert!(group_by_audio_hash(vec![song(1, Some("a")), song(2, Some("b"))]).is_empty());
        assert!(group_by_audio_hash(Vec::new()).is_empty());
    }
}
