// SPDX-License-Identifier: GPL-3.0-or-later

//! Offset search between two fingerprints.
//!
//! Leading silence or padding shifts otherwise identical recordings by a few
//! frames. The aligner probes every shift in `(-max_offset, max_offset)` in
//! both directions and keeps the best score. A positive offset means `a` was
//! padded (`b` started later), a negative one means `b` was padded.

use crate::similarity::{score_padded, ScoreThresholds};

/// Best offset and score found for a pair of fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Alignment {
    pub offset: Option<i32>,
    pub score: Option<f64>,
}

impl Alignment {
    /// Whether a score is present and reaches `threshold`.
    pub fn reaches(&self, threshold: f64) -> bool {
        self.score.is_some_and(|score| score >= threshold)
    }
}

/// Align two frame sequences.
///
/// Returns `(None, None)` when either side is empty. Otherwise the offset is
/// always present (0 when no shift improved on the baseline), while the score
/// stays `None` if every probe was cancelled.
pub fn align_frames(a: &[u32], b: &[u32], max_offset: u32, thresholds: ScoreThresholds) -> Alignment {
    if a.is_empty() || b.is_empty() {
        return Alignment::default();
    }

    let max_offset = max_offset.min(i32::MAX as u32);
    let mut best_offset = 0i32;
    let mut best = score_padded(a, 0, b, 0, thresholds);

    let mut consider = |candidate: Option<f64>, offset: i32| {
        let Some(candidate) = candidate else {
            return;
        };
        if best.map_or(true, |current| candidate > current) {
            best = Some(candidate);
            best_offset = offset;
        }
    };

    for shift in 1..max_offset {
        let lead = shift as usize;
        consider(score_padded(a, lead, b, 0, thresholds), shift as i32);
    }
    for shift in 1..max_offset {
        let lead = shift as usize;
        consider(score_padded(a, 0, b, lead, thresholds), -(shift as i32));
    }

    Alignment {
        offset: Some(best_offset),
        score: best,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::score;

    fn frames(seed: u32, len: usize) -> Vec<u32> {
        let mut state = seed.max(1);
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state
            })
            .collect()
    }

    fn with_leading_zeros(n: usize, frames: &[u32]) -> Vec<u32> {
        let mut padded = vec![0u32; n];
        padded.extend_from_slice(frames);
        padded
    }

    fn align(a: &[u32], b: &[u32]) -> Alignment {
        align_frames(a, b, 60, ScoreThresholds::default())
    }

    #[test]
    fn empty_side_yields_nothing() {
        let a = frames(3, 20);
        assert_eq!(align(&a, &[]), Alignment { offset: None, score: None });
        assert_eq!(align(&[], &a), Alignment { offset: None, score: None });
    }

    #[test]
    fn identical_fingerprints_align_at_zero() {
        let a = frames(5, 150);
        let alignment = align(&a, &a.clone());
        assert_eq!(alignment.offset, Some(0));
        assert_eq!(alignment.score, Some(1.0));
        assert!(alignment.reaches(0.8));
    }

    #[test]
    fn padding_on_b_yields_positive_offset() {
        let x = frames(7, 200);
        for n in [1usize, 5, 17, 59] {
            let b = with_leading_zeros(n, &x);
            let alignment = align(&x, &b);
            assert_eq!(alignment.offset, Some(n as i32));
            assert_eq!(alignment.score, Some(1.0));

            let baseline = score(&x, &b, ScoreThresholds::default());
            assert!(baseline.map_or(true, |s| s <= alignment.score.unwrap()));
        }
    }

    #[test]
    fn padding_on_a_yields_negative_offset() {
        let x = frames(13, 200);
        for n in [2usize, 30] {
            let a = with_leading_zeros(n, &x);
            let alignment = align(&a, &x);
            assert_eq!(alignment.offset, Some(-(n as i32)));
            assert_eq!(alignment.score, Some(1.0));
        }
    }

    #[test]
    fn padding_outside_window_is_not_found() {
        let x = frames(17, 200);
        let b = with_leading_zeros(60, &x);
        let alignment = align(&x, &b);
        assert_ne!(alignment.offset, Some(60));
        assert_ne!(alignment.score, Some(1.0));
    }

    #[test]
    fn offset_never_leaves_the_window() {
        let thresholds = ScoreThresholds::unpruned(0.9);
        for (seed, max_offset) in [(21u32, 1u32), (22, 2), (23, 8), (24, 25)] {
            let a = frames(seed, 64);
            let b = frames(seed + 50, 70);
            let alignment = align_frames(&a, &b, max_offset, thresholds);
            let offset = alignment.offset.unwrap();
            assert!(offset.unsigned_abs() < max_offset.max(1));
            assert!(alignment.score.is_some());
        }
    }

    #[test]
    fn search_continues_past_cancelled_baseline() {
        // alternating frames: every odd shift compares complements
        let pattern = 0x1234_5678u32;
        let x: Vec<u32> = (0..100)
            .map(|i| if i % 2 == 0 { pattern } else { !pattern })
            .collect();
        let b = with_leading_zeros(1, &x);

        assert_eq!(score(&x, &b, ScoreThresholds::default()), None);

        let alignment = align_frames(&x, &b, 60, ScoreThresholds::default());
        assert_eq!(alignment.offset, Some(1));
        assert_eq!(alignment.score, Some(1.0));
    }

    #[test]
    fn unrelated_fingerprints_keep_offset_zero_without_score() {
        let a = frames(29, 100);
        let complement: Vec<u32> = a.iter().map(|f| !f).collect();
        let alignment = align_frames(&a, &complement, 4, ScoreThresholds::default());
        assert_eq!(alignment.offset, Some(0));
        assert_eq!(alignment.score, None);
        assert!(!alignment.reaches(0.0));
    }
}
