// SPDX-License-Identifier: GPL-3.0-or-later

//! Bit similarity between two sub-fingerprint sequences.
//!
//! The score is the fraction of agreeing bits over the shorter sequence.
//! Scoring stops early once the remaining frames can no longer lift the
//! ratio to the pruning floor, in which case no score is returned.

use crate::fingerprint::BITS_PER_FRAME;

pub const DEFAULT_THRESHOLD: f64 = 0.9;
pub const DEFAULT_CANCEL_THRESHOLD: f64 = 0.55;

/// Thresholds controlling early cancellation of a comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreThresholds {
    pub threshold: f64,
    pub cancel_threshold: f64,
}

impl ScoreThresholds {
    /// Build thresholds, clamping `cancel_threshold` down to `threshold`.
    pub fn new(threshold: f64, cancel_threshold: f64) -> Self {
        Self {
            threshold,
            cancel_threshold: cancel_threshold.min(threshold),
        }
    }

    /// Thresholds that never cancel a comparison.
    pub fn unpruned(threshold: f64) -> Self {
        Self::new(threshold, 0.0)
    }

    fn pruning_floor(&self) -> f64 {
        self.cancel_threshold.min(self.threshold)
    }
}

impl Default for ScoreThresholds {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_CANCEL_THRESHOLD)
    }
}

/// Score two fingerprints at offset 0.
///
/// Returns `None` when either side is empty or when the comparison was
/// cancelled because it could not reach the pruning floor.
pub fn score(a: &[u32], b: &[u32], thresholds: ScoreThresholds) -> Option<f64> {
    score_padded(a, 0, b, 0, thresholds)
}

/// Score `a` and `b` as if each were prefixed with `lead_a`/`lead_b` zero frames.
pub(crate) fn score_padded(
    a: &[u32],
    lead_a: usize,
    b: &[u32],
    lead_b: usize,
    thresholds: ScoreThresholds,
) -> Option<f64> {
    if a.is_empty() || b.is_empty() {
        return None;
    }

    let frames = (a.len() + lead_a).min(b.len() + lead_b);
    let total_bits = u64::from(BITS_PER_FRAME) * frames as u64;
    let threshold_bits = (total_bits as f64 * thresholds.pruning_floor()).floor() as u64;

    let padded_a = std::iter::repeat(0u32).take(lead_a).chain(a.iter().copied());
    let padded_b = std::iter::repeat(0u32).take(lead_b).chain(b.iter().copied());

    let mut equal_bits = 0u64;
    let mut remaining = total_bits;
    for (x, y) in padded_a.zip(padded_b) {
        equal_bits += u64::from(BITS_PER_FRAME - (x ^ y).count_ones());
        remaining -= u64::from(BITS_PER_FRAME);
        if remaining > 0 && equal_bits + remaining < threshold_bits {
            return None;
        }
    }

    Some(equal_bits as f64 / total_bits as f64)
}
