//! Identity matching against the trained appearance model.

use crate::features::chi_square;
use crate::model::AppearanceModel;
use crate::types::{MatchCandidate, CONFIDENCE_REJECT_THRESHOLD};

/// Map a chi-square distance to a bounded [0, 100] confidence.
///
/// Monotonically non-increasing in distance, floored at 0.
pub fn confidence_from_distance(distance: f32) -> f32 {
    (100.0 - distance.min(100.0)).max(0.0)
}

/// Strategy for matching a probe feature vector against a model.
pub trait Matcher {
    /// Returns the accepted best match, or `None` when the model is empty
    /// or the best match falls below the rejection threshold. A
    /// low-confidence face must never be attributed to an identity.
    fn compare(&self, probe: &[f32], model: &AppearanceModel) -> Option<MatchCandidate>;
}

/// Nearest-neighbor matcher over the model's reference set.
pub struct NearestMatcher {
    reject_below: f32,
}

impl NearestMatcher {
    pub fn new(reject_below: f32) -> Self {
        Self { reject_below }
    }
}

impl Default for NearestMatcher {
    fn default() -> Self {
        Self::new(CONFIDENCE_REJECT_THRESHOLD)
    }
}

impl Matcher for NearestMatcher {
    fn compare(&self, probe: &[f32], model: &AppearanceModel) -> Option<MatchCandidate> {
        let mut best: Option<(i64, f32)> = None;

        for entry in &model.entries {
            if entry.features.len() != probe.len() {
                // Parameter drift between model and probe; never match on it.
                continue;
            }
            let distance = chi_square(&entry.features, probe);
            let closer = match best {
                None => true,
                Some((_, d)) => distance < d,
            };
            if closer {
                best = Some((entry.label, distance));
            }
        }

        let (label, distance) = best?;
        let confidence = confidence_from_distance(distance);
        if confidence < self.reject_below {
            tracing::debug!(label, confidence, distance, "match rejected below threshold");
            return None;
        }

        Some(MatchCandidate {
            label,
            confidence,
            distance,
        })
    }
}
