use serde::{Deserialize, Serialize};

/// Side length of a normalized face crop. Every stored sample and every
/// probe crop is resized to this before feature extraction, so all
/// feature vectors are directly comparable.
pub const SAMPLE_SIZE: u32 = 200;

/// Confidence below this never produces a match candidate.
pub const CONFIDENCE_REJECT_THRESHOLD: f32 = 40.0;

/// Bounding box for a detected face within a frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    /// Cascade score for this window (higher = stronger detection).
    pub score: f64,
}

/// A labeled face crop used to build the appearance model.
///
/// `pixels` is a SAMPLE_SIZE × SAMPLE_SIZE grayscale buffer, row-major.
#[derive(Debug, Clone)]
pub struct TrainingSample {
    pub label: i64,
    pub pixels: Vec<u8>,
}

/// Best-matching identity for a probe crop.
///
/// `confidence` is in [0, 100] and decreases monotonically with
/// `distance`; candidates below the rejection threshold are never built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub label: i64,
    pub confidence: f32,
    /// Chi-square distance to the nearest reference vector.
    pub distance: f32,
}
