//! Face localization via the SeetaFace FuSt cascade (`rustface`).
//!
//! Detection policy is fixed at load time, not per call: a minimum face
//! size, pyramid scale step, sliding-window step, and cascade score
//! threshold, tuned to reject spurious small detections.

use crate::imgproc::{self, GrayFrame};
use crate::types::{Detection, SAMPLE_SIZE};
use rustface::ImageData;
use std::path::Path;
use thiserror::Error;

// --- Detection policy defaults ---
const MIN_FACE_SIZE: u32 = 80;
const SCORE_THRESHOLD: f64 = 2.0;
const PYRAMID_SCALE_FACTOR: f32 = 0.8;
const SLIDE_WINDOW_STEP: u32 = 4;

/// Fixed localization parameters, applied once at load.
#[derive(Debug, Clone, Copy)]
pub struct DetectionPolicy {
    /// Smallest face side accepted, in pixels.
    pub min_face_size: u32,
    /// Cascade score below which a window is discarded.
    pub score_threshold: f64,
    /// Image pyramid scale step in (0, 1).
    pub pyramid_scale_factor: f32,
    /// Sliding-window stride in pixels (both axes).
    pub slide_window_step: u32,
}

impl Default for DetectionPolicy {
    fn default() -> Self {
        Self {
            min_face_size: MIN_FACE_SIZE,
            score_threshold: SCORE_THRESHOLD,
            pyramid_scale_factor: PYRAMID_SCALE_FACTOR,
            slide_window_step: SLIDE_WINDOW_STEP,
        }
    }
}

#[derive(Error, Debug)]
pub enum LocalizerError {
    #[error("detector model not found: {0} — download the SeetaFace FuSt model and point ROLLCALL_DETECT_MODEL at it")]
    ModelNotFound(String),
    #[error("failed to load detector model: {0}")]
    ModelLoad(String),
}

/// Cascade-based face localizer.
///
/// Holds the loaded cascade; not `Send` (the detector keeps interior
/// shared state), so it lives on the engine thread.
pub struct FaceLocalizer {
    detector: Box<dyn rustface::Detector>,
}

impl FaceLocalizer {
    /// Load the cascade model from the given path and apply the policy.
    pub fn load(model_path: &str, policy: DetectionPolicy) -> Result<Self, LocalizerError> {
        if !Path::new(model_path).exists() {
            return Err(LocalizerError::ModelNotFound(model_path.to_string()));
        }

        let mut detector = rustface::create_detector(model_path)
            .map_err(|e| LocalizerError::ModelLoad(e.to_string()))?;

        // The FuSt cascade rejects faces below 20 px, thresholds <= 0,
        // and scale steps outside (0.01, 0.99); clamp rather than abort.
        detector.set_min_face_size(policy.min_face_size.max(20));
        detector.set_score_thresh(policy.score_threshold.max(0.01));
        detector.set_pyramid_scale_factor(policy.pyramid_scale_factor.clamp(0.01, 0.99));
        detector.set_slide_window_step(
            policy.slide_window_step.max(1),
            policy.slide_window_step.max(1),
        );

        tracing::info!(
            path = model_path,
            min_face_size = policy.min_face_size,
            score_threshold = policy.score_threshold,
            "face detector loaded"
        );

        Ok(Self { detector })
    }

    /// Find candidate face regions in a frame.
    ///
    /// An empty result means "no face present" and is not an error;
    /// callers branch on emptiness. Detections come back in the cascade's
    /// scan order, and enrollment takes the first deterministically.
    pub fn locate(&mut self, frame: &GrayFrame) -> Vec<Detection> {
        if frame.width == 0 || frame.height == 0 {
            return Vec::new();
        }

        let mut image = ImageData::new(&frame.data, frame.width, frame.height);
        self.detector
            .detect(&mut image)
            .into_iter()
            .map(|info| {
                let bbox = info.bbox();
                Detection {
                    x: bbox.x(),
                    y: bbox.y(),
                    width: bbox.width(),
                    height: bbox.height(),
                    score: info.score(),
                }
            })
            .collect()
    }
}

/// Crop a detection out of the frame and normalize it to the fixed
/// SAMPLE_SIZE² grayscale resolution all samples share.
///
/// Returns `None` when the detection has no overlap with the frame.
pub fn normalized_crop(frame: &GrayFrame, detection: &Detection) -> Option<Vec<u8>> {
    let (crop, w, h) = imgproc::crop_region(
        frame,
        detection.x,
        detection.y,
        detection.width,
        detection.height,
    );
    if w == 0 || h == 0 {
        return None;
    }
    Some(imgproc::resize_bilinear(&crop, w, h, SAMPLE_SIZE, SAMPLE_SIZE))
}
