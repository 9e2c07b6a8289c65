//! rollcall-core — Face localization and identity matching engine.
//!
//! Uses the SeetaFace FuSt cascade for face detection and an LBP
//! grid-histogram nearest-neighbor appearance model for identity matching.

pub mod features;
pub mod imgproc;
pub mod localizer;
pub mod matcher;
pub mod model;
pub mod types;

pub use imgproc::GrayFrame;
pub use localizer::FaceLocalizer;
pub use matcher::{Matcher, NearestMatcher};
pub use model::{AppearanceModel, ModelSlot, TrainOutcome};
pub use types::{Detection, MatchCandidate, TrainingSample};
