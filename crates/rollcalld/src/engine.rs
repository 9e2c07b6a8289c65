use crate::config::Config;
use crate::decision::{Decision, DecisionEngine};
use chrono::{NaiveDate, NaiveTime, Timelike};
use rollcall_core::features::spatial_histogram;
use rollcall_core::imgproc::{self, DecodeError, GrayFrame};
use rollcall_core::localizer::{self, LocalizerError};
use rollcall_core::model::{self, ModelLoadError, TrainOutcome};
use rollcall_core::types::SAMPLE_SIZE;
use rollcall_core::{FaceLocalizer, Matcher, ModelSlot, NearestMatcher};
use rollcall_store::{DailyReport, MonthlyReport, NewFaculty, Store, StoreError};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("localizer error: {0}")]
    Localizer(#[from] LocalizerError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("undecodable enrollment image: {0}")]
    Decode(#[from] DecodeError),
    #[error("no face detected; try again closer to the camera")]
    NoFaceDetected,
    #[error("unknown faculty id {0}")]
    UnknownFaculty(i64),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Result of an enrollment: the stored sample plus the retrain it triggered.
#[derive(Debug, Serialize)]
pub struct EnrollOutcome {
    pub sample_id: String,
    pub samples_total: u64,
    pub model_entries: usize,
}

/// One recognized identity in a frame.
///
/// `duplicate` means the identity already had a record today; the match
/// is still reported for live UI feedback.
#[derive(Debug, Serialize)]
pub struct RecognizedFace {
    pub faculty_id: i64,
    pub name: String,
    pub department: String,
    pub confidence: f32,
    pub duplicate: bool,
}

#[derive(Debug, Serialize)]
pub struct RetrainOutcome {
    pub trained: bool,
    pub model_entries: usize,
}

#[derive(Debug, Serialize)]
pub struct EngineStatus {
    pub trained: bool,
    pub model_entries: usize,
    pub enrolled_labels: Vec<i64>,
    pub sample_count: u64,
    pub faculty_count: u64,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    RegisterFaculty {
        faculty: NewFaculty,
        reply: oneshot::Sender<Result<i64, EngineError>>,
    },
    Enroll {
        faculty_id: i64,
        image: Vec<u8>,
        reply: oneshot::Sender<Result<EnrollOutcome, EngineError>>,
    },
    Recognize {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Vec<RecognizedFace>, EngineError>>,
    },
    Retrain {
        reply: oneshot::Sender<Result<RetrainOutcome, EngineError>>,
    },
    ReportToday {
        reply: oneshot::Sender<Result<DailyReport, EngineError>>,
    },
    ReportMonth {
        year: i32,
        month: u32,
        reply: oneshot::Sender<Result<MonthlyReport, EngineError>>,
    },
    Status {
        reply: oneshot::Sender<Result<EngineStatus, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

macro_rules! engine_call {
    ($self:ident, $variant:ident { $($field:ident),* }) => {{
        let (reply_tx, reply_rx) = oneshot::channel();
        $self
            .tx
            .send(EngineRequest::$variant {
                $($field,)*
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }};
}

impl EngineHandle {
    pub async fn register_faculty(&self, faculty: NewFaculty) -> Result<i64, EngineError> {
        engine_call!(self, RegisterFaculty { faculty })
    }

    /// Enroll one labeled sample: decode, localize, store, retrain, swap.
    pub async fn enroll(
        &self,
        faculty_id: i64,
        image: Vec<u8>,
    ) -> Result<EnrollOutcome, EngineError> {
        engine_call!(self, Enroll { faculty_id, image })
    }

    /// Recognize all faces in a frame against today's attendance state.
    pub async fn recognize(&self, image: Vec<u8>) -> Result<Vec<RecognizedFace>, EngineError> {
        engine_call!(self, Recognize { image })
    }

    pub async fn retrain(&self) -> Result<RetrainOutcome, EngineError> {
        engine_call!(self, Retrain {})
    }

    pub async fn report_today(&self) -> Result<DailyReport, EngineError> {
        engine_call!(self, ReportToday {})
    }

    pub async fn report_month(
        &self,
        year: i32,
        month: u32,
    ) -> Result<MonthlyReport, EngineError> {
        engine_call!(self, ReportMonth { year, month })
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        engine_call!(self, Status {})
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the localizer (not `Send`), the store connection, and
/// the model slot; it is the single serialization point for attendance
/// decisions. Startup is handshaked so resource failures fail fast.
pub fn spawn_engine(config: Config) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(8);
    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), EngineError>>();

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            let mut engine = match Engine::bootstrap(&config) {
                Ok(engine) => {
                    let _ = ready_tx.send(Ok(()));
                    engine
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            tracing::info!("engine thread started");
            while let Some(request) = rx.blocking_recv() {
                engine.handle(request);
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(EngineHandle { tx }),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(EngineError::ChannelClosed),
    }
}

struct Engine {
    localizer: FaceLocalizer,
    store: Store,
    model: ModelSlot,
    matcher: NearestMatcher,
    decision: DecisionEngine,
    model_path: std::path::PathBuf,
}

impl Engine {
    fn bootstrap(config: &Config) -> Result<Self, EngineError> {
        let store = Store::open(&config.db_path)?;
        tracing::info!(db = %config.db_path.display(), "store opened");

        let localizer = FaceLocalizer::load(&config.detect_model_path, config.detection)?;

        let engine = Self {
            localizer,
            store,
            model: ModelSlot::empty(),
            matcher: NearestMatcher::new(config.confidence_threshold),
            decision: DecisionEngine {
                window: config.window,
            },
            model_path: config.appearance_model_path.clone(),
        };

        engine.restore_model();
        Ok(engine)
    }

    /// Load the persisted appearance model, or rebuild it from stored
    /// samples when it is missing or corrupt. A daemon with no samples
    /// starts untrained; that is not an error.
    fn restore_model(&self) {
        match model::load_model(&self.model_path) {
            Ok(persisted) => {
                tracing::info!(
                    entries = persisted.len(),
                    trained_at = %persisted.trained_at,
                    "restored persisted appearance model"
                );
                self.model.install(persisted);
                return;
            }
            Err(ModelLoadError::NotFound(path)) => {
                tracing::info!(path, "no persisted appearance model");
            }
            Err(ModelLoadError::Corrupt(reason)) => {
                tracing::warn!(reason, "persisted appearance model is corrupt; will retrain");
            }
            Err(ModelLoadError::Io(e)) => {
                tracing::warn!(error = %e, "could not read persisted appearance model; will retrain");
            }
        }

        match self.retrain_from_store() {
            Ok(outcome) if outcome.trained => {
                tracing::info!(entries = outcome.model_entries, "rebuilt model from stored samples");
            }
            Ok(_) => tracing::info!("no samples stored; starting untrained"),
            Err(e) => tracing::warn!(error = %e, "model rebuild failed; starting untrained"),
        }
    }

    fn handle(&mut self, request: EngineRequest) {
        match request {
            EngineRequest::RegisterFaculty { faculty, reply } => {
                let _ = reply.send(self.store.register_faculty(&faculty).map_err(Into::into));
            }
            EngineRequest::Enroll {
                faculty_id,
                image,
                reply,
            } => {
                let _ = reply.send(self.run_enroll(faculty_id, &image));
            }
            EngineRequest::Recognize { image, reply } => {
                let _ = reply.send(self.run_recognize(&image));
            }
            EngineRequest::Retrain { reply } => {
                let _ = reply.send(self.retrain_from_store());
            }
            EngineRequest::ReportToday { reply } => {
                let today = chrono::Local::now().date_naive();
                let _ = reply.send(self.store.daily_report(today).map_err(Into::into));
            }
            EngineRequest::ReportMonth { year, month, reply } => {
                let _ = reply.send(self.store.monthly_report(year, month).map_err(Into::into));
            }
            EngineRequest::Status { reply } => {
                let _ = reply.send(self.run_status());
            }
        }
    }

    /// Decode, localize, store the first face as a labeled sample, then
    /// retrain and atomically swap in the new model.
    fn run_enroll(&mut self, faculty_id: i64, image: &[u8]) -> Result<EnrollOutcome, EngineError> {
        let faculty = self
            .store
            .faculty_by_id(faculty_id)?
            .ok_or(EngineError::UnknownFaculty(faculty_id))?;

        let frame = imgproc::decode_gray(image)?;
        let detections = self.localizer.locate(&frame);
        let Some(detection) = detections.first() else {
            return Err(EngineError::NoFaceDetected);
        };
        let crop =
            localizer::normalized_crop(&frame, detection).ok_or(EngineError::NoFaceDetected)?;

        let sample_id = self.store.add_sample(faculty.id, &crop)?;
        tracing::info!(
            faculty = faculty.id,
            sample = %sample_id,
            score = detection.score,
            "stored enrollment sample"
        );

        let outcome = self.retrain_from_store()?;

        Ok(EnrollOutcome {
            sample_id,
            samples_total: self.store.sample_count()?,
            model_entries: outcome.model_entries,
        })
    }

    /// Full retrain from the sample store. On success the new model
    /// replaces the old one atomically and is persisted; a persistence
    /// failure downgrades to a warning since the in-memory swap already
    /// succeeded.
    fn retrain_from_store(&self) -> Result<RetrainOutcome, EngineError> {
        let samples = self.store.training_samples()?;
        let params = self
            .model
            .snapshot()
            .map(|m| m.params)
            .unwrap_or_default();

        match model::train(&samples, params) {
            TrainOutcome::Trained(trained) => {
                let entries = trained.len();
                if let Err(e) = model::save_model(&self.model_path, &trained) {
                    tracing::warn!(error = %e, "trained model not persisted; keeping in-memory model");
                }
                self.model.install(trained);
                Ok(RetrainOutcome {
                    trained: true,
                    model_entries: entries,
                })
            }
            TrainOutcome::EmptyDataset => Ok(RetrainOutcome {
                trained: false,
                model_entries: self.model.snapshot().map(|m| m.len()).unwrap_or(0),
            }),
        }
    }

    /// Recognize every face in a live frame and run each accepted match
    /// through the attendance decision.
    ///
    /// Soft-fails to an empty list on undecodable frames, zero faces, or
    /// an untrained model — live recognition must never error on those.
    fn run_recognize(&mut self, image: &[u8]) -> Result<Vec<RecognizedFace>, EngineError> {
        let frame = match imgproc::decode_gray(image) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(error = %e, "undecodable frame; returning empty result");
                return Ok(Vec::new());
            }
        };

        let detections = self.localizer.locate(&frame);
        if detections.is_empty() {
            return Ok(Vec::new());
        }

        let now = chrono::Local::now();
        let arrival = now.time().with_nanosecond(0).unwrap_or_else(|| now.time());
        self.match_detections(&frame, &detections, now.date_naive(), arrival)
    }

    /// Match each detection independently and decide attendance for the
    /// accepted ones.
    fn match_detections(
        &self,
        frame: &GrayFrame,
        detections: &[rollcall_core::Detection],
        date: NaiveDate,
        arrival: NaiveTime,
    ) -> Result<Vec<RecognizedFace>, EngineError> {
        let Some(model) = self.model.snapshot() else {
            tracing::debug!("recognition before first training; returning empty result");
            return Ok(Vec::new());
        };

        let mut recognized = Vec::new();

        for detection in detections {
            let Some(crop) = localizer::normalized_crop(frame, detection) else {
                continue;
            };
            let probe = spatial_histogram(&crop, SAMPLE_SIZE, SAMPLE_SIZE, &model.params);

            let Some(candidate) = self.matcher.compare(&probe, &model) else {
                continue;
            };

            let Some(faculty) = self.store.faculty_by_id(candidate.label)? else {
                tracing::warn!(
                    label = candidate.label,
                    "matched a label with no faculty record; ignoring"
                );
                continue;
            };

            match self.decision.decide(&self.store, &faculty, date, arrival)? {
                Decision::Recorded(record) => {
                    tracing::info!(
                        faculty = faculty.id,
                        status = record.status.as_str(),
                        late_by_minutes = record.late_by_minutes,
                        confidence = candidate.confidence,
                        "attendance recorded"
                    );
                    recognized.push(RecognizedFace {
                        faculty_id: faculty.id,
                        name: faculty.name,
                        department: faculty.department,
                        confidence: candidate.confidence,
                        duplicate: false,
                    });
                }
                Decision::Duplicate(_) => {
                    recognized.push(RecognizedFace {
                        faculty_id: faculty.id,
                        name: faculty.name,
                        department: faculty.department,
                        confidence: candidate.confidence,
                        duplicate: true,
                    });
                }
                Decision::OutsideWindow => {
                    tracing::info!(
                        faculty = faculty.id,
                        %arrival,
                        "match after attendance cutoff; no record"
                    );
                }
            }
        }

        Ok(recognized)
    }

    fn run_status(&self) -> Result<EngineStatus, EngineError> {
        let snapshot = self.model.snapshot();
        Ok(EngineStatus {
            trained: snapshot.is_some(),
            model_entries: snapshot.as_ref().map(|m| m.len()).unwrap_or(0),
            enrolled_labels: snapshot.map(|m| m.labels()).unwrap_or_default(),
            sample_count: self.store.sample_count()?,
            faculty_count: self.store.faculty_count()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::AttendanceWindow;
    use rollcall_core::model::train;
    use rollcall_core::types::TrainingSample;

    /// Engine-pipeline harness without the cascade: store + slot +
    /// matcher + decision wired exactly as `match_detections` uses them.
    struct Pipeline {
        store: Store,
        model: ModelSlot,
        matcher: NearestMatcher,
        decision: DecisionEngine,
    }

    impl Pipeline {
        fn run(
            &self,
            crops: &[Vec<u8>],
            date: NaiveDate,
            arrival: NaiveTime,
        ) -> Vec<RecognizedFace> {
            let Some(model) = self.model.snapshot() else {
                return Vec::new();
            };
            let mut recognized = Vec::new();
            for crop in crops {
                let probe = spatial_histogram(crop, SAMPLE_SIZE, SAMPLE_SIZE, &model.params);
                let Some(candidate) = self.matcher.compare(&probe, &model) else {
                    continue;
                };
                let Some(faculty) = self.store.faculty_by_id(candidate.label).unwrap() else {
                    continue;
                };
                match self
                    .decision
                    .decide(&self.store, &faculty, date, arrival)
                    .unwrap()
                {
                    Decision::Recorded(_) => recognized.push(RecognizedFace {
                        faculty_id: faculty.id,
                        name: faculty.name,
                        department: faculty.department,
                        confidence: candidate.confidence,
                        duplicate: false,
                    }),
                    Decision::Duplicate(_) => recognized.push(RecognizedFace {
                        faculty_id: faculty.id,
                        name: faculty.name,
                        department: faculty.department,
                        confidence: candidate.confidence,
                        duplicate: true,
                    }),
                    Decision::OutsideWindow => {}
                }
            }
            recognized
        }
    }

    fn face_pixels(seed: u8) -> Vec<u8> {
        let size = SAMPLE_SIZE as usize;
        let mut pixels = vec![0u8; size * size];
        for y in 0..size {
            for x in 0..size {
                pixels[y * size + x] =
                    ((x * seed as usize / 4 + y * (seed as usize / 3 + 1) / 4) % 256) as u8;
            }
        }
        pixels
    }

    fn pipeline_with_enrollment(seeds: &[u8]) -> (Pipeline, Vec<i64>) {
        let store = Store::open_in_memory().unwrap();
        let mut ids = Vec::new();
        let mut samples = Vec::new();

        for (i, &seed) in seeds.iter().enumerate() {
            let id = store
                .register_faculty(&rollcall_store::NewFaculty {
                    code: format!("F-{i:02}"),
                    name: format!("Faculty {i}"),
                    department: "CS".to_string(),
                    email: None,
                    phone: None,
                })
                .unwrap();
            let pixels = face_pixels(seed);
            store.add_sample(id, &pixels).unwrap();
            samples.push(TrainingSample { label: id, pixels });
            ids.push(id);
        }

        let slot = ModelSlot::empty();
        if let TrainOutcome::Trained(model) = train(&samples, Default::default()) {
            slot.install(model);
        }

        let pipeline = Pipeline {
            store,
            model: slot,
            matcher: NearestMatcher::default(),
            decision: DecisionEngine {
                window: AttendanceWindow {
                    start: "09:00:00".parse().unwrap(),
                    cutoff: "23:00:00".parse().unwrap(),
                },
            },
        };
        (pipeline, ids)
    }

    #[test]
    fn test_untrained_pipeline_returns_empty() {
        let store = Store::open_in_memory().unwrap();
        let pipeline = Pipeline {
            store,
            model: ModelSlot::empty(),
            matcher: NearestMatcher::default(),
            decision: DecisionEngine {
                window: AttendanceWindow {
                    start: "09:00:00".parse().unwrap(),
                    cutoff: "23:00:00".parse().unwrap(),
                },
            },
        };
        let result = pipeline.run(
            &[face_pixels(40)],
            "2025-11-03".parse().unwrap(),
            "09:05:00".parse().unwrap(),
        );
        assert!(result.is_empty());
    }

    #[test]
    fn test_recognize_records_then_flags_duplicate() {
        let (pipeline, ids) = pipeline_with_enrollment(&[40, 120]);
        let date: NaiveDate = "2025-11-03".parse().unwrap();

        let first = pipeline.run(&[face_pixels(40)], date, "09:05:00".parse().unwrap());
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].faculty_id, ids[0]);
        assert!(!first[0].duplicate);
        assert!(first[0].confidence >= 40.0);

        let second = pipeline.run(&[face_pixels(40)], date, "09:10:00".parse().unwrap());
        assert_eq!(second.len(), 1);
        assert!(second[0].duplicate);

        // The stored record still carries the first arrival.
        let record = pipeline
            .store
            .attendance_on(ids[0], date)
            .unwrap()
            .unwrap();
        assert_eq!(record.arrival_time, "09:05:00".parse::<NaiveTime>().unwrap());
    }

    #[test]
    fn test_multiple_faces_matched_independently() {
        let (pipeline, ids) = pipeline_with_enrollment(&[40, 120]);
        let date: NaiveDate = "2025-11-03".parse().unwrap();

        let result = pipeline.run(
            &[face_pixels(40), face_pixels(120)],
            date,
            "09:00:00".parse().unwrap(),
        );
        assert_eq!(result.len(), 2);
        let recognized: Vec<i64> = result.iter().map(|r| r.faculty_id).collect();
        assert_eq!(recognized, ids);
        assert_eq!(pipeline.store.records_for_date(date).unwrap().len(), 2);
    }

    #[test]
    fn test_matched_label_without_faculty_is_skipped() {
        // A model entry whose faculty row does not exist must never
        // surface as a recognized identity or produce a record.
        let store = Store::open_in_memory().unwrap();
        let slot = ModelSlot::empty();
        let samples = vec![TrainingSample {
            label: 999,
            pixels: face_pixels(40),
        }];
        if let TrainOutcome::Trained(model) = train(&samples, Default::default()) {
            slot.install(model);
        }

        let pipeline = Pipeline {
            store,
            model: slot,
            matcher: NearestMatcher::default(),
            decision: DecisionEngine {
                window: AttendanceWindow {
                    start: "09:00:00".parse().unwrap(),
                    cutoff: "23:00:00".parse().unwrap(),
                },
            },
        };

        let date: NaiveDate = "2025-11-03".parse().unwrap();
        let result = pipeline.run(&[face_pixels(40)], date, "09:00:00".parse().unwrap());
        assert!(result.is_empty());
        assert!(pipeline.store.records_for_date(date).unwrap().is_empty());
    }
}
