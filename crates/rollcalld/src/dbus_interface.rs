use crate::engine::{EngineError, EngineHandle};
use zbus::interface;

/// D-Bus interface for the attendance daemon.
///
/// Bus name: org.rollcall.Attendance1
/// Object path: /org/rollcall/Attendance1
///
/// Structured results go over the wire as JSON strings so the kiosk
/// frontend and CLI share one payload shape.
pub struct AttendanceService {
    engine: EngineHandle,
}

impl AttendanceService {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }
}

fn to_fdo(e: EngineError) -> zbus::fdo::Error {
    match e {
        EngineError::Decode(_) | EngineError::NoFaceDetected | EngineError::UnknownFaculty(_) => {
            zbus::fdo::Error::InvalidArgs(e.to_string())
        }
        other => zbus::fdo::Error::Failed(other.to_string()),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceService {
    /// Register a faculty member; returns the assigned identity id.
    async fn register_faculty(
        &self,
        code: &str,
        name: &str,
        department: &str,
        email: &str,
        phone: &str,
    ) -> zbus::fdo::Result<i64> {
        tracing::info!(code, name, "register_faculty requested");
        self.engine
            .register_faculty(rollcall_store::NewFaculty {
                code: code.to_string(),
                name: name.to_string(),
                department: department.to_string(),
                email: non_empty(email),
                phone: non_empty(phone),
            })
            .await
            .map_err(to_fdo)
    }

    /// Enroll one face image for the given faculty id.
    ///
    /// Errors when the image is undecodable or contains no face, so the
    /// operator can retry with a better shot.
    async fn enroll_sample(&self, faculty_id: i64, image: Vec<u8>) -> zbus::fdo::Result<String> {
        tracing::info!(faculty_id, bytes = image.len(), "enroll_sample requested");
        let outcome = self.engine.enroll(faculty_id, image).await.map_err(to_fdo)?;
        to_json(&outcome)
    }

    /// Recognize all faces in a live frame.
    ///
    /// Soft-fails to an empty list on undecodable frames or when no face
    /// is present; never a D-Bus error for those.
    async fn recognize_frame(&self, image: Vec<u8>) -> zbus::fdo::Result<String> {
        let detected = self.engine.recognize(image).await.map_err(to_fdo)?;
        to_json(&serde_json::json!({ "detected": detected }))
    }

    /// Rebuild the appearance model from all stored samples.
    async fn retrain(&self) -> zbus::fdo::Result<String> {
        tracing::info!("retrain requested");
        let outcome = self.engine.retrain().await.map_err(to_fdo)?;
        to_json(&outcome)
    }

    /// Today's attendance: present records plus the absent list.
    async fn today_report(&self) -> zbus::fdo::Result<String> {
        let report = self.engine.report_today().await.map_err(to_fdo)?;
        to_json(&report)
    }

    /// Per-faculty presence summary for a (year, month).
    async fn monthly_report(&self, year: i32, month: u32) -> zbus::fdo::Result<String> {
        let report = self.engine.report_month(year, month).await.map_err(to_fdo)?;
        to_json(&report)
    }

    /// Daemon status: model state and store counts.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = self.engine.status().await.map_err(to_fdo)?;
        to_json(&serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "trained": status.trained,
            "model_entries": status.model_entries,
            "enrolled_labels": status.enrolled_labels,
            "sample_count": status.sample_count,
            "faculty_count": status.faculty_count,
        }))
    }
}
