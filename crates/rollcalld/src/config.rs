use crate::decision::AttendanceWindow;
use chrono::NaiveTime;
use rollcall_core::localizer::DetectionPolicy;
use rollcall_core::types::CONFIDENCE_REJECT_THRESHOLD;
use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Base directory for the database and model files.
    pub data_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Path to the SeetaFace FuSt cascade model file.
    pub detect_model_path: String,
    /// Path to the persisted appearance model.
    pub appearance_model_path: PathBuf,
    /// Confidence below which a match is rejected.
    pub confidence_threshold: f32,
    /// On-time/late window for attendance decisions.
    pub window: AttendanceWindow,
    /// Face detection policy.
    pub detection: DetectionPolicy,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("ROLLCALL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::var("XDG_DATA_HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| {
                        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                        PathBuf::from(home).join(".local/share")
                    })
                    .join("rollcall")
            });

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));

        let detect_model_path = std::env::var("ROLLCALL_DETECT_MODEL").unwrap_or_else(|_| {
            data_dir
                .join("models/seeta_fd_frontal_v1.0.bin")
                .to_string_lossy()
                .into_owned()
        });

        let appearance_model_path = std::env::var("ROLLCALL_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("appearance_model.json"));

        let detection = DetectionPolicy {
            min_face_size: env_u32("ROLLCALL_MIN_FACE_SIZE", DetectionPolicy::default().min_face_size),
            score_threshold: env_f64(
                "ROLLCALL_DETECT_SCORE_THRESHOLD",
                DetectionPolicy::default().score_threshold,
            ),
            ..DetectionPolicy::default()
        };

        Self {
            data_dir,
            db_path,
            detect_model_path,
            appearance_model_path,
            confidence_threshold: env_f32(
                "ROLLCALL_CONFIDENCE_THRESHOLD",
                CONFIDENCE_REJECT_THRESHOLD,
            ),
            window: AttendanceWindow {
                start: env_time("ROLLCALL_WINDOW_START", NaiveTime::from_hms_opt(9, 0, 0)),
                cutoff: env_time("ROLLCALL_WINDOW_CUTOFF", NaiveTime::from_hms_opt(23, 0, 0)),
            },
            detection,
        }
    }

    /// Create the data directory and the appearance-model parent if missing.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        if let Some(parent) = self.appearance_model_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_time(key: &str, default: Option<NaiveTime>) -> NaiveTime {
    std::env::var(key)
        .ok()
        .and_then(|v| NaiveTime::parse_from_str(&v, "%H:%M").ok())
        .or(default)
        .unwrap_or_default()
}
