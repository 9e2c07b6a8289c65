//! Face sample storage.
//!
//! A sample is a structured row — identity is an explicit column, never
//! encoded in a key or filename. Crops are stored already normalized, so
//! the trainer can consume them directly.

use crate::{Store, StoreError, StoreResult};
use chrono::Utc;
use rollcall_core::types::{TrainingSample, SAMPLE_SIZE};
use rusqlite::params;
use uuid::Uuid;

impl Store {
    /// Append a normalized grayscale crop for the given identity,
    /// returning the assigned sample id.
    ///
    /// Rejects crops that are not SAMPLE_SIZE²; samples must be
    /// directly comparable.
    pub fn add_sample(&self, faculty_id: i64, pixels: &[u8]) -> StoreResult<String> {
        let expected = (SAMPLE_SIZE * SAMPLE_SIZE) as usize;
        if pixels.len() != expected {
            return Err(StoreError::Malformed(format!(
                "sample must be {SAMPLE_SIZE}x{SAMPLE_SIZE} ({expected} bytes), got {}",
                pixels.len()
            )));
        }

        let id = Uuid::new_v4().to_string();
        self.conn().execute(
            "INSERT INTO face_samples (id, faculty_id, width, height, pixels, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                faculty_id,
                SAMPLE_SIZE,
                SAMPLE_SIZE,
                pixels,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(id)
    }

    /// All stored samples as trainer input, oldest first.
    pub fn training_samples(&self) -> StoreResult<Vec<TrainingSample>> {
        let mut stmt = self.conn().prepare(
            "SELECT faculty_id, pixels FROM face_samples ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(TrainingSample {
                label: row.get("faculty_id")?,
                pixels: row.get("pixels")?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn sample_count(&self) -> StoreResult<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM face_samples", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faculty::NewFaculty;

    fn store_with_faculty() -> (Store, i64) {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .register_faculty(&NewFaculty {
                code: "F-01".to_string(),
                name: "Ada".to_string(),
                department: "Physics".to_string(),
                email: None,
                phone: None,
            })
            .unwrap();
        (store, id)
    }

    fn crop(fill: u8) -> Vec<u8> {
        vec![fill; (SAMPLE_SIZE * SAMPLE_SIZE) as usize]
    }

    #[test]
    fn test_add_and_load_samples() {
        let (store, faculty_id) = store_with_faculty();
        store.add_sample(faculty_id, &crop(10)).unwrap();
        store.add_sample(faculty_id, &crop(20)).unwrap();

        let samples = store.training_samples().unwrap();
        assert_eq!(samples.len(), 2);
        assert!(samples.iter().all(|s| s.label == faculty_id));
        assert_eq!(samples[0].pixels[0], 10);
        assert_eq!(samples[1].pixels[0], 20);
        assert_eq!(store.sample_count().unwrap(), 2);
    }

    #[test]
    fn test_sample_ids_are_unique() {
        let (store, faculty_id) = store_with_faculty();
        let a = store.add_sample(faculty_id, &crop(1)).unwrap();
        let b = store.add_sample(faculty_id, &crop(2)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_size_rejected() {
        let (store, faculty_id) = store_with_faculty();
        let result = store.add_sample(faculty_id, &[0u8; 64]);
        assert!(matches!(result, Err(StoreError::Malformed(_))));
        assert_eq!(store.sample_count().unwrap(), 0);
    }

    #[test]
    fn test_unknown_faculty_rejected() {
        let store = Store::open_in_memory().unwrap();
        // Foreign keys are on; no faculty row exists.
        assert!(store.add_sample(99, &crop(1)).is_err());
    }
}
