//! Attendance decision engine.
//!
//! Per (identity, date) the state machine is two-state: no record, or
//! recorded — and recorded is terminal for the day. The check-and-set
//! runs through the store's insert-if-absent, so even racing callers
//! cannot double-record; on this daemon all decisions additionally
//! serialize through the engine thread.

use chrono::{NaiveDate, NaiveTime};
use rollcall_store::{AttendanceRecord, Faculty, InsertOutcome, Status, Store, StoreError};

/// Configured on-time/cutoff window.
#[derive(Debug, Clone, Copy)]
pub struct AttendanceWindow {
    /// Arrivals at or before this are on time.
    pub start: NaiveTime,
    /// Arrivals after this no longer produce a record.
    pub cutoff: NaiveTime,
}

impl AttendanceWindow {
    /// Classify an arrival, or `None` when it falls after the cutoff.
    ///
    /// Lateness counts whole minutes past the window start.
    pub fn classify(&self, arrival: NaiveTime) -> Option<(Status, i64)> {
        if arrival > self.cutoff {
            return None;
        }
        let late_by_minutes = (arrival - self.start).num_minutes().max(0);
        if late_by_minutes == 0 {
            Some((Status::Present, 0))
        } else {
            Some((Status::Late, late_by_minutes))
        }
    }
}

/// Outcome of one accepted match against today's attendance state.
#[derive(Debug)]
pub enum Decision {
    /// First accepted match today; a new record was written.
    Recorded(AttendanceRecord),
    /// Already recorded today; the existing record is untouched but the
    /// match is still reported so a kiosk UI can show live feedback.
    Duplicate(AttendanceRecord),
    /// Arrival after the cutoff: matched, but attendance has stopped
    /// for the day.
    OutsideWindow,
}

#[derive(Debug, Clone, Copy)]
pub struct DecisionEngine {
    pub window: AttendanceWindow,
}

impl DecisionEngine {
    /// Decide what an accepted match for `faculty` at `arrival` on `date`
    /// means: new record, duplicate, or outside the window.
    pub fn decide(
        &self,
        store: &Store,
        faculty: &Faculty,
        date: NaiveDate,
        arrival: NaiveTime,
    ) -> Result<Decision, StoreError> {
        let Some((status, late_by_minutes)) = self.window.classify(arrival) else {
            return Ok(Decision::OutsideWindow);
        };

        let record = AttendanceRecord {
            faculty_id: faculty.id,
            faculty_name: faculty.name.clone(),
            faculty_department: faculty.department.clone(),
            date,
            arrival_time: arrival,
            status,
            late_by_minutes,
        };

        match store.insert_attendance_if_absent(&record)? {
            InsertOutcome::Inserted => Ok(Decision::Recorded(record)),
            InsertOutcome::AlreadyRecorded => {
                let existing = store.attendance_on(faculty.id, date)?.unwrap_or(record);
                Ok(Decision::Duplicate(existing))
            }
        }
    }
}
