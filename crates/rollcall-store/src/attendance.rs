//! Attendance records and report queries.
//!
//! The table carries `UNIQUE(faculty_id, date)`; writes go through
//! `INSERT OR IGNORE`, so an insert race can never produce two records
//! for the same identity on the same day.

use crate::{Faculty, Store, StoreResult};
use chrono::{NaiveDate, NaiveTime};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// On-time or late, relative to the configured attendance window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Present,
    Late,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Present => "Present",
            Status::Late => "Late",
        }
    }

    fn from_db(raw: &str) -> Option<Self> {
        match raw {
            "Present" => Some(Status::Present),
            "Late" => Some(Status::Late),
            _ => None,
        }
    }
}

/// One attendance event; at most one exists per (faculty_id, date).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub faculty_id: i64,
    pub faculty_name: String,
    pub faculty_department: String,
    pub date: NaiveDate,
    /// Arrival wall-clock time, second precision (HH:MM:SS).
    pub arrival_time: NaiveTime,
    pub status: Status,
    pub late_by_minutes: i64,
}

/// Result of an insert-if-absent write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record for this (faculty_id, date) already existed; nothing
    /// was written or modified.
    AlreadyRecorded,
}

/// Daily report: who is in, who is not.
#[derive(Debug, Serialize)]
pub struct DailyReport {
    pub date: NaiveDate,
    pub present_count: usize,
    pub absent_count: usize,
    pub present: Vec<AttendanceRecord>,
    pub absent: Vec<Faculty>,
}

#[derive(Debug, Serialize)]
pub struct MonthlyRow {
    pub faculty_id: i64,
    pub code: String,
    pub name: String,
    pub department: String,
    pub present_days: usize,
    pub total_days: usize,
    pub percentage: f64,
}

/// Monthly summary: per-faculty presence over the month's attendance days.
#[derive(Debug, Serialize)]
pub struct MonthlyReport {
    pub year: i32,
    pub month: u32,
    pub total_days: usize,
    pub summary: Vec<MonthlyRow>,
}

fn row_to_record(row: &Row) -> rusqlite::Result<AttendanceRecord> {
    let status_raw: String = row.get("status")?;
    let status = Status::from_db(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown status '{status_raw}'").into(),
        )
    })?;

    Ok(AttendanceRecord {
        faculty_id: row.get("faculty_id")?,
        faculty_name: row.get("faculty_name")?,
        faculty_department: row.get("faculty_department")?,
        date: row.get("date")?,
        arrival_time: row.get("arrival_time")?,
        status,
        late_by_minutes: row.get("late_by_minutes")?,
    })
}

const RECORD_COLUMNS: &str =
    "faculty_id, faculty_name, faculty_department, date, arrival_time, status, late_by_minutes";

impl Store {
    /// Write the record unless one already exists for its
    /// (faculty_id, date). Existing records are never altered.
    pub fn insert_attendance_if_absent(
        &self,
        record: &AttendanceRecord,
    ) -> StoreResult<InsertOutcome> {
        let changed = self.conn().execute(
            "INSERT OR IGNORE INTO attendance
                 (faculty_id, faculty_name, faculty_department, date,
                  arrival_time, status, late_by_minutes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.faculty_id,
                record.faculty_name,
                record.faculty_department,
                record.date,
                record.arrival_time,
                record.status.as_str(),
                record.late_by_minutes,
            ],
        )?;
        Ok(if changed == 1 {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::AlreadyRecorded
        })
    }

    /// The record for (faculty_id, date), if any.
    pub fn attendance_on(
        &self,
        faculty_id: i64,
        date: NaiveDate,
    ) -> StoreResult<Option<AttendanceRecord>> {
        let record = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM attendance
                     WHERE faculty_id = ?1 AND date = ?2"
                ),
                params![faculty_id, date],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// All records for a calendar date.
    pub fn records_for_date(&self, date: NaiveDate) -> StoreResult<Vec<AttendanceRecord>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM attendance
             WHERE date = ?1 ORDER BY arrival_time, faculty_id"
        ))?;
        let rows = stmt.query_map(params![date], row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// All records for a (year, month).
    pub fn records_for_month(
        &self,
        year: i32,
        month: u32,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM attendance
             WHERE strftime('%Y', date) = ?1 AND strftime('%m', date) = ?2
             ORDER BY date, arrival_time"
        ))?;
        let rows = stmt.query_map(
            params![format!("{year:04}"), format!("{month:02}")],
            row_to_record,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Present rows plus the absent faculty list for a date.
    pub fn daily_report(&self, date: NaiveDate) -> StoreResult<DailyReport> {
        let present = self.records_for_date(date)?;
        let present_ids: HashSet<i64> = present.iter().map(|r| r.faculty_id).collect();
        let absent: Vec<Faculty> = self
            .all_faculty()?
            .into_iter()
            .filter(|f| !present_ids.contains(&f.id))
            .collect();

        Ok(DailyReport {
            date,
            present_count: present.len(),
            absent_count: absent.len(),
            present,
            absent,
        })
    }

    /// Per-faculty presence counts over the month's distinct attendance
    /// days. Simple counting over already-decided records.
    pub fn monthly_report(&self, year: i32, month: u32) -> StoreResult<MonthlyReport> {
        let records = self.records_for_month(year, month)?;
        let days: HashSet<NaiveDate> = records.iter().map(|r| r.date).collect();
        let total_days = days.len();

        let summary = self
            .all_faculty()?
            .into_iter()
            .map(|f| {
                let present_days: HashSet<NaiveDate> = records
                    .iter()
                    .filter(|r| r.faculty_id == f.id)
                    .map(|r| r.date)
                    .collect();
                let present_days = present_days.len();
                let percentage = if total_days > 0 {
                    (present_days as f64 / total_days as f64 * 10000.0).round() / 100.0
                } else {
                    0.0
                };
                MonthlyRow {
                    faculty_id: f.id,
                    code: f.code,
                    name: f.name,
                    department: f.department,
                    present_days,
                    total_days,
                    percentage,
                }
            })
            .collect();

        Ok(MonthlyReport {
            year,
            month,
            total_days,
            summary,
        })
    }
}
