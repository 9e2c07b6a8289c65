use rusqlite::{Connection, Result};

/// Create all tables and indexes if missing. Safe to run at every open.
pub fn create_all(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS faculty (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            code       TEXT NOT NULL UNIQUE,
            name       TEXT NOT NULL,
            department TEXT NOT NULL,
            email      TEXT,
            phone      TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS face_samples (
            id         TEXT PRIMARY KEY,
            faculty_id INTEGER NOT NULL REFERENCES faculty(id),
            width      INTEGER NOT NULL,
            height     INTEGER NOT NULL,
            pixels     BLOB NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_face_samples_faculty
            ON face_samples(faculty_id);

        CREATE TABLE IF NOT EXISTS attendance (
            id                 INTEGER PRIMARY KEY AUTOINCREMENT,
            faculty_id         INTEGER NOT NULL REFERENCES faculty(id),
            faculty_name       TEXT NOT NULL,
            faculty_department TEXT NOT NULL,
            date               TEXT NOT NULL,
            arrival_time       TEXT NOT NULL,
            status             TEXT NOT NULL CHECK(status IN ('Present', 'Late')),
            late_by_minutes    INTEGER NOT NULL DEFAULT 0,
            UNIQUE(faculty_id, date)
        );
        CREATE INDEX IF NOT EXISTS idx_attendance_date
            ON attendance(date);
        "#,
    )
}
