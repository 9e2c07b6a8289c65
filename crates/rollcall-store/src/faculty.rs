//! Faculty registry.

use crate::{Store, StoreResult};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

/// A registered faculty member. `id` is the identity label used
/// throughout the recognition pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct Faculty {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub department: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Registration input; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewFaculty {
    pub code: String,
    pub name: String,
    pub department: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

fn row_to_faculty(row: &Row) -> rusqlite::Result<Faculty> {
    Ok(Faculty {
        id: row.get("id")?,
        code: row.get("code")?,
        name: row.get("name")?,
        department: row.get("department")?,
        email: row.get("email")?,
        phone: row.get("phone")?,
    })
}

impl Store {
    /// Register a new faculty member, returning the assigned identity id.
    pub fn register_faculty(&self, faculty: &NewFaculty) -> StoreResult<i64> {
        self.conn().execute(
            "INSERT INTO faculty (code, name, department, email, phone, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                faculty.code,
                faculty.name,
                faculty.department,
                faculty.email,
                faculty.phone,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    pub fn faculty_by_id(&self, id: i64) -> StoreResult<Option<Faculty>> {
        let faculty = self
            .conn()
            .query_row(
                "SELECT id, code, name, department, email, phone FROM faculty WHERE id = ?1",
                params![id],
                row_to_faculty,
            )
            .optional()?;
        Ok(faculty)
    }

    pub fn all_faculty(&self) -> StoreResult<Vec<Faculty>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, code, name, department, email, phone FROM faculty ORDER BY id",
        )?;
        let rows = stmt.query_map([], row_to_faculty)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn faculty_count(&self) -> StoreResult<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM faculty", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_faculty(code: &str, name: &str) -> NewFaculty {
        NewFaculty {
            code: code.to_string(),
            name: name.to_string(),
            department: "Physics".to_string(),
            email: None,
            phone: None,
        }
    }

    #[test]
    fn test_register_and_fetch() {
        let store = Store::open_in_memory().unwrap();
        let id = store.register_faculty(&new_faculty("F-01", "Ada")).unwrap();

        let faculty = store.faculty_by_id(id).unwrap().expect("registered row");
        assert_eq!(faculty.code, "F-01");
        assert_eq!(faculty.name, "Ada");
        assert_eq!(faculty.department, "Physics");
    }

    #[test]
    fn test_unknown_id_is_none() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.faculty_by_id(42).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_code_rejected() {
        let store = Store::open_in_memory().unwrap();
        store.register_faculty(&new_faculty("F-01", "Ada")).unwrap();
        let result = store.register_faculty(&new_faculty("F-01", "Grace"));
        assert!(result.is_err());
    }

    #[test]
    fn test_all_faculty_ordered_by_id() {
        let store = Store::open_in_memory().unwrap();
        let a = store.register_faculty(&new_faculty("F-01", "Ada")).unwrap();
        let b = store.register_faculty(&new_faculty("F-02", "Grace")).unwrap();

        let all = store.all_faculty().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, a);
        assert_eq!(all[1].id, b);
        assert_eq!(store.faculty_count().unwrap(), 2);
    }
}
