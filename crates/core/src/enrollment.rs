//! Doctor-patient enrollment registry.
//!
//! The enrollment relation is the authorization gate for messaging, notices,
//! and doctor access to patient data. Rows are created at patient
//! registration and never deleted.

use crate::db::Db;
use crate::error::CoreResult;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

#[derive(Clone)]
pub struct EnrollmentRegistry {
    db: Arc<Db>,
}

impl EnrollmentRegistry {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    /// Membership test on the enrollment relation.
    ///
    /// # Errors
    ///
    /// Returns a database error if the lookup fails.
    pub fn is_enrolled(&self, doctor_id: &str, patient_id: &str) -> CoreResult<bool> {
        self.db.with_conn(|conn| {
            let row: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM enrollments WHERE doctor_id = ?1 AND patient_id = ?2 LIMIT 1",
                    params![doctor_id, patient_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(row.is_some())
        })
    }

    /// All doctors enrolled with a patient, in stable insertion order.
    ///
    /// # Errors
    ///
    /// Returns a database error if the lookup fails.
    pub fn doctors_for_patient(&self, patient_id: &str) -> CoreResult<Vec<String>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT doctor_id FROM enrollments WHERE patient_id = ?1 ORDER BY rowid")?;
            let doctors = stmt
                .query_map([patient_id], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(doctors)
        })
    }
}
