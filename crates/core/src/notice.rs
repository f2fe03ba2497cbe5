//! Doctor-to-patient notices.
//!
//! A notice is a short dated announcement from a doctor to one of their
//! enrolled patients — appointment reminders and the like. Unlike messages,
//! notices are stored in the clear and are append-only in scope.

use crate::db::Db;
use crate::error::CoreResult;
use crate::ids;
use rusqlite::params;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub notice_id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub date: String,
    pub message: String,
}

#[derive(Clone)]
pub struct NoticeBoard {
    db: Arc<Db>,
}

impl NoticeBoard {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    /// Posts a notice and returns its generated identifier.
    ///
    /// Enrollment gating is the caller's responsibility, as with messaging.
    ///
    /// # Errors
    ///
    /// Returns a database error if the insert fails (unknown doctor or
    /// patient included).
    pub fn post(
        &self,
        doctor_id: &str,
        patient_id: &str,
        date: &str,
        message: &str,
    ) -> CoreResult<String> {
        self.db.with_tx(|tx| {
            let notice_id = ids::new_notice_id(tx)?;
            tx.execute(
                "INSERT INTO notices (notice_id, patient_id, doctor_id, date, message) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![notice_id, patient_id, doctor_id, date, message],
            )?;
            Ok(notice_id)
        })
    }

    /// All notices for a patient, in posting order.
    ///
    /// # Errors
    ///
    /// Returns a database error if the lookup fails.
    pub fn list_for_patient(&self, patient_id: &str) -> CoreResult<Vec<Notice>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT notice_id, patient_id, doctor_id, date, message \
                 FROM notices WHERE patient_id = ?1 ORDER BY rowid",
            )?;
            let notices = stmt
                .query_map([patient_id], |row| {
                    Ok(Notice {
                        notice_id: row.get(0)?,
                        patient_id: row.get(1)?,
                        doctor_id: row.get(2)?,
                        date: row.get(3)?,
                        message: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(notices)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_board() -> NoticeBoard {
        let db = Arc::new(Db::in_memory().expect("in-memory database should open"));
        db.init_schema().expect("schema init should succeed");
        db.with_conn(|conn| {
            conn.execute_batch(
                "INSERT INTO doctors (doctor_id, name, email, password_hash) \
                 VALUES ('TC00001', 'Dr. Shoko Ieiri', 'doctor1@example.com', 'h');
                 INSERT INTO patients (patient_id, name, email, password_hash, date_of_birth) \
                 VALUES ('BM00001', 'Baku Madarame', 'patient1@example.com', 'h', '1970-01-01');",
            )?;
            Ok(())
        })
        .expect("seeding should succeed");
        NoticeBoard::new(db)
    }

    #[test]
    fn test_post_then_list_in_order() {
        let board = seeded_board();
        let first = board
            .post("TC00001", "BM00001", "2025-12-11", "Appointment at 10:00 AM.")
            .expect("post should succeed");
        let second = board
            .post("TC00001", "BM00001", "2025-12-12", "Bring previous results.")
            .expect("post should succeed");
        assert_ne!(first, second);
        assert_eq!(&first[..2], "NT");

        let notices = board
            .list_for_patient("BM00001")
            .expect("list should succeed");
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[0].notice_id, first);
        assert_eq!(notices[0].message, "Appointment at 10:00 AM.");
        assert_eq!(notices[1].notice_id, second);
    }

    #[test]
    fn test_post_rejects_unknown_patient() {
        let board = seeded_board();
        let result = board.post("TC00001", "ZZ99999", "2025-12-11", "hello");
        assert!(result.is_err(), "dangling patient reference should fail");
    }
}
