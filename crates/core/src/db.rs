//! SQLite storage handle.
//!
//! A single [`Db`] is shared by every service. The connection sits behind a
//! `Mutex`: each operation locks it for exactly its own duration, and the
//! guard drop releases it on every exit path, errors included. SQLite itself
//! serialises writes; multi-step read-modify-write sequences additionally run
//! inside an immediate transaction via [`Db::with_tx`] so that concurrent
//! callers observe at most one winner.
//!
//! A poisoned mutex (a panic in another thread mid-operation) causes a panic
//! here as well. Fail-fast is intentional for clinical data integrity.

use crate::error::CoreResult;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::Mutex;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS patients(
    patient_id TEXT NOT NULL PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    patient_history TEXT,
    date_of_birth TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS doctors(
    doctor_id TEXT NOT NULL PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    specialisation TEXT
);

CREATE TABLE IF NOT EXISTS pharmacies(
    pharm_id TEXT NOT NULL PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS enrollments(
    doctor_id TEXT NOT NULL,
    patient_id TEXT NOT NULL,
    msg_history TEXT,
    PRIMARY KEY (doctor_id, patient_id),
    FOREIGN KEY (doctor_id) REFERENCES doctors (doctor_id),
    FOREIGN KEY (patient_id) REFERENCES patients (patient_id)
);

CREATE TABLE IF NOT EXISTS prescriptions(
    prescription_id TEXT NOT NULL PRIMARY KEY,
    patient_id TEXT NOT NULL,
    doctor_id TEXT NOT NULL,
    pharm_id TEXT NOT NULL,
    medicine_name TEXT NOT NULL,
    instructions TEXT,
    date_prescribed TEXT NOT NULL,
    duration_type TEXT NOT NULL,
    collection_code TEXT NOT NULL,
    FOREIGN KEY (patient_id) REFERENCES patients (patient_id),
    FOREIGN KEY (doctor_id) REFERENCES doctors (doctor_id),
    FOREIGN KEY (pharm_id) REFERENCES pharmacies (pharm_id)
);

CREATE TABLE IF NOT EXISTS notices(
    notice_id TEXT NOT NULL PRIMARY KEY,
    patient_id TEXT NOT NULL,
    doctor_id TEXT NOT NULL,
    date TEXT NOT NULL,
    message TEXT NOT NULL,
    FOREIGN KEY (patient_id) REFERENCES patients (patient_id),
    FOREIGN KEY (doctor_id) REFERENCES doctors (doctor_id)
);
";

/// Shared database handle.
pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    /// Opens (creating if necessary) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns a database error if the file cannot be opened or configured.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::configure(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns a database error if the connection cannot be created.
    pub fn in_memory() -> CoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn configure(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    }

    /// Creates all tables if they do not exist. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a database error if schema creation fails.
    pub fn init_schema(&self) -> CoreResult<()> {
        self.with_conn(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
    }

    /// Runs `f` with the connection held for the duration of the call.
    ///
    /// # Errors
    ///
    /// Propagates whatever `f` returns.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> CoreResult<T>) -> CoreResult<T> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        f(&conn)
    }

    /// Runs `f` inside a single immediate transaction.
    ///
    /// The transaction commits when `f` returns `Ok` and rolls back on `Err`
    /// or panic, so multi-step sequences like code redemption are atomic with
    /// respect to other callers.
    ///
    /// # Errors
    ///
    /// Propagates transaction failures and whatever `f` returns.
    pub fn with_tx<T>(&self, f: impl FnOnce(&Transaction<'_>) -> CoreResult<T>) -> CoreResult<T> {
        let mut conn = self.conn.lock().expect("database mutex poisoned");
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}
