//! Identifier allocation.
//!
//! User identifiers are two uppercase letters followed by a five-digit
//! zero-padded counter (`BM00001`). The prefix is drawn at random and the
//! counter continues from the highest existing identifier with that prefix in
//! the role's table. Allocation retries with a fresh prefix on the
//! (pathological) chance a prefix's counter space is exhausted, mirroring the
//! bounded-retry allocation used elsewhere in the workspace's lineage.
//!
//! Prescription and notice identifiers share one global numeric sequence each
//! under a fixed prefix (`RX00001`, `NT00001`). Collection codes are random
//! six-digit zero-padded strings.

use crate::error::{CoreError, CoreResult};
use rand::Rng;
use rusqlite::{Connection, OptionalExtension};

const ID_ALLOC_ATTEMPTS: usize = 5;
const MAX_SEQUENCE: u32 = 99_999;

pub const PRESCRIPTION_PREFIX: &str = "RX";
pub const NOTICE_PREFIX: &str = "NT";

/// Allocates a fresh user identifier in `table`, unique within `id_column`.
///
/// # Errors
///
/// Returns [`CoreError::Validation`] if no free identifier could be found
/// after a bounded number of prefix draws, or a database error if the lookup
/// fails.
pub fn new_user_id(conn: &Connection, table: &str, id_column: &str) -> CoreResult<String> {
    let mut rng = rand::thread_rng();

    for _attempt in 0..ID_ALLOC_ATTEMPTS {
        let prefix: String = (0..2).map(|_| rng.gen_range(b'A'..=b'Z') as char).collect();
        match next_in_prefix(conn, table, id_column, &prefix)? {
            Some(id) => return Ok(id),
            None => continue,
        }
    }

    Err(CoreError::Validation(format!(
        "failed to allocate an identifier in {table} after {ID_ALLOC_ATTEMPTS} attempts"
    )))
}

/// Allocates the next prescription identifier (`RX` + global sequence).
///
/// # Errors
///
/// Returns a database error if the sequence lookup fails.
pub fn new_prescription_id(conn: &Connection) -> CoreResult<String> {
    next_in_sequence(conn, "prescriptions", "prescription_id", PRESCRIPTION_PREFIX)
}

/// Allocates the next notice identifier (`NT` + global sequence).
///
/// # Errors
///
/// Returns a database error if the sequence lookup fails.
pub fn new_notice_id(conn: &Connection) -> CoreResult<String> {
    next_in_sequence(conn, "notices", "notice_id", NOTICE_PREFIX)
}

/// Generates a random six-digit zero-padded collection code.
pub fn new_collection_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

/// Returns true if `input` is in canonical identifier form: two uppercase
/// letters followed by five digits.
pub fn is_canonical_id(input: &str) -> bool {
    input.len() == 7
        && input.as_bytes()[..2].iter().all(u8::is_ascii_uppercase)
        && input.as_bytes()[2..].iter().all(u8::is_ascii_digit)
}

fn next_in_prefix(
    conn: &Connection,
    table: &str,
    id_column: &str,
    prefix: &str,
) -> CoreResult<Option<String>> {
    let sql = format!(
        "SELECT {id_column} FROM {table} WHERE {id_column} LIKE ?1 ORDER BY {id_column} DESC LIMIT 1"
    );
    let highest: Option<String> = conn
        .query_row(&sql, [format!("{prefix}%")], |row| row.get(0))
        .optional()?;

    let next = match highest {
        None => 1,
        Some(id) => match id[2..].parse::<u32>() {
            Ok(seq) if seq < MAX_SEQUENCE => seq + 1,
            // Exhausted or unparsable counter space; caller draws a new prefix.
            _ => return Ok(None),
        },
    };

    Ok(Some(format!("{prefix}{next:05}")))
}

fn next_in_sequence(
    conn: &Connection,
    table: &str,
    id_column: &str,
    prefix: &str,
) -> CoreResult<String> {
    // One global sequence: the numeric suffix grows past the highest suffix of
    // any existing row, caller-supplied identifiers included.
    let sql = format!("SELECT MAX(CAST(SUBSTR({id_column}, 3) AS INTEGER)) FROM {table}");
    let highest: Option<i64> = conn.query_row(&sql, [], |row| row.get(0))?;
    let next = highest.unwrap_or(0) + 1;
    Ok(format!("{prefix}{next:05}"))
}
