//! Sanitized user records and their row mappings.
//!
//! Every profile type here is already safe for external exposure: the stored
//! password hash is read only into the crate-private [`StoredUser`] wrapper
//! and never appears in a [`Profile`]. Redaction is structural, not a
//! key-removal afterthought.

use crate::error::CoreResult;
use crate::role::Role;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PatientProfile {
    pub patient_id: String,
    pub name: String,
    pub email: String,
    pub patient_history: Option<serde_json::Value>,
    pub date_of_birth: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DoctorProfile {
    pub doctor_id: String,
    pub name: String,
    pub email: String,
    pub specialisation: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PharmacyProfile {
    pub pharm_id: String,
    pub name: String,
    pub email: String,
}

/// A sanitized user record, one variant per role.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Profile {
    Patient(PatientProfile),
    Doctor(DoctorProfile),
    Pharmacy(PharmacyProfile),
}

impl Profile {
    pub fn role(&self) -> Role {
        match self {
            Profile::Patient(_) => Role::Patient,
            Profile::Doctor(_) => Role::Doctor,
            Profile::Pharmacy(_) => Role::Pharmacist,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Profile::Patient(p) => &p.patient_id,
            Profile::Doctor(d) => &d.doctor_id,
            Profile::Pharmacy(f) => &f.pharm_id,
        }
    }

    pub fn email(&self) -> &str {
        match self {
            Profile::Patient(p) => &p.email,
            Profile::Doctor(d) => &d.email,
            Profile::Pharmacy(f) => &f.email,
        }
    }
}

/// A user row as stored: credential hash plus the sanitized profile.
pub(crate) struct StoredUser {
    pub hash: String,
    pub profile: Profile,
}

fn user_from_row(role: Role, row: &Row<'_>) -> rusqlite::Result<StoredUser> {
    let hash: String = row.get("password_hash")?;
    let profile = match role {
        Role::Patient => Profile::Patient(PatientProfile {
            patient_id: row.get("patient_id")?,
            name: row.get("name")?,
            email: row.get("email")?,
            patient_history: parse_history(row.get::<_, Option<String>>("patient_history")?),
            date_of_birth: row.get("date_of_birth")?,
        }),
        Role::Doctor => Profile::Doctor(DoctorProfile {
            doctor_id: row.get("doctor_id")?,
            name: row.get("name")?,
            email: row.get("email")?,
            specialisation: row.get("specialisation")?,
        }),
        Role::Pharmacist => Profile::Pharmacy(PharmacyProfile {
            pharm_id: row.get("pharm_id")?,
            name: row.get("name")?,
            email: row.get("email")?,
        }),
    };
    Ok(StoredUser { hash, profile })
}

/// Stored histories are canonical JSON; anything else (hand-seeded rows)
/// survives as a raw string value.
fn parse_history(raw: Option<String>) -> Option<serde_json::Value> {
    let raw = raw?;
    if raw.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw)))
}

fn find_by_column(
    conn: &Connection,
    role: Role,
    column: &str,
    key: &str,
) -> CoreResult<Option<StoredUser>> {
    let sql = format!("SELECT * FROM {} WHERE {} = ?1", role.table(), column);
    Ok(conn
        .query_row(&sql, [key], |row| user_from_row(role, row))
        .optional()?)
}

/// Looks a user up by email within the role's table.
pub(crate) fn find_by_email(
    conn: &Connection,
    role: Role,
    email: &str,
) -> CoreResult<Option<StoredUser>> {
    find_by_column(conn, role, "email", email)
}

/// Looks a user up by role-specific identifier, falling back to email when
/// the key is email-shaped (contains `@`).
pub(crate) fn find_by_key(
    conn: &Connection,
    role: Role,
    key: &str,
) -> CoreResult<Option<StoredUser>> {
    if let Some(user) = find_by_column(conn, role, role.id_column(), key)? {
        return Ok(Some(user));
    }
    if key.contains('@') {
        return find_by_email(conn, role, key);
    }
    Ok(None)
}
