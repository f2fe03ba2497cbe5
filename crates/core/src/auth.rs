//! Authentication and registration.
//!
//! Registration allocates a role-scoped identifier, hashes the password, and
//! inserts the user row. For patients the enrollment with their chosen doctor
//! is inserted in the same transaction: either both rows commit or neither
//! does, so a failed registration leaves the email reusable.

use crate::db::Db;
use crate::error::{CoreError, CoreResult};
use crate::ids;
use crate::password::{hash_password, verify_password};
use crate::role::Role;
use crate::user::{self, Profile};
use medilink_types::{EmailAddress, NonEmptyText};
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

/// Fields accepted at registration. Role-specific fields are optional here
/// and validated per role in [`AuthService::register`].
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: NonEmptyText,
    pub email: EmailAddress,
    pub password: NonEmptyText,
    /// Patients only: date of birth, required.
    pub date_of_birth: Option<String>,
    /// Patients only: the existing doctor to enrol with, required.
    pub doctor_id: Option<String>,
    /// Patients only: optional initial clinical history.
    pub patient_history: Option<serde_json::Value>,
    /// Doctors only: optional specialisation.
    pub specialisation: Option<String>,
}

/// Credential verification and account creation.
#[derive(Clone)]
pub struct AuthService {
    db: Arc<Db>,
}

impl AuthService {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    /// Verifies credentials against the role's table.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidCredentials`] when the email is unknown or
    /// the password does not verify; the two cases are indistinguishable to
    /// the caller.
    pub fn authenticate(&self, email: &str, password: &str, role: Role) -> CoreResult<Profile> {
        self.db.with_conn(|conn| {
            match user::find_by_email(conn, role, email)? {
                Some(stored) if verify_password(&stored.hash, password) => Ok(stored.profile),
                _ => Err(CoreError::InvalidCredentials),
            }
        })
    }

    /// Registers a new user and, for patients, their doctor enrollment.
    ///
    /// # Errors
    ///
    /// - [`CoreError::EmailTaken`] if the email exists in the role's table;
    /// - [`CoreError::Validation`] for missing role-specific fields;
    /// - [`CoreError::InvalidDoctor`] when a patient names an unknown doctor;
    /// - [`CoreError::RegistrationFailed`] when the row inserts fail — the
    ///   transaction has rolled back and nothing persists.
    pub fn register(&self, role: Role, reg: Registration) -> CoreResult<Profile> {
        let password_hash = hash_password(reg.password.as_str())?;

        self.db.with_tx(|tx| {
            if user::find_by_email(tx, role, reg.email.as_str())?.is_some() {
                return Err(CoreError::EmailTaken);
            }

            let user_id = ids::new_user_id(tx, role.table(), role.id_column())?;

            match role {
                Role::Patient => {
                    let date_of_birth = reg.date_of_birth.as_deref().ok_or_else(|| {
                        CoreError::Validation("patient registration requires date_of_birth".into())
                    })?;
                    let doctor_id = reg.doctor_id.as_deref().ok_or_else(|| {
                        CoreError::Validation("patient registration requires doctor_id".into())
                    })?;

                    let doctor_exists: Option<i64> = tx
                        .query_row(
                            "SELECT 1 FROM doctors WHERE doctor_id = ?1",
                            [doctor_id],
                            |row| row.get(0),
                        )
                        .optional()?;
                    if doctor_exists.is_none() {
                        return Err(CoreError::InvalidDoctor(doctor_id.to_owned()));
                    }

                    let history = reg
                        .patient_history
                        .as_ref()
                        .map(serde_json::to_string)
                        .transpose()?;

                    tx.execute(
                        "INSERT INTO patients \
                         (patient_id, name, email, password_hash, patient_history, date_of_birth) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            user_id,
                            reg.name.as_str(),
                            reg.email.as_str(),
                            password_hash,
                            history,
                            date_of_birth,
                        ],
                    )
                    .map_err(|e| registration_failed("patient insert", e))?;

                    // Same transaction as the user row: the enrollment either
                    // commits with it or rolls the whole registration back.
                    tx.execute(
                        "INSERT INTO enrollments (doctor_id, patient_id, msg_history) \
                         VALUES (?1, ?2, '[]')",
                        params![doctor_id, user_id],
                    )
                    .map_err(|e| registration_failed("enrollment insert", e))?;
                }
                Role::Doctor => {
                    tx.execute(
                        "INSERT INTO doctors \
                         (doctor_id, name, email, password_hash, specialisation) \
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            user_id,
                            reg.name.as_str(),
                            reg.email.as_str(),
                            password_hash,
                            reg.specialisation,
                        ],
                    )
                    .map_err(|e| registration_failed("doctor insert", e))?;
                }
                Role::Pharmacist => {
                    tx.execute(
                        "INSERT INTO pharmacies (pharm_id, name, email, password_hash) \
                         VALUES (?1, ?2, ?3, ?4)",
                        params![user_id, reg.name.as_str(), reg.email.as_str(), password_hash],
                    )
                    .map_err(|e| registration_failed("pharmacy insert", e))?;
                }
            }

            user::find_by_email(tx, role, reg.email.as_str())?
                .map(|stored| stored.profile)
                .ok_or(CoreError::RegistrationFailed)
        })
    }
}

fn registration_failed(step: &str, err: rusqlite::Error) -> CoreError {
    tracing::error!("registration {step} failed: {err}");
    CoreError::RegistrationFailed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        let db = Db::in_memory().expect("in-memory database should open");
        db.init_schema().expect("schema init should succeed");
        AuthService::new(Arc::new(db))
    }

    fn registration(email: &str) -> Registration {
        Registration {
            name: NonEmptyText::new("Dr. Shoko Ieiri").unwrap(),
            email: EmailAddress::parse(email).unwrap(),
            password: NonEmptyText::new("qwerty").unwrap(),
            date_of_birth: None,
            doctor_id: None,
            patient_history: None,
            specialisation: Some("Reversed Cursed Technique".into()),
        }
    }

    fn patient_registration(email: &str, doctor_id: &str) -> Registration {
        Registration {
            name: NonEmptyText::new("Baku Madarame").unwrap(),
            email: EmailAddress::parse(email).unwrap(),
            password: NonEmptyText::new("password123").unwrap(),
            date_of_birth: Some("1970-01-01".into()),
            doctor_id: Some(doctor_id.into()),
            patient_history: Some(serde_json::json!({"allergies": ["N/A"]})),
            specialisation: None,
        }
    }

    #[test]
    fn test_register_then_authenticate() {
        let auth = service();
        let profile = auth
            .register(Role::Doctor, registration("doctor1@example.com"))
            .expect("registration should succeed");
        assert_eq!(profile.role(), Role::Doctor);

        let authed = auth
            .authenticate("doctor1@example.com", "qwerty", Role::Doctor)
            .expect("correct credentials should authenticate");
        assert_eq!(authed.user_id(), profile.user_id());

        let err = auth
            .authenticate("doctor1@example.com", "wrong", Role::Doctor)
            .expect_err("wrong password should fail");
        assert!(matches!(err, CoreError::InvalidCredentials));
    }

    #[test]
    fn test_authenticated_profile_has_no_password_field() {
        let auth = service();
        auth.register(Role::Doctor, registration("doctor1@example.com"))
            .expect("registration should succeed");

        let profile = auth
            .authenticate("doctor1@example.com", "qwerty", Role::Doctor)
            .expect("authentication should succeed");
        let json = serde_json::to_string(&profile).expect("profile should serialize");
        assert!(!json.contains("password"));
    }

    #[test]
    fn test_duplicate_email_is_conflict() {
        let auth = service();
        auth.register(Role::Doctor, registration("doctor1@example.com"))
            .expect("first registration should succeed");

        let err = auth
            .register(Role::Doctor, registration("doctor1@example.com"))
            .expect_err("duplicate email should fail");
        assert!(matches!(err, CoreError::EmailTaken));
    }

    #[test]
    fn test_patient_registration_creates_enrollment() {
        let auth = service();
        let doctor = auth
            .register(Role::Doctor, registration("doctor1@example.com"))
            .expect("doctor registration should succeed");

        let patient = auth
            .register(
                Role::Patient,
                patient_registration("patient1@example.com", doctor.user_id()),
            )
            .expect("patient registration should succeed");

        let enrolled: i64 = auth
            .db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM enrollments WHERE doctor_id = ?1 AND patient_id = ?2 \
                     AND msg_history = '[]'",
                    params![doctor.user_id(), patient.user_id()],
                    |r| r.get(0),
                )?)
            })
            .expect("enrollment query should succeed");
        assert_eq!(enrolled, 1, "enrollment row with empty history expected");
    }

    #[test]
    fn test_patient_registration_requires_known_doctor() {
        let auth = service();
        let err = auth
            .register(
                Role::Patient,
                patient_registration("patient1@example.com", "ZZ99999"),
            )
            .expect_err("unknown doctor should fail");
        assert!(matches!(err, CoreError::InvalidDoctor(_)));
    }

    #[test]
    fn test_failed_registration_leaves_email_reusable() {
        let auth = service();
        let doctor = auth
            .register(Role::Doctor, registration("doctor1@example.com"))
            .expect("doctor registration should succeed");

        // First attempt fails after validation work has begun.
        auth.register(
            Role::Patient,
            patient_registration("patient1@example.com", "ZZ99999"),
        )
        .expect_err("unknown doctor should fail");

        // The same email registers cleanly: no half-written user row survived.
        auth.register(
            Role::Patient,
            patient_registration("patient1@example.com", doctor.user_id()),
        )
        .expect("email should be reusable after a failed attempt");
    }
}
