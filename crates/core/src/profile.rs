//! Per-role profile views and patient history updates.

use crate::db::Db;
use crate::error::{CoreError, CoreResult};
use crate::role::Role;
use crate::session::SessionContext;
use crate::user::{self, Profile};
use rusqlite::params;
use std::sync::Arc;

#[derive(Clone)]
pub struct ProfileService {
    db: Arc<Db>,
}

impl ProfileService {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    /// Returns the caller's own sanitized record.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the session's user row has gone.
    pub fn get_self(&self, ctx: &SessionContext) -> CoreResult<Profile> {
        self.db.with_conn(|conn| {
            user::find_by_key(conn, ctx.role, &ctx.user_id)?
                .map(|stored| stored.profile)
                .ok_or_else(|| CoreError::NotFound(format!("user '{}'", ctx.user_id)))
        })
    }

    /// Fetches another user's sanitized record under the cross-role rule:
    /// doctors see patients, patients see doctors, nothing else.
    ///
    /// The lookup key is the role-specific identifier, or an email when the
    /// key is email-shaped.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Forbidden`] for a disallowed role pairing and
    /// [`CoreError::NotFound`] for a missing target.
    pub fn get_other(
        &self,
        ctx: &SessionContext,
        target_role: Role,
        target_id: &str,
    ) -> CoreResult<Profile> {
        if !ctx.role.may_view(target_role) {
            return Err(CoreError::Forbidden(format!(
                "role '{}' may not view '{}' profiles",
                ctx.role, target_role
            )));
        }

        self.db.with_conn(|conn| {
            user::find_by_key(conn, target_role, target_id)?
                .map(|stored| stored.profile)
                .ok_or_else(|| CoreError::NotFound(format!("{target_role} '{target_id}'")))
        })
    }

    /// Replaces a patient's clinical history. Doctors only.
    ///
    /// The payload is re-serialized to canonical JSON text before storage.
    /// Any authenticated doctor may annotate any patient record; enrolment is
    /// not consulted here.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Forbidden`] for non-doctor callers and
    /// [`CoreError::NotFound`] when the patient row does not exist.
    pub fn update_patient_history(
        &self,
        ctx: &SessionContext,
        patient_id: &str,
        history: &serde_json::Value,
    ) -> CoreResult<usize> {
        if ctx.role != Role::Doctor {
            return Err(CoreError::Forbidden(
                "only doctors may update patient history".into(),
            ));
        }

        let canonical = serde_json::to_string(history)?;

        self.db.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE patients SET patient_history = ?1 WHERE patient_id = ?2",
                params![canonical, patient_id],
            )?;
            if updated == 0 {
                return Err(CoreError::NotFound(format!("patient '{patient_id}'")));
            }
            Ok(updated)
        })
    }
}
