//! Prescription ledger and the collection-code state machine.
//!
//! A prescription carries exactly one active collection code. Redemption by a
//! pharmacy runs entirely inside one immediate transaction: look the row up
//! by (prescription, pharmacy), compare the supplied code, then either delete
//! (temporary prescriptions) or rotate the code (recurring ones). A wrong
//! code and a missing row are the same non-event to the caller; neither is an
//! error and neither mutates state.

use crate::db::Db;
use crate::error::{CoreError, CoreResult};
use crate::ids;
use crate::role::Role;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Prescription duration. Anything that is not the literal `Temporary`
/// behaves as a lifetime (recurring) prescription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurationType {
    Temporary,
    Lifetime,
}

impl DurationType {
    pub fn parse(input: &str) -> Self {
        if input == "Temporary" {
            DurationType::Temporary
        } else {
            DurationType::Lifetime
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DurationType::Temporary => "Temporary",
            DurationType::Lifetime => "Lifetime",
        }
    }
}

/// Fields for issuing a prescription. Identifier and collection code are
/// generated when absent.
#[derive(Debug, Clone)]
pub struct NewPrescription {
    pub prescription_id: Option<String>,
    pub patient_id: String,
    pub doctor_id: String,
    pub pharm_id: String,
    pub medicine_name: String,
    pub instructions: Option<String>,
    pub date_prescribed: String,
    pub duration_type: DurationType,
    pub collection_code: Option<String>,
}

/// A prescription row as seen by one role. Redaction is structural: patients
/// and doctors never receive the collection code, pharmacies never receive
/// the patient or doctor identifiers.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PrescriptionView {
    pub prescription_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctor_id: Option<String>,
    pub pharm_id: String,
    pub medicine_name: String,
    pub instructions: Option<String>,
    pub date_prescribed: String,
    pub duration_type: DurationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_code: Option<String>,
}

/// Outcome of a redemption attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RedemptionOutcome {
    /// Temporary prescription collected; the row is gone.
    Redeemed,
    /// Recurring prescription collected; a fresh code is active.
    CodeRotated,
    /// Wrong code or no matching row. Nothing changed.
    NotRedeemed,
}

#[derive(Clone)]
pub struct PrescriptionLedger {
    db: Arc<Db>,
}

impl PrescriptionLedger {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    /// Fetches a prescription visible to `user_id` in `role`.
    ///
    /// The row must match both the prescription identifier and the caller's
    /// role-linked ownership column, so every party only ever sees
    /// prescriptions tied to them.
    ///
    /// # Errors
    ///
    /// Returns a database error if the lookup fails.
    pub fn fetch(
        &self,
        user_id: &str,
        role: Role,
        prescription_id: &str,
    ) -> CoreResult<Option<PrescriptionView>> {
        let sql = format!(
            "SELECT prescription_id, patient_id, doctor_id, pharm_id, medicine_name, \
             instructions, date_prescribed, duration_type, collection_code \
             FROM prescriptions WHERE prescription_id = ?1 AND {} = ?2",
            role.id_column()
        );

        self.db.with_conn(|conn| {
            let view = conn
                .query_row(&sql, params![prescription_id, user_id], |row| {
                    view_from_row(role, row)
                })
                .optional()?;
            Ok(view)
        })
    }

    /// Inserts one prescription row, generating the identifier and collection
    /// code when the caller did not supply them. Returns the identifier.
    ///
    /// # Errors
    ///
    /// Any constraint violation (duplicate identifier, unknown patient,
    /// doctor, or pharmacy) surfaces as [`CoreError::CreationFailed`].
    pub fn create(&self, new: NewPrescription) -> CoreResult<String> {
        self.db.with_tx(|tx| {
            let prescription_id = match new.prescription_id {
                Some(id) => id,
                None => ids::new_prescription_id(tx)?,
            };
            let collection_code = new
                .collection_code
                .unwrap_or_else(ids::new_collection_code);

            tx.execute(
                "INSERT INTO prescriptions \
                 (prescription_id, patient_id, doctor_id, pharm_id, medicine_name, \
                  instructions, date_prescribed, duration_type, collection_code) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    prescription_id,
                    new.patient_id,
                    new.doctor_id,
                    new.pharm_id,
                    new.medicine_name,
                    new.instructions,
                    new.date_prescribed,
                    new.duration_type.as_str(),
                    collection_code,
                ],
            )
            .map_err(|e| {
                tracing::error!("prescription insert failed: {e}");
                CoreError::CreationFailed
            })?;

            Ok(prescription_id)
        })
    }

    /// Runs the collection-code state machine for a pharmacy visit.
    ///
    /// The whole read-compare-write sequence executes inside one immediate
    /// transaction, so two concurrent attempts with the correct code resolve
    /// to exactly one winner; the loser sees the rotated (or deleted) state
    /// and reports [`RedemptionOutcome::NotRedeemed`].
    ///
    /// # Errors
    ///
    /// Returns a database error if the transaction fails.
    pub fn redeem(
        &self,
        prescription_id: &str,
        pharm_id: &str,
        supplied_code: &str,
    ) -> CoreResult<RedemptionOutcome> {
        self.db.with_tx(|tx| {
            let row: Option<(String, String)> = tx
                .query_row(
                    "SELECT collection_code, duration_type FROM prescriptions \
                     WHERE prescription_id = ?1 AND pharm_id = ?2",
                    params![prescription_id, pharm_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((stored_code, duration)) = row else {
                return Ok(RedemptionOutcome::NotRedeemed);
            };

            if supplied_code != stored_code {
                return Ok(RedemptionOutcome::NotRedeemed);
            }

            match DurationType::parse(&duration) {
                DurationType::Temporary => {
                    tx.execute(
                        "DELETE FROM prescriptions WHERE prescription_id = ?1 AND pharm_id = ?2",
                        params![prescription_id, pharm_id],
                    )?;
                    Ok(RedemptionOutcome::Redeemed)
                }
                DurationType::Lifetime => {
                    let mut fresh = ids::new_collection_code();
                    while fresh == stored_code {
                        fresh = ids::new_collection_code();
                    }
                    tx.execute(
                        "UPDATE prescriptions SET collection_code = ?1 \
                         WHERE prescription_id = ?2 AND pharm_id = ?3",
                        params![fresh, prescription_id, pharm_id],
                    )?;
                    Ok(RedemptionOutcome::CodeRotated)
                }
            }
        })
    }
}

fn view_from_row(role: Role, row: &Row<'_>) -> rusqlite::Result<PrescriptionView> {
    let patient_id: String = row.get("patient_id")?;
    let doctor_id: String = row.get("doctor_id")?;
    let collection_code: String = row.get("collection_code")?;
    let duration: String = row.get("duration_type")?;

    let is_pharmacy = role == Role::Pharmacist;
    Ok(PrescriptionView {
        prescription_id: row.get("prescription_id")?,
        patient_id: (!is_pharmacy).then_some(patient_id),
        doctor_id: (!is_pharmacy).then_some(doctor_id),
        pharm_id: row.get("pharm_id")?,
        medicine_name: row.get("medicine_name")?,
        instructions: row.get("instructions")?,
        date_prescribed: row.get("date_prescribed")?,
        duration_type: DurationType::parse(&duration),
        collection_code: is_pharmacy.then_some(collection_code),
    })
}
