//! The closed set of user roles and their storage capabilities.
//!
//! Every role-dependent decision in the system — which table a user lives in,
//! which column carries their identifier, who may view whom — goes through
//! this one capability table instead of scattered string comparisons.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Doctor,
    Pharmacist,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Patient, Role::Doctor, Role::Pharmacist];

    /// Parses a role from its route-segment form.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] for anything other than `patient`,
    /// `doctor`, or `pharmacist`.
    pub fn parse(input: &str) -> CoreResult<Self> {
        match input {
            "patient" => Ok(Role::Patient),
            "doctor" => Ok(Role::Doctor),
            "pharmacist" => Ok(Role::Pharmacist),
            other => Err(CoreError::Validation(format!("unknown role: '{other}'"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Pharmacist => "pharmacist",
        }
    }

    /// The SQL table holding this role's user rows.
    pub fn table(self) -> &'static str {
        match self {
            Role::Patient => "patients",
            Role::Doctor => "doctors",
            Role::Pharmacist => "pharmacies",
        }
    }

    /// The identifier column for this role, shared by the user tables and the
    /// prescription ledger's ownership columns.
    pub fn id_column(self) -> &'static str {
        match self {
            Role::Patient => "patient_id",
            Role::Doctor => "doctor_id",
            Role::Pharmacist => "pharm_id",
        }
    }

    /// Cross-role profile visibility: a doctor may view a patient and a
    /// patient may view a doctor. Every other combination, pharmacists
    /// included, is refused.
    pub fn may_view(self, target: Role) -> bool {
        matches!(
            (self, target),
            (Role::Doctor, Role::Patient) | (Role::Patient, Role::Doctor)
        )
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_route_segments() {
        assert_eq!(Role::parse("patient").unwrap(), Role::Patient);
        assert_eq!(Role::parse("doctor").unwrap(), Role::Doctor);
        assert_eq!(Role::parse("pharmacist").unwrap(), Role::Pharmacist);
    }

    #[test]
    fn test_parse_rejects_unknown_role() {
        let err = Role::parse("admin").expect_err("unknown role should fail");
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_visibility_is_doctor_patient_only() {
        assert!(Role::Doctor.may_view(Role::Patient));
        assert!(Role::Patient.may_view(Role::Doctor));

        assert!(!Role::Patient.may_view(Role::Patient));
        assert!(!Role::Doctor.may_view(Role::Doctor));
        for role in Role::ALL {
            assert!(!Role::Pharmacist.may_view(role));
            assert!(!role.may_view(Role::Pharmacist));
        }
    }
}
