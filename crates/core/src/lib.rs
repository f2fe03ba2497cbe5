//! # MediLink Core
//!
//! Domain logic for the MediLink clinical records system.
//!
//! This crate contains the role-partitioned credential store, session-based
//! authorization, per-role profile views, doctor-patient enrollments with
//! encrypted message histories, the prescription collection-code ledger, and
//! the append-only audit recorder.
//!
//! **No API concerns**: HTTP routing, request/response shapes, and cookie
//! handling belong in `api-rest`.

pub mod audit;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod db;
pub mod enrollment;
pub mod error;
pub mod ids;
pub mod messaging;
pub mod notice;
pub mod password;
pub mod prescription;
pub mod profile;
pub mod role;
pub mod session;
pub mod user;

pub use audit::AuditRecorder;
pub use auth::{AuthService, Registration};
pub use config::CoreConfig;
pub use crypto::MessageCipher;
pub use db::Db;
pub use enrollment::EnrollmentRegistry;
pub use error::{CoreError, CoreResult};
pub use messaging::{Message, MessageVault};
pub use notice::{Notice, NoticeBoard};
pub use prescription::{
    DurationType, NewPrescription, PrescriptionLedger, PrescriptionView, RedemptionOutcome,
};
pub use profile::ProfileService;
pub use role::Role;
pub use session::{SessionContext, SessionStore};
pub use user::{DoctorProfile, PatientProfile, PharmacyProfile, Profile};
