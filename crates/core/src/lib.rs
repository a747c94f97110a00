//! Core domain logic for the laboratory exam results service.
//!
//! Everything transport-independent lives here: configuration, the error
//! taxonomy, credential handling, patient enrolment, and the exam result
//! lifecycle. The REST layer in `api-rest` is a thin mapping onto these
//! services; nothing in this crate knows about HTTP.

pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod exam;
pub mod patient;
pub mod principal;
pub mod repositories;

pub use audit::{AuditAction, AuditEntry, AuditFilter, AuditService};
pub use auth::AuthService;
pub use config::{CoreConfig, DbConfig};
pub use error::{CoreError, CoreResult};
pub use exam::{
    BulkFinalizeOutcome, BulkSkip, ExamFilter, ExamResult, ExamService, NewExamResult, PageParams,
    Paginated, StatusCount,
};
pub use patient::{Patient, PatientService};
pub use principal::{Principal, TokenGrant};
