//! Patient enrolment.
//!
//! Patients are enrolled by a lab submitter, not self-registered. The access
//! code handed out at enrolment is what the patient later exchanges for a
//! bearer token.

use crate::repositories::patients;
use crate::{principal, CoreError, CoreResult, Principal};
use chrono::{DateTime, Utc};
use lers_types::NonEmptyText;
use sqlx::PgPool;
use uuid::Uuid;

/// Shortest access code accepted at enrolment.
const MIN_ACCESS_CODE_LEN: usize = 12;

/// A data subject entitled to read their own exam results.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Patient {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Patient enrolment operations.
#[derive(Clone)]
pub struct PatientService {
    pool: PgPool,
}

impl PatientService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enrols a new patient.
    ///
    /// The access code is stored as a SHA-256 digest only.
    ///
    /// # Errors
    ///
    /// - `Authorization` if the caller is not a submitter.
    /// - `Validation` for an empty name, a malformed email, or an access code
    ///   shorter than 12 characters.
    /// - `Conflict` if the email is already enrolled.
    pub async fn enrol(
        &self,
        principal: &Principal,
        full_name: &str,
        email: &str,
        access_code: &str,
    ) -> CoreResult<Patient> {
        principal.require_submitter()?;

        let full_name = NonEmptyText::new(full_name)?;
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(CoreError::Validation(
                "email must be a valid address".into(),
            ));
        }
        if access_code.len() < MIN_ACCESS_CODE_LEN {
            return Err(CoreError::Validation(format!(
                "access_code must have at least {MIN_ACCESS_CODE_LEN} characters"
            )));
        }

        let digest = principal::hash_access_code(access_code);
        let patient = patients::insert(&self.pool, full_name.as_str(), email, &digest).await?;

        tracing::info!(patient_id = %patient.id, "patient enrolled");
        Ok(patient)
    }
}
