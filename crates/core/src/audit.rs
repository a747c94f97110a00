//! Audit trail over exam result mutations.
//!
//! Every successful register, finalize, delete and restore appends an entry
//! recording which principal did what to which result, and when. Recording is
//! best-effort: a failed audit insert is logged but never fails the mutation
//! it describes.

use crate::exam::{PageParams, Paginated};
use crate::repositories::audit;
use crate::{CoreResult, Principal};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

/// Error returned when parsing an unknown audit action.
#[derive(Debug, thiserror::Error)]
#[error("unknown audit action: {0}")]
pub struct ActionParseError(pub String);

/// Mutation kinds recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Registered,
    Finalized,
    Deleted,
    Restored,
}

impl AuditAction {
    /// Canonical lowercase storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Registered => "registered",
            AuditAction::Finalized => "finalized",
            AuditAction::Deleted => "deleted",
            AuditAction::Restored => "restored",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = ActionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registered" => Ok(AuditAction::Registered),
            "finalized" => Ok(AuditAction::Finalized),
            "deleted" => Ok(AuditAction::Deleted),
            "restored" => Ok(AuditAction::Restored),
            other => Err(ActionParseError(other.to_owned())),
        }
    }
}

/// One recorded mutation.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub result_id: Uuid,
    pub action: AuditAction,
    pub actor_role: String,
    pub actor_client_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Optional filters for audit listings.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub result_id: Option<Uuid>,
    /// Inclusive lower bound on the recorded date.
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on the recorded date.
    pub to: Option<NaiveDate>,
}

/// Read access to the audit trail.
#[derive(Clone)]
pub struct AuditService {
    pool: PgPool,
}

impl AuditService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lists audit entries, newest first. Submitter only.
    ///
    /// # Errors
    ///
    /// Returns `Authorization` if the caller is not a submitter.
    pub async fn trail(
        &self,
        principal: &Principal,
        filter: AuditFilter,
        params: PageParams,
    ) -> CoreResult<Paginated<AuditEntry>> {
        principal.require_submitter()?;

        let (items, total_count) = audit::list(&self.pool, &filter, params).await?;
        Ok(Paginated::new(items, total_count, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::schema;
    use crate::CoreError;

    fn dead_service() -> AuditService {
        AuditService::new(schema::connect_lazy(&crate::exam::tests::dead_config()))
    }

    #[test]
    fn audit_action_round_trips_through_str() {
        for action in [
            AuditAction::Registered,
            AuditAction::Finalized,
            AuditAction::Deleted,
            AuditAction::Restored,
        ] {
            assert_eq!(action.as_str().parse::<AuditAction>().unwrap(), action);
        }
        assert!("updated".parse::<AuditAction>().is_err());
    }

    #[tokio::test]
    async fn trail_rejects_patient_callers_before_any_query() {
        let principal = Principal::Patient {
            patient_id: Uuid::new_v4(),
        };
        let result = dead_service()
            .trail(&principal, AuditFilter::default(), PageParams::default())
            .await;
        assert!(matches!(result, Err(CoreError::Authorization(_))));
    }
}
