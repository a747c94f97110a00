//! Queries against the `auth_tokens` table.

use crate::principal::{Principal, ROLE_PATIENT, ROLE_SUBMITTER};
use crate::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Persists a freshly issued token for later validation.
pub async fn insert(
    pool: &PgPool,
    token: &str,
    principal: &Principal,
    expires_at: DateTime<Utc>,
) -> CoreResult<()> {
    let (client_id, patient_id) = match principal {
        Principal::Submitter { client_id } => (Some(client_id.as_str()), None),
        Principal::Patient { patient_id } => (None, Some(*patient_id)),
    };

    sqlx::query(
        "INSERT INTO auth_tokens (id, token, role, client_id, patient_id, expires_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(Uuid::new_v4())
    .bind(token)
    .bind(principal.role())
    .bind(client_id)
    .bind(patient_id)
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Resolves an unexpired token to its principal.
///
/// Returns `None` for unknown or expired tokens; a stored row that cannot be
/// reconstructed into a principal surfaces as a decode error.
pub async fn lookup_valid(pool: &PgPool, token: &str) -> CoreResult<Option<Principal>> {
    let row = sqlx::query(
        "SELECT role, client_id, patient_id FROM auth_tokens
         WHERE token = $1 AND expires_at > NOW()",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let role: String = row.try_get("role")?;
    let principal = match role.as_str() {
        ROLE_SUBMITTER => {
            let client_id: Option<String> = row.try_get("client_id")?;
            Principal::Submitter {
                client_id: client_id.ok_or_else(|| {
                    CoreError::Storage(sqlx::Error::Decode(
                        "submitter token without client_id".into(),
                    ))
                })?,
            }
        }
        ROLE_PATIENT => {
            let patient_id: Option<Uuid> = row.try_get("patient_id")?;
            Principal::Patient {
                patient_id: patient_id.ok_or_else(|| {
                    CoreError::Storage(sqlx::Error::Decode(
                        "patient token without patient_id".into(),
                    ))
                })?,
            }
        }
        other => {
            return Err(CoreError::Storage(sqlx::Error::Decode(
                format!("unknown token role: {other}").into(),
            )))
        }
    };

    Ok(Some(principal))
}

/// Deletes all expired tokens, returning the number removed.
pub async fn delete_expired(pool: &PgPool) -> CoreResult<u64> {
    let result = sqlx::query("DELETE FROM auth_tokens WHERE expires_at <= NOW()")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
