//! Queries against the `patients` table.

use crate::patient::Patient;
use crate::{CoreError, CoreResult};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

const COLUMNS: &str = "id, full_name, email, created_at, deleted_at";

fn from_row(row: &PgRow) -> CoreResult<Patient> {
    Ok(Patient {
        id: row.try_get("id")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        created_at: row.try_get("created_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

/// Inserts a new patient and returns the stored row.
///
/// A duplicate email is mapped to `CoreError::Conflict`; the access code is
/// persisted only as its SHA-256 digest.
pub async fn insert(
    pool: &PgPool,
    full_name: &str,
    email: &str,
    access_code_sha256: &str,
) -> CoreResult<Patient> {
    let id = Uuid::new_v4();
    let row = sqlx::query(&format!(
        "INSERT INTO patients (id, full_name, email, access_code_sha256)
         VALUES ($1, $2, $3, $4)
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(full_name)
    .bind(email)
    .bind(access_code_sha256)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if e.as_database_error()
            .is_some_and(|db| db.is_unique_violation())
        {
            CoreError::Conflict("a patient with this email already exists".into())
        } else {
            CoreError::Storage(e)
        }
    })?;

    from_row(&row)
}

/// Whether a non-deleted patient with this id exists.
pub async fn exists_active(pool: &PgPool, id: Uuid) -> CoreResult<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM patients WHERE id = $1 AND deleted_at IS NULL)",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Stored access-code digest for a non-deleted patient, if any.
pub async fn access_code_hash(pool: &PgPool, id: Uuid) -> CoreResult<Option<String>> {
    let hash: Option<String> = sqlx::query_scalar(
        "SELECT access_code_sha256 FROM patients WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(hash)
}
