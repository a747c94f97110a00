//! Queries against the `exam_results` table.

use crate::exam::{ExamFilter, ExamResult, NewExamResult, PageParams};
use crate::{CoreError, CoreResult};
use chrono::NaiveDate;
use lers_types::ExamStatus;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

const COLUMNS: &str =
    "id, patient_id, exam_type, payload, status, requested_at, notes, created_at, updated_at, deleted_at";

fn from_row(row: &PgRow) -> CoreResult<ExamResult> {
    let status_raw: String = row.try_get("status")?;
    let status = status_raw
        .parse::<ExamStatus>()
        .map_err(|e| CoreError::Storage(sqlx::Error::Decode(Box::new(e))))?;

    Ok(ExamResult {
        id: row.try_get("id")?,
        patient_id: row.try_get("patient_id")?,
        exam_type: row.try_get("exam_type")?,
        payload: row.try_get("payload")?,
        status,
        requested_at: row.try_get("requested_at")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

/// Inserts a new exam result and returns the stored row.
///
/// A primary-key collision (client-supplied id already registered) is mapped
/// to `CoreError::Conflict`.
pub async fn insert(
    pool: &PgPool,
    id: Uuid,
    new: &NewExamResult,
    exam_type: &str,
    status: ExamStatus,
) -> CoreResult<ExamResult> {
    let row = sqlx::query(&format!(
        "INSERT INTO exam_results
            (id, patient_id, exam_type, payload, status, requested_at, notes)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(new.patient_id)
    .bind(exam_type)
    .bind(&new.payload)
    .bind(status.as_str())
    .bind(new.requested_at)
    .bind(new.notes.as_deref())
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if e.as_database_error()
            .is_some_and(|db| db.is_unique_violation())
        {
            CoreError::Conflict(format!("exam result {id} is already registered"))
        } else {
            CoreError::Storage(e)
        }
    })?;

    from_row(&row)
}

/// Fetches a non-deleted result by id.
pub async fn fetch(pool: &PgPool, id: Uuid) -> CoreResult<Option<ExamResult>> {
    let row = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM exam_results WHERE id = $1 AND deleted_at IS NULL"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(from_row).transpose()
}

/// Finalizes a pending result, optionally replacing its payload.
///
/// Returns `None` if no pending, non-deleted row matched; the caller decides
/// whether that is a not-found or a conflict.
pub async fn finalize(
    pool: &PgPool,
    id: Uuid,
    payload: Option<&serde_json::Value>,
) -> CoreResult<Option<ExamResult>> {
    let row = sqlx::query(&format!(
        "UPDATE exam_results
         SET status = $2, payload = COALESCE($3, payload), updated_at = NOW()
         WHERE id = $1 AND deleted_at IS NULL AND status = $4
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(ExamStatus::Finalized.as_str())
    .bind(payload)
    .bind(ExamStatus::Pending.as_str())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(from_row).transpose()
}

/// Soft-deletes a result. Returns whether a live row was affected.
pub async fn soft_delete(pool: &PgPool, id: Uuid) -> CoreResult<bool> {
    let result = sqlx::query(
        "UPDATE exam_results
         SET deleted_at = NOW(), updated_at = NOW()
         WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Restores a soft-deleted result, returning the restored row if one matched.
pub async fn restore(pool: &PgPool, id: Uuid) -> CoreResult<Option<ExamResult>> {
    let row = sqlx::query(&format!(
        "UPDATE exam_results
         SET deleted_at = NULL, updated_at = NOW()
         WHERE id = $1 AND deleted_at IS NOT NULL
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(from_row).transpose()
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ExamFilter) {
    if let Some(exam_type) = &filter.exam_type {
        qb.push(" AND exam_type = ");
        qb.push_bind(exam_type.clone());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ");
        qb.push_bind(status.as_str());
    }
    if let Some(from) = filter.from {
        qb.push(" AND requested_at >= ");
        qb.push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND requested_at <= ");
        qb.push_bind(to);
    }
}

/// Lists one page of a patient's results plus the unpaginated total count.
pub async fn list_for_patient(
    pool: &PgPool,
    patient_id: Uuid,
    filter: &ExamFilter,
    params: PageParams,
) -> CoreResult<(Vec<ExamResult>, i64)> {
    let mut count_qb = QueryBuilder::<Postgres>::new(
        "SELECT COUNT(*) FROM exam_results WHERE deleted_at IS NULL AND patient_id = ",
    );
    count_qb.push_bind(patient_id);
    push_filter(&mut count_qb, filter);
    let total_count: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT {COLUMNS} FROM exam_results WHERE deleted_at IS NULL AND patient_id = "
    ));
    qb.push_bind(patient_id);
    push_filter(&mut qb, filter);
    qb.push(" ORDER BY requested_at DESC NULLS LAST, created_at DESC LIMIT ");
    qb.push_bind(params.limit());
    qb.push(" OFFSET ");
    qb.push_bind(params.offset());

    let rows = qb.build().fetch_all(pool).await?;
    let items = rows.iter().map(from_row).collect::<CoreResult<Vec<_>>>()?;

    Ok((items, total_count))
}

/// Counts non-deleted results grouped by status, optionally bounded by
/// `requested_at`. Statuses with no rows are absent from the output.
pub async fn counts_by_status(
    pool: &PgPool,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> CoreResult<Vec<(ExamStatus, i64)>> {
    let mut qb = QueryBuilder::<Postgres>::new(
        "SELECT status, COUNT(*) AS count FROM exam_results WHERE deleted_at IS NULL",
    );
    if let Some(from) = from {
        qb.push(" AND requested_at >= ");
        qb.push_bind(from);
    }
    if let Some(to) = to {
        qb.push(" AND requested_at <= ");
        qb.push_bind(to);
    }
    qb.push(" GROUP BY status");

    let rows = qb.build().fetch_all(pool).await?;
    rows.iter()
        .map(|row| {
            let status_raw: String = row.try_get("status")?;
            let status = status_raw
                .parse::<ExamStatus>()
                .map_err(|e| CoreError::Storage(sqlx::Error::Decode(Box::new(e))))?;
            let count: i64 = row.try_get("count")?;
            Ok((status, count))
        })
        .collect()
}
