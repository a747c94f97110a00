//! Queries against the `exam_result_audit` table.

use crate::audit::{AuditAction, AuditEntry, AuditFilter};
use crate::exam::PageParams;
use crate::{CoreError, CoreResult, Principal};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

const COLUMNS: &str = "id, result_id, action, actor_role, actor_client_id, recorded_at";

fn from_row(row: &PgRow) -> CoreResult<AuditEntry> {
    let action_raw: String = row.try_get("action")?;
    let action = action_raw
        .parse::<AuditAction>()
        .map_err(|e| CoreError::Storage(sqlx::Error::Decode(Box::new(e))))?;

    Ok(AuditEntry {
        id: row.try_get("id")?,
        result_id: row.try_get("result_id")?,
        action,
        actor_role: row.try_get("actor_role")?,
        actor_client_id: row.try_get("actor_client_id")?,
        recorded_at: row.try_get("recorded_at")?,
    })
}

/// Appends one audit entry for a result mutation.
pub async fn record(
    pool: &PgPool,
    result_id: Uuid,
    action: AuditAction,
    actor: &Principal,
) -> CoreResult<()> {
    let client_id = match actor {
        Principal::Submitter { client_id } => Some(client_id.as_str()),
        Principal::Patient { .. } => None,
    };

    sqlx::query(
        "INSERT INTO exam_result_audit (id, result_id, action, actor_role, actor_client_id)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(result_id)
    .bind(action.as_str())
    .bind(actor.role())
    .bind(client_id)
    .execute(pool)
    .await?;

    Ok(())
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &AuditFilter) {
    if let Some(result_id) = filter.result_id {
        qb.push(" AND result_id = ");
        qb.push_bind(result_id);
    }
    if let Some(from) = filter.from {
        qb.push(" AND recorded_at::date >= ");
        qb.push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND recorded_at::date <= ");
        qb.push_bind(to);
    }
}

/// Lists one page of audit entries, newest first, plus the unpaginated total
/// count.
pub async fn list(
    pool: &PgPool,
    filter: &AuditFilter,
    params: PageParams,
) -> CoreResult<(Vec<AuditEntry>, i64)> {
    let mut count_qb =
        QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM exam_result_audit WHERE TRUE");
    push_filter(&mut count_qb, filter);
    let total_count: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT {COLUMNS} FROM exam_result_audit WHERE TRUE"
    ));
    push_filter(&mut qb, filter);
    qb.push(" ORDER BY recorded_at DESC LIMIT ");
    qb.push_bind(params.limit());
    qb.push(" OFFSET ");
    qb.push_bind(params.offset());

    let rows = qb.build().fetch_all(pool).await?;
    let items = rows.iter().map(from_row).collect::<CoreResult<Vec<_>>>()?;

    Ok((items, total_count))
}
