//! Exam results: domain types and the service enforcing their lifecycle.
//!
//! The service is the only place that decides who may do what to a result.
//! Handlers pass the authenticated [`Principal`] straight through; the SQL
//! repositories below never see it.

use crate::audit::AuditAction;
use crate::repositories::{audit, exams, patients};
use crate::{CoreError, CoreResult, Principal};
use chrono::{DateTime, NaiveDate, Utc};
use lers_types::{ExamStatus, NonEmptyText};
use sqlx::PgPool;
use uuid::Uuid;

/// Default page size for result listings.
pub const DEFAULT_PAGE_SIZE: u32 = 50;
/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;
/// Upper bound on ids accepted in one bulk finalize request.
pub const MAX_BULK_IDS: usize = 100;

/// One laboratory test outcome, as stored.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ExamResult {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub exam_type: String,
    pub payload: serde_json::Value,
    pub status: ExamStatus,
    pub requested_at: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Input for registering a new exam result.
#[derive(Debug, Clone)]
pub struct NewExamResult {
    /// Client-supplied identifier. When present and already registered the
    /// registration is rejected with a conflict rather than treated as
    /// idempotent.
    pub id: Option<Uuid>,
    pub patient_id: Uuid,
    pub exam_type: String,
    pub payload: serde_json::Value,
    /// Defaults to `Finalized`; labs submit `Pending` for incomplete work.
    pub status: Option<ExamStatus>,
    pub requested_at: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Optional filters for result listings.
#[derive(Debug, Clone, Default)]
pub struct ExamFilter {
    pub exam_type: Option<String>,
    pub status: Option<ExamStatus>,
    /// Inclusive lower bound on `requested_at`.
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on `requested_at`.
    pub to: Option<NaiveDate>,
}

/// Validated pagination parameters.
#[derive(Debug, Clone, Copy)]
pub struct PageParams {
    page: u32,
    page_size: u32,
}

impl PageParams {
    /// Creates validated pagination parameters.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if `page` is zero or `page_size` is
    /// outside `1..=MAX_PAGE_SIZE`.
    pub fn new(page: u32, page_size: u32) -> CoreResult<Self> {
        if page == 0 {
            return Err(CoreError::Validation("page must be at least 1".into()));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(CoreError::Validation(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(Self { page, page_size })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// One page of results plus pagination metadata.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total_count: i64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total_count: i64, params: PageParams) -> Self {
        let page_size = i64::from(params.page_size());
        let total_pages = ((total_count + page_size - 1) / page_size).max(0) as u32;
        Self {
            items,
            total_count,
            page: params.page(),
            page_size: params.page_size(),
            total_pages,
        }
    }
}

/// Count of non-deleted results in one status.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StatusCount {
    pub status: ExamStatus,
    pub count: i64,
}

/// One id a bulk finalize could not process, with the reason.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BulkSkip {
    pub id: Uuid,
    pub reason: String,
}

/// Outcome of a bulk finalize: per-id successes and skips.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BulkFinalizeOutcome {
    pub finalized: Vec<Uuid>,
    pub skipped: Vec<BulkSkip>,
}

/// Checks that a result belongs to the given patient.
///
/// # Errors
///
/// Returns `CoreError::Authorization` when the result is owned by someone
/// else.
fn ensure_owned(result: &ExamResult, patient_id: Uuid) -> CoreResult<()> {
    if result.patient_id != patient_id {
        tracing::warn!(result_id = %result.id, caller = %patient_id,
            "patient attempted to read another patient's result");
        return Err(CoreError::Authorization(
            "exam result belongs to another patient".into(),
        ));
    }
    Ok(())
}

/// Checks that a result may transition to finalized with the given payload.
///
/// # Errors
///
/// - `Conflict` if the result is already finalized (payloads are immutable
///   after finalization).
/// - `Validation` if neither the supplied nor the stored payload is present.
fn ensure_finalizable(
    current: &ExamResult,
    payload: Option<&serde_json::Value>,
) -> CoreResult<()> {
    if current.status == ExamStatus::Finalized {
        return Err(CoreError::Conflict(format!(
            "exam result {} is already finalized and immutable",
            current.id
        )));
    }

    let complete = match payload {
        Some(p) => !p.is_null(),
        None => !current.payload.is_null(),
    };
    if !complete {
        return Err(CoreError::Validation(
            "cannot finalize a result without a payload".into(),
        ));
    }
    Ok(())
}

/// Exam result operations with access control.
#[derive(Clone)]
pub struct ExamService {
    pool: PgPool,
}

impl ExamService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Registers a new exam result on behalf of a lab submitter.
    ///
    /// # Errors
    ///
    /// - `Authorization` if the caller is not a submitter.
    /// - `Validation` if the exam type is empty, a finalized registration has
    ///   no payload, or the patient does not exist.
    /// - `Conflict` if a client-supplied id is already registered.
    pub async fn register(
        &self,
        principal: &Principal,
        new: NewExamResult,
    ) -> CoreResult<ExamResult> {
        let client_id = principal.require_submitter()?.to_owned();

        let exam_type = NonEmptyText::new(&new.exam_type)?;
        let status = new.status.unwrap_or(ExamStatus::Finalized);
        if status == ExamStatus::Finalized && new.payload.is_null() {
            return Err(CoreError::Validation(
                "a finalized result requires a payload".into(),
            ));
        }

        if !patients::exists_active(&self.pool, new.patient_id).await? {
            return Err(CoreError::Validation(format!(
                "patient {} not found",
                new.patient_id
            )));
        }

        let id = new.id.unwrap_or_else(Uuid::new_v4);
        let created = exams::insert(&self.pool, id, &new, exam_type.as_str(), status).await?;
        self.record_audit(principal, created.id, AuditAction::Registered)
            .await;

        tracing::info!(result_id = %created.id, client_id = %client_id, status = %created.status,
            "exam result registered");
        Ok(created)
    }

    /// Appends an audit entry for a completed mutation. Best-effort: failures
    /// are logged, the mutation itself already succeeded.
    async fn record_audit(&self, principal: &Principal, result_id: Uuid, action: AuditAction) {
        if let Err(e) = audit::record(&self.pool, result_id, action, principal).await {
            tracing::error!(error = %e, result_id = %result_id, action = %action,
                "audit entry not recorded");
        }
    }

    /// Transitions a pending result to finalized, optionally supplying the
    /// completed payload.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the result does not exist or is soft-deleted.
    /// - `Conflict` if the result is already finalized (payloads are immutable
    ///   after finalization).
    /// - `Validation` if the result would be finalized without a payload.
    pub async fn finalize(
        &self,
        principal: &Principal,
        id: Uuid,
        payload: Option<serde_json::Value>,
    ) -> CoreResult<ExamResult> {
        principal.require_submitter()?;

        let current = exams::fetch(&self.pool, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("exam result {id} not found")))?;
        ensure_finalizable(&current, payload.as_ref())?;

        // The WHERE status = 'pending' guard means a concurrent finalize loses
        // here instead of silently overwriting an immutable payload.
        let updated = exams::finalize(&self.pool, id, payload.as_ref())
            .await?
            .ok_or_else(|| {
                CoreError::Conflict(format!("exam result {id} was modified concurrently"))
            })?;
        self.record_audit(principal, id, AuditAction::Finalized).await;

        tracing::info!(result_id = %id, "exam result finalized");
        Ok(updated)
    }

    /// Finalizes a batch of pending results with their stored payloads.
    ///
    /// Per-id failures (unknown id, already finalized, missing payload) land
    /// in `skipped` with a reason instead of failing the batch; a storage
    /// failure aborts the whole operation.
    ///
    /// # Errors
    ///
    /// - `Authorization` if the caller is not a submitter.
    /// - `Validation` if `ids` is empty or holds more than `MAX_BULK_IDS`
    ///   entries.
    pub async fn bulk_finalize(
        &self,
        principal: &Principal,
        ids: &[Uuid],
    ) -> CoreResult<BulkFinalizeOutcome> {
        principal.require_submitter()?;

        if ids.is_empty() {
            return Err(CoreError::Validation("ids cannot be empty".into()));
        }
        if ids.len() > MAX_BULK_IDS {
            return Err(CoreError::Validation(format!(
                "at most {MAX_BULK_IDS} ids per bulk request"
            )));
        }

        let mut outcome = BulkFinalizeOutcome {
            finalized: Vec::new(),
            skipped: Vec::new(),
        };
        for &id in ids {
            match self.finalize(principal, id, None).await {
                Ok(_) => outcome.finalized.push(id),
                Err(CoreError::Storage(e)) => return Err(CoreError::Storage(e)),
                Err(e) => outcome.skipped.push(BulkSkip {
                    id,
                    reason: e.to_string(),
                }),
            }
        }

        tracing::info!(
            finalized = outcome.finalized.len(),
            skipped = outcome.skipped.len(),
            "bulk finalize completed"
        );
        Ok(outcome)
    }

    /// Soft-deletes a result.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the result does not exist or is already deleted.
    pub async fn delete(&self, principal: &Principal, id: Uuid) -> CoreResult<()> {
        principal.require_submitter()?;

        if !exams::soft_delete(&self.pool, id).await? {
            return Err(CoreError::NotFound(format!(
                "exam result {id} not found or already deleted"
            )));
        }
        self.record_audit(principal, id, AuditAction::Deleted).await;
        tracing::info!(result_id = %id, "exam result deleted");
        Ok(())
    }

    /// Restores a soft-deleted result.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the result does not exist or is not deleted.
    pub async fn restore(&self, principal: &Principal, id: Uuid) -> CoreResult<ExamResult> {
        principal.require_submitter()?;

        let restored = exams::restore(&self.pool, id).await?.ok_or_else(|| {
            CoreError::NotFound(format!("exam result {id} not found or not deleted"))
        })?;
        self.record_audit(principal, id, AuditAction::Restored).await;
        tracing::info!(result_id = %id, "exam result restored");
        Ok(restored)
    }

    /// Fetches one result owned by the calling patient.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the result does not exist or is soft-deleted.
    /// - `Authorization` if the result belongs to another patient.
    pub async fn get_owned(&self, principal: &Principal, id: Uuid) -> CoreResult<ExamResult> {
        let patient_id = principal.require_patient()?;

        let result = exams::fetch(&self.pool, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("exam result {id} not found")))?;
        ensure_owned(&result, patient_id)?;
        Ok(result)
    }

    /// Lists the calling patient's own results, filtered and paginated.
    pub async fn list_owned(
        &self,
        principal: &Principal,
        filter: ExamFilter,
        params: PageParams,
    ) -> CoreResult<Paginated<ExamResult>> {
        let patient_id = principal.require_patient()?;

        let (items, total_count) =
            exams::list_for_patient(&self.pool, patient_id, &filter, params).await?;

        tracing::debug!(patient_id = %patient_id, count = items.len(), total_count,
            "listed patient exam results");
        Ok(Paginated::new(items, total_count, params))
    }

    /// Counts non-deleted results by status, optionally bounded by
    /// `requested_at`. Submitter only; both statuses are always present.
    pub async fn counts_by_status(
        &self,
        principal: &Principal,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> CoreResult<Vec<StatusCount>> {
        principal.require_submitter()?;

        let raw = exams::counts_by_status(&self.pool, from, to).await?;
        let counts = ExamStatus::ALL
            .into_iter()
            .map(|status| StatusCount {
                status,
                count: raw
                    .iter()
                    .find(|(s, _)| *s == status)
                    .map(|(_, c)| *c)
                    .unwrap_or(0),
            })
            .collect();
        Ok(counts)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::repositories::schema;
    use crate::{CoreConfig, DbConfig};

    /// Config whose database nothing listens on; lazy pools built from it
    /// fail on first query, so tests only reach code that decides before
    /// touching storage.
    pub(crate) fn dead_config() -> CoreConfig {
        CoreConfig::new(
            "127.0.0.1:0".into(),
            DbConfig {
                host: "127.0.0.1".into(),
                port: 1,
                user: "lers".into(),
                password: "unused".into(),
                name: "lers".into(),
                timezone: "UTC".into(),
            },
            "lab-system".into(),
            "0123456789abcdef0123456789abcdef".into(),
            900,
        )
        .unwrap()
    }

    fn dead_service() -> ExamService {
        ExamService::new(schema::connect_lazy(&dead_config()))
    }

    fn submitter() -> Principal {
        Principal::Submitter {
            client_id: "lab-system".into(),
        }
    }

    fn patient(patient_id: Uuid) -> Principal {
        Principal::Patient { patient_id }
    }

    fn stored_result(patient_id: Uuid, status: ExamStatus, payload: serde_json::Value) -> ExamResult {
        let now = Utc::now();
        ExamResult {
            id: Uuid::new_v4(),
            patient_id,
            exam_type: "blood panel".into(),
            payload,
            status,
            requested_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn ownership_check_rejects_another_patients_result() {
        let owner = Uuid::new_v4();
        let result = stored_result(owner, ExamStatus::Finalized, serde_json::json!({"hb": 13.1}));

        assert!(ensure_owned(&result, owner).is_ok());
        assert!(matches!(
            ensure_owned(&result, Uuid::new_v4()),
            Err(CoreError::Authorization(_))
        ));
    }

    #[test]
    fn finalized_results_are_immutable() {
        let result = stored_result(
            Uuid::new_v4(),
            ExamStatus::Finalized,
            serde_json::json!({"hb": 13.1}),
        );
        assert!(matches!(
            ensure_finalizable(&result, Some(&serde_json::json!({"hb": 9.0}))),
            Err(CoreError::Conflict(_))
        ));
        assert!(matches!(
            ensure_finalizable(&result, None),
            Err(CoreError::Conflict(_))
        ));
    }

    #[test]
    fn pending_result_needs_a_payload_to_finalize() {
        let empty = stored_result(Uuid::new_v4(), ExamStatus::Pending, serde_json::Value::Null);
        assert!(matches!(
            ensure_finalizable(&empty, None),
            Err(CoreError::Validation(_))
        ));
        // Supplying the payload at finalize time is enough.
        assert!(ensure_finalizable(&empty, Some(&serde_json::json!({"hb": 13.1}))).is_ok());

        let filled = stored_result(
            Uuid::new_v4(),
            ExamStatus::Pending,
            serde_json::json!({"hb": 13.1}),
        );
        assert!(ensure_finalizable(&filled, None).is_ok());
    }

    #[tokio::test]
    async fn register_rejects_patient_callers_before_any_query() {
        let new = NewExamResult {
            id: None,
            patient_id: Uuid::new_v4(),
            exam_type: "blood panel".into(),
            payload: serde_json::json!({"hb": 13.1}),
            status: None,
            requested_at: None,
            notes: None,
        };
        let result = dead_service()
            .register(&patient(Uuid::new_v4()), new)
            .await;
        assert!(matches!(result, Err(CoreError::Authorization(_))));
    }

    #[tokio::test]
    async fn list_rejects_submitter_callers_before_any_query() {
        let result = dead_service()
            .list_owned(&submitter(), ExamFilter::default(), PageParams::default())
            .await;
        assert!(matches!(result, Err(CoreError::Authorization(_))));
    }

    #[tokio::test]
    async fn counts_reject_patient_callers_before_any_query() {
        let result = dead_service()
            .counts_by_status(&patient(Uuid::new_v4()), None, None)
            .await;
        assert!(matches!(result, Err(CoreError::Authorization(_))));
    }

    #[tokio::test]
    async fn bulk_finalize_validates_batch_bounds() {
        let service = dead_service();

        let result = service.bulk_finalize(&submitter(), &[]).await;
        assert!(matches!(result, Err(CoreError::Validation(_))));

        let too_many = vec![Uuid::new_v4(); MAX_BULK_IDS + 1];
        let result = service.bulk_finalize(&submitter(), &too_many).await;
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn bulk_finalize_rejects_patient_callers() {
        let ids = [Uuid::new_v4()];
        let result = dead_service()
            .bulk_finalize(&patient(Uuid::new_v4()), &ids)
            .await;
        assert!(matches!(result, Err(CoreError::Authorization(_))));
    }

    #[test]
    fn page_params_reject_zero_page() {
        assert!(PageParams::new(0, 10).is_err());
    }

    #[test]
    fn page_params_reject_oversized_page() {
        assert!(PageParams::new(1, MAX_PAGE_SIZE + 1).is_err());
        assert!(PageParams::new(1, 0).is_err());
        assert!(PageParams::new(1, MAX_PAGE_SIZE).is_ok());
    }

    #[test]
    fn page_params_compute_offset() {
        let params = PageParams::new(3, 25).unwrap();
        assert_eq!(params.offset(), 50);
        assert_eq!(params.limit(), 25);
    }

    #[test]
    fn paginated_rounds_total_pages_up() {
        let params = PageParams::new(1, 50).unwrap();
        let page: Paginated<u8> = Paginated::new(Vec::new(), 101, params);
        assert_eq!(page.total_pages, 3);

        let page: Paginated<u8> = Paginated::new(Vec::new(), 100, params);
        assert_eq!(page.total_pages, 2);

        let page: Paginated<u8> = Paginated::new(Vec::new(), 0, params);
        assert_eq!(page.total_pages, 0);
    }
}
