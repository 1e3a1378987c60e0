pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::FormError;
use crate::forms::models::{FormRecord, FormStatus, FormType, SubmissionHistoryEntry};

pub use memory::InMemoryFormStore;
pub use postgres::PgFormStore;

/// Conjunctive filter over form records. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFilter {
    pub project_id: Option<String>,
    pub lot_id: Option<String>,
    pub customer_id: Option<String>,
    pub assigned_by_user_id: Option<String>,
    pub form_type: Option<FormType>,
    pub status: Option<FormStatus>,
    /// Only forms that have been reopened at least once.
    pub reopened_only: bool,
}

impl FormFilter {
    pub fn matches(&self, form: &FormRecord) -> bool {
        fn eq<T: PartialEq>(wanted: &Option<T>, actual: &T) -> bool {
            wanted.as_ref().map_or(true, |w| w == actual)
        }

        eq(&self.project_id, &form.project_id)
            && eq(&self.lot_id, &form.lot_id)
            && eq(&self.customer_id, &form.customer_id)
            && eq(&self.assigned_by_user_id, &form.assigned_by_user_id)
            && eq(&self.form_type, &form.form_type)
            && eq(&self.status, &form.status)
            && (!self.reopened_only || form.reopened_date.is_some())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOrder {
    /// Ascending `submission_number`.
    Chronological,
    /// Descending `submitted_at`.
    NewestFirst,
}

/// Durable storage for form records and their submission ledger.
///
/// Mutations go through a unit of work:
///
/// 1. `begin()` returns a `Tx`
/// 2. reads and writes take `&mut Tx`
/// 3. `commit(tx)` publishes everything or nothing; `rollback(tx)` discards it
///
/// Dropping a `Tx` without committing discards its writes.
///
/// `update_form` is guarded by the record's `version`: if the stored version
/// differs from `expected_version` at commit time, the write fails with
/// `FormError::ConcurrentModification`. History appends are unique on
/// `(form_id, submission_number)` and fail the same way on a clash.
///
/// Only the lifecycle engine calls the transactional methods.
#[async_trait]
pub trait FormStore: Send + Sync + 'static {
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx, FormError>;
    async fn commit(&self, tx: Self::Tx) -> Result<(), FormError>;
    async fn rollback(&self, tx: Self::Tx) -> Result<(), FormError>;

    // ── Unit-of-work operations ──────────────────────────────────────────────

    /// Returns `FormError::NotFound` if the form does not exist.
    async fn load_form(&self, tx: &mut Self::Tx, form_id: Uuid) -> Result<FormRecord, FormError>;

    async fn insert_form(&self, tx: &mut Self::Tx, form: &FormRecord) -> Result<(), FormError>;

    /// `form.version` must already hold the new version.
    async fn update_form(
        &self,
        tx: &mut Self::Tx,
        form: &FormRecord,
        expected_version: i64,
    ) -> Result<(), FormError>;

    /// Removes the form and every history entry it owns. Returns the number of entries removed.
    async fn delete_form(&self, tx: &mut Self::Tx, form_id: Uuid) -> Result<u64, FormError>;

    async fn count_submissions(&self, tx: &mut Self::Tx, form_id: Uuid) -> Result<i32, FormError>;

    async fn append_submission(
        &self,
        tx: &mut Self::Tx,
        entry: &SubmissionHistoryEntry,
    ) -> Result<(), FormError>;

    // ── Read-only queries (committed state) ──────────────────────────────────

    async fn find_form(&self, form_id: Uuid) -> Result<Option<FormRecord>, FormError>;

    async fn list_forms(&self, filter: &FormFilter) -> Result<Vec<FormRecord>, FormError>;

    async fn count_forms(&self, filter: &FormFilter) -> Result<i64, FormError>;

    async fn list_submissions(
        &self,
        form_id: Uuid,
        order: HistoryOrder,
    ) -> Result<Vec<SubmissionHistoryEntry>, FormError>;

    async fn latest_submission(
        &self,
        form_id: Uuid,
    ) -> Result<Option<SubmissionHistoryEntry>, FormError>;

    async fn submission_count(&self, form_id: Uuid) -> Result<i64, FormError>;
}
