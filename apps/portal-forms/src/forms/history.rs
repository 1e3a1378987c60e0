use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::errors::FormError;
use crate::forms::models::SubmissionHistoryEntry;
use crate::forms::store::{FormStore, HistoryOrder};

/// Read access to the append-only submission ledger.
/// Appends happen only inside `FormLifecycle::submit`.
pub struct SubmissionHistory<S: FormStore> {
    store: Arc<S>,
}

impl<S: FormStore> Clone for SubmissionHistory<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: FormStore> SubmissionHistory<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    async fn ensure_form(&self, form_id: Uuid) -> Result<(), FormError> {
        match self.store.find_form(form_id).await? {
            Some(_) => Ok(()),
            None => Err(FormError::NotFound(form_id)),
        }
    }

    /// All submissions ordered by submission number, first to last.
    pub async fn entries(&self, form_id: Uuid) -> Result<Vec<SubmissionHistoryEntry>, FormError> {
        info!("Fetching submission history for form {form_id}");
        self.ensure_form(form_id).await?;
        self.store
            .list_submissions(form_id, HistoryOrder::Chronological)
            .await
    }

    /// All submissions, most recently submitted first.
    pub async fn entries_newest_first(
        &self,
        form_id: Uuid,
    ) -> Result<Vec<SubmissionHistoryEntry>, FormError> {
        self.ensure_form(form_id).await?;
        self.store
            .list_submissions(form_id, HistoryOrder::NewestFirst)
            .await
    }

    pub async fn latest(&self, form_id: Uuid) -> Result<Option<SubmissionHistoryEntry>, FormError> {
        self.ensure_form(form_id).await?;
        self.store.latest_submission(form_id).await
    }

    pub async fn count(&self, form_id: Uuid) -> Result<i64, FormError> {
        self.ensure_form(form_id).await?;
        self.store.submission_count(form_id).await
    }
}
