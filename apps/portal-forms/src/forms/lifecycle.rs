//! The form lifecycle engine: the only writer of form records and submission history.
//!
//! Every command runs as one unit of work on the store: load the record, validate
//! the move with [`transition`], mutate, write back under the version guard and,
//! for submissions, append the history snapshot before committing. Events are
//! published only after a successful commit.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::FormError;
use crate::forms::events::{FormEvent, FormEventSink};
use crate::forms::models::{FormData, FormRecord, FormStatus, FormType, SubmissionHistoryEntry};
use crate::forms::store::FormStore;
use crate::forms::transition::{transition, Effect, LifecycleCommand, Transition};

/// Used for the history entry when neither the caller nor the record knows the submitter's name.
pub const UNKNOWN_SUBMITTER: &str = "Unknown Customer";

/// Parameters for assigning a new form. Party names are snapshots taken by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateForm {
    pub form_type: FormType,
    pub project_id: String,
    pub lot_id: String,
    pub customer_id: String,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub assigned_by_user_id: String,
    pub assigned_by_name: Option<String>,
    pub title: Option<String>,
    pub instructions: Option<String>,
    #[serde(default)]
    pub initial_data: FormData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitForm {
    pub form_id: Uuid,
    pub data: FormData,
    pub submitted_by_user_id: String,
    pub submitted_by_name: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReopenForm {
    pub form_id: Uuid,
    pub reopened_by_user_id: String,
    pub reason: String,
    pub new_instructions: Option<String>,
}

/// Display metadata edits. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormDetailsUpdate {
    pub title: Option<String>,
    pub instructions: Option<String>,
}

pub struct FormLifecycle<S: FormStore> {
    store: Arc<S>,
    events: Arc<dyn FormEventSink>,
}

impl<S: FormStore> Clone for FormLifecycle<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            events: Arc::clone(&self.events),
        }
    }
}

fn require(value: &str, field: &str) -> Result<(), FormError> {
    if value.trim().is_empty() {
        return Err(FormError::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// Treats blank optional text as absent.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl<S: FormStore> FormLifecycle<S> {
    pub fn new(store: Arc<S>, events: Arc<dyn FormEventSink>) -> Self {
        Self { store, events }
    }

    /// Commits on success, rolls back on failure. The command's error always wins.
    async fn finish<T>(&self, tx: S::Tx, result: Result<T, FormError>) -> Result<T, FormError> {
        match result {
            Ok(value) => {
                self.store.commit(tx).await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.store.rollback(tx).await {
                    warn!("Rollback after '{err}' also failed: {rollback_err}");
                }
                Err(err)
            }
        }
    }

    /// Allocates a new form in status ASSIGNED. No history entry is written.
    pub async fn create(&self, params: CreateForm) -> Result<FormRecord, FormError> {
        require(&params.project_id, "project_id")?;
        require(&params.lot_id, "lot_id")?;
        require(&params.customer_id, "customer_id")?;
        require(&params.assigned_by_user_id, "assigned_by_user_id")?;

        info!(
            "Assigning {} form to customer {} for project {} lot {}",
            params.form_type, params.customer_id, params.project_id, params.lot_id
        );

        let now = Utc::now();
        let form = FormRecord {
            form_id: Uuid::new_v4(),
            form_type: params.form_type,
            status: FormStatus::Assigned,
            project_id: params.project_id,
            lot_id: params.lot_id,
            customer_id: params.customer_id,
            customer_name: params.customer_name,
            customer_email: params.customer_email,
            assigned_by_user_id: params.assigned_by_user_id,
            assigned_by_name: params.assigned_by_name,
            title: non_blank(params.title),
            instructions: non_blank(params.instructions),
            form_data: params.initial_data,
            assigned_date: Some(now),
            first_submitted_date: None,
            last_submitted_date: None,
            completed_date: None,
            reopened_date: None,
            reopened_by_user_id: None,
            reopen_reason: None,
            reopen_count: 0,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.store.begin().await?;
        let result = self.store.insert_form(&mut tx, &form).await;
        self.finish(tx, result).await?;

        info!("Form created with ID: {}", form.form_id);
        self.events.publish(FormEvent::assigned(&form));
        Ok(form)
    }

    /// Replaces the in-progress payload without submitting.
    pub async fn update_data(
        &self,
        form_id: Uuid,
        data: FormData,
        updated_by: &str,
    ) -> Result<FormRecord, FormError> {
        info!("Updating form data for form {form_id} by {updated_by}");

        let mut tx = self.store.begin().await?;
        let result = async {
            let mut form = self.store.load_form(&mut tx, form_id).await?;
            let step = transition(form.status, LifecycleCommand::UpdateData)?;

            form.form_data = data;
            form.status = step.to;
            form.updated_at = Utc::now();
            self.write_back(&mut tx, &mut form).await?;
            Ok::<_, FormError>(form)
        }
        .await;
        let form = self.finish(tx, result).await?;

        info!("Form {form_id} data saved (status {})", form.status);
        Ok(form)
    }

    /// Submits the payload, snapshotting it into the history ledger atomically.
    pub async fn submit(&self, params: SubmitForm) -> Result<FormRecord, FormError> {
        let form_id = params.form_id;
        require(&params.submitted_by_user_id, "submitted_by_user_id")?;
        info!("Submitting form {form_id} by {}", params.submitted_by_user_id);

        let mut tx = self.store.begin().await?;
        let result = async {
            let mut form = self.store.load_form(&mut tx, form_id).await?;
            let step = transition(form.status, LifecycleCommand::Submit)?;
            let now = Utc::now();

            let mut recorded = None;
            if step.has(Effect::RecordSubmission) {
                let submission_number = self.store.count_submissions(&mut tx, form_id).await? + 1;
                let submitted_by_name = non_blank(params.submitted_by_name)
                    .or_else(|| form.customer_name.clone())
                    .unwrap_or_else(|| UNKNOWN_SUBMITTER.to_string());

                recorded = Some(SubmissionHistoryEntry {
                    id: Uuid::new_v4(),
                    form_id,
                    submission_number,
                    status_at_submission: step.from,
                    form_data_snapshot: params.data.clone(),
                    submitted_by_user_id: params.submitted_by_user_id,
                    submitted_by_name,
                    submission_notes: non_blank(params.notes),
                    submitted_at: now,
                });
            }

            form.form_data = params.data;
            form.status = step.to;
            form.last_submitted_date = Some(now);
            form.first_submitted_date.get_or_insert(now);
            form.updated_at = now;
            self.write_back(&mut tx, &mut form).await?;

            if let Some(entry) = &recorded {
                self.store.append_submission(&mut tx, entry).await?;
            }
            Ok::<_, FormError>((form, recorded, step))
        }
        .await;
        let (form, entry, step) = self.finish(tx, result).await?;

        if let Some(entry) = entry {
            info!(
                "Recorded submission #{} for form {form_id}",
                entry.submission_number
            );
            self.emit(&step, FormEvent::submitted(&form, &entry));
        }
        Ok(form)
    }

    /// Returns a submitted or completed form to an editable state.
    pub async fn reopen(&self, params: ReopenForm) -> Result<FormRecord, FormError> {
        let form_id = params.form_id;
        require(&params.reopened_by_user_id, "reopened_by_user_id")?;
        info!("Reopening form {form_id} by {}", params.reopened_by_user_id);

        let mut tx = self.store.begin().await?;
        let result = async {
            let mut form = self.store.load_form(&mut tx, form_id).await?;
            let step = transition(form.status, LifecycleCommand::Reopen)?;
            let now = Utc::now();

            form.status = step.to;
            form.reopened_date = Some(now);
            form.reopened_by_user_id = Some(params.reopened_by_user_id);
            form.reopen_reason = Some(params.reason);
            if step.has(Effect::IncrementReopenCount) {
                form.reopen_count += 1;
            }
            if let Some(instructions) = non_blank(params.new_instructions) {
                form.instructions = Some(instructions);
            }
            form.updated_at = now;
            self.write_back(&mut tx, &mut form).await?;
            Ok::<_, FormError>((form, step))
        }
        .await;
        let (form, step) = self.finish(tx, result).await?;

        info!(
            "Form {form_id} reopened. Reopen count: {}",
            form.reopen_count
        );
        self.emit(&step, FormEvent::reopened(&form));
        Ok(form)
    }

    /// Marks a submitted form as complete.
    pub async fn complete(&self, form_id: Uuid, completed_by: &str) -> Result<FormRecord, FormError> {
        require(completed_by, "completed_by")?;
        info!("Completing form {form_id} by {completed_by}");

        let mut tx = self.store.begin().await?;
        let result = async {
            let mut form = self.store.load_form(&mut tx, form_id).await?;
            let step = transition(form.status, LifecycleCommand::Complete)?;
            let now = Utc::now();

            form.status = step.to;
            form.completed_date = Some(now);
            form.updated_at = now;
            self.write_back(&mut tx, &mut form).await?;
            Ok::<_, FormError>((form, step))
        }
        .await;
        let (form, step) = self.finish(tx, result).await?;

        info!("Form {form_id} completed");
        self.emit(&step, FormEvent::completed(&form, completed_by));
        Ok(form)
    }

    /// Edits title and instructions. Status, payload and history are untouched.
    pub async fn update_details(
        &self,
        form_id: Uuid,
        details: FormDetailsUpdate,
    ) -> Result<FormRecord, FormError> {
        info!("Updating details of form {form_id}");

        let mut tx = self.store.begin().await?;
        let result = async {
            let mut form = self.store.load_form(&mut tx, form_id).await?;
            if let Some(title) = non_blank(details.title) {
                form.title = Some(title);
            }
            if let Some(instructions) = non_blank(details.instructions) {
                form.instructions = Some(instructions);
            }
            form.updated_at = Utc::now();
            self.write_back(&mut tx, &mut form).await?;
            Ok::<_, FormError>(form)
        }
        .await;
        self.finish(tx, result).await
    }

    /// Hard-deletes the form and its whole submission history.
    pub async fn delete(&self, form_id: Uuid, deleted_by: &str) -> Result<(), FormError> {
        info!("Deleting form {form_id} by {deleted_by}");

        let mut tx = self.store.begin().await?;
        let result = self.store.delete_form(&mut tx, form_id).await;
        let removed = self.finish(tx, result).await?;

        if removed > 0 {
            warn!("Deleted form {form_id} together with {removed} submission history entries");
        } else {
            info!("Deleted form {form_id}");
        }
        Ok(())
    }

    /// Bumps the version and writes the record under the version guard.
    async fn write_back(&self, tx: &mut S::Tx, form: &mut FormRecord) -> Result<(), FormError> {
        let expected = form.version;
        form.version += 1;
        self.store.update_form(tx, form, expected).await
    }

    fn emit(&self, step: &Transition, event: FormEvent) {
        if step.has(Effect::Emit(event.kind)) {
            self.events.publish(event);
        }
    }
}
