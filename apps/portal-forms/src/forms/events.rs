use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::forms::models::{FormRecord, FormType, SubmissionHistoryEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormEventKind {
    Assigned,
    Submitted,
    Reopened,
    Completed,
}

/// Domain event handed to the external notification subsystem after a commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormEvent {
    pub kind: FormEventKind,
    pub form_id: Uuid,
    pub form_type: FormType,
    pub project_id: String,
    pub lot_id: String,
    pub actor_user_id: String,
    pub recipient_user_id: String,
    pub title: String,
    pub message: String,
    pub link: String,
    pub submission_number: Option<i32>,
    pub occurred_at: DateTime<Utc>,
}

impl FormEvent {
    pub fn assigned(form: &FormRecord) -> Self {
        let label = form.form_type.display_name();
        Self::build(
            FormEventKind::Assigned,
            form,
            &form.assigned_by_user_id,
            &form.customer_id,
            format!("New Form Assigned: {label}"),
            format!(
                "A {label} form has been assigned to you for project {}. Please complete it at your earliest convenience.",
                form.project_id
            ),
        )
    }

    pub fn submitted(form: &FormRecord, entry: &SubmissionHistoryEntry) -> Self {
        let label = form.form_type.display_name();
        let mut event = Self::build(
            FormEventKind::Submitted,
            form,
            &entry.submitted_by_user_id,
            &form.assigned_by_user_id,
            format!("Form Submitted: {label}"),
            format!(
                "{} has submitted their {label} form for project {}.",
                entry.submitted_by_name, form.project_id
            ),
        );
        event.submission_number = Some(entry.submission_number);
        event
    }

    pub fn reopened(form: &FormRecord) -> Self {
        let label = form.form_type.display_name();
        let actor = form.reopened_by_user_id.as_deref().unwrap_or_default();
        let reason = form.reopen_reason.as_deref().unwrap_or_default();
        Self::build(
            FormEventKind::Reopened,
            form,
            actor,
            &form.customer_id,
            format!("Form Reopened: {label}"),
            format!(
                "Your {label} form for project {} has been reopened. Reason: {reason}. Please review and resubmit.",
                form.project_id
            ),
        )
    }

    pub fn completed(form: &FormRecord, completed_by: &str) -> Self {
        let label = form.form_type.display_name();
        Self::build(
            FormEventKind::Completed,
            form,
            completed_by,
            &form.customer_id,
            format!("Form Completed: {label}"),
            format!(
                "Your {label} form for project {} has been reviewed and marked complete.",
                form.project_id
            ),
        )
    }

    fn build(
        kind: FormEventKind,
        form: &FormRecord,
        actor: &str,
        recipient: &str,
        title: String,
        message: String,
    ) -> Self {
        Self {
            kind,
            form_id: form.form_id,
            form_type: form.form_type,
            project_id: form.project_id.clone(),
            lot_id: form.lot_id.clone(),
            actor_user_id: actor.to_string(),
            recipient_user_id: recipient.to_string(),
            title,
            message,
            link: format!("/forms/{}", form.form_id),
            submission_number: None,
            occurred_at: form.updated_at,
        }
    }
}

/// Fire-and-forget consumer of form events.
/// Implementations must not block and must swallow their own failures.
pub trait FormEventSink: Send + Sync {
    fn publish(&self, event: FormEvent);

    /// Hands back deliveries still in flight so a short-lived process can await them.
    fn drain(&self) -> Vec<JoinHandle<()>> {
        Vec::new()
    }
}

/// Logs events only. Used when no notification endpoint is configured.
#[derive(Debug, Default, Clone)]
pub struct TracingEventSink;

impl FormEventSink for TracingEventSink {
    fn publish(&self, event: FormEvent) {
        info!(
            kind = ?event.kind,
            form_id = %event.form_id,
            recipient = %event.recipient_user_id,
            "{}",
            event.title
        );
    }
}

/// Posts each event as JSON to the notification service on a detached task.
#[derive(Clone)]
pub struct WebhookEventSink {
    client: Client,
    url: String,
    in_flight: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl WebhookEventSink {
    pub fn new(url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            in_flight: Arc::default(),
        })
    }
}

impl FormEventSink for WebhookEventSink {
    fn publish(&self, event: FormEvent) {
        let Ok(runtime) = Handle::try_current() else {
            warn!(
                "No async runtime to deliver {:?} event for form {}; dropped",
                event.kind, event.form_id
            );
            return;
        };
        let client = self.client.clone();
        let url = self.url.clone();

        let handle = runtime.spawn(async move {
            let result = client
                .post(&url)
                .json(&event)
                .send()
                .await
                .and_then(|r| r.error_for_status());

            match result {
                Ok(_) => debug!("Delivered {:?} event for form {}", event.kind, event.form_id),
                Err(e) => error!(
                    "Failed to deliver {:?} event for form {}: {e}",
                    event.kind, event.form_id
                ),
            }
        });

        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.retain(|h| !h.is_finished());
            in_flight.push(handle);
        }
    }

    fn drain(&self) -> Vec<JoinHandle<()>> {
        self.in_flight
            .lock()
            .map(|mut in_flight| std::mem::take(&mut *in_flight))
            .unwrap_or_default()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::forms::models::{FormData, FormStatus};

    /// Keeps every published event for assertions.
    #[derive(Default, Clone)]
    pub(crate) struct RecordingSink {
        pub events: Arc<Mutex<Vec<FormEvent>>>,
    }

    impl RecordingSink {
        pub fn kinds(&self) -> Vec<FormEventKind> {
            self.events.lock().unwrap().iter().map(|e| e.kind).collect()
        }
    }

    impl FormEventSink for RecordingSink {
        fn publish(&self, event: FormEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn sample_form() -> FormRecord {
        let now = Utc::now();
        FormRecord {
            form_id: Uuid::new_v4(),
            form_type: FormType::GarageDoors,
            status: FormStatus::Assigned,
            project_id: "proj-7".into(),
            lot_id: "lot-3".into(),
            customer_id: "cust-1".into(),
            customer_name: Some("Claire Roy".into()),
            customer_email: Some("claire@example.com".into()),
            assigned_by_user_id: "sales-9".into(),
            assigned_by_name: Some("Marc Cyr".into()),
            title: None,
            instructions: None,
            form_data: FormData::new(),
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
        }
    }

    #[test]
    fn test_assigned_event_targets_customer() {
        let form = sample_form();
        let event = FormEvent::assigned(&form);
        assert_eq!(event.recipient_user_id, "cust-1");
        assert_eq!(event.actor_user_id, "sales-9");
        assert_eq!(event.title, "New Form Assigned: Garage Doors");
        assert_eq!(event.link, format!("/forms/{}", form.form_id));
    }

    #[test]
    fn test_submitted_event_targets_assignor_and_carries_number() {
        let form = sample_form();
        let entry = SubmissionHistoryEntry {
            id: Uuid::new_v4(),
            form_id: form.form_id,
            submission_number: 2,
            status_at_submission: FormStatus::Reopened,
            form_data_snapshot: FormData::new(),
            submitted_by_user_id: "cust-1".into(),
            submitted_by_name: "Claire Roy".into(),
            submission_notes: None,
            submitted_at: form.updated_at,
        };
        let event = FormEvent::submitted(&form, &entry);
        assert_eq!(event.recipient_user_id, "sales-9");
        assert_eq!(event.submission_number, Some(2));
        assert!(event.message.starts_with("Claire Roy has submitted"));
    }

    #[test]
    fn test_reopened_event_includes_reason() {
        let mut form = sample_form();
        form.reopened_by_user_id = Some("owner-1".into());
        form.reopen_reason = Some("needs revision".into());
        let event = FormEvent::reopened(&form);
        assert_eq!(event.actor_user_id, "owner-1");
        assert!(event.message.contains("Reason: needs revision."));
    }

    #[test]
    fn test_webhook_publish_outside_runtime_is_dropped() {
        let sink =
            WebhookEventSink::new("http://127.0.0.1:1/events".into(), Duration::from_secs(1))
                .unwrap();
        sink.publish(FormEvent::assigned(&sample_form()));
        assert!(sink.drain().is_empty());
    }

    #[tokio::test]
    async fn test_webhook_failure_is_swallowed() {
        let sink =
            WebhookEventSink::new("http://127.0.0.1:1/events".into(), Duration::from_millis(500))
                .unwrap();
        sink.publish(FormEvent::assigned(&sample_form()));

        let deliveries = sink.drain();
        assert_eq!(deliveries.len(), 1);
        for delivery in deliveries {
            assert!(delivery.await.is_ok());
        }
        assert!(sink.drain().is_empty());
    }

    #[test]
    fn test_event_kind_serializes_snake_case() {
        let json = serde_json::to_value(FormEventKind::Reopened).unwrap();
        assert_eq!(json, "reopened");
    }
}
