use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;

use crate::config::Config;
use crate::forms::events::{FormEventSink, TracingEventSink, WebhookEventSink};
use crate::forms::history::SubmissionHistory;
use crate::forms::lifecycle::FormLifecycle;
use crate::forms::query::FormQueries;
use crate::forms::store::{FormStore, PgFormStore};

/// Everything a caller needs to drive the form core, sharing one store.
#[derive(Clone)]
pub struct AppState<S: FormStore = PgFormStore> {
    pub lifecycle: FormLifecycle<S>,
    pub queries: FormQueries<S>,
    pub history: SubmissionHistory<S>,
    pub events: Arc<dyn FormEventSink>,
}

impl<S: FormStore> AppState<S> {
    pub fn new(store: S, events: Arc<dyn FormEventSink>) -> Self {
        let store = Arc::new(store);
        Self {
            lifecycle: FormLifecycle::new(Arc::clone(&store), Arc::clone(&events)),
            queries: FormQueries::new(Arc::clone(&store)),
            history: SubmissionHistory::new(store),
            events,
        }
    }
}

impl AppState<PgFormStore> {
    /// Wires the Postgres store and the configured notification sink.
    pub fn from_pool(pool: PgPool, config: &Config) -> Result<Self> {
        let events: Arc<dyn FormEventSink> = match &config.notification_webhook_url {
            Some(url) => {
                info!("Form events will be posted to {url}");
                Arc::new(WebhookEventSink::new(
                    url.clone(),
                    Duration::from_secs(config.notification_timeout_secs),
                )?)
            }
            None => {
                info!("No NOTIFICATION_WEBHOOK_URL set; form events are logged only");
                Arc::new(TracingEventSink)
            }
        };

        Ok(Self::new(PgFormStore::new(pool), events))
    }
}
