use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::errors::FormError;
use crate::forms::models::{FormRecord, FormStatus, FormType};
use crate::forms::store::{FormFilter, FormStore};

/// Side-effect-free reads over form records. Authorization is the caller's job.
pub struct FormQueries<S: FormStore> {
    store: Arc<S>,
}

impl<S: FormStore> Clone for FormQueries<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: FormStore> FormQueries<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn by_id(&self, form_id: Uuid) -> Result<FormRecord, FormError> {
        info!("Fetching form with ID: {form_id}");
        self.store
            .find_form(form_id)
            .await?
            .ok_or(FormError::NotFound(form_id))
    }

    pub async fn list(&self, filter: &FormFilter) -> Result<Vec<FormRecord>, FormError> {
        self.store.list_forms(filter).await
    }

    pub async fn by_project(&self, project_id: &str) -> Result<Vec<FormRecord>, FormError> {
        info!("Fetching forms for project: {project_id}");
        self.list(&FormFilter {
            project_id: Some(project_id.to_string()),
            ..FormFilter::default()
        })
        .await
    }

    pub async fn by_customer(&self, customer_id: &str) -> Result<Vec<FormRecord>, FormError> {
        info!("Fetching forms for customer: {customer_id}");
        self.list(&FormFilter {
            customer_id: Some(customer_id.to_string()),
            ..FormFilter::default()
        })
        .await
    }

    pub async fn by_assignor(&self, assigned_by_user_id: &str) -> Result<Vec<FormRecord>, FormError> {
        info!("Fetching forms created by: {assigned_by_user_id}");
        self.list(&FormFilter {
            assigned_by_user_id: Some(assigned_by_user_id.to_string()),
            ..FormFilter::default()
        })
        .await
    }

    pub async fn by_type(&self, form_type: FormType) -> Result<Vec<FormRecord>, FormError> {
        self.list(&FormFilter {
            form_type: Some(form_type),
            ..FormFilter::default()
        })
        .await
    }

    pub async fn by_status(&self, status: FormStatus) -> Result<Vec<FormRecord>, FormError> {
        info!("Fetching forms with status: {status}");
        self.list(&FormFilter {
            status: Some(status),
            ..FormFilter::default()
        })
        .await
    }

    pub async fn by_project_and_customer(
        &self,
        project_id: &str,
        customer_id: &str,
    ) -> Result<Vec<FormRecord>, FormError> {
        self.list(&FormFilter {
            project_id: Some(project_id.to_string()),
            customer_id: Some(customer_id.to_string()),
            ..FormFilter::default()
        })
        .await
    }

    pub async fn by_project_and_lot(
        &self,
        project_id: &str,
        lot_id: &str,
    ) -> Result<Vec<FormRecord>, FormError> {
        self.list(&FormFilter {
            project_id: Some(project_id.to_string()),
            lot_id: Some(lot_id.to_string()),
            ..FormFilter::default()
        })
        .await
    }

    pub async fn by_project_and_status(
        &self,
        project_id: &str,
        status: FormStatus,
    ) -> Result<Vec<FormRecord>, FormError> {
        self.list(&FormFilter {
            project_id: Some(project_id.to_string()),
            status: Some(status),
            ..FormFilter::default()
        })
        .await
    }

    pub async fn count_by_project_and_status(
        &self,
        project_id: &str,
        status: FormStatus,
    ) -> Result<i64, FormError> {
        self.store
            .count_forms(&FormFilter {
                project_id: Some(project_id.to_string()),
                status: Some(status),
                ..FormFilter::default()
            })
            .await
    }

    /// Forms currently in `status` that have been reopened at some point.
    pub async fn reopened_in_status(&self, status: FormStatus) -> Result<Vec<FormRecord>, FormError> {
        self.list(&FormFilter {
            status: Some(status),
            reopened_only: true,
            ..FormFilter::default()
        })
        .await
    }

    /// Whether the customer already holds a form of this type anywhere in the project.
    pub async fn customer_has_form(
        &self,
        project_id: &str,
        customer_id: &str,
        form_type: FormType,
    ) -> Result<bool, FormError> {
        let count = self
            .store
            .count_forms(&FormFilter {
                project_id: Some(project_id.to_string()),
                customer_id: Some(customer_id.to_string()),
                form_type: Some(form_type),
                ..FormFilter::default()
            })
            .await?;
        Ok(count > 0)
    }

    /// Whether the customer already holds a form of this type on this lot.
    pub async fn lot_has_form(
        &self,
        project_id: &str,
        lot_id: &str,
        customer_id: &str,
        form_type: FormType,
    ) -> Result<bool, FormError> {
        let count = self
            .store
            .count_forms(&FormFilter {
                project_id: Some(project_id.to_string()),
                lot_id: Some(lot_id.to_string()),
                customer_id: Some(customer_id.to_string()),
                form_type: Some(form_type),
                ..FormFilter::default()
            })
            .await?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::forms::events::TracingEventSink;
    use crate::forms::lifecycle::{CreateForm, FormLifecycle, ReopenForm, SubmitForm};
    use crate::forms::models::FormData;
    use crate::forms::store::InMemoryFormStore;

    struct Fixture {
        engine: FormLifecycle<InMemoryFormStore>,
        queries: FormQueries<InMemoryFormStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryFormStore::new());
        Fixture {
            engine: FormLifecycle::new(Arc::clone(&store), Arc::new(TracingEventSink)),
            queries: FormQueries::new(store),
        }
    }

    fn assignment(form_type: FormType, project: &str, lot: &str, customer: &str) -> CreateForm {
        CreateForm {
            form_type,
            project_id: project.into(),
            lot_id: lot.into(),
            customer_id: customer.into(),
            customer_name: None,
            customer_email: None,
            assigned_by_user_id: (if project == "p1" { "sales-a" } else { "sales-b" }).into(),
            assigned_by_name: None,
            title: None,
            instructions: None,
            initial_data: FormData::new(),
        }
    }

    async fn seed(f: &Fixture) -> Vec<FormRecord> {
        let mut forms = Vec::new();
        for params in [
            assignment(FormType::Windows, "p1", "l1", "c1"),
            assignment(FormType::Paint, "p1", "l1", "c1"),
            assignment(FormType::Windows, "p1", "l2", "c2"),
            assignment(FormType::GarageDoors, "p2", "l9", "c1"),
        ] {
            forms.push(f.engine.create(params).await.unwrap());
        }
        forms
    }

    #[tokio::test]
    async fn test_single_field_filters() {
        let f = fixture();
        seed(&f).await;

        assert_eq!(f.queries.by_project("p1").await.unwrap().len(), 3);
        assert_eq!(f.queries.by_customer("c1").await.unwrap().len(), 3);
        assert_eq!(f.queries.by_assignor("sales-b").await.unwrap().len(), 1);
        assert_eq!(f.queries.by_type(FormType::Windows).await.unwrap().len(), 2);
        assert_eq!(
            f.queries.by_status(FormStatus::Assigned).await.unwrap().len(),
            4
        );
    }

    #[tokio::test]
    async fn test_compound_filters() {
        let f = fixture();
        seed(&f).await;

        assert_eq!(
            f.queries
                .by_project_and_customer("p1", "c1")
                .await
                .unwrap()
                .len(),
            2
        );
        let lot = f.queries.by_project_and_lot("p1", "l2").await.unwrap();
        assert_eq!(lot.len(), 1);
        assert_eq!(lot[0].customer_id, "c2");
    }

    #[tokio::test]
    async fn test_existence_checks() {
        let f = fixture();
        seed(&f).await;

        assert!(f
            .queries
            .customer_has_form("p1", "c1", FormType::Paint)
            .await
            .unwrap());
        assert!(!f
            .queries
            .customer_has_form("p1", "c2", FormType::Paint)
            .await
            .unwrap());
        assert!(f
            .queries
            .lot_has_form("p1", "l2", "c2", FormType::Windows)
            .await
            .unwrap());
        assert!(!f
            .queries
            .lot_has_form("p1", "l1", "c2", FormType::Windows)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_status_views_follow_lifecycle() {
        let f = fixture();
        let forms = seed(&f).await;
        let target = forms[0].form_id;

        f.engine
            .submit(SubmitForm {
                form_id: target,
                data: json!({"color": "white"}).as_object().cloned().unwrap(),
                submitted_by_user_id: "c1".into(),
                submitted_by_name: None,
                notes: None,
            })
            .await
            .unwrap();
        assert_eq!(
            f.queries
                .count_by_project_and_status("p1", FormStatus::Submitted)
                .await
                .unwrap(),
            1
        );
        assert!(f
            .queries
            .reopened_in_status(FormStatus::Reopened)
            .await
            .unwrap()
            .is_empty());

        f.engine
            .reopen(ReopenForm {
                form_id: target,
                reopened_by_user_id: "owner-1".into(),
                reason: "wrong colour".into(),
                new_instructions: None,
            })
            .await
            .unwrap();
        let reopened = f
            .queries
            .reopened_in_status(FormStatus::Reopened)
            .await
            .unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened[0].form_id, target);
        assert_eq!(
            f.queries
                .by_project_and_status("p1", FormStatus::Assigned)
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_by_id_reads_are_pure() {
        let f = fixture();
        let forms = seed(&f).await;

        let first = f.queries.by_id(forms[1].form_id).await.unwrap();
        let second = f.queries.by_id(forms[1].form_id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.version, forms[1].version);

        let err = f.queries.by_id(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, FormError::NotFound(_)));
    }
}
