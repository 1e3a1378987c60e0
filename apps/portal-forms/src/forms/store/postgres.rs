use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::errors::FormError;
use crate::forms::models::{
    FormRecord, FormRow, SubmissionHistoryEntry, SubmissionRow,
};
use crate::forms::store::{FormFilter, FormStore, HistoryOrder};

const FILTER_CLAUSE: &str = r#"
    WHERE ($1::text IS NULL OR project_id = $1)
      AND ($2::text IS NULL OR lot_id = $2)
      AND ($3::text IS NULL OR customer_id = $3)
      AND ($4::text IS NULL OR assigned_by_user_id = $4)
      AND ($5::text IS NULL OR form_type = $5)
      AND ($6::text IS NULL OR status = $6)
      AND (NOT $7::boolean OR reopened_date IS NOT NULL)
"#;

/// PostgreSQL-backed store. See `migrations/` for the schema it expects.
#[derive(Clone)]
pub struct PgFormStore {
    pool: PgPool,
}

impl PgFormStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn filtered<'q, O>(
        query: sqlx::query::QueryAs<'q, Postgres, O, sqlx::postgres::PgArguments>,
        filter: &'q FormFilter,
    ) -> sqlx::query::QueryAs<'q, Postgres, O, sqlx::postgres::PgArguments> {
        query
            .bind(filter.project_id.as_deref())
            .bind(filter.lot_id.as_deref())
            .bind(filter.customer_id.as_deref())
            .bind(filter.assigned_by_user_id.as_deref())
            .bind(filter.form_type.map(|t| t.as_str()))
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.reopened_only)
    }
}

#[async_trait]
impl FormStore for PgFormStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx, FormError> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), FormError> {
        Ok(tx.commit().await?)
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), FormError> {
        Ok(tx.rollback().await?)
    }

    async fn load_form(&self, tx: &mut Self::Tx, form_id: Uuid) -> Result<FormRecord, FormError> {
        let row: Option<FormRow> = sqlx::query_as("SELECT * FROM forms WHERE form_id = $1")
            .bind(form_id)
            .fetch_optional(&mut **tx)
            .await?;

        row.ok_or(FormError::NotFound(form_id))?.try_into()
    }

    async fn insert_form(&self, tx: &mut Self::Tx, form: &FormRecord) -> Result<(), FormError> {
        sqlx::query(
            r#"
            INSERT INTO forms
                (form_id, form_type, status, project_id, lot_id, customer_id,
                 customer_name, customer_email, assigned_by_user_id, assigned_by_name,
                 title, instructions, form_data, assigned_date, first_submitted_date,
                 last_submitted_date, completed_date, reopened_date, reopened_by_user_id,
                 reopen_reason, reopen_count, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, $21, $22, $23, $24)
            "#,
        )
        .bind(form.form_id)
        .bind(form.form_type.as_str())
        .bind(form.status.as_str())
        .bind(&form.project_id)
        .bind(&form.lot_id)
        .bind(&form.customer_id)
        .bind(&form.customer_name)
        .bind(&form.customer_email)
        .bind(&form.assigned_by_user_id)
        .bind(&form.assigned_by_name)
        .bind(&form.title)
        .bind(&form.instructions)
        .bind(Json(&form.form_data))
        .bind(form.assigned_date)
        .bind(form.first_submitted_date)
        .bind(form.last_submitted_date)
        .bind(form.completed_date)
        .bind(form.reopened_date)
        .bind(&form.reopened_by_user_id)
        .bind(&form.reopen_reason)
        .bind(form.reopen_count)
        .bind(form.version)
        .bind(form.created_at)
        .bind(form.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn update_form(
        &self,
        tx: &mut Self::Tx,
        form: &FormRecord,
        expected_version: i64,
    ) -> Result<(), FormError> {
        // Identity, type and parties never change after creation.
        let result = sqlx::query(
            r#"
            UPDATE forms SET
                status = $3,
                title = $4,
                instructions = $5,
                form_data = $6,
                first_submitted_date = $7,
                last_submitted_date = $8,
                completed_date = $9,
                reopened_date = $10,
                reopened_by_user_id = $11,
                reopen_reason = $12,
                reopen_count = $13,
                version = $14,
                updated_at = $15
            WHERE form_id = $1 AND version = $2
            "#,
        )
        .bind(form.form_id)
        .bind(expected_version)
        .bind(form.status.as_str())
        .bind(&form.title)
        .bind(&form.instructions)
        .bind(Json(&form.form_data))
        .bind(form.first_submitted_date)
        .bind(form.last_submitted_date)
        .bind(form.completed_date)
        .bind(form.reopened_date)
        .bind(&form.reopened_by_user_id)
        .bind(&form.reopen_reason)
        .bind(form.reopen_count)
        .bind(form.version)
        .bind(form.updated_at)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            debug!(
                "Version guard rejected update of form {} (expected v{expected_version})",
                form.form_id
            );
            return Err(FormError::ConcurrentModification(form.form_id));
        }
        Ok(())
    }

    async fn delete_form(&self, tx: &mut Self::Tx, form_id: Uuid) -> Result<u64, FormError> {
        let history = sqlx::query("DELETE FROM form_submission_history WHERE form_id = $1")
            .bind(form_id)
            .execute(&mut **tx)
            .await?;

        let form = sqlx::query("DELETE FROM forms WHERE form_id = $1")
            .bind(form_id)
            .execute(&mut **tx)
            .await?;

        if form.rows_affected() == 0 {
            return Err(FormError::NotFound(form_id));
        }
        Ok(history.rows_affected())
    }

    async fn count_submissions(&self, tx: &mut Self::Tx, form_id: Uuid) -> Result<i32, FormError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM form_submission_history WHERE form_id = $1")
                .bind(form_id)
                .fetch_one(&mut **tx)
                .await?;
        i32::try_from(count)
            .map_err(|_| FormError::Storage(format!("submission count {count} out of range")))
    }

    async fn append_submission(
        &self,
        tx: &mut Self::Tx,
        entry: &SubmissionHistoryEntry,
    ) -> Result<(), FormError> {
        sqlx::query(
            r#"
            INSERT INTO form_submission_history
                (id, form_id, submission_number, status_at_submission, form_data_snapshot,
                 submitted_by_user_id, submitted_by_name, submission_notes, submitted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(entry.form_id)
        .bind(entry.submission_number)
        .bind(entry.status_at_submission.as_str())
        .bind(Json(&entry.form_data_snapshot))
        .bind(&entry.submitted_by_user_id)
        .bind(&entry.submitted_by_name)
        .bind(&entry.submission_notes)
        .bind(entry.submitted_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| FormError::from_append(e, entry.form_id))?;

        Ok(())
    }

    async fn find_form(&self, form_id: Uuid) -> Result<Option<FormRecord>, FormError> {
        let row: Option<FormRow> = sqlx::query_as("SELECT * FROM forms WHERE form_id = $1")
            .bind(form_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(FormRecord::try_from).transpose()
    }

    async fn list_forms(&self, filter: &FormFilter) -> Result<Vec<FormRecord>, FormError> {
        let sql = format!("SELECT * FROM forms {FILTER_CLAUSE} ORDER BY created_at DESC, form_id");
        let rows: Vec<FormRow> = Self::filtered(sqlx::query_as(&sql), filter)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(FormRecord::try_from).collect()
    }

    async fn count_forms(&self, filter: &FormFilter) -> Result<i64, FormError> {
        let sql = format!("SELECT COUNT(*) FROM forms {FILTER_CLAUSE}");
        let (count,): (i64,) = Self::filtered(sqlx::query_as(&sql), filter)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn list_submissions(
        &self,
        form_id: Uuid,
        order: HistoryOrder,
    ) -> Result<Vec<SubmissionHistoryEntry>, FormError> {
        let sql = match order {
            HistoryOrder::Chronological => {
                "SELECT * FROM form_submission_history WHERE form_id = $1 ORDER BY submission_number ASC"
            }
            HistoryOrder::NewestFirst => {
                "SELECT * FROM form_submission_history WHERE form_id = $1 ORDER BY submitted_at DESC, submission_number DESC"
            }
        };
        let rows: Vec<SubmissionRow> = sqlx::query_as(sql)
            .bind(form_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(SubmissionHistoryEntry::try_from).collect()
    }

    async fn latest_submission(
        &self,
        form_id: Uuid,
    ) -> Result<Option<SubmissionHistoryEntry>, FormError> {
        let row: Option<SubmissionRow> = sqlx::query_as(
            "SELECT * FROM form_submission_history WHERE form_id = $1 ORDER BY submission_number DESC LIMIT 1",
        )
        .bind(form_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SubmissionHistoryEntry::try_from).transpose()
    }

    async fn submission_count(&self, form_id: Uuid) -> Result<i64, FormError> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM form_submission_history WHERE form_id = $1")
                .bind(form_id)
                .fetch_one(&self.pool)
                .await?,
        )
    }
}
