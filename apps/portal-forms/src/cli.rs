use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use uuid::Uuid;

use portal_forms::forms::lifecycle::{CreateForm, FormDetailsUpdate, ReopenForm, SubmitForm};
use portal_forms::forms::models::{FormData, FormStatus, FormType};
use portal_forms::forms::store::FormFilter;
use portal_forms::{AppState, FormError};

/// Operator tool for customer forms: assign, drive and inspect form lifecycles.
#[derive(Parser)]
#[command(name = "portal-forms", version, about = "Customer form lifecycle operator tool")]
pub struct Cli {
    /// Print single-line JSON instead of pretty output
    #[arg(long, global = true)]
    pub compact: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply pending database migrations
    Migrate,

    #[command(flatten)]
    Form(FormCommand),
}

/// Commands that run against the form core.
#[derive(Subcommand)]
pub enum FormCommand {
    /// Assign a new form to a customer
    Assign {
        /// Form type, e.g. WINDOWS or GARAGE_DOORS
        #[arg(long = "type")]
        form_type: String,
        #[arg(long)]
        project: String,
        #[arg(long)]
        lot: String,
        #[arg(long)]
        customer: String,
        #[arg(long)]
        customer_name: Option<String>,
        #[arg(long)]
        customer_email: Option<String>,
        /// User ID of the staff member assigning the form
        #[arg(long)]
        assigned_by: String,
        #[arg(long)]
        assigned_by_name: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        instructions: Option<String>,
        /// Initial payload as a JSON object
        #[arg(long)]
        data: Option<String>,
    },

    /// Save an in-progress payload without submitting
    Save {
        form_id: Uuid,
        /// Payload as a JSON object
        #[arg(long)]
        data: String,
        #[arg(long)]
        by: String,
    },

    /// Submit a form and record a history snapshot
    Submit {
        form_id: Uuid,
        /// Payload as a JSON object
        #[arg(long)]
        data: String,
        #[arg(long)]
        by: String,
        /// Display name stored on the history entry
        #[arg(long)]
        by_name: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Reopen a submitted or completed form for revision
    Reopen {
        form_id: Uuid,
        #[arg(long)]
        by: String,
        #[arg(long)]
        reason: String,
        /// Replaces the form instructions when given
        #[arg(long)]
        instructions: Option<String>,
    },

    /// Mark a submitted form as complete
    Complete {
        form_id: Uuid,
        #[arg(long)]
        by: String,
    },

    /// Edit a form's title or instructions
    UpdateDetails {
        form_id: Uuid,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        instructions: Option<String>,
    },

    /// Delete a form together with its submission history
    Delete {
        form_id: Uuid,
        #[arg(long)]
        by: String,
    },

    /// Show a single form
    Show { form_id: Uuid },

    /// List forms, newest first
    List {
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        lot: Option<String>,
        #[arg(long)]
        customer: Option<String>,
        #[arg(long)]
        assigned_by: Option<String>,
        #[arg(long = "type")]
        form_type: Option<String>,
        #[arg(long)]
        status: Option<String>,
        /// Only forms that have been reopened at least once
        #[arg(long)]
        reopened: bool,
    },

    /// Show the submission history of a form
    History {
        form_id: Uuid,
        #[arg(long, conflicts_with_all = ["latest", "count"])]
        newest_first: bool,
        /// Only the most recent submission
        #[arg(long, conflicts_with = "count")]
        latest: bool,
        /// Only the number of submissions
        #[arg(long)]
        count: bool,
    },
}

/// Runs one core command and returns its JSON result.
pub async fn execute(state: &AppState, command: FormCommand) -> Result<Value, FormError> {
    match command {
        FormCommand::Assign {
            form_type,
            project,
            lot,
            customer,
            customer_name,
            customer_email,
            assigned_by,
            assigned_by_name,
            title,
            instructions,
            data,
        } => {
            let form_type: FormType = form_type.parse()?;
            if state
                .queries
                .lot_has_form(&project, &lot, &customer, form_type)
                .await?
            {
                return Err(FormError::Validation(format!(
                    "Customer {customer} already has a {form_type} form on lot {lot} of project {project}"
                )));
            }

            let initial_data = match data {
                Some(raw) => parse_payload(&raw)?,
                None => FormData::new(),
            };
            let form = state
                .lifecycle
                .create(CreateForm {
                    form_type,
                    project_id: project,
                    lot_id: lot,
                    customer_id: customer,
                    customer_name,
                    customer_email,
                    assigned_by_user_id: assigned_by,
                    assigned_by_name,
                    title,
                    instructions,
                    initial_data,
                })
                .await?;
            to_json(&form)
        }

        FormCommand::Save { form_id, data, by } => {
            let form = state
                .lifecycle
                .update_data(form_id, parse_payload(&data)?, &by)
                .await?;
            to_json(&form)
        }

        FormCommand::Submit {
            form_id,
            data,
            by,
            by_name,
            notes,
        } => {
            let form = state
                .lifecycle
                .submit(SubmitForm {
                    form_id,
                    data: parse_payload(&data)?,
                    submitted_by_user_id: by,
                    submitted_by_name: by_name,
                    notes,
                })
                .await?;
            to_json(&form)
        }

        FormCommand::Reopen {
            form_id,
            by,
            reason,
            instructions,
        } => {
            let form = state
                .lifecycle
                .reopen(ReopenForm {
                    form_id,
                    reopened_by_user_id: by,
                    reason,
                    new_instructions: instructions,
                })
                .await?;
            to_json(&form)
        }

        FormCommand::Complete { form_id, by } => {
            to_json(&state.lifecycle.complete(form_id, &by).await?)
        }

        FormCommand::UpdateDetails {
            form_id,
            title,
            instructions,
        } => {
            let form = state
                .lifecycle
                .update_details(form_id, FormDetailsUpdate { title, instructions })
                .await?;
            to_json(&form)
        }

        FormCommand::Delete { form_id, by } => {
            state.lifecycle.delete(form_id, &by).await?;
            Ok(json!({ "deleted": form_id }))
        }

        FormCommand::Show { form_id } => to_json(&state.queries.by_id(form_id).await?),

        FormCommand::List {
            project,
            lot,
            customer,
            assigned_by,
            form_type,
            status,
            reopened,
        } => {
            let filter = FormFilter {
                project_id: project,
                lot_id: lot,
                customer_id: customer,
                assigned_by_user_id: assigned_by,
                form_type: form_type.map(|t| t.parse::<FormType>()).transpose()?,
                status: status.map(|s| s.parse::<FormStatus>()).transpose()?,
                reopened_only: reopened,
            };
            to_json(&state.queries.list(&filter).await?)
        }

        FormCommand::History {
            form_id,
            newest_first,
            latest,
            count,
        } => {
            if count {
                let count = state.history.count(form_id).await?;
                Ok(json!({ "form_id": form_id, "count": count }))
            } else if latest {
                to_json(&state.history.latest(form_id).await?)
            } else if newest_first {
                to_json(&state.history.entries_newest_first(form_id).await?)
            } else {
                to_json(&state.history.entries(form_id).await?)
            }
        }
    }
}

/// Parses a `--data` argument. Only JSON objects are valid form payloads.
pub fn parse_payload(raw: &str) -> Result<FormData, FormError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(FormError::Validation(format!(
            "Form data must be a JSON object, got {}",
            kind_of(&other)
        ))),
        Err(e) => Err(FormError::Validation(format!("Form data is not valid JSON: {e}"))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, FormError> {
    Ok(serde_json::to_value(value)?)
}

pub fn render(value: &Value, compact: bool) -> String {
    let rendered = if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    };
    rendered.unwrap_or_else(|_| value.to_string())
}

/// Process exit status per error kind, so scripts can branch without parsing output.
pub fn exit_code(err: &FormError) -> i32 {
    match err {
        FormError::Validation(_) => 2,
        FormError::NotFound(_) => 3,
        FormError::InvalidState { .. } => 4,
        FormError::ConcurrentModification(_) => 5,
        FormError::Storage(_) => 1,
    }
}
