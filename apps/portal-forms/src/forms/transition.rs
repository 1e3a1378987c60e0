//! Pure form state machine. No storage, no clock.
//!
//! ```text
//! ASSIGNED | IN_PROGRESS | REOPENED --save-->     IN_PROGRESS
//! ASSIGNED | IN_PROGRESS | REOPENED --submit-->   SUBMITTED   (records a submission)
//! SUBMITTED | COMPLETED             --reopen-->   REOPENED
//! SUBMITTED                         --complete--> COMPLETED
//! ```
//!
//! ASSIGNED is only entered through creation, and DRAFT has no outgoing moves.

use serde::Serialize;

use crate::errors::FormError;
use crate::forms::events::FormEventKind;
use crate::forms::models::FormStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleCommand {
    UpdateData,
    Submit,
    Reopen,
    Complete,
}

impl LifecycleCommand {
    pub fn verb(self) -> &'static str {
        match self {
            LifecycleCommand::UpdateData => "update the data of",
            LifecycleCommand::Submit => "submit",
            LifecycleCommand::Reopen => "reopen",
            LifecycleCommand::Complete => "complete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effect {
    /// Append a history snapshot in the same unit of work.
    RecordSubmission,
    IncrementReopenCount,
    /// Publish after commit; never part of the unit of work.
    Emit(FormEventKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: FormStatus,
    pub to: FormStatus,
    pub effects: Vec<Effect>,
}

impl Transition {
    pub fn has(&self, effect: Effect) -> bool {
        self.effects.contains(&effect)
    }
}

/// Validates `command` against `current` and returns the resulting move.
pub fn transition(current: FormStatus, command: LifecycleCommand) -> Result<Transition, FormError> {
    use FormStatus::*;
    use LifecycleCommand::*;

    let (to, effects) = match (current, command) {
        (Assigned | InProgress | Reopened, UpdateData) => (InProgress, vec![]),
        (Assigned | InProgress | Reopened, Submit) => (
            Submitted,
            vec![
                Effect::RecordSubmission,
                Effect::Emit(FormEventKind::Submitted),
            ],
        ),
        (Submitted | Completed, Reopen) => (
            Reopened,
            vec![
                Effect::IncrementReopenCount,
                Effect::Emit(FormEventKind::Reopened),
            ],
        ),
        (Submitted, Complete) => (Completed, vec![Effect::Emit(FormEventKind::Completed)]),
        (status, command) => {
            return Err(FormError::InvalidState {
                status,
                action: command.verb(),
            })
        }
    };

    Ok(Transition {
        from: current,
        to,
        effects,
    })
}
