use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::FormError;
use crate::forms::models::{FormRecord, SubmissionHistoryEntry};
use crate::forms::store::{FormFilter, FormStore, HistoryOrder};

#[derive(Debug, Default)]
struct Tables {
    forms: HashMap<Uuid, FormRecord>,
    history: HashMap<Uuid, Vec<SubmissionHistoryEntry>>,
}

#[derive(Debug, Clone)]
enum PendingWrite {
    Insert(FormRecord),
    Update {
        form: FormRecord,
        expected_version: i64,
    },
    Append(SubmissionHistoryEntry),
    Delete(Uuid),
}

impl Tables {
    /// Checks staged writes in order against the committed tables, enforcing the
    /// same constraints as the SQL schema. Only the forms the writes touch are tracked.
    fn check(&self, writes: &[PendingWrite]) -> Result<(), FormError> {
        // `None` marks a form this transaction deletes.
        let mut versions: HashMap<Uuid, Option<i64>> = HashMap::new();
        let mut numbers: HashMap<Uuid, HashSet<i32>> = HashMap::new();

        let version_of = |versions: &HashMap<Uuid, Option<i64>>, form_id: Uuid| {
            versions
                .get(&form_id)
                .copied()
                .unwrap_or_else(|| self.forms.get(&form_id).map(|f| f.version))
        };

        for write in writes {
            match write {
                PendingWrite::Insert(form) => {
                    if version_of(&versions, form.form_id).is_some() {
                        return Err(FormError::Storage(format!(
                            "form {} already exists",
                            form.form_id
                        )));
                    }
                    versions.insert(form.form_id, Some(form.version));
                    numbers.insert(form.form_id, HashSet::new());
                }
                PendingWrite::Update {
                    form,
                    expected_version,
                } => match version_of(&versions, form.form_id) {
                    None => return Err(FormError::NotFound(form.form_id)),
                    Some(current) if current != *expected_version => {
                        return Err(FormError::ConcurrentModification(form.form_id))
                    }
                    Some(_) => {
                        versions.insert(form.form_id, Some(form.version));
                    }
                },
                PendingWrite::Append(entry) => {
                    if version_of(&versions, entry.form_id).is_none() {
                        return Err(FormError::Storage(format!(
                            "history entry references unknown form {}",
                            entry.form_id
                        )));
                    }
                    if entry.submission_number < 1 {
                        return Err(FormError::Storage(format!(
                            "submission number {} is out of range",
                            entry.submission_number
                        )));
                    }
                    let taken = numbers.entry(entry.form_id).or_insert_with(|| {
                        self.history
                            .get(&entry.form_id)
                            .map(|entries| entries.iter().map(|e| e.submission_number).collect())
                            .unwrap_or_default()
                    });
                    if !taken.insert(entry.submission_number) {
                        return Err(FormError::ConcurrentModification(entry.form_id));
                    }
                }
                PendingWrite::Delete(form_id) => {
                    if version_of(&versions, *form_id).is_none() {
                        return Err(FormError::NotFound(*form_id));
                    }
                    versions.insert(*form_id, None);
                    numbers.insert(*form_id, HashSet::new());
                }
            }
        }
        Ok(())
    }

    /// Applies one write that `check` has already accepted.
    fn apply(&mut self, write: PendingWrite) {
        match write {
            PendingWrite::Insert(form) | PendingWrite::Update { form, .. } => {
                self.forms.insert(form.form_id, form);
            }
            PendingWrite::Append(entry) => {
                self.history.entry(entry.form_id).or_default().push(entry);
            }
            PendingWrite::Delete(form_id) => {
                self.forms.remove(&form_id);
                self.history.remove(&form_id);
            }
        }
    }
}

/// Process-local store with the same unit-of-work and optimistic-concurrency
/// behaviour as `PgFormStore`. Writes are buffered per transaction, checked
/// against the committed tables at commit, and applied only if all pass.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFormStore {
    tables: Arc<Mutex<Tables>>,
}

#[derive(Debug, Default)]
pub struct MemoryTx {
    pending: Vec<PendingWrite>,
}

impl InMemoryFormStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, FormError> {
        self.tables
            .lock()
            .map_err(|_| FormError::Storage("in-memory store lock poisoned".to_string()))
    }

    /// The form as this transaction sees it: committed state plus its own staged writes.
    fn form_in_tx(&self, tx: &MemoryTx, form_id: Uuid) -> Result<Option<FormRecord>, FormError> {
        let mut view = self.tables()?.forms.get(&form_id).cloned();
        for write in &tx.pending {
            match write {
                PendingWrite::Insert(form) | PendingWrite::Update { form, .. }
                    if form.form_id == form_id =>
                {
                    view = Some(form.clone());
                }
                PendingWrite::Delete(id) if *id == form_id => view = None,
                _ => {}
            }
        }
        Ok(view)
    }

    fn submissions_in_tx(&self, tx: &MemoryTx, form_id: Uuid) -> Result<i32, FormError> {
        let mut count = self
            .tables()?
            .history
            .get(&form_id)
            .map_or(0, |entries| entries.len() as i32);
        for write in &tx.pending {
            match write {
                PendingWrite::Append(entry) if entry.form_id == form_id => count += 1,
                PendingWrite::Delete(id) if *id == form_id => count = 0,
                _ => {}
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl FormStore for InMemoryFormStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, FormError> {
        Ok(MemoryTx::default())
    }

    async fn commit(&self, tx: MemoryTx) -> Result<(), FormError> {
        let mut tables = self.tables()?;
        tables.check(&tx.pending)?;
        for write in tx.pending {
            tables.apply(write);
        }
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTx) -> Result<(), FormError> {
        drop(tx);
        Ok(())
    }

    async fn load_form(&self, tx: &mut MemoryTx, form_id: Uuid) -> Result<FormRecord, FormError> {
        self.form_in_tx(tx, form_id)?
            .ok_or(FormError::NotFound(form_id))
    }

    async fn insert_form(&self, tx: &mut MemoryTx, form: &FormRecord) -> Result<(), FormError> {
        tx.pending.push(PendingWrite::Insert(form.clone()));
        Ok(())
    }

    async fn update_form(
        &self,
        tx: &mut MemoryTx,
        form: &FormRecord,
        expected_version: i64,
    ) -> Result<(), FormError> {
        tx.pending.push(PendingWrite::Update {
            form: form.clone(),
            expected_version,
        });
        Ok(())
    }

    async fn delete_form(&self, tx: &mut MemoryTx, form_id: Uuid) -> Result<u64, FormError> {
        if self.form_in_tx(tx, form_id)?.is_none() {
            return Err(FormError::NotFound(form_id));
        }
        let removed = self.submissions_in_tx(tx, form_id)?;
        tx.pending.push(PendingWrite::Delete(form_id));
        Ok(removed as u64)
    }

    async fn count_submissions(&self, tx: &mut MemoryTx, form_id: Uuid) -> Result<i32, FormError> {
        self.submissions_in_tx(tx, form_id)
    }

    async fn append_submission(
        &self,
        tx: &mut MemoryTx,
        entry: &SubmissionHistoryEntry,
    ) -> Result<(), FormError> {
        tx.pending.push(PendingWrite::Append(entry.clone()));
        Ok(())
    }

    async fn find_form(&self, form_id: Uuid) -> Result<Option<FormRecord>, FormError> {
        Ok(self.tables()?.forms.get(&form_id).cloned())
    }

    async fn list_forms(&self, filter: &FormFilter) -> Result<Vec<FormRecord>, FormError> {
        let mut forms: Vec<FormRecord> = self
            .tables()?
            .forms
            .values()
            .filter(|f| filter.matches(f))
            .cloned()
            .collect();
        forms.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.form_id.cmp(&b.form_id))
        });
        Ok(forms)
    }

    async fn count_forms(&self, filter: &FormFilter) -> Result<i64, FormError> {
        let tables = self.tables()?;
        Ok(tables.forms.values().filter(|f| filter.matches(f)).count() as i64)
    }

    async fn list_submissions(
        &self,
        form_id: Uuid,
        order: HistoryOrder,
    ) -> Result<Vec<SubmissionHistoryEntry>, FormError> {
        let mut entries = self
            .tables()?
            .history
            .get(&form_id)
            .cloned()
            .unwrap_or_default();
        match order {
            HistoryOrder::Chronological => {
                entries.sort_by_key(|e| e.submission_number);
            }
            HistoryOrder::NewestFirst => entries.sort_by(|a, b| {
                b.submitted_at
                    .cmp(&a.submitted_at)
                    .then_with(|| b.submission_number.cmp(&a.submission_number))
            }),
        }
        Ok(entries)
    }

    async fn latest_submission(
        &self,
        form_id: Uuid,
    ) -> Result<Option<SubmissionHistoryEntry>, FormError> {
        Ok(self
            .tables()?
            .history
            .get(&form_id)
            .and_then(|entries| entries.iter().max_by_key(|e| e.submission_number))
            .cloned())
    }

    async fn submission_count(&self, form_id: Uuid) -> Result<i64, FormError> {
        Ok(self
            .tables()?
            .history
            .get(&form_id)
            .map_or(0, |entries| entries.len() as i64))
    }
}
