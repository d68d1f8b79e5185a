//! Persistence capability.
//!
//! The reconciler never talks to storage directly. It hands the records a
//! round produced to a [`PersistenceCallback`], which commits them and
//! assigns identities to new records in place.

use crate::{error::Result, Collection, Error, Record, RecordId};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Commits the effects of a reconciliation round.
///
/// Both methods block until the commit is durable (or failed). A failure
/// aborts the round and leaves the shadow untouched.
pub trait PersistenceCallback: Send + Sync {
    /// Save one record. Assigns `record.id` if it has none.
    fn persist_change(&self, record: &mut Record) -> Result<()>;

    /// Save `to_save` and delete `to_delete` as one unit. Assigns `id` to
    /// every record in `to_save` that has none.
    fn persist_changes(&self, to_save: &mut [Record], to_delete: &[Record]) -> Result<()>;
}

impl<P: PersistenceCallback + ?Sized> PersistenceCallback for Arc<P> {
    fn persist_change(&self, record: &mut Record) -> Result<()> {
        (**self).persist_change(record)
    }

    fn persist_changes(&self, to_save: &mut [Record], to_delete: &[Record]) -> Result<()> {
        (**self).persist_changes(to_save, to_delete)
    }
}

#[derive(Debug, Default)]
struct RepositoryState {
    rows: BTreeMap<RecordId, Record>,
    next_id: RecordId,
    fail_next: Option<String>,
    commits: usize,
}

/// Record repository kept in memory.
///
/// Identities are assigned from an increasing counter starting at 1 and
/// [`InMemoryRepository::find_all`] returns records in identity order, the
/// way a table scan by primary key would.
#[derive(Debug)]
pub struct InMemoryRepository {
    state: Mutex<RepositoryState>,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RepositoryState {
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Create a repository holding `records`, assigning identities to those
    /// without one.
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let repo = Self::new();
        {
            let mut state = repo.lock();
            for record in records {
                if let Err(e) = state.store(record) {
                    tracing::warn!(error = %e, "Skipped seed record");
                }
            }
        }
        repo
    }

    /// Every record, ordered by identity.
    pub fn find_all(&self) -> Collection {
        self.lock().rows.values().cloned().collect()
    }

    /// Find one record by identity.
    pub fn find(&self, id: RecordId) -> Option<Record> {
        self.lock().rows.get(&id).cloned()
    }

    /// Number of stored records.
    pub fn count(&self) -> usize {
        self.lock().rows.len()
    }

    /// Number of successful commits so far.
    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    /// Make the next commit fail with `message`.
    pub fn fail_next(&self, message: impl Into<String>) {
        self.lock().fail_next = Some(message.into());
    }

    fn lock(&self) -> MutexGuard<'_, RepositoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RepositoryState {
    fn check_failure(&mut self) -> Result<()> {
        match self.fail_next.take() {
            Some(message) => Err(Error::Persistence(message)),
            None => Ok(()),
        }
    }

    fn store(&mut self, mut record: Record) -> Result<RecordId> {
        let id = match record.id {
            Some(id) => id,
            None => {
                let id = self.next_id;
                if self.rows.contains_key(&id) {
                    return Err(Error::Persistence("no identities left to assign".into()));
                }
                record.id = Some(id);
                id
            }
        };
        self.next_id = self.next_id.max(id.saturating_add(1));
        self.rows.insert(id, record);
        Ok(id)
    }
}

impl PersistenceCallback for InMemoryRepository {
    fn persist_change(&self, record: &mut Record) -> Result<()> {
        let mut state = self.lock();
        state.check_failure()?;
        record.id = Some(state.store(record.clone())?);
        state.commits += 1;
        Ok(())
    }

    fn persist_changes(&self, to_save: &mut [Record], to_delete: &[Record]) -> Result<()> {
        let mut state = self.lock();
        state.check_failure()?;

        // Stage on a copy so a missing row leaves nothing half-written
        let mut staged = RepositoryState {
            rows: state.rows.clone(),
            next_id: state.next_id,
            fail_next: None,
            commits: state.commits,
        };
        let mut assigned = Vec::with_capacity(to_save.len());
        for record in to_save.iter() {
            assigned.push(staged.store(record.clone())?);
        }
        for record in to_delete {
            let Some(id) = record.id else {
                return Err(Error::Persistence(
                    "cannot delete a record without identity".into(),
                ));
            };
            if staged.rows.remove(&id).is_none() {
                return Err(Error::Persistence(format!("record {} does not exist", id)));
            }
        }

        for (record, id) in to_save.iter_mut().zip(assigned) {
            record.id = Some(id);
        }
        staged.commits += 1;
        *state = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn todo(description: &str) -> Record {
        let mut values = Map::new();
        values.insert("description".into(), json!(description));
        values.insert("complete".into(), json!(false));
        Record::new(values)
    }

    #[test]
    fn assigns_increasing_ids() {
        let repo = InMemoryRepository::with_records(vec![todo("A"), todo("B"), todo("C")]);
        let ids: Vec<_> = repo.find_all().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![Some(1), Some(2), Some(3)]);

        let mut record = todo("D");
        repo.persist_change(&mut record).unwrap();
        assert_eq!(record.id, Some(4));
        assert_eq!(repo.count(), 4);
    }

    #[test]
    fn persist_changes_saves_and_deletes() {
        let repo = InMemoryRepository::with_records(vec![todo("A"), todo("B"), todo("C")]);
        let mut to_save = vec![repo.find(1).unwrap(), todo("D")];
        to_save[0].set("complete", json!(true));
        let to_delete = vec![repo.find(2).unwrap()];

        repo.persist_changes(&mut to_save, &to_delete).unwrap();

        assert_eq!(to_save[1].id, Some(4));
        let all = repo.find_all();
        let ids: Vec<_> = all.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![Some(1), Some(3), Some(4)]);
        assert_eq!(all.get(0).unwrap().get("complete"), json!(true));
        assert_eq!(repo.commits(), 1);
    }

    #[test]
    fn injected_failure_changes_nothing() {
        let repo = InMemoryRepository::with_records(vec![todo("A")]);
        repo.fail_next("disk full");

        let mut to_save = vec![todo("B")];
        let result = repo.persist_changes(&mut to_save, &[]);
        assert_eq!(result, Err(Error::Persistence("disk full".into())));
        assert_eq!(to_save[0].id, None);
        assert_eq!(repo.count(), 1);

        // Only the next commit fails
        repo.persist_changes(&mut to_save, &[]).unwrap();
        assert_eq!(repo.count(), 2);
    }

    #[test]
    fn identity_at_upper_bound_does_not_overflow() {
        let repo = InMemoryRepository::with_records(vec![Record::with_id(i64::MAX, Map::new())]);
        assert_eq!(repo.find(i64::MAX).map(|r| r.id), Some(Some(i64::MAX)));

        let mut record = todo("B");
        let result = repo.persist_change(&mut record);
        assert!(matches!(result, Err(Error::Persistence(_))));
        assert_eq!(record.id, None);
        assert_eq!(repo.count(), 1);
    }

    #[test]
    fn deleting_unknown_record_fails_atomically() {
        let repo = InMemoryRepository::with_records(vec![todo("A")]);
        let mut to_save = vec![todo("B")];
        let ghost = Record::with_id(42, Map::new());

        let result = repo.persist_changes(&mut to_save, &[ghost]);
        assert!(matches!(result, Err(Error::Persistence(_))));
        assert_eq!(to_save[0].id, None);
        assert_eq!(repo.count(), 1);
    }
}
