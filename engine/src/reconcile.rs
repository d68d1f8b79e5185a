//! Differential synchronization rounds.
//!
//! A round takes a client's patch for one scope and produces the patch the
//! client needs to converge with the server.
//!
//! # Algorithm
//!
//! 1. Lock the scope and load the current collection
//! 2. Apply the patch to the shadow (or the loaded collection when the scope
//!    has no shadow yet) and to a working copy of the loaded collection
//! 3. Classify the working copy against the loaded collection, commit the
//!    result through the persistence callback and load the collection again
//!    so it is in storage order
//! 4. Diff the patched shadow against the committed collection; this is
//!    the outgoing patch
//! 5. Store the committed collection as the new shadow
//!
//! Storing the collection in the order `load` returns it keeps the shadow
//! and the next round's working copy aligned by index, even after a client
//! moved records or inserted one in the middle.
//!
//! Any failure before step 5 leaves the shadow and storage as they were.

use crate::{
    diff::{diff, ChangeSet},
    error::Result,
    operation::{IdentityPolicy, PatchContext},
    shadow::ShadowStore,
    Collection, CollectionSchema, Error, Patch, PersistenceCallback, Record,
};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};

/// One mutex per scope. Rounds on the same scope run one at a time; rounds
/// on different scopes do not contend.
#[derive(Debug, Default)]
pub struct ScopeLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ScopeLocks {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// The mutex guarding `scope`, created on first use.
    pub fn lock_for(&self, scope: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.get(scope) {
            return Arc::clone(lock.value());
        }
        Arc::clone(self.locks.entry(scope.to_string()).or_default().value())
    }

    /// Number of scopes seen so far.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no scope has been locked yet.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Counts from one round, for logging.
#[derive(Debug, Default, Clone, Copy)]
struct RoundStats {
    added: usize,
    modified: usize,
    removed: usize,
}

/// Runs synchronization rounds for one collection type.
pub struct Reconciler<S: ShadowStore> {
    schema: CollectionSchema,
    shadows: S,
    locks: ScopeLocks,
    identity: IdentityPolicy,
}

impl<S: ShadowStore> Reconciler<S> {
    /// Create a reconciler for records described by `schema`.
    pub fn new(schema: CollectionSchema, shadows: S) -> Self {
        Self {
            schema,
            shadows,
            locks: ScopeLocks::new(),
            identity: IdentityPolicy::default(),
        }
    }

    /// Set who may write identities in incoming patches.
    pub fn with_identity_policy(mut self, identity: IdentityPolicy) -> Self {
        self.identity = identity;
        self
    }

    /// The record schema.
    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    /// The shadow store.
    pub fn shadows(&self) -> &S {
        &self.shadows
    }

    /// Run one round over a collection scope.
    ///
    /// `load` reads the authoritative collection and is called again after
    /// a commit; `persistence` commits the changes through one
    /// `persist_changes` call. Returns the outgoing patch, empty when client
    /// and server have converged.
    pub fn reconcile<L>(
        &self,
        scope: &str,
        patch: &Patch,
        load: L,
        persistence: &dyn PersistenceCallback,
    ) -> Result<Patch>
    where
        L: Fn() -> Result<Collection>,
    {
        self.locked(scope, patch, || {
            let current = load()?;
            self.round(scope, patch, current, |before, working, stats| {
                let changes = ChangeSet::between(before, &working, &self.schema);
                if changes.is_empty() {
                    return Ok(before.clone());
                }
                stats.added = changes.added().count();
                stats.modified = changes.modified().count();
                stats.removed = changes.removed().len();

                let (mut to_save, to_delete) = changes.into_parts();
                persistence.persist_changes(&mut to_save, &to_delete)?;
                load()
            })
        })
    }

    /// Run one round over a single-record scope.
    ///
    /// Pointers in `patch` and in the returned patch are relative to the
    /// record (`/description`), and the commit goes through
    /// `persist_change`.
    pub fn reconcile_one<L>(
        &self,
        scope: &str,
        patch: &Patch,
        load: L,
        persistence: &dyn PersistenceCallback,
    ) -> Result<Patch>
    where
        L: FnOnce() -> Result<Record>,
    {
        if let Some(op) = patch.iter().find(|op| {
            op.path().is_root() || op.from().map(|from| from.is_root()).unwrap_or(false)
        }) {
            return Err(Error::InvalidTarget {
                path: op.path().to_string(),
                op: op.name(),
            });
        }
        let rebased = patch.rebase(0)?;

        self.locked(scope, patch, || {
            let current = Collection::from(vec![load()?]);
            let outgoing = self.round(scope, &rebased, current, |before, mut working, stats| {
                let (Some(old), Some(new)) = (before.get(0), working.get_mut(0)) else {
                    return Ok(working);
                };
                if old.same_as(new, &self.schema) {
                    return Ok(working);
                }
                if new.id.is_none() {
                    stats.added = 1;
                } else {
                    stats.modified = 1;
                }
                persistence.persist_change(new)?;
                Ok(working)
            })?;
            outgoing.strip_element()
        })
    }

    /// Drop the shadow for `scope`; the next round starts from storage.
    pub fn reset(&self, scope: &str) -> bool {
        self.shadows.remove(scope)
    }

    fn locked<F>(&self, scope: &str, patch: &Patch, f: F) -> Result<Patch>
    where
        F: FnOnce() -> Result<Patch>,
    {
        let lock = self.locks.lock_for(scope);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let result = f();
        if let Err(e) = &result {
            tracing::warn!(
                scope = %scope,
                ops = patch.len(),
                error = %e,
                "Reconciliation round aborted"
            );
        }
        result
    }

    fn round<C>(
        &self,
        scope: &str,
        patch: &Patch,
        current: Collection,
        commit: C,
    ) -> Result<Patch>
    where
        C: FnOnce(&Collection, Collection, &mut RoundStats) -> Result<Collection>,
    {
        let ctx = PatchContext::new(&self.schema).with_identity(self.identity);

        let mut shadow = match self.shadows.get(scope) {
            Some(stored) => Collection::clone(&stored),
            None => current.clone(),
        };
        patch.apply_in_place(&mut shadow, &ctx)?;

        let mut working = current.clone();
        patch.apply_in_place(&mut working, &ctx)?;

        let mut stats = RoundStats::default();
        let committed = commit(&current, working, &mut stats)?;

        let outgoing = diff(&shadow, &committed, &self.schema);
        tracing::debug!(
            scope = %scope,
            ops = patch.len(),
            added = stats.added,
            modified = stats.modified,
            removed = stats.removed,
            outgoing = outgoing.len(),
            "Reconciliation round complete"
        );

        self.shadows.put(scope, committed);
        Ok(outgoing)
    }
}
