// Unit of work: one transaction and one set of cached store handles per request

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::core::errors::StoreError;
use crate::store::entity::Entity;
use crate::store::memory::{MemoryDb, MemorySession, MemoryStore};

/// Precondition applied by `save_changes`.
///
/// Earlier revisions shipped with the guard inverted: saving was rejected
/// while a transaction WAS active, which contradicts every call site (they
/// all begin a transaction first). That behavior stays available as
/// `LegacyRejectInTransaction` for bug-compatible deployments;
/// `RequireTransaction` is the corrected default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveGuard {
    #[default]
    RequireTransaction,
    LegacyRejectInTransaction,
}

/// Owns one persistence session for the lifetime of a logical operation.
///
/// Two independent axes: the transaction (`none -> active -> committed |
/// rolled-back -> none`) and the store cache (populated lazily, cleared
/// only at close). Not safe to drive from multiple tasks concurrently.
pub struct UnitOfWork {
    session: Arc<MemorySession>,
    stores: Mutex<HashMap<TypeId, Box<dyn std::any::Any + Send + Sync>>>,
    guard: SaveGuard,
}

impl UnitOfWork {
    pub fn new(db: &Arc<MemoryDb>) -> Self {
        Self::with_guard(db, SaveGuard::default())
    }

    pub fn with_guard(db: &Arc<MemoryDb>, guard: SaveGuard) -> Self {
        Self {
            session: MemorySession::new(Arc::clone(db)),
            stores: Mutex::new(HashMap::new()),
            guard,
        }
    }

    /// Resolve-and-cache the store handle for one entity kind. Repeated
    /// calls return a handle over the same underlying session; the session
    /// is never re-created mid-lifetime.
    pub fn store<T: Entity>(&self) -> MemoryStore<T> {
        let mut stores = self.stores.lock().unwrap_or_else(|e| e.into_inner());
        let entry = stores
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(MemoryStore::<T>::new(Arc::clone(&self.session))));
        entry
            .downcast_ref::<MemoryStore<T>>()
            .cloned()
            .unwrap_or_else(|| MemoryStore::new(Arc::clone(&self.session)))
    }

    /// Idempotent: a nested begin never opens a second transaction. Waits
    /// for any other session's transaction to finish first.
    pub async fn begin_transaction(&self, ct: &CancellationToken) -> Result<(), StoreError> {
        self.session.begin(ct).await
    }

    /// Fails with `NoActiveTransaction` when none is active; on success the
    /// transaction resource is released.
    pub async fn commit_transaction(&self, ct: &CancellationToken) -> Result<(), StoreError> {
        self.session.commit(ct)
    }

    /// Fails with `NoActiveTransaction` when none is active; discards all
    /// staged mutations for the current transaction.
    pub async fn rollback_transaction(&self, ct: &CancellationToken) -> Result<(), StoreError> {
        self.session.rollback(ct)
    }

    /// Rollback that tolerates `NoActiveTransaction` as a benign no-op.
    pub async fn safe_rollback(&self, ct: &CancellationToken) -> Result<(), StoreError> {
        match self.session.rollback(ct) {
            Err(StoreError::NoActiveTransaction) => Ok(()),
            other => other,
        }
    }

    /// Flush staged mutations; returns the number applied.
    pub async fn save_changes(&self, ct: &CancellationToken) -> Result<usize, StoreError> {
        match self.guard {
            SaveGuard::RequireTransaction => {
                if !self.session.is_transaction_active() {
                    return Err(StoreError::SaveOutsideTransaction);
                }
            }
            SaveGuard::LegacyRejectInTransaction => {
                if self.session.is_transaction_active() {
                    return Err(StoreError::SaveInsideTransaction);
                }
            }
        }
        self.session.flush(ct).await
    }

    pub fn is_transaction_active(&self) -> bool {
        self.session.is_transaction_active()
    }

    /// Idempotent disposal; surfaces `TransactionStillActive` if the caller
    /// left a transaction open.
    pub async fn close(&self) -> Result<(), StoreError> {
        self.stores
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.session.close()
    }
}
