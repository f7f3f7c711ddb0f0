// In-memory persistence backend: table registry, session, store handles

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::errors::StoreError;
use crate::store::entity::{Entity, EntityStore};

/// Uniqueness rule checked when a staged insert/update is flushed.
///
/// Receives the candidate row and the current table contents; rows with the
/// candidate's own id must be skipped by the rule.
pub type Constraint<T> = Arc<dyn Fn(&T, &HashMap<Uuid, T>) -> Result<(), StoreError> + Send + Sync>;

/// Build a uniqueness constraint over an optional string key, restricted to
/// rows for which `applies` holds (e.g. active accounts only).
pub fn unique_constraint<T, K, A>(field: &'static str, key: K, applies: A) -> Constraint<T>
where
    T: Entity,
    K: Fn(&T) -> Option<String> + Send + Sync + 'static,
    A: Fn(&T) -> bool + Send + Sync + 'static,
{
    Arc::new(move |candidate, rows| {
        let Some(candidate_key) = key(candidate) else {
            return Ok(());
        };
        if !applies(candidate) {
            return Ok(());
        }
        let clash = rows.values().any(|other| {
            other.id() != candidate.id()
                && applies(other)
                && key(other).as_deref() == Some(candidate_key.as_str())
        });
        if clash {
            Err(StoreError::UniqueViolation { field })
        } else {
            Ok(())
        }
    })
}

struct Table<T: Entity> {
    rows: HashMap<Uuid, T>,
    constraints: Vec<Constraint<T>>,
}

impl<T: Entity> Table<T> {
    fn check_constraints(&self, candidate: &T) -> Result<(), StoreError> {
        for constraint in &self.constraints {
            constraint(candidate, &self.rows)?;
        }
        Ok(())
    }
}

/// Type-erased table, so heterogeneous entity kinds share one registry.
trait AnyTable: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn boxed_clone(&self) -> Box<dyn AnyTable>;
}

impl<T: Entity> AnyTable for Table<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn boxed_clone(&self) -> Box<dyn AnyTable> {
        Box::new(Table {
            rows: self.rows.clone(),
            constraints: self.constraints.clone(),
        })
    }
}

type TableMap = HashMap<TypeId, Box<dyn AnyTable>>;

fn table_ref<T: Entity>(tables: &TableMap) -> Result<&Table<T>, StoreError> {
    tables
        .get(&TypeId::of::<T>())
        .and_then(|t| t.as_any().downcast_ref::<Table<T>>())
        .ok_or(StoreError::TableNotRegistered {
            type_name: T::type_name(),
        })
}

fn table_mut<T: Entity>(tables: &mut TableMap) -> Result<&mut Table<T>, StoreError> {
    tables
        .get_mut(&TypeId::of::<T>())
        .and_then(|t| t.as_any_mut().downcast_mut::<Table<T>>())
        .ok_or(StoreError::TableNotRegistered {
            type_name: T::type_name(),
        })
}

fn clone_tables(tables: &TableMap) -> TableMap {
    tables
        .iter()
        .map(|(id, table)| (*id, table.boxed_clone()))
        .collect()
}

/// Shared in-memory database.
///
/// Entity kinds must be registered explicitly before a session touches
/// them; there is no runtime discovery. Writes are single-writer: the
/// transaction gate serializes transactions (and stray non-transactional
/// saves) across sessions, so a committed row can never be wiped out by
/// another session's rollback.
pub struct MemoryDb {
    tables: RwLock<TableMap>,
    tx_gate: Arc<tokio::sync::Mutex<()>>,
}

impl MemoryDb {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tables: RwLock::new(HashMap::new()),
            tx_gate: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    pub fn register<T: Entity>(&self) {
        self.register_with::<T>(Vec::new());
    }

    pub fn register_with<T: Entity>(&self, constraints: Vec<Constraint<T>>) {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        tables.insert(
            TypeId::of::<T>(),
            Box::new(Table::<T> {
                rows: HashMap::new(),
                constraints,
            }),
        );
    }

    fn read<T: Entity, R>(&self, f: impl FnOnce(&Table<T>) -> R) -> Result<R, StoreError> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        Ok(f(table_ref::<T>(&tables)?))
    }
}

type StagedOp = Box<dyn FnOnce(&mut TableMap) -> Result<(), StoreError> + Send>;

struct SessionInner {
    staged: Vec<StagedOp>,
    tx_backup: Option<TableMap>,
    gate: Option<OwnedMutexGuard<()>>,
    closed: bool,
}

/// One persistence session: a staged-mutation queue plus an at-most-one
/// transaction over the shared database.
///
/// Transaction model: `begin` acquires the database's transaction gate and
/// snapshots the registered tables, `flush` applies the staged queue to the
/// live tables atomically, `rollback` restores the snapshot, `commit`
/// discards it; both release the gate. While one session holds the gate no
/// other session can begin or apply a save, so the snapshot/restore pair
/// only ever covers this session's own writes. Sessions are request-scoped
/// and must not be driven concurrently.
pub struct MemorySession {
    db: Arc<MemoryDb>,
    inner: Mutex<SessionInner>,
}

impl MemorySession {
    pub fn new(db: Arc<MemoryDb>) -> Arc<Self> {
        Arc::new(Self {
            db,
            inner: Mutex::new(SessionInner {
                staged: Vec::new(),
                tx_backup: None,
                gate: None,
                closed: false,
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_transaction_active(&self) -> bool {
        self.lock().tx_backup.is_some()
    }

    pub(crate) async fn begin(&self, ct: &CancellationToken) -> Result<(), StoreError> {
        if ct.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        {
            let inner = self.lock();
            if inner.closed {
                return Err(StoreError::SessionClosed);
            }
            if inner.tx_backup.is_some() {
                return Ok(());
            }
        }

        // Waits for any in-flight transaction to finish; the snapshot is
        // only taken once no other session can still write.
        let gate = tokio::select! {
            gate = Arc::clone(&self.db.tx_gate).lock_owned() => gate,
            _ = ct.cancelled() => return Err(StoreError::Cancelled),
        };

        let mut inner = self.lock();
        if inner.closed {
            return Err(StoreError::SessionClosed);
        }
        let tables = self.db.tables.read().unwrap_or_else(|e| e.into_inner());
        inner.tx_backup = Some(clone_tables(&tables));
        inner.gate = Some(gate);
        Ok(())
    }

    pub(crate) fn commit(&self, ct: &CancellationToken) -> Result<(), StoreError> {
        if ct.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let mut inner = self.lock();
        if inner.closed {
            return Err(StoreError::SessionClosed);
        }
        if inner.tx_backup.take().is_none() {
            return Err(StoreError::NoActiveTransaction);
        }
        inner.gate = None;
        Ok(())
    }

    pub(crate) fn rollback(&self, ct: &CancellationToken) -> Result<(), StoreError> {
        if ct.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let mut inner = self.lock();
        if inner.closed {
            return Err(StoreError::SessionClosed);
        }
        let Some(backup) = inner.tx_backup.take() else {
            return Err(StoreError::NoActiveTransaction);
        };
        inner.staged.clear();
        {
            let mut tables = self.db.tables.write().unwrap_or_else(|e| e.into_inner());
            *tables = backup;
        }
        inner.gate = None;
        Ok(())
    }

    /// Apply the staged queue to the live tables. All-or-nothing: the ops
    /// run against a working copy that only replaces the live tables when
    /// every op (constraints included) succeeds. A save outside any
    /// transaction takes the gate for the duration of the apply, so it
    /// cannot land inside another session's transaction window.
    pub(crate) async fn flush(&self, ct: &CancellationToken) -> Result<usize, StoreError> {
        if ct.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let in_transaction = {
            let inner = self.lock();
            if inner.closed {
                return Err(StoreError::SessionClosed);
            }
            inner.gate.is_some()
        };
        let _gate = if in_transaction {
            None
        } else {
            Some(tokio::select! {
                gate = Arc::clone(&self.db.tx_gate).lock_owned() => gate,
                _ = ct.cancelled() => return Err(StoreError::Cancelled),
            })
        };

        let mut inner = self.lock();
        if inner.closed {
            return Err(StoreError::SessionClosed);
        }
        let staged: Vec<StagedOp> = inner.staged.drain(..).collect();
        let count = staged.len();

        let mut tables = self.db.tables.write().unwrap_or_else(|e| e.into_inner());
        let mut working = clone_tables(&tables);
        for op in staged {
            op(&mut working)?;
        }
        *tables = working;
        Ok(count)
    }

    /// Idempotent disposal. Releases staged work and the transaction
    /// resource; an open transaction at close time is surfaced as an error
    /// after release, never swallowed.
    pub(crate) fn close(&self) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.closed {
            return Ok(());
        }
        inner.closed = true;
        inner.staged.clear();
        let open = inner.tx_backup.take().is_some();
        inner.gate = None;
        if open {
            return Err(StoreError::TransactionStillActive);
        }
        Ok(())
    }

    fn stage(&self, op: StagedOp) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(StoreError::SessionClosed);
        }
        inner.staged.push(op);
        Ok(())
    }
}

/// Store handle for one entity kind, bound to one session.
pub struct MemoryStore<T: Entity> {
    session: Arc<MemorySession>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for MemoryStore<T> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            _marker: PhantomData,
        }
    }
}

impl<T: Entity> MemoryStore<T> {
    pub(crate) fn new(session: Arc<MemorySession>) -> Self {
        Self {
            session,
            _marker: PhantomData,
        }
    }

    fn guard(&self, ct: &CancellationToken) -> Result<(), StoreError> {
        if ct.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        Ok(())
    }

    fn stage_upsert(&self, entity: T) -> Result<(), StoreError> {
        self.session.stage(Box::new(move |tables| {
            let table = table_mut::<T>(tables)?;
            table.check_constraints(&entity)?;
            table.rows.insert(entity.id(), entity);
            Ok(())
        }))
    }

    fn stage_remove(&self, entity: T) -> Result<(), StoreError> {
        self.session.stage(Box::new(move |tables| {
            let table = table_mut::<T>(tables)?;
            table.rows.remove(&entity.id());
            Ok(())
        }))
    }
}

#[async_trait]
impl<T: Entity> EntityStore<T> for MemoryStore<T> {
    async fn get_all(&self, _tracked: bool, ct: &CancellationToken) -> Result<Vec<T>, StoreError> {
        self.guard(ct)?;
        self.session
            .db
            .read::<T, _>(|table| table.rows.values().cloned().collect())
    }

    async fn get<F>(
        &self,
        filter: F,
        _tracked: bool,
        ct: &CancellationToken,
    ) -> Result<Vec<T>, StoreError>
    where
        F: Fn(&T) -> bool + Send + Sync,
    {
        self.guard(ct)?;
        self.session
            .db
            .read::<T, _>(|table| table.rows.values().filter(|r| filter(r)).cloned().collect())
    }

    async fn get_projected<F, S, R>(
        &self,
        filter: F,
        selector: S,
        tracked: bool,
        ct: &CancellationToken,
    ) -> Result<Vec<R>, StoreError>
    where
        F: Fn(&T) -> bool + Send + Sync,
        S: Fn(&T) -> R + Send + Sync,
        R: Send,
    {
        self.get_page(filter, selector, 0, usize::MAX, tracked, ct)
            .await
    }

    async fn get_page<F, S, R>(
        &self,
        filter: F,
        selector: S,
        skip: usize,
        take: usize,
        _tracked: bool,
        ct: &CancellationToken,
    ) -> Result<Vec<R>, StoreError>
    where
        F: Fn(&T) -> bool + Send + Sync,
        S: Fn(&T) -> R + Send + Sync,
        R: Send,
    {
        self.guard(ct)?;
        self.session.db.read::<T, _>(|table| {
            let mut matched: Vec<&T> = table.rows.values().filter(|r| filter(r)).collect();
            // Stable order so pagination is deterministic
            matched.sort_by_key(|r| r.id());
            matched.into_iter().skip(skip).take(take).map(&selector).collect()
        })
    }

    async fn get_single<F>(
        &self,
        filter: F,
        _tracked: bool,
        ct: &CancellationToken,
    ) -> Result<Option<T>, StoreError>
    where
        F: Fn(&T) -> bool + Send + Sync,
    {
        self.guard(ct)?;
        self.session.db.read::<T, _>(|table| {
            let mut it = table.rows.values().filter(|r| filter(r));
            match (it.next(), it.next()) {
                (Some(first), None) => Ok(Some(first.clone())),
                (Some(_), Some(_)) => Err(StoreError::MultipleMatches),
                (None, _) => Ok(None),
            }
        })?
    }

    async fn get_single_projected<F, S, R>(
        &self,
        filter: F,
        selector: S,
        tracked: bool,
        ct: &CancellationToken,
    ) -> Result<Option<R>, StoreError>
    where
        F: Fn(&T) -> bool + Send + Sync,
        S: Fn(&T) -> R + Send + Sync,
        R: Send,
    {
        Ok(self
            .get_single(filter, tracked, ct)
            .await?
            .map(|row| selector(&row)))
    }

    async fn find_by_id(&self, id: Uuid, ct: &CancellationToken) -> Result<Option<T>, StoreError> {
        self.guard(ct)?;
        self.session
            .db
            .read::<T, _>(|table| table.rows.get(&id).cloned())
    }

    async fn add(&self, entity: T, ct: &CancellationToken) -> Result<(), StoreError> {
        self.guard(ct)?;
        self.stage_upsert(entity)
    }

    async fn add_range(&self, entities: Vec<T>, ct: &CancellationToken) -> Result<(), StoreError> {
        self.guard(ct)?;
        for entity in entities {
            self.stage_upsert(entity)?;
        }
        Ok(())
    }

    async fn update(&self, entity: T, ct: &CancellationToken) -> Result<(), StoreError> {
        self.guard(ct)?;
        self.stage_upsert(entity)
    }

    async fn update_range(&self, entities: Vec<T>, ct: &CancellationToken) -> Result<(), StoreError> {
        self.guard(ct)?;
        for entity in entities {
            self.stage_upsert(entity)?;
        }
        Ok(())
    }

    async fn remove(&self, entity: T, ct: &CancellationToken) -> Result<(), StoreError> {
        self.guard(ct)?;
        self.stage_remove(entity)
    }

    async fn remove_range(&self, entities: Vec<T>, ct: &CancellationToken) -> Result<(), StoreError> {
        self.guard(ct)?;
        for entity in entities {
            self.stage_remove(entity)?;
        }
        Ok(())
    }

    async fn count<F>(&self, filter: F, ct: &CancellationToken) -> Result<usize, StoreError>
    where
        F: Fn(&T) -> bool + Send + Sync,
    {
        self.guard(ct)?;
        self.session
            .db
            .read::<T, _>(|table| table.rows.values().filter(|r| filter(r)).count())
    }

    async fn any<F>(&self, filter: F, ct: &CancellationToken) -> Result<bool, StoreError>
    where
        F: Fn(&T) -> bool + Send + Sync,
    {
        self.guard(ct)?;
        self.session
            .db
            .read::<T, _>(|table| table.rows.values().any(|r| filter(r)))
    }

    async fn all<F>(&self, filter: F, ct: &CancellationToken) -> Result<bool, StoreError>
    where
        F: Fn(&T) -> bool + Send + Sync,
    {
        self.guard(ct)?;
        self.session
            .db
            .read::<T, _>(|table| table.rows.values().all(|r| filter(r)))
    }
}
