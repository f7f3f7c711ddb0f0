// Generic entity-store contract: filtered reads, staged mutations

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::errors::StoreError;

/// A record kind the persistence layer can manage.
pub trait Entity: Clone + Send + Sync + 'static {
    fn id(&self) -> Uuid;

    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Generic data-access capability for one entity kind.
///
/// Reads return detached snapshots by default (`tracked = false`); passing
/// `tracked = true` marks the read as attached-for-mutation. Mutations only
/// stage work against the owning unit of work; nothing persists until it
/// saves. Every operation honors its cancellation token before doing I/O
/// and leaves no partial staged state when cancelled.
#[async_trait]
pub trait EntityStore<T: Entity>: Send + Sync {
    async fn get_all(&self, tracked: bool, ct: &CancellationToken) -> Result<Vec<T>, StoreError>;

    async fn get<F>(
        &self,
        filter: F,
        tracked: bool,
        ct: &CancellationToken,
    ) -> Result<Vec<T>, StoreError>
    where
        F: Fn(&T) -> bool + Send + Sync;

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
        R: Send;

    /// Paginated projection; the unpaginated overload is the zero-skip,
    /// unbounded-take special case.
    async fn get_page<F, S, R>(
        &self,
        filter: F,
        selector: S,
        skip: usize,
        take: usize,
        tracked: bool,
        ct: &CancellationToken,
    ) -> Result<Vec<R>, StoreError>
    where
        F: Fn(&T) -> bool + Send + Sync,
        S: Fn(&T) -> R + Send + Sync,
        R: Send;

    /// Fails with `MultipleMatches` when the filter matches more than one
    /// record; zero matches is `Ok(None)`.
    async fn get_single<F>(
        &self,
        filter: F,
        tracked: bool,
        ct: &CancellationToken,
    ) -> Result<Option<T>, StoreError>
    where
        F: Fn(&T) -> bool + Send + Sync;

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
        R: Send;

    async fn find_by_id(&self, id: Uuid, ct: &CancellationToken) -> Result<Option<T>, StoreError>;

    async fn add(&self, entity: T, ct: &CancellationToken) -> Result<(), StoreError>;

    async fn add_range(&self, entities: Vec<T>, ct: &CancellationToken) -> Result<(), StoreError>;

    async fn update(&self, entity: T, ct: &CancellationToken) -> Result<(), StoreError>;

    async fn update_range(&self, entities: Vec<T>, ct: &CancellationToken) -> Result<(), StoreError>;

    async fn remove(&self, entity: T, ct: &CancellationToken) -> Result<(), StoreError>;

    async fn remove_range(&self, entities: Vec<T>, ct: &CancellationToken) -> Result<(), StoreError>;

    async fn count<F>(&self, filter: F, ct: &CancellationToken) -> Result<usize, StoreError>
    where
        F: Fn(&T) -> bool + Send + Sync;

    async fn any<F>(&self, filter: F, ct: &CancellationToken) -> Result<bool, StoreError>
    where
        F: Fn(&T) -> bool + Send + Sync;

    async fn all<F>(&self, filter: F, ct: &CancellationToken) -> Result<bool, StoreError>
    where
        F: Fn(&T) -> bool + Send + Sync;
}
