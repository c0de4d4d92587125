use async_trait::async_trait;

use super::error::StoreResult;
use super::todo::Todo;

/// Persistence contract for todos. Ids are taken as strings and rejected
/// with `StoreError::InvalidId` when they don't parse.
#[async_trait]
pub trait TodoRepository: Send + Sync + 'static {
    /// Persists `todo` under a freshly generated id and returns it with the id set.
    async fn add(&self, todo: Todo) -> StoreResult<Todo>;
    async fn get(&self, id: &str) -> StoreResult<Todo>;
    async fn list(&self) -> StoreResult<Vec<Todo>>;
    /// Overwrites the stored text of `todo.id`; other fields are left as stored.
    async fn update(&self, todo: &Todo) -> StoreResult<Todo>;
    async fn delete(&self, id: &str) -> StoreResult<()>;
    /// Flips `is_done` in a single atomic step.
    async fn toggle(&self, id: &str) -> StoreResult<Todo>;
}
