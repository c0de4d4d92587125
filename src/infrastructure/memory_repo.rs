use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::{
    error::{StoreError, StoreResult},
    repository::TodoRepository,
    todo::{self, Todo, TodoId},
};

/// Process-local store with the same contract as the MongoDB one, for tests of code that embeds a store.
#[derive(Clone, Default)]
pub struct InMemoryTodoStore {
    items: Arc<Mutex<BTreeMap<TodoId, Todo>>>,
}

impl InMemoryTodoStore {
    pub fn new() -> Self { Self::default() }

    fn items(&self) -> MutexGuard<'_, BTreeMap<TodoId, Todo>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TodoRepository for InMemoryTodoStore {
    async fn add(&self, todo: Todo) -> StoreResult<Todo> {
        let id = TodoId::default();
        let todo = Todo { id: Some(id), ..todo }.normalized();
        self.items().insert(id, todo.clone());
        Ok(todo)
    }

    async fn get(&self, id: &str) -> StoreResult<Todo> {
        let id: TodoId = id.parse()?;
        self.items().get(&id).cloned().ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list(&self) -> StoreResult<Vec<Todo>> { Ok(self.items().values().cloned().collect()) }

    async fn update(&self, todo: &Todo) -> StoreResult<Todo> {
        let id = todo.id.ok_or_else(|| StoreError::InvalidId("<unsaved>".to_string()))?;
        let mut items = self.items();
        let stored = items.get_mut(&id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        stored.text = todo.text.clone();
        stored.updated_at = todo::now();
        Ok(stored.clone())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let id: TodoId = id.parse()?;
        match self.items().remove(&id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn toggle(&self, id: &str) -> StoreResult<Todo> {
        let id: TodoId = id.parse()?;
        let mut items = self.items();
        let stored = items.get_mut(&id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        stored.is_done = !stored.is_done;
        stored.updated_at = todo::now();
        Ok(stored.clone())
    }
}
