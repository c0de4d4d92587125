use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::{Client, ClientSession, Collection, Database, options::{ClientOptions, ReturnDocument}};
use tracing::{debug, info, instrument, warn};

use crate::config::{DEFAULT_OPERATION_TIMEOUT, StoreConfig};
use crate::domain::{
    error::{StoreError, StoreResult},
    repository::TodoRepository,
    todo::{self, Todo, TodoId},
};

/// MongoDB-backed todo store. Cloning is cheap: clones share the client's connection pool.
#[derive(Clone)]
pub struct MongoTodoStore {
    client: Client,
    database: Database,
    collection: Collection<Todo>,
    timeout: Duration,
}

impl MongoTodoStore {
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let mut options = ClientOptions::parse(&config.uri).await?;
        options.app_name = Some(config.app_name.clone());
        options.connect_timeout = Some(config.operation_timeout);
        options.server_selection_timeout = Some(config.operation_timeout);
        let client = Client::with_options(options)?;
        info!(database = %config.database, collection = %config.collection, "mongodb client ready");
        Ok(Self::new(client, &config.database, &config.collection).with_timeout(config.operation_timeout))
    }

    pub fn new(client: Client, database: &str, collection: &str) -> Self {
        let database = client.database(database);
        let collection = database.collection::<Todo>(collection);
        Self { client, database, collection, timeout: DEFAULT_OPERATION_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn client(&self) -> &Client { &self.client }

    pub async fn ping(&self) -> StoreResult<()> {
        within(self.timeout, async {
            self.database.run_command(doc! { "ping": 1 }).await?;
            Ok::<_, StoreError>(())
        })
        .await
    }

    /// Binds the store to `session`, so its operations join whatever
    /// transaction the caller has started there.
    pub fn with_session<'a>(&'a self, session: &'a mut ClientSession) -> SessionTodoStore<'a> {
        SessionTodoStore { collection: &self.collection, session, timeout: self.timeout }
    }
}

#[async_trait]
impl TodoRepository for MongoTodoStore {
    #[instrument(level = "debug", skip_all, fields(collection = %self.collection.name()))]
    async fn add(&self, todo: Todo) -> StoreResult<Todo> {
        traced("add", within(self.timeout, insert(&self.collection, None, todo))).await
    }

    #[instrument(level = "debug", skip(self), fields(collection = %self.collection.name()))]
    async fn get(&self, id: &str) -> StoreResult<Todo> {
        let id: TodoId = id.parse()?;
        traced("get", within(self.timeout, find(&self.collection, None, id))).await
    }

    #[instrument(level = "debug", skip_all, fields(collection = %self.collection.name()))]
    async fn list(&self) -> StoreResult<Vec<Todo>> {
        traced("list", within(self.timeout, find_all(&self.collection, None))).await
    }

    #[instrument(level = "debug", skip_all, fields(collection = %self.collection.name(), id = ?todo.id))]
    async fn update(&self, todo: &Todo) -> StoreResult<Todo> {
        let id = saved_id(todo)?;
        traced("update", within(self.timeout, set_text(&self.collection, None, id, &todo.text))).await
    }

    #[instrument(level = "debug", skip(self), fields(collection = %self.collection.name()))]
    async fn delete(&self, id: &str) -> StoreResult<()> {
        let id: TodoId = id.parse()?;
        traced("delete", within(self.timeout, remove(&self.collection, None, id))).await
    }

    #[instrument(level = "debug", skip(self), fields(collection = %self.collection.name()))]
    async fn toggle(&self, id: &str) -> StoreResult<Todo> {
        let id: TodoId = id.parse()?;
        traced("toggle", within(self.timeout, flip_done(&self.collection, None, id))).await
    }
}

/// The store's operations run inside a client session. Commit and abort
/// stay with the owner of the session.
pub struct SessionTodoStore<'a> {
    collection: &'a Collection<Todo>,
    session: &'a mut ClientSession,
    timeout: Duration,
}

impl SessionTodoStore<'_> {
    pub async fn add(&mut self, todo: Todo) -> StoreResult<Todo> {
        traced("add", within(self.timeout, insert(self.collection, Some(&mut *self.session), todo))).await
    }

    pub async fn get(&mut self, id: &str) -> StoreResult<Todo> {
        let id: TodoId = id.parse()?;
        traced("get", within(self.timeout, find(self.collection, Some(&mut *self.session), id))).await
    }

    pub async fn list(&mut self) -> StoreResult<Vec<Todo>> {
        traced("list", within(self.timeout, find_all(self.collection, Some(&mut *self.session)))).await
    }

    pub async fn update(&mut self, todo: &Todo) -> StoreResult<Todo> {
        let id = saved_id(todo)?;
        traced("update", within(self.timeout, set_text(self.collection, Some(&mut *self.session), id, &todo.text))).await
    }

    pub async fn delete(&mut self, id: &str) -> StoreResult<()> {
        let id: TodoId = id.parse()?;
        traced("delete", within(self.timeout, remove(self.collection, Some(&mut *self.session), id))).await
    }

    pub async fn toggle(&mut self, id: &str) -> StoreResult<Todo> {
        let id: TodoId = id.parse()?;
        traced("toggle", within(self.timeout, flip_done(self.collection, Some(&mut *self.session), id))).await
    }
}

async fn within<T>(limit: Duration, op: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
    tokio::time::timeout(limit, op).await.map_err(|_| StoreError::Timeout(limit))?
}

async fn traced<T>(op: &'static str, fut: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
    let result = fut.await;
    match &result {
        Ok(_) => debug!(op, "ok"),
        Err(e) if e.is_storage() => warn!(op, error = %e, "store operation failed"),
        Err(e) => debug!(op, error = %e, "store operation rejected"),
    }
    result
}

fn saved_id(todo: &Todo) -> StoreResult<TodoId> {
    todo.id.ok_or_else(|| StoreError::InvalidId("<unsaved>".to_string()))
}

fn by_id(id: TodoId) -> Document { doc! { "_id": id.0 } }

async fn insert(coll: &Collection<Todo>, session: Option<&mut ClientSession>, todo: Todo) -> StoreResult<Todo> {
    let mut todo = Todo { id: None, ..todo }.normalized();
    let action = coll.insert_one(&todo);
    let result = match session {
        Some(s) => action.session(s).await?,
        None => action.await?,
    };
    todo.id = Some(inserted_id(result.inserted_id)?);
    Ok(todo)
}

fn inserted_id(key: Bson) -> StoreResult<TodoId> {
    match key {
        Bson::ObjectId(oid) => Ok(TodoId(oid)),
        other => Err(StoreError::UnexpectedKey(other.to_string())),
    }
}

async fn find(coll: &Collection<Todo>, session: Option<&mut ClientSession>, id: TodoId) -> StoreResult<Todo> {
    let action = coll.find_one(by_id(id));
    let found = match session {
        Some(s) => action.session(s).await?,
        None => action.await?,
    };
    found.ok_or_else(|| StoreError::NotFound(id.to_string()))
}

async fn find_all(coll: &Collection<Todo>, session: Option<&mut ClientSession>) -> StoreResult<Vec<Todo>> {
    let todos: Vec<Todo> = match session {
        Some(s) => {
            let mut cursor = coll.find(doc! {}).session(&mut *s).await?;
            cursor.stream(s).try_collect().await?
        }
        None => coll.find(doc! {}).await?.try_collect().await?,
    };
    Ok(todos)
}

async fn set_text(coll: &Collection<Todo>, session: Option<&mut ClientSession>, id: TodoId, text: &str) -> StoreResult<Todo> {
    let changes = doc! { "$set": { "text": text, "updatedAt": bson::DateTime::from_chrono(todo::now()) } };
    let action = coll.find_one_and_update(by_id(id), changes).return_document(ReturnDocument::After);
    let updated = match session {
        Some(s) => action.session(s).await?,
        None => action.await?,
    };
    updated.ok_or_else(|| StoreError::NotFound(id.to_string()))
}

async fn remove(coll: &Collection<Todo>, session: Option<&mut ClientSession>, id: TodoId) -> StoreResult<()> {
    let action = coll.delete_one(by_id(id));
    let result = match session {
        Some(s) => action.session(s).await?,
        None => action.await?,
    };
    if result.deleted_count == 0 {
        return Err(StoreError::NotFound(id.to_string()));
    }
    Ok(())
}

// Pipeline update: the server negates the stored flag, so concurrent toggles can't lose a flip.
async fn flip_done(coll: &Collection<Todo>, session: Option<&mut ClientSession>, id: TodoId) -> StoreResult<Todo> {
    let pipeline = vec![doc! {
        "$set": {
            "isDone": { "$not": ["$isDone"] },
            "updatedAt": bson::DateTime::from_chrono(todo::now()),
        }
    }];
    let action = coll.find_one_and_update(by_id(id), pipeline).return_document(ReturnDocument::After);
    let toggled = match session {
        Some(s) => action.session(s).await?,
        None => action.await?,
    };
    toggled.ok_or_else(|| StoreError::NotFound(id.to_string()))
}
