//! Persistence for todo items kept in a MongoDB collection.
//!
//! [`MongoTodoStore`] is the production store; [`InMemoryTodoStore`] honours the
//! same [`TodoRepository`] contract without a database.

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod telemetry;

pub use config::{ConfigError, StoreConfig};
pub use domain::{
    error::{StoreError, StoreResult},
    repository::TodoRepository,
    todo::{Todo, TodoId},
};
pub use infrastructure::{
    memory_repo::InMemoryTodoStore,
    mongo_repo::{MongoTodoStore, SessionTodoStore},
};
