//! Runs the store against a throwaway MongoDB replica set (transactions need one).
//! Requires Docker: `cargo test -- --ignored`.

use std::time::Duration;

use bson::doc;
use mongodb::Client;
use rstest::*;
use testcontainers_modules::{
    mongo::Mongo,
    testcontainers::{ContainerAsync, runners::AsyncRunner},
};
use todo_store::{MongoTodoStore, StoreConfig, StoreError, Todo, TodoId, TodoRepository, telemetry};

struct MongoNode {
    _container: ContainerAsync<Mongo>,
    store: MongoTodoStore,
}

#[fixture]
async fn mongo() -> MongoNode {
    let _ = telemetry::init();
    let container = Mongo::repl_set().start().await.expect("failed to start mongo container");
    let host = container.get_host().await.expect("container host");
    let port = container.get_host_port_ipv4(27017).await.expect("container port");
    let config = StoreConfig {
        uri: format!("mongodb://{host}:{port}/?directConnection=true"),
        operation_timeout: Duration::from_secs(10),
        ..StoreConfig::default()
    };
    let store = MongoTodoStore::connect(&config).await.expect("connect");
    wait_for_primary(store.client()).await;
    store.ping().await.expect("ping");
    MongoNode { _container: container, store }
}

// The replica set needs a moment after rs.initiate() before it accepts writes.
async fn wait_for_primary(client: &Client) {
    let mut delay = Duration::from_millis(100);
    for _ in 0..12 {
        if let Ok(reply) = client.database("admin").run_command(doc! { "hello": 1 }).await {
            if reply.get_bool("isWritablePrimary").unwrap_or(false) {
                return;
            }
        }
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(Duration::from_secs(2));
    }
    panic!("mongo replica set never elected a primary");
}

fn id_of(todo: &Todo) -> String { todo.id.expect("saved todo has an id").to_string() }

#[rstest]
#[tokio::test]
#[ignore = "needs a Docker daemon"]
async fn add_then_get_round_trips(#[future] mongo: MongoNode) -> anyhow::Result<()> {
    let node = mongo.await;
    let store = &node.store;
    let added = store.add(Todo::new("test")).await?;
    assert!(added.id.is_some());

    let got = store.get(&id_of(&added)).await?;
    assert_eq!(got, added);
    assert_eq!(got.text, "test");
    assert!(!got.is_done);
    Ok(())
}

#[rstest]
#[tokio::test]
#[ignore = "needs a Docker daemon"]
async fn get_distinguishes_bad_and_missing_ids(#[future] mongo: MongoNode) {
    let node = mongo.await;
    let store = &node.store;
    assert!(matches!(store.get("not-hex").await, Err(StoreError::InvalidId(_))));
    let unknown = TodoId::default().to_string();
    assert!(matches!(store.get(&unknown).await, Err(StoreError::NotFound(_))));
}

#[rstest]
#[tokio::test]
#[ignore = "needs a Docker daemon"]
async fn list_returns_every_added_todo(#[future] mongo: MongoNode) -> anyhow::Result<()> {
    let node = mongo.await;
    let store = &node.store;
    assert!(store.list().await?.is_empty());

    let mut added = Vec::new();
    for text in ["one", "two", "three"] {
        added.push(store.add(Todo::new(text)).await?);
    }
    let listed = store.list().await?;
    assert!(listed.len() >= added.len());
    for todo in &added {
        assert!(listed.contains(todo), "{todo:?} missing from list");
    }
    Ok(())
}

#[rstest]
#[tokio::test]
#[ignore = "needs a Docker daemon"]
async fn delete_removes_the_todo(#[future] mongo: MongoNode) -> anyhow::Result<()> {
    let node = mongo.await;
    let store = &node.store;
    let added = store.add(Todo::new("Test Delete Todo")).await?;
    let id = id_of(&added);

    store.delete(&id).await?;
    assert!(matches!(store.get(&id).await, Err(StoreError::NotFound(_))));
    assert!(matches!(store.delete(&id).await, Err(StoreError::NotFound(_))));
    assert!(matches!(store.delete("xyz").await, Err(StoreError::InvalidId(_))));
    Ok(())
}

#[rstest]
#[tokio::test]
#[ignore = "needs a Docker daemon"]
async fn update_touches_only_text(#[future] mongo: MongoNode) -> anyhow::Result<()> {
    let node = mongo.await;
    let store = &node.store;
    let added = store.add(Todo::new("before")).await?;

    let edited = Todo { text: "do the dishes".into(), is_done: true, ..added.clone() };
    let updated = store.update(&edited).await?;
    assert_eq!(updated.text, "do the dishes");

    let fetched = store.get(&id_of(&added)).await?;
    assert_eq!(fetched, updated);
    assert!(!fetched.is_done);
    assert_eq!(fetched.created_at, added.created_at);
    assert!(fetched.updated_at >= added.updated_at);

    let ghost = Todo { id: Some(TodoId::default()), ..Todo::new("ghost") };
    assert!(matches!(store.update(&ghost).await, Err(StoreError::NotFound(_))));
    assert!(matches!(store.update(&Todo::new("unsaved")).await, Err(StoreError::InvalidId(_))));
    Ok(())
}

#[rstest]
#[tokio::test]
#[ignore = "needs a Docker daemon"]
async fn toggle_flips_is_done(#[future] mongo: MongoNode) -> anyhow::Result<()> {
    let node = mongo.await;
    let store = &node.store;
    let added = store.add(Todo::new("X")).await?;
    let id = id_of(&added);

    assert!(store.toggle(&id).await?.is_done);
    assert!(store.get(&id).await?.is_done);
    assert!(!store.toggle(&id).await?.is_done);
    assert!(!store.get(&id).await?.is_done);
    assert!(matches!(store.toggle(&TodoId::default().to_string()).await, Err(StoreError::NotFound(_))));
    Ok(())
}

#[rstest]
#[tokio::test]
#[ignore = "needs a Docker daemon"]
async fn concurrent_toggles_keep_every_flip(#[future] mongo: MongoNode) -> anyhow::Result<()> {
    let node = mongo.await;
    let store = &node.store;
    let id = id_of(&store.add(Todo::new("race")).await?);
    let id = id.as_str();

    let flips = (0..20).map(|_| store.toggle(id));
    futures::future::try_join_all(flips).await?;
    assert!(!store.get(id).await?.is_done);

    store.toggle(id).await?;
    assert!(store.get(id).await?.is_done);
    Ok(())
}

#[rstest]
#[tokio::test]
#[ignore = "needs a Docker daemon"]
async fn transaction_abort_keeps_and_commit_applies(#[future] mongo: MongoNode) -> anyhow::Result<()> {
    let node = mongo.await;
    let store = &node.store;
    let added = store.add(Todo::new("Test Delete Todo")).await?;
    let id = id_of(&added);

    // delete inside a transaction, then abort
    let mut session = store.client().start_session().await?;
    session.start_transaction().await?;
    store.with_session(&mut session).delete(&id).await?;
    session.abort_transaction().await?;
    assert_eq!(store.get(&id).await?, added);

    // update inside a transaction, then commit
    let mut session = store.client().start_session().await?;
    session.start_transaction().await?;
    {
        let mut tx = store.with_session(&mut session);
        let edited = Todo { text: "do the dishes".into(), ..added.clone() };
        tx.update(&edited).await?;
        assert_eq!(tx.get(&id).await?.text, "do the dishes");
        assert!(tx.list().await?.iter().any(|t| t.text == "do the dishes"));
    }
    assert_eq!(store.get(&id).await?.text, "Test Delete Todo");
    session.commit_transaction().await?;
    assert_eq!(store.get(&id).await?.text, "do the dishes");
    Ok(())
}
