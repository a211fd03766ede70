//! Integration tests against a real cluster.
//!
//! These tests require a live cluster on localhost and are ignored by
//! default.
//!
//! Setup with Docker:
//! ```bash
//! docker run -d --name redis-cluster \
//!   -p 7000-7005:7000-7005 \
//!   grokzen/redis-cluster:latest
//! ```
//!
//! Run with:
//! ```bash
//! cargo test --test cluster_integration -- --ignored
//! ```

use bytes::Bytes;
use slotwise::{ClusterClient, Command, Result};

fn create_test_client() -> Result<ClusterClient> {
    ClusterClient::builder()
        .nodes(["127.0.0.1:7000", "127.0.0.1:7001", "127.0.0.1:7002"])
        .build()
}

#[tokio::test]
#[ignore]
async fn test_cluster_basic_operations() {
    let client = create_test_client().expect("failed to build client");

    let key = "integration:test:basic";
    let value = Bytes::from("Hello, Cluster!");

    client.set(key, value.clone()).await.expect("SET failed");

    let retrieved = client.get(key).await.expect("GET failed");
    assert_eq!(retrieved, Some(value), "retrieved value should match");

    let exists = client.exists(key).await.expect("EXISTS failed");
    assert!(exists, "key should exist");

    let deleted = client.del(key).await.expect("DEL failed");
    assert_eq!(deleted, 1, "should delete 1 key");

    let exists_after = client.exists(key).await.expect("EXISTS failed");
    assert!(!exists_after, "key should not exist after deletion");
}

#[tokio::test]
#[ignore]
async fn test_cluster_hash_tag_pipeline() {
    let client = create_test_client().expect("failed to build client");

    // Keys sharing a hash tag land on one slot, so they are pipelinable.
    let replies = client
        .pipelined(|pipe| {
            pipe.set("user:{12345}:name", "ada");
            pipe.set("user:{12345}:lang", "rust");
            pipe.get("user:{12345}:name");
        })
        .await
        .expect("pipelined failed");
    assert_eq!(replies.len(), 3);

    for key in ["user:{12345}:name", "user:{12345}:lang"] {
        client.del(key).await.expect("DEL failed");
    }
}

#[tokio::test]
#[ignore]
async fn test_cluster_multi_transaction() {
    let client = create_test_client().expect("failed to build client");

    let replies = client
        .multi(|pipe| {
            pipe.set("{tx}:a", "1");
            pipe.set("{tx}:b", "2");
        })
        .await
        .expect("multi failed");
    // MULTI + 2 queued + EXEC.
    assert_eq!(replies.len(), 4);

    for key in ["{tx}:a", "{tx}:b"] {
        client.del(key).await.expect("DEL failed");
    }
}

#[tokio::test]
#[ignore]
async fn test_cluster_each_node_fanout() {
    let client = create_test_client().expect("failed to build client");

    let names = client
        .each_node(|name, _conn| async move { Ok(name) })
        .await
        .expect("each_node failed");
    assert!(names.len() >= 3, "expected at least 3 nodes, got {}", names.len());

    let info = client.info().await.expect("info failed");
    assert_eq!(info.len(), names.len());
}

#[tokio::test]
#[ignore]
async fn test_cluster_keys_across_nodes() {
    let client = create_test_client().expect("failed to build client");

    // These keys very likely land on different slots.
    for i in 0..5 {
        let key = format!("scatter:test:{}", i);
        client.set(&key, format!("value_{}", i)).await.expect("SET failed");
    }

    let found = client.keys("scatter:test:*").await.expect("KEYS failed");
    assert_eq!(found.len(), 5);

    for key in found {
        client.del(&key).await.expect("DEL failed");
    }
}

#[tokio::test]
#[ignore]
async fn test_cluster_generic_call() {
    let client = create_test_client().expect("failed to build client");

    let frame = client
        .call(Command::new("INCRBY").arg("counter:test").arg("5"))
        .await
        .expect("INCRBY failed");
    assert!(frame.as_int().is_some());

    client.del("counter:test").await.expect("DEL failed");
}

#[tokio::test]
#[ignore]
async fn test_cluster_concurrent_operations() {
    let client = create_test_client().expect("failed to build client");

    let mut handles = Vec::new();
    for i in 0..10 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let key = format!("concurrent:test:{}", i);
            let value = Bytes::from(format!("value_{}", i));

            client.set(&key, value.clone()).await?;
            let retrieved = client.get(&key).await?;
            assert_eq!(retrieved, Some(value));
            client.del(&key).await?;

            Ok::<_, slotwise::Error>(())
        }));
    }
    for handle in handles {
        handle.await.expect("task panicked").expect("operation failed");
    }
}

#[tokio::test]
#[ignore]
async fn test_cluster_reconnect() {
    let client = create_test_client().expect("failed to build client");

    client.set("reconnect:test", "v").await.expect("SET failed");
    client.reconnect().await;
    let value = client.get("reconnect:test").await.expect("GET failed");
    assert_eq!(value, Some(Bytes::from("v")));
    client.del("reconnect:test").await.expect("DEL failed");
}
