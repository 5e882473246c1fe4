//! Integration tests for the SQLite-backed key-value store

use lo_common::kvs::{Kvs, SqliteKvs};
use lo_common::Error;
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;

#[tokio::test]
async fn test_creates_database_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("kvs.db");

    let _kvs = SqliteKvs::open(&path).await.unwrap();
    assert!(path.exists(), "store file was not created");
}

#[tokio::test]
async fn test_set_get_and_overwrite() {
    let dir = TempDir::new().unwrap();
    let kvs = SqliteKvs::open(&dir.path().join("kvs.db")).await.unwrap();

    assert_eq!(kvs.get("missing").await.unwrap(), None);

    kvs.set("Internal,x,STUDENT:s1", json!({"count": 1})).await.unwrap();
    kvs.set("Internal,x,STUDENT:s1", json!({"count": 2})).await.unwrap();
    assert_eq!(
        kvs.get("Internal,x,STUDENT:s1").await.unwrap(),
        Some(json!({"count": 2}))
    );
}

#[tokio::test]
async fn test_null_value_is_distinct_from_missing() {
    let dir = TempDir::new().unwrap();
    let kvs = SqliteKvs::open(&dir.path().join("kvs.db")).await.unwrap();

    kvs.set("k", json!(null)).await.unwrap();
    assert_eq!(kvs.get("k").await.unwrap(), Some(json!(null)));
}

#[tokio::test]
async fn test_values_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("kvs.db");

    {
        let kvs = SqliteKvs::open(&path).await.unwrap();
        kvs.set("b", json!([1, 2])).await.unwrap();
        kvs.set("a", json!("text")).await.unwrap();
    }

    let kvs = SqliteKvs::open(&path).await.unwrap();
    assert_eq!(kvs.keys().await.unwrap(), vec!["a".to_string(), "b".to_string()]);
    assert_eq!(kvs.get("b").await.unwrap(), Some(json!([1, 2])));
}

#[tokio::test]
async fn test_closed_pool_reports_unavailable() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let kvs = SqliteKvs::from_pool(pool.clone()).await.unwrap();
    pool.close().await;

    let result = kvs.get("k").await;
    assert!(matches!(result, Err(Error::Unavailable(_))), "got {:?}", result);
}
