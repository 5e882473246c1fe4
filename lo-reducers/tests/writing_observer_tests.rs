//! End-to-end tests for the writing-analysis reducers
//!
//! Events go in through pipeline instances exactly as the server feeds them;
//! assertions read the published (external) state back from the store.

use lo_common::config::WritingObserverSettings;
use lo_common::events::Event;
use lo_common::kvs::{Kvs, MemoryKvs, SqliteKvs};
use lo_common::{AdditionalMetadata, SessionMetadata};
use lo_reducers::doc_id::additional_metadata_for;
use lo_reducers::reducers::{BinnedTimeOnTask, DocumentList, Reconstruct, TimeOnTask};
use lo_reducers::{replay_file, KeyDict, KeyField, KvsPipeline, ReducerRegistry, Scope, StateUpdate};
use serde_json::json;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use tempfile::{NamedTempFile, TempDir};

fn student_doc(student: &str, doc_id: &str) -> KeyDict {
    let mut dict = KeyDict::new();
    dict.insert(KeyField::Student, student);
    dict.insert(KeyField::event("doc_id"), doc_id);
    dict
}

fn keystroke(doc_id: &str, time: f64) -> Event {
    serde_json::from_value(json!({
        "server": {"time": time},
        "client": {"event": "keystroke", "doc_id": doc_id}
    }))
    .unwrap()
}

#[tokio::test]
async fn test_reconstruct_document_history() {
    let kvs = Arc::new(MemoryKvs::new());
    let pipeline = KvsPipeline::new(Reconstruct::new(), Some(Scope::student_document()));
    let instance = pipeline.instance(kvs.clone(), &SessionMetadata::for_student("s1"));

    let history: Event = serde_json::from_value(json!({
        "server": {"time": 1.0},
        "client": {
            "event": "document_history",
            "doc_id": "d1",
            "history": {"changelog": [["insert", "A", 0], ["insert", "B", 1]]}
        }
    }))
    .unwrap();

    let out = instance
        .process_event(&history, &additional_metadata_for(&history))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(out.into_updated().unwrap().text, "AB");

    let stored = pipeline
        .read_external(kvs.as_ref(), &student_doc("s1", "d1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.text, "AB");
}

#[tokio::test]
async fn test_time_on_task_clamps_long_gap() {
    let kvs = Arc::new(MemoryKvs::new());
    let pipeline = KvsPipeline::new(TimeOnTask::new(60), Some(Scope::student_document()));
    let instance = pipeline.instance(kvs.clone(), &SessionMetadata::for_student("s1"));

    let mut last = None;
    for t in [0.0, 30.0, 500.0] {
        let event = keystroke("d1", t);
        last = instance
            .process_event(&event, &additional_metadata_for(&event))
            .await
            .unwrap();
    }
    let state = last.and_then(StateUpdate::into_updated).unwrap();
    assert_eq!(state.total_time, 90.0);
}

#[tokio::test]
async fn test_binned_time_on_task_split() {
    let kvs = Arc::new(MemoryKvs::new());
    let pipeline = KvsPipeline::new(BinnedTimeOnTask::new(60, 600), Some(Scope::student_document()));
    let instance = pipeline.instance(kvs.clone(), &SessionMetadata::for_student("s1"));

    for t in [590.0, 620.0] {
        let event = keystroke("d1", t);
        instance
            .process_event(&event, &additional_metadata_for(&event))
            .await
            .unwrap();
    }
    let state = pipeline
        .read_external(kvs.as_ref(), &student_doc("s1", "d1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.buckets, BTreeMap::from([(0, 10.0), (600, 20.0)]));
}

#[tokio::test]
async fn test_document_list_is_idempotent() {
    let kvs = Arc::new(MemoryKvs::new());
    let pipeline = KvsPipeline::new(DocumentList::new(), Some(Scope::student()));
    let instance = pipeline.instance(kvs.clone(), &SessionMetadata::for_student("s1"));

    let opened = |time: f64| -> Event {
        serde_json::from_value(json!({
            "server": {"time": time},
            "client": {
                "event": "visibility",
                "object": {
                    "url": "https://docs.google.com/document/d/doc-1/edit",
                    "id": "doc-1",
                    "title": "My essay"
                }
            }
        }))
        .unwrap()
    };

    instance.process_event(&opened(10.0), &AdditionalMetadata::new()).await.unwrap();
    instance.process_event(&opened(25.0), &AdditionalMetadata::new()).await.unwrap();

    let mut dict = KeyDict::new();
    dict.insert(KeyField::Student, "s1");
    let state = pipeline.read_external(kvs.as_ref(), &dict).await.unwrap().unwrap();
    assert_eq!(state.docs.len(), 1);
    assert_eq!(state.docs["doc-1"].title.as_deref(), Some("My essay"));
    assert_eq!(state.docs["doc-1"].last_access, Some(25.0));
}

#[tokio::test]
async fn test_replay_into_sqlite_store() {
    let dir = TempDir::new().unwrap();
    let kvs: Arc<dyn Kvs> = Arc::new(SqliteKvs::open(&dir.path().join("state.db")).await.unwrap());

    let mut log = NamedTempFile::new().unwrap();
    for (time, doc) in [(0.0, "d1"), (30.0, "d1"), (500.0, "d1"), (40.0, "d2")] {
        let line = json!({
            "server": {"time": time},
            "client": {"event": "keystroke", "doc_id": doc},
            "auth": {"safe_user_id": "s1"}
        });
        writeln!(log, "{}", line).unwrap();
    }
    log.flush().unwrap();

    let registry = ReducerRegistry::writing_observer(&WritingObserverSettings::default());
    let summary = replay_file(&registry, kvs.clone(), log.path()).await.unwrap();
    assert_eq!(summary.events, 4);
    assert_eq!(summary.students, 1);

    let time_on_task = registry.get("time_on_task").unwrap();
    let d1 = time_on_task
        .read_external_json(kvs.as_ref(), &student_doc("s1", "d1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(d1["total_time"], json!(90.0));

    let mut student = KeyDict::new();
    student.insert(KeyField::Student, "s1");
    let last = registry
        .get("last_document")
        .unwrap()
        .read_external_json(kvs.as_ref(), &student)
        .await
        .unwrap();
    assert_eq!(last, Some(json!({"document_id": "d2"})));
}
