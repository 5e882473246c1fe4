//! Reducer registry
//!
//! Pipelines have different state types, so the registry holds them behind
//! two object-safe traits: [`PipelineFactory`] for the pipeline definition
//! (key computation, out-of-band reads) and [`EventProcessor`] for one
//! consumer's instance. Published state crosses this boundary as JSON.

use async_trait::async_trait;
use futures::future::join_all;
use lo_common::config::WritingObserverSettings;
use lo_common::events::Event;
use lo_common::kvs::{CachePerformance, Kvs};
use lo_common::{AdditionalMetadata, SessionMetadata};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::doc_id::additional_metadata_for;
use crate::fields::{KeyDict, KeyStateType, Scope};
use crate::pipeline::{KvsPipeline, PipelineInstance, ProcessedEvent, Reducer, StateUpdate};
use crate::reducers::{
    short_name, BinnedTimeOnTask, DocumentAccessTimestamps, DocumentList, DocumentTagging,
    EventCount, LastDocument, Placeholder, Reconstruct, TimeOnTask,
};
use crate::{Error, Result};

/// One consumer's pipeline instance, with its state types erased
#[async_trait]
pub trait EventProcessor: Send + Sync {
    fn reducer_name(&self) -> &'static str;

    async fn process(
        &self,
        event: &Event,
        additional: &AdditionalMetadata,
    ) -> Result<Option<ProcessedEvent<Value>>>;
}

#[async_trait]
impl<R: Reducer> EventProcessor for PipelineInstance<R> {
    fn reducer_name(&self) -> &'static str {
        self.pipeline().name()
    }

    async fn process(
        &self,
        event: &Event,
        additional: &AdditionalMetadata,
    ) -> Result<Option<ProcessedEvent<Value>>> {
        let Some(processed) = self.process_event_keyed(event, additional).await? else {
            return Ok(None);
        };
        let external = match processed.external {
            StateUpdate::Updated(state) => StateUpdate::Updated(serde_json::to_value(state)?),
            StateUpdate::Unchanged => StateUpdate::Unchanged,
        };
        Ok(Some(ProcessedEvent {
            external_key: processed.external_key,
            external,
        }))
    }
}

/// A pipeline definition, with its state types erased
#[async_trait]
pub trait PipelineFactory: Send + Sync {
    fn reducer_name(&self) -> &'static str;

    fn scope(&self) -> &Scope;

    fn performance(&self) -> &CachePerformance;

    /// Per-consumer setup
    fn instantiate(&self, kvs: Arc<dyn Kvs>, session: &SessionMetadata) -> Box<dyn EventProcessor>;

    fn key_for(&self, key_dict: &KeyDict, state_type: KeyStateType) -> String;

    /// Stored external state as JSON
    async fn read_external_json(&self, kvs: &dyn Kvs, key_dict: &KeyDict) -> Result<Option<Value>>;
}

#[async_trait]
impl<R: Reducer> PipelineFactory for KvsPipeline<R> {
    fn reducer_name(&self) -> &'static str {
        self.name()
    }

    fn scope(&self) -> &Scope {
        KvsPipeline::scope(self)
    }

    fn performance(&self) -> &CachePerformance {
        KvsPipeline::performance(self)
    }

    fn instantiate(&self, kvs: Arc<dyn Kvs>, session: &SessionMetadata) -> Box<dyn EventProcessor> {
        Box::new(self.instance(kvs, session))
    }

    fn key_for(&self, key_dict: &KeyDict, state_type: KeyStateType) -> String {
        KvsPipeline::key_for(self, key_dict, state_type)
    }

    async fn read_external_json(&self, kvs: &dyn Kvs, key_dict: &KeyDict) -> Result<Option<Value>> {
        Ok(self
            .read_external(kvs, key_dict)
            .await?
            .map(serde_json::to_value)
            .transpose()?)
    }
}

/// All pipelines known to a service
#[derive(Default, Clone)]
pub struct ReducerRegistry {
    pipelines: Vec<Arc<dyn PipelineFactory>>,
}

impl ReducerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The writing-analysis reducer library, configured from `settings`
    pub fn writing_observer(settings: &WritingObserverSettings) -> Self {
        let student = Scope::student();
        let gdoc = if settings.document_scoping {
            Scope::student_document()
        } else {
            student.clone()
        };

        let mut registry = Self::new();
        registry.register(KvsPipeline::new(TimeOnTask::from_settings(settings), Some(gdoc.clone())));
        registry.register(KvsPipeline::new(
            BinnedTimeOnTask::from_settings(settings),
            Some(gdoc.clone()),
        ));
        registry.register(KvsPipeline::new(Reconstruct::from_settings(settings), Some(gdoc.clone())));
        registry.register(KvsPipeline::new(EventCount::from_settings(settings), Some(gdoc.clone())));
        registry.register(KvsPipeline::new(Placeholder::nlp_components(), Some(gdoc.clone())));
        registry.register(KvsPipeline::new(Placeholder::languagetool_process(), Some(gdoc)));
        registry.register(KvsPipeline::new(
            DocumentAccessTimestamps::from_settings(settings),
            Some(student.clone()),
        ));
        registry.register(KvsPipeline::new(DocumentTagging::new(), Some(student.clone())));
        registry.register(KvsPipeline::new(DocumentList::new(), Some(student.clone())));
        registry.register(KvsPipeline::new(LastDocument::new(), Some(student)));

        info!(
            "Registered {} reducers (document scoping {})",
            registry.len(),
            if settings.document_scoping { "on" } else { "off" }
        );
        registry
    }

    /// Add a pipeline, replacing any with the same name
    pub fn register<R: Reducer>(&mut self, pipeline: KvsPipeline<R>) {
        let name = pipeline.name();
        if let Some(pos) = self.pipelines.iter().position(|p| p.reducer_name() == name) {
            warn!("Reducer {} registered twice, replacing", name);
            self.pipelines.remove(pos);
        }
        self.pipelines.push(Arc::new(pipeline));
    }

    /// Look up by fully-qualified or short name
    pub fn get(&self, name: &str) -> Result<Arc<dyn PipelineFactory>> {
        self.pipelines
            .iter()
            .find(|p| p.reducer_name() == name)
            .or_else(|| self.pipelines.iter().find(|p| short_name(p.reducer_name()) == name))
            .cloned()
            .ok_or_else(|| Error::UnknownReducer(name.to_string()))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.pipelines.iter().map(|p| p.reducer_name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn PipelineFactory>> {
        self.pipelines.iter()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// One instance of every pipeline for one consumer session
    pub fn instantiate_all(&self, kvs: Arc<dyn Kvs>, session: &SessionMetadata) -> PipelineSet {
        PipelineSet {
            student: session.student_id().to_string(),
            processors: self
                .pipelines
                .iter()
                .map(|p| p.instantiate(Arc::clone(&kvs), session))
                .collect(),
        }
    }
}

/// One published external state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReducerOutput {
    pub reducer: &'static str,
    pub key: String,
    pub state: Value,
}

/// A reducer that could not process an event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReducerFailure {
    pub reducer: &'static str,
    pub message: String,
}

/// What one event did across a session's pipelines
#[derive(Debug, Default, Serialize)]
pub struct SetOutcome {
    pub published: Vec<ReducerOutput>,
    pub failed: Vec<ReducerFailure>,
}

/// Every pipeline instance for one consumer session
pub struct PipelineSet {
    student: String,
    processors: Vec<Box<dyn EventProcessor>>,
}

impl PipelineSet {
    pub fn student(&self) -> &str {
        &self.student
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Run one event through every pipeline
    ///
    /// A reducer that fails on the event is reported in
    /// [`SetOutcome::failed`] and the others still publish; its stored state
    /// is left as it was. Store errors are returned, since every pipeline
    /// shares the store.
    pub async fn process(&self, event: &Event) -> Result<SetOutcome> {
        let additional = additional_metadata_for(event);
        let results = join_all(
            self.processors
                .iter()
                .map(|processor| processor.process(event, &additional)),
        )
        .await;

        let mut outcome = SetOutcome::default();
        for (processor, result) in self.processors.iter().zip(results) {
            match result {
                Ok(Some(ProcessedEvent {
                    external_key,
                    external: StateUpdate::Updated(state),
                })) => outcome.published.push(ReducerOutput {
                    reducer: processor.reducer_name(),
                    key: external_key,
                    state,
                }),
                Ok(_) => {}
                Err(Error::Store(e)) => return Err(Error::Store(e)),
                Err(e) => outcome.failed.push(ReducerFailure {
                    reducer: processor.reducer_name(),
                    message: e.to_string(),
                }),
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::KeyField;
    use lo_common::kvs::MemoryKvs;
    use serde_json::json;

    fn keystroke(doc: &str, time: f64) -> Event {
        serde_json::from_value(json!({
            "server": {"time": time},
            "client": {"event": "keystroke", "doc_id": doc}
        }))
        .unwrap()
    }

    fn save_past_end(doc: &str, time: f64) -> Event {
        serde_json::from_value(json!({
            "server": {"time": time},
            "client": {
                "event": "google_docs_save",
                "doc_id": doc,
                "bundles": [{"commands": [{"ty": "is", "ibi": 50, "s": "x"}]}]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_writing_observer_registers_library() {
        let registry = ReducerRegistry::writing_observer(&WritingObserverSettings::default());
        assert_eq!(registry.len(), 10);
        for short in [
            "time_on_task",
            "binned_time_on_task",
            "reconstruct",
            "event_count",
            "nlp_components",
            "languagetool_process",
            "document_access_timestamps",
            "document_tagging",
            "document_list",
            "last_document",
        ] {
            let pipeline = registry.get(short).unwrap();
            assert_eq!(registry.get(pipeline.reducer_name()).unwrap().reducer_name(), pipeline.reducer_name());
        }
        assert!(matches!(registry.get("nope"), Err(Error::UnknownReducer(_))));
    }

    #[test]
    fn test_document_scoping_switch() {
        let scoped = ReducerRegistry::writing_observer(&WritingObserverSettings::default());
        assert!(scoped.get("time_on_task").unwrap().scope().contains(&KeyField::event("doc_id")));
        assert!(!scoped.get("document_list").unwrap().scope().contains(&KeyField::event("doc_id")));

        let settings = WritingObserverSettings {
            document_scoping: false,
            ..Default::default()
        };
        let flat = ReducerRegistry::writing_observer(&settings);
        assert_eq!(flat.get("time_on_task").unwrap().scope(), &Scope::student());
    }

    #[test]
    fn test_register_replaces_duplicate() {
        let mut registry = ReducerRegistry::new();
        registry.register(KvsPipeline::student(EventCount::new()));
        registry.register(KvsPipeline::student(EventCount::new()));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_pipeline_set_publishes_updates() {
        let kvs: Arc<dyn Kvs> = Arc::new(MemoryKvs::new());
        let registry = ReducerRegistry::writing_observer(&WritingObserverSettings::default());
        let set = registry.instantiate_all(kvs.clone(), &SessionMetadata::for_student("s1"));
        assert_eq!(set.student(), "s1");
        assert_eq!(set.len(), 10);

        let published = set.process(&keystroke("d1", 100.0)).await.unwrap().published;
        let names: Vec<&str> = published.iter().map(|p| short_name(p.reducer)).collect();
        // reconstruct and the placeholders stay quiet on keystrokes
        assert!(names.contains(&"time_on_task"));
        assert!(names.contains(&"document_list"));
        assert!(names.contains(&"last_document"));
        assert!(!names.contains(&"reconstruct"));
        assert!(!names.contains(&"nlp_components"));

        let mut dict = KeyDict::new();
        dict.insert(KeyField::Student, "s1");
        dict.insert(KeyField::event("doc_id"), "d1");
        let count = registry
            .get("event_count")
            .unwrap()
            .read_external_json(kvs.as_ref(), &dict)
            .await
            .unwrap();
        assert_eq!(count, Some(json!({"count": 1})));
    }

    #[tokio::test]
    async fn test_placeholder_keys_are_queryable() {
        let kvs: Arc<dyn Kvs> = Arc::new(MemoryKvs::new());
        let registry = ReducerRegistry::writing_observer(&WritingObserverSettings::default());
        let set = registry.instantiate_all(kvs.clone(), &SessionMetadata::for_student("s1"));
        set.process(&keystroke("d1", 1.0)).await.unwrap();

        let mut dict = KeyDict::new();
        dict.insert(KeyField::Student, "s1");
        dict.insert(KeyField::event("doc_id"), "d1");
        let nlp = registry.get("nlp_components").unwrap();
        let internal_key = nlp.key_for(&dict, KeyStateType::Internal);
        // Initialised on first sight, but never published
        assert!(kvs.get(&internal_key).await.unwrap().is_some());
        assert_eq!(nlp.read_external_json(kvs.as_ref(), &dict).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failing_reducer_does_not_block_others() {
        let kvs: Arc<dyn Kvs> = Arc::new(MemoryKvs::new());
        let registry = ReducerRegistry::writing_observer(&WritingObserverSettings::default());
        let set = registry.instantiate_all(kvs.clone(), &SessionMetadata::for_student("s1"));

        let outcome = set.process(&save_past_end("d1", 10.0)).await.unwrap();
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(short_name(outcome.failed[0].reducer), "reconstruct");
        let names: Vec<&str> = outcome.published.iter().map(|p| short_name(p.reducer)).collect();
        assert!(names.contains(&"time_on_task"));
        assert!(names.contains(&"event_count"));

        // The next event is processed normally
        let outcome = set.process(&keystroke("d2", 20.0)).await.unwrap();
        assert!(outcome.failed.is_empty());
        assert!(outcome.published.iter().any(|p| p.key.contains("doc_id:d2")));

        // The failed reducer kept its initial state
        let mut dict = KeyDict::new();
        dict.insert(KeyField::Student, "s1");
        dict.insert(KeyField::event("doc_id"), "d1");
        let reconstruct = registry.get("reconstruct").unwrap();
        assert_eq!(reconstruct.read_external_json(kvs.as_ref(), &dict).await.unwrap(), None);
    }

    /// Store whose every call fails
    struct DownKvs;

    #[async_trait]
    impl Kvs for DownKvs {
        async fn get(&self, _key: &str) -> lo_common::Result<Option<Value>> {
            Err(lo_common::Error::Unavailable("down".to_string()))
        }

        async fn set(&self, _key: &str, _value: Value) -> lo_common::Result<()> {
            Err(lo_common::Error::Unavailable("down".to_string()))
        }

        async fn keys(&self) -> lo_common::Result<Vec<String>> {
            Err(lo_common::Error::Unavailable("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let registry = ReducerRegistry::writing_observer(&WritingObserverSettings::default());
        let set = registry.instantiate_all(Arc::new(DownKvs), &SessionMetadata::for_student("s1"));

        let result = set.process(&keystroke("d1", 1.0)).await;
        assert!(matches!(result, Err(Error::Store(lo_common::Error::Unavailable(_)))));
    }
}
