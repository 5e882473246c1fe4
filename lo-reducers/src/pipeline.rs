//! Pipeline runtime
//!
//! [`KvsPipeline`] binds a [`Reducer`] to a [`Scope`]. Each consumer session
//! gets its own [`PipelineInstance`], which resolves the session's fixed key
//! fields once and then processes that session's events in arrival order.
//!
//! # Concurrency
//!
//! The load / reduce / store sequence is not transactional. Two writers on the
//! same key (one student editing from two devices, or two server workers) can
//! lose an update: the last write wins. This is accepted:
//!
//! 1. Raw events are archived, so state can be recomputed by replaying them.
//! 2. Each session normally owns the keys it writes.
//! 3. Real concurrent editing needs an explicit merge (CRDT-style), not a lock.
//!
//! A partial write (internal stored, external not) is also acceptable; the
//! internal state alone is enough to continue on the next event.

use lo_common::events::Event;
use lo_common::kvs::{CachePerformance, Kvs};
use lo_common::{AdditionalMetadata, SessionMetadata};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::fields::{KeyDict, KeyStateType, Scope};
use crate::key::make_key;
use crate::{Error, Result};

/// Outcome for one half (internal or external) of a reduction
///
/// `Unchanged` tells the runtime not to write: the stored value stays as it
/// was.
#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate<T> {
    Unchanged,
    Updated(T),
}

impl<T> StateUpdate<T> {
    pub fn is_updated(&self) -> bool {
        matches!(self, StateUpdate::Updated(_))
    }

    pub fn as_updated(&self) -> Option<&T> {
        match self {
            StateUpdate::Updated(state) => Some(state),
            StateUpdate::Unchanged => None,
        }
    }

    pub fn into_updated(self) -> Option<T> {
        match self {
            StateUpdate::Updated(state) => Some(state),
            StateUpdate::Unchanged => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StateUpdate<U> {
        match self {
            StateUpdate::Updated(state) => StateUpdate::Updated(f(state)),
            StateUpdate::Unchanged => StateUpdate::Unchanged,
        }
    }
}

/// Result of one reduction call
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction<I, E> {
    pub internal: StateUpdate<I>,
    pub external: StateUpdate<E>,
}

impl<I, E> Reduction<I, E> {
    pub fn new(internal: StateUpdate<I>, external: StateUpdate<E>) -> Self {
        Self { internal, external }
    }

    /// Ignore this event: write nothing
    pub fn unchanged() -> Self {
        Self::new(StateUpdate::Unchanged, StateUpdate::Unchanged)
    }
}

impl<S: Clone> Reduction<S, S> {
    /// Store `state` and publish it as-is
    pub fn publish(state: S) -> Self {
        Self::new(StateUpdate::Updated(state.clone()), StateUpdate::Updated(state))
    }
}

/// A reduction function
///
/// Implementations are pure: everything they need comes in through the event
/// and the prior internal state, and everything they produce goes out through
/// the returned [`Reduction`].
pub trait Reducer: Send + Sync + 'static {
    /// State carried between events for one key
    ///
    /// A state that serializes to JSON `null` reads back as no state at all.
    type Internal: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;
    /// State published to dashboards
    type External: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Fully-qualified, globally unique reducer name
    fn name(&self) -> &'static str;

    /// State handed to the first event of a new key
    ///
    /// Called once per new key, so every key starts from a fresh value.
    fn null_state(&self) -> Option<Self::Internal> {
        None
    }

    fn reduce(
        &self,
        event: &Event,
        state: Option<Self::Internal>,
    ) -> Result<Reduction<Self::Internal, Self::External>>;
}

/// Wrap a state in its schema tag for storage
pub fn encode_envelope<T: Serialize>(schema: &str, state: Option<&T>) -> Result<Value> {
    Ok(json!({
        "schema": schema,
        "state": serde_json::to_value(state)?,
    }))
}

#[derive(Deserialize)]
struct RawEnvelope {
    schema: String,
    #[serde(default)]
    state: Value,
}

/// Unwrap a stored state, checking it belongs to `schema`
pub fn decode_envelope<T: DeserializeOwned>(schema: &str, stored: Value) -> Result<Option<T>> {
    let envelope: RawEnvelope = serde_json::from_value(stored)?;
    if envelope.schema != schema {
        return Err(Error::SchemaMismatch {
            expected: schema.to_string(),
            found: envelope.schema,
        });
    }
    if envelope.state.is_null() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(envelope.state)?))
}

/// Outcome of processing one in-scope event
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedEvent<E> {
    /// Key the external state lives under
    pub external_key: String,
    pub external: StateUpdate<E>,
}

struct PipelineInner<R: Reducer> {
    reducer: R,
    scope: Scope,
    performance: CachePerformance,
}

/// A reducer bound to a scope
///
/// Cheap to clone; clones share the reducer and the cache counters.
pub struct KvsPipeline<R: Reducer> {
    inner: Arc<PipelineInner<R>>,
}

impl<R: Reducer> Clone for KvsPipeline<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Reducer> KvsPipeline<R> {
    /// Define a pipeline. Without an explicit scope it falls back to
    /// per-student state, which is almost always an oversight.
    pub fn new(reducer: R, scope: Option<Scope>) -> Self {
        let scope = match scope {
            Some(scope) => scope,
            None => {
                warn!(
                    "No scope specified for {}, defaulting to student scope",
                    reducer.name()
                );
                Scope::student()
            }
        };
        Self {
            inner: Arc::new(PipelineInner {
                reducer,
                scope,
                performance: CachePerformance::new(),
            }),
        }
    }

    /// Per-student pipeline
    pub fn student(reducer: R) -> Self {
        Self::new(reducer, Some(Scope::student()))
    }

    pub fn name(&self) -> &'static str {
        self.inner.reducer.name()
    }

    pub fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    pub fn reducer(&self) -> &R {
        &self.inner.reducer
    }

    pub fn performance(&self) -> &CachePerformance {
        &self.inner.performance
    }

    /// Store key for this reducer's state
    pub fn key_for(&self, key_dict: &KeyDict, state_type: KeyStateType) -> String {
        make_key(self.name(), key_dict, state_type)
    }

    /// Set up a consumer: resolve fixed key fields from session metadata
    pub fn instance(&self, kvs: Arc<dyn Kvs>, session: &SessionMetadata) -> PipelineInstance<R> {
        PipelineInstance {
            pipeline: self.clone(),
            fixed: self.scope().resolve_fixed(session),
            kvs,
        }
    }

    /// Read the published state for a key, if any was ever written
    pub async fn read_external(&self, kvs: &dyn Kvs, key_dict: &KeyDict) -> Result<Option<R::External>> {
        let key = self.key_for(key_dict, KeyStateType::External);
        match kvs.get(&key).await? {
            Some(stored) => decode_envelope(self.name(), stored),
            None => Ok(None),
        }
    }
}

/// One consumer's view of a pipeline
pub struct PipelineInstance<R: Reducer> {
    pipeline: KvsPipeline<R>,
    kvs: Arc<dyn Kvs>,
    fixed: KeyDict,
}

impl<R: Reducer> PipelineInstance<R> {
    pub fn pipeline(&self) -> &KvsPipeline<R> {
        &self.pipeline
    }

    /// Key fields fixed for this instance's lifetime
    pub fn fixed_keys(&self) -> &KeyDict {
        &self.fixed
    }

    /// Process one event
    ///
    /// Returns `Ok(None)` when the event is out of scope (dropped without any
    /// store access), otherwise the external-state outcome.
    pub async fn process_event(
        &self,
        event: &Event,
        additional: &AdditionalMetadata,
    ) -> Result<Option<StateUpdate<R::External>>> {
        Ok(self
            .process_event_keyed(event, additional)
            .await?
            .map(|processed| processed.external))
    }

    /// Same as [`process_event`](Self::process_event), also reporting the
    /// external key written
    pub async fn process_event_keyed(
        &self,
        event: &Event,
        additional: &AdditionalMetadata,
    ) -> Result<Option<ProcessedEvent<R::External>>> {
        let name = self.pipeline.name();

        let key_dict = match self.pipeline.scope().resolve_event(&self.fixed, additional) {
            Some(dict) => dict,
            None => {
                debug!("{}: event '{}' out of scope, skipped", name, event.event_type());
                return Ok(None);
            }
        };

        let internal_key = self.pipeline.key_for(&key_dict, KeyStateType::Internal);
        let external_key = self.pipeline.key_for(&key_dict, KeyStateType::External);

        match self.apply(event, &internal_key, &external_key).await {
            Ok(external) => Ok(Some(ProcessedEvent {
                external_key,
                external,
            })),
            Err(e) => {
                error!(
                    "{}: '{}' event failed for {}: {}",
                    name,
                    event.event_type(),
                    internal_key,
                    e
                );
                Err(e)
            }
        }
    }

    /// Load, reduce and store one key's state
    async fn apply(
        &self,
        event: &Event,
        internal_key: &str,
        external_key: &str,
    ) -> Result<StateUpdate<R::External>> {
        let name = self.pipeline.name();

        let internal_state = match self.kvs.get(internal_key).await? {
            Some(stored) => {
                self.pipeline.performance().record_hit();
                decode_envelope::<R::Internal>(name, stored)?
            }
            None => {
                self.pipeline.performance().record_miss();
                let initial = self.pipeline.reducer().null_state();
                self.kvs
                    .set(internal_key, encode_envelope(name, initial.as_ref())?)
                    .await?;
                debug!("{}: initialised {}", name, internal_key);
                initial
            }
        };

        let Reduction { internal, external } = self.pipeline.reducer().reduce(event, internal_state)?;

        match &internal {
            StateUpdate::Updated(state) => {
                self.kvs
                    .set(internal_key, encode_envelope(name, Some(state))?)
                    .await?;
            }
            StateUpdate::Unchanged => debug!("{}: internal state left unchanged", name),
        }
        match &external {
            StateUpdate::Updated(state) => {
                self.kvs
                    .set(external_key, encode_envelope(name, Some(state))?)
                    .await?;
            }
            StateUpdate::Unchanged => debug!("{}: external state left unchanged", name),
        }

        Ok(external)
    }
}
