//! # Learning Observer Stream Reducers
//!
//! Turns an unbounded stream of per-student client events into incrementally
//! updated state held in a shared key-value store.
//!
//! ```text
//!  event ──> scope resolution ──> key construction ──> KVS read (internal)
//!                                                          │
//!        external state <── KVS write(s) <── reduction function
//! ```
//!
//! A reduction function ([`Reducer`]) maps `(event, internal state)` to a new
//! internal state (kept for the next event) and an external state (published
//! to dashboards). [`KvsPipeline`] wraps a reducer with a [`Scope`] and does
//! the loading and persisting; one [`PipelineInstance`] is created per
//! consumer session.

pub mod activity;
pub mod doc_id;
pub mod error;
pub mod fields;
pub mod key;
pub mod pipeline;
pub mod reconstruct_doc;
pub mod reducers;
pub mod registry;
pub mod replay;
pub mod time_bins;

pub use error::{Error, Result};
pub use fields::{KeyDict, KeyField, KeyStateType, Scope};
pub use key::make_key;
pub use pipeline::{
    KvsPipeline, PipelineInstance, ProcessedEvent, Reducer, Reduction, StateUpdate,
};
pub use registry::{
    EventProcessor, PipelineFactory, PipelineSet, ReducerFailure, ReducerOutput, ReducerRegistry,
    SetOutcome,
};
pub use replay::{replay_file, replay_log, ReplaySummary};
