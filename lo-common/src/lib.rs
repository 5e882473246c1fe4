//! # Learning Observer Common Library
//!
//! Shared code for the learning-analytics services:
//! - Event model (client events, session and dispatch metadata)
//! - Key-value store contract and backends
//! - Configuration loading
//! - Publish bus and SSE helpers for dashboards
//! - Time helpers

pub mod bus;
pub mod config;
pub mod error;
pub mod events;
pub mod kvs;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
pub use events::{AdditionalMetadata, Event, SessionMetadata};
pub use kvs::Kvs;
