//! Writing-analysis reducer library
//!
//! Every reducer here runs only through [`KvsPipeline`](crate::KvsPipeline).
//! Per-document reducers are keyed on (student, document) unless document
//! scoping is switched off in configuration; the document-list family is
//! keyed on the student alone.

pub mod counters;
pub mod documents;
pub mod reconstruct;
pub mod time_on_task;

pub use counters::{EventCount, EventCountState, Placeholder};
pub use documents::{
    DocumentAccessState, DocumentAccessTimestamps, DocumentInfo, DocumentList, DocumentListState,
    DocumentTagging, DocumentTagState, LastDocument, LastDocumentState,
};
pub use reconstruct::Reconstruct;
pub use time_on_task::{BinnedTimeOnTask, BinnedTimeOnTaskState, TimeOnTask, TimeOnTaskState};

/// Last `::` segment of a fully-qualified reducer name
pub fn short_name(name: &str) -> &str {
    name.rsplit("::").next().unwrap_or(name)
}
