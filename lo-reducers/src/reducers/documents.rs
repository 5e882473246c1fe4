//! Per-student document bookkeeping
//!
//! These reducers track which Google Docs a student touches, so dashboards
//! can pick the right document to show. All are keyed on the student alone.

use lo_common::config::WritingObserverSettings;
use lo_common::events::Event;
use lo_common::time::now_millis;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::doc_id::{get_doc_id, is_visibility_event};
use crate::pipeline::{Reducer, Reduction};
use crate::Result;

pub const DOCUMENT_ACCESS_TIMESTAMPS: &str = concat!(module_path!(), "::document_access_timestamps");
pub const DOCUMENT_TAGGING: &str = concat!(module_path!(), "::document_tagging");
pub const DOCUMENT_LIST: &str = concat!(module_path!(), "::document_list");
pub const LAST_DOCUMENT: &str = concat!(module_path!(), "::last_document");

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#(\w+)").expect("tag pattern is valid"));

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentAccessState {
    /// Client timestamp (ms) to the document switched into at that time
    pub timestamps: BTreeMap<i64, String>,
    pub last_document: String,
}

/// When the student switched into each document
///
/// Used to find which document a student had open at a given time of day.
/// Tab switches fire visibility events from both tabs, so those are ignored,
/// and a repeat event for the document already current adds no entry.
#[derive(Default)]
pub struct DocumentAccessTimestamps {
    verbose: bool,
}

impl DocumentAccessTimestamps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &WritingObserverSettings) -> Self {
        Self {
            verbose: settings.verbose,
        }
    }
}

impl Reducer for DocumentAccessTimestamps {
    type Internal = DocumentAccessState;
    type External = DocumentAccessState;

    fn name(&self) -> &'static str {
        DOCUMENT_ACCESS_TIMESTAMPS
    }

    fn null_state(&self) -> Option<DocumentAccessState> {
        Some(DocumentAccessState::default())
    }

    fn reduce(
        &self,
        event: &Event,
        state: Option<DocumentAccessState>,
    ) -> Result<Reduction<DocumentAccessState, DocumentAccessState>> {
        if is_visibility_event(event) {
            return Ok(Reduction::unchanged());
        }
        let Some(document_id) = get_doc_id(event) else {
            return Ok(Reduction::unchanged());
        };

        let mut state = state.unwrap_or_default();
        if document_id != state.last_document {
            let ts = event.client_ts().unwrap_or_else(now_millis) as i64;
            state.timestamps.insert(ts, document_id.clone());
            state.last_document = document_id;
        }

        if self.verbose {
            debug!("document_access_timestamps: {} entries", state.timestamps.len());
        }
        Ok(Reduction::publish(state))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentTagState {
    /// `#tag` found in a title to the documents carrying it
    pub tags: BTreeMap<String, Vec<String>>,
}

/// Groups documents by `#hashtags` in their titles
///
/// Lets multi-document workflows (graphic organiser, then final draft) be
/// shown together.
#[derive(Default)]
pub struct DocumentTagging;

impl DocumentTagging {
    pub fn new() -> Self {
        Self
    }
}

impl Reducer for DocumentTagging {
    type Internal = DocumentTagState;
    type External = DocumentTagState;

    fn name(&self) -> &'static str {
        DOCUMENT_TAGGING
    }

    fn null_state(&self) -> Option<DocumentTagState> {
        Some(DocumentTagState::default())
    }

    fn reduce(
        &self,
        event: &Event,
        state: Option<DocumentTagState>,
    ) -> Result<Reduction<DocumentTagState, DocumentTagState>> {
        if event.event_type() != "document_history" {
            return Ok(Reduction::unchanged());
        }
        let (Some(document_id), Some(title)) = (get_doc_id(event), event.object_title()) else {
            return Ok(Reduction::unchanged());
        };

        let mut state = state.unwrap_or_default();
        for captures in TAG_RE.captures_iter(title) {
            let docs = state.tags.entry(captures[1].to_string()).or_default();
            if !docs.contains(&document_id) {
                docs.push(document_id.clone());
            }
        }
        Ok(Reduction::publish(state))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Server time of the latest event naming this document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_access: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentListState {
    pub docs: BTreeMap<String, DocumentInfo>,
}

/// Every document the student has visited or edited
#[derive(Default)]
pub struct DocumentList;

impl DocumentList {
    pub fn new() -> Self {
        Self
    }
}

impl Reducer for DocumentList {
    type Internal = DocumentListState;
    type External = DocumentListState;

    fn name(&self) -> &'static str {
        DOCUMENT_LIST
    }

    fn null_state(&self) -> Option<DocumentListState> {
        Some(DocumentListState::default())
    }

    fn reduce(
        &self,
        event: &Event,
        state: Option<DocumentListState>,
    ) -> Result<Reduction<DocumentListState, DocumentListState>> {
        let Some(document_id) = get_doc_id(event) else {
            return Ok(Reduction::unchanged());
        };

        let mut state = state.unwrap_or_default();
        let info = state.docs.entry(document_id.clone()).or_default();
        if let Some(title) = event.object_title() {
            info.title = Some(title.to_string());
        }
        match event.server_time() {
            Some(time) => info.last_access = Some(time),
            None => warn!("document_list: event for {} has no server.time", document_id),
        }
        Ok(Reduction::publish(state))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastDocumentState {
    pub document_id: String,
}

/// Most recent document the student touched, without history
#[derive(Default)]
pub struct LastDocument;

impl LastDocument {
    pub fn new() -> Self {
        Self
    }
}

impl Reducer for LastDocument {
    type Internal = LastDocumentState;
    type External = LastDocumentState;

    fn name(&self) -> &'static str {
        LAST_DOCUMENT
    }

    fn reduce(
        &self,
        event: &Event,
        _state: Option<LastDocumentState>,
    ) -> Result<Reduction<LastDocumentState, LastDocumentState>> {
        match get_doc_id(event) {
            Some(document_id) => Ok(Reduction::publish(LastDocumentState { document_id })),
            None => Ok(Reduction::unchanged()),
        }
    }
}
