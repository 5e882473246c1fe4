//! Google Docs event helpers
//!
//! Extension events are not consistent about where the document id lives.
//! Save events carry an explicit `client.doc_id`; visibility and keystroke
//! events only carry a page `object` whose `id` is a document id when, and
//! only when, its URL is a document edit/review URL.

use lo_common::events::Event;
use lo_common::AdditionalMetadata;
use once_cell::sync::Lazy;
use regex::Regex;

/// Document page URL, e.g.
/// `https://docs.google.com/document/d/18JAnmxzVD_lGSfa8t6Se66KLZm30YFrC_4M-D2zdYG4/edit`
///
/// The document list page (`https://docs.google.com/document/u/0/?tgif=d`)
/// does not match.
pub static DOC_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://docs\.google\.com/document/d/(?P<doc_id>[^/\s]+)/(?P<action>[a-zA-Z]+)")
        .expect("document URL pattern is valid")
});

/// Extract the document id an event refers to, if any
///
/// Prefers a non-empty explicit `client.doc_id`. Otherwise the page object's
/// URL must be a document URL; its `id` is then used, falling back to the id
/// segment of the URL.
pub fn get_doc_id(event: &Event) -> Option<String> {
    let client = &event.client;
    if let Some(doc_id) = client.doc_id.as_deref().filter(|id| !id.is_empty()) {
        return Some(doc_id.to_string());
    }

    let object = client.object.as_ref()?;
    let url = object.url.as_deref().filter(|url| !url.is_empty())?;
    let captures = DOC_URL_RE.captures(url)?;

    match object.id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => Some(id.to_string()),
        None => captures.name("doc_id").map(|m| m.as_str().to_string()),
    }
}

/// Copy the extracted document id into `client.doc_id`
///
/// Applied to incoming events so that later stages can rely on the explicit
/// field.
pub fn document_link_to_doc_id(event: &mut Event) {
    if let Some(doc_id) = get_doc_id(event) {
        event.client.doc_id = Some(doc_id);
    }
}

/// Tab switch or focus change
pub fn is_visibility_event(event: &Event) -> bool {
    event.event_type() == "visibility"
}

pub fn is_keystroke_event(event: &Event) -> bool {
    event.event_type() == "keystroke"
}

/// Dispatch metadata for one event: `doc_id` when the event names a document
pub fn additional_metadata_for(event: &Event) -> AdditionalMetadata {
    let mut metadata = AdditionalMetadata::new();
    if let Some(doc_id) = get_doc_id(event) {
        metadata.insert("doc_id", doc_id);
    }
    metadata
}
