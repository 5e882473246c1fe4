//! Document text reconstruction
//!
//! Routes save and history events through the reconstruction engine. Other
//! event kinds leave stored state untouched.

use lo_common::config::WritingObserverSettings;
use lo_common::events::Event;
use tracing::debug;

use crate::pipeline::{Reducer, Reduction};
use crate::reconstruct_doc::{command_list, from_changelog, GoogleText};
use crate::{Error, Result};

pub const RECONSTRUCT: &str = concat!(module_path!(), "::reconstruct");

#[derive(Default)]
pub struct Reconstruct {
    verbose: bool,
}

impl Reconstruct {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &WritingObserverSettings) -> Self {
        Self {
            verbose: settings.verbose,
        }
    }
}

impl Reducer for Reconstruct {
    type Internal = GoogleText;
    type External = GoogleText;

    fn name(&self) -> &'static str {
        RECONSTRUCT
    }

    fn reduce(&self, event: &Event, state: Option<GoogleText>) -> Result<Reduction<GoogleText, GoogleText>> {
        let doc = match event.event_type() {
            "google_docs_save" => {
                let mut doc = state.unwrap_or_default();
                for bundle in &event.client.bundles {
                    doc = command_list(doc, &bundle.commands)?;
                }
                doc
            }
            // A history event carries the whole document; start over
            "document_history" => {
                let history = event.client.history.as_ref().ok_or_else(|| {
                    Error::MalformedEvent("document_history event without history".to_string())
                })?;
                from_changelog(&history.changelog)?
            }
            _ => return Ok(Reduction::unchanged()),
        };

        if self.verbose {
            debug!("reconstruct: {} characters, cursor at {}", doc.len(), doc.position);
        }
        Ok(Reduction::publish(doc))
    }
}
