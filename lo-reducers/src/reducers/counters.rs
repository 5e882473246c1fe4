//! Counting and placeholder reducers

use lo_common::config::WritingObserverSettings;
use lo_common::events::Event;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::pipeline::{Reducer, Reduction};
use crate::Result;

pub const EVENT_COUNT: &str = concat!(module_path!(), "::event_count");
pub const NLP_COMPONENTS: &str = concat!(module_path!(), "::nlp_components");
pub const LANGUAGETOOL_PROCESS: &str = concat!(module_path!(), "::languagetool_process");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventCountState {
    pub count: u64,
}

/// Counts every event in scope
#[derive(Default)]
pub struct EventCount {
    verbose: bool,
}

impl EventCount {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &WritingObserverSettings) -> Self {
        Self {
            verbose: settings.verbose,
        }
    }
}

impl Reducer for EventCount {
    type Internal = EventCountState;
    type External = EventCountState;

    fn name(&self) -> &'static str {
        EVENT_COUNT
    }

    fn null_state(&self) -> Option<EventCountState> {
        Some(EventCountState::default())
    }

    fn reduce(
        &self,
        event: &Event,
        state: Option<EventCountState>,
    ) -> Result<Reduction<EventCountState, EventCountState>> {
        if self.verbose {
            debug!("event_count: {:?}", event);
        }
        let count = state.map_or(0, |s| s.count) + 1;
        Ok(Reduction::publish(EventCountState { count }))
    }
}

/// Reducer that never writes
///
/// Registered only so out-of-band query code can compute its keys and read
/// what other services store there.
pub struct Placeholder {
    name: &'static str,
}

impl Placeholder {
    pub fn nlp_components() -> Self {
        Self { name: NLP_COMPONENTS }
    }

    pub fn languagetool_process() -> Self {
        Self {
            name: LANGUAGETOOL_PROCESS,
        }
    }
}

impl Reducer for Placeholder {
    type Internal = Value;
    type External = Value;

    fn name(&self) -> &'static str {
        self.name
    }

    fn null_state(&self) -> Option<Value> {
        Some(json!({}))
    }

    fn reduce(&self, _event: &Event, _state: Option<Value>) -> Result<Reduction<Value, Value>> {
        Ok(Reduction::unchanged())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::StateUpdate;

    #[test]
    fn test_event_count_increments() {
        let reducer = EventCount::new();
        let event = Event::default();
        let once = reducer.reduce(&event, reducer.null_state()).unwrap();
        let state = once.internal.into_updated().unwrap();
        assert_eq!(state.count, 1);
        let twice = reducer.reduce(&event, Some(state)).unwrap();
        assert_eq!(twice.external.into_updated().unwrap().count, 2);
    }

    #[test]
    fn test_placeholders_never_write() {
        for reducer in [Placeholder::nlp_components(), Placeholder::languagetool_process()] {
            let out = reducer.reduce(&Event::default(), reducer.null_state()).unwrap();
            assert_eq!(out.internal, StateUpdate::Unchanged);
            assert_eq!(out.external, StateUpdate::Unchanged);
        }
        assert_ne!(NLP_COMPONENTS, LANGUAGETOOL_PROCESS);
    }
}
