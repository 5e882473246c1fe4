//! Time on task
//!
//! Adds up the intervals between successive events. An interval longer than
//! the threshold counts as the threshold: a student who walks away for two
//! hours is credited one threshold, not two hours.

use lo_common::config::WritingObserverSettings;
use lo_common::events::Event;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::pipeline::{Reducer, Reduction};
use crate::time_bins::{allocate, clamped_delta, time_bin};
use crate::{Error, Result};

pub const TIME_ON_TASK: &str = concat!(module_path!(), "::time_on_task");
pub const BINNED_TIME_ON_TASK: &str = concat!(module_path!(), "::binned_time_on_task");

fn server_time(reducer: &str, event: &Event) -> Result<f64> {
    event
        .server_time()
        .ok_or_else(|| Error::MalformedEvent(format!("{}: event has no server.time", reducer)))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeOnTaskState {
    /// Server time of the previous event, seconds
    pub last_seen_timestamp: Option<f64>,
    /// Accumulated seconds on task
    pub total_time: f64,
}

pub struct TimeOnTask {
    max_gap: f64,
    verbose: bool,
}

impl TimeOnTask {
    pub fn new(max_gap_seconds: u64) -> Self {
        Self {
            max_gap: max_gap_seconds as f64,
            verbose: false,
        }
    }

    pub fn from_settings(settings: &WritingObserverSettings) -> Self {
        Self::new(settings.time_on_task_threshold).verbose(settings.verbose)
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl Reducer for TimeOnTask {
    type Internal = TimeOnTaskState;
    type External = TimeOnTaskState;

    fn name(&self) -> &'static str {
        TIME_ON_TASK
    }

    fn null_state(&self) -> Option<TimeOnTaskState> {
        Some(TimeOnTaskState::default())
    }

    fn reduce(
        &self,
        event: &Event,
        state: Option<TimeOnTaskState>,
    ) -> Result<Reduction<TimeOnTaskState, TimeOnTaskState>> {
        let now = server_time(TIME_ON_TASK, event)?;
        let mut state = state.unwrap_or_default();

        // The first event only sets the baseline
        if let Some(last) = state.last_seen_timestamp {
            state.total_time += clamped_delta(last, now, self.max_gap);
        }
        state.last_seen_timestamp = Some(now);

        if self.verbose {
            debug!("time_on_task: {:?}", state);
        }
        Ok(Reduction::publish(state))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BinnedTimeOnTaskState {
    pub last_seen_timestamp: Option<f64>,
    /// Start of the bucket holding the last event
    pub current_bucket: Option<i64>,
    /// Bucket start (seconds) to seconds on task within that bucket
    pub buckets: BTreeMap<i64, f64>,
}

/// Time on task split into fixed-width time buckets
pub struct BinnedTimeOnTask {
    max_gap: f64,
    bin_size: u64,
    verbose: bool,
}

impl BinnedTimeOnTask {
    pub fn new(max_gap_seconds: u64, bin_size_seconds: u64) -> Self {
        Self {
            max_gap: max_gap_seconds as f64,
            bin_size: bin_size_seconds.max(1),
            verbose: false,
        }
    }

    pub fn from_settings(settings: &WritingObserverSettings) -> Self {
        Self::new(
            settings.time_on_task_threshold,
            settings.binned_time_on_task_bin_size,
        )
        .verbose(settings.verbose)
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl Reducer for BinnedTimeOnTask {
    type Internal = BinnedTimeOnTaskState;
    type External = BinnedTimeOnTaskState;

    fn name(&self) -> &'static str {
        BINNED_TIME_ON_TASK
    }

    fn null_state(&self) -> Option<BinnedTimeOnTaskState> {
        Some(BinnedTimeOnTaskState::default())
    }

    fn reduce(
        &self,
        event: &Event,
        state: Option<BinnedTimeOnTaskState>,
    ) -> Result<Reduction<BinnedTimeOnTaskState, BinnedTimeOnTaskState>> {
        let now = server_time(BINNED_TIME_ON_TASK, event)?;
        let mut state = state.unwrap_or_default();

        let start = state.last_seen_timestamp.unwrap_or(now);
        let delta = clamped_delta(start, now, self.max_gap);
        allocate(&mut state.buckets, start, delta, self.bin_size);

        state.last_seen_timestamp = Some(now);
        state.current_bucket = Some(time_bin(now, self.bin_size));

        if self.verbose {
            debug!("binned_time_on_task: {:?}", state);
        }
        Ok(Reduction::publish(state))
    }
}
