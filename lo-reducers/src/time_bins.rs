//! Time-on-task arithmetic
//!
//! Gaps between consecutive events count as time on task, capped at a
//! threshold so that walking away from the keyboard is not counted.

use std::collections::BTreeMap;

/// Time credited for the interval `last..current`
///
/// Capped at `max_gap`. Events can arrive out of order; a negative gap
/// credits nothing.
pub fn clamped_delta(last: f64, current: f64, max_gap: f64) -> f64 {
    (current - last).clamp(0.0, max_gap)
}

/// Start of the bucket containing `timestamp`
pub fn time_bin(timestamp: f64, bin_size: u64) -> i64 {
    let size = bin_size as f64;
    ((timestamp / size).floor() * size) as i64
}

/// Credit `delta` seconds starting at `start` to `buckets`
///
/// An interval crossing one or more bucket boundaries is split so each bucket
/// receives only the part that falls inside it. Every bucket touched gets an
/// entry, even if it receives zero.
pub fn allocate(buckets: &mut BTreeMap<i64, f64>, start: f64, delta: f64, bin_size: u64) {
    let size = bin_size as f64;
    let end = start + delta;
    let mut cursor = start;
    loop {
        let bin = time_bin(cursor, bin_size);
        let bin_end = bin as f64 + size;
        let portion = end.min(bin_end) - cursor;
        *buckets.entry(bin).or_insert(0.0) += portion.max(0.0);
        if end <= bin_end {
            break;
        }
        cursor = bin_end;
    }
}
