//! Archival replay
//!
//! Raw events are logged one JSON object per line. Feeding such a log back
//! through fresh pipeline instances recomputes every reducer's state, which
//! is how state lost to a write race or a reducer bug is recovered.

use lo_common::events::Event;
use lo_common::kvs::Kvs;
use lo_common::SessionMetadata;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::registry::{PipelineSet, ReducerRegistry};
use crate::Result;

/// Counts from one replay run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    /// Events processed
    pub events: usize,
    /// Blank, unparseable or unstamped lines
    pub skipped_lines: usize,
    /// Distinct students seen
    pub students: usize,
    /// External states published
    pub published: usize,
    /// Reducer failures; the event still reached every other reducer
    pub reducer_errors: usize,
}

/// Replay a JSON-lines event log into `kvs`
///
/// Each event's `auth` block names its student; one set of pipeline
/// instances is kept per student. Events without a `server.time` are
/// skipped. A reducer failing on an event is counted and replay moves on;
/// a store error stops the replay.
pub async fn replay_log<B>(registry: &ReducerRegistry, kvs: Arc<dyn Kvs>, reader: B) -> Result<ReplaySummary>
where
    B: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut sessions: HashMap<String, PipelineSet> = HashMap::new();
    let mut summary = ReplaySummary::default();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            summary.skipped_lines += 1;
            continue;
        }

        let event: Event = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!("Line {}: not a valid event ({}), skipped", line_no, e);
                summary.skipped_lines += 1;
                continue;
            }
        };
        if event.server.is_none() {
            warn!("Line {}: event has no server timestamp, skipped", line_no);
            summary.skipped_lines += 1;
            continue;
        }

        let session = SessionMetadata {
            auth: event.auth.clone(),
        };
        let set = sessions
            .entry(session.student_id().to_string())
            .or_insert_with(|| registry.instantiate_all(Arc::clone(&kvs), &session));

        let outcome = set.process(&event).await?;
        if !outcome.failed.is_empty() {
            warn!(
                "Line {}: {} reducer(s) failed, continuing",
                line_no,
                outcome.failed.len()
            );
        }
        summary.published += outcome.published.len();
        summary.reducer_errors += outcome.failed.len();
        summary.events += 1;
    }

    summary.students = sessions.len();
    info!(
        "Replay complete: {} events, {} students, {} states published, {} lines skipped, {} reducer errors",
        summary.events,
        summary.students,
        summary.published,
        summary.skipped_lines,
        summary.reducer_errors
    );
    Ok(summary)
}

/// Replay a log file
pub async fn replay_file(registry: &ReducerRegistry, kvs: Arc<dyn Kvs>, path: &Path) -> Result<ReplaySummary> {
    info!("Replaying {}", path.display());
    let file = tokio::fs::File::open(path).await?;
    replay_log(registry, kvs, BufReader::new(file)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use lo_common::config::WritingObserverSettings;
    use lo_common::kvs::MemoryKvs;

    #[tokio::test]
    async fn test_replay_skips_bad_lines() {
        let log = concat!(
            r#"{"server":{"time":1.0},"client":{"event":"keystroke","doc_id":"d1"},"auth":{"safe_user_id":"s1"}}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"client":{"event":"keystroke","doc_id":"d1"}}"#,
            "\n",
            r#"{"server":{"time":2.0},"client":{"event":"keystroke","doc_id":"d1"},"auth":{"safe_user_id":"s2"}}"#,
            "\n",
        );
        let registry = ReducerRegistry::writing_observer(&WritingObserverSettings::default());
        let kvs: Arc<dyn Kvs> = Arc::new(MemoryKvs::new());

        let summary = replay_log(&registry, kvs, log.as_bytes()).await.unwrap();
        assert_eq!(summary.events, 2);
        assert_eq!(summary.students, 2);
        assert_eq!(summary.skipped_lines, 3);
        assert!(summary.published > 0);
    }

    #[tokio::test]
    async fn test_replay_continues_past_reducer_error() {
        let log = concat!(
            r#"{"server":{"time":1.0},"client":{"event":"google_docs_save","doc_id":"d1","bundles":[{"commands":[{"ty":"is","ibi":50,"s":"x"}]}]},"auth":{"safe_user_id":"s1"}}"#,
            "\n",
            r#"{"server":{"time":2.0},"client":{"event":"keystroke","doc_id":"d2"},"auth":{"safe_user_id":"s1"}}"#,
            "\n",
        );
        let registry = ReducerRegistry::writing_observer(&WritingObserverSettings::default());
        let kvs: Arc<dyn Kvs> = Arc::new(MemoryKvs::new());

        let summary = replay_log(&registry, kvs.clone(), log.as_bytes()).await.unwrap();
        assert_eq!(summary.events, 2);
        assert_eq!(summary.reducer_errors, 1);

        let keys = kvs.keys().await.unwrap();
        assert!(keys.iter().any(|k| k.starts_with("External,") && k.ends_with("doc_id:d2")));
    }
}
