//! lo-restream - stream a logged event file to a running lo-server
//!
//! Opens one session per file and posts its events in order. Useful for
//! load testing and for watching a dashboard replay a recorded class.
//!
//! With `--filelist` the argument is a file naming one log per line; all of
//! them stream at once, each from its own first event. That simulates many
//! students in one session; it does not reproduce one class's timing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::future::join_all;
use lo_common::events::{AuthMetadata, Event};
use lo_common::SessionMetadata;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(name = "lo-restream")]
#[command(about = "Stream a JSON-lines event log to lo-server")]
#[command(version)]
struct Args {
    /// Event log, or with --filelist a file listing event logs
    filename: PathBuf,

    /// Server base URL
    #[arg(long, default_value = "http://localhost:8888/")]
    url: String,

    /// Send only the client block; the server re-stamps each event
    #[arg(long)]
    extract_client: bool,

    /// Throttle events to rate x their logged timestamp gaps
    #[arg(long)]
    rate: Option<f64>,

    /// Longest single delay in seconds when throttling
    #[arg(long)]
    max_wait: Option<f64>,

    /// Stream as a random student (rst-student-N) instead of the logged one
    #[arg(long)]
    rename: bool,

    /// FILENAME lists event logs to stream concurrently
    #[arg(long)]
    filelist: bool,
}

#[derive(Deserialize)]
struct SessionCreated {
    session_id: String,
}

#[derive(Deserialize)]
struct BatchReply {
    #[serde(default)]
    failed: Vec<serde_json::Value>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let files: Vec<PathBuf> = if args.filelist {
        let listing = tokio::fs::read_to_string(&args.filename)
            .await
            .with_context(|| format!("Failed to read file list {}", args.filename.display()))?;
        listing
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(PathBuf::from)
            .collect()
    } else {
        vec![args.filename.clone()]
    };

    let client = reqwest::Client::new();
    let results = join_all(files.iter().map(|file| restream(&client, &args, file))).await;

    let mut failed = 0;
    for (file, result) in files.iter().zip(results) {
        match result {
            Ok(sent) => info!("{}: {} events sent", file.display(), sent),
            Err(e) => {
                error!("{}: {:#}", file.display(), e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} streams failed", failed, files.len());
    }
    Ok(())
}

/// Stream one log file; returns the number of events sent
async fn restream(client: &reqwest::Client, args: &Args, path: &Path) -> Result<usize> {
    let base = args.url.trim_end_matches('/');
    let renamed = args
        .rename
        .then(|| format!("rst-student-{}", rand::thread_rng().gen_range(1..=1000)));

    let file = File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();

    let mut session_id: Option<String> = None;
    let mut last_ts: Option<f64> = None;
    let mut sent = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut event: Event = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!("{}: skipping unparseable line ({})", path.display(), e);
                continue;
            }
        };

        if let (Some(rate), Some(ts)) = (args.rate, event.server_time()) {
            if let Some(prev) = last_ts {
                let mut delay = ((ts - prev) * rate).max(0.0);
                if let Some(max_wait) = args.max_wait {
                    delay = delay.min(max_wait);
                }
                debug!("Sleeping {:.3}s", delay);
                tokio::time::sleep(Duration::from_secs_f64(delay)).await;
            }
            last_ts = Some(ts);
        }

        if let Some(id) = &renamed {
            event.auth = Some(AuthMetadata::new(id.clone()));
        }
        if args.extract_client {
            event = Event {
                client: event.client,
                auth: event.auth,
                ..Event::default()
            };
        }

        // The first event decides which student the session belongs to
        if session_id.is_none() {
            session_id = Some(open_session(client, base, event.auth.clone()).await?);
        }
        let id = session_id.as_deref().unwrap_or_default();

        let reply: BatchReply = client
            .post(format!("{}/api/sessions/{}/events", base, id))
            .json(&json!({ "events": [event] }))
            .send()
            .await
            .context("Failed to send event")?
            .error_for_status()
            .context("Server rejected event")?
            .json()
            .await
            .context("Unexpected event response")?;
        for failure in &reply.failed {
            warn!("{}: reducer failure on event {}: {}", path.display(), sent, failure);
        }
        sent += 1;
    }

    if let Some(id) = session_id {
        client
            .delete(format!("{}/api/sessions/{}", base, id))
            .send()
            .await
            .context("Failed to close session")?;
    }
    Ok(sent)
}

async fn open_session(client: &reqwest::Client, base: &str, auth: Option<AuthMetadata>) -> Result<String> {
    let created: SessionCreated = client
        .post(format!("{}/api/sessions", base))
        .json(&SessionMetadata { auth })
        .send()
        .await
        .context("Could not connect to server")?
        .error_for_status()
        .context("Server refused session")?
        .json()
        .await
        .context("Unexpected session response")?;
    info!("Opened session {}", created.session_id);
    Ok(created.session_id)
}
