//! Script replay
//!
//! Drives the vote flow from JSON-lines events against an in-memory store.
//! Each line is one event:
//!
//! ```text
//! {"kind":"start","channel_id":"c1","entries":[{"image_url":"..","prompt":".."}],"duration_secs":300}
//! {"kind":"vote","channel_id":"c1","voter_id":"u1","custom_id":"vote_0","at":10}
//! {"kind":"delete_message","channel_id":"c1"}
//! {"kind":"end","channel_id":"c1"}
//! ```
//!
//! In a replay, `at` is an offset in seconds from the start of the replay
//! (default 0); untimed events happen at the time of the last timed one.
//! Expired sessions past the sweep grace are evicted before each event.
//! Blank lines and lines starting with `#` are skipped.

use crate::channels::{ConsoleSurface, DynSurface};
use crate::config::VoteboxConfig;
use crate::polls::{
    create_store, end_vote, start_vote, OverwritePolicy, SessionStore, VoteEntry, VoteIntake,
    VoteInteraction, VoteOutcome,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Replay errors
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Failed to read script: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// One scripted event
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplayEvent {
    Start {
        channel_id: String,
        entries: Vec<VoteEntry>,
        duration_secs: i64,
        #[serde(default)]
        at: i64,
    },
    Vote {
        channel_id: String,
        voter_id: String,
        custom_id: String,
        #[serde(default)]
        at: i64,
        /// Platform interaction ID, when relayed from a live gateway
        interaction_id: Option<String>,
        interaction_token: Option<String>,
    },
    End { channel_id: String },
    /// Delete the channel's tally message so the next edit fails
    DeleteMessage { channel_id: String },
}

impl ReplayEvent {
    /// Offset in seconds, for timed events
    fn at(&self) -> Option<i64> {
        match self {
            Self::Start { at, .. } | Self::Vote { at, .. } => Some(*at),
            Self::End { .. } | Self::DeleteMessage { .. } => None,
        }
    }
}

/// An event with the script line it came from
#[derive(Debug, Clone)]
pub struct ScriptLine {
    pub line: usize,
    pub event: ReplayEvent,
}

/// Whether a line carries no event
pub(crate) fn is_blank(text: &str) -> bool {
    let text = text.trim();
    text.is_empty() || text.starts_with('#')
}

/// Parse a single event line
pub fn parse_event(line: usize, text: &str) -> Result<ReplayEvent, ReplayError> {
    serde_json::from_str(text).map_err(|e| ReplayError::Parse {
        line,
        message: e.to_string(),
    })
}

/// Parse a script into events
pub fn parse_script(script: &str) -> Result<Vec<ScriptLine>, ReplayError> {
    script
        .lines()
        .enumerate()
        .filter(|(_, text)| !is_blank(text))
        .map(|(idx, text)| {
            let line = idx + 1;
            parse_event(line, text).map(|event| ScriptLine { line, event })
        })
        .collect()
}

/// Convert a seconds count from config into a sweep grace period
pub fn grace_period(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// Applies events to one store through one surface
pub struct EventRunner {
    store: Arc<SessionStore>,
    intake: VoteIntake,
    surface: DynSurface,
    /// Set when the surface is the in-memory console, for reply capture
    console: Option<Arc<ConsoleSurface>>,
    policy: OverwritePolicy,
    grace: Duration,
}

impl EventRunner {
    /// Runner over an arbitrary surface
    pub fn new(surface: DynSurface, config: &VoteboxConfig) -> Self {
        let store = create_store();
        Self {
            intake: VoteIntake::new(Arc::clone(&store), Arc::clone(&surface)),
            store,
            surface,
            console: None,
            policy: config.overwrite_policy,
            grace: grace_period(config.sweep.grace_secs),
        }
    }

    /// Runner over a fresh console surface
    pub fn with_console(config: &VoteboxConfig) -> Self {
        let console = Arc::new(ConsoleSurface::new());
        let mut runner = Self::new(Arc::clone(&console) as DynSurface, config);
        runner.console = Some(console);
        runner
    }

    /// Session store the runner writes to
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Evict sessions past the grace period at `now`
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<String> {
        let swept = self.store.sweep_expired(now, self.grace);
        if !swept.is_empty() {
            info!(channels = ?swept, "Swept expired vote sessions");
        }
        swept
    }

    /// Apply one event at `now` and describe what happened
    pub async fn apply(&self, event: ReplayEvent, now: DateTime<Utc>) -> Value {
        debug!(?event, "Applying event");
        match event {
            ReplayEvent::Start {
                channel_id,
                entries,
                duration_secs,
                ..
            } => {
                let Some(duration) = Duration::try_seconds(duration_secs) else {
                    return json!({
                        "event": "start",
                        "channel_id": channel_id,
                        "error": format!("duration_secs out of range: {}", duration_secs),
                    });
                };
                let started = start_vote(
                    &self.store,
                    self.surface.as_ref(),
                    &channel_id,
                    entries,
                    duration,
                    self.policy,
                    now,
                )
                .await;
                match started {
                    Ok(session) => json!({
                        "event": "start",
                        "channel_id": channel_id,
                        "message_id": session.message_id,
                        "options": session.options.len(),
                        "expires_at": session.expires_at,
                    }),
                    Err(e) => json!({
                        "event": "start",
                        "channel_id": channel_id,
                        "error": e.to_string(),
                    }),
                }
            }
            ReplayEvent::Vote {
                channel_id,
                voter_id,
                custom_id,
                interaction_id,
                interaction_token,
                ..
            } => {
                let mut interaction = VoteInteraction::new(channel_id, voter_id, custom_id).at(now);
                if let Some(id) = interaction_id {
                    interaction.interaction_id = id;
                }
                if let Some(token) = interaction_token {
                    interaction.interaction_token = token;
                }

                let replies_before = self.console.as_ref().map(|c| c.replies().len());
                let outcome = self.intake.handle_interaction(&interaction).await;
                let reply = self
                    .console
                    .as_ref()
                    .zip(replies_before)
                    .and_then(|(c, before)| c.replies().into_iter().skip(before).last())
                    .map(|r| r.text);
                vote_record(&interaction, &outcome, reply)
            }
            ReplayEvent::End { channel_id } => {
                let summary = end_vote(&self.store, &channel_id);
                json!({
                    "event": "end",
                    "channel_id": channel_id,
                    "summary": summary,
                })
            }
            ReplayEvent::DeleteMessage { channel_id } => {
                let deleted = match (&self.console, self.store.get(&channel_id)) {
                    (Some(console), Some(session)) => console.delete_message(&session.message_id),
                    _ => false,
                };
                json!({
                    "event": "delete_message",
                    "channel_id": channel_id,
                    "deleted": deleted,
                })
            }
        }
    }
}

/// Replay a script, returning one JSON record per event
pub async fn run_replay(script: &str, config: &VoteboxConfig) -> Result<Vec<Value>, ReplayError> {
    let lines = parse_script(script)?;
    let runner = EventRunner::with_console(config);
    let base = Utc::now();
    let mut now = base;

    let mut records = Vec::with_capacity(lines.len());
    for ScriptLine { line, event } in lines {
        if let Some(at) = event.at() {
            now = offset(base, at).ok_or_else(|| out_of_range(line, "at", at))?;
        }
        if let ReplayEvent::Start { duration_secs, .. } = &event {
            if Duration::try_seconds(*duration_secs).is_none() {
                return Err(out_of_range(line, "duration_secs", *duration_secs));
            }
        }

        let swept = runner.sweep(now);
        let mut record = runner.apply(event, now).await;
        if let (false, Some(fields)) = (swept.is_empty(), record.as_object_mut()) {
            fields.insert("swept".to_string(), json!(swept));
        }
        records.push(record);
    }

    Ok(records)
}

/// Read and replay a script file
pub async fn run_replay_file(
    path: &Path,
    config: &VoteboxConfig,
) -> Result<Vec<Value>, ReplayError> {
    let script = tokio::fs::read_to_string(path).await?;
    run_replay(&script, config).await
}

fn offset(base: DateTime<Utc>, secs: i64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(secs).and_then(|delta| base.checked_add_signed(delta))
}

fn out_of_range(line: usize, field: &str, value: i64) -> ReplayError {
    ReplayError::Parse {
        line,
        message: format!("{} out of range: {}", field, value),
    }
}

fn vote_record(
    interaction: &VoteInteraction,
    outcome: &VoteOutcome,
    reply: Option<String>,
) -> Value {
    let mut record = json!({
        "event": "vote",
        "channel_id": interaction.channel_id,
        "voter_id": interaction.voter_id,
        "reply": reply,
    });

    let details = match outcome {
        VoteOutcome::Ignored => json!({ "status": "ignored" }),
        VoteOutcome::Recorded(receipt) => json!({
            "status": "recorded",
            "image_number": receipt.option.number,
            "votes": receipt.option.vote_count(),
        }),
        VoteOutcome::Rejected(err) => json!({
            "status": "rejected",
            "error": err.to_string(),
        }),
        VoteOutcome::DeliveryFailed { receipt, error } => json!({
            "status": "delivery_failed",
            "image_number": receipt.option.number,
            "votes": receipt.option.vote_count(),
            "error": error.to_string(),
        }),
    };

    if let (Some(record), Value::Object(details)) = (record.as_object_mut(), details) {
        record.extend(details);
    }
    record
}
