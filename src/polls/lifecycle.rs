//! Vote lifecycle
//!
//! Starting a vote (post the tally message, register the session) and
//! ending one (remove the session, summarise the result).

use super::config::{OverwritePolicy, VoteEntry, VoteSession};
use super::render::render_tally;
use super::store::{SessionStore, StoreError};
use crate::channels::{ChannelError, VoteSurface};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Errors starting a vote
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to post vote message: {0}")]
    Channel(#[from] ChannelError),
}

/// Final count for one option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionTally {
    pub number: u32,
    pub image_url: String,
    pub caption: String,
    pub votes: usize,
}

/// Result of an ended vote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSummary {
    pub channel_id: String,
    pub total_votes: usize,
    pub options: Vec<OptionTally>,
    /// Numbers of the leading options; empty when nobody voted
    pub winners: Vec<u32>,
}

impl VoteSummary {
    /// Summarise a session's current tally
    pub fn from_session(channel_id: impl Into<String>, session: &VoteSession) -> Self {
        let options: Vec<OptionTally> = session
            .options
            .iter()
            .map(|o| OptionTally {
                number: o.number,
                image_url: o.image_url.clone(),
                caption: o.caption.clone(),
                votes: o.vote_count(),
            })
            .collect();

        let top = options.iter().map(|o| o.votes).max().unwrap_or(0);
        let winners = if top == 0 {
            Vec::new()
        } else {
            options
                .iter()
                .filter(|o| o.votes == top)
                .map(|o| o.number)
                .collect()
        };

        Self {
            channel_id: channel_id.into(),
            total_votes: session.total_votes(),
            options,
            winners,
        }
    }
}

/// Post a fresh tally message and register the session for the channel
pub async fn start_vote(
    store: &SessionStore,
    surface: &dyn VoteSurface,
    channel_id: &str,
    entries: Vec<VoteEntry>,
    duration: Duration,
    policy: OverwritePolicy,
    now: DateTime<Utc>,
) -> Result<VoteSession, StartError> {
    if duration <= Duration::zero() {
        return Err(StoreError::InvalidSession("vote duration must be positive".to_string()).into());
    }
    let expires_at = now
        .checked_add_signed(duration)
        .ok_or_else(|| StoreError::InvalidSession("vote duration is out of range".to_string()))?;

    let mut session = VoteSession::new(entries, expires_at, String::new());
    session.created_at = now;
    session.validate().map_err(StoreError::InvalidSession)?;

    // Refuse before posting so a rejected vote leaves no orphan message
    store.check_start(channel_id, policy, now)?;

    let message_id = surface
        .post_tally(channel_id, &render_tally(&session), session.options.len())
        .await?;
    session.message_id = message_id;

    store.start_session(channel_id, session.clone(), policy, now)?;

    info!(
        channel_id = %channel_id,
        message_id = %session.message_id,
        options = session.options.len(),
        expires_at = %session.expires_at,
        "Vote started"
    );
    Ok(session)
}

/// Remove the channel's session and summarise it
pub fn end_vote(store: &SessionStore, channel_id: &str) -> Option<VoteSummary> {
    let session = store.remove(channel_id)?;
    let summary = VoteSummary::from_session(channel_id, &session);
    info!(
        channel_id = %channel_id,
        total_votes = summary.total_votes,
        winners = ?summary.winners,
        "Vote ended"
    );
    Some(summary)
}
