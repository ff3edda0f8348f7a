//! Vote Intake
//!
//! Turns a voter's button press into a tally change. Every attempt is
//! resolved, checked for liveness and option validity, then applied as a
//! single clear-then-set under the store lock. The shared tally and the
//! voter's private acknowledgment are only sent after the lock is
//! released, and failures there never undo the counted vote.

use super::config::{VoteOption, VoteSession};
use super::render::{self, FAILURE_NOTICE};
use super::store::SessionStore;
use crate::channels::{ChannelError, DynSurface};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Action tag carried by vote buttons
pub const VOTE_ACTION: &str = "vote";

/// Inbound button press
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteInteraction {
    /// Platform interaction ID
    pub interaction_id: String,
    /// Token used to answer the interaction
    #[serde(default)]
    pub interaction_token: String,
    /// Channel the button was pressed in
    pub channel_id: String,
    /// Voter identity supplied by the platform
    pub voter_id: String,
    /// Raw button ID, e.g. `vote_2`
    pub custom_id: String,
    /// When the press was received
    pub received_at: DateTime<Utc>,
}

impl VoteInteraction {
    /// Create an interaction received now, with fresh IDs
    pub fn new(
        channel_id: impl Into<String>,
        voter_id: impl Into<String>,
        custom_id: impl Into<String>,
    ) -> Self {
        Self {
            interaction_id: Uuid::new_v4().to_string(),
            interaction_token: Uuid::new_v4().to_string(),
            channel_id: channel_id.into(),
            voter_id: voter_id.into(),
            custom_id: custom_id.into(),
            received_at: Utc::now(),
        }
    }

    /// Set the receive time
    pub fn at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }
}

/// What a button ID asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Vote for the option at this ordinal
    Vote(i64),
    /// Vote action with an unreadable ordinal, carrying the raw text
    Malformed(String),
    /// Some other action; not ours to handle
    Other,
}

/// Parse a button ID of the form `<action>_<ordinal>[_...]`.
///
/// Only the second `_`-separated segment is read, and only its leading
/// integer: `vote_1_x` and `vote_1.5` both select ordinal 1.
pub fn parse_selection(custom_id: &str) -> Selection {
    let mut parts = custom_id.split('_');
    if parts.next() != Some(VOTE_ACTION) {
        return Selection::Other;
    }

    let raw = parts.next().unwrap_or_default();
    match leading_integer(raw) {
        Some(ordinal) => Selection::Vote(ordinal),
        None => Selection::Malformed(raw.to_string()),
    }
}

/// Optional sign followed by digits at the start of `raw`, after whitespace
fn leading_integer(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let sign_len = usize::from(trimmed.starts_with(['+', '-']));
    let digits_len = trimmed[sign_len..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits_len == 0 {
        return None;
    }
    trimmed[..sign_len + digits_len].parse().ok()
}

/// Reasons a vote is refused before anything changes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntakeError {
    #[error("No vote session for channel {0}")]
    SessionNotFound(String),

    #[error("Vote session for channel {0} has ended")]
    SessionExpired(String),

    #[error("Invalid vote option: {0}")]
    InvalidOption(String),
}

impl IntakeError {
    /// Private notice shown to the voter
    pub fn notice(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) | Self::SessionExpired(_) => render::ENDED_NOTICE,
            Self::InvalidOption(_) => render::INVALID_OPTION_NOTICE,
        }
    }
}

/// Failures after the vote was counted
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Failed to update tally message: {0}")]
    Render(#[source] ChannelError),

    #[error("Failed to acknowledge vote: {0}")]
    Acknowledgment(#[source] ChannelError),
}

/// A counted vote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteReceipt {
    /// The chosen option after the vote
    pub option: VoteOption,
    /// The whole session after the vote
    pub session: VoteSession,
}

/// Result of handling one interaction
#[derive(Debug)]
pub enum VoteOutcome {
    /// Not a vote button
    Ignored,
    /// Vote counted, tally and acknowledgment delivered
    Recorded(VoteReceipt),
    /// Vote refused, nothing changed
    Rejected(IntakeError),
    /// Vote counted, but the tally or acknowledgment could not be delivered
    DeliveryFailed {
        receipt: VoteReceipt,
        error: DeliveryError,
    },
}

/// Handles vote button presses for every channel
pub struct VoteIntake {
    store: Arc<SessionStore>,
    surface: DynSurface,
}

impl VoteIntake {
    /// Create a handler over a store and a surface
    pub fn new(store: Arc<SessionStore>, surface: DynSurface) -> Self {
        Self { store, surface }
    }

    /// Session store this handler reads from
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Count a vote for `ordinal` in the channel's session.
    ///
    /// The voter is moved off whatever option it backed before. An expired
    /// session is left in the store.
    pub fn record_vote(
        &self,
        channel_id: &str,
        voter_id: &str,
        ordinal: i64,
        now: DateTime<Utc>,
    ) -> Result<VoteReceipt, IntakeError> {
        self.apply_vote(channel_id, voter_id, Some(ordinal), &ordinal.to_string(), now)
    }

    /// Checks run in order: session exists, session open, option valid.
    /// `ordinal` is `None` when the button ID could not be parsed; `raw` is
    /// the ordinal text reported in `InvalidOption`.
    fn apply_vote(
        &self,
        channel_id: &str,
        voter_id: &str,
        ordinal: Option<i64>,
        raw: &str,
        now: DateTime<Utc>,
    ) -> Result<VoteReceipt, IntakeError> {
        self.store
            .update(channel_id, |session| {
                if !session.is_open(now) {
                    return Err(IntakeError::SessionExpired(channel_id.to_string()));
                }

                let index = ordinal
                    .and_then(|o| usize::try_from(o).ok())
                    .filter(|idx| *idx < session.options.len())
                    .ok_or_else(|| IntakeError::InvalidOption(raw.to_string()))?;

                let option = session
                    .cast(voter_id, index)
                    .cloned()
                    .ok_or_else(|| IntakeError::InvalidOption(raw.to_string()))?;

                Ok(VoteReceipt {
                    option,
                    session: session.clone(),
                })
            })
            .unwrap_or_else(|| Err(IntakeError::SessionNotFound(channel_id.to_string())))
    }

    /// Handle a button press end to end. Never returns an error: every
    /// failure is logged and reported to the voter privately.
    pub async fn handle_interaction(&self, interaction: &VoteInteraction) -> VoteOutcome {
        info!(voter_id = %interaction.voter_id, "Vote button clicked");

        let (ordinal, raw) = match parse_selection(&interaction.custom_id) {
            Selection::Other => return VoteOutcome::Ignored,
            Selection::Malformed(raw) => (None, raw),
            Selection::Vote(ordinal) => (Some(ordinal), ordinal.to_string()),
        };

        let receipt = match self.apply_vote(
            &interaction.channel_id,
            &interaction.voter_id,
            ordinal,
            &raw,
            interaction.received_at,
        ) {
            Ok(receipt) => receipt,
            Err(err) => return self.reject(interaction, err).await,
        };

        match self.publish(interaction, &receipt).await {
            Ok(()) => {
                info!(
                    voter_id = %interaction.voter_id,
                    channel_id = %interaction.channel_id,
                    image_number = receipt.option.number,
                    vote_count = receipt.option.vote_count(),
                    "Vote recorded and display updated"
                );
                VoteOutcome::Recorded(receipt)
            }
            Err(err) => {
                error!(
                    voter_id = %interaction.voter_id,
                    channel_id = %interaction.channel_id,
                    error = %err,
                    "Error handling vote button"
                );
                self.notify(interaction, FAILURE_NOTICE).await;
                VoteOutcome::DeliveryFailed {
                    receipt,
                    error: err,
                }
            }
        }
    }

    /// Refresh the shared tally, then acknowledge privately
    async fn publish(
        &self,
        interaction: &VoteInteraction,
        receipt: &VoteReceipt,
    ) -> Result<(), DeliveryError> {
        let embed = render::render_tally(&receipt.session);
        self.surface
            .edit_tally(&interaction.channel_id, &receipt.session.message_id, &embed)
            .await
            .map_err(DeliveryError::Render)?;

        self.surface
            .reply_private(interaction, &render::acknowledgment(&receipt.option))
            .await
            .map_err(DeliveryError::Acknowledgment)
    }

    async fn reject(&self, interaction: &VoteInteraction, err: IntakeError) -> VoteOutcome {
        info!(
            voter_id = %interaction.voter_id,
            channel_id = %interaction.channel_id,
            reason = %err,
            "Vote rejected"
        );
        self.notify(interaction, err.notice()).await;
        VoteOutcome::Rejected(err)
    }

    /// Best-effort private notice
    async fn notify(&self, interaction: &VoteInteraction, text: &str) {
        if let Err(e) = self.surface.reply_private(interaction, text).await {
            warn!(
                voter_id = %interaction.voter_id,
                error = %e,
                "Failed to send private notice"
            );
        }
    }
}
