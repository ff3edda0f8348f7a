//! Vote Surface Trait
//!
//! Defines the interface a messaging platform implements so votes can be
//! displayed and acknowledged: posting and editing the shared tally
//! message, and replying privately to a voter.

use crate::polls::intake::VoteInteraction;
use crate::polls::render::TallyEmbed;
use async_trait::async_trait;
use std::sync::Arc;

/// Result type for surface operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors that can occur while talking to the platform
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Rate limited: retry after {0}s")]
    RateLimited(u64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Platform-facing side of a vote
#[async_trait]
pub trait VoteSurface: Send + Sync {
    /// Post a new tally message with one vote button per option.
    /// Returns the new message ID.
    async fn post_tally(
        &self,
        channel_id: &str,
        embed: &TallyEmbed,
        option_count: usize,
    ) -> ChannelResult<String>;

    /// Replace the contents of an existing tally message in place
    async fn edit_tally(
        &self,
        channel_id: &str,
        message_id: &str,
        embed: &TallyEmbed,
    ) -> ChannelResult<()>;

    /// Send a message only the interacting voter can see
    async fn reply_private(&self, interaction: &VoteInteraction, text: &str)
        -> ChannelResult<()>;
}

/// Type-erased surface for sharing
pub type DynSurface = Arc<dyn VoteSurface>;
