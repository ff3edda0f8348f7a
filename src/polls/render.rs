//! Tally rendering
//!
//! Builds the platform-neutral payload for the shared tally message and
//! the texts of the private notices sent to voters.

use super::config::{VoteOption, VoteSession};
use serde::{Deserialize, Serialize};

/// Accent colour of the tally embed
pub const TALLY_COLOR: u32 = 0x00acee;

/// Notice sent when the session is missing or expired
pub const ENDED_NOTICE: &str = "This vote has ended.";

/// Notice sent for an out-of-range or malformed option
pub const INVALID_OPTION_NOTICE: &str = "Invalid vote option.";

/// Notice sent when rendering or acknowledging fails after the vote counted
pub const FAILURE_NOTICE: &str = "An error occurred while processing your vote.";

/// One labelled line of the tally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
}

/// Rendered tally for the shared message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyEmbed {
    pub title: String,
    /// Countdown line plus the call to action
    pub description: String,
    pub color: u32,
    pub fields: Vec<EmbedField>,
}

/// Render the current tally of a session
pub fn render_tally(session: &VoteSession) -> TallyEmbed {
    TallyEmbed {
        title: session.title.clone(),
        description: format!(
            "Voting ends <t:{}:R>\nThe winning image will be tweeted! \u{1f426}",
            session.expires_at.timestamp()
        ),
        color: TALLY_COLOR,
        fields: session.options.iter().map(option_field).collect(),
    }
}

fn option_field(option: &VoteOption) -> EmbedField {
    let label = option.glyph().unwrap_or("\u{25aa}\u{fe0f}");
    EmbedField {
        name: format!(
            "{} Image {} ({} votes)",
            label,
            option.number,
            option.vote_count()
        ),
        value: format!("Prompt: {}", option.prompt),
    }
}

/// Private acknowledgment for a counted vote
pub fn acknowledgment(option: &VoteOption) -> String {
    format!(
        "You voted for Image {}! Current votes: {}",
        option.number,
        option.vote_count()
    )
}
