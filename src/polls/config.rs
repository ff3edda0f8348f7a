//! Vote Session Configuration
//!
//! Data model for image vote sessions: the selectable options, the
//! session that owns them, and the policy applied when a channel that
//! already has a session is asked to start another one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Keycap glyphs used as option labels, in ordinal order
pub const KEYCAP_GLYPHS: [&str; 9] = [
    "1\u{fe0f}\u{20e3}",
    "2\u{fe0f}\u{20e3}",
    "3\u{fe0f}\u{20e3}",
    "4\u{fe0f}\u{20e3}",
    "5\u{fe0f}\u{20e3}",
    "6\u{fe0f}\u{20e3}",
    "7\u{fe0f}\u{20e3}",
    "8\u{fe0f}\u{20e3}",
    "9\u{fe0f}\u{20e3}",
];

/// Maximum number of options in one session (one per keycap glyph)
pub const MAX_OPTIONS: usize = KEYCAP_GLYPHS.len();

/// Title of the shared tally message
pub const DEFAULT_TITLE: &str = "\u{1f5f3}\u{fe0f} Vote for your favorite image!";

/// An image submitted to a vote, before it becomes an option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteEntry {
    /// Where the image lives (never fetched by the vote core)
    pub image_url: String,
    /// Prompt the image was generated from
    pub prompt: String,
    /// Caption to publish alongside the winner
    #[serde(default)]
    pub caption: String,
}

impl VoteEntry {
    /// Create a new entry
    pub fn new(image_url: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            image_url: image_url.into(),
            prompt: prompt.into(),
            caption: String::new(),
        }
    }

    /// Set caption
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self
    }
}

/// One selectable option inside a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOption {
    /// Position in the session (0-based, used as the selection key)
    pub ordinal: usize,
    /// Human-facing label, `ordinal + 1` by convention
    pub number: u32,
    /// Reference to the image being voted on
    pub image_url: String,
    /// Prompt text shown under the option
    pub prompt: String,
    /// Caption text
    #[serde(default)]
    pub caption: String,
    /// Voters currently backing this option
    #[serde(default)]
    pub voters: HashSet<String>,
}

impl VoteOption {
    /// Build the option at `ordinal` from a submitted entry
    pub fn from_entry(ordinal: usize, entry: VoteEntry) -> Self {
        Self {
            ordinal,
            number: ordinal as u32 + 1,
            image_url: entry.image_url,
            prompt: entry.prompt,
            caption: entry.caption,
            voters: HashSet::new(),
        }
    }

    /// Number of voters backing this option
    pub fn vote_count(&self) -> usize {
        self.voters.len()
    }

    /// Label glyph for this option, if it has one
    pub fn glyph(&self) -> Option<&'static str> {
        KEYCAP_GLYPHS.get(self.ordinal).copied()
    }
}

/// An active, time-boxed vote scoped to a single channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSession {
    /// Title rendered at the top of the shared message
    #[serde(default = "default_title")]
    pub title: String,
    /// Options, fixed at creation
    pub options: Vec<VoteOption>,
    /// Voting is open up to and including this instant
    pub expires_at: DateTime<Utc>,
    /// Shared message the tally is rendered into
    pub message_id: String,
    /// Slideshow position (unused by voting)
    #[serde(default)]
    pub cursor: usize,
    /// When the session was created
    pub created_at: DateTime<Utc>,
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

impl VoteSession {
    /// Create a session from submitted entries, numbering them in order
    pub fn new(
        entries: Vec<VoteEntry>,
        expires_at: DateTime<Utc>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            title: default_title(),
            options: entries
                .into_iter()
                .enumerate()
                .map(|(ordinal, entry)| VoteOption::from_entry(ordinal, entry))
                .collect(),
            expires_at,
            message_id: message_id.into(),
            cursor: 0,
            created_at: Utc::now(),
        }
    }

    /// Set title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the shared message id
    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = message_id.into();
        self
    }

    /// Whether voting is still open at `now` (expiry instant is inclusive)
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }

    /// Look up an option by a raw, possibly negative ordinal
    pub fn option(&self, ordinal: i64) -> Option<&VoteOption> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|idx| self.options.get(idx))
    }

    /// Ordinal of the option the voter currently backs
    pub fn choice_of(&self, voter_id: &str) -> Option<usize> {
        self.options
            .iter()
            .position(|o| o.voters.contains(voter_id))
    }

    /// Move the voter onto the option at `ordinal`.
    ///
    /// Clears the voter from every option before adding it to the target,
    /// so a voter never backs more than one option. Returns `None` without
    /// touching any voter set when `ordinal` is out of range.
    pub fn cast(&mut self, voter_id: &str, ordinal: usize) -> Option<&VoteOption> {
        if ordinal >= self.options.len() {
            return None;
        }

        for option in &mut self.options {
            option.voters.remove(voter_id);
        }

        let target = &mut self.options[ordinal];
        target.voters.insert(voter_id.to_string());
        Some(&*target)
    }

    /// Total voters across all options
    pub fn total_votes(&self) -> usize {
        self.options.iter().map(VoteOption::vote_count).sum()
    }

    /// Validate the session shape
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Vote title is required".to_string());
        }
        if self.options.is_empty() {
            return Err("Vote must have at least 1 option".to_string());
        }
        if self.options.len() > MAX_OPTIONS {
            return Err(format!(
                "Vote cannot have more than {} options",
                MAX_OPTIONS
            ));
        }
        for (idx, option) in self.options.iter().enumerate() {
            if option.ordinal != idx {
                return Err(format!(
                    "Option at position {} has ordinal {}",
                    idx, option.ordinal
                ));
            }
        }
        Ok(())
    }
}

/// What to do when a channel already has a session and a new one starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    /// Silently replace the existing session
    #[default]
    Replace,
    /// Replace the existing session and log a warning
    Warn,
    /// Refuse while the existing session is still open
    Reject,
}

impl fmt::Display for OverwritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replace => write!(f, "replace"),
            Self::Warn => write!(f, "warn"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

impl FromStr for OverwritePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "warn" => Ok(Self::Warn),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown overwrite policy: {}", other)),
        }
    }
}
