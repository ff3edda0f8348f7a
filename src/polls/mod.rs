//! Polling Module
//!
//! Time-boxed image votes scoped to a channel: the session store, the
//! intake handler for vote buttons, tally rendering, and start/end of a
//! vote.

pub mod config;
pub mod intake;
pub mod lifecycle;
pub mod render;
pub mod store;

pub use config::{OverwritePolicy, VoteEntry, VoteOption, VoteSession, KEYCAP_GLYPHS, MAX_OPTIONS};
pub use intake::{
    parse_selection, DeliveryError, IntakeError, Selection, VoteIntake, VoteInteraction,
    VoteOutcome, VoteReceipt,
};
pub use lifecycle::{end_vote, start_vote, OptionTally, StartError, VoteSummary};
pub use render::{render_tally, EmbedField, TallyEmbed};
pub use store::{create_store, spawn_sweeper, SessionStore, StoreError};
