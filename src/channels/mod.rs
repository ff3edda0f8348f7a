//! Channels Module
//!
//! Platform surfaces that display vote tallies and reply to voters.

pub mod console;
pub mod discord;
pub mod surface;

pub use console::{ConsoleSurface, PrivateReply};
pub use discord::{DiscordChannel, DiscordConfig};
pub use surface::{ChannelError, ChannelResult, DynSurface, VoteSurface};
