//! votebox library
//!
//! Time-boxed image votes scoped to a chat channel: a session store, the
//! vote button handler, tally rendering, and the surfaces (Discord, console)
//! that show the tally and acknowledge voters.

pub mod channels;
pub mod cli;
pub mod config;
pub mod logging;
pub mod polls;
