//! Command channel
//!
//! Rows inserted into the `commands` table land in an append-only log.
//! Exactly one consumer drains it in insertion order; every command is
//! marked consumed before it is dispatched and is never retried, whether it
//! succeeds, fails or cannot be parsed.

mod consumer;
mod log;
mod parse;

pub use consumer::CommandConsumer;
pub use log::{CommandCursor, CommandEntry, CommandLog, CommandOutcome, DEFAULT_LOG_CAPACITY};
pub use parse::Command;

#[cfg(test)]
mod tests;
