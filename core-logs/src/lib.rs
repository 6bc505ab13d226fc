//! # Log Stream Module
//!
//! Live tail of the server log over a push connection.
//!
//! - [`entry`]: record parsing and the buffered [`LogEntry`]
//! - [`buffer`]: append-only [`LogBuffer`], optionally capped
//! - [`client`]: [`LogStreamClient`], connection lifecycle and fixed-delay
//!   reconnection

pub mod buffer;
pub mod client;
pub mod entry;
pub mod error;

pub use buffer::LogBuffer;
pub use client::{LogStreamClient, LogStreamParams, LogStreamSnapshot, StreamState};
pub use entry::{parse_frame, InboundFrame, LogEntry, LogRecord};
pub use error::{LogStreamError, Result};
