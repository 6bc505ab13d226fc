//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the media and log cores:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! Every other core crate depends on this one for its configuration type,
//! its logging conventions and the broadcast channel used to publish state
//! changes to the presentation layer.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
