//! Workspace umbrella crate.
//!
//! Re-exports the core service façade so host applications depend on one
//! crate and pick bridges through features (`desktop-shims` by default).

pub use core_service::*;
