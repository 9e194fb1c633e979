//! VeilMesh Core Types
//!
//! This crate defines the fundamental data structures shared across the
//! VeilMesh overlay: node identifiers, wire frames, onion layer types,
//! configuration, and errors.

mod config;
mod error;
mod frame;
mod onion;
mod types;

pub use config::*;
pub use error::*;
pub use frame::*;
pub use onion::*;
pub use types::*;
