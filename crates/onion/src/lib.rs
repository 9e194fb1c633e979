//! Multi-hop onion wrapping and peeling.
//!
//! A message is encrypted once per relay hop plus once for the destination,
//! innermost first. Each node on the path peels exactly one layer, learning
//! only its immediate predecessor and the next hop. The router also tracks
//! the relay registry and the table of active circuits.

mod circuit;
mod router;

pub use circuit::{Circuit, CircuitStatus};
pub use router::{OnionError, OnionRouter, OnionStep, WrappedOnion};
