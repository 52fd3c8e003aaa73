//! Configuration constants for the PolySolve host.
//!
//! This module centralizes error codes, capacity limits and request timeouts so
//! the dispatcher, the input validators and the numeric runtime agree on them.

pub mod errors;
pub mod limits;
pub mod timeouts;
