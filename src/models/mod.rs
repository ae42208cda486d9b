//! Core data models for the ephemeral encrypted store.
//!
//! These describe what the index remembers about each stored object, the
//! expiration tiers a client can choose from, and the shape of an upload once
//! the request boundary has classified it.

pub mod object;
pub mod policy;
pub mod upload;
