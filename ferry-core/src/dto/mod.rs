//! Data Transfer Objects
//!
//! Types exchanged over the status aggregator's HTTP surface.

pub mod status;
