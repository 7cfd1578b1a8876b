//! Core domain types
//!
//! The pipeline document as users write it, the typed view of the annotations
//! carried by its stage templates, and the container state model used by the
//! status aggregator.

pub mod annotations;
pub mod pipeline;
pub mod status;
