//! Ferry Core
//!
//! Core types and conventions shared by every Ferry component.
//!
//! This crate contains:
//! - Domain types: the Pipeline document, typed stage annotations, container states
//! - Protocol: annotation keys, container names, mount paths and semaphore names
//!   that the compiler writes into manifests and the runtime tools rely on
//! - DTOs: query types of the status aggregator HTTP surface

pub mod domain;
pub mod dto;
pub mod protocol;
