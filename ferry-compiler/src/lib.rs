//! Ferry Compiler
//!
//! Turns a pipeline document and a build number into the manifests of one run:
//! a config map with one pod per stage, a secret with the rsync keypair and the
//! control pod that drives the run.
//!
//! The intended order is [`defaults::apply_defaults`], then
//! [`validate::validate`], then [`compile::compile`]. Each step is a pure
//! function of its input and can be used on its own.

pub mod compile;
pub mod defaults;
pub mod keys;
pub mod validate;

pub use compile::{CompileError, CompiledRun, Compiler, compile, compile_with_keys};
pub use defaults::{Change, Defaulted, apply_defaults};
pub use keys::{KeyError, KeyPair};
pub use validate::{ValidationError, validate};
