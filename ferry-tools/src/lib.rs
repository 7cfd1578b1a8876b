//! Ferry Tools
//!
//! The helpers the tool installer copies into every stage pod:
//! - `ferry-resource` wraps a resource script and feeds it its input document
//! - `ferry-watch` releases the output resources once the stage's steps completed
//!
//! Both coordinate with the other containers of the pod only through
//! semaphore files in the shared semaphore volume.

pub mod debug_dump;
pub mod env_doc;
pub mod env_file;
pub mod markers;
pub mod watcher;
pub mod wrapper;

pub use env_doc::{EnvDocError, env_to_document, env_to_json};
pub use markers::{FsMarkers, MarkerStore};
pub use watcher::{WatchConfig, WatchError, watch};
pub use wrapper::{Phase, ResourceWrapper, WrapperConfig, WrapperError};
