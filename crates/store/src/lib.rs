//! Persisted storage for entity collections.
//!
//! Implements [`orchestration::EntityStore`] twice:
//!
//! - [`JsonDirStore`] keeps one pretty-printed JSON array per entity in a
//!   backup directory (`<dir>/<entity>.json`). This is the on-disk backup
//!   format.
//! - [`MemoryStore`] keeps collections in memory, for tests and dry runs.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** File layout, atomic replacement and JSON encoding live
//! here. The [`orchestration`] crate sees only
//! [`orchestration::EntityStore`].

mod json_dir;
mod memory;

pub use json_dir::JsonDirStore;
pub use memory::MemoryStore;
