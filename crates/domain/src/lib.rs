//! Wayfinder domain model.
//!
//! Pure data and logic shared by the engine: the merge-operator patch
//! language applied to JSON state documents, navigation helpers over world
//! and player-view documents, instance normalization and template merging,
//! GPS distance for zone anchoring, and version stamping.
//!
//! This crate performs no I/O and has no async surface.

pub mod document;
pub mod error;
pub mod geo;
pub mod instance;
pub mod patch;
pub mod version;

pub use document::{InstanceList, LocatedInstance};
pub use error::DomainError;
pub use patch::{Patch, PatchError};
pub use version::next_version;
