//! Annotation state for the reviewer.
//!
//! This module contains:
//! - The canonical annotation model and its wire records
//! - Source document discovery and normalization
//! - The in-memory annotation store

mod types;
mod dataset;
mod store;

pub use types::*;
pub use dataset::*;
pub use store::*;
