//! Review and correction engine for parking-slot keypoint annotations.
//!
//! The crate is organised the way the data flows:
//! - `state` - annotation model, source-document normalization and the store
//! - `transform` - storage/display coordinate conversion
//! - `editing` - pointer-driven selection/drag/edit state machine
//! - `export` - review file, session state and per-folder document merge
//!
//! Rendering and input plumbing belong to the host; it talks to the core
//! through [`editing::HostView`].

pub mod config;
pub mod editing;
pub mod error;
pub mod export;
pub mod state;
pub mod transform;
pub mod utils;

pub use error::{AnnotatorError, Result};
