//! dualsub Core Engine
//!
//! Caption storage, playback lookup, frame rendering, and burn-in export.

pub mod captions;
pub mod ffmpeg;
pub mod fs;
pub mod render;
pub mod settings;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;
