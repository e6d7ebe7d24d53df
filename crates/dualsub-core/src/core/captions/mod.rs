//! Caption System Module
//!
//! Bilingual caption segments from ingestion to lookup:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Caption System                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  models.rs     - Segment, style and view mode value types       │
//! │  transcript.rs - Collaborator JSON input                        │
//! │  store.rs      - Normalization and generation swap              │
//! │  locator.rs    - Active segment lookup, playback sessions       │
//! │  formats.rs    - Bilingual SRT/VTT export, SRT reparse          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod formats;
mod locator;
mod models;
mod store;
mod transcript;

pub use formats::{export_bilingual_vtt, export_srt, parse_bilingual_srt, ParseError};
pub use locator::{ActiveSegmentLocator, PlaybackSessions};
pub use models::{CaptionSegment, Color, StyleConfig, ViewMode};
pub use store::{normalize, SegmentStore, SharedSegmentStore, MIN_DURATION};
pub use transcript::{load_transcript, parse_transcript};
