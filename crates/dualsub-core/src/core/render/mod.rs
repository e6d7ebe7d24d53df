//! Render Pipeline Module
//!
//! Burns captions into video frames and exports the result.
//!
//! # Modules
//!
//! - `frame`, `text`, `layout`, `caption`: caption layout and compositing
//! - `codec`: output format negotiation
//! - `graph`: capture graph (decode → draw → encode)
//! - `export`: export job state machine and draw loop
//! - `cache`: single-slot export cache
//! - `service`: request handling on top of all of the above

mod cache;
mod caption;
pub(crate) mod codec;
pub(crate) mod export;
mod frame;
pub(crate) mod graph;
mod layout;
mod service;
pub(crate) mod text;

pub use cache::{
    compute_fingerprint, suggested_file_name, CacheStats, ExportCache, ExportCacheEntry,
    SourceIdentity,
};
pub use caption::{CaptionLayer, CaptionRenderer, RenderedCaption, RenderedLayer};
pub use codec::{select_codec, CodecCandidate, CodecSupport, ExportFormat};
pub use export::{
    compute_target_dimensions, CancellationFlag, EtaEstimator, ExportArtifact, ExportEncoder,
    ExportJob, ExportOutcome, ExportProgress, ExportStatus, FrameClock, ImmediateClock,
    IntervalClock,
};
pub use frame::Frame;
pub use graph::{
    CaptureBackend, CaptureGraphBuilder, CapturePlan, CaptureSession, FrameSink, FrameSource,
    CAPTURE_FPS,
};
pub use layout::{LayerLayout, TextLine};
pub use service::{ExportLimits, ExportRequest, ExportResponse, ExportService};
pub use text::{FontSet, FontFace, FontdueFace, Glyph};
