//! FFmpeg Integration Module
//!
//! Locates the system `ffmpeg`/`ffprobe` pair, probes sources, and reports
//! which encoders and muxers the installed build offers. The burn-in pipeline
//! in `core::render::graph` spawns its decode/encode processes from the paths
//! resolved here.

mod detection;
mod runner;
mod state;

pub use detection::*;
pub use runner::{AudioStreamInfo, FFmpegCapabilities, FFmpegRunner, MediaInfo, VideoStreamInfo};
pub use state::{create_ffmpeg_state, FFmpegState, SharedFFmpegState};

/// FFmpeg-related error types
#[derive(Debug, thiserror::Error)]
pub enum FFmpegError {
    #[error("FFmpeg not found. Install FFmpeg or point DUALSUB_FFMPEG_DIR at its bin directory.")]
    NotFound,

    #[error("FFmpeg execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Invalid input file: {0}")]
    InvalidInput(String),

    #[error("FFprobe error: {0}")]
    ProbeError(String),

    #[error("Process error: {0}")]
    ProcessError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),
}

pub type FFmpegResult<T> = Result<T, FFmpegError>;
