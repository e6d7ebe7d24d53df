//! FFmpeg shared state
//!
//! Lazily detected runner plus cached capability table, shared by every
//! export started from the same process.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use super::{detect_ffmpeg, FFmpegCapabilities, FFmpegResult, FFmpegRunner};

/// Detected FFmpeg runner and its capabilities
#[derive(Default)]
pub struct FFmpegState {
    runner: Option<FFmpegRunner>,
    capabilities: Option<FFmpegCapabilities>,
}

impl FFmpegState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detects FFmpeg and queries its encoders/muxers
    pub async fn initialize(&mut self, preferred_dir: Option<&Path>) -> FFmpegResult<()> {
        let runner = FFmpegRunner::new(detect_ffmpeg(preferred_dir)?);
        let capabilities = runner.capabilities().await?;
        info!(
            "FFmpeg {} ready ({} encoders)",
            runner.info().version,
            capabilities.encoders.len()
        );
        self.runner = Some(runner);
        self.capabilities = Some(capabilities);
        Ok(())
    }

    pub fn runner(&self) -> Option<&FFmpegRunner> {
        self.runner.as_ref()
    }

    pub fn capabilities(&self) -> Option<&FFmpegCapabilities> {
        self.capabilities.as_ref()
    }

    pub fn is_available(&self) -> bool {
        self.runner.is_some()
    }
}

/// Shared FFmpeg state for the async runtime.
pub type SharedFFmpegState = Arc<RwLock<FFmpegState>>;

pub fn create_ffmpeg_state() -> SharedFFmpegState {
    Arc::new(RwLock::new(FFmpegState::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fresh_state_is_unavailable() {
        let state = create_ffmpeg_state();
        let guard = state.read().await;
        assert!(!guard.is_available());
        assert!(guard.runner().is_none());
        assert!(guard.capabilities().is_none());
    }
}
