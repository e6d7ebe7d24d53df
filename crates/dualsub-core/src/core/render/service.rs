//! Export Service
//!
//! Front door for burn-in exports. Answers repeated requests from the export
//! cache, allows one running job at a time and wires probe, codec selection,
//! capture and encoding together for everything else.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::Sender;
use tracing::{info, warn};

use super::cache::{
    compute_fingerprint, suggested_file_name, CacheStats, ExportCache, ExportCacheEntry,
    SourceIdentity,
};
use super::caption::CaptionRenderer;
use super::codec::{select_codec, ExportFormat};
use super::export::{
    compute_target_dimensions, CancellationFlag, ExportEncoder, ExportJob, ExportOutcome,
    ExportProgress, ExportStatus, FrameClock, ImmediateClock, IntervalClock,
};
use super::graph::{CaptureBackend, CapturePlan, CaptureSession, CAPTURE_FPS};
use crate::core::captions::{SegmentStore, StyleConfig, ViewMode};
use crate::core::{CoreError, CoreResult, Dimensions};

/// Encoding parameters shared by every export
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExportLimits {
    pub video_bitrate: u64,
    pub audio_bitrate: u64,
    pub max_dimensions: Dimensions,
    /// Pace frames at the capture rate instead of running flat out
    pub realtime: bool,
}

impl Default for ExportLimits {
    fn default() -> Self {
        Self {
            video_bitrate: 5_000_000,
            audio_bitrate: 192_000,
            max_dimensions: Dimensions::new(1920, 1080),
            realtime: false,
        }
    }
}

/// What to burn in, and into which format
#[derive(Clone, Debug)]
pub struct ExportRequest {
    pub source: PathBuf,
    pub segments: Arc<SegmentStore>,
    pub style: StyleConfig,
    pub view_mode: ViewMode,
    pub format: ExportFormat,
}

#[derive(Clone, Debug)]
pub enum ExportResponse {
    Ready {
        entry: ExportCacheEntry,
        /// Served from the cache without encoding
        from_cache: bool,
    },
    Cancelled,
}

/// Clears the active-job slot when the export ends, however it ends
struct ActiveSlot<'a> {
    slot: &'a Mutex<Option<CancellationFlag>>,
}

impl Drop for ActiveSlot<'_> {
    fn drop(&mut self) {
        if let Ok(mut active) = self.slot.lock() {
            *active = None;
        }
    }
}

pub struct ExportService<B: CaptureBackend> {
    backend: B,
    renderer: CaptionRenderer,
    limits: ExportLimits,
    cache: ExportCache,
    active: Mutex<Option<CancellationFlag>>,
}

impl<B: CaptureBackend> ExportService<B> {
    pub fn new(backend: B, renderer: CaptionRenderer, limits: ExportLimits) -> Self {
        Self {
            backend,
            renderer,
            limits,
            cache: ExportCache::new(),
            active: Mutex::new(None),
        }
    }

    pub fn limits(&self) -> &ExportLimits {
        &self.limits
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub fn is_busy(&self) -> bool {
        self.active.lock().map(|a| a.is_some()).unwrap_or(false)
    }

    /// Requests cooperative cancellation of the running export
    ///
    /// Returns `false` when nothing is running.
    pub fn cancel_active(&self) -> bool {
        match self.active.lock() {
            Ok(active) => match active.as_ref() {
                Some(flag) => {
                    info!("Cancelling active export");
                    flag.cancel();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Produces the burned-in video for `request`
    pub async fn export(
        &self,
        request: &ExportRequest,
        progress: Option<Sender<ExportProgress>>,
    ) -> CoreResult<ExportResponse> {
        let identity = SourceIdentity::from_path(&request.source).map_err(|e| {
            CoreError::InvalidInput(format!("cannot read {}: {}", request.source.display(), e))
        })?;
        let fingerprint = compute_fingerprint(
            &identity,
            request.segments.segments(),
            request.view_mode,
            &request.style,
            request.format,
        )?;

        if let Some(entry) = self.cache.get(&fingerprint).await {
            info!("Serving cached export {}", entry.suggested_file_name);
            return Ok(ExportResponse::Ready {
                entry,
                from_cache: true,
            });
        }

        let cancel = CancellationFlag::new();
        let _slot = self.claim(cancel.clone())?;

        let mut job = ExportJob::new(
            fingerprint,
            request.format,
            self.limits.video_bitrate,
            self.limits.audio_bitrate,
        );
        job.transition(ExportStatus::Preparing)?;

        let (plan, session) = match self.prepare(&mut job, request).await {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!("Export {} failed while preparing: {}", job.id, e);
                job.transition(ExportStatus::Failed)?;
                return Err(e);
            }
        };

        let clock: Box<dyn FrameClock> = if self.limits.realtime {
            Box::new(IntervalClock::new(session.source.frame_rate()))
        } else {
            Box::new(ImmediateClock)
        };
        let mut encoder = ExportEncoder::new(
            self.renderer.clone(),
            request.segments.clone(),
            request.style,
            request.view_mode,
            clock,
            cancel,
        );
        if let Some(tx) = progress {
            encoder = encoder.with_progress(tx);
        }

        match encoder.run(&mut job, &plan, session).await? {
            ExportOutcome::Completed(artifact) => {
                let entry = ExportCacheEntry {
                    fingerprint: job.fingerprint.clone(),
                    artifact_bytes: artifact.bytes,
                    suggested_file_name: suggested_file_name(&request.source, artifact.extension),
                    mime: artifact.mime,
                };
                self.cache.put(entry.clone()).await;
                Ok(ExportResponse::Ready {
                    entry,
                    from_cache: false,
                })
            }
            ExportOutcome::Cancelled => Ok(ExportResponse::Cancelled),
        }
    }

    fn claim(&self, flag: CancellationFlag) -> CoreResult<ActiveSlot<'_>> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| CoreError::Internal("export slot poisoned".to_string()))?;
        if active.is_some() {
            return Err(CoreError::ExportInProgress);
        }
        *active = Some(flag);
        Ok(ActiveSlot { slot: &self.active })
    }

    async fn prepare(
        &self,
        job: &mut ExportJob,
        request: &ExportRequest,
    ) -> CoreResult<(CapturePlan, CaptureSession)> {
        let media = self.backend.probe(&request.source).await?;
        let source_dims = media.video_dimensions().ok_or_else(|| {
            CoreError::Capability(format!("{} has no video stream", request.source.display()))
        })?;
        let dimensions = compute_target_dimensions(source_dims, self.limits.max_dimensions);
        job.set_target(dimensions);

        let capabilities = self.backend.capabilities().await?;
        let codec = select_codec(request.format, &capabilities, media.has_audio())?;

        let plan = CapturePlan {
            source: request.source.clone(),
            dimensions,
            fps: CAPTURE_FPS,
            include_audio: media.has_audio(),
            codec,
            video_bitrate: self.limits.video_bitrate,
            audio_bitrate: self.limits.audio_bitrate,
            duration: media.duration_sec,
        };

        let session = self.backend.open(&plan).await?;
        Ok((plan, session))
    }
}

// =============================================================================
// Tests
// =============================================================================
