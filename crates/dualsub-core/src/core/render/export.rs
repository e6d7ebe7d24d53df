//! Export Encoder
//!
//! Drives one burn-in export through its state machine:
//!
//! ```text
//! Idle ─▶ Preparing ─▶ Recording ─▶ Finalizing ─▶ Completed
//!            │             │             │
//!            ├─────────────┴─────────────┴──▶ Failed
//!            └─────────────┴──────────────▶ Cancelled
//! ```
//!
//! Recording pulls frames from the capture session, draws the caption active
//! at each frame's source time and hands the frame to the encoder. Every exit
//! path releases the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::caption::CaptionRenderer;
use super::codec::ExportFormat;
use super::frame::Frame;
use super::graph::{CapturePlan, CaptureSession};
use crate::core::captions::{ActiveSegmentLocator, SegmentStore, StyleConfig, ViewMode};
use crate::core::{CoreError, CoreResult, Dimensions, Fingerprint, JobId, TimeSec};

/// Recording stops once the source time is within this distance of the end
pub const END_EPSILON: TimeSec = 1e-3;
/// No ETA is reported until progress passes this percentage
pub const ETA_MIN_PERCENT: f64 = 2.0;
/// Reported ETA changes only when the new estimate differs by more than this
pub const ETA_HYSTERESIS_SEC: f64 = 0.5;

// =============================================================================
// Job State
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    #[default]
    Idle,
    Preparing,
    Recording,
    Finalizing,
    Completed,
    Failed,
    Cancelled,
}

impl ExportStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn can_transition_to(self, next: ExportStatus) -> bool {
        use ExportStatus::*;
        matches!(
            (self, next),
            (Idle, Preparing)
                | (Preparing, Recording)
                | (Preparing, Failed)
                | (Preparing, Cancelled)
                | (Recording, Finalizing)
                | (Recording, Failed)
                | (Recording, Cancelled)
                | (Finalizing, Completed)
                | (Finalizing, Failed)
        )
    }
}

impl std::fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Recording => "recording",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.pad(name)
    }
}

/// One export attempt, created on a cache miss
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJob {
    pub id: JobId,
    pub fingerprint: Fingerprint,
    pub format: ExportFormat,
    pub target_width: u32,
    pub target_height: u32,
    pub bitrate_video: u64,
    pub bitrate_audio: u64,
    pub status: ExportStatus,
    pub progress_percent: f64,
    pub eta_seconds: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl ExportJob {
    pub fn new(fingerprint: Fingerprint, format: ExportFormat, bitrate_video: u64, bitrate_audio: u64) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            fingerprint,
            format,
            target_width: 0,
            target_height: 0,
            bitrate_video,
            bitrate_audio,
            status: ExportStatus::Idle,
            progress_percent: 0.0,
            eta_seconds: None,
            created_at: Utc::now(),
        }
    }

    /// Moves to `next`, rejecting transitions the state machine does not allow
    pub fn transition(&mut self, next: ExportStatus) -> CoreResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::Internal(format!(
                "illegal export transition {} → {}",
                self.status, next
            )));
        }
        info!("Export {} {} → {}", self.id, self.status, next);
        self.status = next;
        Ok(())
    }

    pub fn set_target(&mut self, dimensions: Dimensions) {
        self.target_width = dimensions.width;
        self.target_height = dimensions.height;
    }
}

/// Fits the source inside `max` keeping its aspect ratio; both sides even, at least 2
pub fn compute_target_dimensions(source: Dimensions, max: Dimensions) -> Dimensions {
    if source.width == 0 || source.height == 0 {
        return Dimensions::new(2, 2);
    }

    let (w, h) = (source.width as f64, source.height as f64);
    let scale = (max.width.max(2) as f64 / w)
        .min(max.height.max(2) as f64 / h)
        .min(1.0);

    let even = |v: f64| ((v.round() as u32) / 2 * 2).max(2);
    Dimensions::new(even(w * scale), even(h * scale))
}

// =============================================================================
// Progress
// =============================================================================

/// Progress update sent once per recorded frame
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportProgress {
    pub job_id: JobId,
    pub status: ExportStatus,
    pub frame: u64,
    /// Progress percentage (0-100)
    pub percent: f64,
    /// Estimated time remaining in seconds, once known
    pub eta_seconds: Option<f64>,
}

/// Remaining-time estimate with hysteresis
#[derive(Clone, Debug, Default)]
pub struct EtaEstimator {
    reported: Option<f64>,
}

impl EtaEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the current percentage and wall time; returns the ETA to display
    pub fn update(&mut self, percent: f64, elapsed_sec: f64) -> Option<f64> {
        if percent <= ETA_MIN_PERCENT {
            return self.reported;
        }

        let percent = percent.min(100.0);
        let estimate = elapsed_sec / percent * (100.0 - percent);
        match self.reported {
            Some(previous) if (estimate - previous).abs() <= ETA_HYSTERESIS_SEC => {}
            _ => self.reported = Some(estimate),
        }
        self.reported
    }
}

// =============================================================================
// Scheduling
// =============================================================================

/// Paces the recording loop; awaited once before every frame
#[async_trait]
pub trait FrameClock: Send {
    async fn on_frame_ready(&mut self);
}

/// Paces frames with a timer at the capture rate
pub struct IntervalClock {
    interval: Interval,
}

impl IntervalClock {
    pub fn new(fps: f64) -> Self {
        let period = Duration::from_secs_f64(1.0 / fps.max(1.0));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl FrameClock for IntervalClock {
    async fn on_frame_ready(&mut self) {
        self.interval.tick().await;
    }
}

/// Runs as fast as the pipeline allows, yielding to the scheduler between frames
#[derive(Debug, Default)]
pub struct ImmediateClock;

#[async_trait]
impl FrameClock for ImmediateClock {
    async fn on_frame_ready(&mut self) {
        tokio::task::yield_now().await;
    }
}

/// Cooperative cancellation shared between the caller and the recording loop
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// The finished, encoded video
#[derive(Clone, Debug)]
pub struct ExportArtifact {
    pub bytes: Arc<Vec<u8>>,
    pub extension: &'static str,
    pub mime: &'static str,
    pub frame_count: u64,
    pub encoding_time_sec: f64,
}

#[derive(Clone, Debug)]
pub enum ExportOutcome {
    Completed(ExportArtifact),
    /// Stopped on request; nothing was produced
    Cancelled,
}

enum LoopEnd {
    Finished(u64),
    Cancelled,
}

// =============================================================================
// Encoder
// =============================================================================

/// Clock-synchronized draw loop for one export
pub struct ExportEncoder {
    renderer: CaptionRenderer,
    locator: ActiveSegmentLocator,
    style: StyleConfig,
    view_mode: ViewMode,
    clock: Box<dyn FrameClock>,
    cancel: CancellationFlag,
    progress: Option<Sender<ExportProgress>>,
}

impl ExportEncoder {
    pub fn new(
        renderer: CaptionRenderer,
        segments: Arc<SegmentStore>,
        style: StyleConfig,
        view_mode: ViewMode,
        clock: Box<dyn FrameClock>,
        cancel: CancellationFlag,
    ) -> Self {
        Self {
            renderer,
            locator: ActiveSegmentLocator::new(segments),
            style,
            view_mode,
            clock,
            cancel,
            progress: None,
        }
    }

    pub fn with_progress(mut self, tx: Sender<ExportProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Records and finalizes; the job must be in `Preparing`
    pub async fn run(
        &mut self,
        job: &mut ExportJob,
        plan: &CapturePlan,
        mut session: CaptureSession,
    ) -> CoreResult<ExportOutcome> {
        let started = Instant::now();

        if let Err(e) = job.transition(ExportStatus::Recording) {
            session.release().await;
            return Err(e);
        }

        let recorded = self.record(job, plan, &mut session, started).await;

        let frame_count = match recorded {
            Ok(LoopEnd::Finished(frames)) => frames,
            Ok(LoopEnd::Cancelled) => {
                session.release().await;
                job.transition(ExportStatus::Cancelled)?;
                report(&self.progress, job, 0).await;
                return Ok(ExportOutcome::Cancelled);
            }
            Err(e) => {
                session.release().await;
                warn!("Export {} failed while recording: {}", job.id, e);
                job.transition(ExportStatus::Failed)?;
                report(&self.progress, job, 0).await;
                return Err(e);
            }
        };

        job.transition(ExportStatus::Finalizing)?;
        let finished = session.sink.finish().await;
        session.release().await;

        let chunks = match finished {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!("Export {} failed while finalizing: {}", job.id, e);
                job.transition(ExportStatus::Failed)?;
                report(&self.progress, job, frame_count).await;
                return Err(e);
            }
        };

        let bytes: Vec<u8> = chunks.concat();
        if bytes.is_empty() {
            job.transition(ExportStatus::Failed)?;
            report(&self.progress, job, frame_count).await;
            return Err(CoreError::Encode("encoder produced an empty file".to_string()));
        }

        job.progress_percent = 100.0;
        job.eta_seconds = Some(0.0);
        job.transition(ExportStatus::Completed)?;
        report(&self.progress, job, frame_count).await;

        let encoding_time_sec = started.elapsed().as_secs_f64();
        info!(
            "Export {} completed: {} frames, {} bytes in {:.1}s",
            job.id,
            frame_count,
            bytes.len(),
            encoding_time_sec
        );

        Ok(ExportOutcome::Completed(ExportArtifact {
            bytes: Arc::new(bytes),
            extension: plan.codec.extension,
            mime: plan.codec.mime,
            frame_count,
            encoding_time_sec,
        }))
    }

    async fn record(
        &mut self,
        job: &mut ExportJob,
        plan: &CapturePlan,
        session: &mut CaptureSession,
        started: Instant,
    ) -> CoreResult<LoopEnd> {
        let duration = plan.duration;
        let mut frame = Frame::new(plan.dimensions.width, plan.dimensions.height);
        let mut eta = EtaEstimator::new();
        let mut frames = 0u64;

        loop {
            self.clock.on_frame_ready().await;

            if self.cancel.is_cancelled() {
                info!("Export {} cancelled after {} frames", job.id, frames);
                return Ok(LoopEnd::Cancelled);
            }

            let Some(time) = session.source.next_frame(&mut frame).await? else {
                debug!("Source ended at frame {}", frames);
                break;
            };

            if self.view_mode != ViewMode::Off {
                if let Some(segment) = self.locator.locate(time) {
                    self.renderer
                        .render(&mut frame, segment, &self.style, self.view_mode);
                }
            }

            session.sink.write_frame(&frame).await?;
            frames += 1;

            // Without a known duration the source runs until end of stream
            if duration > 0.0 {
                job.progress_percent = (time / duration * 100.0).min(100.0);
                job.eta_seconds =
                    eta.update(job.progress_percent, started.elapsed().as_secs_f64());
            }
            report(&self.progress, job, frames).await;

            if duration > 0.0 && time >= duration - END_EPSILON {
                break;
            }
        }

        if frames == 0 {
            return Err(CoreError::Encode(
                "source produced no decodable frames".to_string(),
            ));
        }

        Ok(LoopEnd::Finished(frames))
    }
}

async fn report(progress: &Option<Sender<ExportProgress>>, job: &ExportJob, frame: u64) {
    if let Some(tx) = progress {
        let _ = tx
            .send(ExportProgress {
                job_id: job.id.clone(),
                status: job.status,
                frame,
                percent: job.progress_percent,
                eta_seconds: job.eta_seconds,
            })
            .await;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory capture session used by encoder and service tests

    use std::sync::Mutex;

    use super::*;
    use crate::core::render::graph::{FrameSink, FrameSource};

    #[derive(Debug, Default)]
    pub struct SinkLog {
        pub frames: Vec<Vec<u8>>,
        pub finished: bool,
        pub aborted: bool,
        pub released_source: bool,
    }

    pub struct FakeSource {
        pub fps: f64,
        pub remaining: u64,
        pub index: u64,
        pub fail_at: Option<u64>,
        pub log: Arc<Mutex<SinkLog>>,
    }

    #[async_trait]
    impl FrameSource for FakeSource {
        fn frame_rate(&self) -> f64 {
            self.fps
        }

        async fn next_frame(&mut self, frame: &mut Frame) -> CoreResult<Option<TimeSec>> {
            if self.fail_at == Some(self.index) {
                return Err(CoreError::Encode("decoder crashed".to_string()));
            }
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            frame.fill([0, 0, 0, 255]);
            let t = self.index as f64 / self.fps;
            self.index += 1;
            Ok(Some(t))
        }

        async fn release(&mut self) {
            self.log.lock().unwrap().released_source = true;
        }
    }

    pub struct FakeSink {
        pub log: Arc<Mutex<SinkLog>>,
        pub fail_finish: bool,
    }

    #[async_trait]
    impl FrameSink for FakeSink {
        async fn write_frame(&mut self, frame: &Frame) -> CoreResult<()> {
            self.log.lock().unwrap().frames.push(frame.data.clone());
            Ok(())
        }

        async fn finish(&mut self) -> CoreResult<Vec<Vec<u8>>> {
            if self.fail_finish {
                return Err(CoreError::Encode("muxer failed".to_string()));
            }
            let mut log = self.log.lock().unwrap();
            log.finished = true;
            Ok(vec![b"head".to_vec(), vec![log.frames.len() as u8], b"tail".to_vec()])
        }

        async fn abort(&mut self) {
            self.log.lock().unwrap().aborted = true;
        }
    }

    pub fn session(frames: u64, fps: f64) -> (CaptureSession, Arc<Mutex<SinkLog>>) {
        build_session(frames, fps, None)
    }

    /// Decodes `frames` frames, then fails where end of stream would be
    pub fn failing_session(frames: u64, fps: f64) -> (CaptureSession, Arc<Mutex<SinkLog>>) {
        build_session(frames, fps, Some(frames))
    }

    fn build_session(
        frames: u64,
        fps: f64,
        fail_at: Option<u64>,
    ) -> (CaptureSession, Arc<Mutex<SinkLog>>) {
        let log = Arc::new(Mutex::new(SinkLog::default()));
        let source = FakeSource {
            fps,
            remaining: frames,
            index: 0,
            fail_at,
            log: log.clone(),
        };
        let sink = FakeSink {
            log: log.clone(),
            fail_finish: false,
        };
        (CaptureSession::new(Box::new(source), Box::new(sink)), log)
    }
}
