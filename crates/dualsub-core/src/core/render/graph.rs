//! Capture Graph
//!
//! Builds the frame pipeline for a burn-in export:
//!
//! ```text
//!  source ──▶ ffmpeg (decode, scale, 30 fps) ──RGBA──▶ [caption draw] ──RGBA──▶
//!             ffmpeg (encode) ◀── source audio track (second input, optional)
//!                    │
//!                    └──▶ container bytes on stdout
//! ```
//!
//! The decode instance is independent of any live player, so playback and
//! export never share state. Both child processes belong to a
//! [`CaptureSession`] and are killed when it is released or dropped.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::codec::CodecCandidate;
use super::frame::Frame;
use crate::core::ffmpeg::{FFmpegCapabilities, FFmpegRunner, MediaInfo, SharedFFmpegState};
use crate::core::{CoreError, CoreResult, Dimensions, TimeSec};

/// Frame rate of the offscreen decode instance
pub const CAPTURE_FPS: f64 = 30.0;

const STDOUT_CHUNK: usize = 64 * 1024;

// =============================================================================
// Seams
// =============================================================================

/// Supplies decoded frames in presentation order
#[async_trait]
pub trait FrameSource: Send {
    fn frame_rate(&self) -> f64;

    /// Fills `frame` and returns its source timestamp, or `None` at end of stream
    async fn next_frame(&mut self, frame: &mut Frame) -> CoreResult<Option<TimeSec>>;

    async fn release(&mut self);
}

/// Consumes composited frames and produces the encoded artifact
#[async_trait]
pub trait FrameSink: Send {
    async fn write_frame(&mut self, frame: &Frame) -> CoreResult<()>;

    /// Flushes the encoder and returns its output chunks in order
    async fn finish(&mut self) -> CoreResult<Vec<Vec<u8>>>;

    /// Stops encoding and discards output; safe to call more than once
    async fn abort(&mut self);
}

/// Everything needed to open a capture session
#[derive(Clone, Debug, PartialEq)]
pub struct CapturePlan {
    pub source: PathBuf,
    pub dimensions: Dimensions,
    pub fps: f64,
    pub include_audio: bool,
    pub codec: CodecCandidate,
    pub video_bitrate: u64,
    pub audio_bitrate: u64,
    pub duration: TimeSec,
}

/// Resources held for the lifetime of one export
pub struct CaptureSession {
    pub source: Box<dyn FrameSource>,
    pub sink: Box<dyn FrameSink>,
}

impl CaptureSession {
    pub fn new(source: Box<dyn FrameSource>, sink: Box<dyn FrameSink>) -> Self {
        Self { source, sink }
    }

    /// Releases both ends; called on every terminal transition
    pub async fn release(&mut self) {
        self.source.release().await;
        self.sink.abort().await;
    }
}

/// Probes sources and opens capture sessions
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    async fn probe(&self, source: &Path) -> CoreResult<MediaInfo>;

    async fn capabilities(&self) -> CoreResult<FFmpegCapabilities>;

    async fn open(&self, plan: &CapturePlan) -> CoreResult<CaptureSession>;
}

// =============================================================================
// FFmpeg Backend
// =============================================================================

/// FFmpeg-backed capture graph
pub struct CaptureGraphBuilder {
    runner: FFmpegRunner,
    capabilities: OnceCell<FFmpegCapabilities>,
}

impl CaptureGraphBuilder {
    pub fn new(runner: FFmpegRunner) -> Self {
        Self {
            runner,
            capabilities: OnceCell::new(),
        }
    }

    /// Uses (and if needed initializes) the shared FFmpeg state
    pub async fn from_state(state: &SharedFFmpegState, preferred_dir: Option<&Path>) -> CoreResult<Self> {
        {
            let guard = state.read().await;
            if let Some(runner) = guard.runner() {
                let builder = Self::new(runner.clone());
                if let Some(caps) = guard.capabilities() {
                    let _ = builder.capabilities.set(caps.clone());
                }
                return Ok(builder);
            }
        }

        let mut guard = state.write().await;
        if !guard.is_available() {
            guard
                .initialize(preferred_dir)
                .await
                .map_err(|e| CoreError::Capability(e.to_string()))?;
        }
        let runner = guard
            .runner()
            .cloned()
            .ok_or_else(|| CoreError::Capability("FFmpeg is not available".to_string()))?;
        let builder = Self::new(runner);
        if let Some(caps) = guard.capabilities() {
            let _ = builder.capabilities.set(caps.clone());
        }
        Ok(builder)
    }
}

#[async_trait]
impl CaptureBackend for CaptureGraphBuilder {
    async fn probe(&self, source: &Path) -> CoreResult<MediaInfo> {
        let info = self.runner.probe(source).await?;
        if info.video_dimensions().is_none_or(|d| d.width == 0 || d.height == 0) {
            return Err(CoreError::Capability(format!(
                "{} has no video stream to capture",
                source.display()
            )));
        }
        Ok(info)
    }

    async fn capabilities(&self) -> CoreResult<FFmpegCapabilities> {
        let caps = self
            .capabilities
            .get_or_try_init(|| self.runner.capabilities())
            .await
            .map_err(|e| CoreError::Capability(e.to_string()))?;
        Ok(caps.clone())
    }

    async fn open(&self, plan: &CapturePlan) -> CoreResult<CaptureSession> {
        let ffmpeg = self.runner.ffmpeg_path();

        let source = FFmpegFrameSource::spawn(ffmpeg, plan)?;
        let sink = match FFmpegFrameSink::spawn(ffmpeg, plan) {
            Ok(sink) => sink,
            Err(e) => {
                let mut source = source;
                source.release().await;
                return Err(e);
            }
        };

        info!(
            "Capture graph open: {} → {} at {} ({})",
            plan.source.display(),
            plan.codec,
            plan.dimensions,
            if plan.include_audio { "with audio" } else { "video only" }
        );

        Ok(CaptureSession::new(Box::new(source), Box::new(sink)))
    }
}

// =============================================================================
// Command Lines
// =============================================================================

fn decoder_args(plan: &CapturePlan) -> Vec<String> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-v".into(), "error".into(), "-i".into()];
    args.push(plan.source.to_string_lossy().into_owned());
    args.extend(
        [
            "-an",
            "-sn",
            "-vf",
            format!(
                "scale={}:{},fps={}",
                plan.dimensions.width, plan.dimensions.height, plan.fps
            )
            .as_str(),
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "pipe:1",
        ]
        .map(String::from),
    );
    args
}

fn encoder_args(plan: &CapturePlan) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-v",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgba",
        "-s",
        plan.dimensions.to_string().as_str(),
        "-r",
        plan.fps.to_string().as_str(),
        "-i",
        "pipe:0",
    ]
    .map(String::from)
    .to_vec();

    if plan.include_audio {
        args.push("-i".into());
        args.push(plan.source.to_string_lossy().into_owned());
        args.extend(["-map", "0:v:0", "-map", "1:a:0"].map(String::from));
    } else {
        args.extend(["-map", "0:v:0"].map(String::from));
    }

    args.extend(
        [
            "-c:v",
            plan.codec.video_encoder,
            "-b:v",
            plan.video_bitrate.to_string().as_str(),
            "-pix_fmt",
            "yuv420p",
        ]
        .map(String::from),
    );

    if plan.include_audio {
        args.extend(
            [
                "-c:a",
                plan.codec.audio_encoder,
                "-b:a",
                plan.audio_bitrate.to_string().as_str(),
                "-shortest",
            ]
            .map(String::from),
        );
    } else {
        args.push("-an".into());
    }

    // A non-seekable pipe needs a fragmented MP4
    if plan.codec.container == "mp4" {
        args.extend(["-movflags", "frag_keyframe+empty_moov+default_base_moof"].map(String::from));
    }

    args.extend(["-f", plan.codec.container, "pipe:1"].map(String::from));
    args
}

// =============================================================================
// Decoder
// =============================================================================

/// Reads raw RGBA frames from an FFmpeg decode process
pub struct FFmpegFrameSource {
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    dimensions: Dimensions,
    fps: f64,
    frame_index: u64,
}

impl FFmpegFrameSource {
    fn spawn(ffmpeg: &Path, plan: &CapturePlan) -> CoreResult<Self> {
        let mut child = Command::new(ffmpeg)
            .args(decoder_args(plan))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CoreError::Capability(format!("failed to spawn FFmpeg decoder: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CoreError::Internal("decoder stdout not captured".to_string()))?;
        let stderr = child.stderr.take().map(drain_to_string);

        Ok(Self {
            child: Some(child),
            stdout: Some(stdout),
            stderr,
            dimensions: plan.dimensions,
            fps: plan.fps,
            frame_index: 0,
        })
    }
}

#[async_trait]
impl FrameSource for FFmpegFrameSource {
    fn frame_rate(&self) -> f64 {
        self.fps
    }

    async fn next_frame(&mut self, frame: &mut Frame) -> CoreResult<Option<TimeSec>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        if frame.dimensions() != self.dimensions {
            *frame = Frame::new(self.dimensions.width, self.dimensions.height);
        }

        match stdout.read_exact(&mut frame.data).await {
            Ok(_) => {
                let time = self.frame_index as f64 / self.fps;
                self.frame_index += 1;
                Ok(Some(time))
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.stdout = None;
                let status = match self.child.as_mut() {
                    Some(child) => child.wait().await.ok(),
                    None => None,
                };
                if let Some(status) = status.filter(|s| !s.success()) {
                    let stderr = join_stderr(&mut self.stderr).await;
                    return Err(CoreError::Encode(format!(
                        "decoder exited with {} after {} frames: {}",
                        status,
                        self.frame_index,
                        stderr.trim()
                    )));
                }
                debug!("Decoder reached end of stream after {} frames", self.frame_index);
                Ok(None)
            }
            Err(e) => Err(CoreError::Encode(format!("decoder read failed: {}", e))),
        }
    }

    async fn release(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        if let Some(stderr) = self.stderr.take() {
            if let Ok(msg) = stderr.await {
                if !msg.trim().is_empty() {
                    debug!("Decoder stderr: {}", msg.trim());
                }
            }
        }
    }
}

// =============================================================================
// Encoder
// =============================================================================

/// Writes raw RGBA frames to an FFmpeg encode process and collects its output
pub struct FFmpegFrameSink {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    collector: Option<JoinHandle<std::io::Result<Vec<Vec<u8>>>>>,
    stderr: Option<JoinHandle<String>>,
}

impl FFmpegFrameSink {
    fn spawn(ffmpeg: &Path, plan: &CapturePlan) -> CoreResult<Self> {
        let mut child = Command::new(ffmpeg)
            .args(encoder_args(plan))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CoreError::Capability(format!("failed to spawn FFmpeg encoder: {}", e)))?;

        let stdin = child.stdin.take();
        let collector = child.stdout.take().map(|stdout| tokio::spawn(collect_chunks(stdout)));
        let stderr = child.stderr.take().map(drain_to_string);

        Ok(Self {
            child: Some(child),
            stdin,
            collector,
            stderr,
        })
    }
}

#[async_trait]
impl FrameSink for FFmpegFrameSink {
    async fn write_frame(&mut self, frame: &Frame) -> CoreResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| CoreError::Encode("encoder input already closed".to_string()))?;

        if let Err(e) = stdin.write_all(&frame.data).await {
            self.stdin = None;
            if let Some(child) = self.child.as_mut() {
                let _ = child.wait().await;
            }
            let stderr = join_stderr(&mut self.stderr).await;
            return Err(CoreError::Encode(format!(
                "encoder rejected frame: {} {}",
                e,
                stderr.trim()
            )));
        }
        Ok(())
    }

    async fn finish(&mut self) -> CoreResult<Vec<Vec<u8>>> {
        // Closing stdin signals end of input
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.shutdown().await;
        }

        let mut child = self
            .child
            .take()
            .ok_or_else(|| CoreError::Encode("encoder already finished".to_string()))?;
        let status = child
            .wait()
            .await
            .map_err(|e| CoreError::Encode(format!("failed to wait for encoder: {}", e)))?;

        let chunks = match self.collector.take() {
            Some(handle) => handle
                .await
                .map_err(|e| CoreError::Internal(format!("output collector panicked: {}", e)))?
                .map_err(|e| CoreError::Encode(format!("failed to read encoder output: {}", e)))?,
            None => Vec::new(),
        };

        if !status.success() {
            let stderr = join_stderr(&mut self.stderr).await;
            return Err(CoreError::Encode(format!(
                "encoder exited with {}: {}",
                status,
                stderr.trim()
            )));
        }

        Ok(chunks)
    }

    async fn abort(&mut self) {
        self.stdin = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        if let Some(collector) = self.collector.take() {
            collector.abort();
        }
        if let Some(stderr) = self.stderr.take() {
            stderr.abort();
        }
    }
}

/// Drains a pipe into a string so the child never blocks on a full buffer
fn drain_to_string<R>(pipe: R) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        let mut pipe = pipe;
        let _ = pipe.read_to_end(&mut buf).await;
        String::from_utf8_lossy(&buf).to_string()
    })
}

async fn join_stderr(handle: &mut Option<JoinHandle<String>>) -> String {
    match handle.take() {
        Some(handle) => handle
            .await
            .unwrap_or_else(|_| "failed to read stderr".to_string()),
        None => String::new(),
    }
}

async fn collect_chunks(mut stdout: ChildStdout) -> std::io::Result<Vec<Vec<u8>>> {
    let mut chunks = Vec::new();
    let mut buf = vec![0u8; STDOUT_CHUNK];
    loop {
        let n = stdout.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        chunks.push(buf[..n].to_vec());
    }
    if chunks.is_empty() {
        warn!("Encoder produced no output");
    }
    Ok(chunks)
}

// =============================================================================
// Tests
// =============================================================================
