//! FFmpeg Runner
//!
//! Short-lived FFmpeg/FFprobe invocations: source probing and capability
//! listing. Long-running decode/encode pipes live in `core::render::graph`.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{FFmpegError, FFmpegInfo, FFmpegResult};
use crate::core::Dimensions;

// =============================================================================
// Probe Types
// =============================================================================

/// Media information extracted by FFprobe
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    pub duration_sec: f64,
    pub video: Option<VideoStreamInfo>,
    pub audio: Option<AudioStreamInfo>,
    /// Container format name(s), e.g. "mov,mp4,m4a,3gp,3g2,mj2"
    pub format: String,
    pub size_bytes: u64,
}

impl MediaInfo {
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// Native dimensions of the first video stream
    pub fn video_dimensions(&self) -> Option<Dimensions> {
        self.video
            .as_ref()
            .map(|v| Dimensions::new(v.width, v.height))
    }
}

/// Video stream information
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
    pub pixel_format: String,
}

/// Audio stream information
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioStreamInfo {
    pub sample_rate: u32,
    pub channels: u8,
    pub codec: String,
}

// =============================================================================
// Capabilities
// =============================================================================

/// Encoders and muxers compiled into the installed FFmpeg
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FFmpegCapabilities {
    pub encoders: HashSet<String>,
    pub muxers: HashSet<String>,
}

impl FFmpegCapabilities {
    pub fn has_encoder(&self, name: &str) -> bool {
        self.encoders.contains(name)
    }

    pub fn has_muxer(&self, name: &str) -> bool {
        self.muxers.contains(name)
    }
}

// =============================================================================
// Runner
// =============================================================================

/// Executes probe and capability queries against one FFmpeg installation
#[derive(Clone, Debug)]
pub struct FFmpegRunner {
    info: Arc<FFmpegInfo>,
}

impl FFmpegRunner {
    pub fn new(info: FFmpegInfo) -> Self {
        Self {
            info: Arc::new(info),
        }
    }

    pub fn info(&self) -> &FFmpegInfo {
        &self.info
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.info.ffmpeg_path
    }

    /// Probes a media file
    pub async fn probe(&self, input: &Path) -> FFmpegResult<MediaInfo> {
        if !input.exists() {
            return Err(FFmpegError::InvalidInput(format!(
                "Input file does not exist: {}",
                input.display()
            )));
        }

        let output = tokio::process::Command::new(&self.info.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(input)
            .output()
            .await
            .map_err(FFmpegError::ProcessError)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FFmpegError::ProbeError(format!("FFprobe failed: {}", stderr)));
        }

        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }

    /// Lists the encoders and muxers available in this build
    pub async fn capabilities(&self) -> FFmpegResult<FFmpegCapabilities> {
        let encoders = self.list("-encoders").await?;
        let muxers = self.list("-muxers").await?;
        debug!(
            "FFmpeg reports {} encoders and {} muxers",
            encoders.len(),
            muxers.len()
        );
        Ok(FFmpegCapabilities { encoders, muxers })
    }

    async fn list(&self, flag: &str) -> FFmpegResult<HashSet<String>> {
        let output = tokio::process::Command::new(&self.info.ffmpeg_path)
            .args(["-hide_banner", flag])
            .output()
            .await
            .map_err(FFmpegError::ProcessError)?;

        if !output.status.success() {
            return Err(FFmpegError::ExecutionFailed(format!(
                "ffmpeg {} exited with {}",
                flag, output.status
            )));
        }

        Ok(parse_name_table(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parses the table printed by `ffmpeg -encoders` / `ffmpeg -muxers`
///
/// Rows follow a separator line made of dashes; each row is
/// `<flags> <name[,alias...]> <description>`.
fn parse_name_table(output: &str) -> HashSet<String> {
    output
        .lines()
        .skip_while(|line| {
            let trimmed = line.trim();
            trimmed.len() < 2 || !trimmed.chars().all(|c| c == '-')
        })
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(1))
        .flat_map(|names| names.split(','))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Probe Parsing
// =============================================================================

fn parse_probe_output(json_str: &str) -> FFmpegResult<MediaInfo> {
    let json: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| FFmpegError::ParseError(format!("Failed to parse FFprobe output: {}", e)))?;

    let format = json
        .get("format")
        .ok_or_else(|| FFmpegError::ParseError("Missing format info".to_string()))?;

    let str_field = |v: &serde_json::Value, key: &str| v.get(key).and_then(|d| d.as_str()).map(str::to_string);

    let duration_sec = str_field(format, "duration")
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0);
    let size_bytes = str_field(format, "size")
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);
    let format_name = str_field(format, "format_name").unwrap_or_else(|| "unknown".to_string());

    let mut video = None;
    let mut audio = None;

    let streams = json.get("streams").and_then(|s| s.as_array());
    for stream in streams.into_iter().flatten() {
        match stream.get("codec_type").and_then(|c| c.as_str()) {
            Some("video") if video.is_none() => {
                video = Some(VideoStreamInfo {
                    width: stream.get("width").and_then(|w| w.as_u64()).unwrap_or(0) as u32,
                    height: stream.get("height").and_then(|h| h.as_u64()).unwrap_or(0) as u32,
                    fps: str_field(stream, "r_frame_rate")
                        .and_then(|r| parse_frame_rate(&r))
                        .unwrap_or(30.0),
                    codec: str_field(stream, "codec_name").unwrap_or_else(|| "unknown".into()),
                    pixel_format: str_field(stream, "pix_fmt").unwrap_or_else(|| "unknown".into()),
                });
            }
            Some("audio") if audio.is_none() => {
                audio = Some(AudioStreamInfo {
                    sample_rate: str_field(stream, "sample_rate")
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(44100),
                    channels: stream.get("channels").and_then(|c| c.as_u64()).unwrap_or(2) as u8,
                    codec: str_field(stream, "codec_name").unwrap_or_else(|| "unknown".into()),
                });
            }
            _ => {}
        }
    }

    Ok(MediaInfo {
        duration_sec,
        video,
        audio,
        format: format_name,
        size_bytes,
    })
}

/// Parses "30/1", "30000/1001" or a plain number
fn parse_frame_rate(value: &str) -> Option<f64> {
    match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            (den > 0.0).then(|| num / den)
        }
        None => value.parse().ok(),
    }
    .filter(|fps: &f64| fps.is_finite() && *fps > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output_video_and_audio() {
        let json = r#"{
            "format": {
                "duration": "10.5",
                "size": "1048576",
                "format_name": "mov,mp4,m4a,3gp,3g2,mj2"
            },
            "streams": [
                {
                    "codec_type": "video",
                    "codec_name": "h264",
                    "width": 1920,
                    "height": 1080,
                    "r_frame_rate": "30/1",
                    "pix_fmt": "yuv420p"
                },
                {
                    "codec_type": "audio",
                    "codec_name": "aac",
                    "sample_rate": "48000",
                    "channels": 2
                }
            ]
        }"#;

        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.duration_sec, 10.5);
        assert_eq!(info.size_bytes, 1048576);
        assert!(info.has_audio());
        assert_eq!(info.video_dimensions(), Some(Dimensions::new(1920, 1080)));

        let audio = info.audio.unwrap();
        assert_eq!(audio.sample_rate, 48000);
        assert_eq!(audio.codec, "aac");
    }

    #[test]
    fn test_parse_silent_source() {
        let json = r#"{
            "format": {"duration": "3.0", "format_name": "webm"},
            "streams": [{"codec_type": "video", "width": 640, "height": 360, "r_frame_rate": "30000/1001"}]
        }"#;

        let info = parse_probe_output(json).unwrap();
        assert!(!info.has_audio());
        assert!((info.video.unwrap().fps - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_parse_audio_only_source() {
        let json = r#"{"format": {"duration": "3.0"}, "streams": [{"codec_type": "audio"}]}"#;
        let info = parse_probe_output(json).unwrap();
        assert!(info.video_dimensions().is_none());
    }

    #[test]
    fn test_parse_probe_missing_format() {
        assert!(matches!(
            parse_probe_output(r#"{"streams": []}"#),
            Err(FFmpegError::ParseError(_))
        ));
    }

    #[test]
    fn test_frame_rate_rejects_zero_denominator() {
        assert_eq!(parse_frame_rate("30/0"), None);
        assert_eq!(parse_frame_rate("25"), Some(25.0));
    }

    #[test]
    fn test_parse_encoder_table() {
        let output = "Encoders:\n V..... = Video\n A..... = Audio\n ------\n V....D libx264              libx264 H.264 / AVC\n V....D libvpx-vp9           libvpx VP9\n A....D aac                  AAC (Advanced Audio Coding)\n";
        let names = parse_name_table(output);

        assert!(names.contains("libx264"));
        assert!(names.contains("libvpx-vp9"));
        assert!(names.contains("aac"));
        assert!(!names.contains("V....."));
    }

    #[test]
    fn test_parse_muxer_table_with_aliases() {
        let output = "File formats:\n D. = Demuxing supported\n .E = Muxing supported\n --\n  E mp4             MP4 (MPEG-4 Part 14)\n  E matroska,webm   Matroska / WebM\n";
        let names = parse_name_table(output);

        assert!(names.contains("mp4"));
        assert!(names.contains("webm"));
        assert!(names.contains("matroska"));
        assert_eq!(names.len(), 3);
    }
}
