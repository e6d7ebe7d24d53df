//! Output Format Negotiation
//!
//! Each requested format maps to an ordered list of container/encoder
//! combinations. The first one the runtime can produce wins, so an `mp4`
//! request on a build without any H.264 encoder still yields a playable WebM.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::ffmpeg::FFmpegCapabilities;
use crate::core::{CoreError, CoreResult};

/// Requested output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Mp4,
    Webm,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
        }
    }

    /// Ordered preference list for this format
    pub fn candidates(self) -> &'static [CodecCandidate] {
        match self {
            Self::Mp4 => MP4_CANDIDATES,
            Self::Webm => WEBM_CANDIDATES,
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4" => Ok(Self::Mp4),
            "webm" => Ok(Self::Webm),
            other => Err(format!("unsupported export format '{other}' (expected mp4 or webm)")),
        }
    }
}

/// One container + encoder combination
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CodecCandidate {
    /// FFmpeg muxer name
    pub container: &'static str,
    /// File extension for the produced artifact
    pub extension: &'static str,
    pub video_encoder: &'static str,
    pub audio_encoder: &'static str,
    pub mime: &'static str,
}

impl CodecCandidate {
    const fn new(
        container: &'static str,
        video_encoder: &'static str,
        audio_encoder: &'static str,
    ) -> Self {
        let (extension, mime) = if container.len() == 3 {
            ("mp4", "video/mp4")
        } else {
            ("webm", "video/webm")
        };
        Self {
            container,
            extension,
            video_encoder,
            audio_encoder,
            mime,
        }
    }
}

impl std::fmt::Display for CodecCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.container, self.video_encoder, self.audio_encoder)
    }
}

const MP4_CANDIDATES: &[CodecCandidate] = &[
    CodecCandidate::new("mp4", "libx264", "aac"),
    CodecCandidate::new("mp4", "libopenh264", "aac"),
    CodecCandidate::new("mp4", "h264_videotoolbox", "aac"),
    CodecCandidate::new("webm", "libvpx-vp9", "libopus"),
    CodecCandidate::new("webm", "libvpx", "libvorbis"),
];

const WEBM_CANDIDATES: &[CodecCandidate] = &[
    CodecCandidate::new("webm", "libvpx-vp9", "libopus"),
    CodecCandidate::new("webm", "libvpx", "libopus"),
    CodecCandidate::new("webm", "libvpx", "libvorbis"),
];

/// Runtime capability check for a candidate
pub trait CodecSupport {
    fn supports(&self, candidate: &CodecCandidate, needs_audio: bool) -> bool;
}

impl CodecSupport for FFmpegCapabilities {
    fn supports(&self, candidate: &CodecCandidate, needs_audio: bool) -> bool {
        self.has_muxer(candidate.container)
            && self.has_encoder(candidate.video_encoder)
            && (!needs_audio || self.has_encoder(candidate.audio_encoder))
    }
}

/// Picks the first supported candidate for `format`
///
/// The audio encoder only matters when the source has an audio track.
pub fn select_codec(
    format: ExportFormat,
    support: &dyn CodecSupport,
    needs_audio: bool,
) -> CoreResult<CodecCandidate> {
    let selected = format
        .candidates()
        .iter()
        .find(|candidate| support.supports(candidate, needs_audio))
        .copied()
        .ok_or_else(|| {
            CoreError::Capability(format!(
                "no supported encoder for {} output (tried {})",
                format,
                format
                    .candidates()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?;

    debug!("Selected codec {} for {} export", selected, format);
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(encoders: &[&str], muxers: &[&str]) -> FFmpegCapabilities {
        FFmpegCapabilities {
            encoders: encoders.iter().map(|s| s.to_string()).collect(),
            muxers: muxers.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_mp4_prefers_x264() {
        let support = caps(&["libx264", "aac", "libvpx-vp9", "libopus"], &["mp4", "webm"]);
        let selected = select_codec(ExportFormat::Mp4, &support, true).unwrap();
        assert_eq!(selected.video_encoder, "libx264");
        assert_eq!(selected.extension, "mp4");
    }

    #[test]
    fn test_mp4_falls_back_to_webm() {
        let support = caps(&["libvpx-vp9", "libopus"], &["mp4", "webm"]);
        let selected = select_codec(ExportFormat::Mp4, &support, true).unwrap();
        assert_eq!(selected.container, "webm");
        assert_eq!(selected.extension, "webm");
        assert_eq!(selected.mime, "video/webm");
    }

    #[test]
    fn test_audio_encoder_ignored_for_silent_source() {
        let support = caps(&["libopenh264"], &["mp4"]);
        assert!(select_codec(ExportFormat::Mp4, &support, true).is_err());

        let selected = select_codec(ExportFormat::Mp4, &support, false).unwrap();
        assert_eq!(selected.video_encoder, "libopenh264");
    }

    #[test]
    fn test_webm_vorbis_fallback() {
        let support = caps(&["libvpx", "libvorbis"], &["webm"]);
        let selected = select_codec(ExportFormat::Webm, &support, true).unwrap();
        assert_eq!(selected.to_string(), "webm/libvpx/libvorbis");
    }

    #[test]
    fn test_nothing_supported_is_capability_error() {
        let err = select_codec(ExportFormat::Webm, &caps(&["libx264"], &["mp4"]), false)
            .unwrap_err();
        assert!(err.is_capability());
        assert!(err.to_string().contains("webm/libvpx-vp9/libopus"));
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("MP4".parse::<ExportFormat>(), Ok(ExportFormat::Mp4));
        assert_eq!("webm".parse::<ExportFormat>(), Ok(ExportFormat::Webm));
        assert!("mkv".parse::<ExportFormat>().is_err());
    }
}
