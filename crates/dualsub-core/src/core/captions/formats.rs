//! Caption File Formats
//!
//! Bilingual SRT and WebVTT export, plus a parser for the bilingual SRT layout:
//!
//! ```text
//! 1
//! 00:00:01,000 --> 00:00:04,000
//! Primary line
//! Secondary line
//!
//! ```
//!
//! The first text line of a cue is the primary text; any remaining lines are
//! joined into the secondary text.

use thiserror::Error;

use super::CaptionSegment;
use crate::core::TimeSec;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised while reading transcripts or caption files
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Unexpected end of input")]
    UnexpectedEnd,

    /// A transcript entry is missing a field or has the wrong type
    #[error("Invalid segment at index {index}: {reason}")]
    InvalidSegment { index: usize, reason: String },

    #[error("Invalid transcript JSON: {0}")]
    InvalidJson(String),
}

// =============================================================================
// SRT Format
// =============================================================================

/// Exports segments as bilingual SRT
///
/// Each entry carries the primary line followed by the secondary line. Line
/// breaks inside either text become spaces so one cue always spans exactly two
/// text lines; all other characters are written unchanged. A blank text is
/// written behind a zero-width space marker so it cannot end the cue early.
pub fn export_srt(segments: &[CaptionSegment]) -> String {
    let mut output = String::new();

    for (index, segment) in segments.iter().enumerate() {
        output.push_str(&format!("{}\n", index + 1));
        output.push_str(&format!(
            "{} --> {}\n",
            format_timestamp(segment.start_time, ','),
            format_timestamp(segment.end_time, ',')
        ));
        push_cue_text(&mut output, segment);
        output.push('\n');
    }

    output
}

/// Parses bilingual SRT produced by [`export_srt`] (or compatible tools)
pub fn parse_bilingual_srt(content: &str) -> Result<Vec<CaptionSegment>, ParseError> {
    let content = content.trim_start_matches('\u{feff}');
    let mut segments = Vec::new();
    let mut lines = content.lines().peekable();

    loop {
        while lines.peek().is_some_and(|l| l.trim().is_empty()) {
            lines.next();
        }

        let Some(first) = lines.next() else {
            break;
        };

        // Sequence numbers are optional in practice
        let timestamp_line = if first.contains("-->") {
            first
        } else {
            lines.next().ok_or(ParseError::UnexpectedEnd)?
        };
        let (start_time, end_time) = parse_timestamp_line(timestamp_line)?;

        let mut text_lines: Vec<&str> = Vec::new();
        while let Some(line) = lines.next_if(|l| !l.trim().is_empty()) {
            text_lines.push(unmark(line));
        }

        let Some((primary, rest)) = text_lines.split_first() else {
            return Err(ParseError::MissingData(format!(
                "cue {} has no text",
                segments.len() + 1
            )));
        };

        segments.push(CaptionSegment {
            start_time,
            end_time,
            primary_text: (*primary).to_string(),
            secondary_text: rest.join("\n"),
        });
    }

    Ok(segments)
}

// =============================================================================
// VTT Format
// =============================================================================

/// Exports segments as WebVTT with the same two-line cue layout as SRT
pub fn export_bilingual_vtt(segments: &[CaptionSegment]) -> String {
    let mut output = String::from("WEBVTT\n\n");

    for segment in segments {
        output.push_str(&format!(
            "{} --> {}\n",
            format_timestamp(segment.start_time, '.'),
            format_timestamp(segment.end_time, '.')
        ));
        push_cue_text(&mut output, segment);
        output.push('\n');
    }

    output
}

// =============================================================================
// Helpers
// =============================================================================

/// Prefixed to a cue line that would otherwise read as blank
const BLANK_MARKER: char = '\u{200B}';

fn push_cue_text(output: &mut String, segment: &CaptionSegment) {
    push_cue_line(output, &segment.primary_text);
    if !segment.secondary_text.is_empty() {
        push_cue_line(output, &segment.secondary_text);
    }
}

fn push_cue_line(output: &mut String, text: &str) {
    let line = text.replace("\r\n", " ").replace(['\n', '\r'], " ");
    if line.trim().is_empty() || line.starts_with(BLANK_MARKER) {
        output.push(BLANK_MARKER);
    }
    output.push_str(&line);
    output.push('\n');
}

fn unmark(line: &str) -> &str {
    line.strip_prefix(BLANK_MARKER).unwrap_or(line)
}

/// Parses "00:00:01,000 --> 00:00:04,000", ignoring trailing cue settings
fn parse_timestamp_line(line: &str) -> Result<(TimeSec, TimeSec), ParseError> {
    let Some((start, end)) = line.split_once("-->") else {
        return Err(ParseError::InvalidFormat(format!(
            "Expected 'start --> end' format: {}",
            line
        )));
    };

    let end = end.split_whitespace().next().unwrap_or_default();
    Ok((parse_timestamp(start.trim())?, parse_timestamp(end)?))
}

/// Parses `HH:MM:SS,mmm`, `HH:MM:SS.mmm` or `MM:SS.mmm` into seconds
fn parse_timestamp(ts: &str) -> Result<TimeSec, ParseError> {
    let invalid = || ParseError::InvalidTimestamp(ts.to_string());
    let normalized = ts.replace(',', ".");

    let mut total = 0.0;
    let parts: Vec<&str> = normalized.split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(invalid());
    }
    for part in parts {
        let value: f64 = part.parse().map_err(|_| invalid())?;
        if !value.is_finite() || value < 0.0 {
            return Err(invalid());
        }
        total = total * 60.0 + value;
    }

    Ok(total)
}

/// Formats seconds as `HH:MM:SS{sep}mmm`; negative input clamps to zero
fn format_timestamp(seconds: TimeSec, separator: char) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let secs = total_secs % 60;
    let mins = (total_secs / 60) % 60;
    let hours = total_secs / 3600;

    format!("{:02}:{:02}:{:02}{}{:03}", hours, mins, secs, separator, ms)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<CaptionSegment> {
        vec![
            CaptionSegment::new(0.0, 1.5, "Hello there", "你好"),
            CaptionSegment::new(1.5, 3.2345, "General Kenobi", "克诺比将军"),
            CaptionSegment::new(3661.001, 3662.0, "Late", "迟"),
        ]
    }

    // -------------------------------------------------------------------------
    // Export Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_export_srt_layout() {
        let srt = export_srt(&sample()[..1]);
        assert_eq!(srt, "1\n00:00:00,000 --> 00:00:01,500\nHello there\n你好\n\n");
    }

    #[test]
    fn test_export_srt_rounds_milliseconds() {
        let srt = export_srt(&sample());
        assert!(srt.contains("00:00:01,500 --> 00:00:03,235"));
        assert!(srt.contains("01:01:01,001 --> 01:01:02,000"));
        assert!(srt.starts_with("1\n"));
        assert!(srt.contains("\n3\n"));
    }

    #[test]
    fn test_export_flattens_embedded_newlines() {
        let seg = CaptionSegment::new(0.0, 1.0, "two\nlines", "两\n行");
        let srt = export_srt(&[seg]);
        assert!(srt.contains("two lines\n两 行\n"));
    }

    #[test]
    fn test_export_vtt_header_and_separator() {
        let vtt = export_bilingual_vtt(&sample());
        assert!(vtt.starts_with("WEBVTT\n\n"));
        assert!(vtt.contains("00:00:01.500 --> 00:00:03.235\nGeneral Kenobi\n克诺比将军\n"));
    }

    #[test]
    fn test_format_timestamp_clamps_negative() {
        assert_eq!(format_timestamp(-2.0, ','), "00:00:00,000");
    }

    // -------------------------------------------------------------------------
    // Parse Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_srt_roundtrip_preserves_text_and_times() {
        let original = sample();
        let parsed = parse_bilingual_srt(&export_srt(&original)).unwrap();

        assert_eq!(parsed.len(), original.len());
        for (a, b) in original.iter().zip(&parsed) {
            assert!((a.start_time - b.start_time).abs() <= 0.001);
            assert!((a.end_time - b.end_time).abs() <= 0.001);
            assert_eq!(a.primary_text, b.primary_text);
            assert_eq!(a.secondary_text, b.secondary_text);
        }
    }

    #[test]
    fn test_srt_roundtrip_keeps_spacing_and_blank_texts() {
        let original = vec![
            CaptionSegment::new(0.0, 1.0, "", "乙"),
            CaptionSegment::new(1.0, 2.0, "Hi  there ", "  前后  "),
            CaptionSegment::new(2.0, 3.0, "Only primary", ""),
            CaptionSegment::new(3.0, 4.0, "   ", "\u{200B}marked"),
        ];

        let srt = export_srt(&original);
        assert!(srt.starts_with("1\n00:00:00,000 --> 00:00:01,000\n\u{200B}\n乙\n\n"));

        let parsed = parse_bilingual_srt(&srt).unwrap();
        assert_eq!(parsed, original);

        let vtt = export_bilingual_vtt(&original);
        assert!(vtt.contains("00:00:01.000 --> 00:00:02.000\nHi  there \n  前后  \n"));
    }

    #[test]
    fn test_parse_without_secondary_line() {
        let parsed = parse_bilingual_srt("1\n00:00:01,000 --> 00:00:02,000\nOnly one\n").unwrap();
        assert_eq!(parsed[0].primary_text, "Only one");
        assert_eq!(parsed[0].secondary_text, "");
    }

    #[test]
    fn test_parse_handles_bom_and_crlf() {
        let content = "\u{feff}1\r\n00:00:01,000 --> 00:00:02,000\r\nHi\r\n嗨\r\n\r\n";
        let parsed = parse_bilingual_srt(content).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].secondary_text, "嗨");
    }

    #[test]
    fn test_parse_rejects_bad_timestamp() {
        let err = parse_bilingual_srt("1\n00:00:xx,000 --> 00:00:02,000\nHi\n").unwrap_err();
        assert!(matches!(err, ParseError::InvalidTimestamp(_)));
    }

    #[test]
    fn test_parse_rejects_missing_text() {
        let err = parse_bilingual_srt("1\n00:00:01,000 --> 00:00:02,000\n\n").unwrap_err();
        assert!(matches!(err, ParseError::MissingData(_)));
    }

    #[test]
    fn test_parse_truncated_cue() {
        assert_eq!(parse_bilingual_srt("1\n"), Err(ParseError::UnexpectedEnd));
    }
}
