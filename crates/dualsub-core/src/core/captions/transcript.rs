//! Transcript Input
//!
//! Reads the raw segment list handed over by the transcription/translation
//! collaborator: a JSON array of objects with `startTime`, `endTime`,
//! `primaryText` and `secondaryText`. One bad entry fails the whole list.

use std::path::Path;

use serde_json::Value;

use super::{CaptionSegment, ParseError};
use crate::core::CoreResult;

/// Parses a transcript JSON document into raw (unnormalized) segments
pub fn parse_transcript(json: &str) -> Result<Vec<CaptionSegment>, ParseError> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    let Value::Array(entries) = value else {
        return Err(ParseError::InvalidJson(
            "expected a top-level array of segments".to_string(),
        ));
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            serde_json::from_value::<CaptionSegment>(entry).map_err(|e| {
                ParseError::InvalidSegment {
                    index,
                    reason: e.to_string(),
                }
            })
        })
        .collect()
}

/// Reads and parses a transcript file
pub fn load_transcript(path: &Path) -> CoreResult<Vec<CaptionSegment>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_transcript(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_transcript() {
        let json = r#"[
            {"startTime": 0, "endTime": 2.5, "primaryText": "Hi", "secondaryText": "嗨"},
            {"startTime": 3, "endTime": 4, "primaryText": "Bye", "secondaryText": "再见", "speaker": "A"}
        ]"#;

        let segments = parse_transcript(json).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0], CaptionSegment::new(0.0, 2.5, "Hi", "嗨"));
        assert_eq!(segments[1].secondary_text, "再见");
    }

    #[test]
    fn test_missing_field_names_index() {
        let json = r#"[
            {"startTime": 0, "endTime": 1, "primaryText": "ok", "secondaryText": "好"},
            {"startTime": 1, "primaryText": "no end", "secondaryText": "无"}
        ]"#;

        let err = parse_transcript(json).unwrap_err();
        match err {
            ParseError::InvalidSegment { index, reason } => {
                assert_eq!(index, 1);
                assert!(reason.contains("endTime"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_mistyped_field_fails() {
        let json = r#"[{"startTime": "0", "endTime": 1, "primaryText": "a", "secondaryText": "b"}]"#;
        assert!(matches!(
            parse_transcript(json),
            Err(ParseError::InvalidSegment { index: 0, .. })
        ));
    }

    #[test]
    fn test_non_array_root_rejected() {
        assert!(matches!(
            parse_transcript(r#"{"segments": []}"#),
            Err(ParseError::InvalidJson(_))
        ));
        assert!(matches!(parse_transcript("not json"), Err(ParseError::InvalidJson(_))));
    }

    #[test]
    fn test_non_object_entry_names_index() {
        let json = r#"[{"startTime": 0, "endTime": 1, "primaryText": "", "secondaryText": "b"}, 42]"#;
        assert!(matches!(
            parse_transcript(json),
            Err(ParseError::InvalidSegment { index: 1, .. })
        ));
    }

    #[test]
    fn test_empty_array_is_valid() {
        assert!(parse_transcript("[]").unwrap().is_empty());
    }

    #[test]
    fn test_load_transcript_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.json");
        std::fs::write(
            &path,
            r#"[{"startTime": 1, "endTime": 2, "primaryText": "a", "secondaryText": "b"}]"#,
        )
        .unwrap();

        assert_eq!(load_transcript(&path).unwrap().len(), 1);
    }
}
