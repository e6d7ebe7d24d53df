//! Active Segment Locator
//!
//! Finds the caption active at a clock position. Playback clocks mostly move
//! forward in small steps, so the locator remembers where it last matched and
//! scans forward from there; a seek backwards falls back to scanning the
//! prefix before the cursor.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::{CaptionSegment, SegmentStore};
use crate::core::{CoreError, CoreResult, SessionId, TimeSec};

// =============================================================================
// Locator
// =============================================================================

/// Cursor-based lookup over one segment generation
#[derive(Debug)]
pub struct ActiveSegmentLocator {
    store: Arc<SegmentStore>,
    /// Index of the last returned segment
    cursor: Option<usize>,
}

impl ActiveSegmentLocator {
    pub fn new(store: Arc<SegmentStore>) -> Self {
        Self {
            store,
            cursor: None,
        }
    }

    /// Returns the segment containing `time`, if any
    pub fn locate(&mut self, time: TimeSec) -> Option<&CaptionSegment> {
        let index = self.find(time)?;
        self.cursor = Some(index);
        self.store.get(index)
    }

    fn find(&self, time: TimeSec) -> Option<usize> {
        let segments = self.store.segments();

        if let Some(cursor) = self.cursor {
            if segments.get(cursor).is_some_and(|s| s.contains(time)) {
                return Some(cursor);
            }
        }

        let from = self.cursor.unwrap_or(0);
        for (index, segment) in segments.iter().enumerate().skip(from) {
            if segment.start_time > time {
                break;
            }
            if segment.contains(time) {
                return Some(index);
            }
        }

        match self.cursor {
            Some(cursor) if cursor > 0 => segments[..cursor.min(segments.len())]
                .iter()
                .position(|s| s.contains(time)),
            _ => None,
        }
    }

    /// Forgets the cursor; call after an explicit seek
    pub fn reset(&mut self) {
        self.cursor = None;
    }

    /// Switches to a new segment generation
    pub fn rebind(&mut self, store: Arc<SegmentStore>) {
        self.store = store;
        self.cursor = None;
    }

    pub fn store(&self) -> &Arc<SegmentStore> {
        &self.store
    }
}

// =============================================================================
// Playback Sessions
// =============================================================================

/// Arena of independent locators, one per playback surface
#[derive(Debug, Default)]
pub struct PlaybackSessions {
    sessions: HashMap<SessionId, ActiveSegmentLocator>,
}

impl PlaybackSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a session over the given store and returns its id
    pub fn open(&mut self, store: Arc<SegmentStore>) -> SessionId {
        let id = ulid::Ulid::new().to_string();
        debug!("Opened playback session {} (generation {})", id, store.generation());
        self.sessions.insert(id.clone(), ActiveSegmentLocator::new(store));
        id
    }

    pub fn locate(&mut self, id: &str, time: TimeSec) -> CoreResult<Option<CaptionSegment>> {
        Ok(self.session_mut(id)?.locate(time).cloned())
    }

    pub fn seek(&mut self, id: &str) -> CoreResult<()> {
        self.session_mut(id)?.reset();
        Ok(())
    }

    pub fn rebind(&mut self, id: &str, store: Arc<SegmentStore>) -> CoreResult<()> {
        self.session_mut(id)?.rebind(store);
        Ok(())
    }

    pub fn close(&mut self, id: &str) -> CoreResult<()> {
        self.sessions
            .remove(id)
            .map(|_| debug!("Closed playback session {}", id))
            .ok_or_else(|| CoreError::SessionNotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn session_mut(&mut self, id: &str) -> CoreResult<&mut ActiveSegmentLocator> {
        self.sessions
            .get_mut(id)
            .ok_or_else(|| CoreError::SessionNotFound(id.to_string()))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Arc<SegmentStore> {
        Arc::new(SegmentStore::from_raw(vec![
            CaptionSegment::new(0.0, 1.0, "a", "甲"),
            CaptionSegment::new(1.0, 2.0, "b", "乙"),
            CaptionSegment::new(3.0, 4.5, "c", "丙"),
            CaptionSegment::new(6.0, 8.0, "d", "丁"),
        ]))
    }

    fn reference(store: &SegmentStore, t: f64) -> Option<&CaptionSegment> {
        store.segments().iter().find(|s| s.contains(t))
    }

    // -------------------------------------------------------------------------
    // Locator Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_monotonic_queries_match_linear_scan() {
        let store = store();
        let mut locator = ActiveSegmentLocator::new(store.clone());

        let mut t = -0.5;
        while t < 9.0 {
            let expected = reference(&store, t).cloned();
            assert_eq!(locator.locate(t).cloned(), expected, "t = {t}");
            t += 1.0 / 30.0;
        }
    }

    #[test]
    fn test_gap_returns_none() {
        let mut locator = ActiveSegmentLocator::new(store());
        assert!(locator.locate(2.5).is_none());
        assert!(locator.locate(5.0).is_none());
        assert!(locator.locate(100.0).is_none());
    }

    #[test]
    fn test_boundary_belongs_to_next_segment() {
        let mut locator = ActiveSegmentLocator::new(store());
        assert_eq!(locator.locate(0.5).unwrap().primary_text, "a");
        assert_eq!(locator.locate(1.0).unwrap().primary_text, "b");
    }

    #[test]
    fn test_backward_seek_without_reset() {
        let mut locator = ActiveSegmentLocator::new(store());
        assert_eq!(locator.locate(7.0).unwrap().primary_text, "d");
        assert_eq!(locator.locate(0.2).unwrap().primary_text, "a");
        assert_eq!(locator.locate(3.5).unwrap().primary_text, "c");
    }

    #[test]
    fn test_random_seeks_match_linear_scan() {
        let store = store();
        let mut locator = ActiveSegmentLocator::new(store.clone());
        for t in [7.9, 0.0, 4.4, 1.99, 6.0, 2.0, 8.0, 3.0, 0.99, -1.0] {
            assert_eq!(locator.locate(t).cloned(), reference(&store, t).cloned(), "t = {t}");
        }
    }

    #[test]
    fn test_rebind_clears_cursor() {
        let mut locator = ActiveSegmentLocator::new(store());
        locator.locate(7.0);

        let replacement = Arc::new(SegmentStore::from_raw(vec![CaptionSegment::new(
            0.0, 1.0, "new", "新",
        )]));
        locator.rebind(replacement);

        assert_eq!(locator.locate(0.5).unwrap().primary_text, "new");
        assert!(locator.locate(7.0).is_none());
    }

    #[test]
    fn test_empty_store() {
        let mut locator = ActiveSegmentLocator::new(Arc::new(SegmentStore::empty()));
        assert!(locator.locate(0.0).is_none());
        locator.reset();
        assert!(locator.locate(1.0).is_none());
    }

    // -------------------------------------------------------------------------
    // Session Arena Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_sessions_are_independent() {
        let mut sessions = PlaybackSessions::new();
        let a = sessions.open(store());
        let b = sessions.open(store());
        assert_ne!(a, b);
        assert_eq!(sessions.len(), 2);

        assert_eq!(sessions.locate(&a, 7.0).unwrap().unwrap().primary_text, "d");
        assert_eq!(sessions.locate(&b, 0.5).unwrap().unwrap().primary_text, "a");
        sessions.seek(&a).unwrap();
        assert_eq!(sessions.locate(&a, 3.0).unwrap().unwrap().primary_text, "c");
    }

    #[test]
    fn test_unknown_session() {
        let mut sessions = PlaybackSessions::new();
        let id = sessions.open(store());
        sessions.close(&id).unwrap();

        assert!(matches!(sessions.locate(&id, 0.0), Err(CoreError::SessionNotFound(_))));
        assert!(matches!(sessions.close(&id), Err(CoreError::SessionNotFound(_))));
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_session_rebind() {
        let mut sessions = PlaybackSessions::new();
        let id = sessions.open(Arc::new(SegmentStore::empty()));
        assert!(sessions.locate(&id, 0.5).unwrap().is_none());

        sessions.rebind(&id, store()).unwrap();
        assert!(sessions.locate(&id, 0.5).unwrap().is_some());
    }
}
