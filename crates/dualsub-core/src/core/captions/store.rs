//! Segment Store
//!
//! Holds one generation of normalized caption segments. Raw collaborator
//! output is repaired exactly once, on construction:
//!
//! 1. stable sort by start time
//! 2. non-positive durations are extended to [`MIN_DURATION`]
//! 3. each segment is trimmed so it ends no later than the next one starts
//!
//! After the trim, segments left with zero length (equal start times) are
//! dropped. Stores are immutable; a new transcript produces a new store which
//! replaces the old one wholesale through [`SharedSegmentStore`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use super::CaptionSegment;
use crate::core::TimeSec;

/// Duration assigned to segments whose end does not follow their start
pub const MIN_DURATION: TimeSec = 1.5;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// Normalization
// =============================================================================

/// Sorts, repairs and de-overlaps raw segments
pub fn normalize(raw: Vec<CaptionSegment>) -> Vec<CaptionSegment> {
    let mut segments = raw;

    // sort_by is stable, so ties keep input order
    segments.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

    for segment in &mut segments {
        if segment.end_time <= segment.start_time {
            segment.end_time = segment.start_time + MIN_DURATION;
        }
    }

    // Extended above, so every duration is positive and overlap means `end > next start`
    for i in 1..segments.len() {
        if segments[i - 1].overlaps(&segments[i]) {
            segments[i - 1].end_time = segments[i].start_time;
        }
    }

    let before = segments.len();
    segments.retain(|s| s.end_time > s.start_time);
    let dropped = before - segments.len();
    if dropped > 0 {
        warn!(
            "Dropped {} caption segment(s) that shared a start time with the next one",
            dropped
        );
    }

    segments
}

// =============================================================================
// SegmentStore
// =============================================================================

/// Immutable, normalized, time-ordered caption segments
#[derive(Debug)]
pub struct SegmentStore {
    segments: Arc<[CaptionSegment]>,
    generation: u64,
}

impl SegmentStore {
    /// Normalizes raw collaborator output into a new generation
    pub fn from_raw(raw: Vec<CaptionSegment>) -> Self {
        let count = raw.len();
        let store = Self::from_normalized(normalize(raw));
        debug!(
            "Segment store generation {} built ({} raw, {} kept)",
            store.generation,
            count,
            store.len()
        );
        store
    }

    /// Wraps segments that are already normalized (e.g. reparsed caption files)
    pub fn from_normalized(segments: Vec<CaptionSegment>) -> Self {
        Self {
            segments: segments.into(),
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// An empty store
    pub fn empty() -> Self {
        Self::from_normalized(Vec::new())
    }

    pub fn segments(&self) -> &[CaptionSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CaptionSegment> {
        self.segments.get(index)
    }

    /// End time of the last segment, or 0 when empty
    pub fn duration(&self) -> TimeSec {
        self.segments.last().map(|s| s.end_time).unwrap_or(0.0)
    }

    /// Unique id of this generation
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Default for SegmentStore {
    fn default() -> Self {
        Self::empty()
    }
}

// =============================================================================
// SharedSegmentStore
// =============================================================================

/// Current segment generation, shared between playback and export
///
/// Readers take a snapshot and keep working on it even if a new generation is
/// installed meanwhile.
#[derive(Clone, Debug, Default)]
pub struct SharedSegmentStore {
    inner: Arc<RwLock<Arc<SegmentStore>>>,
}

impl SharedSegmentStore {
    pub fn new(store: SegmentStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(store))),
        }
    }

    /// Installs a new generation, returning the previous one
    pub fn replace(&self, store: SegmentStore) -> Arc<SegmentStore> {
        let next = Arc::new(store);
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, next)
    }

    /// Returns the current generation
    pub fn snapshot(&self) -> Arc<SegmentStore> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64, p: &str, s: &str) -> CaptionSegment {
        CaptionSegment::new(start, end, p, s)
    }

    fn assert_normalized(segments: &[CaptionSegment]) {
        for s in segments {
            assert!(s.end_time > s.start_time, "non-positive duration: {s:?}");
        }
        for pair in segments.windows(2) {
            assert!(pair[0].start_time <= pair[1].start_time, "unsorted");
            assert!(!pair[0].overlaps(&pair[1]), "overlap: {:?} / {:?}", pair[0], pair[1]);
        }
    }

    // -------------------------------------------------------------------------
    // Normalization Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_overlap_is_trimmed() {
        let out = normalize(vec![seg(0.0, 2.0, "A", "甲"), seg(1.5, 3.0, "B", "乙")]);
        assert_eq!(out, vec![seg(0.0, 1.5, "A", "甲"), seg(1.5, 3.0, "B", "乙")]);
    }

    #[test]
    fn test_zero_duration_gets_minimum() {
        let out = normalize(vec![seg(5.0, 5.0, "X", "X")]);
        assert_eq!(out, vec![seg(5.0, 6.5, "X", "X")]);
    }

    #[test]
    fn test_inverted_interval_gets_minimum() {
        let out = normalize(vec![seg(4.0, 1.0, "X", "X")]);
        assert_eq!(out[0].end_time, 5.5);
    }

    #[test]
    fn test_unsorted_input_is_sorted() {
        let out = normalize(vec![
            seg(10.0, 12.0, "c", "丙"),
            seg(0.0, 1.0, "a", "甲"),
            seg(5.0, 6.0, "b", "乙"),
        ]);
        let starts: Vec<f64> = out.iter().map(|s| s.start_time).collect();
        assert_eq!(starts, vec![0.0, 5.0, 10.0]);
    }

    #[test]
    fn test_extension_then_trim() {
        // The extended segment must still yield to its successor
        let out = normalize(vec![seg(1.0, 0.0, "a", "甲"), seg(2.0, 3.0, "b", "乙")]);
        assert_eq!(out[0].end_time, 2.0);
        assert_normalized(&out);
    }

    #[test]
    fn test_touching_segments_are_kept() {
        let raw = vec![seg(0.0, 1.0, "a", "甲"), seg(1.0, 2.0, "b", "乙")];
        assert_eq!(normalize(raw.clone()), raw);
    }

    #[test]
    fn test_shared_start_drops_zero_length() {
        let out = normalize(vec![
            seg(1.0, 2.0, "first", "一"),
            seg(1.0, 3.0, "second", "二"),
        ]);
        assert_eq!(out, vec![seg(1.0, 3.0, "second", "二")]);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize(vec![
            seg(3.0, 3.0, "a", "甲"),
            seg(0.0, 9.0, "b", "乙"),
            seg(2.0, 2.5, "c", "丙"),
            seg(2.0, 8.0, "d", "丁"),
            seg(7.5, 7.0, "e", "戊"),
        ]);
        assert_normalized(&once);
        assert_eq!(normalize(once.clone()), once);
    }

    #[test]
    fn test_normalize_pseudo_random_inputs() {
        // Deterministic LCG so the case set is stable
        let mut state: u64 = 0x2545_F491_4F6C_DD1D;
        let mut next = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 33) % 1000) as f64 / 10.0
        };

        for _ in 0..50 {
            let raw: Vec<CaptionSegment> = (0..20)
                .map(|i| {
                    let start = next();
                    let end = start + next() / 10.0 - 2.0;
                    seg(start, end, &format!("p{i}"), &format!("s{i}"))
                })
                .collect();
            let once = normalize(raw);
            assert_normalized(&once);
            assert_eq!(normalize(once.clone()), once);
        }
    }

    // -------------------------------------------------------------------------
    // Store Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_store_accessors() {
        let store = SegmentStore::from_raw(vec![seg(2.0, 4.0, "b", "乙"), seg(0.0, 1.0, "a", "甲")]);

        assert_eq!(store.len(), 2);
        assert!(!store.is_empty());
        assert_eq!(store.get(0).map(|s| s.primary_text.as_str()), Some("a"));
        assert!(store.get(2).is_none());
        assert_eq!(store.duration(), 4.0);
    }

    #[test]
    fn test_generations_are_unique() {
        let a = SegmentStore::empty();
        let b = SegmentStore::empty();
        assert_ne!(a.generation(), b.generation());
        assert_eq!(a.duration(), 0.0);
    }

    #[test]
    fn test_shared_store_replacement() {
        let shared = SharedSegmentStore::new(SegmentStore::from_raw(vec![seg(0.0, 1.0, "a", "甲")]));
        let before = shared.snapshot();

        let old = shared.replace(SegmentStore::from_raw(vec![
            seg(0.0, 1.0, "x", "甲"),
            seg(1.0, 2.0, "y", "乙"),
        ]));

        assert_eq!(old.generation(), before.generation());
        // Existing snapshot is untouched
        assert_eq!(before.len(), 1);
        assert_eq!(shared.snapshot().len(), 2);
    }
}
