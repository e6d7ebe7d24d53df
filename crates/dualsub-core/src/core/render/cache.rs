//! Export Cache
//!
//! Remembers the most recent completed export. A request whose fingerprint
//! matches is answered from memory without decoding or encoding anything.
//!
//! The fingerprint is the hex SHA-256 of a canonical JSON document describing
//! everything that affects the burned-in output: the source file identity, the
//! segment list, view mode, style and requested format.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::debug;

use super::codec::ExportFormat;
use crate::core::captions::{CaptionSegment, StyleConfig, ViewMode};
use crate::core::{CoreResult, Fingerprint};

// =============================================================================
// Fingerprint
// =============================================================================

/// Identity of a source file on disk
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceIdentity {
    pub canonical_path: PathBuf,
    pub size_bytes: u64,
    /// Modification time in milliseconds since the Unix epoch
    pub modified_ms: u64,
}

impl SourceIdentity {
    pub fn from_path(path: &Path) -> CoreResult<Self> {
        let canonical_path = std::fs::canonicalize(path)?;
        let metadata = std::fs::metadata(&canonical_path)?;
        let modified_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Ok(Self {
            canonical_path,
            size_bytes: metadata.len(),
            modified_ms,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FingerprintInput<'a> {
    source: &'a SourceIdentity,
    segments: &'a [CaptionSegment],
    view_mode: ViewMode,
    style: &'a StyleConfig,
    format: ExportFormat,
}

/// Computes the cache key for an export request
pub fn compute_fingerprint(
    source: &SourceIdentity,
    segments: &[CaptionSegment],
    view_mode: ViewMode,
    style: &StyleConfig,
    format: ExportFormat,
) -> CoreResult<Fingerprint> {
    let canonical = serde_json::to_vec(&FingerprintInput {
        source,
        segments,
        view_mode,
        style,
        format,
    })?;

    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}

/// `{source stem}_captioned.{extension}`
pub fn suggested_file_name(source: &Path, extension: &str) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "video".to_string());
    format!("{}_captioned.{}", stem, extension)
}

// =============================================================================
// Cache
// =============================================================================

/// A completed export
#[derive(Clone, Debug)]
pub struct ExportCacheEntry {
    pub fingerprint: Fingerprint,
    pub artifact_bytes: Arc<Vec<u8>>,
    pub suggested_file_name: String,
    pub mime: &'static str,
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Times a newer export replaced the cached one
    pub replacements: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

/// Single-slot export cache
#[derive(Debug, Default)]
pub struct ExportCache {
    slot: RwLock<Option<ExportCacheEntry>>,
    stats: RwLock<CacheStats>,
}

impl ExportCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached entry only on an exact fingerprint match
    pub async fn get(&self, fingerprint: &str) -> Option<ExportCacheEntry> {
        let found = self
            .slot
            .read()
            .await
            .as_ref()
            .filter(|entry| entry.fingerprint == fingerprint)
            .cloned();

        let mut stats = self.stats.write().await;
        if found.is_some() {
            stats.hits += 1;
            debug!("Export cache hit for {}", short(fingerprint));
        } else {
            stats.misses += 1;
        }
        let total = stats.hits + stats.misses;
        stats.hit_rate = stats.hits as f64 / total as f64;

        found
    }

    /// Stores `entry`, replacing whatever was cached
    pub async fn put(&self, entry: ExportCacheEntry) {
        debug!(
            "Caching export {} ({} bytes)",
            short(&entry.fingerprint),
            entry.artifact_bytes.len()
        );
        let previous = self.slot.write().await.replace(entry);
        if previous.is_some() {
            self.stats.write().await.replacements += 1;
        }
    }

    pub async fn clear(&self) {
        *self.slot.write().await = None;
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }
}

fn short(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}

// =============================================================================
// Tests
// =============================================================================
