use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Bypass the cache entirely when false (testing only).
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Blob root; one JSON envelope per canonical id below it.
    #[serde(default = "d_cache_path")]
    pub path: std::path::PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: d_cache_path(),
        }
    }
}

/// Background-indexing behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Gate the second-retrieval promotion of cached documents into the
    /// vector corpus. Personal uploads index immediately regardless.
    #[serde(default = "d_true")]
    pub auto_on_second_hit: bool,
    /// Concurrent background indexing jobs.
    #[serde(default = "d_workers")]
    pub max_concurrent_jobs: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            auto_on_second_hit: true,
            max_concurrent_jobs: d_workers(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_cache_path() -> std::path::PathBuf {
    "./data/cache".into()
}
fn d_workers() -> usize {
    4
}
