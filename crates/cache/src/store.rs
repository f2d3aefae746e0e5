//! Content-addressed blob cache.
//!
//! One JSON-envelope blob per canonical id under the cache root, e.g.
//! `cfr/14-25-1309` -> `<root>/cfr/14-25-1309.json`. Regulatory keys are
//! agent-agnostic: the same CFR section fetched through two agents is one
//! entry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use rg_domain::config::CacheConfig;
use rg_domain::document::{Document, SourceKind};
use rg_domain::error::{Error, Result};

/// Whether a lookup was served from the cache or fetched upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
}

pub struct DocumentCache {
    root: PathBuf,
    enabled: bool,
    /// Per-key fetch coalescing: one upstream fetch per missing key,
    /// concurrent callers await the first.
    inflight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl DocumentCache {
    pub fn new(cfg: &CacheConfig) -> Result<Self> {
        if cfg.enabled {
            std::fs::create_dir_all(&cfg.path).map_err(Error::Io)?;
        }
        tracing::info!(path = %cfg.path.display(), enabled = cfg.enabled, "document cache ready");
        Ok(Self {
            root: cfg.path.clone(),
            enabled: cfg.enabled,
            inflight: Mutex::new(HashMap::new()),
        })
    }

    /// Look up a cached document.
    pub fn get(&self, kind: SourceKind, id: &str) -> Result<Option<Document>> {
        if !self.enabled {
            return Ok(None);
        }
        let path = self.blob_path(kind, id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| Error::Persistence(format!("reading {}: {e}", path.display())))?;
        let doc: Document = serde_json::from_str(&raw)
            .map_err(|e| Error::Persistence(format!("decoding {}: {e}", path.display())))?;
        Ok(Some(doc))
    }

    /// Write a document through, overwriting any previous envelope.
    pub fn put(&self, kind: SourceKind, id: &str, doc: &Document) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let path = self.blob_path(kind, id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }
        let json = serde_json::to_string(doc)
            .map_err(|e| Error::Persistence(format!("encoding {id}: {e}")))?;
        std::fs::write(&path, json)
            .map_err(|e| Error::Persistence(format!("writing {}: {e}", path.display())))?;
        Ok(())
    }

    /// Flag a document as present in the vector index. Idempotent; a
    /// missing blob is a no-op (the entry may have been overwritten while
    /// its indexing job ran).
    pub fn mark_indexed(&self, kind: SourceKind, id: &str, at: DateTime<Utc>) -> Result<()> {
        let Some(mut doc) = self.get(kind, id)? else {
            tracing::debug!(kind = %kind, id, "mark_indexed on absent entry");
            return Ok(());
        };
        doc.indexed = true;
        doc.indexed_at.get_or_insert(at);
        self.put(kind, id, &doc)
    }

    /// Bump the hit counter and persist. Returns the updated document.
    pub fn record_hit(&self, kind: SourceKind, id: &str) -> Result<Option<Document>> {
        let Some(mut doc) = self.get(kind, id)? else {
            return Ok(None);
        };
        doc.hit_count += 1;
        self.put(kind, id, &doc)?;
        Ok(Some(doc))
    }

    /// Cache-first lookup with per-key miss coalescing.
    ///
    /// On a hit the hit counter is bumped. On a miss, `fetch` runs under
    /// the key's lock, the result is written through with
    /// `hit_count = 0, indexed = false`, and concurrent callers of the
    /// same key find the fresh entry instead of fetching again.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        kind: SourceKind,
        id: &str,
        fetch: F,
    ) -> Result<(Document, CacheOutcome)>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Document>>,
    {
        if !self.enabled {
            return Ok((fetch().await?, CacheOutcome::Miss));
        }

        // Fast path: already cached.
        if let Some(doc) = self.record_hit(kind, id)? {
            return Ok((doc, CacheOutcome::Hit));
        }

        let key_lock = self.lock_for(kind, id);
        let _guard = key_lock.lock().await;

        // A concurrent fetch may have filled the entry while we waited.
        if let Some(doc) = self.record_hit(kind, id)? {
            return Ok((doc, CacheOutcome::Hit));
        }

        let mut doc = fetch().await?;
        doc.hit_count = 0;
        doc.indexed = false;
        doc.indexed_at = None;
        self.put(kind, id, &doc)?;
        Ok((doc, CacheOutcome::Miss))
    }

    fn lock_for(&self, kind: SourceKind, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.inflight
            .lock()
            .entry(format!("{kind}/{id}"))
            .or_default()
            .clone()
    }

    fn blob_path(&self, kind: SourceKind, id: &str) -> PathBuf {
        self.root
            .join(kind.as_str())
            .join(format!("{}.json", sanitize(id)))
    }
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rg_domain::config::CacheConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn cache() -> (tempfile::TempDir, DocumentCache) {
        let dir = tempfile::tempdir().unwrap();
        let cfg = CacheConfig {
            enabled: true,
            path: dir.path().join("cache"),
        };
        let cache = DocumentCache::new(&cfg).unwrap();
        (dir, cache)
    }

    fn doc(id: &str) -> Document {
        Document::regulatory(id, SourceKind::Cfr, "§25.1309", "Equipment, systems...", "14 CFR 25.1309")
    }

    #[test]
    fn get_after_put_is_bit_equal() {
        let (_dir, cache) = cache();
        let d = doc("cfr/14-25-1309");
        cache.put(SourceKind::Cfr, "14-25-1309", &d).unwrap();
        let loaded = cache.get(SourceKind::Cfr, "14-25-1309").unwrap().unwrap();
        assert_eq!(loaded.body, d.body);
        assert_eq!(loaded.content_hash, d.content_hash);
    }

    #[test]
    fn repeated_put_yields_same_final_state() {
        let (_dir, cache) = cache();
        let d = doc("cfr/14-25-1309");
        cache.put(SourceKind::Cfr, "14-25-1309", &d).unwrap();
        cache.put(SourceKind::Cfr, "14-25-1309", &d).unwrap();
        let loaded = cache.get(SourceKind::Cfr, "14-25-1309").unwrap().unwrap();
        assert_eq!(loaded.hit_count, d.hit_count);
        assert_eq!(loaded.body, d.body);
    }

    #[test]
    fn mark_indexed_is_idempotent() {
        let (_dir, cache) = cache();
        cache.put(SourceKind::Cfr, "x", &doc("cfr/x")).unwrap();
        let at = Utc::now();
        cache.mark_indexed(SourceKind::Cfr, "x", at).unwrap();
        let first = cache.get(SourceKind::Cfr, "x").unwrap().unwrap();
        cache.mark_indexed(SourceKind::Cfr, "x", Utc::now()).unwrap();
        let second = cache.get(SourceKind::Cfr, "x").unwrap().unwrap();
        assert!(first.indexed && second.indexed);
        assert_eq!(first.indexed_at, second.indexed_at);
    }

    #[test]
    fn mark_indexed_on_missing_entry_is_noop() {
        let (_dir, cache) = cache();
        cache.mark_indexed(SourceKind::Cfr, "ghost", Utc::now()).unwrap();
        assert!(cache.get(SourceKind::Cfr, "ghost").unwrap().is_none());
    }

    #[tokio::test]
    async fn miss_fetches_and_writes_through() {
        let (_dir, cache) = cache();
        let (d, outcome) = cache
            .get_or_fetch(SourceKind::Cfr, "14-25-1309", || async {
                Ok(doc("cfr/14-25-1309"))
            })
            .await
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Miss);
        assert_eq!(d.hit_count, 0);
        assert!(!d.indexed);
    }

    #[tokio::test]
    async fn hit_increments_counter() {
        let (_dir, cache) = cache();
        cache.put(SourceKind::Cfr, "k", &doc("cfr/k")).unwrap();
        let (d, outcome) = cache
            .get_or_fetch(SourceKind::Cfr, "k", || async { unreachable!() })
            .await
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Hit);
        assert_eq!(d.hit_count, 1);
    }

    #[tokio::test]
    async fn concurrent_misses_fetch_upstream_once() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = CacheConfig {
            enabled: true,
            path: dir.path().join("cache"),
        };
        let cache = std::sync::Arc::new(DocumentCache::new(&cfg).unwrap());
        let fetches = std::sync::Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let fetches = fetches.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch(SourceKind::Cfr, "shared", move || async move {
                        fetches.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok(doc("cfr/shared"))
                    })
                    .await
                    .unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_cache_always_fetches() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = CacheConfig {
            enabled: false,
            path: dir.path().join("cache"),
        };
        let cache = DocumentCache::new(&cfg).unwrap();
        for _ in 0..2 {
            let (_, outcome) = cache
                .get_or_fetch(SourceKind::Cfr, "k", || async { Ok(doc("cfr/k")) })
                .await
                .unwrap();
            assert_eq!(outcome, CacheOutcome::Miss);
        }
    }
}
