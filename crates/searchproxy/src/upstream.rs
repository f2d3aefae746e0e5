//! Thin client for the managed vector-index service.
//!
//! The admin key lives here and nowhere else in the system. The REST shape
//! follows the index service's published contract: per-index document
//! collections, vector queries with an attached filter expression, and
//! batched upload/delete.

use serde::Deserialize;
use serde_json::Value;

use rg_domain::document::Chunk;
use rg_domain::error::{Error, Result};

use crate::config::UpstreamConfig;

#[derive(Clone)]
pub struct VectorIndexClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_version: String,
}

/// One stored chunk as the index returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexedChunk {
    pub chunk_id: String,
    pub parent_id: String,
    #[serde(default)]
    pub chunk_index: u32,
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub citation: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub owner_fingerprint: Option<String>,
    #[serde(default)]
    pub uploaded_at: String,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default)]
    pub file_hash: Option<String>,
    #[serde(default)]
    pub score: f32,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    results: Vec<IndexedChunk>,
}

impl VectorIndexClient {
    pub fn new(cfg: &UpstreamConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env)
            .map_err(|_| Error::Auth(format!("environment variable '{}' not set", cfg.api_key_env)))?;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_s))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
            api_key,
            api_version: cfg.api_version.clone(),
        })
    }

    /// Vector query with a mandatory filter expression.
    pub async fn query(
        &self,
        index: &str,
        vector: &[f32],
        filter: &str,
        top: usize,
    ) -> Result<Vec<IndexedChunk>> {
        let body = serde_json::json!({
            "vector": vector,
            "filter": filter,
            "top": top,
        });
        let resp = self
            .request(reqwest::Method::POST, index, "query")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(format!("index upstream: {e}")))?;
        let resp = Self::check(resp).await?;
        let body: QueryResponse = resp
            .json()
            .await
            .map_err(|e| Error::Http(format!("index upstream: decoding query response: {e}")))?;
        Ok(body.results)
    }

    /// Filter-only scan, used for listing and ownership checks.
    pub async fn scan(&self, index: &str, filter: &str) -> Result<Vec<IndexedChunk>> {
        let body = serde_json::json!({ "filter": filter, "top": 10_000 });
        let resp = self
            .request(reqwest::Method::POST, index, "scan")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(format!("index upstream: {e}")))?;
        let resp = Self::check(resp).await?;
        let body: QueryResponse = resp
            .json()
            .await
            .map_err(|e| Error::Http(format!("index upstream: decoding scan response: {e}")))?;
        Ok(body.results)
    }

    /// Upsert a chunk batch.
    pub async fn upload(&self, index: &str, chunks: &[Chunk]) -> Result<()> {
        let docs: Vec<Value> = chunks
            .iter()
            .map(|c| {
                serde_json::json!({
                    "chunk_id": c.chunk_id,
                    "parent_id": c.parent_id,
                    "chunk_index": c.chunk_index,
                    "title": c.title,
                    "text": c.text,
                    "citation": c.citation,
                    "source": c.source,
                    "owner_fingerprint": c.owner_fingerprint,
                    "uploaded_at": c.uploaded_at,
                    "page_count": c.page_count,
                    "file_hash": c.file_hash,
                    "embedding": c.embedding,
                })
            })
            .collect();
        let resp = self
            .request(reqwest::Method::POST, index, "docs")
            .json(&serde_json::json!({ "documents": docs }))
            .send()
            .await
            .map_err(|e| Error::Http(format!("index upstream: {e}")))?;
        Self::check(resp).await?;
        Ok(())
    }

    /// Delete chunks by id.
    pub async fn delete(&self, index: &str, chunk_ids: &[String]) -> Result<()> {
        let resp = self
            .request(reqwest::Method::POST, index, "docs/delete")
            .json(&serde_json::json!({ "ids": chunk_ids }))
            .send()
            .await
            .map_err(|e| Error::Http(format!("index upstream: {e}")))?;
        Self::check(resp).await?;
        Ok(())
    }

    fn request(&self, method: reqwest::Method, index: &str, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(
                method,
                format!("{}/indexes/{index}/{path}", self.base_url),
            )
            .query(&[("api-version", &self.api_version)])
            .header("api-key", &self.api_key)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            404 => Error::NotFound(format!("index upstream: {body}")),
            code if code >= 500 => Error::Transient(format!("index upstream HTTP {code}: {body}")),
            code => Error::Http(format!("index upstream HTTP {code}: {body}")),
        })
    }
}
