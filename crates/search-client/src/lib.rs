//! HTTP client for the search proxy.
//!
//! The conversation backend has no path to the vector index except through
//! the proxy; this client is that path. It carries the regulatory-writer
//! credential only when constructed for the indexer — user-facing callers
//! are built without it and physically cannot issue regulatory writes.

use serde::{Deserialize, Serialize};

use rg_domain::document::Chunk;
use rg_domain::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub index: String,
    pub fingerprint: String,
    pub top: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub parent_id: String,
    #[serde(default)]
    pub chunk_index: u32,
    pub title: String,
    pub text: String,
    pub citation: String,
    pub source: String,
    #[serde(default)]
    pub owner_fingerprint: Option<String>,
    pub score: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone, Serialize)]
struct IndexRequest<'a> {
    index: &'a str,
    fingerprint: Option<&'a str>,
    documents: &'a [Chunk],
}

/// One personal upload as listed by the proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListedDocument {
    pub document_id: String,
    pub title: String,
    pub page_count: u32,
    pub uploaded_at: String,
    pub chunk_count: u32,
    #[serde(default)]
    pub file_hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ListResponse {
    documents: Vec<ListedDocument>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct SearchClient {
    http: reqwest::Client,
    base_url: String,
    /// Present only on the indexer's instance.
    regulatory_writer_token: Option<String>,
}

impl SearchClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            regulatory_writer_token: None,
        })
    }

    /// A client authorized for regulatory chunk writes. Only the indexer
    /// holds one of these.
    pub fn with_regulatory_writer(mut self, token: String) -> Self {
        self.regulatory_writer_token = Some(token);
        self
    }

    /// Semantic search over the caller-visible slice of an index.
    pub async fn search(&self, req: &SearchRequest) -> Result<Vec<SearchHit>> {
        let resp = self
            .http
            .post(format!("{}/search", self.base_url))
            .json(req)
            .send()
            .await
            .map_err(|e| Error::Http(format!("search proxy: {e}")))?;
        let resp = check_status(resp).await?;
        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Http(format!("search proxy: decoding response: {e}")))?;
        Ok(body.hits)
    }

    /// Upload embedded chunks. `fingerprint` is `None` for regulatory
    /// batches, which requires the writer credential.
    pub async fn index_documents(
        &self,
        index: &str,
        fingerprint: Option<&str>,
        chunks: &[Chunk],
    ) -> Result<()> {
        let body = IndexRequest {
            index,
            fingerprint,
            documents: chunks,
        };
        let mut rb = self.http.post(format!("{}/index", self.base_url)).json(&body);
        if let Some(ref token) = self.regulatory_writer_token {
            rb = rb.bearer_auth(token);
        }
        let resp = rb
            .send()
            .await
            .map_err(|e| Error::Http(format!("search proxy: {e}")))?;
        check_status(resp).await?;
        Ok(())
    }

    /// List a fingerprint's uploads in an index.
    pub async fn list_documents(
        &self,
        fingerprint: &str,
        index: &str,
    ) -> Result<Vec<ListedDocument>> {
        let resp = self
            .http
            .get(format!("{}/documents", self.base_url))
            .query(&[("fingerprint", fingerprint), ("index", index)])
            .send()
            .await
            .map_err(|e| Error::Http(format!("search proxy: {e}")))?;
        let resp = check_status(resp).await?;
        let body: ListResponse = resp
            .json()
            .await
            .map_err(|e| Error::Http(format!("search proxy: decoding response: {e}")))?;
        Ok(body.documents)
    }

    /// Ordered chunks of one personal document, for body reassembly.
    pub async fn get_document_chunks(
        &self,
        document_id: &str,
        fingerprint: &str,
        index: &str,
    ) -> Result<Vec<SearchHit>> {
        let resp = self
            .http
            .get(format!("{}/documents/{document_id}/chunks", self.base_url))
            .query(&[("fingerprint", fingerprint), ("index", index)])
            .send()
            .await
            .map_err(|e| Error::Http(format!("search proxy: {e}")))?;
        let resp = check_status(resp).await?;
        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Http(format!("search proxy: decoding response: {e}")))?;
        Ok(body.hits)
    }

    /// Delete every chunk of one personal document after an ownership check.
    pub async fn delete_document(
        &self,
        document_id: &str,
        fingerprint: &str,
        index: &str,
    ) -> Result<()> {
        let resp = self
            .http
            .delete(format!("{}/documents/{document_id}", self.base_url))
            .query(&[("fingerprint", fingerprint), ("index", index)])
            .send()
            .await
            .map_err(|e| Error::Http(format!("search proxy: {e}")))?;
        check_status(resp).await?;
        Ok(())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(match status.as_u16() {
        403 => Error::Ownership(body),
        404 => Error::NotFound(body),
        400 => Error::Http(format!("search proxy rejected request: {body}")),
        code if code >= 500 => Error::Transient(format!("search proxy HTTP {code}: {body}")),
        code => Error::Http(format!("search proxy HTTP {code}: {body}")),
    })
}
