use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Dimensionality of every embedding vector in the index.
pub const EMBEDDING_DIM: usize = 1024;

/// Where a document came from. Regulatory kinds share one cache entry per
/// canonical id regardless of which agent caused the fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Code of Federal Regulations (eCFR).
    Cfr,
    /// FAA Dynamic Regulatory System.
    Drs,
    /// NRC ADAMS public search.
    Aps,
    /// A user's own upload.
    Personal,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Cfr => "cfr",
            SourceKind::Drs => "drs",
            SourceKind::Aps => "aps",
            SourceKind::Personal => "personal",
        }
    }

    pub fn is_regulatory(&self) -> bool {
        !matches!(self, SourceKind::Personal)
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cached regulatory or personal document.
///
/// Invariant: `owner_fingerprint` is `None` iff `source.is_regulatory()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Source-prefixed canonical id, e.g. `cfr/14-25-1309`.
    pub doc_id: String,
    pub source: SourceKind,
    pub title: String,
    pub body: String,
    pub citation: String,
    #[serde(default)]
    pub owner_fingerprint: Option<String>,
    #[serde(default)]
    pub page_count: u32,
    /// SHA-256 of the body (or uploaded file bytes for personal docs).
    pub content_hash: String,
    pub cached_at: DateTime<Utc>,
    #[serde(default)]
    pub hit_count: u32,
    #[serde(default)]
    pub indexed: bool,
    #[serde(default)]
    pub indexed_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn regulatory(
        doc_id: impl Into<String>,
        source: SourceKind,
        title: impl Into<String>,
        body: impl Into<String>,
        citation: impl Into<String>,
    ) -> Self {
        let body = body.into();
        Self {
            doc_id: doc_id.into(),
            source,
            title: title.into(),
            content_hash: content_hash(body.as_bytes()),
            body,
            citation: citation.into(),
            owner_fingerprint: None,
            page_count: 0,
            cached_at: Utc::now(),
            hit_count: 0,
            indexed: false,
            indexed_at: None,
        }
    }

    /// Check the ownership invariant.
    pub fn ownership_consistent(&self) -> bool {
        self.source.is_regulatory() == self.owner_fingerprint.is_none()
    }
}

/// One embedded excerpt of a document as stored in the vector index.
///
/// Invariant: `owner_fingerprint` equals the parent document's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// `{parent_id}-{index}`, slashes flattened for index key safety.
    pub chunk_id: String,
    pub parent_id: String,
    pub chunk_index: u32,
    pub title: String,
    pub text: String,
    pub citation: String,
    pub source: SourceKind,
    #[serde(default)]
    pub owner_fingerprint: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default)]
    pub page_count: u32,
    pub file_hash: String,
    /// 1024-dim embedding. Empty until the indexer fills it.
    #[serde(default)]
    pub embedding: Vec<f32>,
}

// ── Canonical ids ──────────────────────────────────────────────────
//
// Regulatory keys are agent-agnostic: the same CFR section fetched by two
// agents resolves to one cache entry.

pub fn cfr_key(title: u32, part: u32, section: &str) -> String {
    format!("cfr/{title}-{part}-{section}")
}

pub fn drs_key(doc_type: &str, guid: &str) -> String {
    format!("drs/{doc_type}-{guid}")
}

pub fn aps_key(accession: &str) -> String {
    format!("aps/{accession}")
}

/// Personal documents are a distinct key family with no source prefix;
/// the id doubles as the model-facing `document_id`.
pub fn personal_key(fingerprint: &str, id: &uuid::Uuid) -> String {
    format!("{fingerprint}-{id}")
}

/// Split a canonical id into `(kind, local id)`. Returns `None` for ids
/// without a known source prefix.
pub fn split_key(doc_id: &str) -> Option<(SourceKind, &str)> {
    let (prefix, rest) = doc_id.split_once('/')?;
    let kind = match prefix {
        "cfr" => SourceKind::Cfr,
        "drs" => SourceKind::Drs,
        "aps" => SourceKind::Aps,
        "personal" => SourceKind::Personal,
        _ => return None,
    };
    Some((kind, rest))
}

/// Hex SHA-256 of raw content bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Chunk id derived from a parent id and position. Slashes become dashes
/// so the id is a single index-safe token.
pub fn chunk_id(parent_id: &str, index: u32) -> String {
    format!("{}-{}", parent_id.replace('/', "-"), index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_keys() {
        assert_eq!(cfr_key(14, 25, "1309"), "cfr/14-25-1309");
        assert_eq!(drs_key("AC", "abc-123"), "drs/AC-abc-123");
        assert_eq!(aps_key("ML20239A111"), "aps/ML20239A111");
    }

    #[test]
    fn split_key_round_trip() {
        let (kind, rest) = split_key("cfr/14-25-1309").unwrap();
        assert_eq!(kind, SourceKind::Cfr);
        assert_eq!(rest, "14-25-1309");
        assert!(split_key("unknown/x").is_none());
        assert!(split_key("no-prefix").is_none());
    }

    #[test]
    fn regulatory_document_has_no_owner() {
        let doc = Document::regulatory("cfr/14-25-1309", SourceKind::Cfr, "t", "b", "14 CFR 25.1309");
        assert!(doc.ownership_consistent());
        assert!(doc.owner_fingerprint.is_none());
        assert_eq!(doc.hit_count, 0);
        assert!(!doc.indexed);
    }

    #[test]
    fn personal_document_requires_owner() {
        let mut doc = Document::regulatory("x", SourceKind::Personal, "t", "b", "c");
        assert!(!doc.ownership_consistent());
        doc.owner_fingerprint = Some("fp1".into());
        assert!(doc.ownership_consistent());
    }

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(content_hash(b"abc"), content_hash(b"abc"));
        assert_ne!(content_hash(b"abc"), content_hash(b"abd"));
        assert_eq!(content_hash(b"abc").len(), 64);
    }

    #[test]
    fn chunk_id_flattens_slashes() {
        assert_eq!(chunk_id("cfr/14-25-1309", 2), "cfr-14-25-1309-2");
    }
}
