//! NRC ADAMS public search adapter.
//!
//! ADAMS identifies documents by accession number (e.g. `ML20239A111`).
//! The search service returns result lists as JSON; document content comes
//! from the text endpoint.

use serde_json::Value;

use rg_domain::config::SourceEndpoint;
use rg_domain::document::{aps_key, Document, SourceKind};
use rg_domain::error::{Error, Result};

use super::PortalClient;

pub struct ApsClient {
    portal: PortalClient,
}

#[derive(Debug, Clone)]
pub struct ApsSummary {
    pub accession: String,
    pub title: String,
    pub date: String,
    pub doc_type: String,
}

impl ApsClient {
    pub fn from_config(cfg: &SourceEndpoint) -> Result<Self> {
        Ok(Self {
            portal: PortalClient::from_endpoint(cfg)?,
        })
    }

    pub async fn search(&self, query: &str) -> Result<Vec<ApsSummary>> {
        let url = format!("{}/search", self.portal.base_url);
        let text = self
            .portal
            .get_text(&url, &[("q", query), ("tab", "content-search-pars"), ("s", "20")])
            .await?;

        let json: Value = serde_json::from_str(&text)
            .map_err(|e| Error::Http(format!("ADAMS search: unparseable response: {e}")))?;

        let rows = json
            .pointer("/resultList/result")
            .or_else(|| json.get("results"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(rows.iter().filter_map(parse_summary).collect())
    }

    pub async fn fetch(&self, accession: &str) -> Result<Document> {
        let url = format!("{}/documents/{accession}/text", self.portal.base_url);
        let text = self.portal.get_text(&url, &[]).await.map_err(|e| match e {
            Error::NotFound(_) => Error::NotFound(format!("No ADAMS document {accession}")),
            other => other,
        })?;

        let json: Value = serde_json::from_str(&text)
            .map_err(|e| Error::Http(format!("ADAMS fetch: unparseable response: {e}")))?;

        let title = first_str(&json, &["title", "documentTitle"])
            .unwrap_or_else(|| format!("ADAMS {accession}"));
        let body = first_str(&json, &["content", "text", "body"])
            .ok_or_else(|| Error::NotFound(format!("No ADAMS document {accession}")))?;

        Ok(Document::regulatory(
            aps_key(accession),
            SourceKind::Aps,
            title,
            body,
            format!("NRC ADAMS {accession}"),
        ))
    }
}

fn parse_summary(row: &Value) -> Option<ApsSummary> {
    Some(ApsSummary {
        accession: first_str(row, &["AccessionNumber", "accession", "accessionNumber"])?,
        title: first_str(row, &["DocumentTitle", "title"]).unwrap_or_default(),
        date: first_str(row, &["DocumentDate", "date"]).unwrap_or_default(),
        doc_type: first_str(row, &["DocumentType", "docType"]).unwrap_or_default(),
    })
}

fn first_str(v: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| v.get(k).and_then(|f| f.as_str()))
        .map(str::to_owned)
        .filter(|s| !s.is_empty())
}
