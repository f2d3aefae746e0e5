//! FAA Dynamic Regulatory System adapter.
//!
//! DRS serves document metadata search and full document content as JSON,
//! authenticated by a subscription key header. Field names vary slightly
//! between document families, so parsing is lenient.

use serde_json::Value;

use rg_domain::config::SourceEndpoint;
use rg_domain::document::{drs_key, Document, SourceKind};
use rg_domain::error::{Error, Result};

use super::PortalClient;

pub struct DrsClient {
    portal: PortalClient,
}

/// One search result row.
#[derive(Debug, Clone)]
pub struct DrsSummary {
    pub guid: String,
    pub doc_type: String,
    pub title: String,
    pub date: String,
}

impl DrsClient {
    pub fn from_config(cfg: &SourceEndpoint) -> Result<Self> {
        Ok(Self {
            portal: PortalClient::from_endpoint(cfg)?,
        })
    }

    /// Metadata search across DRS document families.
    pub async fn search(&self, query: &str, doc_type: Option<&str>) -> Result<Vec<DrsSummary>> {
        let url = format!("{}/search", self.portal.base_url);
        let mut params = vec![("q", query), ("size", "20")];
        if let Some(dt) = doc_type {
            params.push(("doctype", dt));
        }

        let text = self.portal.get_text(&url, &params).await?;
        let json: Value = serde_json::from_str(&text)
            .map_err(|e| Error::Http(format!("DRS search: unparseable response: {e}")))?;

        let rows = json
            .get("results")
            .or_else(|| json.get("documents"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(rows.iter().filter_map(parse_summary).collect())
    }

    /// Full document content by GUID.
    pub async fn fetch(&self, doc_type: &str, guid: &str) -> Result<Document> {
        let url = format!("{}/documents/{doc_type}/{guid}", self.portal.base_url);
        let text = self.portal.get_text(&url, &[]).await.map_err(|e| match e {
            Error::NotFound(_) => Error::NotFound(format!("No DRS document {doc_type}/{guid}")),
            other => other,
        })?;

        let json: Value = serde_json::from_str(&text)
            .map_err(|e| Error::Http(format!("DRS fetch: unparseable response: {e}")))?;

        let title = first_str(&json, &["title", "documentTitle", "name"])
            .unwrap_or_else(|| format!("DRS {doc_type} {guid}"));
        let body = first_str(&json, &["content", "body", "text", "documentContent"])
            .ok_or_else(|| Error::NotFound(format!("No DRS document {doc_type}/{guid}")))?;
        let citation = first_str(&json, &["citation", "documentNumber"])
            .unwrap_or_else(|| format!("FAA DRS {doc_type} {guid}"));

        Ok(Document::regulatory(
            drs_key(doc_type, guid),
            SourceKind::Drs,
            title,
            body,
            citation,
        ))
    }
}

fn parse_summary(row: &Value) -> Option<DrsSummary> {
    Some(DrsSummary {
        guid: first_str(row, &["guid", "documentGuid", "id"])?,
        doc_type: first_str(row, &["doctype", "docType", "documentType"]).unwrap_or_default(),
        title: first_str(row, &["title", "documentTitle"]).unwrap_or_default(),
        date: first_str(row, &["date", "documentDate", "effectiveDate"]).unwrap_or_default(),
    })
}

fn first_str(v: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| v.get(k).and_then(|f| f.as_str()))
        .map(str::to_owned)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_parses_alternate_field_names() {
        let row = serde_json::json!({
            "documentGuid": "abc-123",
            "docType": "AC",
            "documentTitle": "System Design and Analysis",
            "documentDate": "2024-02-01"
        });
        let s = parse_summary(&row).unwrap();
        assert_eq!(s.guid, "abc-123");
        assert_eq!(s.doc_type, "AC");
        assert_eq!(s.date, "2024-02-01");
    }

    #[test]
    fn summary_without_guid_is_dropped() {
        assert!(parse_summary(&serde_json::json!({"title": "x"})).is_none());
    }

    #[test]
    fn first_str_skips_empty_values() {
        let v = serde_json::json!({"title": "", "name": "fallback"});
        assert_eq!(first_str(&v, &["title", "name"]).unwrap(), "fallback");
    }
}
