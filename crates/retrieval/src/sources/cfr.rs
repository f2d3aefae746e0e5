//! eCFR adapter.
//!
//! The versioner API serves full section text as XML for a point-in-time
//! date (`YYYY-MM-DD`). The adapter strips the markup down to readable
//! text with section headings preserved.

use chrono::Utc;

use rg_domain::config::SourceEndpoint;
use rg_domain::document::{cfr_key, Document, SourceKind};
use rg_domain::error::{Error, Result};

use super::PortalClient;

pub struct CfrClient {
    portal: PortalClient,
}

impl CfrClient {
    pub fn from_config(cfg: &SourceEndpoint) -> Result<Self> {
        Ok(Self {
            portal: PortalClient::from_endpoint(cfg)?,
        })
    }

    /// Fetch one section's complete text, at `date` or today's edition.
    pub async fn fetch_section(
        &self,
        title: u32,
        part: u32,
        section: &str,
        date: Option<&str>,
    ) -> Result<Document> {
        let date = match date {
            Some(d) => validate_date(d)?,
            None => Utc::now().format("%Y-%m-%d").to_string(),
        };
        let citation = format!("{title} CFR {part}.{section}");
        let url = format!(
            "{}/api/versioner/v1/full/{date}/title-{title}.xml",
            self.portal.base_url
        );
        let section_param = format!("{part}.{section}");

        let xml = self
            .portal
            .get_text(&url, &[("part", &part.to_string()), ("section", &section_param)])
            .await
            .map_err(|e| match e {
                Error::NotFound(_) => Error::NotFound(format!("No document at {citation}")),
                other => other,
            })?;

        let body = xml_to_text(&xml);
        if body.trim().is_empty() {
            return Err(Error::NotFound(format!("No document at {citation}")));
        }

        Ok(Document::regulatory(
            cfr_key(title, part, section),
            SourceKind::Cfr,
            format!("{title} CFR §{part}.{section}"),
            body,
            citation,
        ))
    }
}

fn validate_date(date: &str) -> Result<String> {
    chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| Error::Http(format!("invalid date '{date}', expected YYYY-MM-DD")))?;
    Ok(date.to_owned())
}

/// Reduce eCFR XML to plain text. Heading elements (`HEAD`) become
/// markdown headings; other block elements become paragraph breaks.
fn xml_to_text(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len() / 2);
    let mut rest = xml;
    let mut in_head = false;

    while let Some(open) = rest.find('<') {
        let text = &rest[..open];
        push_text(&mut out, text, in_head);

        let Some(close) = rest[open..].find('>') else { break };
        let tag = &rest[open + 1..open + close];
        let name = tag
            .trim_start_matches('/')
            .split([' ', '\t', '\n'])
            .next()
            .unwrap_or("")
            .to_ascii_uppercase();

        match name.as_str() {
            "HEAD" => {
                if tag.starts_with('/') {
                    out.push('\n');
                    in_head = false;
                } else {
                    if !out.is_empty() && !out.ends_with('\n') {
                        out.push('\n');
                    }
                    out.push_str("## ");
                    in_head = true;
                }
            }
            "P" | "DIV3" | "DIV5" | "DIV8" | "FP" => {
                if tag.starts_with('/') && !out.ends_with("\n\n") {
                    out.push_str("\n\n");
                }
            }
            _ => {}
        }

        rest = &rest[open + close + 1..];
    }
    push_text(&mut out, rest, in_head);

    // Collapse runs of blank lines left by nested block elements.
    let mut cleaned = String::with_capacity(out.len());
    let mut blank_run = 0;
    for line in out.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        cleaned.push_str(line.trim_end());
        cleaned.push('\n');
    }
    cleaned.trim().to_owned()
}

fn push_text(out: &mut String, text: &str, single_line: bool) {
    let decoded = text
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x2019;", "'");
    if single_line {
        out.push_str(decoded.split_whitespace().collect::<Vec<_>>().join(" ").as_str());
    } else {
        out.push_str(&decoded);
    }
}
