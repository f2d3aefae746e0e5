use serde::{Deserialize, Serialize};

/// Upstream regulatory portals. Each adapter enforces its own per-second
/// rate budget and retries idempotent GETs once on transient failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "SourceEndpoint::cfr_default")]
    pub cfr: SourceEndpoint,
    #[serde(default = "SourceEndpoint::drs_default")]
    pub drs: SourceEndpoint,
    #[serde(default = "SourceEndpoint::aps_default")]
    pub aps: SourceEndpoint,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            cfr: SourceEndpoint::cfr_default(),
            drs: SourceEndpoint::drs_default(),
            aps: SourceEndpoint::aps_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEndpoint {
    pub base_url: String,
    /// Env var naming this source's API or subscription key. None = open.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Header the key is sent under (portals differ).
    #[serde(default = "d_api_key_header")]
    pub api_key_header: String,
    /// Requests per second budget for this source.
    #[serde(default = "d_rate")]
    pub rate_per_sec: u32,
    #[serde(default = "d_timeout")]
    pub timeout_s: u64,
}

impl Default for SourceEndpoint {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key_env: None,
            api_key_header: d_api_key_header(),
            rate_per_sec: d_rate(),
            timeout_s: d_timeout(),
        }
    }
}

impl SourceEndpoint {
    fn cfr_default() -> Self {
        Self {
            base_url: "https://www.ecfr.gov".into(),
            ..Default::default()
        }
    }

    fn drs_default() -> Self {
        Self {
            base_url: "https://drs.faa.gov/api".into(),
            api_key_env: Some("RG_DRS_API_KEY".into()),
            api_key_header: "Ocp-Apim-Subscription-Key".into(),
            ..Default::default()
        }
    }

    fn aps_default() -> Self {
        Self {
            base_url: "https://adams.nrc.gov/wba/services".into(),
            ..Default::default()
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_api_key_header() -> String {
    "x-api-key".into()
}
fn d_rate() -> u32 {
    2
}
fn d_timeout() -> u64 {
    30
}
