use serde::{Deserialize, Serialize};

/// Where the search proxy lives and which index namespaces exist.
///
/// The conversation backend never talks to the vector index directly; the
/// proxy is the only holder of index credentials.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchProxyConfig {
    pub url: String,
    /// Fixed enumeration of per-tenant index namespaces. Agent bindings
    /// must reference one of these.
    #[serde(default)]
    pub indexes: Vec<String>,
    /// Env var holding the regulatory-writer credential. Only the indexer
    /// path is constructed with it; user-facing paths never see it.
    #[serde(default = "d_writer_env")]
    pub regulatory_writer_env: String,
}

fn d_writer_env() -> String {
    "RG_REGULATORY_WRITER_TOKEN".into()
}
