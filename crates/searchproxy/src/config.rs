use serde::{Deserialize, Serialize};

use rg_domain::config::{EmbeddingsConfig, ProviderConfig};
use rg_domain::error::{Error, Result};

/// Search proxy configuration. This process is the only holder of
/// vector-index credentials; nothing here is shared with the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    /// Env var for the regulatory-writer bearer. Requests uploading
    /// owner-less chunks must present it.
    #[serde(default = "d_writer_env")]
    pub regulatory_writer_env: String,
    pub upstream: UpstreamConfig,
    /// Embeddings endpoint used to vectorize incoming queries.
    pub query_embeddings: ProviderConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
}

/// The managed vector-index service behind the proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub base_url: String,
    /// Env var holding the index admin key.
    pub api_key_env: String,
    #[serde(default = "d_api_version")]
    pub api_version: String,
    #[serde(default = "d_timeout")]
    pub timeout_s: u64,
}

impl ProxyConfig {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))
    }
}

fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_port() -> u16 {
    8091
}
fn d_writer_env() -> String {
    "RG_REGULATORY_WRITER_TOKEN".into()
}
fn d_api_version() -> String {
    "2024-07-01".into()
}
fn d_timeout() -> u64 {
    15
}
