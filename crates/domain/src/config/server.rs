use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    /// Env var holding the opaque bearer secret shared with the
    /// fingerprint service. Unset env = dev mode, auth disabled.
    #[serde(default = "d_token_env")]
    pub api_token_env: String,
    #[serde(default = "d_concurrency")]
    pub max_concurrent_requests: usize,
    #[serde(default)]
    pub cors: CorsConfig,
    /// State directory for conversations and the document cache.
    #[serde(default = "d_state_path")]
    pub state_path: std::path::PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            api_token_env: d_token_env(),
            max_concurrent_requests: d_concurrency(),
            cors: CorsConfig::default(),
            state_path: d_state_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "d_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_origins(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_port() -> u16 {
    8090
}
fn d_token_env() -> String {
    "RG_API_TOKEN".into()
}
fn d_concurrency() -> usize {
    256
}
fn d_origins() -> Vec<String> {
    vec!["http://localhost:*".into()]
}
fn d_state_path() -> std::path::PathBuf {
    "./data".into()
}
