use serde::{Deserialize, Serialize};

/// Daily per-fingerprint message budget. The counter itself lives behind
/// the gateway's quota gate; this only carries the limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// None = unlimited.
    #[serde(default = "d_daily")]
    pub daily_messages: Option<u32>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_messages: d_daily(),
        }
    }
}

fn d_daily() -> Option<u32> {
    Some(50)
}
