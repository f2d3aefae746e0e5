use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Tool rounds per turn before the forced tools-disabled synthesis.
    #[serde(default = "d_8")]
    pub max_tool_rounds: u32,
    /// Soft cap on one turn, seconds.
    #[serde(default = "d_120")]
    pub turn_timeout_s: u64,
    /// Default per-tool execution timeout, seconds.
    #[serde(default = "d_30")]
    pub tool_timeout_s: u64,
    /// Timeout for the slow tool class (personal-document reassembly and
    /// search, which may embed many paragraphs), seconds.
    #[serde(default = "d_60")]
    pub slow_tool_timeout_s: u64,
    #[serde(default)]
    pub personal_docs: PersonalDocLimits,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: d_8(),
            turn_timeout_s: d_120(),
            tool_timeout_s: d_30(),
            slow_tool_timeout_s: d_60(),
            personal_docs: PersonalDocLimits::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalDocLimits {
    #[serde(default = "d_20")]
    pub max_size_mb: u32,
    #[serde(default = "d_20")]
    pub max_per_user: u32,
}

impl Default for PersonalDocLimits {
    fn default() -> Self {
        Self {
            max_size_mb: d_20(),
            max_per_user: d_20(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_8() -> u32 {
    8
}
fn d_120() -> u64 {
    120
}
fn d_30() -> u64 {
    30
}
fn d_60() -> u64 {
    60
}
fn d_20() -> u32 {
    20
}
