mod agents;
mod cache;
mod limits;
mod llm;
mod quota;
mod search;
mod server;
mod sources;

pub use agents::*;
pub use cache::*;
pub use limits::*;
pub use llm::*;
pub use quota::*;
pub use search::*;
pub use server::*;
pub use sources::*;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub search_proxy: SearchProxyConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    /// Tenant bindings (key = agent name, e.g. "faa-agent").
    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate cross-field constraints. Errors block startup; warnings
    /// are logged and tolerated.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.agents.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "agents".into(),
                message: "no agents configured; at least one [agents.<name>] section is required"
                    .into(),
            });
        }

        for (name, agent) in &self.agents {
            if agent.index.is_empty() {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    field: format!("agents.{name}.index"),
                    message: "missing vector-index name".into(),
                });
            } else if !self.search_proxy.indexes.is_empty()
                && !self.search_proxy.indexes.contains(&agent.index)
            {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    field: format!("agents.{name}.index"),
                    message: format!(
                        "'{}' is not in the search_proxy.indexes enumeration",
                        agent.index
                    ),
                });
            }
            if agent.system_prompt.trim().is_empty() {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Warning,
                    field: format!("agents.{name}.system_prompt"),
                    message: "empty system prompt".into(),
                });
            }
            for pattern in &agent.citation_patterns {
                if let Err(e) = regex::Regex::new(pattern) {
                    issues.push(ConfigIssue {
                        severity: ConfigSeverity::Error,
                        field: format!("agents.{name}.citation_patterns"),
                        message: format!("invalid regex '{pattern}': {e}"),
                    });
                }
            }
        }

        if self.search_proxy.url.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "search_proxy.url".into(),
                message: "missing search proxy URL".into(),
            });
        }

        if self.limits.max_tool_rounds == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "limits.max_tool_rounds".into(),
                message: "must be at least 1".into(),
            });
        }

        if !self.cache.enabled {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "cache.enabled".into(),
                message: "cache bypass is intended for testing only".into(),
            });
        }

        issues
    }
}
