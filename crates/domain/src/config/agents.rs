use serde::{Deserialize, Serialize};

/// Static tenant binding. Immutable at runtime: the registry is built once
/// at startup and shared read-only across turns.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    /// Vector-index namespace this agent reads and writes.
    pub index: String,
    #[serde(default)]
    pub system_prompt: String,
    /// Enabled subset of the fixed tool catalog. Empty = all tools.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Regexes used to extract citation strings from fetched bodies.
    #[serde(default)]
    pub citation_patterns: Vec<String>,
}

impl AgentConfig {
    /// Whether a tool from the catalog is enabled for this agent.
    pub fn allows_tool(&self, name: &str) -> bool {
        self.tools.is_empty() || self.tools.iter().any(|t| t == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tool_list_allows_everything() {
        let agent = AgentConfig::default();
        assert!(agent.allows_tool("fetch_cfr_section"));
    }

    #[test]
    fn explicit_tool_list_filters() {
        let agent = AgentConfig {
            tools: vec!["search_indexed_content".into()],
            ..Default::default()
        };
        assert!(agent.allows_tool("search_indexed_content"));
        assert!(!agent.allows_tool("fetch_drs_document"));
    }
}
