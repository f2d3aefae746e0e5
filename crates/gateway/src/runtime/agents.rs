//! Agent registry — immutable per-tenant bindings built once at startup.

use std::collections::HashMap;
use std::sync::Arc;

use rg_domain::config::{AgentConfig, Config};
use rg_domain::error::{Error, Result};

/// One tenant's binding: everything a turn needs to know about its agent.
pub struct AgentBinding {
    pub name: String,
    pub system_prompt: String,
    /// Vector-index namespace injected into tool context.
    pub search_index: String,
    pub config: AgentConfig,
    /// Compiled citation-extraction patterns.
    pub citation_patterns: Vec<regex::Regex>,
}

impl AgentBinding {
    /// Extract citation strings from a text using this agent's patterns,
    /// deduplicated in first-seen order.
    pub fn extract_citations(&self, text: &str) -> Vec<String> {
        let mut seen = Vec::new();
        for pattern in &self.citation_patterns {
            for m in pattern.find_iter(text) {
                let citation = m.as_str().to_owned();
                if !seen.contains(&citation) {
                    seen.push(citation);
                }
            }
        }
        seen
    }
}

/// Read-only, process-wide agent lookup.
pub struct AgentRegistry {
    agents: HashMap<String, Arc<AgentBinding>>,
}

impl AgentRegistry {
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut agents = HashMap::new();
        for (name, agent_cfg) in &config.agents {
            let citation_patterns = agent_cfg
                .citation_patterns
                .iter()
                .map(|p| {
                    regex::Regex::new(p).map_err(|e| {
                        Error::Config(format!("agents.{name}.citation_patterns: '{p}': {e}"))
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            agents.insert(
                name.clone(),
                Arc::new(AgentBinding {
                    name: name.clone(),
                    system_prompt: agent_cfg.system_prompt.clone(),
                    search_index: agent_cfg.index.clone(),
                    config: agent_cfg.clone(),
                    citation_patterns,
                }),
            );
        }
        Ok(Self { agents })
    }

    pub fn get(&self, name: &str) -> Option<Arc<AgentBinding>> {
        self.agents.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.agents.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
