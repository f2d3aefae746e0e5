//! Provider registry — resolves the configured completion adapter and the
//! fixed embeddings provider from `[llm]` config at startup.

use std::collections::HashMap;
use std::sync::Arc;

use rg_domain::config::{LlmConfig, ProviderKind};
use rg_domain::error::{Error, Result};

use crate::anthropic::AnthropicProvider;
use crate::embeddings::OpenAiEmbeddings;
use crate::traits::{EmbeddingsProvider, LlmProvider};

pub struct ProviderRegistry {
    chat: HashMap<String, Arc<dyn LlmProvider>>,
    embeddings: Option<Arc<dyn EmbeddingsProvider>>,
    default_chat: String,
}

impl ProviderRegistry {
    /// Initialize every configured provider. A provider whose credentials
    /// fail to resolve is skipped with a warning; the registry is only an
    /// error when the default completion adapter itself is unavailable.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let mut chat: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        let mut embeddings: Option<Arc<dyn EmbeddingsProvider>> = None;

        for provider_cfg in &cfg.providers {
            match provider_cfg.kind {
                ProviderKind::Anthropic => {
                    match AnthropicProvider::from_config(provider_cfg, cfg.request_timeout_ms) {
                        Ok(p) => {
                            chat.insert(provider_cfg.id.clone(), Arc::new(p));
                        }
                        Err(e) => {
                            tracing::warn!(
                                provider = %provider_cfg.id,
                                error = %e,
                                "skipping chat provider"
                            );
                        }
                    }
                }
                ProviderKind::OpenaiCompat => {
                    if provider_cfg.id == cfg.embeddings.provider {
                        match OpenAiEmbeddings::from_config(provider_cfg, &cfg.embeddings) {
                            Ok(p) => embeddings = Some(Arc::new(p)),
                            Err(e) => {
                                tracing::warn!(
                                    provider = %provider_cfg.id,
                                    error = %e,
                                    "skipping embeddings provider"
                                );
                            }
                        }
                    }
                }
            }
        }

        if !chat.contains_key(&cfg.provider) {
            return Err(Error::Config(format!(
                "llm.provider '{}' did not initialize; check [[llm.providers]] and credentials",
                cfg.provider
            )));
        }

        Ok(Self {
            chat,
            embeddings,
            default_chat: cfg.provider.clone(),
        })
    }

    /// The configured completion adapter.
    pub fn chat(&self) -> Arc<dyn LlmProvider> {
        // Presence checked in from_config.
        self.chat[&self.default_chat].clone()
    }

    pub fn embeddings(&self) -> Result<Arc<dyn EmbeddingsProvider>> {
        self.embeddings
            .clone()
            .ok_or_else(|| Error::Config("no embeddings provider initialized".into()))
    }

    pub fn len(&self) -> usize {
        self.chat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chat.is_empty()
    }
}
