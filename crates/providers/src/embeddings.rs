//! OpenAI-compatible embeddings adapter.
//!
//! Backs the chunker and the personal-document search with fixed-size
//! vectors. The dimensionality is pinned to the index schema: a response
//! with the wrong vector size is a hard error, not a warning.

use serde_json::Value;

use rg_domain::config::{EmbeddingsConfig, ProviderConfig};
use rg_domain::error::{Error, Result};

use crate::traits::EmbeddingsProvider;
use crate::util::{classify_status, from_reqwest, resolve_api_key};

pub struct OpenAiEmbeddings {
    id: String,
    base_url: String,
    api_key: String,
    model: String,
    dim: usize,
    client: reqwest::Client,
}

impl OpenAiEmbeddings {
    pub fn from_config(cfg: &ProviderConfig, embed: &EmbeddingsConfig) -> Result<Self> {
        let api_key = match &cfg.api_key_env {
            Some(env_var) => resolve_api_key(env_var)?,
            None => return Err(Error::Auth(format!("provider '{}': api_key_env not set", cfg.id))),
        };
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: embed.model.clone(),
            dim: embed.dim,
            client,
        })
    }
}

#[async_trait::async_trait]
impl EmbeddingsProvider for OpenAiEmbeddings {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": inputs,
            "dimensions": self.dim,
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let text = resp.text().await.map_err(from_reqwest)?;
        if !status.is_success() {
            return Err(classify_status(&self.id, status.as_u16(), &text));
        }

        let json: Value = serde_json::from_str(&text)?;
        let data = json
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| Error::Provider(format!("{}: missing 'data' array", self.id)))?;

        let mut vectors = Vec::with_capacity(inputs.len());
        for item in data {
            let embedding: Vec<f32> = item
                .get("embedding")
                .and_then(|e| e.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect()
                })
                .unwrap_or_default();
            if embedding.len() != self.dim {
                return Err(Error::Provider(format!(
                    "{}: embedding dimension {} does not match index schema {}",
                    self.id,
                    embedding.len(),
                    self.dim
                )));
            }
            vectors.push(embedding);
        }

        if vectors.len() != inputs.len() {
            return Err(Error::Provider(format!(
                "{}: got {} vectors for {} inputs",
                self.id,
                vectors.len(),
                inputs.len()
            )));
        }

        Ok(vectors)
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

/// Rank paragraphs against a query vector by cosine similarity.
/// Shared by personal-document search and tests.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![0.5, 0.5, 0.1];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn cosine_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn cosine_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
