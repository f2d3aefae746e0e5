//! Bridges the background indexer to the search proxy.

use rg_cache::ChunkUploader;
use rg_domain::document::Chunk;
use rg_domain::error::Result;
use rg_search_client::SearchClient;

/// Sends embedded chunk batches to the proxy's `/index` endpoint. Holds
/// the writer-credentialed client so regulatory (owner-less) batches are
/// authorized; the fingerprint travels with owned batches.
pub struct ProxyUploader {
    client: SearchClient,
}

impl ProxyUploader {
    pub fn new(client: SearchClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ChunkUploader for ProxyUploader {
    async fn upload(&self, index_name: &str, chunks: Vec<Chunk>) -> Result<()> {
        let fingerprint = chunks.first().and_then(|c| c.owner_fingerprint.clone());
        self.client
            .index_documents(index_name, fingerprint.as_deref(), &chunks)
            .await
    }
}
