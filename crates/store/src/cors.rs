//! CORS origin checks against stored clients.

use futures::TryStreamExt;
use idtable_storage::TableResult;

use crate::client::ClientStore;

/// Answers whether any stored client allows a browser origin.
#[derive(Debug, Clone, Copy)]
pub struct CorsPolicy<'a> {
    clients: &'a ClientStore,
}

impl<'a> CorsPolicy<'a> {
    /// Checks origins against the clients in `clients`.
    pub fn new(clients: &'a ClientStore) -> Self {
        Self { clients }
    }

    /// Returns `true` when some client lists `origin` exactly.
    ///
    /// Clients are loaded one at a time and the scan stops at the first
    /// match.
    #[tracing::instrument(skip(self))]
    pub async fn is_origin_allowed(&self, origin: &str) -> TableResult<bool> {
        let mut clients = self.clients.all();
        while let Some(client) = clients.try_next().await? {
            if client.allowed_cors_origins.iter().any(|o| o == origin) {
                tracing::debug!(client_id = %client.client_id, "origin allowed");
                return Ok(true);
            }
        }
        tracing::debug!("origin not allowed by any client");
        Ok(false)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use idtable_storage::MemoryTableService;

    use super::*;
    use crate::{config::ConfigurationStoreOptions, model::Client};

    #[tokio::test]
    async fn test_origin_lookup() {
        let clients = ClientStore::with_service(
            Arc::new(MemoryTableService::new()),
            &ConfigurationStoreOptions::default(),
        );
        clients
            .store(
                &Client::builder()
                    .client_id("spa")
                    .allowed_cors_origins(vec!["https://spa.example.com:8443".to_owned()])
                    .build(),
            )
            .await
            .unwrap();
        clients.store(&Client::builder().client_id("mvc").build()).await.unwrap();

        let policy = CorsPolicy::new(&clients);
        assert!(policy.is_origin_allowed("https://spa.example.com:8443").await.unwrap());
        assert!(!policy.is_origin_allowed("https://spa.example.com").await.unwrap());
        assert!(!policy.is_origin_allowed("https://evil.example.com").await.unwrap());
    }
}
