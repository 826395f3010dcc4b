//! Combined lookups over identity and API resources.

use std::sync::Arc;

use futures::TryStreamExt;
use idtable_storage::{ConfigError, HealthStatus, TableConnector, TableResult, TableService};

use crate::{
    api_resource::ApiResourceStore,
    config::ConfigurationStoreOptions,
    identity_resource::IdentityResourceStore,
    model::{ApiResource, IdentityResource, Resources},
};

/// Read-side facade used when validating requested scopes.
#[derive(Debug)]
pub struct ResourceStore {
    identity: IdentityResourceStore,
    api: ApiResourceStore,
}

impl ResourceStore {
    /// Combines existing stores.
    pub fn new(identity: IdentityResourceStore, api: ApiResourceStore) -> Self {
        Self { identity, api }
    }

    /// Opens both stores through `connector`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the options are invalid or a connection
    /// cannot be resolved.
    pub fn from_options(
        options: &ConfigurationStoreOptions,
        connector: &dyn TableConnector,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            IdentityResourceStore::from_options(options, connector)?,
            ApiResourceStore::from_options(options, connector)?,
        ))
    }

    /// Uses one service for every table.
    pub fn with_service(service: Arc<dyn TableService>, options: &ConfigurationStoreOptions) -> Self {
        Self::new(
            IdentityResourceStore::with_service(Arc::clone(&service), options),
            ApiResourceStore::with_service(service, options),
        )
    }

    /// Returns the identity resource store.
    #[must_use]
    pub fn identity_resources(&self) -> &IdentityResourceStore {
        &self.identity
    }

    /// Returns the API resource store.
    #[must_use]
    pub fn api_resources(&self) -> &ApiResourceStore {
        &self.api
    }

    /// Identity resources whose names are among `scope_names`.
    pub async fn find_identity_resources_by_scope<S: AsRef<str>>(
        &self,
        scope_names: &[S],
    ) -> TableResult<Vec<IdentityResource>> {
        self.identity.find_by_scopes(scope_names).await
    }

    /// API resources exposing any of `scope_names`.
    pub async fn find_api_resources_by_scope<S: AsRef<str>>(
        &self,
        scope_names: &[S],
    ) -> TableResult<Vec<ApiResource>> {
        self.api.find_by_scopes(scope_names).await
    }

    /// One API resource by name.
    pub async fn find_api_resource(&self, name: &str) -> TableResult<Option<ApiResource>> {
        self.api.find_by_name(name).await
    }

    /// Health of the resource services; the identity side is reported when
    /// it is unhealthy, the API side otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn health_check(&self) -> TableResult<HealthStatus> {
        let identity = self.identity.health_check().await?;
        if !identity.is_healthy() {
            return Ok(identity);
        }
        self.api.health_check().await
    }

    /// Every identity and API resource.
    #[tracing::instrument(skip(self))]
    pub async fn all_resources(&self) -> TableResult<Resources> {
        let identity_resources = self.identity.all().try_collect().await?;
        let api_resources = self.api.all().try_collect().await?;
        Ok(Resources { identity_resources, api_resources })
    }
}
