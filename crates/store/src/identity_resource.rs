//! Identity resources: one primary row plus one row per user claim.

use std::{collections::HashSet, sync::Arc};

use futures::{TryStreamExt, stream::BoxStream};
use idtable_storage::{ConfigError, HealthStatus, TableConnector, TableResult, TableService};

use crate::{
    config::ConfigurationStoreOptions,
    entity_store::EntityStore,
    keys::IDENTITY_RESOURCE_PARTITION,
    model::IdentityResource,
    records::{IdentityClaimRecord, IdentityResourceRecord},
};

/// Splits an identity resource into its primary row and claim rows.
#[must_use]
pub fn decompose(resource: &IdentityResource) -> (IdentityResourceRecord, Vec<IdentityClaimRecord>) {
    let record = IdentityResourceRecord {
        name: resource.name.clone(),
        enabled: resource.enabled,
        display_name: resource.display_name.clone(),
        description: resource.description.clone(),
        required: resource.required,
        emphasize: resource.emphasize,
        show_in_discovery_document: resource.show_in_discovery_document,
    };
    let claims =
        resource.user_claims.iter().map(|c| IdentityClaimRecord::new(&resource.name, c)).collect();
    (record, claims)
}

/// Rebuilds an identity resource from its rows.
#[must_use]
pub fn compose(record: IdentityResourceRecord, claims: Vec<IdentityClaimRecord>) -> IdentityResource {
    IdentityResource {
        name: record.name,
        enabled: record.enabled,
        display_name: record.display_name,
        description: record.description,
        required: record.required,
        emphasize: record.emphasize,
        show_in_discovery_document: record.show_in_discovery_document,
        user_claims: claims.into_iter().map(|c| c.claim_type).collect(),
    }
}

/// Stores and assembles identity resources.
#[derive(Debug)]
pub struct IdentityResourceStore {
    resources: EntityStore<IdentityResourceRecord>,
    claims: EntityStore<IdentityClaimRecord>,
}

impl IdentityResourceStore {
    /// Opens both tables through `connector`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the options are invalid or a connection
    /// cannot be resolved.
    pub fn from_options(
        options: &ConfigurationStoreOptions,
        connector: &dyn TableConnector,
    ) -> Result<Self, ConfigError> {
        options.validate()?;
        let default = options.connection.as_deref();
        Ok(Self {
            resources: options.identity_resources.open(default, connector)?,
            claims: options.identity_claims.open(default, connector)?,
        })
    }

    /// Uses one service for both tables.
    pub fn with_service(service: Arc<dyn TableService>, options: &ConfigurationStoreOptions) -> Self {
        Self {
            resources: options.identity_resources.bind(&service),
            claims: options.identity_claims.bind(&service),
        }
    }

    /// Writes the resource row, then one row per claim.
    #[tracing::instrument(skip(self, resource), fields(name = %resource.name))]
    pub async fn store(&self, resource: &IdentityResource) -> TableResult<()> {
        let (record, claims) = decompose(resource);
        self.resources.upsert(&record).await?;
        for claim in &claims {
            self.claims.upsert(claim).await?;
        }
        tracing::debug!(claims = claims.len(), "stored identity resource");
        Ok(())
    }

    /// Loads one resource by name.
    #[tracing::instrument(skip(self))]
    pub async fn find_by_name(&self, name: &str) -> TableResult<Option<IdentityResource>> {
        match self.resources.find(IDENTITY_RESOURCE_PARTITION, name).await? {
            Some(record) => self.assemble(record).await.map(Some),
            None => Ok(None),
        }
    }

    /// Loads the resources named by `scope_names`.
    ///
    /// An identity resource's name is its scope name, so this is one point
    /// lookup per distinct requested name, in request order. Unknown names
    /// are ignored.
    #[tracing::instrument(skip(self, scope_names), fields(scopes = scope_names.len()))]
    pub async fn find_by_scopes<S: AsRef<str>>(
        &self,
        scope_names: &[S],
    ) -> TableResult<Vec<IdentityResource>> {
        let mut seen = HashSet::new();
        let mut resources = Vec::new();
        for scope in scope_names {
            let name: &str = scope.as_ref();
            if !seen.insert(name) {
                continue;
            }
            if let Some(resource) = self.find_by_name(name).await? {
                resources.push(resource);
            }
        }
        tracing::debug!(found = resources.len(), "identity resources found by scope");
        Ok(resources)
    }

    /// Streams every resource in name order.
    pub fn all(&self) -> BoxStream<'_, TableResult<IdentityResource>> {
        Box::pin(self.resources.enumerate(None).and_then(move |record| self.assemble(record)))
    }

    /// Health of the service holding the primary resource table.
    pub async fn health_check(&self) -> TableResult<HealthStatus> {
        self.resources.health_check().await
    }

    async fn assemble(&self, record: IdentityResourceRecord) -> TableResult<IdentityResource> {
        let claims = self.claims.enumerate(Some(&record.name)).try_collect().await?;
        Ok(compose(record, claims))
    }
}
