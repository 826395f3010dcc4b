//! API resources: one primary row plus claims, secrets, scopes and scope
//! claims, with a scope-name index for lookups by requested scope.

use std::{collections::HashSet, sync::Arc};

use futures::{TryStreamExt, stream::BoxStream};
use idtable_storage::{ConfigError, HealthStatus, TableConnector, TableResult, TableService};

use crate::{
    config::ConfigurationStoreOptions,
    entity_store::EntityStore,
    keys::{API_RESOURCE_PARTITION, Sequence, scope_claim_partition},
    model::{ApiResource, ApiScope, Secret},
    records::{
        ApiResourceByScopeRecord, ApiResourceClaimRecord, ApiResourceRecord, ApiScopeClaimRecord,
        ApiScopeRecord, SecretRecord,
    },
};

/// The rows one API resource is stored as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResourceRows {
    pub resource: ApiResourceRecord,
    pub claims: Vec<ApiResourceClaimRecord>,
    pub secrets: Vec<SecretRecord>,
    pub scopes: Vec<ApiScopeRows>,
}

/// The rows one scope is stored as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiScopeRows {
    pub scope: ApiScopeRecord,
    pub claims: Vec<ApiScopeClaimRecord>,
}

impl ApiResourceRows {
    /// Secondary index rows, one per scope.
    #[must_use]
    pub fn index(&self) -> Vec<ApiResourceByScopeRecord> {
        self.scopes
            .iter()
            .map(|s| ApiResourceByScopeRecord::new(&s.scope.name, &self.resource.name))
            .collect()
    }
}

pub(crate) fn secret_rows(owner: &str, secrets: &[Secret]) -> TableResult<Vec<SecretRecord>> {
    secrets
        .iter()
        .enumerate()
        .map(|(position, secret)| {
            Ok(SecretRecord {
                owner: owner.to_owned(),
                sequence: Sequence::new(position)?,
                description: secret.description.clone(),
                value: secret.value.clone(),
                expiration: secret.expiration,
                secret_type: secret.secret_type.clone(),
            })
        })
        .collect()
}

pub(crate) fn secret_from_row(record: SecretRecord) -> Secret {
    Secret {
        value: record.value,
        description: record.description,
        expiration: record.expiration,
        secret_type: record.secret_type,
    }
}

/// Splits an API resource into rows.
///
/// Secrets are numbered by position from `0000`.
///
/// # Errors
///
/// Returns [`TableError::Decode`](idtable_storage::TableError::Decode) when
/// the resource has more secrets than a sequence key can number.
pub fn decompose(resource: &ApiResource) -> TableResult<ApiResourceRows> {
    let name = &resource.name;
    Ok(ApiResourceRows {
        resource: ApiResourceRecord {
            name: name.clone(),
            enabled: resource.enabled,
            display_name: resource.display_name.clone(),
            description: resource.description.clone(),
        },
        claims: resource.user_claims.iter().map(|c| ApiResourceClaimRecord::new(name, c)).collect(),
        secrets: secret_rows(name, &resource.api_secrets)?,
        scopes: resource
            .scopes
            .iter()
            .map(|scope| ApiScopeRows {
                scope: ApiScopeRecord {
                    resource: name.clone(),
                    name: scope.name.clone(),
                    display_name: scope.display_name.clone(),
                    description: scope.description.clone(),
                    required: scope.required,
                    emphasize: scope.emphasize,
                    show_in_discovery_document: scope.show_in_discovery_document,
                },
                claims: scope
                    .user_claims
                    .iter()
                    .map(|c| ApiScopeClaimRecord::new(scope_claim_partition(name, &scope.name), c))
                    .collect(),
            })
            .collect(),
    })
}

/// Rebuilds an API resource from its rows, keeping row order.
#[must_use]
pub fn compose(rows: ApiResourceRows) -> ApiResource {
    ApiResource {
        name: rows.resource.name,
        enabled: rows.resource.enabled,
        display_name: rows.resource.display_name,
        description: rows.resource.description,
        user_claims: rows.claims.into_iter().map(|c| c.claim_type).collect(),
        api_secrets: rows.secrets.into_iter().map(secret_from_row).collect(),
        scopes: rows
            .scopes
            .into_iter()
            .map(|s| ApiScope {
                name: s.scope.name,
                display_name: s.scope.display_name,
                description: s.scope.description,
                required: s.scope.required,
                emphasize: s.scope.emphasize,
                show_in_discovery_document: s.scope.show_in_discovery_document,
                user_claims: s.claims.into_iter().map(|c| c.claim_type).collect(),
            })
            .collect(),
    }
}

/// Stores and assembles API resources across six tables.
#[derive(Debug)]
pub struct ApiResourceStore {
    resources: EntityStore<ApiResourceRecord>,
    claims: EntityStore<ApiResourceClaimRecord>,
    scopes: EntityStore<ApiScopeRecord>,
    scope_claims: EntityStore<ApiScopeClaimRecord>,
    secrets: EntityStore<SecretRecord>,
    by_scope: EntityStore<ApiResourceByScopeRecord>,
}

impl ApiResourceStore {
    /// Opens every table through `connector`.
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
            resources: options.api_resources.open(default, connector)?,
            claims: options.api_resource_claims.open(default, connector)?,
            scopes: options.api_scopes.open(default, connector)?,
            scope_claims: options.api_scope_claims.open(default, connector)?,
            secrets: options.api_secrets.open(default, connector)?,
            by_scope: options.api_resources_by_scope.open(default, connector)?,
        })
    }

    /// Uses one service for every table, with the table names in `options`.
    pub fn with_service(service: Arc<dyn TableService>, options: &ConfigurationStoreOptions) -> Self {
        Self {
            resources: options.api_resources.bind(&service),
            claims: options.api_resource_claims.bind(&service),
            scopes: options.api_scopes.bind(&service),
            scope_claims: options.api_scope_claims.bind(&service),
            secrets: options.api_secrets.bind(&service),
            by_scope: options.api_resources_by_scope.bind(&service),
        }
    }

    /// Writes the resource, then its claims, secrets and scopes.
    ///
    /// Each scope writes its index row first, then the scope row, then the
    /// scope's claims. Writes are individual upserts: a failure leaves the
    /// earlier rows in place and replaying the call repairs them.
    /// Children removed since a previous store are not deleted.
    #[tracing::instrument(skip(self, resource), fields(name = %resource.name))]
    pub async fn store(&self, resource: &ApiResource) -> TableResult<()> {
        let rows = decompose(resource)?;
        let index = rows.index();

        self.resources.upsert(&rows.resource).await?;
        for claim in &rows.claims {
            self.claims.upsert(claim).await?;
        }
        for secret in &rows.secrets {
            self.secrets.upsert(secret).await?;
        }
        for (entry, scope) in index.iter().zip(&rows.scopes) {
            self.by_scope.upsert(entry).await?;
            self.scopes.upsert(&scope.scope).await?;
            for claim in &scope.claims {
                self.scope_claims.upsert(claim).await?;
            }
        }

        tracing::debug!(
            claims = rows.claims.len(),
            secrets = rows.secrets.len(),
            scopes = rows.scopes.len(),
            "stored api resource"
        );
        Ok(())
    }

    /// Loads one resource by name.
    #[tracing::instrument(skip(self))]
    pub async fn find_by_name(&self, name: &str) -> TableResult<Option<ApiResource>> {
        match self.resources.find(API_RESOURCE_PARTITION, name).await? {
            Some(record) => self.assemble(record).await.map(Some),
            None => Ok(None),
        }
    }

    /// Loads the resources exposing any of `scope_names`.
    ///
    /// Each distinct resource is returned once, in the order its first
    /// matching scope was requested. Index rows pointing at a resource that
    /// no longer exists are skipped.
    #[tracing::instrument(skip(self, scope_names), fields(scopes = scope_names.len()))]
    pub async fn find_by_scopes<S: AsRef<str>>(
        &self,
        scope_names: &[S],
    ) -> TableResult<Vec<ApiResource>> {
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        for scope in scope_names {
            let entries: Vec<ApiResourceByScopeRecord> =
                self.by_scope.enumerate(Some(scope.as_ref())).try_collect().await?;
            for entry in entries {
                if seen.insert(entry.resource.clone()) {
                    names.push(entry.resource);
                }
            }
        }

        let mut resources = Vec::with_capacity(names.len());
        for name in names {
            match self.find_by_name(&name).await? {
                Some(resource) => resources.push(resource),
                None => tracing::debug!(%name, "scope index names a missing api resource"),
            }
        }

        tracing::debug!(found = resources.len(), "api resources found by scope");
        Ok(resources)
    }

    /// Streams every resource in name order, assembling each one as it goes.
    pub fn all(&self) -> BoxStream<'_, TableResult<ApiResource>> {
        Box::pin(self.resources.enumerate(None).and_then(move |record| self.assemble(record)))
    }

    /// Health of the service holding the primary resource table.
    pub async fn health_check(&self) -> TableResult<HealthStatus> {
        self.resources.health_check().await
    }

    async fn assemble(&self, record: ApiResourceRecord) -> TableResult<ApiResource> {
        let name = record.name.clone();
        let claims = self.claims.enumerate(Some(&name)).try_collect().await?;
        let secrets = self.secrets.enumerate(Some(&name)).try_collect().await?;

        let scope_records: Vec<ApiScopeRecord> =
            self.scopes.enumerate(Some(&name)).try_collect().await?;
        let mut scopes = Vec::with_capacity(scope_records.len());
        for scope in scope_records {
            let partition = scope_claim_partition(&name, &scope.name);
            let claims = self.scope_claims.enumerate(Some(&partition)).try_collect().await?;
            scopes.push(ApiScopeRows { scope, claims });
        }

        Ok(compose(ApiResourceRows { resource: record, claims, secrets, scopes }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use idtable_storage::{
        MemoryTableService, assert_decode_error,
        testutil::{FaultyTableService, Operation},
    };

    use super::*;
    use crate::{keys::MAX_SEQUENCE, model::Secret};

    fn sample() -> ApiResource {
        ApiResource::builder()
            .name("api1")
            .display_name("API 1".to_owned())
            .user_claims(vec!["name".to_owned(), "email".to_owned()])
            .api_secrets(vec![
                Secret::builder().value("first").build(),
                Secret::builder().value("second").description("rotated".to_owned()).build(),
            ])
            .scopes(vec![
                ApiScope::builder()
                    .name("api1.read")
                    .user_claims(vec!["role".to_owned()])
                    .build(),
                ApiScope::builder().name("api1.write").required(true).build(),
            ])
            .build()
    }

    #[test]
    fn test_decompose_numbers_secrets_by_position() {
        let rows = decompose(&sample()).unwrap();
        let keys: Vec<_> = rows.secrets.iter().map(|s| s.sequence.encode()).collect();
        assert_eq!(keys, ["0000", "0001"]);
        assert_eq!(rows.scopes[0].claims[0].partition, "api1|api1.read");
        assert_eq!(rows.index()[1], ApiResourceByScopeRecord::new("api1.write", "api1"));
    }

    #[test]
    fn test_decompose_rejects_too_many_secrets() {
        let secrets = vec![Secret::builder().value("s").build(); MAX_SEQUENCE as usize + 2];
        let resource = ApiResource::builder().name("api1").api_secrets(secrets).build();
        assert_decode_error!(decompose(&resource));
    }

    #[test]
    fn test_compose_inverts_decompose() {
        let resource = sample();
        assert_eq!(compose(decompose(&resource).unwrap()), resource);
    }

    #[tokio::test]
    async fn test_store_write_order() {
        let service = FaultyTableService::default();
        let options = ConfigurationStoreOptions::default();
        let store = ApiResourceStore::with_service(Arc::new(service.clone()), &options);

        store.store(&sample()).await.unwrap();

        let tables: Vec<_> =
            service.calls(Operation::Upsert).into_iter().map(|c| c.table).collect();
        assert_eq!(
            tables,
            [
                "ApiResources",
                "ApiClaims",
                "ApiClaims",
                "ApiSecrets",
                "ApiSecrets",
                "ApiResourcesByScope",
                "ApiScopes",
                "ApiScopeClaims",
                "ApiResourcesByScope",
                "ApiScopes",
            ]
        );
    }

    #[tokio::test]
    async fn test_find_missing_is_none() {
        let store = ApiResourceStore::with_service(
            Arc::new(MemoryTableService::new()),
            &ConfigurationStoreOptions::default(),
        );
        assert!(store.find_by_name("nope").await.unwrap().is_none());
        assert!(store.find_by_scopes(&["nope"]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_then_find_round_trips() {
        let store = ApiResourceStore::with_service(
            Arc::new(MemoryTableService::new()),
            &ConfigurationStoreOptions::default(),
        );
        store.store(&sample()).await.unwrap();

        let found = store.find_by_name("api1").await.unwrap().unwrap();
        // Children come back in sort-key order.
        assert_eq!(found.user_claims, ["email", "name"]);
        assert_eq!(found.api_secrets, sample().api_secrets);
        assert_eq!(found.scopes, sample().scopes);
    }

    #[tokio::test]
    async fn test_scope_claims_stay_with_their_resource() {
        let store = ApiResourceStore::with_service(
            Arc::new(MemoryTableService::new()),
            &ConfigurationStoreOptions::default(),
        );
        let piped = ApiResource::builder()
            .name("a|b")
            .scopes(vec![
                ApiScope::builder().name("c").user_claims(vec!["secret_claim".to_owned()]).build(),
            ])
            .build();
        let plain = ApiResource::builder()
            .name("a")
            .scopes(vec![ApiScope::builder().name("b|c").build()])
            .build();
        store.store(&piped).await.unwrap();
        store.store(&plain).await.unwrap();

        assert_eq!(store.find_by_name("a").await.unwrap(), Some(plain));
        assert_eq!(store.find_by_name("a|b").await.unwrap(), Some(piped));
    }
}
