//! Store configuration.
//!
//! [`ConfigurationStoreOptions`] names the tables holding clients and
//! resources; [`OperationalStoreOptions`] names the grant table and tunes
//! the cleanup loop. Every table may override the store-level connection
//! descriptor.
//!
//! Both option sets deserialize with serde (unknown keys are rejected,
//! missing keys take defaults) and must pass `validate()` before use; the
//! store constructors call it for you.

use std::{collections::HashSet, sync::Arc, time::Duration};

use idtable_storage::{ConfigError, TableConnector, TableService};
use serde::{Deserialize, Serialize};

use crate::{entity_store::EntityStore, record::TableRecord};

/// Default interval between cleanup passes (1 hour).
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Default number of expired grants removed per batch.
pub const DEFAULT_CLEANUP_BATCH_SIZE: usize = 100;

const MIN_TABLE_NAME_LEN: usize = 3;
const MAX_TABLE_NAME_LEN: usize = 63;

/// One logical table: its physical name and an optional connection override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    /// Physical table name.
    pub table_name: String,

    /// Connection descriptor; falls back to the store-level one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
}

impl TableConfig {
    /// Creates a table config using the store-level connection.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self { table_name: table_name.into(), connection: None }
    }

    /// Routes this table through its own connection descriptor.
    #[must_use]
    pub fn with_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    /// Returns the descriptor this table connects through.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingConnection`] when neither this table
    /// nor the store names a non-blank descriptor.
    pub fn resolve_connection<'a>(
        &'a self,
        default_connection: Option<&'a str>,
    ) -> Result<&'a str, ConfigError> {
        self.connection
            .as_deref()
            .or(default_connection)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingConnection { table: self.table_name.clone() })
    }

    /// Checks the name and connection.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTableName`] or
    /// [`ConfigError::MissingConnection`].
    pub fn validate(&self, default_connection: Option<&str>) -> Result<(), ConfigError> {
        validate_table_name(&self.table_name)?;
        self.resolve_connection(default_connection).map(|_| ())
    }

    pub(crate) fn open<R: TableRecord>(
        &self,
        default_connection: Option<&str>,
        connector: &dyn TableConnector,
    ) -> Result<EntityStore<R>, ConfigError> {
        let service = connector.connect(self.resolve_connection(default_connection)?)?;
        Ok(EntityStore::new(service, &self.table_name))
    }

    pub(crate) fn bind<R: TableRecord>(&self, service: &Arc<dyn TableService>) -> EntityStore<R> {
        EntityStore::new(Arc::clone(service), &self.table_name)
    }
}

/// Checks a physical table name: 3 to 63 ASCII alphanumerics, starting
/// with a letter.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidTableName`] describing the first rule broken.
pub fn validate_table_name(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason| Err(ConfigError::InvalidTableName { name: name.to_owned(), reason });

    if name.len() < MIN_TABLE_NAME_LEN || name.len() > MAX_TABLE_NAME_LEN {
        return invalid("must be 3 to 63 characters long");
    }
    if !name.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return invalid("must contain only ASCII letters and digits");
    }
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return invalid("must start with a letter");
    }
    Ok(())
}

/// Tables holding API resources, identity resources and clients.
///
/// # Example
///
/// ```
/// use idtable_store::config::{ConfigurationStoreOptions, TableConfig};
///
/// let options: ConfigurationStoreOptions = serde_json::from_str(
///     r#"{ "connection": "memory://config", "clients": { "table_name": "TenantAClients" } }"#,
/// )
/// .unwrap();
///
/// assert_eq!(options.clients.table_name, "TenantAClients");
/// assert_eq!(options.api_resources, TableConfig::new("ApiResources"));
/// options.validate().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ConfigurationStoreOptions {
    /// Connection descriptor shared by tables without their own.
    pub connection: Option<String>,

    pub api_resources: TableConfig,
    pub api_resource_claims: TableConfig,
    pub api_scopes: TableConfig,
    pub api_scope_claims: TableConfig,
    pub api_secrets: TableConfig,
    /// Secondary index from scope name to API resource name.
    pub api_resources_by_scope: TableConfig,

    pub identity_resources: TableConfig,
    pub identity_claims: TableConfig,

    pub clients: TableConfig,
    pub client_claims: TableConfig,
    pub client_cors_origins: TableConfig,
    pub client_grant_types: TableConfig,
    pub client_idp_restrictions: TableConfig,
    pub client_post_logout_redirect_uris: TableConfig,
    pub client_redirect_uris: TableConfig,
    pub client_scopes: TableConfig,
    pub client_secrets: TableConfig,
}

impl Default for ConfigurationStoreOptions {
    fn default() -> Self {
        Self {
            connection: None,
            api_resources: TableConfig::new("ApiResources"),
            api_resource_claims: TableConfig::new("ApiClaims"),
            api_scopes: TableConfig::new("ApiScopes"),
            api_scope_claims: TableConfig::new("ApiScopeClaims"),
            api_secrets: TableConfig::new("ApiSecrets"),
            api_resources_by_scope: TableConfig::new("ApiResourcesByScope"),
            identity_resources: TableConfig::new("IdentityResources"),
            identity_claims: TableConfig::new("IdentityClaims"),
            clients: TableConfig::new("Clients"),
            client_claims: TableConfig::new("ClientClaims"),
            client_cors_origins: TableConfig::new("ClientCorsOrigins"),
            client_grant_types: TableConfig::new("ClientGrantTypes"),
            client_idp_restrictions: TableConfig::new("ClientIdPRestrictions"),
            client_post_logout_redirect_uris: TableConfig::new("ClientPostLogoutRedirectUris"),
            client_redirect_uris: TableConfig::new("ClientRedirectUris"),
            client_scopes: TableConfig::new("ClientScopes"),
            client_secrets: TableConfig::new("ClientSecrets"),
        }
    }
}

impl ConfigurationStoreOptions {
    /// Default table names, all reached through `connection`.
    pub fn with_connection(connection: impl Into<String>) -> Self {
        Self { connection: Some(connection.into()), ..Self::default() }
    }

    /// Returns every table config.
    #[must_use]
    pub fn tables(&self) -> [&TableConfig; 17] {
        [
            &self.api_resources,
            &self.api_resource_claims,
            &self.api_scopes,
            &self.api_scope_claims,
            &self.api_secrets,
            &self.api_resources_by_scope,
            &self.identity_resources,
            &self.identity_claims,
            &self.clients,
            &self.client_claims,
            &self.client_cors_origins,
            &self.client_grant_types,
            &self.client_idp_restrictions,
            &self.client_post_logout_redirect_uris,
            &self.client_redirect_uris,
            &self.client_scopes,
            &self.client_secrets,
        ]
    }

    /// Checks every table name and connection.
    ///
    /// Two logical tables may not share a physical table on the same
    /// connection; table names compare case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let default = self.connection.as_deref();
        let mut seen = HashSet::new();
        for table in self.tables() {
            table.validate(default)?;
            let connection = table.resolve_connection(default)?;
            if !seen.insert((connection, table.table_name.to_ascii_lowercase())) {
                return Err(ConfigError::InvalidTableName {
                    name: table.table_name.clone(),
                    reason: "configured for more than one logical table",
                });
            }
        }
        Ok(())
    }
}

/// Grant table and cleanup settings.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use idtable_store::config::OperationalStoreOptions;
///
/// let options = OperationalStoreOptions::builder()
///     .connection("memory://grants")
///     .enable_token_cleanup(true)
///     .token_cleanup_interval(Duration::from_secs(60))
///     .build()
///     .unwrap();
///
/// assert_eq!(options.persisted_grants.table_name, "PersistedGrants");
/// assert_eq!(options.token_cleanup_batch_size, 100);
///
/// assert!(OperationalStoreOptions::builder().token_cleanup_batch_size(0).build().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationalStoreOptions {
    /// Connection descriptor for tables without their own.
    #[serde(default)]
    pub connection: Option<String>,

    #[serde(default = "default_persisted_grants")]
    pub persisted_grants: TableConfig,

    /// Whether the periodic cleanup host runs.
    #[serde(default)]
    pub enable_token_cleanup: bool,

    /// Time between cleanup passes.
    #[serde(with = "humantime_serde", default = "default_cleanup_interval")]
    pub token_cleanup_interval: Duration,

    /// Expired grants fetched and removed per batch.
    #[serde(default = "default_cleanup_batch_size")]
    pub token_cleanup_batch_size: usize,
}

fn default_persisted_grants() -> TableConfig {
    TableConfig::new("PersistedGrants")
}

fn default_cleanup_interval() -> Duration {
    DEFAULT_CLEANUP_INTERVAL
}

fn default_cleanup_batch_size() -> usize {
    DEFAULT_CLEANUP_BATCH_SIZE
}

impl Default for OperationalStoreOptions {
    fn default() -> Self {
        Self {
            connection: None,
            persisted_grants: default_persisted_grants(),
            enable_token_cleanup: false,
            token_cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            token_cleanup_batch_size: DEFAULT_CLEANUP_BATCH_SIZE,
        }
    }
}

#[bon::bon]
impl OperationalStoreOptions {
    /// Creates validated operational options.
    ///
    /// The connection is not checked here, so options without one can be
    /// paired with an explicit service.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an invalid table name, a zero batch size,
    /// or a zero interval with cleanup enabled.
    #[builder]
    pub fn new(
        #[builder(into)] connection: Option<String>,
        #[builder(default = default_persisted_grants())] persisted_grants: TableConfig,
        #[builder(default)] enable_token_cleanup: bool,
        #[builder(default = DEFAULT_CLEANUP_INTERVAL)] token_cleanup_interval: Duration,
        #[builder(default = DEFAULT_CLEANUP_BATCH_SIZE)] token_cleanup_batch_size: usize,
    ) -> Result<Self, ConfigError> {
        let options = Self {
            connection,
            persisted_grants,
            enable_token_cleanup,
            token_cleanup_interval,
            token_cleanup_batch_size,
        };
        options.validate_settings()?;
        Ok(options)
    }

    /// Checks every setting, including the grant table's connection.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_settings()?;
        self.persisted_grants.resolve_connection(self.connection.as_deref()).map(|_| ())
    }

    fn validate_settings(&self) -> Result<(), ConfigError> {
        validate_table_name(&self.persisted_grants.table_name)?;
        if self.token_cleanup_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "token_cleanup_batch_size",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.enable_token_cleanup && self.token_cleanup_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "token_cleanup_interval",
                reason: "must be non-zero when token cleanup is enabled".to_owned(),
            });
        }
        Ok(())
    }
}
