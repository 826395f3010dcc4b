//! Clients: one primary row of scalar settings plus eight child tables.

use std::sync::Arc;

use futures::{TryStreamExt, stream::BoxStream};
use idtable_storage::{ConfigError, HealthStatus, TableConnector, TableResult, TableService};

use crate::{
    api_resource::{secret_from_row, secret_rows},
    config::ConfigurationStoreOptions,
    entity_store::EntityStore,
    keys::CLIENT_PARTITION,
    model::{AccessTokenType, Claim, Client, RefreshTokenUsage, TokenExpiration},
    records::{
        ClientClaimRecord, ClientCorsOriginRecord, ClientGrantTypeRecord,
        ClientIdPRestrictionRecord, ClientPostLogoutRedirectUriRecord, ClientRecord,
        ClientRedirectUriRecord, ClientScopeRecord, SecretRecord,
    },
};

/// The rows one client is stored as, in write order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRows {
    pub client: ClientRecord,
    pub claims: Vec<ClientClaimRecord>,
    pub cors_origins: Vec<ClientCorsOriginRecord>,
    pub grant_types: Vec<ClientGrantTypeRecord>,
    pub idp_restrictions: Vec<ClientIdPRestrictionRecord>,
    pub post_logout_redirect_uris: Vec<ClientPostLogoutRedirectUriRecord>,
    pub redirect_uris: Vec<ClientRedirectUriRecord>,
    pub secrets: Vec<SecretRecord>,
    pub scopes: Vec<ClientScopeRecord>,
}

fn children<T>(id: &str, items: &[String], make: impl Fn(String, String) -> T) -> Vec<T> {
    items.iter().map(|item| make(id.to_owned(), item.clone())).collect()
}

/// Splits a client into rows.
///
/// # Errors
///
/// Returns [`TableError::Decode`](idtable_storage::TableError::Decode) when
/// the client has more secrets than a sequence key can number.
pub fn decompose(client: &Client) -> TableResult<ClientRows> {
    let id = client.client_id.as_str();
    Ok(ClientRows {
        client: ClientRecord {
            client_id: client.client_id.clone(),
            enabled: client.enabled,
            protocol_type: client.protocol_type.clone(),
            require_client_secret: client.require_client_secret,
            client_name: client.client_name.clone(),
            description: client.description.clone(),
            client_uri: client.client_uri.clone(),
            logo_uri: client.logo_uri.clone(),
            require_consent: client.require_consent,
            allow_remember_consent: client.allow_remember_consent,
            require_pkce: client.require_pkce,
            allow_plain_text_pkce: client.allow_plain_text_pkce,
            allow_access_tokens_via_browser: client.allow_access_tokens_via_browser,
            front_channel_logout_uri: client.front_channel_logout_uri.clone(),
            front_channel_logout_session_required: client.front_channel_logout_session_required,
            back_channel_logout_uri: client.back_channel_logout_uri.clone(),
            back_channel_logout_session_required: client.back_channel_logout_session_required,
            allow_offline_access: client.allow_offline_access,
            always_include_user_claims_in_id_token: client.always_include_user_claims_in_id_token,
            identity_token_lifetime: client.identity_token_lifetime,
            access_token_lifetime: client.access_token_lifetime,
            authorization_code_lifetime: client.authorization_code_lifetime,
            absolute_refresh_token_lifetime: client.absolute_refresh_token_lifetime,
            sliding_refresh_token_lifetime: client.sliding_refresh_token_lifetime,
            consent_lifetime: client.consent_lifetime,
            refresh_token_usage: client.refresh_token_usage.as_i32(),
            update_access_token_claims_on_refresh: client.update_access_token_claims_on_refresh,
            refresh_token_expiration: client.refresh_token_expiration.as_i32(),
            access_token_type: client.access_token_type.as_i32(),
            enable_local_login: client.enable_local_login,
            include_jwt_id: client.include_jwt_id,
            always_send_client_claims: client.always_send_client_claims,
            client_claims_prefix: client.client_claims_prefix.clone(),
            pair_wise_subject_salt: client.pair_wise_subject_salt.clone(),
            user_sso_lifetime: client.user_sso_lifetime,
            user_code_type: client.user_code_type.clone(),
            device_code_lifetime: client.device_code_lifetime,
        },
        claims: client
            .claims
            .iter()
            .map(|c| ClientClaimRecord {
                client_id: id.to_owned(),
                claim_type: c.claim_type.clone(),
                value: c.value.clone(),
            })
            .collect(),
        cors_origins: children(id, &client.allowed_cors_origins, ClientCorsOriginRecord::new),
        grant_types: children(id, &client.allowed_grant_types, ClientGrantTypeRecord::new),
        idp_restrictions: children(
            id,
            &client.identity_provider_restrictions,
            ClientIdPRestrictionRecord::new,
        ),
        post_logout_redirect_uris: children(
            id,
            &client.post_logout_redirect_uris,
            ClientPostLogoutRedirectUriRecord::new,
        ),
        redirect_uris: children(id, &client.redirect_uris, ClientRedirectUriRecord::new),
        secrets: secret_rows(id, &client.client_secrets)?,
        scopes: children(id, &client.allowed_scopes, ClientScopeRecord::new),
    })
}

/// Rebuilds a client from its rows.
///
/// # Errors
///
/// Returns [`TableError::Decode`](idtable_storage::TableError::Decode) when a
/// stored enumeration value is unknown.
pub fn compose(rows: ClientRows) -> TableResult<Client> {
    let c = rows.client;
    Ok(Client {
        client_id: c.client_id,
        enabled: c.enabled,
        protocol_type: c.protocol_type,
        require_client_secret: c.require_client_secret,
        client_name: c.client_name,
        description: c.description,
        client_uri: c.client_uri,
        logo_uri: c.logo_uri,
        require_consent: c.require_consent,
        allow_remember_consent: c.allow_remember_consent,
        require_pkce: c.require_pkce,
        allow_plain_text_pkce: c.allow_plain_text_pkce,
        allow_access_tokens_via_browser: c.allow_access_tokens_via_browser,
        front_channel_logout_uri: c.front_channel_logout_uri,
        front_channel_logout_session_required: c.front_channel_logout_session_required,
        back_channel_logout_uri: c.back_channel_logout_uri,
        back_channel_logout_session_required: c.back_channel_logout_session_required,
        allow_offline_access: c.allow_offline_access,
        always_include_user_claims_in_id_token: c.always_include_user_claims_in_id_token,
        identity_token_lifetime: c.identity_token_lifetime,
        access_token_lifetime: c.access_token_lifetime,
        authorization_code_lifetime: c.authorization_code_lifetime,
        absolute_refresh_token_lifetime: c.absolute_refresh_token_lifetime,
        sliding_refresh_token_lifetime: c.sliding_refresh_token_lifetime,
        consent_lifetime: c.consent_lifetime,
        refresh_token_usage: RefreshTokenUsage::from_i32(c.refresh_token_usage)?,
        update_access_token_claims_on_refresh: c.update_access_token_claims_on_refresh,
        refresh_token_expiration: TokenExpiration::from_i32(c.refresh_token_expiration)?,
        access_token_type: AccessTokenType::from_i32(c.access_token_type)?,
        enable_local_login: c.enable_local_login,
        include_jwt_id: c.include_jwt_id,
        always_send_client_claims: c.always_send_client_claims,
        client_claims_prefix: c.client_claims_prefix,
        pair_wise_subject_salt: c.pair_wise_subject_salt,
        user_sso_lifetime: c.user_sso_lifetime,
        user_code_type: c.user_code_type,
        device_code_lifetime: c.device_code_lifetime,
        client_secrets: rows.secrets.into_iter().map(secret_from_row).collect(),
        allowed_grant_types: rows.grant_types.into_iter().map(|r| r.grant_type).collect(),
        redirect_uris: rows.redirect_uris.into_iter().map(|r| r.uri).collect(),
        post_logout_redirect_uris: rows
            .post_logout_redirect_uris
            .into_iter()
            .map(|r| r.uri)
            .collect(),
        allowed_scopes: rows.scopes.into_iter().map(|r| r.scope).collect(),
        identity_provider_restrictions: rows
            .idp_restrictions
            .into_iter()
            .map(|r| r.provider)
            .collect(),
        claims: rows.claims.into_iter().map(|r| Claim::new(r.claim_type, r.value)).collect(),
        allowed_cors_origins: rows.cors_origins.into_iter().map(|r| r.origin).collect(),
    })
}

/// Stores and assembles clients across nine tables.
#[derive(Debug)]
pub struct ClientStore {
    clients: EntityStore<ClientRecord>,
    claims: EntityStore<ClientClaimRecord>,
    cors_origins: EntityStore<ClientCorsOriginRecord>,
    grant_types: EntityStore<ClientGrantTypeRecord>,
    idp_restrictions: EntityStore<ClientIdPRestrictionRecord>,
    post_logout_redirect_uris: EntityStore<ClientPostLogoutRedirectUriRecord>,
    redirect_uris: EntityStore<ClientRedirectUriRecord>,
    scopes: EntityStore<ClientScopeRecord>,
    secrets: EntityStore<SecretRecord>,
}

impl ClientStore {
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
            clients: options.clients.open(default, connector)?,
            claims: options.client_claims.open(default, connector)?,
            cors_origins: options.client_cors_origins.open(default, connector)?,
            grant_types: options.client_grant_types.open(default, connector)?,
            idp_restrictions: options.client_idp_restrictions.open(default, connector)?,
            post_logout_redirect_uris: options
                .client_post_logout_redirect_uris
                .open(default, connector)?,
            redirect_uris: options.client_redirect_uris.open(default, connector)?,
            scopes: options.client_scopes.open(default, connector)?,
            secrets: options.client_secrets.open(default, connector)?,
        })
    }

    /// Uses one service for every table.
    pub fn with_service(service: Arc<dyn TableService>, options: &ConfigurationStoreOptions) -> Self {
        Self {
            clients: options.clients.bind(&service),
            claims: options.client_claims.bind(&service),
            cors_origins: options.client_cors_origins.bind(&service),
            grant_types: options.client_grant_types.bind(&service),
            idp_restrictions: options.client_idp_restrictions.bind(&service),
            post_logout_redirect_uris: options.client_post_logout_redirect_uris.bind(&service),
            redirect_uris: options.client_redirect_uris.bind(&service),
            scopes: options.client_scopes.bind(&service),
            secrets: options.client_secrets.bind(&service),
        }
    }

    /// Writes the client row, then claims, CORS origins, grant types, IdP
    /// restrictions, post-logout redirect URIs, redirect URIs, secrets and
    /// scopes, in that order.
    #[tracing::instrument(skip(self, client), fields(client_id = %client.client_id))]
    pub async fn store(&self, client: &Client) -> TableResult<()> {
        let rows = decompose(client)?;

        self.clients.upsert(&rows.client).await?;
        for r in &rows.claims {
            self.claims.upsert(r).await?;
        }
        for r in &rows.cors_origins {
            self.cors_origins.upsert(r).await?;
        }
        for r in &rows.grant_types {
            self.grant_types.upsert(r).await?;
        }
        for r in &rows.idp_restrictions {
            self.idp_restrictions.upsert(r).await?;
        }
        for r in &rows.post_logout_redirect_uris {
            self.post_logout_redirect_uris.upsert(r).await?;
        }
        for r in &rows.redirect_uris {
            self.redirect_uris.upsert(r).await?;
        }
        for r in &rows.secrets {
            self.secrets.upsert(r).await?;
        }
        for r in &rows.scopes {
            self.scopes.upsert(r).await?;
        }

        tracing::debug!("stored client");
        Ok(())
    }

    /// Loads one client by id.
    #[tracing::instrument(skip(self))]
    pub async fn find_by_id(&self, client_id: &str) -> TableResult<Option<Client>> {
        match self.clients.find(CLIENT_PARTITION, client_id).await? {
            Some(record) => self.assemble(record).await.map(Some),
            None => {
                tracing::debug!("client not found");
                Ok(None)
            },
        }
    }

    /// Streams every client in id order.
    pub fn all(&self) -> BoxStream<'_, TableResult<Client>> {
        Box::pin(self.clients.enumerate(None).and_then(move |record| self.assemble(record)))
    }

    /// Health of the service holding the client table.
    pub async fn health_check(&self) -> TableResult<HealthStatus> {
        self.clients.health_check().await
    }

    async fn assemble(&self, client: ClientRecord) -> TableResult<Client> {
        let id = client.client_id.clone();
        let id = Some(id.as_str());
        let rows = ClientRows {
            claims: self.claims.enumerate(id).try_collect().await?,
            cors_origins: self.cors_origins.enumerate(id).try_collect().await?,
            grant_types: self.grant_types.enumerate(id).try_collect().await?,
            idp_restrictions: self.idp_restrictions.enumerate(id).try_collect().await?,
            post_logout_redirect_uris: self
                .post_logout_redirect_uris
                .enumerate(id)
                .try_collect()
                .await?,
            redirect_uris: self.redirect_uris.enumerate(id).try_collect().await?,
            secrets: self.secrets.enumerate(id).try_collect().await?,
            scopes: self.scopes.enumerate(id).try_collect().await?,
            client,
        };
        compose(rows)
    }
}
