//! Domain objects assembled from and decomposed into table rows.
//!
//! These are plain data types. Persistence lives in the stores; the pure
//! row mapping lives in each aggregate's `decompose`/`compose` functions.

use chrono::{DateTime, Utc};
use idtable_storage::{TableError, TableResult};
use serde::{Deserialize, Serialize};

/// Default secret type.
pub const SHARED_SECRET: &str = "SharedSecret";

fn shared_secret() -> String {
    SHARED_SECRET.to_owned()
}

/// A secret owned by a client or API resource.
///
/// # Examples
///
/// ```
/// use idtable_store::model::{SHARED_SECRET, Secret};
///
/// let secret = Secret::builder().value("K7gNU3sdo+OL0wNhqoVWhr3g6s1xYv72ol/pe/Unols=").build();
/// assert_eq!(secret.secret_type, SHARED_SECRET);
/// assert!(secret.expiration.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[builder(on(String, into))]
pub struct Secret {
    /// Hashed or raw secret value.
    pub value: String,

    /// Free-form description.
    pub description: Option<String>,

    /// Instant after which the secret is no longer valid.
    pub expiration: Option<DateTime<Utc>>,

    /// Secret kind, `SharedSecret` unless set.
    #[builder(default = shared_secret())]
    #[serde(rename = "type", default = "shared_secret")]
    pub secret_type: String,
}

/// A type/value claim pair attached to a client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Claim {
    /// Claim type, e.g. `role`.
    #[serde(rename = "type")]
    pub claim_type: String,
    /// Claim value.
    pub value: String,
}

impl Claim {
    /// Creates a claim.
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self { claim_type: claim_type.into(), value: value.into() }
    }
}

/// A scope exposed by an API resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[builder(on(String, into))]
pub struct ApiScope {
    /// Scope name; unique across all API resources.
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    #[builder(default)]
    pub required: bool,
    #[builder(default)]
    pub emphasize: bool,
    #[builder(default = true)]
    pub show_in_discovery_document: bool,
    /// Claim types included when this scope is requested.
    #[builder(default)]
    pub user_claims: Vec<String>,
}

/// A protected API, its claims, secrets and scopes.
///
/// # Examples
///
/// ```
/// use idtable_store::model::{ApiResource, ApiScope};
///
/// let api = ApiResource::builder()
///     .name("api1")
///     .user_claims(vec!["name".to_owned()])
///     .scopes(vec![ApiScope::builder().name("api1.read").build()])
///     .build();
/// assert!(api.enabled);
/// assert!(api.scopes[0].show_in_discovery_document);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[builder(on(String, into))]
pub struct ApiResource {
    /// Resource name; unique.
    pub name: String,
    #[builder(default = true)]
    pub enabled: bool,
    pub display_name: Option<String>,
    pub description: Option<String>,
    /// Claim types included in access tokens for this API.
    #[builder(default)]
    pub user_claims: Vec<String>,
    /// Secrets used for token introspection, in position order.
    #[builder(default)]
    pub api_secrets: Vec<Secret>,
    #[builder(default)]
    pub scopes: Vec<ApiScope>,
}

/// A set of user claims requestable as one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[builder(on(String, into))]
pub struct IdentityResource {
    /// Resource name, which is also the scope name.
    pub name: String,
    #[builder(default = true)]
    pub enabled: bool,
    pub display_name: Option<String>,
    pub description: Option<String>,
    #[builder(default)]
    pub required: bool,
    #[builder(default)]
    pub emphasize: bool,
    #[builder(default = true)]
    pub show_in_discovery_document: bool,
    #[builder(default)]
    pub user_claims: Vec<String>,
}

/// Identity and API resources returned together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    pub identity_resources: Vec<IdentityResource>,
    pub api_resources: Vec<ApiResource>,
}

/// Declares an enum persisted as its integer discriminant.
macro_rules! int_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident = $value:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl $name {
            /// Returns the stored integer form.
            #[must_use]
            pub fn as_i32(self) -> i32 {
                self as i32
            }

            /// Parses the stored integer form.
            ///
            /// # Errors
            ///
            /// Returns [`TableError::Decode`] for unknown values.
            pub fn from_i32(value: i32) -> TableResult<Self> {
                match value {
                    $($value => Ok(Self::$variant),)+
                    other => Err(TableError::decode(format!(
                        concat!("unknown ", stringify!($name), " value {}"),
                        other
                    ))),
                }
            }
        }
    };
}

int_enum! {
    /// Whether a refresh token handle changes on use.
    RefreshTokenUsage {
        /// The handle stays the same.
        ReUse = 0,
        /// A new handle is issued on every refresh.
        OneTimeOnly = 1,
    }
}

int_enum! {
    /// How the refresh token lifetime is computed.
    TokenExpiration {
        /// Lifetime slides on every use, up to the absolute lifetime.
        Sliding = 0,
        /// Fixed lifetime from issuance.
        Absolute = 1,
    }
}

int_enum! {
    /// Access token format.
    AccessTokenType {
        /// Self-contained JWT.
        Jwt = 0,
        /// Reference handle resolved by introspection.
        Reference = 1,
    }
}

/// An OAuth/OpenID client and its settings.
///
/// Defaults follow the usual OpenID Connect provider conventions: enabled,
/// `oidc` protocol, secret required, consent not required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[builder(on(String, into))]
pub struct Client {
    /// Unique client identifier.
    pub client_id: String,
    #[builder(default = true)]
    pub enabled: bool,
    #[builder(default = "oidc".to_owned())]
    pub protocol_type: String,
    #[builder(default = true)]
    pub require_client_secret: bool,
    pub client_name: Option<String>,
    pub description: Option<String>,
    pub client_uri: Option<String>,
    pub logo_uri: Option<String>,
    #[builder(default)]
    pub require_consent: bool,
    #[builder(default = true)]
    pub allow_remember_consent: bool,
    #[builder(default)]
    pub require_pkce: bool,
    #[builder(default)]
    pub allow_plain_text_pkce: bool,
    #[builder(default)]
    pub allow_access_tokens_via_browser: bool,
    pub front_channel_logout_uri: Option<String>,
    #[builder(default = true)]
    pub front_channel_logout_session_required: bool,
    pub back_channel_logout_uri: Option<String>,
    #[builder(default = true)]
    pub back_channel_logout_session_required: bool,
    #[builder(default)]
    pub allow_offline_access: bool,
    #[builder(default)]
    pub always_include_user_claims_in_id_token: bool,
    /// Lifetimes are in seconds.
    #[builder(default = 300)]
    pub identity_token_lifetime: i32,
    #[builder(default = 3600)]
    pub access_token_lifetime: i32,
    #[builder(default = 300)]
    pub authorization_code_lifetime: i32,
    #[builder(default = 2_592_000)]
    pub absolute_refresh_token_lifetime: i32,
    #[builder(default = 1_296_000)]
    pub sliding_refresh_token_lifetime: i32,
    /// `None` means consent never expires.
    pub consent_lifetime: Option<i32>,
    #[builder(default = RefreshTokenUsage::OneTimeOnly)]
    pub refresh_token_usage: RefreshTokenUsage,
    #[builder(default)]
    pub update_access_token_claims_on_refresh: bool,
    #[builder(default = TokenExpiration::Absolute)]
    pub refresh_token_expiration: TokenExpiration,
    #[builder(default = AccessTokenType::Jwt)]
    pub access_token_type: AccessTokenType,
    #[builder(default = true)]
    pub enable_local_login: bool,
    #[builder(default)]
    pub include_jwt_id: bool,
    #[builder(default)]
    pub always_send_client_claims: bool,
    #[builder(default = "client_".to_owned())]
    pub client_claims_prefix: String,
    pub pair_wise_subject_salt: Option<String>,
    pub user_sso_lifetime: Option<i32>,
    pub user_code_type: Option<String>,
    #[builder(default = 300)]
    pub device_code_lifetime: i32,

    /// Secrets in position order.
    #[builder(default)]
    pub client_secrets: Vec<Secret>,
    #[builder(default)]
    pub allowed_grant_types: Vec<String>,
    #[builder(default)]
    pub redirect_uris: Vec<String>,
    #[builder(default)]
    pub post_logout_redirect_uris: Vec<String>,
    #[builder(default)]
    pub allowed_scopes: Vec<String>,
    /// External identity providers the client may use; empty allows all.
    #[builder(default)]
    pub identity_provider_restrictions: Vec<String>,
    #[builder(default)]
    pub claims: Vec<Claim>,
    #[builder(default)]
    pub allowed_cors_origins: Vec<String>,
}

/// A runtime grant: authorization code, refresh token, reference token,
/// user consent or device code.
///
/// `data` is the opaque serialized grant produced by the token service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[builder(on(String, into))]
pub struct PersistedGrant {
    /// Grant handle; unique across all grants.
    pub key: String,
    #[serde(rename = "type")]
    pub grant_type: String,
    pub subject_id: String,
    pub client_id: String,
    #[builder(default = Utc::now())]
    pub creation_time: DateTime<Utc>,
    /// `None` means the grant never expires.
    pub expiration: Option<DateTime<Utc>>,
    pub data: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use idtable_storage::assert_decode_error;

    use super::*;

    #[test]
    fn test_client_defaults() {
        let client = Client::builder().client_id("client1").build();
        assert!(client.enabled);
        assert_eq!(client.protocol_type, "oidc");
        assert!(client.require_client_secret);
        assert!(!client.require_consent);
        assert!(client.allow_remember_consent);
        assert_eq!(client.identity_token_lifetime, 300);
        assert_eq!(client.access_token_lifetime, 3600);
        assert_eq!(client.absolute_refresh_token_lifetime, 2_592_000);
        assert_eq!(client.sliding_refresh_token_lifetime, 1_296_000);
        assert_eq!(client.refresh_token_usage, RefreshTokenUsage::OneTimeOnly);
        assert_eq!(client.refresh_token_expiration, TokenExpiration::Absolute);
        assert_eq!(client.access_token_type, AccessTokenType::Jwt);
        assert_eq!(client.client_claims_prefix, "client_");
        assert!(client.consent_lifetime.is_none());
        assert!(client.allowed_scopes.is_empty());
    }

    #[test]
    fn test_identity_resource_defaults() {
        let resource = IdentityResource::builder().name("openid").build();
        assert!(resource.enabled);
        assert!(resource.show_in_discovery_document);
        assert!(!resource.required);
    }

    #[test]
    fn test_int_enum_round_trip() {
        assert_eq!(RefreshTokenUsage::from_i32(0).unwrap(), RefreshTokenUsage::ReUse);
        assert_eq!(TokenExpiration::Sliding.as_i32(), 0);
        assert_eq!(AccessTokenType::from_i32(1).unwrap(), AccessTokenType::Reference);
        assert_decode_error!(AccessTokenType::from_i32(7));
    }
}
