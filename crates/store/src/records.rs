//! Record shapes for every table the stores use.
//!
//! Primary records carry an aggregate's scalar settings. Child records
//! hold one element of a child collection each, keyed by owner and element.
//! Most child records carry no fields at all: the key is the data.

use chrono::{DateTime, Utc};
use idtable_storage::{Fields, Row, RowKey, TableError, TableResult};

use crate::{
    keys::{
        API_RESOURCE_PARTITION, CLIENT_PARTITION, IDENTITY_RESOURCE_PARTITION, Sequence,
        decode_key_part, encode_key_part,
    },
    model::SHARED_SECRET,
    record::TableRecord,
};

fn required_str(fields: &Fields, name: &str) -> TableResult<String> {
    fields.get_str(name)?.ok_or_else(|| missing(name))
}

fn missing(name: &str) -> TableError {
    TableError::decode(format!("required field {name} is missing"))
}

fn verbatim(part: &str) -> String {
    part.to_owned()
}

fn verbatim_decode(part: &str) -> TableResult<String> {
    Ok(part.to_owned())
}

/// Defines a field-less record keyed by `(owner, item)`.
///
/// The item part goes through `$encode` on write and `$decode` on read, so
/// free-form values can be escaped.
macro_rules! define_pair_record {
    (
        $(#[$meta:meta])*
        $name:ident { $owner:ident, $item:ident } via ($encode:path, $decode:path)
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name {
            pub $owner: String,
            pub $item: String,
        }

        impl $name {
            #[doc = concat!("Creates a new `", stringify!($name), "`.")]
            pub fn new($owner: impl Into<String>, $item: impl Into<String>) -> Self {
                Self { $owner: $owner.into(), $item: $item.into() }
            }
        }

        impl TableRecord for $name {
            fn key(&self) -> RowKey {
                RowKey::new(&self.$owner, $encode(&self.$item))
            }

            fn to_fields(&self) -> Fields {
                Fields::new()
            }

            fn from_row(row: Row) -> TableResult<Self> {
                Ok(Self { $item: $decode(&row.key.sort)?, $owner: row.key.partition })
            }
        }
    };
}

define_pair_record! {
    /// A claim type included in access tokens for an API resource.
    ApiResourceClaimRecord { resource, claim_type } via (verbatim, verbatim_decode)
}

define_pair_record! {
    /// A claim type attached to one API scope.
    ///
    /// `partition` is built with
    /// [`scope_claim_partition`](crate::keys::scope_claim_partition).
    ApiScopeClaimRecord { partition, claim_type } via (verbatim, verbatim_decode)
}

define_pair_record! {
    /// Secondary index row: scope name to the API resource that owns it.
    ApiResourceByScopeRecord { scope, resource } via (verbatim, verbatim_decode)
}

define_pair_record! {
    /// A claim type included when an identity resource is requested.
    IdentityClaimRecord { resource, claim_type } via (verbatim, verbatim_decode)
}

define_pair_record! {
    /// A CORS origin a client's browser code may call from.
    ClientCorsOriginRecord { client_id, origin } via (encode_key_part, decode_key_part)
}

define_pair_record! {
    /// A grant type a client may use.
    ClientGrantTypeRecord { client_id, grant_type } via (verbatim, verbatim_decode)
}

define_pair_record! {
    /// An external identity provider a client is restricted to.
    ClientIdPRestrictionRecord { client_id, provider } via (verbatim, verbatim_decode)
}

define_pair_record! {
    /// A URI a client may be redirected to after logout.
    ClientPostLogoutRedirectUriRecord { client_id, uri } via (encode_key_part, decode_key_part)
}

define_pair_record! {
    /// A URI tokens or codes may be returned to.
    ClientRedirectUriRecord { client_id, uri } via (encode_key_part, decode_key_part)
}

define_pair_record! {
    /// A scope a client may request.
    ClientScopeRecord { client_id, scope } via (verbatim, verbatim_decode)
}

/// Primary row of an API resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResourceRecord {
    pub name: String,
    pub enabled: bool,
    pub display_name: Option<String>,
    pub description: Option<String>,
}

impl TableRecord for ApiResourceRecord {
    fn key(&self) -> RowKey {
        RowKey::new(API_RESOURCE_PARTITION, &self.name)
    }

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields
            .set("Enabled", self.enabled)
            .set_opt("DisplayName", self.display_name.clone())
            .set_opt("Description", self.description.clone());
        fields
    }

    fn from_row(row: Row) -> TableResult<Self> {
        let f = &row.fields;
        Ok(Self {
            enabled: f.get_bool("Enabled")?.unwrap_or(true),
            display_name: f.get_str("DisplayName")?,
            description: f.get_str("Description")?,
            name: row.key.sort,
        })
    }
}

/// One scope of an API resource, stored under the resource name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiScopeRecord {
    pub resource: String,
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub required: bool,
    pub emphasize: bool,
    pub show_in_discovery_document: bool,
}

impl TableRecord for ApiScopeRecord {
    fn key(&self) -> RowKey {
        RowKey::new(&self.resource, &self.name)
    }

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields
            .set_opt("DisplayName", self.display_name.clone())
            .set_opt("Description", self.description.clone())
            .set("Required", self.required)
            .set("Emphasize", self.emphasize)
            .set("ShowInDiscoveryDocument", self.show_in_discovery_document);
        fields
    }

    fn from_row(row: Row) -> TableResult<Self> {
        let f = &row.fields;
        Ok(Self {
            display_name: f.get_str("DisplayName")?,
            description: f.get_str("Description")?,
            required: f.get_bool("Required")?.unwrap_or(false),
            emphasize: f.get_bool("Emphasize")?.unwrap_or(false),
            show_in_discovery_document: f.get_bool("ShowInDiscoveryDocument")?.unwrap_or(true),
            resource: row.key.partition,
            name: row.key.sort,
        })
    }
}

/// One secret of a client or API resource, keyed by its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRecord {
    /// Client id or API resource name.
    pub owner: String,
    pub sequence: Sequence,
    pub description: Option<String>,
    pub value: String,
    pub expiration: Option<DateTime<Utc>>,
    pub secret_type: String,
}

impl TableRecord for SecretRecord {
    fn key(&self) -> RowKey {
        RowKey::new(&self.owner, self.sequence.encode())
    }

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields
            .set_opt("Description", self.description.clone())
            .set("Value", self.value.as_str())
            .set_opt("Expiration", self.expiration)
            .set("Type", self.secret_type.as_str());
        fields
    }

    fn from_row(row: Row) -> TableResult<Self> {
        let f = &row.fields;
        Ok(Self {
            sequence: Sequence::decode(&row.key.sort)?,
            description: f.get_str("Description")?,
            value: required_str(f, "Value")?,
            expiration: f.get_datetime("Expiration")?,
            secret_type: f.get_str("Type")?.unwrap_or_else(|| SHARED_SECRET.to_owned()),
            owner: row.key.partition,
        })
    }
}

/// Primary row of an identity resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityResourceRecord {
    pub name: String,
    pub enabled: bool,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub required: bool,
    pub emphasize: bool,
    pub show_in_discovery_document: bool,
}

impl TableRecord for IdentityResourceRecord {
    fn key(&self) -> RowKey {
        RowKey::new(IDENTITY_RESOURCE_PARTITION, &self.name)
    }

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields
            .set("Enabled", self.enabled)
            .set_opt("DisplayName", self.display_name.clone())
            .set_opt("Description", self.description.clone())
            .set("Required", self.required)
            .set("Emphasize", self.emphasize)
            .set("ShowInDiscoveryDocument", self.show_in_discovery_document);
        fields
    }

    fn from_row(row: Row) -> TableResult<Self> {
        let f = &row.fields;
        Ok(Self {
            enabled: f.get_bool("Enabled")?.unwrap_or(true),
            display_name: f.get_str("DisplayName")?,
            description: f.get_str("Description")?,
            required: f.get_bool("Required")?.unwrap_or(false),
            emphasize: f.get_bool("Emphasize")?.unwrap_or(false),
            show_in_discovery_document: f.get_bool("ShowInDiscoveryDocument")?.unwrap_or(true),
            name: row.key.sort,
        })
    }
}

/// A claim a client always carries, one value per claim type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientClaimRecord {
    pub client_id: String,
    pub claim_type: String,
    pub value: String,
}

impl TableRecord for ClientClaimRecord {
    fn key(&self) -> RowKey {
        RowKey::new(&self.client_id, &self.claim_type)
    }

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.set("Value", self.value.as_str());
        fields
    }

    fn from_row(row: Row) -> TableResult<Self> {
        Ok(Self {
            value: required_str(&row.fields, "Value")?,
            client_id: row.key.partition,
            claim_type: row.key.sort,
        })
    }
}

/// Primary row of a client: every scalar setting.
///
/// Enumerations are stored as their integer discriminants and validated on
/// read by the client assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub client_id: String,
    pub enabled: bool,
    pub protocol_type: String,
    pub require_client_secret: bool,
    pub client_name: Option<String>,
    pub description: Option<String>,
    pub client_uri: Option<String>,
    pub logo_uri: Option<String>,
    pub require_consent: bool,
    pub allow_remember_consent: bool,
    pub require_pkce: bool,
    pub allow_plain_text_pkce: bool,
    pub allow_access_tokens_via_browser: bool,
    pub front_channel_logout_uri: Option<String>,
    pub front_channel_logout_session_required: bool,
    pub back_channel_logout_uri: Option<String>,
    pub back_channel_logout_session_required: bool,
    pub allow_offline_access: bool,
    pub always_include_user_claims_in_id_token: bool,
    pub identity_token_lifetime: i32,
    pub access_token_lifetime: i32,
    pub authorization_code_lifetime: i32,
    pub absolute_refresh_token_lifetime: i32,
    pub sliding_refresh_token_lifetime: i32,
    pub consent_lifetime: Option<i32>,
    pub refresh_token_usage: i32,
    pub update_access_token_claims_on_refresh: bool,
    pub refresh_token_expiration: i32,
    pub access_token_type: i32,
    pub enable_local_login: bool,
    pub include_jwt_id: bool,
    pub always_send_client_claims: bool,
    pub client_claims_prefix: String,
    pub pair_wise_subject_salt: Option<String>,
    pub user_sso_lifetime: Option<i32>,
    pub user_code_type: Option<String>,
    pub device_code_lifetime: i32,
}

fn required_bool(fields: &Fields, name: &str) -> TableResult<bool> {
    fields.get_bool(name)?.ok_or_else(|| missing(name))
}

fn required_i32(fields: &Fields, name: &str) -> TableResult<i32> {
    fields.get_i32(name)?.ok_or_else(|| missing(name))
}

impl TableRecord for ClientRecord {
    fn key(&self) -> RowKey {
        RowKey::new(CLIENT_PARTITION, &self.client_id)
    }

    fn to_fields(&self) -> Fields {
        let mut f = Fields::new();
        f.set("Enabled", self.enabled)
            .set("ProtocolType", self.protocol_type.as_str())
            .set("RequireClientSecret", self.require_client_secret)
            .set_opt("ClientName", self.client_name.clone())
            .set_opt("Description", self.description.clone())
            .set_opt("ClientUri", self.client_uri.clone())
            .set_opt("LogoUri", self.logo_uri.clone())
            .set("RequireConsent", self.require_consent)
            .set("AllowRememberConsent", self.allow_remember_consent)
            .set("RequirePkce", self.require_pkce)
            .set("AllowPlainTextPkce", self.allow_plain_text_pkce)
            .set("AllowAccessTokensViaBrowser", self.allow_access_tokens_via_browser)
            .set_opt("FrontChannelLogoutUri", self.front_channel_logout_uri.clone())
            .set("FrontChannelLogoutSessionRequired", self.front_channel_logout_session_required)
            .set_opt("BackChannelLogoutUri", self.back_channel_logout_uri.clone())
            .set("BackChannelLogoutSessionRequired", self.back_channel_logout_session_required)
            .set("AllowOfflineAccess", self.allow_offline_access)
            .set("AlwaysIncludeUserClaimsInIdToken", self.always_include_user_claims_in_id_token)
            .set("IdentityTokenLifetime", self.identity_token_lifetime)
            .set("AccessTokenLifetime", self.access_token_lifetime)
            .set("AuthorizationCodeLifetime", self.authorization_code_lifetime)
            .set("AbsoluteRefreshTokenLifetime", self.absolute_refresh_token_lifetime)
            .set("SlidingRefreshTokenLifetime", self.sliding_refresh_token_lifetime)
            .set_opt("ConsentLifetime", self.consent_lifetime)
            .set("RefreshTokenUsage", self.refresh_token_usage)
            .set("UpdateAccessTokenClaimsOnRefresh", self.update_access_token_claims_on_refresh)
            .set("RefreshTokenExpiration", self.refresh_token_expiration)
            .set("AccessTokenType", self.access_token_type)
            .set("EnableLocalLogin", self.enable_local_login)
            .set("IncludeJwtId", self.include_jwt_id)
            .set("AlwaysSendClientClaims", self.always_send_client_claims)
            .set("ClientClaimsPrefix", self.client_claims_prefix.as_str())
            .set_opt("PairWiseSubjectSalt", self.pair_wise_subject_salt.clone())
            .set_opt("UserSsoLifetime", self.user_sso_lifetime)
            .set_opt("UserCodeType", self.user_code_type.clone())
            .set("DeviceCodeLifetime", self.device_code_lifetime);
        f
    }

    fn from_row(row: Row) -> TableResult<Self> {
        let f = &row.fields;
        Ok(Self {
            enabled: required_bool(f, "Enabled")?,
            protocol_type: required_str(f, "ProtocolType")?,
            require_client_secret: required_bool(f, "RequireClientSecret")?,
            client_name: f.get_str("ClientName")?,
            description: f.get_str("Description")?,
            client_uri: f.get_str("ClientUri")?,
            logo_uri: f.get_str("LogoUri")?,
            require_consent: required_bool(f, "RequireConsent")?,
            allow_remember_consent: required_bool(f, "AllowRememberConsent")?,
            require_pkce: required_bool(f, "RequirePkce")?,
            allow_plain_text_pkce: required_bool(f, "AllowPlainTextPkce")?,
            allow_access_tokens_via_browser: required_bool(f, "AllowAccessTokensViaBrowser")?,
            front_channel_logout_uri: f.get_str("FrontChannelLogoutUri")?,
            front_channel_logout_session_required: required_bool(
                f,
                "FrontChannelLogoutSessionRequired",
            )?,
            back_channel_logout_uri: f.get_str("BackChannelLogoutUri")?,
            back_channel_logout_session_required: required_bool(
                f,
                "BackChannelLogoutSessionRequired",
            )?,
            allow_offline_access: required_bool(f, "AllowOfflineAccess")?,
            always_include_user_claims_in_id_token: required_bool(
                f,
                "AlwaysIncludeUserClaimsInIdToken",
            )?,
            identity_token_lifetime: required_i32(f, "IdentityTokenLifetime")?,
            access_token_lifetime: required_i32(f, "AccessTokenLifetime")?,
            authorization_code_lifetime: required_i32(f, "AuthorizationCodeLifetime")?,
            absolute_refresh_token_lifetime: required_i32(f, "AbsoluteRefreshTokenLifetime")?,
            sliding_refresh_token_lifetime: required_i32(f, "SlidingRefreshTokenLifetime")?,
            consent_lifetime: f.get_i32("ConsentLifetime")?,
            refresh_token_usage: required_i32(f, "RefreshTokenUsage")?,
            update_access_token_claims_on_refresh: required_bool(
                f,
                "UpdateAccessTokenClaimsOnRefresh",
            )?,
            refresh_token_expiration: required_i32(f, "RefreshTokenExpiration")?,
            access_token_type: required_i32(f, "AccessTokenType")?,
            enable_local_login: required_bool(f, "EnableLocalLogin")?,
            include_jwt_id: required_bool(f, "IncludeJwtId")?,
            always_send_client_claims: required_bool(f, "AlwaysSendClientClaims")?,
            client_claims_prefix: required_str(f, "ClientClaimsPrefix")?,
            pair_wise_subject_salt: f.get_str("PairWiseSubjectSalt")?,
            user_sso_lifetime: f.get_i32("UserSsoLifetime")?,
            user_code_type: f.get_str("UserCodeType")?,
            device_code_lifetime: required_i32(f, "DeviceCodeLifetime")?,
            client_id: row.key.sort,
        })
    }
}

/// A stored grant, keyed by its escaped handle and subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedGrantRecord {
    /// Raw (unescaped) grant handle.
    pub key: String,
    pub subject_id: String,
    pub grant_type: String,
    pub client_id: String,
    pub creation_time: DateTime<Utc>,
    pub expiration: Option<DateTime<Utc>>,
    pub data: String,
}

impl TableRecord for PersistedGrantRecord {
    fn key(&self) -> RowKey {
        RowKey::new(encode_key_part(&self.key), &self.subject_id)
    }

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields
            .set("Type", self.grant_type.as_str())
            .set("ClientId", self.client_id.as_str())
            .set("CreationTime", self.creation_time)
            .set_opt("Expiration", self.expiration)
            .set("Data", self.data.as_str());
        fields
    }

    fn from_row(row: Row) -> TableResult<Self> {
        let f = &row.fields;
        Ok(Self {
            key: decode_key_part(&row.key.partition)?,
            grant_type: required_str(f, "Type")?,
            client_id: required_str(f, "ClientId")?,
            creation_time: f
                .get_datetime("CreationTime")?
                .ok_or_else(|| missing("CreationTime"))?,
            expiration: f.get_datetime("Expiration")?,
            data: required_str(f, "Data")?,
            subject_id: row.key.sort,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use idtable_storage::{assert_decode_error, testutil::make_row};

    use super::*;

    #[test]
    fn test_escaped_pair_record_keys() {
        let record = ClientRedirectUriRecord::new("client1", "https://app/cb?a=b");
        let row = record.to_row();
        assert_eq!(row.key.partition, "client1");
        assert_eq!(row.key.sort, "https%3A%2F%2Fapp%2Fcb%3Fa%3Db");
        assert_eq!(ClientRedirectUriRecord::from_row(row).unwrap(), record);
    }

    #[test]
    fn test_plain_pair_record_keys() {
        let record = ApiResourceByScopeRecord::new("api1.read", "api1");
        assert_eq!(record.key(), RowKey::new("api1.read", "api1"));
        assert!(record.to_fields().is_empty());
    }

    #[test]
    fn test_secret_record_uses_sequence_key() {
        let record = SecretRecord {
            owner: "api1".to_owned(),
            sequence: Sequence::new(3).unwrap(),
            description: None,
            value: "v".to_owned(),
            expiration: None,
            secret_type: SHARED_SECRET.to_owned(),
        };
        assert_eq!(record.key().sort, "0003");
        assert_eq!(SecretRecord::from_row(record.to_row()).unwrap(), record);
    }

    #[test]
    fn test_secret_type_defaults_when_missing() {
        let row = make_row("client1", "0000", &[("Value", "secret")]);
        let record = SecretRecord::from_row(row).unwrap();
        assert_eq!(record.secret_type, SHARED_SECRET);
    }

    #[test]
    fn test_malformed_secret_sequence_is_decode_error() {
        let row = make_row("client1", "first", &[("Value", "secret")]);
        assert_decode_error!(SecretRecord::from_row(row));
    }

    #[test]
    fn test_scope_show_in_discovery_defaults_true() {
        let row = make_row::<&str>("api1", "api1.read", &[]);
        let record = ApiScopeRecord::from_row(row).unwrap();
        assert!(record.show_in_discovery_document);
        assert!(!record.required);
    }

    #[test]
    fn test_grant_record_escapes_partition() {
        let record = PersistedGrantRecord {
            key: "abc/def+==".to_owned(),
            subject_id: "alice".to_owned(),
            grant_type: "refresh_token".to_owned(),
            client_id: "client1".to_owned(),
            creation_time: Utc.with_ymd_and_hms(2016, 8, 1, 0, 0, 0).unwrap(),
            expiration: None,
            data: "{}".to_owned(),
        };
        let row = record.to_row();
        assert_eq!(row.key.partition, "abc%2Fdef%2B%3D%3D");
        assert!(row.fields.get("Expiration").is_none());
        assert_eq!(PersistedGrantRecord::from_row(row).unwrap(), record);
    }

    #[test]
    fn test_grant_missing_type_is_decode_error() {
        let row = make_row("key", "alice", &[("ClientId", "client1")]);
        assert_decode_error!(PersistedGrantRecord::from_row(row));
    }
}
