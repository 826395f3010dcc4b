//! Fixtures for store tests.
//!
//! Enabled by the `testutil` feature. Provides a controllable [`Clock`],
//! grant factories, and a small resource catalog shared by unit and
//! integration tests.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;

use crate::{
    grants::Clock,
    model::{ApiResource, ApiScope, IdentityResource, PersistedGrant, Secret},
};

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    /// Starts the clock at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Arc::new(Mutex::new(now)) }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        Self::new(epoch())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// A fixed reference instant, 2016-08-15T12:00:00Z.
///
/// # Panics
///
/// Never; the date is valid.
#[must_use]
#[allow(clippy::expect_used)]
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2016, 8, 15, 12, 0, 0).single().expect("valid date")
}

/// Builds a grant created one hour before [`epoch`].
#[must_use]
pub fn grant(
    key: &str,
    subject_id: &str,
    client_id: &str,
    grant_type: &str,
    expiration: Option<DateTime<Utc>>,
) -> PersistedGrant {
    PersistedGrant::builder()
        .key(key)
        .grant_type(grant_type)
        .subject_id(subject_id)
        .client_id(client_id)
        .creation_time(epoch() - Duration::hours(1))
        .maybe_expiration(expiration)
        .data(format!("{{\"key\":\"{key}\"}}"))
        .build()
}

/// `count` grants for `subject_id` that expired `count..1` minutes before
/// `now`, keyed `{prefix}-{i}`.
#[must_use]
pub fn expired_grants(prefix: &str, subject_id: &str, count: usize, now: DateTime<Utc>) -> Vec<PersistedGrant> {
    (0..count)
        .map(|i| {
            let minutes = i64::try_from(count - i).unwrap_or(i64::MAX);
            grant(
                &format!("{prefix}-{i}"),
                subject_id,
                "client1",
                "authorization_code",
                Some(now - Duration::minutes(minutes)),
            )
        })
        .collect()
}

/// An API resource with one scope per entry of `scopes`, each named after
/// itself.
#[must_use]
pub fn api_resource(name: &str, scopes: &[&str]) -> ApiResource {
    ApiResource::builder()
        .name(name)
        .display_name(format!("{name} display"))
        .user_claims(vec!["name".to_owned()])
        .api_secrets(vec![Secret::builder().value(format!("{name}-secret")).build()])
        .scopes(
            scopes
                .iter()
                .map(|s| ApiScope::builder().name(*s).user_claims(vec!["role".to_owned()]).build())
                .collect(),
        )
        .build()
}

/// `api1` exposing scopes `a`, `b`; `api2` exposing `c`; `api3` exposing `d`.
#[must_use]
pub fn api_catalog() -> Vec<ApiResource> {
    vec![api_resource("api1", &["a", "b"]), api_resource("api2", &["c"]), api_resource("api3", &["d"])]
}

/// The standard `openid`, `profile`, and `email` identity resources.
#[must_use]
pub fn identity_catalog() -> Vec<IdentityResource> {
    vec![
        IdentityResource::builder()
            .name("openid")
            .required(true)
            .user_claims(vec!["sub".to_owned()])
            .build(),
        IdentityResource::builder()
            .name("profile")
            .emphasize(true)
            .user_claims(vec!["name".to_owned(), "family_name".to_owned()])
            .build(),
        IdentityResource::builder()
            .name("email")
            .user_claims(vec!["email".to_owned(), "email_verified".to_owned()])
            .build(),
    ]
}
