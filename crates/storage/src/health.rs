//! Health report returned by
//! [`TableService::health_check`](crate::TableService::health_check).
//!
//! A table service is either reachable or not. The report carries how long
//! the check took, which kind of service answered, and free-form details
//! such as the number of tables it currently holds.

use std::{collections::BTreeMap, fmt, time::Duration};

/// Health status of a table service.
#[derive(Debug, Clone)]
pub enum HealthStatus {
    /// The service answered and can serve requests.
    Healthy(HealthMetadata),
    /// The service cannot serve requests. The `String` describes why.
    Unhealthy(HealthMetadata, String),
}

impl HealthStatus {
    /// Creates a `Healthy` status.
    #[must_use]
    pub fn healthy(metadata: HealthMetadata) -> Self {
        Self::Healthy(metadata)
    }

    /// Creates an `Unhealthy` status with a reason.
    #[must_use]
    pub fn unhealthy(metadata: HealthMetadata, reason: impl Into<String>) -> Self {
        Self::Unhealthy(metadata, reason.into())
    }

    /// Returns `true` if the service is healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy(_))
    }

    /// Returns the metadata associated with this status.
    #[must_use]
    pub fn metadata(&self) -> &HealthMetadata {
        match self {
            Self::Healthy(m) | Self::Unhealthy(m, _) => m,
        }
    }

    /// Returns the failure reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Healthy(_) => None,
            Self::Unhealthy(_, reason) => Some(reason),
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy(m) => write!(f, "healthy ({}ms)", m.check_duration.as_millis()),
            Self::Unhealthy(m, reason) => {
                write!(f, "unhealthy: {} ({}ms)", reason, m.check_duration.as_millis())
            },
        }
    }
}

/// Metadata about a health check result.
#[derive(Debug, Clone)]
pub struct HealthMetadata {
    /// How long the check took.
    pub check_duration: Duration,
    /// Kind of service that answered (e.g. `"memory"`).
    pub service: String,
    /// Service-specific details, e.g. `table_count`.
    pub details: BTreeMap<String, String>,
}

impl HealthMetadata {
    /// Creates metadata for the given check duration and service kind.
    #[must_use]
    pub fn new(check_duration: Duration, service: impl Into<String>) -> Self {
        Self { check_duration, service: service.into(), details: BTreeMap::new() }
    }

    /// Adds a detail entry, returning `self` for chaining.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_healthy_status() {
        let status = HealthStatus::healthy(
            HealthMetadata::new(Duration::from_millis(2), "memory").with_detail("table_count", "3"),
        );
        assert!(status.is_healthy());
        assert!(status.reason().is_none());
        assert_eq!(status.metadata().service, "memory");
        assert_eq!(status.metadata().details.get("table_count").map(String::as_str), Some("3"));
        assert_eq!(status.to_string(), "healthy (2ms)");
    }

    #[test]
    fn test_unhealthy_status() {
        let status = HealthStatus::unhealthy(
            HealthMetadata::new(Duration::from_secs(5), "remote"),
            "connection refused",
        );
        assert!(!status.is_healthy());
        assert_eq!(status.reason(), Some("connection refused"));
        assert_eq!(status.to_string(), "unhealthy: connection refused (5000ms)");
    }
}
