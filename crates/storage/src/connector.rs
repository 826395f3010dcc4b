//! Resolving connection descriptors into table services.
//!
//! Stores are configured with connection descriptors (strings) per table.
//! A [`TableConnector`] turns each descriptor into a shared
//! `Arc<dyn TableService>`. Tables configured with the same descriptor share
//! one service handle.

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;

use crate::{
    error::ConfigError,
    memory::{DEFAULT_PAGE_SIZE, MemoryTableService},
    service::TableService,
};

/// Resolves connection descriptors into table services.
pub trait TableConnector: Send + Sync {
    /// Returns the service reachable through `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Connect`] when the descriptor cannot be
    /// resolved.
    fn connect(&self, descriptor: &str) -> Result<Arc<dyn TableService>, ConfigError>;
}

/// Connector that hands out one [`MemoryTableService`] per distinct
/// descriptor.
///
/// Any non-empty descriptor is accepted, so tests can point different
/// tables at different "accounts" and check they stay apart.
///
/// # Example
///
/// ```
/// use idtable_storage::{MemoryConnector, TableConnector};
///
/// let connector = MemoryConnector::new();
/// let a = connector.connect("memory://config").unwrap();
/// let b = connector.connect("memory://config").unwrap();
/// assert!(std::sync::Arc::ptr_eq(&a, &b));
/// assert!(connector.connect("").is_err());
/// ```
pub struct MemoryConnector {
    services: Mutex<HashMap<String, Arc<MemoryTableService>>>,
    page_size: usize,
}

impl MemoryConnector {
    /// Creates a connector whose services use the default page size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Creates a connector whose services use `page_size`.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self { services: Mutex::new(HashMap::new()), page_size }
    }

    /// Returns the concrete service behind `descriptor`, if one was handed out.
    #[must_use]
    pub fn service(&self, descriptor: &str) -> Option<Arc<MemoryTableService>> {
        self.services.lock().get(descriptor).cloned()
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl TableConnector for MemoryConnector {
    fn connect(&self, descriptor: &str) -> Result<Arc<dyn TableService>, ConfigError> {
        if descriptor.trim().is_empty() {
            return Err(ConfigError::Connect {
                descriptor: descriptor.to_owned(),
                reason: "descriptor is empty".to_owned(),
            });
        }

        let mut services = self.services.lock();
        let service = services
            .entry(descriptor.to_owned())
            .or_insert_with(|| Arc::new(MemoryTableService::with_page_size(self.page_size)))
            .clone();
        Ok(service)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_same_descriptor_shares_service() {
        let connector = MemoryConnector::new();
        let a = connector.connect("memory://a").unwrap();
        let again = connector.connect("memory://a").unwrap();
        let b = connector.connect("memory://b").unwrap();

        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_empty_descriptor_is_rejected() {
        let connector = MemoryConnector::new();
        assert!(matches!(connector.connect("  "), Err(ConfigError::Connect { .. })));
    }

    #[test]
    fn test_page_size_is_propagated() {
        let connector = MemoryConnector::with_page_size(7);
        connector.connect("memory://a").unwrap();
        assert_eq!(connector.service("memory://a").unwrap().page_size(), 7);
    }
}
