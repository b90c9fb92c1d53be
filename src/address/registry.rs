//! Address registry: one `(pull, publish, identity)` triple per handler name.
//!
//! Ports are handed out in pairs from a counter starting at
//! [`RegistryConfig::base_port`]; the pull endpoint gets the lower port and
//! the publish endpoint the next one. A name is allocated at most once per
//! registry, so repeated lookups return the same address.
//!
//! # Example
//!
//! ```
//! use edgewire::address::AddressRegistry;
//!
//! let registry = AddressRegistry::default();
//! let app = registry.get_handler_address("app").unwrap();
//!
//! assert_eq!(app.pull_endpoint, "tcp://127.0.0.1:10070");
//! assert_eq!(app.publish_endpoint, "tcp://127.0.0.1:10071");
//! assert_eq!(registry.get_handler_address("app").unwrap(), app);
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::generate_identity;
use crate::config::RegistryConfig;
use crate::error::{HandlerError, Result};

/// Endpoints and identity of one logical handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerAddress {
    /// Handler name this address was allocated for.
    pub name: String,
    /// Endpoint the handler pulls requests from.
    pub pull_endpoint: String,
    /// Endpoint the handler publishes responses to.
    pub publish_endpoint: String,
    /// Identity set on the publish socket.
    pub identity: String,
    /// Port in `pull_endpoint`.
    pub pull_port: u16,
    /// Port in `publish_endpoint` (always `pull_port + 1`).
    pub publish_port: u16,
}

impl HandlerAddress {
    /// Build an address from explicit endpoints, bypassing the registry.
    ///
    /// Ports are left at 0 since they are not known here.
    pub fn from_endpoints(
        name: impl Into<String>,
        pull_endpoint: impl Into<String>,
        publish_endpoint: impl Into<String>,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            pull_endpoint: pull_endpoint.into(),
            publish_endpoint: publish_endpoint.into(),
            identity: identity.into(),
            pull_port: 0,
            publish_port: 0,
        }
    }
}

/// Mutable registry state, guarded as one critical section.
struct RegistryState {
    /// Next free pull port. Wider than a port so the last pair fits.
    next_port: u32,
    /// Addresses by handler name.
    addresses: HashMap<String, HandlerAddress>,
}

/// Registry mapping handler names to addresses.
///
/// Construct one per process and share it by reference (or `Arc`).
pub struct AddressRegistry {
    host: String,
    state: Mutex<RegistryState>,
}

impl AddressRegistry {
    /// Create an empty registry.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            host: config.host,
            state: Mutex::new(RegistryState {
                next_port: u32::from(config.base_port),
                addresses: HashMap::new(),
            }),
        }
    }

    /// Return the address for `name`, allocating it on first use.
    pub fn get_handler_address(&self, name: &str) -> Result<HandlerAddress> {
        let mut state = self.lock()?;

        if let Some(address) = state.addresses.get(name) {
            return Ok(address.clone());
        }

        let pull_port = u16::try_from(state.next_port).map_err(|_| exhausted())?;
        let publish_port = pull_port.checked_add(1).ok_or_else(exhausted)?;
        let identity = generate_identity()?;

        let address = HandlerAddress {
            name: name.to_string(),
            pull_endpoint: self.endpoint(pull_port),
            publish_endpoint: self.endpoint(publish_port),
            identity,
            pull_port,
            publish_port,
        };

        tracing::debug!(
            name,
            pull = %address.pull_endpoint,
            publish = %address.publish_endpoint,
            identity = %address.identity,
            "Allocated handler address"
        );

        state.next_port = u32::from(publish_port) + 1;
        state.addresses.insert(name.to_string(), address.clone());
        Ok(address)
    }

    /// Return the address for `name` if it was already allocated.
    pub fn lookup(&self, name: &str) -> Option<HandlerAddress> {
        self.lock().ok()?.addresses.get(name).cloned()
    }

    /// Number of allocated addresses.
    pub fn len(&self) -> usize {
        self.lock().map(|state| state.addresses.len()).unwrap_or(0)
    }

    /// Check if nothing has been allocated yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn endpoint(&self, port: u16) -> String {
        format!("tcp://{}:{}", self.host, port)
    }

    fn lock(&self) -> Result<MutexGuard<'_, RegistryState>> {
        self.state
            .lock()
            .map_err(|_| HandlerError::Registry("registry lock poisoned".to_string()))
    }
}

impl Default for AddressRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

fn exhausted() -> HandlerError {
    HandlerError::Registry("port range exhausted".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_first_address_uses_base_port() {
        let registry = AddressRegistry::default();
        let address = registry.get_handler_address("app").unwrap();

        assert_eq!(address.name, "app");
        assert_eq!(address.pull_port, 10070);
        assert_eq!(address.publish_port, 10071);
        assert_eq!(address.pull_endpoint, "tcp://127.0.0.1:10070");
        assert_eq!(address.publish_endpoint, "tcp://127.0.0.1:10071");
    }

    #[test]
    fn test_repeated_lookup_is_idempotent() {
        let registry = AddressRegistry::default();

        let first = registry.get_handler_address("app").unwrap();
        let second = registry.get_handler_address("app").unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_distinct_names_never_overlap() {
        let registry = AddressRegistry::default();

        let a = registry.get_handler_address("a").unwrap();
        let b = registry.get_handler_address("b").unwrap();
        let c = registry.get_handler_address("c").unwrap();

        assert_eq!(b.pull_port, a.publish_port + 1);
        assert_eq!(c.pull_port, b.publish_port + 1);
        assert_ne!(a.identity, b.identity);
        assert_ne!(b.identity, c.identity);
    }

    #[test]
    fn test_custom_host_and_base_port() {
        let registry = AddressRegistry::new(RegistryConfig {
            host: "10.1.2.3".to_string(),
            base_port: 9000,
        });
        let address = registry.get_handler_address("x").unwrap();

        assert_eq!(address.pull_endpoint, "tcp://10.1.2.3:9000");
        assert_eq!(address.publish_endpoint, "tcp://10.1.2.3:9001");
    }

    #[test]
    fn test_port_exhaustion() {
        let registry = AddressRegistry::new(RegistryConfig {
            host: "127.0.0.1".to_string(),
            base_port: u16::MAX - 3,
        });

        assert!(registry.get_handler_address("a").is_ok());
        assert!(registry.get_handler_address("b").is_ok());
        let err = registry.get_handler_address("c").unwrap_err();
        assert!(err.to_string().contains("exhausted"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_last_port_pair_allocated() {
        let registry = AddressRegistry::new(RegistryConfig {
            host: "127.0.0.1".to_string(),
            base_port: u16::MAX - 1,
        });

        let address = registry.get_handler_address("a").unwrap();
        assert_eq!(address.pull_port, u16::MAX - 1);
        assert_eq!(address.publish_port, u16::MAX);
        assert_eq!(address.publish_endpoint, "tcp://127.0.0.1:65535");

        assert!(registry.get_handler_address("b").is_err());
        assert_eq!(registry.get_handler_address("a").unwrap(), address);
    }

    #[test]
    fn test_odd_top_port_exhausted() {
        let registry = AddressRegistry::new(RegistryConfig {
            host: "127.0.0.1".to_string(),
            base_port: u16::MAX,
        });

        assert!(registry.get_handler_address("a").is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_lookup_does_not_allocate() {
        let registry = AddressRegistry::default();

        assert!(registry.lookup("app").is_none());
        assert!(registry.is_empty());

        let address = registry.get_handler_address("app").unwrap();
        assert_eq!(registry.lookup("app"), Some(address));
    }

    #[test]
    fn test_concurrent_allocation_is_unique() {
        let registry = Arc::new(AddressRegistry::default());

        let threads: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    (0..16)
                        .map(|i| registry.get_handler_address(&format!("h{}-{}", t, i)).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ports = HashSet::new();
        for thread in threads {
            for address in thread.join().unwrap() {
                assert!(ports.insert(address.pull_port));
                assert!(ports.insert(address.publish_port));
            }
        }
        assert_eq!(ports.len(), 8 * 16 * 2);
        assert_eq!(registry.len(), 8 * 16);
    }

    #[test]
    fn test_from_endpoints() {
        let address = HandlerAddress::from_endpoints("raw", "tcp://a:1", "tcp://a:2", "id");
        assert_eq!(address.pull_endpoint, "tcp://a:1");
        assert_eq!(address.publish_endpoint, "tcp://a:2");
        assert_eq!(address.identity, "id");
    }
}
