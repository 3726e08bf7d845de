//! Host port allocation for application deployments

use crate::error::{Error, Result};
use panelo_config::{AppKind, PortRange, RESERVED_PORTS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Port allocator tracking which owner holds which host port
///
/// Owners are application keys (`<name>-<user>`). Allocations never overlap
/// each other or the reserved system ports.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PortAllocator {
    /// Allocated ports by owner
    allocations: BTreeMap<String, u16>,
}

impl PortAllocator {
    /// Create an empty allocator
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the lowest free port of `pool` for `owner`
    ///
    /// An owner that already holds a port keeps it.
    pub fn allocate(&mut self, owner: &str, kind: AppKind, pool: PortRange) -> Result<u16> {
        if let Some(&port) = self.allocations.get(owner) {
            return Ok(port);
        }

        let port = pool
            .iter()
            .find(|port| !RESERVED_PORTS.contains(port) && self.owner_of(*port).is_none())
            .ok_or_else(|| Error::PortPoolExhausted {
                kind: kind.to_string(),
                pool: pool.to_string(),
            })?;

        self.allocations.insert(owner.to_string(), port);
        Ok(port)
    }

    /// Allocate a specific port for `owner`
    pub fn allocate_specific(&mut self, owner: &str, port: u16) -> Result<()> {
        if RESERVED_PORTS.contains(&port) {
            return Err(Error::ReservedPort(port));
        }

        if let Some(existing) = self.owner_of(port) {
            if existing != owner {
                return Err(Error::PortUnavailable {
                    port,
                    owner: existing.to_string(),
                });
            }
        }

        self.allocations.insert(owner.to_string(), port);
        Ok(())
    }

    /// Release the port held by `owner`
    pub fn release(&mut self, owner: &str) -> Option<u16> {
        self.allocations.remove(owner)
    }

    /// Port held by `owner`
    pub fn get_allocation(&self, owner: &str) -> Option<u16> {
        self.allocations.get(owner).copied()
    }

    /// Owner holding `port`
    pub fn owner_of(&self, port: u16) -> Option<&str> {
        self.allocations
            .iter()
            .find(|(_, allocated)| **allocated == port)
            .map(|(owner, _)| owner.as_str())
    }

    /// Get all allocations
    pub fn all_allocations(&self) -> &BTreeMap<String, u16> {
        &self.allocations
    }

    /// Number of allocated ports
    pub fn allocated_count(&self) -> usize {
        self.allocations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(start: u16, end: u16) -> PortRange {
        PortRange { start, end }
    }

    #[test]
    fn test_sequential_allocation() {
        let mut ports = PortAllocator::new();
        let wp = AppKind::Wordpress.default_pool();

        let first = ports.allocate("blog-alice", AppKind::Wordpress, wp).unwrap();
        let second = ports.allocate("shop-bob", AppKind::Wordpress, wp).unwrap();
        assert_eq!(first, 8100);
        assert_eq!(second, 8101);

        // Same owner keeps its port
        assert_eq!(ports.allocate("blog-alice", AppKind::Wordpress, wp).unwrap(), first);
        assert_eq!(ports.allocated_count(), 2);
    }

    #[test]
    fn test_reserved_ports_are_skipped() {
        let mut ports = PortAllocator::new();
        let port = ports
            .allocate("dash-clone", AppKind::Nodejs, pool(3000, 3002))
            .unwrap();
        assert_eq!(port, 3002);
        assert!(matches!(
            ports.allocate_specific("ssh-clone", 22),
            Err(Error::ReservedPort(22))
        ));
    }

    #[test]
    fn test_specific_allocation_collision() {
        let mut ports = PortAllocator::new();
        ports.allocate_specific("api-alice", 3150).unwrap();
        ports.allocate_specific("api-alice", 3150).unwrap();

        let err = ports.allocate_specific("api-bob", 3150).unwrap_err();
        assert!(matches!(err, Error::PortUnavailable { port: 3150, ref owner } if owner == "api-alice"));
    }

    #[test]
    fn test_exhaustion_is_an_error() {
        let mut ports = PortAllocator::new();
        let tiny = pool(8400, 8401);
        ports.allocate("a-u", AppKind::Static, tiny).unwrap();
        ports.allocate("b-u", AppKind::Static, tiny).unwrap();

        let err = ports.allocate("c-u", AppKind::Static, tiny).unwrap_err();
        assert!(matches!(err, Error::PortPoolExhausted { .. }));
    }

    #[test]
    fn test_release_makes_port_reusable() {
        let mut ports = PortAllocator::new();
        let py = AppKind::Python.default_pool();
        let port = ports.allocate("api-alice", AppKind::Python, py).unwrap();
        assert_eq!(ports.release("api-alice"), Some(port));
        assert_eq!(ports.release("api-alice"), None);
        assert_eq!(ports.allocate("api-bob", AppKind::Python, py).unwrap(), port);
        assert_eq!(ports.owner_of(port), Some("api-bob"));
    }
}
