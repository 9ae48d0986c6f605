//! Ledger of port mappings this client believes are installed
//!
//! The registry mirrors gateway state as last confirmed by this client. It
//! performs no network I/O and is never the source of truth for what the
//! gateway actually has installed.

use super::types::{IpProtocol, PortMapping};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Mappings grouped by protocol, in insertion order
pub type MappingTable = BTreeMap<IpProtocol, Vec<PortMapping>>;

/// Thread-safe, deduplicated record of active mappings
///
/// Within one protocol no two entries share the same (local port, remote
/// port) pair. Every operation holds the single lock for its full duration.
#[derive(Debug, Default)]
pub struct MappingRegistry {
    mappings: Mutex<MappingTable>,
}

impl MappingRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, MappingTable> {
        // The table holds plain values, so a poisoned lock is still consistent
        self.mappings.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a mapping unless its port pair is already tracked
    ///
    /// Returns `true` if a new entry was inserted. A duplicate counts as
    /// already tracked and is not an error.
    pub fn record(
        &self,
        local_port: u16,
        remote_port: u16,
        protocol: IpProtocol,
        description: &str,
    ) -> bool {
        let mut table = self.table();
        let entries = table.entry(protocol).or_default();

        if entries.iter().any(|m| m.same_ports(local_port, remote_port)) {
            return false;
        }

        let mapping = PortMapping::new(local_port, remote_port, protocol, description);
        debug!("Tracking port mapping {}", mapping);
        entries.push(mapping);
        true
    }

    /// Drop every entry of `protocol` whose remote port is `remote_port`
    pub fn forget(&self, remote_port: u16, protocol: IpProtocol) {
        let mut table = self.table();

        if let Some(entries) = table.get_mut(&protocol) {
            entries.retain(|m| m.remote_port != remote_port);
            if entries.is_empty() {
                table.remove(&protocol);
            }
        }
    }

    /// Copy of the current table
    pub fn snapshot(&self) -> MappingTable {
        self.table().clone()
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.table().clear();
    }

    /// Whether the given port pair is tracked for `protocol`
    pub fn contains(&self, local_port: u16, remote_port: u16, protocol: IpProtocol) -> bool {
        self.table()
            .get(&protocol)
            .is_some_and(|entries| entries.iter().any(|m| m.same_ports(local_port, remote_port)))
    }

    /// Number of tracked mappings across all protocols
    pub fn len(&self) -> usize {
        self.table().values().map(Vec::len).sum()
    }

    /// Whether no mapping is tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_record_is_idempotent() {
        let registry = MappingRegistry::new();
        assert!(registry.record(8080, 8080, IpProtocol::TCP, "web"));
        assert!(!registry.record(8080, 8080, IpProtocol::TCP, "web"));
        assert!(!registry.record(8080, 8080, IpProtocol::TCP, "other description"));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot[&IpProtocol::TCP].len(), 1);
        assert_eq!(snapshot[&IpProtocol::TCP][0].description, "web");
    }

    #[test]
    fn test_same_ports_different_protocols_are_distinct() {
        let registry = MappingRegistry::new();
        registry.record(5000, 5000, IpProtocol::TCP, "a");
        registry.record(5000, 5000, IpProtocol::UDP, "b");

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(5000, 5000, IpProtocol::TCP));
        assert!(registry.contains(5000, 5000, IpProtocol::UDP));
    }

    #[test]
    fn test_pair_identity_is_ordered() {
        let registry = MappingRegistry::new();
        registry.record(8080, 9090, IpProtocol::TCP, "a");
        registry.record(9090, 8080, IpProtocol::TCP, "b");
        registry.record(8080, 9091, IpProtocol::TCP, "c");

        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_forget_removes_all_matching_remote_ports() {
        let registry = MappingRegistry::new();
        registry.record(8080, 9000, IpProtocol::TCP, "a");
        registry.record(8081, 9000, IpProtocol::TCP, "b");
        registry.record(8082, 9001, IpProtocol::TCP, "c");
        registry.record(8080, 9000, IpProtocol::UDP, "d");

        registry.forget(9000, IpProtocol::TCP);

        let snapshot = registry.snapshot();
        assert!(snapshot[&IpProtocol::TCP].iter().all(|m| m.remote_port != 9000));
        assert_eq!(snapshot[&IpProtocol::TCP].len(), 1);
        assert_eq!(snapshot[&IpProtocol::UDP].len(), 1);
    }

    #[test]
    fn test_forget_unknown_is_noop() {
        let registry = MappingRegistry::new();
        registry.forget(1234, IpProtocol::UDP);
        assert!(registry.is_empty());

        registry.record(1, 2, IpProtocol::TCP, "x");
        registry.forget(3, IpProtocol::TCP);
        registry.forget(2, IpProtocol::UDP);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_forget_last_entry_empties_snapshot() {
        let registry = MappingRegistry::new();
        registry.record(8080, 8080, IpProtocol::TCP, "web");
        registry.forget(8080, IpProtocol::TCP);

        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let registry = MappingRegistry::new();
        registry.record(8080, 8080, IpProtocol::TCP, "web");

        let mut snapshot = registry.snapshot();
        snapshot.get_mut(&IpProtocol::TCP).unwrap().push(PortMapping::new(
            8080,
            8080,
            IpProtocol::TCP,
            "dup",
        ));
        snapshot.remove(&IpProtocol::TCP);

        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_concurrent_record_keeps_pairs_unique() {
        let registry = Arc::new(MappingRegistry::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || {
                    for port in 1..=50u16 {
                        registry.record(port, port, IpProtocol::UDP, "load");
                        let _ = registry.snapshot();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 50);
    }
}
