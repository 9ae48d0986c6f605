//! Connectivity module for UPnP IGD port mapping
//!
//! - [`GatewayClient`] sequences discovery, device description and the
//!   external address query, then adds and deletes mappings
//! - [`MappingRegistry`] records the mappings the gateway confirmed
//! - [`GatewayTransport`] is the seam to the network; [`IgdTransport`] speaks
//!   UPnP through `igd-next`
//! - [`UpnpMappingManager`] drives a shared client from async code and
//!   reclaims its mappings on shutdown

// Submodules
pub mod cgnat;
pub mod client;
pub mod igd;
pub mod manager;
pub mod registry;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use types::{IpProtocol, MappingError, PortMapping, Stage};

pub use cgnat::{classify_address, detect_cgnat, is_private_ip, AddressClass};
pub use client::GatewayClient;
pub use igd::{local_ipv4_for_gateway, IgdTransport};
pub use manager::UpnpMappingManager;
pub use registry::{MappingRegistry, MappingTable};
pub use transport::{Discovery, GatewayTransport};
