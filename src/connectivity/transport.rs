//! Gateway-facing operations consumed by [`GatewayClient`]
//!
//! SSDP discovery, device description and the SOAP actions are each modeled
//! as a single blocking call. [`IgdTransport`] is the production
//! implementation; tests drive the client through recording mocks.
//!
//! [`GatewayClient`]: super::client::GatewayClient
//! [`IgdTransport`]: super::igd::IgdTransport

use super::types::{IpProtocol, MappingError};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// What discovery learned about the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    /// Private (LAN-side) address of the gateway
    pub gateway_addr: SocketAddr,
    /// Location of the device description document
    pub root_url: String,
}

/// Blocking collaborator calls against one gateway
pub trait GatewayTransport: Send + Sync {
    /// Address of the local interface used to reach the gateway
    fn local_address(&self) -> Result<Ipv4Addr, MappingError>;

    /// Search the local network for an IGD
    fn discover(&self, local: Ipv4Addr) -> Result<Discovery, MappingError>;

    /// Read the device description and return the control endpoint URL
    fn describe(&self, discovery: &Discovery) -> Result<String, MappingError>;

    /// Ask the gateway for its public address
    ///
    /// `Ok(None)` means the gateway answered without an address.
    fn external_address(&self, control_url: &str) -> Result<Option<IpAddr>, MappingError>;

    /// Install a forwarding rule from `remote_port` to `local_addr`
    fn add_mapping(
        &self,
        local_addr: SocketAddr,
        remote_port: u16,
        protocol: IpProtocol,
        description: &str,
    ) -> Result<(), MappingError>;

    /// Remove the forwarding rule on `remote_port`
    fn delete_mapping(&self, remote_port: u16, protocol: IpProtocol) -> Result<(), MappingError>;
}
