//! Common types for connectivity module

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A forwarding rule this client asked the gateway to install
///
/// Two mappings of the same protocol are considered the same rule when their
/// local and remote ports match; the description is advisory only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortMapping {
    /// Port on this host that receives the forwarded traffic
    pub local_port: u16,
    /// Public port opened on the gateway
    pub remote_port: u16,
    /// Transport protocol of the rule
    pub protocol: IpProtocol,
    /// Human-readable description sent to the gateway
    pub description: String,
}

impl PortMapping {
    /// Create a new mapping value
    pub fn new(
        local_port: u16,
        remote_port: u16,
        protocol: IpProtocol,
        description: impl Into<String>,
    ) -> Self {
        Self {
            local_port,
            remote_port,
            protocol,
            description: description.into(),
        }
    }

    /// Whether this mapping has the given (local, remote) port pair
    pub fn same_ports(&self, local_port: u16, remote_port: u16) -> bool {
        self.local_port == local_port && self.remote_port == remote_port
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} ({})",
            self.protocol, self.remote_port, self.local_port, self.description
        )
    }
}

/// IP protocol numbers
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum IpProtocol {
    /// TCP protocol
    TCP = 6,
    /// UDP protocol
    UDP = 17,
}

impl IpProtocol {
    /// Every protocol the gateway can map, in reclaim order
    pub const ALL: [IpProtocol; 2] = [IpProtocol::TCP, IpProtocol::UDP];

    /// Protocol name as used in IGD actions
    pub fn as_str(&self) -> &'static str {
        match self {
            IpProtocol::TCP => "TCP",
            IpProtocol::UDP => "UDP",
        }
    }
}

impl fmt::Display for IpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IpProtocol {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TCP" => Ok(IpProtocol::TCP),
            "UDP" => Ok(IpProtocol::UDP),
            other => Err(MappingError::UnknownProtocol(other.to_string())),
        }
    }
}

impl From<IpProtocol> for igd_next::PortMappingProtocol {
    fn from(protocol: IpProtocol) -> Self {
        match protocol {
            IpProtocol::TCP => igd_next::PortMappingProtocol::TCP,
            IpProtocol::UDP => igd_next::PortMappingProtocol::UDP,
        }
    }
}

/// Progress of a gateway session
///
/// Stages are ordered and never go backwards within one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    /// Nothing is known about the gateway yet
    Uninitialized,
    /// A gateway answered discovery
    Discovered,
    /// The gateway's control endpoint is known
    Described,
    /// The gateway's public address is known
    AddressKnown,
}

/// Errors that can occur during port mapping
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MappingError {
    /// No gateway answered discovery
    #[error("No gateway found")]
    NotDiscovered,

    /// Reading the gateway's device description failed
    #[error("Device description failed: {0}")]
    DescriptionFailed(String),

    /// The gateway did not report a public address
    #[error("External address unavailable: {0}")]
    ExternalAddressUnavailable(String),

    /// The gateway refused or failed to install a mapping
    #[error("Add port mapping failed: {0}")]
    MappingAddFailed(String),

    /// A gateway call faulted unexpectedly
    #[error("Internal fault: {0}")]
    InternalFault(String),

    /// The local interface address could not be determined
    #[error("Local address lookup failed: {0}")]
    LocalAddress(String),

    /// Port outside 1-65535
    #[error("Invalid port: {0}")]
    InvalidPort(u16),

    /// Protocol name other than TCP or UDP
    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),

    /// Collaborator-level failure talking to the gateway
    #[error("Transport error: {0}")]
    Transport(String),
}
