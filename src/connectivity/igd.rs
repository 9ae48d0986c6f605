//! UPnP IGD transport backed by `igd-next`
//!
//! Uses SSDP (Simple Service Discovery Protocol) to find an IGD on the local
//! network, then SOAP to talk to its WAN connection service. All calls are
//! blocking; async callers go through [`UpnpMappingManager`].
//!
//! [`UpnpMappingManager`]: super::manager::UpnpMappingManager

use super::transport::{Discovery, GatewayTransport};
use super::types::{IpProtocol, MappingError};
use crate::config::UpnpSettings;
use igd_next::{Gateway, SearchOptions};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

/// Routable address used only to pick the outgoing interface; nothing is sent
const ROUTING_PROBE_ADDR: &str = "8.8.8.8:80";

/// Get local IP address for UPnP gateway communication
pub fn local_ipv4_for_gateway() -> Result<Ipv4Addr, MappingError> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .map_err(|e| MappingError::LocalAddress(format!("Failed to create socket: {}", e)))?;

    socket
        .connect(ROUTING_PROBE_ADDR)
        .map_err(|e| MappingError::LocalAddress(format!("Failed to connect: {}", e)))?;

    let local_addr = socket
        .local_addr()
        .map_err(|e| MappingError::LocalAddress(format!("Failed to get local address: {}", e)))?;

    match local_addr.ip() {
        IpAddr::V4(ipv4) => Ok(ipv4),
        IpAddr::V6(_) => Err(MappingError::LocalAddress(
            "UPnP requires IPv4 address".to_string(),
        )),
    }
}

/// Production [`GatewayTransport`] speaking UPnP IGD
///
/// The gateway found by [`discover`](GatewayTransport::discover) is cached
/// and used by every later call.
pub struct IgdTransport {
    search_timeout: Duration,
    lease_duration_secs: u32,
    gateway: Mutex<Option<Gateway>>,
}

impl IgdTransport {
    /// Create a transport using the given settings
    pub fn new(settings: &UpnpSettings) -> Self {
        Self {
            search_timeout: settings.search_timeout(),
            lease_duration_secs: settings.lease_duration_secs,
            gateway: Mutex::new(None),
        }
    }

    fn cached(&self) -> MutexGuard<'_, Option<Gateway>> {
        self.gateway.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_gateway<R>(
        &self,
        f: impl FnOnce(&Gateway) -> Result<R, MappingError>,
    ) -> Result<R, MappingError> {
        match self.cached().as_ref() {
            Some(gateway) => f(gateway),
            None => Err(MappingError::NotDiscovered),
        }
    }
}

impl Default for IgdTransport {
    fn default() -> Self {
        Self::new(&UpnpSettings::default())
    }
}

impl GatewayTransport for IgdTransport {
    fn local_address(&self) -> Result<Ipv4Addr, MappingError> {
        local_ipv4_for_gateway()
    }

    fn discover(&self, local: Ipv4Addr) -> Result<Discovery, MappingError> {
        debug!("Searching for UPnP IGD gateway from {}...", local);

        let gateway = igd_next::search_gateway(SearchOptions {
            bind_addr: SocketAddr::new(IpAddr::V4(local), 0),
            timeout: Some(self.search_timeout),
            ..Default::default()
        })
        .map_err(|e| {
            debug!("UPnP gateway search failed: {}", e);
            MappingError::NotDiscovered
        })?;

        let discovery = Discovery {
            gateway_addr: gateway.addr,
            root_url: gateway.root_url.clone(),
        };
        *self.cached() = Some(gateway);

        Ok(discovery)
    }

    fn describe(&self, discovery: &Discovery) -> Result<String, MappingError> {
        self.with_gateway(|gateway| {
            if gateway.addr != discovery.gateway_addr {
                return Err(MappingError::DescriptionFailed(format!(
                    "description requested for {} but cached gateway is {}",
                    discovery.gateway_addr, gateway.addr
                )));
            }
            if gateway.control_url.is_empty() {
                return Err(MappingError::DescriptionFailed(
                    "device exposes no WAN connection control URL".to_string(),
                ));
            }
            if !gateway.control_schema.contains_key("AddPortMapping") {
                warn!(
                    "Gateway {} does not advertise AddPortMapping in {}",
                    gateway.addr, gateway.control_schema_url
                );
            }

            Ok(format!("http://{}{}", gateway.addr, gateway.control_url))
        })
    }

    fn external_address(&self, control_url: &str) -> Result<Option<IpAddr>, MappingError> {
        debug!("Requesting external address from {}", control_url);
        self.with_gateway(|gateway| {
            gateway
                .get_external_ip()
                .map(Some)
                .map_err(|e| {
                    MappingError::ExternalAddressUnavailable(format!(
                        "GetExternalIPAddress failed: {}",
                        e
                    ))
                })
        })
    }

    fn add_mapping(
        &self,
        local_addr: SocketAddr,
        remote_port: u16,
        protocol: IpProtocol,
        description: &str,
    ) -> Result<(), MappingError> {
        debug!(
            "Adding port mapping: {} -> {} ({}s)",
            remote_port, local_addr, self.lease_duration_secs
        );
        self.with_gateway(|gateway| {
            gateway
                .add_port(
                    protocol.into(),
                    remote_port,
                    local_addr,
                    self.lease_duration_secs,
                    description,
                )
                .map_err(|e| {
                    warn!("UPnP AddPortMapping failed: {}", e);
                    MappingError::Transport(format!("AddPortMapping failed: {}", e))
                })
        })
    }

    fn delete_mapping(&self, remote_port: u16, protocol: IpProtocol) -> Result<(), MappingError> {
        self.with_gateway(|gateway| {
            gateway
                .remove_port(protocol.into(), remote_port)
                .map_err(|e| MappingError::Transport(format!("DeletePortMapping failed: {}", e)))
        })
    }
}
