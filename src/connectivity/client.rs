//! Lazily-chained gateway control session
//!
//! Every public operation first brings the session up to the stage it needs:
//!
//! ```text
//! Uninitialized -> Discovered -> Described -> AddressKnown
//! ```
//!
//! Each step runs only while its result is still missing, so after the first
//! successful operation no further discovery or SOAP round-trips are spent on
//! setup. A failed step caches nothing and is attempted again on the next
//! call. The [`MappingRegistry`] is updated only after the gateway confirms a
//! change.

use super::cgnat::{classify_address, AddressClass};
use super::igd::IgdTransport;
use super::registry::{MappingRegistry, MappingTable};
use super::transport::{Discovery, GatewayTransport};
use super::types::{IpProtocol, MappingError, Stage};
use crate::config::UpnpSettings;
use std::any::Any;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Session fields, populated as stages succeed
#[derive(Debug, Default)]
struct Session {
    local_host: Option<Ipv4Addr>,
    discovery: Option<Discovery>,
    control_url: Option<String>,
    external_addr: Option<IpAddr>,
    active: bool,
}

impl Session {
    fn stage(&self) -> Stage {
        if self.external_addr.is_some() {
            Stage::AddressKnown
        } else if self.control_url.is_some() {
            Stage::Described
        } else if self.discovery.is_some() {
            Stage::Discovered
        } else {
            Stage::Uninitialized
        }
    }
}

/// Run one collaborator call, turning a panic into [`MappingError::InternalFault`]
fn guarded<R>(
    action: &str,
    call: impl FnOnce() -> Result<R, MappingError>,
) -> Result<R, MappingError> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("UPnP {} faulted: {}", action, message);
            Err(MappingError::InternalFault(format!("{}: {}", action, message)))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn validate_port(port: u16) -> Result<u16, MappingError> {
    if port == 0 {
        return Err(MappingError::InvalidPort(port));
    }
    Ok(port)
}

/// UPnP IGD client owning one gateway session and its mapping ledger
///
/// The session lock is held for the whole of each public operation, so stage
/// transitions are atomic and gateway calls from one client never overlap.
///
/// # Example
///
/// ```no_run
/// use portgate::config::UpnpSettings;
/// use portgate::connectivity::{GatewayClient, IpProtocol};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = GatewayClient::from_settings(&UpnpSettings::default());
///
/// println!("Public address: {}", client.query_external_address()?);
/// client.add_port_mapping(8080, 8080, IpProtocol::TCP, "web")?;
///
/// // On shutdown
/// client.reclaim();
/// # Ok(())
/// # }
/// ```
pub struct GatewayClient<T: GatewayTransport> {
    transport: T,
    session: Mutex<Session>,
    registry: MappingRegistry,
}

impl GatewayClient<IgdTransport> {
    /// Create a client talking UPnP IGD with the given settings
    pub fn from_settings(settings: &UpnpSettings) -> Self {
        Self::new(IgdTransport::new(settings))
    }
}

impl<T: GatewayTransport> GatewayClient<T> {
    /// Create a client over `transport`; nothing is sent until first use
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            session: Mutex::new(Session::default()),
            registry: MappingRegistry::new(),
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_discovered(&self, session: &mut Session) -> Result<(), MappingError> {
        if session.discovery.is_some() {
            return Ok(());
        }

        let local = match session.local_host {
            Some(local) => local,
            None => {
                let local = guarded("local address lookup", || self.transport.local_address())?;
                self.registry.clear();
                session.local_host = Some(local);
                local
            }
        };

        info!("Searching for UPnP gateway from {}...", local);
        match guarded("discovery", || self.transport.discover(local)) {
            Ok(discovery) => {
                info!(
                    "Found UPnP gateway at {} ({})",
                    discovery.gateway_addr, discovery.root_url
                );
                session.discovery = Some(discovery);
                Ok(())
            }
            Err(MappingError::InternalFault(message)) => Err(MappingError::InternalFault(message)),
            Err(e) => {
                warn!("No UPnP gateway found: {}", e);
                Err(MappingError::NotDiscovered)
            }
        }
    }

    fn ensure_described(&self, session: &mut Session) -> Result<(), MappingError> {
        if session.control_url.is_some() {
            return Ok(());
        }
        self.ensure_discovered(session)?;

        let discovery = session
            .discovery
            .as_ref()
            .ok_or(MappingError::NotDiscovered)?;

        let described = guarded("device description", || self.transport.describe(discovery));
        let control_url = described.map_err(|e| match e {
            MappingError::DescriptionFailed(_) | MappingError::InternalFault(_) => e,
            other => MappingError::DescriptionFailed(other.to_string()),
        })?;

        info!("Gateway control URL: {}", control_url);
        session.control_url = Some(control_url);
        session.active = true;
        Ok(())
    }

    fn ensure_address_known(&self, session: &mut Session) -> Result<IpAddr, MappingError> {
        if let Some(addr) = session.external_addr {
            return Ok(addr);
        }
        self.ensure_described(session)?;

        let control_url = session.control_url.as_deref().unwrap_or_default();
        let queried = guarded("external address query", || {
            self.transport.external_address(control_url)
        });
        let reported = queried.map_err(|e| match e {
            MappingError::ExternalAddressUnavailable(_) | MappingError::InternalFault(_) => e,
            other => MappingError::ExternalAddressUnavailable(other.to_string()),
        })?;

        let addr = reported.ok_or_else(|| {
            MappingError::ExternalAddressUnavailable(
                "gateway reported no public address".to_string(),
            )
        })?;

        info!("Gateway public address: {}", addr);
        let class = classify_address(addr);
        if !class.is_reachable() {
            let upstream = match class {
                AddressClass::Cgnat => "carrier-grade NAT",
                _ => "another private NAT",
            };
            warn!(
                "Gateway public address {} sits behind {}; mappings will not be reachable from the internet",
                addr, upstream
            );
        }

        session.external_addr = Some(addr);
        Ok(addr)
    }

    fn delete_locked(&self, remote_port: u16, protocol: IpProtocol) -> bool {
        if validate_port(remote_port).is_err() {
            return false;
        }

        match guarded("DeletePortMapping", || {
            self.transport.delete_mapping(remote_port, protocol)
        }) {
            Ok(()) => {
                self.registry.forget(remote_port, protocol);
                info!("Deleted port mapping: {} remote:{}", protocol, remote_port);
                true
            }
            Err(e) => {
                debug!(
                    "Delete of {} remote:{} failed: {}",
                    protocol, remote_port, e
                );
                false
            }
        }
    }

    /// Public address of the gateway, discovering and describing it first if needed
    pub fn query_external_address(&self) -> Result<IpAddr, MappingError> {
        let mut session = self.session();
        self.ensure_address_known(&mut session)
    }

    /// Forward `remote_port` on the gateway to `local_port` on this host
    ///
    /// Any rule already occupying `remote_port` is deleted first; that delete
    /// may fail harmlessly. On failure the client is marked inactive and the
    /// registry is left unchanged.
    pub fn add_port_mapping(
        &self,
        local_port: u16,
        remote_port: u16,
        protocol: IpProtocol,
        description: &str,
    ) -> Result<(), MappingError> {
        validate_port(local_port)?;
        validate_port(remote_port)?;

        let mut session = self.session();
        self.ensure_address_known(&mut session)?;

        let local = session.local_host.ok_or_else(|| {
            MappingError::InternalFault("local address missing after discovery".to_string())
        })?;

        if !self.delete_locked(remote_port, protocol) {
            debug!("No stale mapping removed on {} remote:{}", protocol, remote_port);
        }

        let local_addr = SocketAddr::new(IpAddr::V4(local), local_port);
        match guarded("AddPortMapping", || {
            self.transport
                .add_mapping(local_addr, remote_port, protocol, description)
        }) {
            Ok(()) => {
                self.registry
                    .record(local_port, remote_port, protocol, description);
                info!(
                    "Added port mapping: {} local:{} remote:{}",
                    protocol, local_port, remote_port
                );
                Ok(())
            }
            Err(e) => {
                session.active = false;
                warn!(
                    "Failed to add port mapping {} local:{} remote:{}: {}",
                    protocol, local_port, remote_port, e
                );
                Err(match e {
                    MappingError::InternalFault(message) => MappingError::InternalFault(message),
                    other => MappingError::MappingAddFailed(other.to_string()),
                })
            }
        }
    }

    /// Remove the rule on `remote_port`; `false` is the only failure signal
    pub fn del_port_mapping(&self, remote_port: u16, protocol: IpProtocol) -> bool {
        let _session = self.session();
        self.delete_locked(remote_port, protocol)
    }

    /// Best-effort removal of every mapping this client tracks
    ///
    /// Individual failures are ignored; entries whose delete fails stay in
    /// the registry.
    pub fn reclaim(&self) {
        let mappings = self.registry.snapshot();
        let mut removed = 0usize;
        let mut failed = 0usize;

        for protocol in IpProtocol::ALL {
            let Some(entries) = mappings.get(&protocol) else {
                continue;
            };
            for mapping in entries {
                if self.del_port_mapping(mapping.remote_port, protocol) {
                    removed += 1;
                } else {
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            warn!(
                "Reclaimed {} port mapping(s), {} could not be removed",
                removed, failed
            );
        } else {
            info!("Reclaimed {} port mapping(s)", removed);
        }
    }

    /// Copy of every mapping this client believes is installed
    pub fn get_all_mapping(&self) -> MappingTable {
        self.registry.snapshot()
    }

    /// Current session stage
    pub fn stage(&self) -> Stage {
        self.session().stage()
    }

    /// Whether the gateway was described and no add has failed since
    pub fn is_active(&self) -> bool {
        self.session().active
    }

    /// Local interface address, once determined
    pub fn local_host(&self) -> Option<Ipv4Addr> {
        self.session().local_host
    }

    /// Private address of the discovered gateway
    pub fn gateway_address(&self) -> Option<SocketAddr> {
        self.session().discovery.as_ref().map(|d| d.gateway_addr)
    }

    /// Public address of the gateway, if already queried
    pub fn external_address(&self) -> Option<IpAddr> {
        self.session().external_addr
    }

    /// Classification of the gateway's public address, if already queried
    pub fn address_class(&self) -> Option<AddressClass> {
        self.external_address().map(classify_address)
    }

    /// Control endpoint URL from the device description
    pub fn control_url(&self) -> Option<String> {
        self.session().control_url.clone()
    }

    /// Mapping ledger
    pub fn registry(&self) -> &MappingRegistry {
        &self.registry
    }

    /// Underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }
}
