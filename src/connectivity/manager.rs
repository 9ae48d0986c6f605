//! Async lifecycle manager for UPnP port mappings
//!
//! [`GatewayClient`] blocks on the network. `UpnpMappingManager` shares one
//! client across tasks, runs each call on the tokio blocking pool and
//! reclaims every tracked mapping when stopped, or when dropped as the last
//! owner of the client.

use super::client::GatewayClient;
use super::igd::IgdTransport;
use super::registry::MappingTable;
use super::transport::GatewayTransport;
use super::types::{IpProtocol, MappingError, PortMapping};
use crate::config::UpnpSettings;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// UPnP Port Mapping Manager with automatic cleanup
///
/// # Example
///
/// ```no_run
/// use portgate::config::UpnpSettings;
/// use portgate::connectivity::{IpProtocol, UpnpMappingManager};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = UpnpMappingManager::from_settings(&UpnpSettings::default());
///
/// let mapping = manager.start(8080, 8080, IpProtocol::TCP).await?;
/// let external_ip = manager.external_address().await?;
/// println!("Reachable at {}:{}", external_ip, mapping.remote_port);
///
/// manager.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct UpnpMappingManager<T: GatewayTransport + 'static> {
    client: Arc<GatewayClient<T>>,
    description_prefix: String,
}

impl UpnpMappingManager<IgdTransport> {
    /// Create a manager over a UPnP IGD client built from `settings`
    pub fn from_settings(settings: &UpnpSettings) -> Self {
        Self::new(
            GatewayClient::from_settings(settings),
            settings.description.clone(),
        )
    }
}

impl<T: GatewayTransport + 'static> UpnpMappingManager<T> {
    /// Create a manager owning `client`
    ///
    /// Mapping descriptions are built as `{prefix}-{protocol}-{local_port}`.
    pub fn new(client: GatewayClient<T>, description_prefix: impl Into<String>) -> Self {
        Self {
            client: Arc::new(client),
            description_prefix: description_prefix.into(),
        }
    }

    /// Shared handle to the underlying client
    ///
    /// While any handle is alive, dropping the manager leaves the tracked
    /// mappings in place; call [`stop`](Self::stop) to reclaim them.
    pub fn client(&self) -> Arc<GatewayClient<T>> {
        self.client.clone()
    }

    /// Description sent to the gateway for a mapping of `local_port`
    pub fn description_for(&self, protocol: IpProtocol, local_port: u16) -> String {
        format!("{}-{}-{}", self.description_prefix, protocol, local_port)
    }

    async fn run_blocking<R, F>(&self, call: F) -> Result<R, MappingError>
    where
        R: Send + 'static,
        F: FnOnce(&GatewayClient<T>) -> R + Send + 'static,
    {
        let client = self.client.clone();
        tokio::task::spawn_blocking(move || call(client.as_ref()))
            .await
            .map_err(|e| MappingError::InternalFault(format!("Task join error: {}", e)))
    }

    /// Forward `remote_port` on the gateway to `local_port` on this host
    pub async fn start(
        &self,
        local_port: u16,
        remote_port: u16,
        protocol: IpProtocol,
    ) -> Result<PortMapping, MappingError> {
        info!(
            "Starting UPnP mapping for {} local:{} remote:{}",
            protocol, local_port, remote_port
        );

        let description = self.description_for(protocol, local_port);
        let sent = description.clone();
        self.run_blocking(move |client| {
            client.add_port_mapping(local_port, remote_port, protocol, &sent)
        })
        .await??;

        Ok(PortMapping::new(local_port, remote_port, protocol, description))
    }

    /// Public address of the gateway
    pub async fn external_address(&self) -> Result<IpAddr, MappingError> {
        self.run_blocking(|client| client.query_external_address())
            .await?
    }

    /// Remove one mapping; `false` if the gateway did not confirm
    pub async fn remove(&self, remote_port: u16, protocol: IpProtocol) -> bool {
        match self
            .run_blocking(move |client| client.del_port_mapping(remote_port, protocol))
            .await
        {
            Ok(removed) => removed,
            Err(e) => {
                warn!("UPnP delete task failed: {}", e);
                false
            }
        }
    }

    /// Reclaim every tracked mapping
    pub async fn stop(&self) -> Result<(), MappingError> {
        info!("Stopping UPnP mapping manager");
        self.run_blocking(|client| client.reclaim()).await
    }

    /// Mappings currently tracked
    pub fn mappings(&self) -> MappingTable {
        self.client.get_all_mapping()
    }
}

impl<T: GatewayTransport + 'static> Drop for UpnpMappingManager<T> {
    fn drop(&mut self) {
        if self.client.registry().is_empty() || Arc::strong_count(&self.client) > 1 {
            return;
        }

        // Best effort; the process may exit before this finishes
        let client = self.client.clone();
        std::thread::spawn(move || {
            client.reclaim();
            debug!("UPnP mappings reclaimed on drop");
        });
    }
}
