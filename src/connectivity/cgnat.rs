//! Classification of the public address reported by the gateway
//!
//! A gateway behind another NAT reports an address that is not reachable
//! from the internet. Mappings on such a gateway still succeed but only
//! forward traffic from the next NAT layer.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Shared address space for carrier-grade NAT (RFC 6598)
const CGNAT_NETWORK: Ipv4Addr = Ipv4Addr::new(100, 64, 0, 0);
const CGNAT_PREFIX_LEN: u32 = 10;

/// Where a reported public address sits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressClass {
    /// Globally routable
    Public,
    /// Inside 100.64.0.0/10; an ISP NAT sits upstream
    Cgnat,
    /// RFC 1918, loopback, link-local or unspecified; another LAN NAT sits upstream
    Private,
}

impl AddressClass {
    /// Whether mappings on this gateway can be reached from the internet
    pub fn is_reachable(&self) -> bool {
        matches!(self, AddressClass::Public)
    }
}

/// Classify an address reported by `GetExternalIPAddress`
pub fn classify_address(ip: IpAddr) -> AddressClass {
    if detect_cgnat(ip) {
        AddressClass::Cgnat
    } else if is_private_ip(ip) {
        AddressClass::Private
    } else {
        AddressClass::Public
    }
}

/// Whether `ip` is inside the CGNAT range 100.64.0.0/10
pub fn detect_cgnat(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            let mask = u32::MAX << (32 - CGNAT_PREFIX_LEN);
            u32::from(ipv4) & mask == u32::from(CGNAT_NETWORK)
        }
        IpAddr::V6(_) => false,
    }
}

/// Whether `ip` is a private/local address
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private() || ipv4.is_loopback() || ipv4.is_link_local() || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => ipv6.is_loopback() || ipv6.is_unspecified() || is_ipv6_local(&ipv6),
    }
}

/// ULA (fc00::/7) or link-local (fe80::/10)
fn is_ipv6_local(ipv6: &Ipv6Addr) -> bool {
    let first = ipv6.segments()[0];
    (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}
