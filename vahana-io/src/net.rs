//! Bind address discovery
//!
//! Both listeners bind the IPv4 address of one network interface (`wlan0`
//! on the robot). If the interface has no address the server falls back to
//! loopback so it still starts on a development machine.

use crate::config::NetworkConfig;
use std::ffi::CStr;
use std::io;
use std::net::{IpAddr, Ipv4Addr};

/// IPv4 address currently assigned to interface `name`
pub fn interface_ipv4(name: &str) -> io::Result<Option<Ipv4Addr>> {
    let mut addrs: *mut libc::ifaddrs = std::ptr::null_mut();

    // SAFETY: getifaddrs fills `addrs` with a list we free below
    if unsafe { libc::getifaddrs(&mut addrs) } != 0 {
        return Err(io::Error::last_os_error());
    }

    let mut found = None;
    let mut cursor = addrs;
    while !cursor.is_null() {
        // SAFETY: `cursor` walks the list returned by getifaddrs
        let entry = unsafe { &*cursor };
        cursor = entry.ifa_next;

        if entry.ifa_addr.is_null() || entry.ifa_name.is_null() {
            continue;
        }
        // SAFETY: ifa_name is a NUL-terminated string owned by the list
        let ifa_name = unsafe { CStr::from_ptr(entry.ifa_name) };
        if ifa_name.to_bytes() != name.as_bytes() {
            continue;
        }
        // SAFETY: ifa_addr is non-null and its family tells the concrete type
        if i32::from(unsafe { (*entry.ifa_addr).sa_family }) != libc::AF_INET {
            continue;
        }
        // SAFETY: AF_INET addresses are sockaddr_in
        let sin = unsafe { &*(entry.ifa_addr as *const libc::sockaddr_in) };
        found = Some(Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)));
        break;
    }

    // SAFETY: `addrs` came from a successful getifaddrs
    unsafe { libc::freeifaddrs(addrs) };
    Ok(found)
}

/// Address both listeners bind to
///
/// An explicit `bind_address` wins; otherwise the interface address is
/// looked up, falling back to 127.0.0.1.
pub fn resolve_bind_ip(network: &NetworkConfig) -> IpAddr {
    if let Some(addr) = network.bind_address {
        return addr;
    }

    match interface_ipv4(&network.interface) {
        Ok(Some(ip)) => {
            log::info!("Using {} address {}", network.interface, ip);
            IpAddr::V4(ip)
        }
        Ok(None) => {
            log::warn!(
                "Interface {} has no IPv4 address, falling back to 127.0.0.1",
                network.interface
            );
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
        Err(e) => {
            log::warn!(
                "Could not list interfaces ({}), falling back to 127.0.0.1",
                e
            );
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_interface() {
        assert_eq!(interface_ipv4("lo").unwrap(), Some(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_unknown_interface_falls_back_to_loopback() {
        let network = NetworkConfig {
            interface: "vahana-missing0".to_string(),
            ..NetworkConfig::default()
        };
        assert_eq!(resolve_bind_ip(&network), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_explicit_bind_address_wins() {
        let network = NetworkConfig {
            bind_address: Some("0.0.0.0".parse().unwrap()),
            ..NetworkConfig::default()
        };
        assert_eq!(resolve_bind_ip(&network).to_string(), "0.0.0.0");
    }
}
