//! Listen address handling and gateway argument validation

use ming_core::EndpointError;
use std::collections::BTreeSet;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, ToSocketAddrs};
use tracing::debug;
use url::Url;

/// A parsed `host:port` listen address
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenAddress {
    /// Host part; empty for all interfaces
    pub host: String,
    pub port: u16,
    /// Address to bind
    pub socket_addr: SocketAddr,
}

impl ListenAddress {
    /// Split and resolve a listen address such as `:9000`, `127.0.0.1:9000` or `[::1]:9000`
    pub fn resolve(address: &str) -> Result<Self, EndpointError> {
        let (host, port) = split_host_port(address)?;
        let ip = if host.is_empty() {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            resolve_host(&host).into_iter().next().ok_or_else(|| invalid(address, "unable to resolve host"))?
        };
        Ok(Self {
            host,
            port,
            socket_addr: SocketAddr::new(ip, port),
        })
    }

    /// The endpoint clients should use, with the first sorted local IPv4 standing in for an empty host
    pub fn advertised_endpoint(&self, secure: bool) -> String {
        let scheme = if secure { "https" } else { "http" };
        let host = if self.host.is_empty() {
            first_local_ipv4().to_string()
        } else {
            self.host.clone()
        };
        let host = if host.contains(':') { format!("[{host}]") } else { host };
        format!("{scheme}://{host}:{}", self.port)
    }

    /// Every endpoint the gateway answers on, sorted
    pub fn endpoints(&self, secure: bool) -> Vec<String> {
        if !self.host.is_empty() {
            return vec![self.advertised_endpoint(secure)];
        }
        let scheme = if secure { "https" } else { "http" };
        local_ips()
            .into_iter()
            .filter(IpAddr::is_ipv4)
            .map(|ip| format!("{scheme}://{ip}:{}", self.port))
            .collect()
    }
}

fn invalid(address: &str, reason: &str) -> EndpointError {
    EndpointError::InvalidListenAddress {
        address: address.to_string(),
        reason: reason.to_string(),
    }
}

/// Split `host:port`, stripping IPv6 brackets
pub fn split_host_port(address: &str) -> Result<(String, u16), EndpointError> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| invalid(address, "missing port in address"))?;

    let host = match host.strip_prefix('[') {
        Some(rest) => rest
            .strip_suffix(']')
            .ok_or_else(|| invalid(address, "unterminated IPv6 bracket"))?,
        None if host.contains(':') => return Err(invalid(address, "too many colons in address")),
        None => host,
    };

    let port = port
        .parse::<u16>()
        .map_err(|_| invalid(address, "port must be a number between 0 and 65535"))?;

    Ok((host.to_string(), port))
}

fn resolve_host(host: &str) -> Vec<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return vec![ip];
    }
    match (host, 0).to_socket_addrs() {
        Ok(addrs) => addrs.map(|a| a.ip()).collect(),
        Err(e) => {
            debug!(host = %host, error = %e, "host lookup failed");
            Vec::new()
        }
    }
}

/// Addresses of the local interfaces, loopback included
pub fn local_ips() -> BTreeSet<IpAddr> {
    let mut ips: BTreeSet<IpAddr> = local_ip_address::list_afinet_netifas()
        .map(|ifaces| ifaces.into_iter().map(|(_, ip)| ip).collect())
        .unwrap_or_default();
    ips.insert(IpAddr::V4(Ipv4Addr::LOCALHOST));
    ips.insert(IpAddr::V6(Ipv6Addr::LOCALHOST));
    ips
}

fn first_local_ipv4() -> IpAddr {
    local_ips()
        .into_iter()
        .find(|ip| ip.is_ipv4() && !ip.is_loopback())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn is_local_host(host: &str) -> bool {
    if host.is_empty() {
        return true;
    }
    let local = local_ips();
    resolve_host(host)
        .into_iter()
        .any(|ip| ip.is_unspecified() || ip.is_loopback() || local.contains(&ip))
}

/// Host and port of an address that may carry an http(s) scheme
fn extract_host_port(address: &str) -> Result<(String, u16), EndpointError> {
    if !address.contains("://") {
        return split_host_port(address);
    }
    let url = Url::parse(address).map_err(|e| EndpointError::ParseError {
        endpoint: address.to_string(),
        reason: e.to_string(),
    })?;
    let host = url
        .host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
        .unwrap_or_default();
    let port = url.port_or_known_default().ok_or_else(|| EndpointError::ParseError {
        endpoint: address.to_string(),
        reason: "missing port".to_string(),
    })?;
    Ok((host, port))
}

/// Whether two addresses name the same port on this machine
fn same_local_addrs(addr1: &str, addr2: &str) -> Result<bool, EndpointError> {
    let (host1, port1) = extract_host_port(addr1)?;
    let (host2, port2) = extract_host_port(addr2)?;
    if port1 != port2 {
        return Ok(false);
    }
    Ok(is_local_host(&host1) && is_local_host(&host2))
}

/// Check the listen address, and that `endpoint_addr` does not lead back to this gateway
pub fn validate_gateway_arguments(server_addr: &str, endpoint_addr: &str) -> Result<(), EndpointError> {
    let (host, _) = split_host_port(server_addr)?;
    if !is_local_host(&host) {
        return Err(invalid(server_addr, "host in server address should be this server"));
    }

    if !endpoint_addr.is_empty() && same_local_addrs(endpoint_addr, server_addr)? {
        return Err(EndpointError::SelfReferentialEndpoint {
            endpoint: endpoint_addr.to_string(),
            address: server_addr.to_string(),
        });
    }
    Ok(())
}

/// Bind and release `addr` to make sure nothing else holds it. Port 0 is not checked.
pub fn check_port_available(addr: SocketAddr) -> io::Result<()> {
    if addr.port() == 0 {
        return Ok(());
    }
    let listener = TcpListener::bind(addr)?;
    drop(listener);
    Ok(())
}
