//! Backend endpoint resolution

use thiserror::Error;
use url::Url;

/// Errors from resolving or validating endpoints
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    /// Scheme other than http or https
    #[error("unsupported scheme {0:?}, only http and https are allowed")]
    InvalidScheme(String),

    /// Endpoint could not be parsed
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    ParseError { endpoint: String, reason: String },

    /// Listen address is not a valid bind address
    #[error("invalid listen address {address:?}: {reason}")]
    InvalidListenAddress { address: String, reason: String },

    /// Endpoint resolves to the gateway's own listen address
    #[error("endpoint {endpoint:?} points at this gateway's listen address {address:?}")]
    SelfReferentialEndpoint { endpoint: String, address: String },
}

/// Parse a backend target into `(host, secure)`.
///
/// Targets without a scheme are treated as https. The returned host keeps
/// an explicit port when one was given, even the scheme's default.
pub fn parse_gateway_endpoint(raw: &str) -> Result<(String, bool), EndpointError> {
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };

    let url = Url::parse(&with_scheme).map_err(|e| EndpointError::ParseError {
        endpoint: raw.to_string(),
        reason: e.to_string(),
    })?;

    let secure = match url.scheme() {
        "http" => false,
        "https" => true,
        other => return Err(EndpointError::InvalidScheme(other.to_string())),
    };

    let host = url.host_str().ok_or_else(|| EndpointError::ParseError {
        endpoint: raw.to_string(),
        reason: "missing host".to_string(),
    })?;

    // The url crate drops a port equal to the scheme default
    let authority = with_scheme.split_once("://").map_or("", |(_, rest)| rest);
    let authority = authority.split(['/', '?', '#']).next().unwrap_or_default();
    let authority = authority.rsplit_once('@').map_or(authority, |(_, hostport)| hostport);
    let written_port = authority.rsplit_once(':').and_then(|(_, port)| port.parse::<u16>().ok());

    let host = match url.port().or(written_port) {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    Ok((host, secure))
}
