/// `TrackerUrl` struct containing a tracker url information.
///
/// To create a new `TrackerUrl` use the method builder `parse()`.
#[derive(Debug, PartialEq, Clone)]
pub struct TrackerUrl {
    pub protocol: ConnectionProtocol,
    pub host: String,
    pub port: u16,
    pub endpoint: String,
}

/// Posible `TrackerUrl` Connection Protocol values.
#[derive(Debug, PartialEq, Clone)]
pub enum ConnectionProtocol {
    Http,
    Https,
    Udp,
}

/// Posible `TrackerUrl` Errors.
#[derive(Debug, PartialEq)]
pub enum TrackerUrlError {
    InvalidTrackerUrl,
    UnsupportedConnectionProtocol,
    InvalidPortNumber,
}

impl TrackerUrl {
    /// Builds a new `TrackerUrl` from a &str tracker url.
    ///
    /// Announce URLs without a path (common for `udp://host:port`) keep an
    /// empty endpoint. A missing port falls back to the protocol default.
    ///
    /// It returns a `TrackerUrlError` if:
    /// - The url format is invalid.
    /// - The url connection protocol is unsupported.
    /// - The url port number is not a number.
    pub fn parse(url: &str) -> Result<Self, TrackerUrlError> {
        let (url_without_protocol, protocol) = Self::identify_and_remove_protocol(url)?;

        let (authority, endpoint) = match url_without_protocol.split_once('/') {
            Some((authority, endpoint)) => (authority, endpoint),
            None => (url_without_protocol.as_str(), ""),
        };

        let (host, port) = match authority.split_once(':') {
            Some((host, port)) => (
                host,
                port.parse().map_err(|_| TrackerUrlError::InvalidPortNumber)?,
            ),
            None => (authority, Self::default_port(&protocol)),
        };

        if host.is_empty() {
            return Err(TrackerUrlError::InvalidTrackerUrl);
        }

        Ok(Self {
            protocol,
            host: host.to_string(),
            port,
            endpoint: endpoint.to_string(),
        })
    }

    fn identify_and_remove_protocol(
        url: &str,
    ) -> Result<(String, ConnectionProtocol), TrackerUrlError> {
        let (protocol_name, rest) = match url.split_once("://") {
            Some((protocol_name, rest)) => (protocol_name, rest),
            None => return Err(TrackerUrlError::InvalidTrackerUrl),
        };

        let protocol = match protocol_name {
            "http" => ConnectionProtocol::Http,
            "https" => ConnectionProtocol::Https,
            "udp" => ConnectionProtocol::Udp,
            _ => return Err(TrackerUrlError::UnsupportedConnectionProtocol),
        };

        Ok((rest.to_string(), protocol))
    }

    fn default_port(protocol: &ConnectionProtocol) -> u16 {
        match protocol {
            ConnectionProtocol::Http => 80,
            ConnectionProtocol::Https => 443,
            ConnectionProtocol::Udp => 6969,
        }
    }
}
