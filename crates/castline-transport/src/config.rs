//! Multicast transport configuration and provider URLs.
//!
//! A provider URL names the transport and its options in one string:
//!
//! ```text
//! udpm://239.255.76.67:7667?ttl=1&recv_buf_size=2097152
//! ```
//!
//! Host and port may be omitted; the defaults are the protocol's
//! well-known group so unconfigured peers find each other.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::TransportError;

/// Default multicast group shared by peers that were not configured.
pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 76, 67);

/// Default UDP port.
pub const DEFAULT_PORT: u16 = 7667;

/// Default multicast TTL. 0 keeps traffic on the local host.
pub const DEFAULT_TTL: u32 = 0;

/// URL scheme of the multicast provider.
pub const PROVIDER_SCHEME: &str = "udpm";

/// Settings for [`MulticastTransport`](crate::MulticastTransport).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Multicast group address.
    pub group: Ipv4Addr,
    /// UDP port shared by every peer on the group.
    pub port: u16,
    /// Multicast time-to-live (router hops).
    pub ttl: u32,
    /// Whether our own datagrams are looped back to local receivers,
    /// including this process.
    pub loopback: bool,
    /// Local interface used to join the group and send.
    /// `0.0.0.0` lets the OS choose.
    pub interface: Ipv4Addr,
    /// Receive buffer size requested from the OS, if any.
    pub recv_buffer_size: Option<usize>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP,
            port: DEFAULT_PORT,
            ttl: DEFAULT_TTL,
            loopback: true,
            interface: Ipv4Addr::UNSPECIFIED,
            recv_buffer_size: None,
        }
    }
}

impl TransportConfig {
    /// Parses a `udpm://group:port?options` provider URL.
    ///
    /// Recognised options: `ttl`, `recv_buf_size`, `loopback`, `interface`.
    /// Unknown options are ignored.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidUrl`] for unparsable input, another
    /// provider's scheme, or a malformed option value, and
    /// [`TransportError::InvalidConfig`] for a non-multicast group.
    pub fn from_url(url: &str) -> Result<Self, TransportError> {
        let parsed = Url::parse(url)
            .map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;

        if parsed.scheme() != PROVIDER_SCHEME {
            return Err(TransportError::InvalidUrl(format!(
                "expected provider `{PROVIDER_SCHEME}`, got `{}`",
                parsed.scheme()
            )));
        }

        let mut config = Self::default();

        if let Some(host) = parsed.host_str().filter(|h| !h.is_empty()) {
            config.group = host.parse().map_err(|_| {
                TransportError::InvalidUrl(format!(
                    "group must be an IPv4 address, got `{host}`"
                ))
            })?;
        }
        if let Some(port) = parsed.port() {
            config.port = port;
        }

        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "ttl" => config.ttl = parse_option(&key, &value)?,
                "recv_buf_size" => {
                    config.recv_buffer_size = Some(parse_option(&key, &value)?);
                }
                "loopback" => config.loopback = parse_flag(&key, &value)?,
                "interface" => config.interface = parse_option(&key, &value)?,
                other => {
                    tracing::debug!(option = other, "ignoring unknown transport option");
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration can be used to open a transport.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidConfig`] if `group` is not a
    /// multicast address.
    pub fn validate(&self) -> Result<(), TransportError> {
        if !self.group.is_multicast() {
            return Err(TransportError::InvalidConfig(format!(
                "{} is not a multicast address",
                self.group
            )));
        }
        Ok(())
    }
}

impl fmt::Display for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{PROVIDER_SCHEME}://{}:{}?ttl={}",
            self.group, self.port, self.ttl
        )
    }
}

fn parse_option<T: std::str::FromStr>(
    key: &str,
    value: &str,
) -> Result<T, TransportError> {
    value.parse().map_err(|_| {
        TransportError::InvalidUrl(format!("invalid value `{value}` for `{key}`"))
    })
}

fn parse_flag(key: &str, value: &str) -> Result<bool, TransportError> {
    match value {
        "1" | "true" | "on" => Ok(true),
        "0" | "false" | "off" => Ok(false),
        _ => Err(TransportError::InvalidUrl(format!(
            "invalid value `{value}` for `{key}`"
        ))),
    }
}
