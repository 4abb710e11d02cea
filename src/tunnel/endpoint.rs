//! Endpoint addresses
//!
//! Parses and renders the `[user@]host[:port]` strings used to describe the
//! local listener, the jump host and the destination.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Reasons an address string is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    /// Nothing but whitespace was supplied
    #[error("address is empty")]
    Empty,

    /// The host part is missing, e.g. `alice@:22`
    #[error("missing host in '{0}'")]
    MissingHost(String),

    /// The port is not a number in 0..=65535
    #[error("invalid port '{port}' in '{address}'")]
    InvalidPort {
        /// Whole address as given
        address: String,
        /// Offending port text
        port: String,
    },

    /// An IPv6 literal was opened with `[` but never closed
    #[error("unterminated '[' in '{0}'")]
    UnterminatedBracket(String),
}

/// A network endpoint with an optional user name
///
/// Port `0` means "unassigned": for a listener the OS picks one, for the jump
/// host the descriptor substitutes 22.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
    port_given: bool,
    user: String,
}

impl Endpoint {
    /// Build an endpoint from its parts
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            port_given: true,
            user: String::new(),
        }
    }

    /// Parse `[user@]host[:port]`
    ///
    /// The user is everything before the last `@`. IPv6 hosts must be
    /// bracketed when a port follows (`[::1]:22`). An absent user yields the
    /// empty string, an absent port yields 0.
    pub fn parse(address: &str) -> Result<Self, EndpointError> {
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(EndpointError::Empty);
        }

        let (user, rest) = match trimmed.rfind('@') {
            Some(at) => (&trimmed[..at], &trimmed[at + 1..]),
            None => ("", trimmed),
        };

        let (host, port) = split_host_port(trimmed, rest)?;
        if host.is_empty() {
            return Err(EndpointError::MissingHost(trimmed.to_string()));
        }

        Ok(Self {
            host: host.to_string(),
            port: port.unwrap_or(0),
            port_given: port.is_some(),
            user: user.to_string(),
        })
    }

    /// Host name or IP literal, without brackets
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port, 0 when unassigned
    pub fn port(&self) -> u16 {
        self.port
    }

    /// User name, empty when none was given
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Whether the address spelled out a port, even `:0`
    pub fn port_given(&self) -> bool {
        self.port_given
    }

    /// Replace the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self.port_given = true;
        self
    }

    /// Substitute `port` when the current port is 0
    pub fn with_default_port(self, port: u16) -> Self {
        if self.port == 0 {
            self.with_port(port)
        } else {
            self
        }
    }
}

fn split_host_port<'a>(
    address: &str,
    rest: &'a str,
) -> Result<(&'a str, Option<u16>), EndpointError> {
    if let Some(bracketed) = rest.strip_prefix('[') {
        let close = bracketed
            .find(']')
            .ok_or_else(|| EndpointError::UnterminatedBracket(address.to_string()))?;
        let host = &bracketed[..close];
        let tail = &bracketed[close + 1..];
        if tail.is_empty() {
            return Ok((host, None));
        }
        return match tail.strip_prefix(':') {
            Some(port) => Ok((host, Some(parse_port(address, port)?))),
            None => Err(EndpointError::InvalidPort {
                address: address.to_string(),
                port: tail.to_string(),
            }),
        };
    }

    match rest.split_once(':') {
        Some((host, port)) => Ok((host, Some(parse_port(address, port)?))),
        None => Ok((rest, None)),
    }
}

fn parse_port(address: &str, port: &str) -> Result<u16, EndpointError> {
    // u16::from_str accepts a leading '+', which is not a port
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EndpointError::InvalidPort {
            address: address.to_string(),
            port: port.to_string(),
        });
    }
    port.parse().map_err(|_| EndpointError::InvalidPort {
        address: address.to_string(),
        port: port.to_string(),
    })
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Renders `host:port`; the user is never included.
impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_address() {
        let ep = Endpoint::parse("alice@jump.example:2222").unwrap();
        assert_eq!(ep.user(), "alice");
        assert_eq!(ep.host(), "jump.example");
        assert_eq!(ep.port(), 2222);
        assert_eq!(ep.to_string(), "jump.example:2222");
    }

    #[test]
    fn test_render_drops_user_for_many_addresses() {
        for (input, rendered) in [
            ("u@h:1", "h:1"),
            ("deploy@10.0.0.5:3306", "10.0.0.5:3306"),
            ("root@db.internal:65535", "db.internal:65535"),
        ] {
            assert_eq!(Endpoint::parse(input).unwrap().to_string(), rendered);
        }
    }

    #[test]
    fn test_parse_host_only() {
        let ep = Endpoint::parse("host").unwrap();
        assert_eq!(ep.user(), "");
        assert_eq!(ep.port(), 0);
        assert!(!ep.port_given());
        assert_eq!(ep.to_string(), "host:0");
    }

    #[test]
    fn test_explicit_zero_port_is_distinguishable() {
        let omitted = Endpoint::parse("host").unwrap();
        let zero = Endpoint::parse("host:0").unwrap();

        assert_eq!(omitted.port(), zero.port());
        assert_eq!(omitted.to_string(), zero.to_string());
        assert!(zero.port_given());
        assert!(!omitted.port_given());
    }

    #[test]
    fn test_user_split_on_last_at() {
        let ep = Endpoint::parse("ops@corp@bastion:22").unwrap();
        assert_eq!(ep.user(), "ops@corp");
        assert_eq!(ep.host(), "bastion");
    }

    #[test]
    fn test_user_without_port() {
        let ep = Endpoint::parse("tstuser@127.0.0.1").unwrap();
        assert_eq!(ep.user(), "tstuser");
        assert_eq!(ep.host(), "127.0.0.1");
        assert_eq!(ep.port(), 0);
    }

    #[test]
    fn test_malformed_ports_are_rejected() {
        for input in ["host:abc", "host:", "host:70000", "host:+22", "host:22:33", "[::1]x"] {
            assert!(
                matches!(Endpoint::parse(input), Err(EndpointError::InvalidPort { .. })),
                "{} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_missing_host_and_empty() {
        assert_eq!(Endpoint::parse("   "), Err(EndpointError::Empty));
        assert!(matches!(
            Endpoint::parse("alice@:22"),
            Err(EndpointError::MissingHost(_))
        ));
        assert!(matches!(
            Endpoint::parse("[::1:22"),
            Err(EndpointError::UnterminatedBracket(_))
        ));
    }

    #[test]
    fn test_ipv6_literal() {
        let ep = Endpoint::parse("bob@[::1]:2200").unwrap();
        assert_eq!(ep.host(), "::1");
        assert_eq!(ep.port(), 2200);
        assert_eq!(ep.to_string(), "[::1]:2200");

        let bare = Endpoint::parse("[fe80::1]").unwrap();
        assert_eq!(bare.port(), 0);
    }

    #[test]
    fn test_default_port_only_when_zero() {
        assert_eq!(Endpoint::parse("jump").unwrap().with_default_port(22).port(), 22);
        assert_eq!(Endpoint::parse("jump:0").unwrap().with_default_port(22).port(), 22);
        assert_eq!(Endpoint::parse("jump:2222").unwrap().with_default_port(22).port(), 2222);
    }

    #[test]
    fn test_from_str() {
        let ep: Endpoint = "db:5432".parse().unwrap();
        assert_eq!(ep, Endpoint::new("db", 5432));
    }
}
