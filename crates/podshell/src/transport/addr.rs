//! Forwarding address syntax.
//!
//! An endpoint is `host:port`, `[v6addr]:port`, or a bare port, which binds
//! the loopback address. A forwarding spec joins a bind endpoint and a target
//! endpoint with `:`, the way `ssh -L`/`-R` does.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Host used when an endpoint is given as a bare port.
pub const LOOPBACK: &str = "127.0.0.1";

/// Malformed endpoint or forwarding spec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid address \"{input}\": {reason}")]
pub struct AddrParseError {
    /// The text that failed to parse.
    pub input: String,
    /// What is wrong with it.
    pub reason: &'static str,
}

impl AddrParseError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

/// A host and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Host name or address, without brackets.
    pub host: String,
    /// Port number.
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// An endpoint on [`LOOPBACK`].
    #[must_use]
    pub fn loopback(port: u16) -> Self {
        Self::new(LOOPBACK, port)
    }

    fn from_parts(input: &str, host: Option<&str>, port: &str) -> Result<Self, AddrParseError> {
        let port = parse_port(input, port)?;
        match host {
            None => Ok(Self::loopback(port)),
            Some(host) => {
                let host = host
                    .strip_prefix('[')
                    .and_then(|h| h.strip_suffix(']'))
                    .unwrap_or(host);
                if host.is_empty() {
                    return Err(AddrParseError::new(input, "empty host"));
                }
                Ok(Self::new(host, port))
            }
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match split_fields(s)?.as_slice() {
            [port] => Self::from_parts(s, None, port),
            [host, port] => Self::from_parts(s, Some(host), port),
            _ => Err(AddrParseError::new(s, "expected host:port or port")),
        }
    }
}

/// A bind endpoint and the target its connections are relayed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForwardSpec {
    /// Where to listen.
    pub bind: Endpoint,
    /// Where to connect.
    pub target: Endpoint,
}

impl fmt::Display for ForwardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bind, self.target)
    }
}

impl FromStr for ForwardSpec {
    /// Accepted forms:
    ///
    /// - `port:port` binds loopback and targets loopback
    /// - `port:host:port` binds loopback
    /// - `host:port:host:port`
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields = split_fields(s)?;
        let (bind, target) = match fields.as_slice() {
            [bind_port, target_port] => (
                Endpoint::from_parts(s, None, bind_port)?,
                Endpoint::from_parts(s, None, target_port)?,
            ),
            [bind_port, host, target_port] => (
                Endpoint::from_parts(s, None, bind_port)?,
                Endpoint::from_parts(s, Some(host), target_port)?,
            ),
            [bind_host, bind_port, host, target_port] => (
                Endpoint::from_parts(s, Some(bind_host), bind_port)?,
                Endpoint::from_parts(s, Some(host), target_port)?,
            ),
            _ => {
                return Err(AddrParseError::new(
                    s,
                    "expected [bind_host:]bind_port:[host:]port",
                ));
            }
        };
        Ok(Self { bind, target })
    }
}

/// Split on `:` outside of `[...]`.
fn split_fields(input: &str) -> Result<Vec<&str>, AddrParseError> {
    let mut fields = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| AddrParseError::new(input, "unbalanced brackets"))?;
            }
            ':' if depth == 0 => {
                fields.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(AddrParseError::new(input, "unbalanced brackets"));
    }
    fields.push(&input[start..]);
    Ok(fields)
}

fn parse_port(input: &str, port: &str) -> Result<u16, AddrParseError> {
    port.parse()
        .map_err(|_| AddrParseError::new(input, "port must be a number between 0 and 65535"))
}
