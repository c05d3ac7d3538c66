//! Node addressing.
//!
//! An address is either `host:port` or `in-process:<name>`. Transport
//! security follows a fixed port convention rather than configuration:
//!
//! | Port | Network | Security |
//! |------|---------|----------|
//! | 50211 | consensus | plaintext |
//! | 50212 | consensus | TLS |
//! | 5600 | mirror | plaintext |
//! | 443 | mirror | TLS |
//!
//! Any other port is plaintext. In-process channels never use TLS.

use crate::error::{ClientError, Result};
use std::fmt;
use std::str::FromStr;

pub const PORT_NODE_PLAIN: u16 = 50211;
pub const PORT_NODE_TLS: u16 = 50212;
pub const PORT_MIRROR_PLAIN: u16 = 5600;
pub const PORT_MIRROR_TLS: u16 = 443;

const TLS_PORTS: [u16; 2] = [PORT_NODE_TLS, PORT_MIRROR_TLS];

const IN_PROCESS_PREFIX: &str = "in-process";

/// Where a node can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeAddress {
    /// A network endpoint.
    Host { host: String, port: u16 },
    /// A channel living in this process, looked up by name.
    InProcess { name: String },
}

impl NodeAddress {
    pub fn host(host: impl Into<String>, port: u16) -> Self {
        Self::Host {
            host: host.into(),
            port,
        }
    }

    pub fn in_process(name: impl Into<String>) -> Self {
        Self::InProcess { name: name.into() }
    }

    /// Port of a network endpoint; 0 for in-process channels.
    pub fn port(&self) -> u16 {
        match self {
            Self::Host { port, .. } => *port,
            Self::InProcess { .. } => 0,
        }
    }

    pub fn is_in_process(&self) -> bool {
        matches!(self, Self::InProcess { .. })
    }

    /// Whether connections to this address should use TLS.
    pub fn is_transport_security(&self) -> bool {
        TLS_PORTS.contains(&self.port())
    }

    /// The same host on the TLS port of the well-known pair, if any.
    pub fn to_secure(&self) -> Self {
        match self.port() {
            PORT_NODE_PLAIN => self.swap_port(PORT_NODE_PLAIN, PORT_NODE_TLS),
            PORT_MIRROR_PLAIN => self.swap_port(PORT_MIRROR_PLAIN, PORT_MIRROR_TLS),
            _ => self.clone(),
        }
    }

    /// The same host on the plaintext port of the well-known pair, if any.
    pub fn to_insecure(&self) -> Self {
        match self.port() {
            PORT_NODE_TLS => self.swap_port(PORT_NODE_TLS, PORT_NODE_PLAIN),
            PORT_MIRROR_TLS => self.swap_port(PORT_MIRROR_TLS, PORT_MIRROR_PLAIN),
            _ => self.clone(),
        }
    }

    /// Replace port `from` with `to`; any other address is returned as is.
    pub fn swap_port(&self, from: u16, to: u16) -> Self {
        match self {
            Self::Host { host, port } if *port == from => Self::host(host.clone(), to),
            other => other.clone(),
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host { host, port } => write!(f, "{}:{}", host, port),
            Self::InProcess { name } => write!(f, "{}:{}", IN_PROCESS_PREFIX, name),
        }
    }
}

impl FromStr for NodeAddress {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        if s.chars().any(char::is_whitespace) {
            return Err(ClientError::invalid_address(s, "contains whitespace"));
        }

        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [IN_PROCESS_PREFIX, name] if !name.is_empty() => Ok(Self::in_process(*name)),
            [host, port] if !host.is_empty() => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| ClientError::invalid_address(s, "port is not a number"))?;
                Ok(Self::host(*host, port))
            }
            _ => Err(ClientError::invalid_address(s, "expected host:port or in-process:<name>")),
        }
    }
}
