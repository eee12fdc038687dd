//! The protocol-layer error taxonomy (spec.md §7, the C1/C2/C3 rows).
//!
//! `sdplc_core` wraps these in its own `PlcError` for the rows it owns
//! (`ConfigInvalid`, `MisconfiguredNode`); everything that can go wrong
//! while just moving bytes/scalars lives here so the HTTP layer and the
//! core can match on it without downcasting an `anyhow::Error`.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// C1: decoding with a word count other than 1, 2, or 4.
    InvalidWidth { words: usize },
    /// C1: encoding a float at 16-bit width.
    Unsupported { reason: String },
    /// C2: the requested single-slot address is already taken.
    AlreadyOccupied { slave: u8, address: u16 },
    /// C3: `register_namespace` was given a string that isn't a valid URL.
    InvalidNamespace { uri: String },
    /// C3: `register_node`/`register_variable` named a namespace that was
    /// never registered.
    NamespaceNotFound { uri: String },
    /// C3: `register_variable` referenced a parent that doesn't exist.
    NodeNotFound { qualified_name: String },
    /// Wire-level I/O or protocol stack failure (TCP/UDP/TLS/RTU/OPC UA).
    Io {
        node: Option<String>,
        message: String,
    },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::InvalidWidth { words } => {
                write!(f, "invalid register width: {words} words")
            }
            ProtocolError::Unsupported { reason } => write!(f, "unsupported: {reason}"),
            ProtocolError::AlreadyOccupied { slave, address } => write!(
                f,
                "slave {slave} address {address} is already occupied"
            ),
            ProtocolError::InvalidNamespace { uri } => {
                write!(f, "invalid OPC UA namespace URI: {uri}")
            }
            ProtocolError::NamespaceNotFound { uri } => {
                write!(f, "OPC UA namespace not registered: {uri}")
            }
            ProtocolError::NodeNotFound { qualified_name } => {
                write!(f, "OPC UA node not found: {qualified_name}")
            }
            ProtocolError::Io { node, message } => match node {
                Some(node) => write!(f, "protocol error for node {node}: {message}"),
                None => write!(f, "protocol error: {message}"),
            },
        }
    }
}

impl std::error::Error for ProtocolError {}
