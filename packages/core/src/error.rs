//! The core-layer error taxonomy (spec.md §7). Wraps `ProtocolError` for
//! the rows C2/C3 raise and adds the rows C4/C6 own outright.

use std::fmt;

use sdplc_protocol::ProtocolError;

#[derive(Debug, Clone)]
pub enum PlcError {
    /// Raised by C4 at init; fatal, aborts the process.
    ConfigInvalid { reason: String },
    /// A node's configured role has no matching binding; that node's
    /// reconciler is removed, other nodes continue.
    MisconfiguredNode { qualified_name: String, reason: String },
    /// Propagated from C1/C2/C3.
    Protocol(ProtocolError),
}

impl fmt::Display for PlcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlcError::ConfigInvalid { reason } => write!(f, "invalid configuration: {reason}"),
            PlcError::MisconfiguredNode { qualified_name, reason } => {
                write!(f, "node {qualified_name} is misconfigured: {reason}")
            }
            PlcError::Protocol(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PlcError {}

impl From<ProtocolError> for PlcError {
    fn from(e: ProtocolError) -> Self {
        PlcError::Protocol(e)
    }
}
