//! The node-model and sync-engine crate: everything spec.md calls
//! C4-C6. Owns the typed node registry, the tick scheduler, and the
//! per-tick reconciliation algorithm; leans on `sdplc_protocol` (C1-C3)
//! for the actual byte/wire-level work.

pub mod error;
pub mod node;
pub mod plc;
pub mod scheduler;
pub mod sync;

pub use error::PlcError;
pub use node::{ModbusBinding, Node, NodeRegistry, NodeSpec, OpcUaBinding, Value};
pub use plc::Plc;
pub use scheduler::{Action, EventSpec, Scheduler};
pub use sync::{Role, SyncEngine};
