//! Upstream clients: when a node is bound under `client_role`, the sync
//! engine reads/writes a register or OPC UA node on some *other* server
//! instead of serving one itself (spec.md §4.6 step 4, §9 Open Question
//! `client_role`). These two modules are the downstream edge of that path.

pub mod modbus;
pub mod opcua;

pub use modbus::ModbusClient;
pub use opcua::OpcUaClient;
