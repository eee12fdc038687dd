//! C6 — Sync Engine.
//!
//! The per-tick reconciliation algorithm of spec.md §4.6: read the
//! authoritative protocol (if one is configured), adopt external
//! mutations, fan the value out to the other local protocol view, and
//! optionally fan out to an upstream client. C6 holds only opaque handles
//! into C2/C3 (namespace index + browse name, `(slave, kind, address)`) —
//! never reverse pointers into the node registry (spec.md §9).

use sdplc_protocol::{
    ModbusClient as UpstreamModbusClient, OpcUaAdapter, OpcUaClient as UpstreamOpcUaClient, RegisterCodec,
    RegisterKind, SlaveTable,
};

use crate::error::PlcError;
use crate::node::{Node, Value};

/// Which protocol (if any) this deployment serves or consumes upstream.
/// Used for both `server_role` and `client_role`; spec.md §4.6 requires
/// `server_role != client_role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    OpcUa,
    Modbus,
    None,
}

/// Validates spec.md §8 scenario 6: `server="OPCUA", client="OPCUA"` is
/// rejected before any server starts.
pub fn validate_roles(server_role: Role, client_role: Role) -> Result<(), PlcError> {
    if server_role != Role::None && server_role == client_role {
        return Err(PlcError::ConfigInvalid {
            reason: format!("server_role and client_role are both {server_role:?}"),
        });
    }
    Ok(())
}

pub struct SyncEngine {
    pub server_role: Role,
    pub client_role: Role,
    opcua: std::sync::Arc<parking_lot::Mutex<OpcUaAdapter>>,
    modbus: std::sync::Arc<SlaveTable>,
    upstream_modbus: Option<tokio::sync::Mutex<UpstreamModbusClient>>,
    upstream_opcua: Option<UpstreamOpcUaClient>,
    /// Byte/word order for re-encoding values sent to the upstream Modbus
    /// client, which may differ from the local server's codec.
    upstream_modbus_codec: RegisterCodec,
}

impl SyncEngine {
    pub fn new(
        server_role: Role,
        client_role: Role,
        opcua: std::sync::Arc<parking_lot::Mutex<OpcUaAdapter>>,
        modbus: std::sync::Arc<SlaveTable>,
        upstream_modbus: Option<UpstreamModbusClient>,
        upstream_opcua: Option<UpstreamOpcUaClient>,
        upstream_modbus_codec: RegisterCodec,
    ) -> Result<Self, PlcError> {
        validate_roles(server_role, client_role)?;
        Ok(Self {
            server_role,
            client_role,
            opcua,
            modbus,
            upstream_modbus: upstream_modbus.map(tokio::sync::Mutex::new),
            upstream_opcua,
            upstream_modbus_codec,
        })
    }

    fn misconfigured(node: &Node, reason: &str) -> PlcError {
        PlcError::MisconfiguredNode {
            qualified_name: node.qualified_name.clone(),
            reason: reason.to_string(),
        }
    }

    fn read_modbus_binding(&self, node: &Node) -> Result<Value, PlcError> {
        let binding = node
            .modbus_binding
            .as_ref()
            .ok_or_else(|| Self::misconfigured(node, "server_role=Modbus but no modbus_binding"))?;
        let value = self.modbus.with_slave_mut(binding.slave_id, |slave| -> Result<Value, PlcError> {
            Ok(match binding.kind {
                RegisterKind::Coil => Value::Bool(slave.read_coil(binding.address)?),
                RegisterKind::DiscreteInput => Value::Bool(slave.read_discrete_input(binding.address)?),
                RegisterKind::HoldingRegister => slave.read_holding_register(binding.address)?.into(),
                RegisterKind::InputRegister => slave.read_input_register(binding.address)?.into(),
            })
        })?;
        Ok(value)
    }

    fn write_modbus_binding(&self, node: &Node) -> Result<(), PlcError> {
        let Some(binding) = node.modbus_binding.as_ref() else {
            return Ok(());
        };
        self.modbus.with_slave_mut(binding.slave_id, |slave| -> Result<(), PlcError> {
            match binding.kind {
                RegisterKind::Coil => {
                    slave.write_coil(binding.address, node.value.as_bool().unwrap_or(false))?;
                }
                RegisterKind::DiscreteInput => {
                    slave.write_discrete_input(binding.address, node.value.as_bool().unwrap_or(false))?;
                }
                RegisterKind::HoldingRegister => {
                    if let Some(v) = node.value.as_numeric_value() {
                        slave.write_holding_register(binding.address, v)?;
                    }
                }
                RegisterKind::InputRegister => {
                    if let Some(v) = node.value.as_numeric_value() {
                        slave.write_input_register(binding.address, v)?;
                    }
                }
            }
            Ok(())
        })
    }

    fn write_opcua_binding(&self, node: &Node) -> Result<(), PlcError> {
        if node.opcua_binding.is_none() {
            return Ok(());
        }
        let mut adapter = self.opcua.lock();
        adapter.write(&node.qualified_name, node.value.as_numeric_or_bool())?;
        Ok(())
    }

    /// Step 1+2: read the authoritative source (if any is configured for
    /// this deployment) and adopt an external mutation into `node.value`.
    fn adopt_authoritative(&self, node: &mut Node) -> Result<(), PlcError> {
        let read = match self.server_role {
            Role::OpcUa => {
                if node.opcua_binding.is_none() {
                    return Err(Self::misconfigured(node, "server_role=OPCUA but no opcua_binding"));
                }
                let adapter = self.opcua.lock();
                Some(Value::from(adapter.read(&node.qualified_name)?))
            }
            Role::Modbus => Some(self.read_modbus_binding(node)?),
            Role::None => None,
        };
        if let Some(read) = read {
            let coerced = read.coerce_to(node.value);
            if coerced != node.value {
                log::warn!(
                    "Node {} value updated to {coerced:?} by external {:?} source",
                    node.qualified_name,
                    self.server_role
                );
                node.value = coerced;
            }
        }
        Ok(())
    }

    /// Step 3: write `node.value` into whichever local protocol binding is
    /// not already authoritative, so both views stay coherent.
    fn fan_out_local(&self, node: &Node) -> Result<(), PlcError> {
        if !matches!(self.server_role, Role::OpcUa) {
            self.write_opcua_binding(node)?;
        }
        if !matches!(self.server_role, Role::Modbus) {
            self.write_modbus_binding(node)?;
        }
        Ok(())
    }

    /// Step 4 (if `client_role` is set and the corresponding binding
    /// exists — spec.md §4.6): fan `node.value` out to the configured
    /// upstream client. A node with no binding for `client_role`'s
    /// protocol is skipped silently, mirroring `fan_out_local`'s handling
    /// of step 3 — it must not stall the reconciler for a node that simply
    /// isn't wired to this protocol.
    async fn fan_out_upstream(&self, node: &Node) -> Result<(), PlcError> {
        match self.client_role {
            Role::OpcUa => {
                let Some(client) = &self.upstream_opcua else {
                    return Err(Self::misconfigured(node, "client_role=OPCUA but no upstream client configured"));
                };
                let Some(binding) = &node.opcua_binding else {
                    return Ok(());
                };
                let node_id = match &binding.allocated_node_id {
                    Some(handle) => handle.to_node_id_string(),
                    None => format!("ns=0;s={}", node.qualified_name),
                };
                client
                    .write(&node_id, node.value.as_numeric_or_bool())
                    .map_err(|e| PlcError::Protocol(sdplc_protocol::ProtocolError::Io {
                        node: Some(node.qualified_name.clone()),
                        message: e.to_string(),
                    }))?;
            }
            Role::Modbus => {
                let Some(mutex) = &self.upstream_modbus else {
                    return Err(Self::misconfigured(node, "client_role=Modbus but no upstream client configured"));
                };
                let Some(binding) = &node.modbus_binding else {
                    return Ok(());
                };
                let mut client = mutex.lock().await;
                let io_err = |e: anyhow::Error| {
                    PlcError::Protocol(sdplc_protocol::ProtocolError::Io {
                        node: Some(node.qualified_name.clone()),
                        message: e.to_string(),
                    })
                };
                match binding.kind {
                    RegisterKind::Coil => {
                        client
                            .write_single_coil(binding.address, node.value.as_bool().unwrap_or(false))
                            .await
                            .map_err(io_err)?;
                    }
                    RegisterKind::HoldingRegister => {
                        if let Some(v) = node.value.as_numeric_value() {
                            let words = self
                                .upstream_modbus_codec
                                .encode(v, binding.register_width)
                                .map_err(PlcError::Protocol)?;
                            client
                                .write_holding_registers(binding.address, &words)
                                .await
                                .map_err(io_err)?;
                        }
                    }
                    // DiscreteInput/InputRegister are read-only from the upstream's
                    // perspective (spec.md §4.6 step 4) — never fanned out.
                    RegisterKind::DiscreteInput | RegisterKind::InputRegister => {}
                }
            }
            Role::None => {}
        }
        Ok(())
    }

    /// The full per-tick reconciler body for one node (steps 1-4).
    pub async fn reconcile_node(&self, node: &mut Node) -> Result<(), PlcError> {
        self.adopt_authoritative(node)?;
        self.fan_out_local(node)?;
        if self.client_role != Role::None {
            self.fan_out_upstream(node).await?;
        }
        Ok(())
    }

    /// Step 5 (if `client_role` is set and the corresponding binding
    /// exists — spec.md §4.6, same condition as step 4): bypass the
    /// authoritative-source read and query the upstream client directly,
    /// adopting the result into `node.value` on success. A node with no
    /// binding for `client_role`'s protocol is skipped silently, leaving
    /// `node.value` unchanged, rather than stalling its reconciler.
    pub async fn read_upstream(&self, node: &mut Node) -> Result<(), PlcError> {
        match self.client_role {
            Role::OpcUa => {
                let Some(client) = &self.upstream_opcua else {
                    return Err(Self::misconfigured(node, "client_role=OPCUA but no upstream client configured"));
                };
                let Some(binding) = &node.opcua_binding else {
                    return Ok(());
                };
                let node_id = match &binding.allocated_node_id {
                    Some(handle) => handle.to_node_id_string(),
                    None => format!("ns=0;s={}", node.qualified_name),
                };
                let value = client.read(&node_id).map_err(|e| {
                    PlcError::Protocol(sdplc_protocol::ProtocolError::Io {
                        node: Some(node.qualified_name.clone()),
                        message: e.to_string(),
                    })
                })?;
                node.value = Value::from(value).coerce_to(node.value);
            }
            Role::Modbus => {
                let Some(mutex) = &self.upstream_modbus else {
                    return Err(Self::misconfigured(node, "client_role=Modbus but no upstream client configured"));
                };
                let Some(binding) = &node.modbus_binding else {
                    return Ok(());
                };
                let mut client = mutex.lock().await;
                let io_err = |e: anyhow::Error| {
                    PlcError::Protocol(sdplc_protocol::ProtocolError::Io {
                        node: Some(node.qualified_name.clone()),
                        message: e.to_string(),
                    })
                };
                let value = match binding.kind {
                    RegisterKind::Coil => Value::Bool(
                        *client
                            .read_coils(binding.address, 1)
                            .await
                            .map_err(io_err)?
                            .first()
                            .unwrap_or(&false),
                    ),
                    RegisterKind::DiscreteInput => Value::Bool(
                        *client
                            .read_discrete_inputs(binding.address, 1)
                            .await
                            .map_err(io_err)?
                            .first()
                            .unwrap_or(&false),
                    ),
                    RegisterKind::HoldingRegister => {
                        let words = client
                            .read_holding_registers(binding.address, (binding.register_width / 16) as u16)
                            .await
                            .map_err(io_err)?;
                        let decoded = self
                            .upstream_modbus_codec
                            .decode(&words, node.value.as_numeric_value().map_or(sdplc_protocol::ScalarKind::Int, |v| v.kind()))
                            .map_err(PlcError::Protocol)?;
                        decoded.into()
                    }
                    RegisterKind::InputRegister => {
                        let words = client
                            .read_input_registers(binding.address, (binding.register_width / 16) as u16)
                            .await
                            .map_err(io_err)?;
                        let decoded = self
                            .upstream_modbus_codec
                            .decode(&words, node.value.as_numeric_value().map_or(sdplc_protocol::ScalarKind::Int, |v| v.kind()))
                            .map_err(PlcError::Protocol)?;
                        decoded.into()
                    }
                };
                node.value = value.coerce_to(node.value);
            }
            Role::None => {
                return Err(Self::misconfigured(node, "read_upstream called with client_role=None"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_nonnone_role_for_server_and_client_is_rejected() {
        assert!(validate_roles(Role::OpcUa, Role::OpcUa).is_err());
        assert!(validate_roles(Role::Modbus, Role::Modbus).is_err());
    }

    #[test]
    fn distinct_roles_are_accepted() {
        assert!(validate_roles(Role::OpcUa, Role::Modbus).is_ok());
        assert!(validate_roles(Role::Modbus, Role::None).is_ok());
        assert!(validate_roles(Role::None, Role::None).is_ok());
    }
}
