//! C4 — Node Registry.
//!
//! The authoritative, append-only list of typed nodes (spec.md §3.1/§4.4).
//! Adding a node validates its invariants, then delegates storage
//! allocation to the Modbus memory map (C2) and the OPC UA address space
//! adapter (C3) owned by the same `Plc`. Registering the per-node
//! reconciler with the tick scheduler (C5) is `Plc::add_node`'s job, not
//! this module's — C4 has no dependency on C5.

use std::collections::HashMap;

use sdplc_protocol::{NumericOrBool, NumericValue, OpcUaAdapter, OpcUaHandle, RegisterKind, SlaveTable};

use crate::error::PlcError;

/// The dynamic scalar variant a node's value carries, fixed at creation
/// (spec.md §3.1, §9 "dynamic value variant").
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl Value {
    fn type_name(self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
        }
    }

    /// Coerce `self` into the variant of `target`, per spec.md §4.6's "Int
    /// ↔ Bool ↔ Float normalization of the provided write argument" — the
    /// target's variant wins, never the argument's.
    pub fn coerce_to(self, target: Value) -> Value {
        match (target, self) {
            (Value::Bool(_), Value::Bool(b)) => Value::Bool(b),
            (Value::Bool(_), Value::Int(i)) => Value::Bool(i != 0),
            (Value::Bool(_), Value::Float(f)) => Value::Bool(f != 0.0),
            (Value::Int(_), Value::Int(i)) => Value::Int(i),
            (Value::Int(_), Value::Bool(b)) => Value::Int(b as i64),
            (Value::Int(_), Value::Float(f)) => Value::Int(f as i64),
            (Value::Float(_), Value::Float(f)) => Value::Float(f),
            (Value::Float(_), Value::Bool(b)) => Value::Float(b as i64 as f64),
            (Value::Float(_), Value::Int(i)) => Value::Float(i as f64),
        }
    }

    pub fn as_numeric_or_bool(self) -> NumericOrBool {
        match self {
            Value::Bool(b) => NumericOrBool::Bool(b),
            Value::Int(i) => NumericOrBool::Numeric(NumericValue::Int(i)),
            Value::Float(f) => NumericOrBool::Numeric(NumericValue::Float(f)),
        }
    }

    pub fn as_numeric_value(self) -> Option<NumericValue> {
        match self {
            Value::Int(i) => Some(NumericValue::Int(i)),
            Value::Float(f) => Some(NumericValue::Float(f)),
            Value::Bool(_) => None,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }
}

impl From<NumericOrBool> for Value {
    fn from(v: NumericOrBool) -> Self {
        match v {
            NumericOrBool::Bool(b) => Value::Bool(b),
            NumericOrBool::Numeric(NumericValue::Int(i)) => Value::Int(i),
            NumericOrBool::Numeric(NumericValue::Float(f)) => Value::Float(f),
        }
    }
}

impl From<NumericValue> for Value {
    fn from(v: NumericValue) -> Self {
        match v {
            NumericValue::Int(i) => Value::Int(i),
            NumericValue::Float(f) => Value::Float(f),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModbusBinding {
    pub slave_id: u8,
    pub address: u16,
    pub kind: RegisterKind,
    /// Meaningful only for `HoldingRegister`/`InputRegister`; 1 bit for
    /// coils/discrete inputs.
    pub register_width: u8,
}

#[derive(Debug, Clone)]
pub struct OpcUaBinding {
    pub namespace: String,
    pub parent_object_qualified_name: String,
    pub allocated_node_id: Option<OpcUaHandle>,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub qualified_name: String,
    pub value: Value,
    pub opcua_binding: Option<OpcUaBinding>,
    pub modbus_binding: Option<ModbusBinding>,
    pub parents: Vec<String>,
    pub children: Vec<String>,
    /// Set when C6 drops this node's reconciler after `MisconfiguredNode`
    /// (spec.md §4.6 failure semantics).
    pub stalled: bool,
}

/// What the caller supplies to `NodeRegistry::add_node`; `Node`'s runtime
/// fields (`allocated_node_id`, `stalled`) are filled in by the registry.
pub struct NodeSpec {
    pub qualified_name: String,
    pub value: Value,
    pub opcua: Option<(String, String)>, // (namespace_uri, parent_object_qualified_name)
    pub modbus: Option<ModbusBinding>,
    pub parents: Vec<String>,
    pub children: Vec<String>,
}

fn validate(spec: &NodeSpec) -> Result<(), PlcError> {
    if spec.opcua.is_none() && spec.modbus.is_none() {
        return Err(PlcError::ConfigInvalid {
            reason: format!("node {} has neither an OPC UA nor a Modbus binding", spec.qualified_name),
        });
    }
    if let Some(modbus) = &spec.modbus {
        match modbus.kind {
            RegisterKind::Coil | RegisterKind::DiscreteInput => {
                if !matches!(spec.value, Value::Bool(_)) {
                    return Err(PlcError::ConfigInvalid {
                        reason: format!(
                            "node {} binds a coil/discrete input but its value is not Bool",
                            spec.qualified_name
                        ),
                    });
                }
            }
            RegisterKind::HoldingRegister | RegisterKind::InputRegister => match spec.value {
                Value::Bool(_) => {
                    return Err(PlcError::ConfigInvalid {
                        reason: format!(
                            "node {} binds a register but its value is Bool",
                            spec.qualified_name
                        ),
                    })
                }
                Value::Float(_) if modbus.register_width == 16 => {
                    return Err(PlcError::ConfigInvalid {
                        reason: format!(
                            "node {} declares a 16-bit float register, which is unsupported",
                            spec.qualified_name
                        ),
                    })
                }
                _ => {}
            },
        }
    }
    Ok(())
}

pub struct NodeRegistry {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn lookup(&self, qualified_name: &str) -> Option<&Node> {
        self.index.get(qualified_name).map(|&i| &self.nodes[i])
    }

    pub fn lookup_mut(&mut self, qualified_name: &str) -> Option<&mut Node> {
        if let Some(&i) = self.index.get(qualified_name) {
            Some(&mut self.nodes[i])
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Validate and register `spec`, allocating backing storage through
    /// `opcua`/`modbus` as needed (spec.md §4.4 steps 1-3). Registering the
    /// reconciler with the scheduler (step 4) is the caller's job.
    pub fn add_node(
        &mut self,
        spec: NodeSpec,
        opcua: &parking_lot::Mutex<OpcUaAdapter>,
        modbus: &SlaveTable,
    ) -> Result<(), PlcError> {
        if self.index.contains_key(&spec.qualified_name) {
            return Err(PlcError::ConfigInvalid {
                reason: format!("duplicate node qualified_name {}", spec.qualified_name),
            });
        }
        validate(&spec)?;

        let opcua_binding = match &spec.opcua {
            Some((namespace_uri, parent_qualified_name)) => {
                let mut adapter = opcua.lock();
                adapter.register_namespace(namespace_uri)?;
                if adapter.register_node(parent_qualified_name, namespace_uri).is_err() {
                    // Parent object already exists from a sibling node; fall through.
                }
                let handle = adapter.register_variable(
                    &spec.qualified_name,
                    namespace_uri,
                    true,
                    spec.value.as_numeric_or_bool(),
                    parent_qualified_name,
                )?;
                Some(OpcUaBinding {
                    namespace: namespace_uri.clone(),
                    parent_object_qualified_name: parent_qualified_name.clone(),
                    allocated_node_id: Some(handle),
                })
            }
            None => None,
        };

        if let Some(modbus_binding) = &spec.modbus {
            modbus.with_slave_mut(modbus_binding.slave_id, |slave| -> Result<(), PlcError> {
                match modbus_binding.kind {
                    RegisterKind::Coil => {
                        slave.add_coil(modbus_binding.address, spec.value.as_bool().unwrap_or(false))?
                    }
                    RegisterKind::DiscreteInput => slave
                        .add_discrete_input(modbus_binding.address, spec.value.as_bool().unwrap_or(false))?,
                    RegisterKind::HoldingRegister => slave.add_holding_register(
                        modbus_binding.address,
                        spec.value.as_numeric_value().expect("validated above"),
                        modbus_binding.register_width,
                    )?,
                    RegisterKind::InputRegister => slave.add_input_register(
                        modbus_binding.address,
                        spec.value.as_numeric_value().expect("validated above"),
                        modbus_binding.register_width,
                    )?,
                }
                Ok(())
            })?;
        }

        let node = Node {
            qualified_name: spec.qualified_name.clone(),
            value: spec.value,
            opcua_binding,
            modbus_binding: spec.modbus,
            parents: spec.parents,
            children: spec.children,
            stalled: false,
        };
        self.index.insert(spec.qualified_name, self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdplc_protocol::{ByteOrder, RegisterCodec, WordOrder};

    fn fixtures() -> (parking_lot::Mutex<OpcUaAdapter>, SlaveTable) {
        let address_space = std::sync::Arc::new(opcua::sync::RwLock::new(
            opcua::server::address_space::AddressSpace::new(),
        ));
        let opcua = parking_lot::Mutex::new(OpcUaAdapter::new(address_space));
        let modbus = SlaveTable::new(RegisterCodec::new(ByteOrder::Big, WordOrder::Big));
        (opcua, modbus)
    }

    #[test]
    fn float_at_16_bit_width_is_rejected_before_touching_storage() {
        let (opcua, modbus) = fixtures();
        let mut registry = NodeRegistry::new();
        let spec = NodeSpec {
            qualified_name: "Tank Level".into(),
            value: Value::Float(3.14),
            opcua: None,
            modbus: Some(ModbusBinding {
                slave_id: 0,
                address: 0,
                kind: RegisterKind::HoldingRegister,
                register_width: 16,
            }),
            parents: vec![],
            children: vec![],
        };
        let err = registry.add_node(spec, &opcua, &modbus).unwrap_err();
        assert!(matches!(err, PlcError::ConfigInvalid { .. }));
        assert!(!modbus.has_slave(0));
    }

    #[test]
    fn duplicate_qualified_name_is_rejected() {
        let (opcua, modbus) = fixtures();
        let mut registry = NodeRegistry::new();
        let make_spec = || NodeSpec {
            qualified_name: "Inlet Valve".into(),
            value: Value::Bool(false),
            opcua: None,
            modbus: Some(ModbusBinding {
                slave_id: 0,
                address: 0,
                kind: RegisterKind::Coil,
                register_width: 1,
            }),
            parents: vec![],
            children: vec![],
        };
        registry.add_node(make_spec(), &opcua, &modbus).unwrap();
        let err = registry.add_node(make_spec(), &opcua, &modbus).unwrap_err();
        assert!(matches!(err, PlcError::ConfigInvalid { .. }));
    }

    #[test]
    fn coerce_to_normalizes_into_the_targets_variant() {
        assert_eq!(Value::Int(0).coerce_to(Value::Bool(false)), Value::Bool(false));
        assert_eq!(Value::Bool(true).coerce_to(Value::Int(0)), Value::Int(1));
        assert_eq!(Value::Int(7).coerce_to(Value::Float(0.0)), Value::Float(7.0));
    }
}
