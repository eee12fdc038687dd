//! C3 — OPC UA Address Space Adapter.
//!
//! Wraps an embedded `opcua` server's address space: namespace
//! registration, object/variable creation under `Objects`, and read/write
//! by qualified (browse) name. The running `opcua::server::Server` and its
//! network listener are owned by the binary crate's boot sequence; this
//! adapter only touches the address space, matching spec.md's framing of
//! the OPC UA stack itself as an external collaborator.

use std::collections::HashMap;
use std::sync::Arc;

use opcua::server::address_space::{AddressSpace, ObjectBuilder, VariableBuilder};
use opcua::server::prelude::NodeId as UaNodeId;
use opcua::sync::RwLock as UaRwLock;
use opcua::types::{DataValue, ObjectId, Variant};

use crate::codec::NumericValue;
use crate::error::ProtocolError;

/// An opaque handle into the address space — namespace index plus browse
/// name, per spec.md §9's "hold handles, never reverse pointers" note.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpcUaHandle {
    pub namespace_index: u16,
    pub qualified_name: String,
}

impl OpcUaHandle {
    /// Formats this handle as an OPC UA `NodeId` string (`ns=<index>;s=<name>`)
    /// — the syntax `opcua::types::NodeId::from_str` parses, as opposed to a
    /// bare browse name.
    pub fn to_node_id_string(&self) -> String {
        format!("ns={};s={}", self.namespace_index, self.qualified_name)
    }
}

pub struct OpcUaAdapter {
    address_space: Arc<UaRwLock<AddressSpace>>,
    namespaces: HashMap<String, u16>,
    objects: HashMap<String, UaNodeId>,
    variables: HashMap<String, UaNodeId>,
}

impl OpcUaAdapter {
    pub fn new(address_space: Arc<UaRwLock<AddressSpace>>) -> Self {
        Self {
            address_space,
            namespaces: HashMap::new(),
            objects: HashMap::new(),
            variables: HashMap::new(),
        }
    }

    /// `register_namespace(uri) -> index`. Fails with `InvalidNamespace` if
    /// `uri` does not parse as a URL.
    pub fn register_namespace(&mut self, uri: &str) -> Result<u16, ProtocolError> {
        if let Some(&index) = self.namespaces.get(uri) {
            return Ok(index);
        }
        url::Url::parse(uri).map_err(|_| ProtocolError::InvalidNamespace {
            uri: uri.to_string(),
        })?;

        let mut space = self.address_space.write();
        let index = space.register_namespace(uri).unwrap_or(0);
        drop(space);
        self.namespaces.insert(uri.to_string(), index);
        Ok(index)
    }

    /// `register_node(qualified_name, namespace_uri) -> handle`. Creates an
    /// object node under `Objects` in that namespace.
    pub fn register_node(
        &mut self,
        qualified_name: &str,
        namespace_uri: &str,
    ) -> Result<OpcUaHandle, ProtocolError> {
        let index = self
            .namespaces
            .get(namespace_uri)
            .copied()
            .ok_or_else(|| ProtocolError::NamespaceNotFound {
                uri: namespace_uri.to_string(),
            })?;

        let node_id = UaNodeId::new(index, qualified_name);
        {
            let mut space = self.address_space.write();
            ObjectBuilder::new(&node_id, qualified_name, qualified_name)
                .organized_by(UaNodeId::new(0, ObjectId::ObjectsFolder as u32))
                .insert(&mut space);
        }
        self.objects.insert(qualified_name.to_string(), node_id.clone());
        Ok(OpcUaHandle {
            namespace_index: index,
            qualified_name: qualified_name.to_string(),
        })
    }

    /// `register_variable(qualified_name, writable, initial_value, parent)`.
    /// `parent` is resolved by qualified name against previously-registered
    /// object nodes; failing to resolve it raises `NodeNotFound`.
    pub fn register_variable(
        &mut self,
        qualified_name: &str,
        namespace_uri: &str,
        writable: bool,
        initial_value: NumericOrBool,
        parent_qualified_name: &str,
    ) -> Result<OpcUaHandle, ProtocolError> {
        let index = self
            .namespaces
            .get(namespace_uri)
            .copied()
            .ok_or_else(|| ProtocolError::NamespaceNotFound {
                uri: namespace_uri.to_string(),
            })?;
        let parent = self
            .objects
            .get(parent_qualified_name)
            .cloned()
            .ok_or_else(|| ProtocolError::NodeNotFound {
                qualified_name: parent_qualified_name.to_string(),
            })?;

        let node_id = UaNodeId::new(index, qualified_name);
        {
            let mut space = self.address_space.write();
            VariableBuilder::new(&node_id, qualified_name, qualified_name)
                .value(initial_value.into_variant())
                .writable(writable)
                .organized_by(parent)
                .insert(&mut space);
        }
        self.variables.insert(qualified_name.to_string(), node_id);
        Ok(OpcUaHandle {
            namespace_index: index,
            qualified_name: qualified_name.to_string(),
        })
    }

    pub fn read(&self, qualified_name: &str) -> Result<NumericOrBool, ProtocolError> {
        let node_id = self.variable_node_id(qualified_name)?;
        let space = self.address_space.read();
        let node = space
            .find_node(&node_id)
            .ok_or_else(|| ProtocolError::NodeNotFound {
                qualified_name: qualified_name.to_string(),
            })?;
        let value = node
            .as_variable()
            .value(
                opcua::types::TimestampsToReturn::Neither,
                opcua::types::NumericRange::None,
                &opcua::types::QualifiedName::null(),
                0,
            )
            .value
            .unwrap_or(Variant::Empty);
        NumericOrBool::from_variant(value).ok_or_else(|| ProtocolError::Io {
            node: Some(qualified_name.to_string()),
            message: "OPC UA value was not a bool/int/float variant".to_string(),
        })
    }

    pub fn write(&mut self, qualified_name: &str, value: NumericOrBool) -> Result<(), ProtocolError> {
        let node_id = self.variable_node_id(qualified_name)?;
        let mut space = self.address_space.write();
        let node = space
            .find_node_mut(&node_id)
            .ok_or_else(|| ProtocolError::NodeNotFound {
                qualified_name: qualified_name.to_string(),
            })?;
        if let Some(var) = node.as_mut_variable() {
            var.set_value(DataValue::new_now(value.into_variant()));
        }
        Ok(())
    }

    fn variable_node_id(&self, qualified_name: &str) -> Result<UaNodeId, ProtocolError> {
        self.variables
            .get(qualified_name)
            .cloned()
            .ok_or_else(|| ProtocolError::NodeNotFound {
                qualified_name: qualified_name.to_string(),
            })
    }
}

/// The dynamic scalar variant carried by a node's OPC UA view. `NumericValue`
/// alone can't express `Bool`, and spec.md's node value is `Bool | Int |
/// Float`, so the adapter speaks this superset at its boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericOrBool {
    Bool(bool),
    Numeric(NumericValue),
}

impl NumericOrBool {
    pub(crate) fn into_variant(self) -> Variant {
        match self {
            NumericOrBool::Bool(b) => Variant::Boolean(b),
            NumericOrBool::Numeric(NumericValue::Int(i)) => Variant::Int64(i),
            NumericOrBool::Numeric(NumericValue::Float(f)) => Variant::Double(f),
        }
    }

    pub(crate) fn from_variant(v: Variant) -> Option<Self> {
        match v {
            Variant::Boolean(b) => Some(NumericOrBool::Bool(b)),
            Variant::Int64(i) => Some(NumericOrBool::Numeric(NumericValue::Int(i))),
            Variant::Int32(i) => Some(NumericOrBool::Numeric(NumericValue::Int(i as i64))),
            Variant::Int16(i) => Some(NumericOrBool::Numeric(NumericValue::Int(i as i64))),
            Variant::Double(f) => Some(NumericOrBool::Numeric(NumericValue::Float(f))),
            Variant::Float(f) => Some(NumericOrBool::Numeric(NumericValue::Float(f as f64))),
            _ => None,
        }
    }
}
