//! YAML configuration schema (spec.md §6). Mirrors the teacher's
//! `serde`-derived persistence structs (`tui/persistence/mod.rs`), but
//! loaded once at startup via `serde_yaml` rather than round-tripped to
//! disk at runtime.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use sdplc_core::{ModbusBinding, NodeSpec, Role, Value};
use sdplc_protocol::{ByteOrder, RegisterKind, WordOrder};

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProtoKind {
    OpcUa,
    ModBus,
}

impl From<ProtoKind> for Role {
    fn from(kind: ProtoKind) -> Self {
        match kind {
            ProtoKind::OpcUa => Role::OpcUa,
            ProtoKind::ModBus => Role::Modbus,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    Big,
    Little,
}

impl From<Endian> for ByteOrder {
    fn from(e: Endian) -> Self {
        match e {
            Endian::Big => ByteOrder::Big,
            Endian::Little => ByteOrder::Little,
        }
    }
}

impl From<Endian> for WordOrder {
    fn from(e: Endian) -> Self {
        match e {
            Endian::Big => WordOrder::Big,
            Endian::Little => WordOrder::Little,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    N,
    E,
    O,
    S,
    M,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ModbusTransportConfig {
    Tcp {
        address: String,
        port: u16,
        byte_order: Endian,
        word_order: Endian,
    },
    Udp {
        address: String,
        port: u16,
        byte_order: Endian,
        word_order: Endian,
    },
    Tls {
        address: String,
        port: u16,
        certificate: String,
        key: String,
        ca: Option<String>,
        byte_order: Endian,
        word_order: Endian,
    },
    Serial {
        port: String,
        baudrate: u32,
        bytesize: u8,
        parity: Parity,
        stopbits: u8,
        byte_order: Endian,
        word_order: Endian,
    },
}

impl ModbusTransportConfig {
    pub fn byte_order(&self) -> ByteOrder {
        match self {
            ModbusTransportConfig::Tcp { byte_order, .. }
            | ModbusTransportConfig::Udp { byte_order, .. }
            | ModbusTransportConfig::Tls { byte_order, .. }
            | ModbusTransportConfig::Serial { byte_order, .. } => (*byte_order).into(),
        }
    }

    pub fn word_order(&self) -> WordOrder {
        match self {
            ModbusTransportConfig::Tcp { word_order, .. }
            | ModbusTransportConfig::Udp { word_order, .. }
            | ModbusTransportConfig::Tls { word_order, .. }
            | ModbusTransportConfig::Serial { word_order, .. } => (*word_order).into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpcUaEndpointConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub private_key: Option<String>,
    pub certificate: Option<String>,
    #[serde(default)]
    pub security_policy: Vec<i32>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModbusRegisterTypeConfig {
    C,
    D,
    H,
    I,
}

impl From<ModbusRegisterTypeConfig> for RegisterKind {
    fn from(kind: ModbusRegisterTypeConfig) -> Self {
        match kind {
            ModbusRegisterTypeConfig::C => RegisterKind::Coil,
            ModbusRegisterTypeConfig::D => RegisterKind::DiscreteInput,
            ModbusRegisterTypeConfig::H => RegisterKind::HoldingRegister,
            ModbusRegisterTypeConfig::I => RegisterKind::InputRegister,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeModbusConfig {
    pub slave: u8,
    pub address: u16,
    #[serde(rename = "type")]
    pub kind: ModbusRegisterTypeConfig,
    #[serde(default = "default_register_size")]
    pub register_size: u8,
}

fn default_register_size() -> u8 {
    16
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeOpcUaConfig {
    pub namespace: String,
    pub node_qualified_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl From<ConfigValue> for Value {
    fn from(v: ConfigValue) -> Self {
        match v {
            ConfigValue::Bool(b) => Value::Bool(b),
            ConfigValue::Int(i) => Value::Int(i),
            ConfigValue::Float(f) => Value::Float(f),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub qualified_name: String,
    pub value: ConfigValue,
    pub modbus: Option<NodeModbusConfig>,
    pub opcua: Option<NodeOpcUaConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: Option<ProtoKind>,
    pub client: Option<ProtoKind>,
    pub modbus_server_config: Option<ModbusTransportConfig>,
    pub modbus_client_config: Option<ModbusTransportConfig>,
    pub opcua_server_config: Option<OpcUaEndpointConfig>,
    pub opcua_client_config: Option<OpcUaEndpointConfig>,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config =
            serde_yaml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn server_role(&self) -> Role {
        self.server.map(Role::from).unwrap_or(Role::None)
    }

    pub fn client_role(&self) -> Role {
        self.client.map(Role::from).unwrap_or(Role::None)
    }

    /// Validation errors abort startup with a descriptive message
    /// (spec.md §6).
    fn validate(&self) -> Result<()> {
        sdplc_core::sync::validate_roles(self.server_role(), self.client_role())
            .map_err(|e| anyhow::anyhow!("{e}"))?;

        if self.server_role() == Role::Modbus && self.modbus_server_config.is_none() {
            anyhow::bail!("server=ModBus requires modbus_server_config");
        }
        if self.server_role() == Role::OpcUa && self.opcua_server_config.is_none() {
            anyhow::bail!("server=OPCUA requires opcua_server_config");
        }
        if self.client_role() == Role::Modbus && self.modbus_client_config.is_none() {
            anyhow::bail!("client=ModBus requires modbus_client_config");
        }
        if self.client_role() == Role::OpcUa && self.opcua_client_config.is_none() {
            anyhow::bail!("client=OPCUA requires opcua_client_config");
        }

        for node in &self.nodes {
            if node.modbus.is_none() && node.opcua.is_none() {
                anyhow::bail!("node {} has neither a modbus nor an opcua binding", node.qualified_name);
            }
        }
        Ok(())
    }

    /// Translate every `NodeConfig` into the `NodeSpec` `Plc::add_node`
    /// expects.
    pub fn node_specs(&self) -> Vec<NodeSpec> {
        self.nodes
            .iter()
            .map(|node| NodeSpec {
                qualified_name: node.qualified_name.clone(),
                value: node.value.clone().into(),
                opcua: node
                    .opcua
                    .as_ref()
                    .map(|o| (o.namespace.clone(), o.node_qualified_name.clone())),
                modbus: node.modbus.as_ref().map(|m| ModbusBinding {
                    slave_id: m.slave,
                    address: m.address,
                    kind: m.kind.into(),
                    register_width: m.register_size,
                }),
                parents: Vec::new(),
                children: Vec::new(),
            })
            .collect()
    }
}
