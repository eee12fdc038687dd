//! Runnable demonstration mirroring `sine_generator.py`: a node driven by a
//! sine wave instead of user input, the other common simulation pattern
//! this PLC is built to host (signal generators, not just valve logic).
//!
//! Run with `cargo run --example sine_wave`.

use std::sync::Arc;

use parking_lot::Mutex;
use sdplc_core::{ModbusBinding, NodeSpec, Plc, Role, Value};
use sdplc_protocol::{ByteOrder, OpcUaAdapter, RegisterCodec, RegisterKind, SlaveTable, WordOrder};

const DT: f64 = 0.1;
const PERIOD_SECONDS: f64 = 2.0;
const RUN_SECONDS: f64 = 6.0;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let codec = RegisterCodec::new(ByteOrder::Big, WordOrder::Big);
    let modbus = Arc::new(SlaveTable::new(codec));
    let address_space = Arc::new(opcua::sync::RwLock::new(opcua::server::address_space::AddressSpace::new()));
    let opcua_adapter = Arc::new(Mutex::new(OpcUaAdapter::new(address_space)));

    let plc = Plc::new(Role::None, Role::None, opcua_adapter, modbus, None, None, codec)
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    plc.add_node(NodeSpec {
        qualified_name: "Signal".to_string(),
        value: Value::Float(0.0),
        opcua: None,
        modbus: Some(ModbusBinding { slave_id: 0, address: 0, kind: RegisterKind::HoldingRegister, register_width: 64 }),
        parents: Vec::new(),
        children: Vec::new(),
    })
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    let registry = plc.registry();
    let action: sdplc_core::Action = Arc::new(move |t| {
        let registry = registry.clone();
        Box::pin(async move {
            let angle = 2.0 * std::f64::consts::PI * t / PERIOD_SECONDS;
            if let Some(signal) = registry.lock().lookup_mut("Signal") {
                signal.value = Value::Float(angle.sin());
            }
            Ok(())
        })
    });
    plc.register_event(
        sdplc_core::EventSpec {
            at: 0.0,
            until: RUN_SECONDS,
            step: Some(DT),
            priority: sdplc_core::plc::SIMULATION_PRIORITY,
            oneshot: false,
            label: "sine-generator".to_string(),
        },
        action,
    );

    plc.set_time_scale(1_000.0);
    plc.run(|| plc.time() >= RUN_SECONDS).await?;

    println!("Signal after {RUN_SECONDS}s ~= {:?}", plc.read_node_value("Signal"));
    Ok(())
}
