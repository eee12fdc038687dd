//! Runnable demonstration of user simulation logic hooking into the tick
//! scheduler directly (spec.md §8 scenario 1): a tank fills while `Inlet
//! Valve` is open and drains while `Outlet Valve` is open, simulated by a
//! priority-10 event that integrates `Tank Level` each tick. Mirrors the
//! `sine_generator.py`/`example_plc.py` demo scripts this simulator is
//! descended from, minus any actual Modbus/OPC UA server — this demo only
//! exercises the node registry and scheduler (C4/C5).
//!
//! Run with `cargo run --example tank_level`.

use std::sync::Arc;

use parking_lot::Mutex;
use sdplc_core::{ModbusBinding, NodeSpec, Plc, Role, Value};
use sdplc_protocol::{ByteOrder, OpcUaAdapter, RegisterCodec, RegisterKind, SlaveTable, WordOrder};

/// Matches `Scheduler::DEFAULT_STEP_GRAIN`.
const DT: f64 = 0.1;
const SIMULATED_SECONDS: f64 = 10.0;

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
        qualified_name: "Tank Level".to_string(),
        value: Value::Float(0.0),
        opcua: None,
        modbus: Some(ModbusBinding { slave_id: 0, address: 0, kind: RegisterKind::HoldingRegister, register_width: 64 }),
        parents: Vec::new(),
        children: Vec::new(),
    })
    .map_err(|e| anyhow::anyhow!("{e}"))?;
    plc.add_node(NodeSpec {
        qualified_name: "Inlet Valve".to_string(),
        value: Value::Bool(true),
        opcua: None,
        modbus: Some(ModbusBinding { slave_id: 0, address: 0, kind: RegisterKind::Coil, register_width: 16 }),
        parents: Vec::new(),
        children: Vec::new(),
    })
    .map_err(|e| anyhow::anyhow!("{e}"))?;
    plc.add_node(NodeSpec {
        qualified_name: "Outlet Valve".to_string(),
        value: Value::Bool(false),
        opcua: None,
        modbus: Some(ModbusBinding { slave_id: 0, address: 1, kind: RegisterKind::Coil, register_width: 16 }),
        parents: Vec::new(),
        children: Vec::new(),
    })
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    register_tank_integrator(&plc);

    // The node reconcilers `add_node` installs run forever (`until =
    // INFINITY`), so this demo supplies its own shutdown once the
    // simulated window has elapsed, rather than waiting for the heap to
    // drain on its own.
    plc.set_time_scale(1_000.0);
    plc.run(|| plc.time() >= SIMULATED_SECONDS).await?;

    let level = plc.read_node_value("Tank Level").unwrap_or(Value::Float(f64::NAN));
    println!("Tank Level after {SIMULATED_SECONDS}s ~= {level:?}");
    Ok(())
}

/// Register the priority-10 (`SIMULATION_PRIORITY`) event that integrates
/// `Tank Level` by `+10*dt` while `Inlet Valve` is true and `-5*dt` while
/// `Outlet Valve` is true, matching spec.md §8 scenario 1 exactly.
fn register_tank_integrator(plc: &Plc) {
    let registry = plc.registry();
    let action: sdplc_core::Action = Arc::new(move |_t| {
        let registry = registry.clone();
        Box::pin(async move {
            let mut guard = registry.lock();
            let inlet = guard.lookup("Inlet Valve").and_then(|n| n.value.as_bool()).unwrap_or(false);
            let outlet = guard.lookup("Outlet Valve").and_then(|n| n.value.as_bool()).unwrap_or(false);
            let mut delta = 0.0;
            if inlet {
                delta += 10.0 * DT;
            }
            if outlet {
                delta -= 5.0 * DT;
            }
            if let Some(tank) = guard.lookup_mut("Tank Level") {
                if let Value::Float(level) = tank.value {
                    tank.value = Value::Float(level + delta);
                }
            }
            Ok(())
        })
    });
    plc.register_event(
        sdplc_core::EventSpec {
            at: 0.0,
            until: SIMULATED_SECONDS,
            step: Some(DT),
            priority: sdplc_core::plc::SIMULATION_PRIORITY,
            oneshot: false,
            label: "tank-level-integrator".to_string(),
        },
        action,
    );
}
