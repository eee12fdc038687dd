//! Integration test for spec.md §8 scenario 1: with `Inlet Valve=true` and
//! `Outlet Valve=false`, `Tank Level` rises by 10*dt per tick and after 10
//! simulated seconds should read ~100.0 (within the scheduler's grain).

use std::sync::Arc;

use parking_lot::Mutex;
use sdplc_core::{ModbusBinding, NodeSpec, Plc, Role, Value};
use sdplc_protocol::{ByteOrder, OpcUaAdapter, RegisterCodec, RegisterKind, SlaveTable, WordOrder};

const DT: f64 = 0.1;
const SIMULATED_SECONDS: f64 = 10.0;

fn fresh_plc() -> Plc {
    let codec = RegisterCodec::new(ByteOrder::Big, WordOrder::Big);
    let modbus = Arc::new(SlaveTable::new(codec));
    let address_space = Arc::new(opcua::sync::RwLock::new(opcua::server::address_space::AddressSpace::new()));
    let opcua_adapter = Arc::new(Mutex::new(OpcUaAdapter::new(address_space)));
    Plc::new(Role::None, Role::None, opcua_adapter, modbus, None, None, codec).expect("role validation passes")
}

fn register_integrator(plc: &Plc) {
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

#[tokio::test]
async fn tank_level_rises_to_about_100_after_10_seconds_of_inflow() {
    let plc = fresh_plc();

    plc.add_node(NodeSpec {
        qualified_name: "Tank Level".to_string(),
        value: Value::Float(0.0),
        opcua: None,
        modbus: Some(ModbusBinding { slave_id: 0, address: 0, kind: RegisterKind::HoldingRegister, register_width: 64 }),
        parents: Vec::new(),
        children: Vec::new(),
    })
    .unwrap();
    plc.add_node(NodeSpec {
        qualified_name: "Inlet Valve".to_string(),
        value: Value::Bool(true),
        opcua: None,
        modbus: Some(ModbusBinding { slave_id: 0, address: 0, kind: RegisterKind::Coil, register_width: 16 }),
        parents: Vec::new(),
        children: Vec::new(),
    })
    .unwrap();
    plc.add_node(NodeSpec {
        qualified_name: "Outlet Valve".to_string(),
        value: Value::Bool(false),
        opcua: None,
        modbus: Some(ModbusBinding { slave_id: 0, address: 1, kind: RegisterKind::Coil, register_width: 16 }),
        parents: Vec::new(),
        children: Vec::new(),
    })
    .unwrap();

    register_integrator(&plc);

    plc.set_time_scale(10_000.0);
    plc.run(|| plc.time() >= SIMULATED_SECONDS).await.unwrap();

    let level = match plc.read_node_value("Tank Level").unwrap() {
        Value::Float(f) => f,
        other => panic!("expected a float, got {other:?}"),
    };
    assert!((level - 100.0).abs() < 1.0, "expected Tank Level ~= 100.0, got {level}");
}

#[tokio::test]
async fn tank_level_drains_when_only_outlet_is_open() {
    let plc = fresh_plc();

    plc.add_node(NodeSpec {
        qualified_name: "Tank Level".to_string(),
        value: Value::Float(50.0),
        opcua: None,
        modbus: Some(ModbusBinding { slave_id: 0, address: 0, kind: RegisterKind::HoldingRegister, register_width: 64 }),
        parents: Vec::new(),
        children: Vec::new(),
    })
    .unwrap();
    plc.add_node(NodeSpec {
        qualified_name: "Inlet Valve".to_string(),
        value: Value::Bool(false),
        opcua: None,
        modbus: Some(ModbusBinding { slave_id: 0, address: 0, kind: RegisterKind::Coil, register_width: 16 }),
        parents: Vec::new(),
        children: Vec::new(),
    })
    .unwrap();
    plc.add_node(NodeSpec {
        qualified_name: "Outlet Valve".to_string(),
        value: Value::Bool(true),
        opcua: None,
        modbus: Some(ModbusBinding { slave_id: 0, address: 1, kind: RegisterKind::Coil, register_width: 16 }),
        parents: Vec::new(),
        children: Vec::new(),
    })
    .unwrap();

    register_integrator(&plc);

    plc.set_time_scale(10_000.0);
    plc.run(|| plc.time() >= SIMULATED_SECONDS).await.unwrap();

    let level = match plc.read_node_value("Tank Level").unwrap() {
        Value::Float(f) => f,
        other => panic!("expected a float, got {other:?}"),
    };
    // 50.0 - 5.0/s * 10s = 0.0
    assert!(level.abs() < 1.0, "expected Tank Level ~= 0.0, got {level}");
}
