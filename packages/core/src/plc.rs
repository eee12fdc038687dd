//! The owning `Plc` struct tying C4-C6 together.
//!
//! The original expresses `simPLC`/`modbusServer`/`opcuaServer` as
//! process-wide singletons; here they are fields of one struct
//! instantiated once in `main` and passed by reference, so tests can
//! construct isolated instances (spec.md §9 design note).

use std::sync::Arc;

use parking_lot::Mutex;
use sdplc_protocol::{ModbusClient as UpstreamModbusClient, OpcUaAdapter, OpcUaClient as UpstreamOpcUaClient, RegisterCodec, SlaveTable};

use crate::error::PlcError;
use crate::node::{Node, NodeRegistry, NodeSpec, Value};
use crate::scheduler::{Action, EventSpec, Scheduler};
use crate::sync::{Role, SyncEngine};

/// Reconciler priority: after top-priority startup events, before user
/// simulation logic (spec.md §4.6).
pub const RECONCILER_PRIORITY: i32 = 1;

/// Default priority for user-registered simulation logic (valve actuation,
/// tank-level integration, sine-wave generation, …) — strictly after the
/// per-node reconcilers so a tick's external-source adoption is visible to
/// simulation code before it runs (spec.md §4.6, §4.5 priority ordering).
pub const SIMULATION_PRIORITY: i32 = 10;

pub struct Plc {
    registry: Arc<Mutex<NodeRegistry>>,
    sync: Arc<SyncEngine>,
    scheduler: Scheduler,
    opcua: Arc<Mutex<OpcUaAdapter>>,
    modbus: Arc<SlaveTable>,
}

impl Plc {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        server_role: Role,
        client_role: Role,
        opcua: Arc<Mutex<OpcUaAdapter>>,
        modbus: Arc<SlaveTable>,
        upstream_modbus: Option<UpstreamModbusClient>,
        upstream_opcua: Option<UpstreamOpcUaClient>,
        upstream_modbus_codec: RegisterCodec,
    ) -> Result<Self, PlcError> {
        let sync = SyncEngine::new(
            server_role,
            client_role,
            opcua.clone(),
            modbus.clone(),
            upstream_modbus,
            upstream_opcua,
            upstream_modbus_codec,
        )?;
        Ok(Self {
            registry: Arc::new(Mutex::new(NodeRegistry::new())),
            sync: Arc::new(sync),
            scheduler: Scheduler::new(),
            opcua,
            modbus,
        })
    }

    pub fn node_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Hand out the shared Modbus storage for boot-time transport wiring;
    /// the sync engine already holds the same `Arc` for reconciliation.
    pub fn modbus_table(&self) -> Arc<sdplc_protocol::SlaveTable> {
        self.modbus.clone()
    }

    pub fn time(&self) -> f64 {
        self.scheduler.time()
    }

    pub fn time_scale(&self) -> f64 {
        self.scheduler.time_scale()
    }

    pub fn set_time_scale(&self, scale: f64) {
        self.scheduler.set_time_scale(scale);
    }

    pub fn read_node_value(&self, qualified_name: &str) -> Option<Value> {
        self.registry.lock().lookup(qualified_name).map(|n| n.value)
    }

    pub fn node_names(&self) -> Vec<String> {
        self.registry.lock().iter().map(|n| n.qualified_name.clone()).collect()
    }

    /// Hand out the shared node registry so user simulation logic can read
    /// and mutate node values directly from a scheduled event, without
    /// going through `write_node`'s per-write reconciliation.
    pub fn registry(&self) -> Arc<Mutex<NodeRegistry>> {
        self.registry.clone()
    }

    /// Register a scheduled event against this `Plc`'s own clock, for user
    /// simulation logic (spec.md §8 scenario 1's tank-level integrator).
    /// Defaults its priority decision to the caller via `spec`; see
    /// `SIMULATION_PRIORITY` for the conventional choice.
    pub fn register_event(&self, spec: EventSpec, action: Action) -> u64 {
        self.scheduler.register(spec, action)
    }

    pub fn cancel_event(&self, id: u64) {
        self.scheduler.cancel(id);
    }

    /// Validate, allocate storage through C2/C3, and register the node's
    /// per-tick reconciler with the scheduler (spec.md §4.4 step 4).
    pub fn add_node(&self, spec: NodeSpec) -> Result<(), PlcError> {
        let qualified_name = spec.qualified_name.clone();
        self.registry.lock().add_node(spec, &self.opcua, &self.modbus)?;

        let registry = self.registry.clone();
        let sync = self.sync.clone();
        let action: crate::scheduler::Action = Arc::new(move |_t| {
            let registry = registry.clone();
            let sync = sync.clone();
            let qualified_name = qualified_name.clone();
            Box::pin(async move {
                let mut guard = registry.lock();
                let Some(node) = guard.lookup_mut(&qualified_name) else {
                    return Ok(());
                };
                if node.stalled {
                    return Ok(());
                }
                reconcile_and_handle_failure(node, &sync).await;
                Ok(())
            })
        });
        self.scheduler.register(
            EventSpec {
                at: 0.0,
                until: f64::INFINITY,
                step: Some(1.0),
                priority: RECONCILER_PRIORITY,
                oneshot: false,
                label: format!("reconcile:{}", qualified_name),
            },
            action,
        );
        Ok(())
    }

    /// Write `value` to a node directly (the HTTP control surface's
    /// `POST /variables/write`), coercing into the node's declared
    /// variant, then immediately fanning it out to every configured view.
    pub async fn write_node(&self, qualified_name: &str, value: Value) -> Result<(), PlcError> {
        let mut guard = self.registry.lock();
        let node = guard
            .lookup_mut(qualified_name)
            .ok_or_else(|| PlcError::MisconfiguredNode {
                qualified_name: qualified_name.to_string(),
                reason: "no such node".to_string(),
            })?;
        node.value = value.coerce_to(node.value);
        self.sync.reconcile_node(node).await?;
        Ok(())
    }

    /// Step 5: bypass the authoritative-source read and query the
    /// upstream client directly for this node.
    pub async fn read_node_upstream(&self, qualified_name: &str) -> Result<Value, PlcError> {
        let mut guard = self.registry.lock();
        let node = guard
            .lookup_mut(qualified_name)
            .ok_or_else(|| PlcError::MisconfiguredNode {
                qualified_name: qualified_name.to_string(),
                reason: "no such node".to_string(),
            })?;
        self.sync.read_upstream(node).await?;
        Ok(node.value)
    }

    /// Drive the tick loop until `shutdown` reports true or no events
    /// remain (should never happen in practice — the reconcilers are
    /// registered with `until = INFINITY`).
    pub async fn run(&self, shutdown: impl FnMut() -> bool) -> anyhow::Result<()> {
        self.scheduler.run(shutdown).await
    }
}

async fn reconcile_and_handle_failure(node: &mut Node, sync: &SyncEngine) {
    match sync.reconcile_node(node).await {
        Ok(()) => {}
        Err(PlcError::MisconfiguredNode { qualified_name, reason }) => {
            log::error!("node {qualified_name} misconfigured, stalling its reconciler: {reason}");
            node.stalled = true;
        }
        Err(e) => {
            log::error!("reconciler for node {} failed this tick: {e}", node.qualified_name);
        }
    }
}
