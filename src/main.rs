use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use sdplc::args::Args;
use sdplc::config::{Config, ModbusTransportConfig, ProtoKind};
use sdplc::{boot, http};
use sdplc_core::Plc;
use sdplc_protocol::{OpcUaAdapter, RegisterCodec, SlaveTable};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    boot::init_logging(args.log_file.as_deref());

    let config = Config::load(&args.config)?;
    log::info!("loaded configuration from {}", args.config);

    let (plc, opcua_server) = build_plc(&config).await?;
    for spec in config.node_specs() {
        plc.add_node(spec)?;
    }
    log::info!("{} nodes registered", plc.node_count());

    let plc = Arc::new(plc);

    spawn_modbus_server(&config, &plc);
    spawn_opcua_server(opcua_server);

    if let Some(bind) = &args.http {
        spawn_http(bind.clone(), plc.clone());
    }

    let shutdown_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    {
        let shutdown_flag = shutdown_flag.clone();
        ctrlc::set_handler(move || {
            log::info!("shutdown requested");
            shutdown_flag.store(true, std::sync::atomic::Ordering::SeqCst);
        })
        .context("installing Ctrl+C handler")?;
    }

    plc.run(move || shutdown_flag.load(std::sync::atomic::Ordering::SeqCst)).await?;
    Ok(())
}

/// Build the shared C2/C3 storage, any configured upstream clients, and the
/// `Plc` that ties them together (spec.md §4.4). When `opcua_server_config`
/// is present, also builds the embedded `opcua::server::Server` up front so
/// its address space — not a freshly allocated one — backs `OpcUaAdapter`;
/// the returned server is handed to `spawn_opcua_server` once node
/// registration has populated it.
async fn build_plc(config: &Config) -> Result<(Plc, Option<opcua::server::Server>)> {
    let modbus_codec = config
        .modbus_server_config
        .as_ref()
        .or(config.modbus_client_config.as_ref())
        .map(|c| RegisterCodec::new(c.byte_order(), c.word_order()))
        .unwrap_or_else(|| RegisterCodec::new(sdplc_protocol::ByteOrder::Big, sdplc_protocol::WordOrder::Big));
    let modbus = Arc::new(SlaveTable::new(modbus_codec));

    let (address_space, opcua_server) = match &config.opcua_server_config {
        Some(endpoint) => {
            let server = build_opcua_server(endpoint)?;
            let space = server.address_space();
            (space, Some(server))
        }
        None => (
            Arc::new(opcua::sync::RwLock::new(opcua::server::address_space::AddressSpace::new())),
            None,
        ),
    };
    let opcua_adapter = Arc::new(Mutex::new(OpcUaAdapter::new(address_space)));

    let upstream_modbus = match (&config.client, &config.modbus_client_config) {
        (Some(ProtoKind::ModBus), Some(ModbusTransportConfig::Tcp { address, port, .. })) => {
            let target = format!("{address}:{port}");
            let client = sdplc_utils::retry_backoff(5, std::time::Duration::from_millis(200), || {
                let target = target.clone();
                async move { sdplc_protocol::UpstreamModbusClient::connect(&target, 1).await }
            })
            .await
            .with_context(|| format!("connecting upstream Modbus client to {target}"))?;
            Some(client)
        }
        _ => None,
    };
    let upstream_opcua = match (&config.client, &config.opcua_client_config) {
        (Some(ProtoKind::OpcUa), Some(endpoint)) => {
            let url = endpoint.url.clone();
            let client = sdplc_utils::retry_backoff(5, std::time::Duration::from_millis(200), || {
                let url = url.clone();
                async move { sdplc_protocol::UpstreamOpcUaClient::connect(&url).await }
            })
            .await
            .with_context(|| format!("connecting upstream OPC UA client to {url}"))?;
            Some(client)
        }
        _ => None,
    };
    let upstream_modbus_codec = config
        .modbus_client_config
        .as_ref()
        .map(|c| RegisterCodec::new(c.byte_order(), c.word_order()))
        .unwrap_or_else(|| RegisterCodec::new(sdplc_protocol::ByteOrder::Big, sdplc_protocol::WordOrder::Big));

    let plc = Plc::new(
        config.server_role(),
        config.client_role(),
        opcua_adapter,
        modbus,
        upstream_modbus,
        upstream_opcua,
        upstream_modbus_codec,
    )
    .map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok((plc, opcua_server))
}

/// Best-effort idiomatic `opcua::server` usage, mirroring the upstream
/// `opcua::client` surface used in `sdplc_protocol::client::opcua` — not
/// checked against a concrete example in this pack.
fn build_opcua_server(endpoint: &sdplc::config::OpcUaEndpointConfig) -> Result<opcua::server::Server> {
    opcua::server::ServerBuilder::new()
        .application_name("sdplc")
        .application_uri("urn:sdplc:server")
        .discovery_urls(vec![endpoint.url.clone()])
        .endpoint(
            "sdplc",
            opcua::server::config::ServerEndpoint::new_none(&endpoint.url, &["ANONYMOUS".into()]),
        )
        .create_sample_keypair(false)
        .server()
        .context("building the embedded OPC UA server")
}

/// Spawn whichever Modbus server transport is configured (spec.md §6). Gated
/// on the transport config's presence, not on `server_role`: the simulator
/// exposes Modbus and OPC UA simultaneously, `server_role` only decides
/// which one is the authoritative write source (spec.md §4.6).
fn spawn_modbus_server(config: &Config, plc: &Arc<Plc>) {
    let Some(transport) = config.modbus_server_config.clone() else {
        return;
    };
    let modbus = plc.modbus_table();

    tokio::spawn(async move {
        let result = match transport {
            ModbusTransportConfig::Tcp { address, port, .. } => {
                sdplc_protocol::transport::tcp::serve(&format!("{address}:{port}"), modbus).await
            }
            ModbusTransportConfig::Udp { address, port, .. } => {
                sdplc_protocol::transport::udp::serve(&format!("{address}:{port}"), modbus).await
            }
            ModbusTransportConfig::Tls { address, port, certificate, key, ca, .. } => {
                let identity = sdplc_protocol::transport::tls::TlsIdentity {
                    cert_path: certificate,
                    key_path: key,
                    client_ca_path: ca,
                };
                sdplc_protocol::transport::tls::serve(&format!("{address}:{port}"), modbus, &identity).await
            }
            ModbusTransportConfig::Serial { port, baudrate, .. } => {
                sdplc_protocol::transport::serial::serve(port, baudrate, modbus).await
            }
        };
        if let Err(e) = result {
            log::error!("Modbus server transport exited: {e}");
        }
    });
}

/// Run the embedded OPC UA server (if one was built) to completion on a
/// blocking task, since `opcua::server::Server::run` is a synchronous call.
fn spawn_opcua_server(server: Option<opcua::server::Server>) {
    let Some(mut server) = server else {
        return;
    };
    tokio::task::spawn_blocking(move || server.run());
}

fn spawn_http(bind: String, plc: Arc<Plc>) {
    tokio::spawn(async move {
        let app = http::router(plc);
        let listener = match tokio::net::TcpListener::bind(&bind).await {
            Ok(listener) => listener,
            Err(e) => {
                log::error!("failed to bind HTTP control surface on {bind}: {e}");
                return;
            }
        };
        log::info!("HTTP control surface listening on {bind}");
        if let Err(e) = axum::serve(listener, app).await {
            log::error!("HTTP control surface exited: {e}");
        }
    });
}
