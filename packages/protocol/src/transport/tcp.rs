//! Modbus/TCP server — the MBAP-framed transport named first in spec.md
//! §6. One task per accepted connection, all dispatching through the
//! shared `SlaveTable` under its single mutex (spec.md §5).

use std::sync::Arc;

use anyhow::{Context, Result};
use rmodbus::ModbusProto;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use crate::memory_map::SlaveTable;
use crate::transport::framing::read_mbap_frame;
use crate::transport::responder::respond;

async fn handle_connection(mut stream: TcpStream, slaves: Arc<SlaveTable>) -> Result<()> {
    loop {
        let Some(request) = read_mbap_frame(&mut stream).await? else {
            return Ok(());
        };
        let unit_id = request[6];
        let response =
            slaves.with_slave_mut(unit_id, |slave| respond(slave, &request, ModbusProto::TcpUdp));
        match response {
            Ok(Some(bytes)) => stream.write_all(&bytes).await?,
            Ok(None) => {}
            Err(e) => log::error!("Modbus/TCP request from unit {unit_id} failed: {e}"),
        }
    }
}

/// Serve Modbus/TCP on `address` until the process is asked to stop. Each
/// connection is handled on its own task; `slaves` is shared (and mutexed)
/// across every connection and transport.
pub async fn serve(address: &str, slaves: Arc<SlaveTable>) -> Result<()> {
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("binding Modbus/TCP listener on {address}"))?;
    log::info!("Modbus/TCP server listening on {address}");

    loop {
        let (stream, peer) = listener.accept().await?;
        let slaves = slaves.clone();
        log::debug!("Modbus/TCP connection accepted from {peer}");
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, slaves).await {
                log::warn!("Modbus/TCP connection from {peer} ended with error: {e}");
            }
        });
    }
}
