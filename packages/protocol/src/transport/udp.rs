//! Modbus/UDP server. Each datagram carries a full MBAP+PDU frame, so
//! unlike the TCP transport there is no streaming reassembly to do.

use std::sync::Arc;

use anyhow::{Context, Result};
use rmodbus::ModbusProto;
use tokio::net::UdpSocket;

use crate::memory_map::SlaveTable;
use crate::transport::responder::respond;

const MAX_DATAGRAM: usize = 512;

pub async fn serve(address: &str, slaves: Arc<SlaveTable>) -> Result<()> {
    let socket = UdpSocket::bind(address)
        .await
        .with_context(|| format!("binding Modbus/UDP listener on {address}"))?;
    log::info!("Modbus/UDP server listening on {address}");

    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, peer) = socket.recv_from(&mut buf).await?;
        if len < 7 {
            log::warn!("Modbus/UDP datagram from {peer} shorter than an MBAP header, dropping");
            continue;
        }
        let request = buf[..len].to_vec();
        let unit_id = request[6];

        let response =
            slaves.with_slave_mut(unit_id, |slave| respond(slave, &request, ModbusProto::TcpUdp));
        match response {
            Ok(Some(bytes)) => {
                socket.send_to(&bytes, peer).await?;
            }
            Ok(None) => {}
            Err(e) => log::error!("Modbus/UDP request from {peer} (unit {unit_id}) failed: {e}"),
        }
    }
}
