//! Modbus RTU over a serial line. Framing differs from the MBAP transports:
//! there is no length prefix, so we lean on `rmodbus::guess_response_frame_len`
//! the way the teacher's own RTU framing does, reading byte-by-byte until a
//! complete frame is buffered or the inter-frame silence elapses.

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rmodbus::{guess_response_frame_len, ModbusProto};
use tokio::time::timeout;

use crate::memory_map::SlaveTable;
use crate::transport::responder::respond;

/// How long to wait for the next byte before treating a partial frame as
/// abandoned (RTU has no explicit terminator, only inter-frame silence).
const INTER_BYTE_TIMEOUT: Duration = Duration::from_millis(100);

fn open_port(device: &str, baud_rate: u32) -> Result<Box<dyn serialport::SerialPort>> {
    serialport::new(device, baud_rate)
        .timeout(INTER_BYTE_TIMEOUT)
        .open()
        .with_context(|| format!("opening serial device {device} at {baud_rate} baud"))
}

/// Read one RTU request from `port`: the minimal 1-byte-unit-id + 1-byte-FC
/// header, then as many further bytes as `guess_response_frame_len` reports
/// once the function code and any length field are known.
fn read_rtu_frame(port: &mut dyn serialport::SerialPort) -> Result<Option<Vec<u8>>> {
    let mut frame = vec![0u8; 8];
    if let Err(e) = port.read_exact(&mut frame[..2]) {
        if e.kind() == std::io::ErrorKind::TimedOut {
            return Ok(None);
        }
        return Err(e.into());
    }
    port.read_exact(&mut frame[2..8])?;

    let expected = guess_response_frame_len(&frame, ModbusProto::Rtu)
        .context("could not determine RTU frame length")? as usize;
    if expected > frame.len() {
        frame.resize(expected, 0);
        port.read_exact(&mut frame[8..expected])?;
    } else {
        frame.truncate(expected);
    }
    Ok(Some(frame))
}

/// Serve Modbus RTU on `device` until the process is asked to stop. Runs on
/// a blocking task since `serialport` is a synchronous API.
pub async fn serve(device: String, baud_rate: u32, slaves: Arc<SlaveTable>) -> Result<()> {
    tokio::task::spawn_blocking(move || serve_blocking(&device, baud_rate, slaves))
        .await
        .context("Modbus RTU serial task panicked")?
}

fn serve_blocking(device: &str, baud_rate: u32, slaves: Arc<SlaveTable>) -> Result<()> {
    let mut port = open_port(device, baud_rate)?;
    log::info!("Modbus RTU server listening on {device} at {baud_rate} baud");

    loop {
        let request = match read_rtu_frame(port.as_mut()) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(e) => {
                log::warn!("Modbus RTU frame read on {device} failed: {e}");
                continue;
            }
        };
        let unit_id = request[0];
        let response = slaves.with_slave_mut(unit_id, |slave| respond(slave, &request, ModbusProto::Rtu));
        match response {
            Ok(Some(bytes)) => {
                if let Err(e) = port.write_all(&bytes) {
                    log::warn!("Modbus RTU write on {device} failed: {e}");
                }
            }
            Ok(None) => {}
            Err(e) => log::error!("Modbus RTU request on {device} (unit {unit_id}) failed: {e}"),
        }
    }
}
