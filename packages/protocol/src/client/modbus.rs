//! Upstream Modbus/TCP client: the request/response half of the same
//! `rmodbus::client::ModbusRequest` codec the teacher used for its RTU
//! master-mode polling (`protocol/modbus/pull_get_*.rs`), retargeted at a
//! TCP peer for `client_role` node bindings.

use anyhow::{ensure, Context, Result};
use rmodbus::client::ModbusRequest;
use rmodbus::ModbusProto;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::transport::framing::read_mbap_frame;

/// A connection to one upstream Modbus/TCP server, scoped to a single unit
/// id (spec.md's `client_role` binds one node to one remote register, on
/// one unit, at a time).
pub struct ModbusClient {
    stream: TcpStream,
    unit_id: u8,
}

impl ModbusClient {
    pub async fn connect(address: &str, unit_id: u8) -> Result<Self> {
        let stream = TcpStream::connect(address)
            .await
            .with_context(|| format!("connecting Modbus/TCP client to {address}"))?;
        Ok(Self { stream, unit_id })
    }

    async fn roundtrip(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        self.stream.write_all(request).await?;
        read_mbap_frame(&mut self.stream)
            .await?
            .context("Modbus/TCP peer closed the connection before responding")
    }

    fn data_section(response: &[u8]) -> &[u8] {
        // MBAP header (7 bytes, already includes the unit id) + function
        // code + byte count, no trailing CRC (unlike RTU).
        &response[9..]
    }

    pub async fn read_coils(&mut self, start_address: u16, count: u16) -> Result<Vec<bool>> {
        let mut request = ModbusRequest::new(self.unit_id, ModbusProto::TcpUdp);
        let mut raw = Vec::with_capacity(12);
        request.generate_get_coils(start_address, count, &mut raw)?;
        let response = self.roundtrip(&raw).await?;
        request.parse_ok(&response)?;
        unpack_bits(Self::data_section(&response), count)
    }

    pub async fn read_discrete_inputs(&mut self, start_address: u16, count: u16) -> Result<Vec<bool>> {
        let mut request = ModbusRequest::new(self.unit_id, ModbusProto::TcpUdp);
        let mut raw = Vec::with_capacity(12);
        request.generate_get_discretes(start_address, count, &mut raw)?;
        let response = self.roundtrip(&raw).await?;
        request.parse_ok(&response)?;
        unpack_bits(Self::data_section(&response), count)
    }

    pub async fn read_holding_registers(&mut self, start_address: u16, count: u16) -> Result<Vec<u16>> {
        let mut request = ModbusRequest::new(self.unit_id, ModbusProto::TcpUdp);
        let mut raw = Vec::with_capacity(12);
        request.generate_get_holdings(start_address, count, &mut raw)?;
        let response = self.roundtrip(&raw).await?;
        request.parse_ok(&response)?;
        Ok(unpack_words(Self::data_section(&response)))
    }

    pub async fn read_input_registers(&mut self, start_address: u16, count: u16) -> Result<Vec<u16>> {
        let mut request = ModbusRequest::new(self.unit_id, ModbusProto::TcpUdp);
        let mut raw = Vec::with_capacity(12);
        request.generate_get_inputs(start_address, count, &mut raw)?;
        let response = self.roundtrip(&raw).await?;
        request.parse_ok(&response)?;
        Ok(unpack_words(Self::data_section(&response)))
    }

    pub async fn write_single_coil(&mut self, address: u16, value: bool) -> Result<()> {
        let mut request = ModbusRequest::new(self.unit_id, ModbusProto::TcpUdp);
        let mut raw = Vec::with_capacity(12);
        request.generate_set_coil(address, value, &mut raw)?;
        let response = self.roundtrip(&raw).await?;
        request.parse_ok(&response)?;
        Ok(())
    }

    /// Write a contiguous block of holding registers in one request
    /// (function 0x10), matching the codec's atomic-word-group write.
    pub async fn write_holding_registers(&mut self, start_address: u16, values: &[u16]) -> Result<()> {
        let mut request = ModbusRequest::new(self.unit_id, ModbusProto::TcpUdp);
        let mut raw = Vec::with_capacity(12 + values.len() * 2);
        request.generate_set_holdings_bulk(start_address, values, &mut raw)?;
        let response = self.roundtrip(&raw).await?;
        request.parse_ok(&response)?;
        Ok(())
    }
}

fn unpack_bits(data: &[u8], count: u16) -> Result<Vec<bool>> {
    let mut values: Vec<bool> = data
        .iter()
        .flat_map(|byte| (0..8).map(move |i| (byte & (1 << i)) != 0))
        .collect();
    if values.len() > count as usize {
        values.truncate(count as usize);
    }
    ensure!(values.len() == count as usize, "unexpected bit count in Modbus response");
    Ok(values)
}

fn unpack_words(data: &[u8]) -> Vec<u16> {
    data.chunks_exact(2)
        .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
        .collect()
}
