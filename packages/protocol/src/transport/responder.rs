//! Shared request/response handling for every Modbus server transport,
//! adapted from the teacher's `build_slave_*_response` helpers
//! (`protocol::modbus::slave_holdings` etc.) but generalized: `rmodbus`
//! dispatches all eight required function codes (01/02/03/04/05/06/15/16)
//! itself via `process_read`/`process_write`, so one function serves every
//! transport instead of one per register kind.

use rmodbus::server::ModbusFrame;
use rmodbus::ModbusProto;

use crate::error::ProtocolError;
use crate::memory_map::ModbusSlave;

/// Feed one raw request frame (MBAP+PDU for TCP/UDP/TLS, RTU framing for
/// serial) through `rmodbus` against `slave`'s storage, returning the
/// encoded response bytes to send back, or `None` for a broadcast/no-reply
/// request.
pub fn respond(
    slave: &mut ModbusSlave,
    request: &[u8],
    proto: ModbusProto,
) -> Result<Option<Vec<u8>>, ProtocolError> {
    let mut response = Vec::new();
    let mut frame = ModbusFrame::new(slave.id, request, proto, &mut response);

    frame.parse().map_err(|e| ProtocolError::Io {
        node: None,
        message: format!("malformed Modbus request: {e:?}"),
    })?;

    if frame.processing_required {
        let result = if frame.readonly {
            frame.process_read(&mut slave.storage)
        } else {
            frame.process_write(&mut slave.storage)
        };
        if result.is_err() {
            return Err(ProtocolError::Io {
                node: None,
                message: format!("Modbus frame processing error: {result:?}"),
            });
        }
    }

    if frame.response_required {
        frame.finalize_response().map_err(|e| ProtocolError::Io {
            node: None,
            message: format!("failed to finalize Modbus response: {e:?}"),
        })?;
        log::debug!(
            "Modbus response for slave {}: {}",
            slave.id,
            sdplc_utils::hex_dump(&frame.response)
        );
        return Ok(Some(frame.response.clone()));
    }

    Ok(None)
}
