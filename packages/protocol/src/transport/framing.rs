//! MBAP framing shared by every stream-oriented Modbus transport (plain
//! TCP and TLS-over-TCP); extracted so TLS doesn't duplicate the
//! read-then-dispatch loop in `tcp.rs`.

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read one MBAP header + PDU from an async byte stream. `None` on a clean
/// EOF before any bytes of a new frame arrive.
pub async fn read_mbap_frame<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Option<Vec<u8>>> {
    let mut header = [0u8; 7];
    match stream.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let pdu_len = u16::from_be_bytes([header[4], header[5]]) as usize;
    let remaining = pdu_len.saturating_sub(1);
    let mut rest = vec![0u8; remaining];
    stream.read_exact(&mut rest).await?;

    let mut frame = Vec::with_capacity(7 + remaining);
    frame.extend_from_slice(&header);
    frame.extend_from_slice(&rest);
    Ok(Some(frame))
}
