//! Hex formatting for protocol traces, in the style of the teacher's
//! `format!("{b:02x}")` joins used throughout the Modbus frame logging.

/// Render a byte slice as a space-separated lowercase hex string.
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_bytes_as_lowercase_hex() {
        assert_eq!(hex_dump(&[0x01, 0xab, 0x00]), "01 ab 00");
    }

    #[test]
    fn empty_slice_yields_empty_string() {
        assert_eq!(hex_dump(&[]), "");
    }
}
