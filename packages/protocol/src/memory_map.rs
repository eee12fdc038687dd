//! C2 — Modbus Memory Map.
//!
//! Per slave, four logical register spaces, each a fixed 65,534-slot array
//! with a parallel occupancy bitmap — the same shape as the original
//! `sdplc/modbus.py` `ModBusSlave` (`*_memory` / `*_memory_occupancy`
//! parallel `list`s). Holding/input registers additionally keep a
//! `HashMap<address, RegisterMeta>` so that lookups are keyed by address
//! rather than assuming one slot per declared index (spec.md §9 Open
//! Question (a) — the original indexes `holding_registers[address]` as if
//! addresses were always contiguous from zero, which breaks for sparse
//! layouts).
//!
//! The slave additionally owns an `rmodbus` storage block so that real
//! Modbus/TCP, UDP, TLS and RTU requests can be served through
//! `rmodbus::server::ModbusFrame` directly against the same backing words
//! this map manages.

use std::collections::HashMap;

use rmodbus::server::storage::ModbusStorageSmall;

use crate::codec::{NumericValue, RegisterCodec, ScalarKind};
use crate::error::ProtocolError;

pub const SPACE_SIZE: usize = 65_534;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterKind {
    Coil,
    DiscreteInput,
    HoldingRegister,
    InputRegister,
}

#[derive(Debug, Clone, Copy)]
struct RegisterMeta {
    width: u8,
    scalar_kind: ScalarKind,
}

/// A single-bit table backing coils or discrete inputs.
struct BitTable {
    occupancy: Vec<bool>,
}

impl BitTable {
    fn new() -> Self {
        Self {
            occupancy: vec![false; SPACE_SIZE],
        }
    }

    fn reserve(&mut self, slave: u8, address: u16) -> Result<(), ProtocolError> {
        if self.occupancy[address as usize] {
            return Err(ProtocolError::AlreadyOccupied { slave, address });
        }
        self.occupancy[address as usize] = true;
        Ok(())
    }
}

/// A 16-bit-word table backing holding or input registers, keyed by address
/// rather than a contiguous index.
struct RegisterTable {
    occupancy: Vec<bool>,
    meta: HashMap<u16, RegisterMeta>,
}

impl RegisterTable {
    fn new() -> Self {
        Self {
            occupancy: vec![false; SPACE_SIZE],
            meta: HashMap::new(),
        }
    }

    fn reserve(
        &mut self,
        slave: u8,
        address: u16,
        width: u8,
        scalar_kind: ScalarKind,
    ) -> Result<(), ProtocolError> {
        let span = width as usize / 16;
        let window = address as usize..address as usize + span;
        if window.clone().any(|i| self.occupancy[i]) {
            return Err(ProtocolError::AlreadyOccupied { slave, address });
        }
        for i in window {
            self.occupancy[i] = true;
        }
        self.meta.insert(address, RegisterMeta { width, scalar_kind });
        Ok(())
    }

    fn meta(&self, slave: u8, address: u16) -> Result<RegisterMeta, ProtocolError> {
        self.meta
            .get(&address)
            .copied()
            .ok_or(ProtocolError::AlreadyOccupied { slave, address }.into_not_found())
    }
}

// Small ergonomic helper: reads/writes to an address with no declared
// register reuse the `AlreadyOccupied` variant's fields to report "not
// found" without growing the public error enum for an internal-only path.
impl ProtocolError {
    fn into_not_found(self) -> Self {
        match self {
            ProtocolError::AlreadyOccupied { slave, address } => ProtocolError::Io {
                node: None,
                message: format!("slave {slave} has no register declared at address {address}"),
            },
            other => other,
        }
    }
}

/// Owns one Modbus slave's four register spaces plus the `rmodbus` storage
/// block used to actually serve wire traffic.
pub struct ModbusSlave {
    pub id: u8,
    codec: RegisterCodec,
    coils: BitTable,
    discrete_inputs: BitTable,
    holding_registers: RegisterTable,
    input_registers: RegisterTable,
    pub storage: ModbusStorageSmall,
}

impl ModbusSlave {
    pub fn new(id: u8, codec: RegisterCodec) -> Self {
        Self {
            id,
            codec,
            coils: BitTable::new(),
            discrete_inputs: BitTable::new(),
            holding_registers: RegisterTable::new(),
            input_registers: RegisterTable::new(),
            storage: ModbusStorageSmall::new(),
        }
    }

    // ---- coils ----------------------------------------------------

    pub fn add_coil(&mut self, address: u16, value: bool) -> Result<(), ProtocolError> {
        self.coils.reserve(self.id, address)?;
        self.storage.set_coil(address, value).map_err(wire_err)?;
        Ok(())
    }

    pub fn read_coil(&self, address: u16) -> Result<bool, ProtocolError> {
        self.storage.get_coil(address).map_err(wire_err)
    }

    /// Returns the value read back, used by callers to verify the write.
    pub fn write_coil(&mut self, address: u16, value: bool) -> Result<bool, ProtocolError> {
        self.storage.set_coil(address, value).map_err(wire_err)?;
        self.read_coil(address)
    }

    // ---- discrete inputs --------------------------------------------
    // Modbus defines no wire function code that writes a discrete input;
    // `write_discrete_input` exists purely as the simulator's internal
    // setter (spec.md §9 Open Question (b)) — real clients never reach it.

    pub fn add_discrete_input(&mut self, address: u16, value: bool) -> Result<(), ProtocolError> {
        self.discrete_inputs.reserve(self.id, address)?;
        self.storage.set_discrete(address, value).map_err(wire_err)?;
        Ok(())
    }

    pub fn read_discrete_input(&self, address: u16) -> Result<bool, ProtocolError> {
        self.storage.get_discrete(address).map_err(wire_err)
    }

    pub fn write_discrete_input(
        &mut self,
        address: u16,
        value: bool,
    ) -> Result<bool, ProtocolError> {
        self.storage.set_discrete(address, value).map_err(wire_err)?;
        self.read_discrete_input(address)
    }

    // ---- holding registers --------------------------------------------

    pub fn add_holding_register(
        &mut self,
        address: u16,
        value: NumericValue,
        width: u8,
    ) -> Result<(), ProtocolError> {
        self.holding_registers
            .reserve(self.id, address, width, value.kind())?;
        let words = self.codec.encode(value, width)?;
        self.write_words_holding(address, &words)?;
        Ok(())
    }

    pub fn read_holding_register(&self, address: u16) -> Result<NumericValue, ProtocolError> {
        let meta = self.holding_registers.meta(self.id, address)?;
        let words = self.read_words_holding(address, meta.width)?;
        self.codec.decode(&words, meta.scalar_kind)
    }

    pub fn write_holding_register(
        &mut self,
        address: u16,
        value: NumericValue,
    ) -> Result<NumericValue, ProtocolError> {
        let meta = self.holding_registers.meta(self.id, address)?;
        let words = self.codec.encode(value, meta.width)?;
        self.write_words_holding(address, &words)?;
        self.read_holding_register(address)
    }

    // ---- input registers -----------------------------------------------

    pub fn add_input_register(
        &mut self,
        address: u16,
        value: NumericValue,
        width: u8,
    ) -> Result<(), ProtocolError> {
        self.input_registers
            .reserve(self.id, address, width, value.kind())?;
        let words = self.codec.encode(value, width)?;
        self.write_words_input(address, &words)?;
        Ok(())
    }

    pub fn read_input_register(&self, address: u16) -> Result<NumericValue, ProtocolError> {
        let meta = self.input_registers.meta(self.id, address)?;
        let words = self.read_words_input(address, meta.width)?;
        self.codec.decode(&words, meta.scalar_kind)
    }

    pub fn write_input_register(
        &mut self,
        address: u16,
        value: NumericValue,
    ) -> Result<NumericValue, ProtocolError> {
        let meta = self.input_registers.meta(self.id, address)?;
        let words = self.codec.encode(value, meta.width)?;
        self.write_words_input(address, &words)?;
        self.read_input_register(address)
    }

    pub fn holding_register_meta(&self, address: u16) -> Result<(u8, ScalarKind), ProtocolError> {
        let meta = self.holding_registers.meta(self.id, address)?;
        Ok((meta.width, meta.scalar_kind))
    }

    pub fn input_register_meta(&self, address: u16) -> Result<(u8, ScalarKind), ProtocolError> {
        let meta = self.input_registers.meta(self.id, address)?;
        Ok((meta.width, meta.scalar_kind))
    }

    // ---- atomic word-group helpers --------------------------------------
    // Encode the whole value first, then install the words as a contiguous
    // block — never write word-by-word-visible-in-between — so a concurrent
    // server read can never observe a half-written multi-word value
    // (spec.md §5).

    fn write_words_holding(&mut self, address: u16, words: &[u16]) -> Result<(), ProtocolError> {
        for (i, word) in words.iter().enumerate() {
            self.storage
                .set_holding(address + i as u16, *word)
                .map_err(wire_err)?;
        }
        Ok(())
    }

    fn read_words_holding(&self, address: u16, width: u8) -> Result<Vec<u16>, ProtocolError> {
        (0..width / 16)
            .map(|i| self.storage.get_holding(address + i as u16).map_err(wire_err))
            .collect()
    }

    fn write_words_input(&mut self, address: u16, words: &[u16]) -> Result<(), ProtocolError> {
        for (i, word) in words.iter().enumerate() {
            self.storage
                .set_input(address + i as u16, *word)
                .map_err(wire_err)?;
        }
        Ok(())
    }

    fn read_words_input(&self, address: u16, width: u8) -> Result<Vec<u16>, ProtocolError> {
        (0..width / 16)
            .map(|i| self.storage.get_input(address + i as u16).map_err(wire_err))
            .collect()
    }
}

/// The shared, mutexed collection of slaves a server transport serves
/// requests against. One `SlaveTable` is shared by every listener (TCP,
/// UDP, TLS, serial) and by the node registry, matching spec.md §5's "the
/// Modbus memory map is owned exclusively by the server ... no explicit
/// locking is required [beyond] the single-threaded model" — here made
/// concrete as one mutex per slave table rather than per slave, since a
/// single Modbus server process typically hosts a handful of slaves.
pub struct SlaveTable {
    slaves: parking_lot::Mutex<HashMap<u8, ModbusSlave>>,
    codec: RegisterCodec,
}

impl SlaveTable {
    pub fn new(codec: RegisterCodec) -> Self {
        Self {
            slaves: parking_lot::Mutex::new(HashMap::new()),
            codec,
        }
    }

    /// Run `f` against the slave for `id`, lazily constructing it on first
    /// use (spec.md §3.2 — "Slaves are created lazily").
    pub fn with_slave_mut<T>(&self, id: u8, f: impl FnOnce(&mut ModbusSlave) -> T) -> T {
        let mut guard = self.slaves.lock();
        let slave = guard
            .entry(id)
            .or_insert_with(|| ModbusSlave::new(id, self.codec));
        f(slave)
    }

    pub fn has_slave(&self, id: u8) -> bool {
        self.slaves.lock().contains_key(&id)
    }
}

fn wire_err(e: rmodbus::ErrorKind) -> ProtocolError {
    ProtocolError::Io {
        node: None,
        message: format!("{e:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ByteOrder, WordOrder};

    fn slave() -> ModbusSlave {
        ModbusSlave::new(0, RegisterCodec::new(ByteOrder::Big, WordOrder::Big))
    }

    #[test]
    fn add_holding_register_occupies_exactly_its_window() {
        // A 64-bit register at address 10 occupies [10, 14).
        let mut before = slave();
        before.add_holding_register(10, NumericValue::Float(1.0), 64).unwrap();
        assert!(before.add_holding_register(9, NumericValue::Int(1), 16).is_ok());

        for addr in 10..14u16 {
            let mut s = slave();
            s.add_holding_register(10, NumericValue::Float(1.0), 64).unwrap();
            let overlap = s.add_holding_register(addr, NumericValue::Int(1), 16);
            assert!(matches!(overlap, Err(ProtocolError::AlreadyOccupied { .. })));
        }

        let mut after = slave();
        after.add_holding_register(10, NumericValue::Float(1.0), 64).unwrap();
        assert!(after.add_holding_register(14, NumericValue::Int(1), 16).is_ok());
    }

    #[test]
    fn read_after_write_round_trips() {
        let mut s = slave();
        s.add_holding_register(0, NumericValue::Int(7), 16).unwrap();
        let read_back = s.write_holding_register(0, NumericValue::Int(42)).unwrap();
        assert_eq!(read_back, NumericValue::Int(42));
        assert_eq!(s.read_holding_register(0).unwrap(), NumericValue::Int(42));
    }

    #[test]
    fn coil_write_returns_value_read_back() {
        let mut s = slave();
        s.add_coil(3, false).unwrap();
        let read_back = s.write_coil(3, true).unwrap();
        assert!(read_back);
    }

    #[test]
    fn float_at_16_bit_width_is_rejected() {
        let mut s = slave();
        let err = s
            .add_holding_register(0, NumericValue::Float(3.14), 16)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Unsupported { .. }));
    }
}
