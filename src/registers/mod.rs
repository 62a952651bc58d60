// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus-facing register and coil banks.
//!
//! A single mutex serializes every access: the acquisition and simulation
//! drivers overwrite the input registers through `remap_*` while the Modbus
//! reply path reads under the same lock, so a publish is atomic with respect
//! to replies.

use std::sync::Mutex;

use thiserror::Error;

use crate::config::sru::SruDescriptor;

/// Modbus protocol ceiling for one read-registers request.
pub const MAX_READ_REGISTERS: u16 = 125;
/// Modbus protocol ceiling for one read-bits request.
pub const MAX_READ_BITS: u16 = 2000;
/// Modbus protocol ceiling for one write-multiple-registers request.
pub const MAX_WRITE_REGISTERS: u16 = 123;

/// Allocation sizes of the fixed banks.
pub const COIL_COUNT: usize = 20;
pub const DISCRETE_INPUT_COUNT: usize = 20;
pub const REGISTER_BANK_SIZE: usize = 512;

/// Modbus exception codes surfaced by the banks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Exception {
    #[error("illegal function")]
    IllegalFunction,
    #[error("illegal data address")]
    IllegalDataAddress,
    #[error("illegal data value")]
    IllegalDataValue,
}

impl Exception {
    pub fn code(&self) -> u8 {
        match self {
            Self::IllegalFunction => 0x01,
            Self::IllegalDataAddress => 0x02,
            Self::IllegalDataValue => 0x03,
        }
    }
}

#[derive(Debug)]
struct Banks {
    input_registers: Vec<u16>,
    holding_registers: Vec<u16>,
    coils: Vec<bool>,
    discrete_inputs: Vec<bool>,
}

/// The register map behind one mutex.
#[derive(Debug)]
pub struct RegisterMap {
    banks: Mutex<Banks>,
}

impl RegisterMap {
    /// Allocate the banks. The input-register bank grows beyond the default
    /// 512 words when the SRU layout needs more; nothing is truncated at
    /// allocation time.
    pub fn new(input_register_count: usize) -> Self {
        let input_len = input_register_count.max(REGISTER_BANK_SIZE);
        Self {
            banks: Mutex::new(Banks {
                input_registers: vec![0; input_len],
                holding_registers: vec![0; REGISTER_BANK_SIZE],
                coils: vec![false; COIL_COUNT],
                discrete_inputs: vec![false; DISCRETE_INPUT_COUNT],
            }),
        }
    }

    /// Size the input bank from the SRU descriptor, shim included.
    pub fn for_sru(sru: &SruDescriptor) -> Self {
        Self::new(sru.published_line_len())
    }

    pub fn input_register_len(&self) -> usize {
        self.banks.lock().unwrap().input_registers.len()
    }

    /// Overwrite the first `min(len, MAX_READ_REGISTERS)` input registers.
    /// Longer publications truncate silently; this bound keeps one register
    /// line inside a single Modbus read.
    pub fn remap_input_registers(&self, new_values: &[u16]) {
        let mut banks = self.banks.lock().unwrap();
        let count = new_values
            .len()
            .min(MAX_READ_REGISTERS as usize)
            .min(banks.input_registers.len());
        banks.input_registers[..count].copy_from_slice(&new_values[..count]);
    }

    /// Overwrite coil bits, bounded by `MAX_READ_BITS` and the bank size.
    pub fn remap_coils(&self, new_values: &[bool]) {
        let mut banks = self.banks.lock().unwrap();
        let count = new_values
            .len()
            .min(MAX_READ_BITS as usize)
            .min(banks.coils.len());
        banks.coils[..count].copy_from_slice(&new_values[..count]);
    }

    fn check_read(len: usize, addr: u16, quantity: u16, max: u16) -> Result<(), Exception> {
        if quantity == 0 || quantity > max {
            return Err(Exception::IllegalDataValue);
        }
        if addr as usize + quantity as usize > len {
            return Err(Exception::IllegalDataAddress);
        }
        Ok(())
    }

    pub fn read_input_registers(&self, addr: u16, quantity: u16) -> Result<Vec<u16>, Exception> {
        let banks = self.banks.lock().unwrap();
        Self::check_read(banks.input_registers.len(), addr, quantity, MAX_READ_REGISTERS)?;
        Ok(banks.input_registers[addr as usize..addr as usize + quantity as usize].to_vec())
    }

    pub fn read_holding_registers(&self, addr: u16, quantity: u16) -> Result<Vec<u16>, Exception> {
        let banks = self.banks.lock().unwrap();
        Self::check_read(
            banks.holding_registers.len(),
            addr,
            quantity,
            MAX_READ_REGISTERS,
        )?;
        Ok(banks.holding_registers[addr as usize..addr as usize + quantity as usize].to_vec())
    }

    pub fn read_coils(&self, addr: u16, quantity: u16) -> Result<Vec<bool>, Exception> {
        let banks = self.banks.lock().unwrap();
        Self::check_read(banks.coils.len(), addr, quantity, MAX_READ_BITS)?;
        Ok(banks.coils[addr as usize..addr as usize + quantity as usize].to_vec())
    }

    pub fn read_discrete_inputs(&self, addr: u16, quantity: u16) -> Result<Vec<bool>, Exception> {
        let banks = self.banks.lock().unwrap();
        Self::check_read(banks.discrete_inputs.len(), addr, quantity, MAX_READ_BITS)?;
        Ok(banks.discrete_inputs[addr as usize..addr as usize + quantity as usize].to_vec())
    }

    pub fn write_holding_register(&self, addr: u16, value: u16) -> Result<(), Exception> {
        let mut banks = self.banks.lock().unwrap();
        let cell = banks
            .holding_registers
            .get_mut(addr as usize)
            .ok_or(Exception::IllegalDataAddress)?;
        *cell = value;
        Ok(())
    }

    pub fn write_holding_registers(&self, addr: u16, values: &[u16]) -> Result<(), Exception> {
        if values.is_empty() || values.len() > MAX_WRITE_REGISTERS as usize {
            return Err(Exception::IllegalDataValue);
        }
        let mut banks = self.banks.lock().unwrap();
        if addr as usize + values.len() > banks.holding_registers.len() {
            return Err(Exception::IllegalDataAddress);
        }
        banks.holding_registers[addr as usize..addr as usize + values.len()]
            .copy_from_slice(values);
        Ok(())
    }

    /// Store the echoed state of a single-coil write. Coil writes are
    /// triggers routed to hardware; this bit only backs the protocol echo.
    pub fn set_coil(&self, addr: u16, state: bool) -> Result<(), Exception> {
        let mut banks = self.banks.lock().unwrap();
        let cell = banks
            .coils
            .get_mut(addr as usize)
            .ok_or(Exception::IllegalDataAddress)?;
        *cell = state;
        Ok(())
    }
}
