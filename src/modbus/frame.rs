// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus/TCP application data unit codec.
//!
//! An ADU is the 7-byte MBAP header (transaction id, protocol id, length,
//! unit id) followed by the PDU (function code + data). All integers are
//! big-endian. Requests are decoded into [`Request`]; responses are encoded
//! from raw register/bit values.

use thiserror::Error;

/// Largest legal Modbus/TCP ADU.
pub const MAX_ADU_LENGTH: usize = 260;
/// MBAP header size.
pub const MBAP_HEADER_LEN: usize = 7;

/// Function codes the server distinguishes.
pub const FC_READ_COILS: u8 = 0x01;
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;
pub const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Framing failures that make the connection unusable.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("MBAP length field {0} is out of range")]
    BadLength(u16),
    #[error("unsupported protocol identifier {0}")]
    BadProtocol(u16),
    #[error("PDU truncated: expected at least {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
}

/// Decoded MBAP header; echoed verbatim into the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    pub unit_id: u8,
}

/// A decoded Modbus request PDU.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    ReadCoils { addr: u16, quantity: u16 },
    ReadDiscreteInputs { addr: u16, quantity: u16 },
    ReadHoldingRegisters { addr: u16, quantity: u16 },
    ReadInputRegisters { addr: u16, quantity: u16 },
    WriteSingleCoil { addr: u16, state: bool },
    WriteSingleRegister { addr: u16, value: u16 },
    WriteMultipleCoils { addr: u16, states: Vec<bool> },
    WriteMultipleRegisters { addr: u16, values: Vec<u16> },
    Unsupported { function: u8 },
}

fn be_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}

fn need(pdu: &[u8], len: usize) -> Result<(), FrameError> {
    if pdu.len() < len {
        Err(FrameError::Truncated {
            expected: len,
            got: pdu.len(),
        })
    } else {
        Ok(())
    }
}

/// Parse the 7-byte MBAP header. Returns the header and the expected PDU
/// length (MBAP length minus the unit id byte).
pub fn parse_mbap(header: &[u8; MBAP_HEADER_LEN]) -> Result<(MbapHeader, usize), FrameError> {
    let transaction_id = be_u16(header, 0);
    let protocol_id = be_u16(header, 2);
    let length = be_u16(header, 4);
    let unit_id = header[6];

    if protocol_id != 0 {
        return Err(FrameError::BadProtocol(protocol_id));
    }
    // length counts the unit id plus the PDU.
    if length < 2 || length as usize > MAX_ADU_LENGTH - 6 {
        return Err(FrameError::BadLength(length));
    }
    Ok((
        MbapHeader {
            transaction_id,
            protocol_id,
            unit_id,
        },
        length as usize - 1,
    ))
}

/// Decode a request PDU.
pub fn parse_request(pdu: &[u8]) -> Result<Request, FrameError> {
    need(pdu, 1)?;
    let function = pdu[0];
    let request = match function {
        FC_READ_COILS => {
            need(pdu, 5)?;
            Request::ReadCoils {
                addr: be_u16(pdu, 1),
                quantity: be_u16(pdu, 3),
            }
        }
        FC_READ_DISCRETE_INPUTS => {
            need(pdu, 5)?;
            Request::ReadDiscreteInputs {
                addr: be_u16(pdu, 1),
                quantity: be_u16(pdu, 3),
            }
        }
        FC_READ_HOLDING_REGISTERS => {
            need(pdu, 5)?;
            Request::ReadHoldingRegisters {
                addr: be_u16(pdu, 1),
                quantity: be_u16(pdu, 3),
            }
        }
        FC_READ_INPUT_REGISTERS => {
            need(pdu, 5)?;
            Request::ReadInputRegisters {
                addr: be_u16(pdu, 1),
                quantity: be_u16(pdu, 3),
            }
        }
        FC_WRITE_SINGLE_COIL => {
            need(pdu, 5)?;
            Request::WriteSingleCoil {
                addr: be_u16(pdu, 1),
                // 0xFF00 is ON, 0x0000 is OFF.
                state: pdu[3] == 0xFF,
            }
        }
        FC_WRITE_SINGLE_REGISTER => {
            need(pdu, 5)?;
            Request::WriteSingleRegister {
                addr: be_u16(pdu, 1),
                value: be_u16(pdu, 3),
            }
        }
        FC_WRITE_MULTIPLE_COILS => {
            need(pdu, 6)?;
            let addr = be_u16(pdu, 1);
            let quantity = be_u16(pdu, 3);
            let byte_count = pdu[5] as usize;
            need(pdu, 6 + byte_count)?;
            // Unpack bit i from payload byte i/8, LSB first. In the full
            // ADU the payload starts at byte 13; here the PDU starts after
            // the 7-byte MBAP, so that is offset 6.
            let mut states = Vec::with_capacity(quantity as usize);
            for i in 0..quantity as usize {
                let byte_index = 6 + i / 8;
                let bit_position = i % 8;
                if byte_index >= pdu.len() {
                    return Err(FrameError::Truncated {
                        expected: byte_index + 1,
                        got: pdu.len(),
                    });
                }
                states.push(pdu[byte_index] & (1 << bit_position) != 0);
            }
            Request::WriteMultipleCoils { addr, states }
        }
        FC_WRITE_MULTIPLE_REGISTERS => {
            need(pdu, 6)?;
            let addr = be_u16(pdu, 1);
            let quantity = be_u16(pdu, 3) as usize;
            let byte_count = pdu[5] as usize;
            need(pdu, 6 + byte_count)?;
            if byte_count < quantity * 2 {
                return Err(FrameError::Truncated {
                    expected: 6 + quantity * 2,
                    got: 6 + byte_count,
                });
            }
            let values = (0..quantity).map(|i| be_u16(pdu, 6 + 2 * i)).collect();
            Request::WriteMultipleRegisters { addr, values }
        }
        other => Request::Unsupported { function: other },
    };
    Ok(request)
}

/// Wrap a response PDU in an MBAP header echoing the request's ids.
pub fn encode_adu(header: &MbapHeader, pdu: &[u8]) -> Vec<u8> {
    let mut adu = Vec::with_capacity(MBAP_HEADER_LEN + pdu.len());
    adu.extend_from_slice(&header.transaction_id.to_be_bytes());
    adu.extend_from_slice(&header.protocol_id.to_be_bytes());
    adu.extend_from_slice(&((pdu.len() as u16 + 1).to_be_bytes()));
    adu.push(header.unit_id);
    adu.extend_from_slice(pdu);
    adu
}

/// Response to a bit read: function, byte count, packed bits LSB first.
pub fn encode_bits_response(function: u8, bits: &[bool]) -> Vec<u8> {
    let byte_count = bits.len().div_ceil(8);
    let mut pdu = Vec::with_capacity(2 + byte_count);
    pdu.push(function);
    pdu.push(byte_count as u8);
    let mut packed = vec![0u8; byte_count];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            packed[i / 8] |= 1 << (i % 8);
        }
    }
    pdu.extend_from_slice(&packed);
    pdu
}

/// Response to a register read: function, byte count, big-endian words.
pub fn encode_registers_response(function: u8, values: &[u16]) -> Vec<u8> {
    let mut pdu = Vec::with_capacity(2 + values.len() * 2);
    pdu.push(function);
    pdu.push((values.len() * 2) as u8);
    for value in values {
        pdu.extend_from_slice(&value.to_be_bytes());
    }
    pdu
}

/// Echo response to a single-coil write.
pub fn encode_write_single_coil_response(addr: u16, state: bool) -> Vec<u8> {
    let mut pdu = Vec::with_capacity(5);
    pdu.push(FC_WRITE_SINGLE_COIL);
    pdu.extend_from_slice(&addr.to_be_bytes());
    pdu.extend_from_slice(if state { &[0xFF, 0x00] } else { &[0x00, 0x00] });
    pdu
}

/// Echo response to a single-register write.
pub fn encode_write_single_register_response(addr: u16, value: u16) -> Vec<u8> {
    let mut pdu = Vec::with_capacity(5);
    pdu.push(FC_WRITE_SINGLE_REGISTER);
    pdu.extend_from_slice(&addr.to_be_bytes());
    pdu.extend_from_slice(&value.to_be_bytes());
    pdu
}

/// Response to a multiple-register write: start address and quantity.
pub fn encode_write_multiple_registers_response(addr: u16, quantity: u16) -> Vec<u8> {
    let mut pdu = Vec::with_capacity(5);
    pdu.push(FC_WRITE_MULTIPLE_REGISTERS);
    pdu.extend_from_slice(&addr.to_be_bytes());
    pdu.extend_from_slice(&quantity.to_be_bytes());
    pdu
}

/// Exception response: function with its high bit set, then the code.
pub fn encode_exception(function: u8, code: u8) -> Vec<u8> {
    vec![function | 0x80, code]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mbap_round_trip() {
        let header = MbapHeader {
            transaction_id: 0x1234,
            protocol_id: 0,
            unit_id: 0xFF,
        };
        let adu = encode_adu(&header, &[0x04, 0x02, 0x00, 0x2A]);
        assert_eq!(adu.len(), 11);
        let mut raw = [0u8; MBAP_HEADER_LEN];
        raw.copy_from_slice(&adu[..MBAP_HEADER_LEN]);
        let (parsed, pdu_len) = parse_mbap(&raw).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(pdu_len, 4);
    }

    #[test]
    fn rejects_bad_protocol_and_length() {
        let mut raw = [0u8; MBAP_HEADER_LEN];
        raw[2] = 1; // protocol id 0x0100
        raw[5] = 6;
        assert!(matches!(parse_mbap(&raw), Err(FrameError::BadProtocol(_))));

        let mut raw = [0u8; MBAP_HEADER_LEN];
        raw[5] = 1; // length 1: no PDU at all
        assert!(matches!(parse_mbap(&raw), Err(FrameError::BadLength(1))));
    }

    #[test]
    fn parses_read_input_registers() {
        let pdu = [FC_READ_INPUT_REGISTERS, 0x00, 0x0A, 0x00, 0x03];
        assert_eq!(
            parse_request(&pdu).unwrap(),
            Request::ReadInputRegisters {
                addr: 10,
                quantity: 3
            }
        );
    }

    #[test]
    fn parses_write_single_coil_states() {
        let on = [FC_WRITE_SINGLE_COIL, 0x00, 0x08, 0xFF, 0x00];
        assert_eq!(
            parse_request(&on).unwrap(),
            Request::WriteSingleCoil {
                addr: 8,
                state: true
            }
        );
        let off = [FC_WRITE_SINGLE_COIL, 0x00, 0x08, 0x00, 0x00];
        assert_eq!(
            parse_request(&off).unwrap(),
            Request::WriteSingleCoil {
                addr: 8,
                state: false
            }
        );
    }

    #[test]
    fn parses_write_multiple_coils_bit_order() {
        // Start 8, quantity 2, one payload byte 0b00000011.
        let pdu = [FC_WRITE_MULTIPLE_COILS, 0x00, 0x08, 0x00, 0x02, 0x01, 0b0000_0011];
        match parse_request(&pdu).unwrap() {
            Request::WriteMultipleCoils { addr, states } => {
                assert_eq!(addr, 8);
                assert_eq!(states, vec![true, true]);
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn truncated_pdu_is_an_error() {
        let pdu = [FC_READ_HOLDING_REGISTERS, 0x00];
        assert!(matches!(
            parse_request(&pdu),
            Err(FrameError::Truncated { .. })
        ));
    }

    #[test]
    fn unknown_function_is_reported_not_fatal() {
        let pdu = [0x2B, 0x00];
        assert_eq!(
            parse_request(&pdu).unwrap(),
            Request::Unsupported { function: 0x2B }
        );
    }

    #[test]
    fn encodes_bit_and_register_responses() {
        let pdu = encode_bits_response(FC_READ_COILS, &[true, false, true]);
        assert_eq!(pdu, vec![FC_READ_COILS, 1, 0b0000_0101]);

        let pdu = encode_registers_response(FC_READ_INPUT_REGISTERS, &[0x1234, 0x00FF]);
        assert_eq!(
            pdu,
            vec![FC_READ_INPUT_REGISTERS, 4, 0x12, 0x34, 0x00, 0xFF]
        );
    }

    #[test]
    fn encodes_exception() {
        assert_eq!(encode_exception(FC_READ_COILS, 2), vec![0x81, 2]);
    }
}
