//! PM4 packet framing.
//!
//! Command buffers are a dword stream of PM4 packets. Each packet
//! starts with a header dword whose top two bits select the packet
//! type; type-3 packets carry an 8-bit opcode and a payload of
//! `count + 1` dwords. This module only frames packets; interpretation
//! lives in [`crate::interpreter`].

use crate::error::GnmError;

/// Type-3 opcodes the interpreter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ItOpcode {
    Nop = 0x10,
    ClearState = 0x12,
    DispatchDirect = 0x15,
    DrawIndex2 = 0x27,
    ContextControl = 0x28,
    IndexType = 0x2A,
    DrawIndexAuto = 0x2D,
    NumInstances = 0x2F,
    WaitRegMem = 0x3C,
    IndirectBuffer = 0x3F,
    EventWrite = 0x46,
    EventWriteEop = 0x47,
    AcquireMem = 0x58,
    SetContextReg = 0x69,
    SetShReg = 0x76,
    SetUconfigReg = 0x79,
}

impl ItOpcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x10 => Self::Nop,
            0x12 => Self::ClearState,
            0x15 => Self::DispatchDirect,
            0x27 => Self::DrawIndex2,
            0x28 => Self::ContextControl,
            0x2A => Self::IndexType,
            0x2D => Self::DrawIndexAuto,
            0x2F => Self::NumInstances,
            0x3C => Self::WaitRegMem,
            0x3F => Self::IndirectBuffer,
            0x46 => Self::EventWrite,
            0x47 => Self::EventWriteEop,
            0x58 => Self::AcquireMem,
            0x69 => Self::SetContextReg,
            0x76 => Self::SetShReg,
            0x79 => Self::SetUconfigReg,
            _ => return None,
        })
    }
}

/// One framed packet, borrowing its payload from the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pm4Packet<'a> {
    /// Legacy direct register write starting at `base_reg`.
    Type0 { base_reg: u16, payload: &'a [u32] },
    /// Filler dword.
    Type2,
    Type3 { opcode: u8, payload: &'a [u32] },
}

/// Count field value that encodes an empty payload in type-3 NOPs.
const COUNT_EMPTY: u32 = 0x3FFF;

/// Splits a dword stream into packets. Truncation and reserved packet
/// types are hard errors carrying the offending dword offset.
pub struct Pm4Reader<'a> {
    words: &'a [u32],
    cursor: usize,
}

impl<'a> Pm4Reader<'a> {
    pub fn new(words: &'a [u32]) -> Self {
        Self { words, cursor: 0 }
    }

    /// Dword offset of the next unread packet header.
    pub fn offset(&self) -> usize {
        self.cursor
    }

    fn payload(&self, count_field: u32) -> Result<&'a [u32], GnmError> {
        let len = if count_field == COUNT_EMPTY { 0 } else { count_field as usize + 1 };
        let start = self.cursor + 1;
        self.words.get(start..start + len).ok_or_else(|| {
            GnmError::malformed(
                self.cursor,
                format!("packet payload of {len} dwords exceeds stream end"),
            )
        })
    }
}

impl<'a> Iterator for Pm4Reader<'a> {
    type Item = Result<Pm4Packet<'a>, GnmError>;

    fn next(&mut self) -> Option<Self::Item> {
        let header = *self.words.get(self.cursor)?;
        let count_field = (header >> 16) & 0x3FFF;
        let packet = match header >> 30 {
            0 => self.payload(count_field).map(|payload| Pm4Packet::Type0 {
                base_reg: (header & 0xFFFF) as u16,
                payload,
            }),
            2 => Ok(Pm4Packet::Type2),
            3 => self.payload(count_field).map(|payload| Pm4Packet::Type3 {
                opcode: ((header >> 8) & 0xFF) as u8,
                payload,
            }),
            _ => Err(GnmError::malformed(self.cursor, "reserved type-1 packet")),
        };
        match &packet {
            Ok(Pm4Packet::Type2) => self.cursor += 1,
            Ok(Pm4Packet::Type0 { payload, .. }) | Ok(Pm4Packet::Type3 { payload, .. }) => {
                self.cursor += 1 + payload.len();
            }
            // Leave the cursor on the bad header for diagnostics.
            Err(_) => {}
        }
        Some(packet)
    }
}

/// Builds a type-3 header for the given opcode and payload length.
pub fn type3_header(opcode: ItOpcode, payload_len: usize) -> u32 {
    let count = if payload_len == 0 { COUNT_EMPTY } else { payload_len as u32 - 1 };
    (3 << 30) | (count << 16) | ((opcode as u32) << 8)
}
