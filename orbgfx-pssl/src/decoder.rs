//! GCN instruction stream decoder.
//!
//! The decoder segments a slice of 32-bit instruction words into individual
//! instructions without interpreting their semantics. Each microcode
//! encoding family is identified from the high bits of the leading word;
//! the encoding determines the base length (one or two dwords) and whether
//! a trailing literal-constant dword follows (a 32-bit-encoding source
//! field holding the literal selector, 255).
//!
//! The compiler runs two passes over the same slice, so decoding is
//! restartable and must yield identical sequences on every run. The cursor
//! strictly advances; a zero-length step is a decoder defect and fails
//! hard.

use crate::error::ShaderError;
use smallvec::SmallVec;

/// Source-field value selecting a trailing literal constant dword.
const LITERAL_SELECTOR: u32 = 255;

/// GCN microcode encoding families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Encoding {
    Sop2,
    Sopk,
    Sop1,
    Sopc,
    Sopp,
    Smrd,
    Vop2,
    Vop1,
    Vopc,
    Vop3,
    Vintrp,
    Ds,
    Mubuf,
    Mtbuf,
    Mimg,
    Exp,
    Flat,
    /// High-bit pattern not matching any known family. Consumed as a
    /// single dword and left for the compiler's best-effort skip policy;
    /// this is not a segmentation failure.
    Unknown,
}

impl Encoding {
    /// Classify the encoding family from the leading instruction word.
    pub fn classify(word: u32) -> Self {
        // Scalar families share the 0b10 prefix, so the longer prefixes
        // must be tested first.
        if word >> 23 == 0b1_0111_1111 {
            Self::Sopp
        } else if word >> 23 == 0b1_0111_1110 {
            Self::Sopc
        } else if word >> 23 == 0b1_0111_1101 {
            Self::Sop1
        } else if word >> 28 == 0b1011 {
            Self::Sopk
        } else if word >> 30 == 0b10 {
            Self::Sop2
        } else if word >> 27 == 0b11000 {
            Self::Smrd
        } else if word >> 26 == 0b110100 {
            Self::Vop3
        } else if word >> 26 == 0b110010 {
            Self::Vintrp
        } else if word >> 26 == 0b110110 {
            Self::Ds
        } else if word >> 26 == 0b110111 {
            Self::Flat
        } else if word >> 26 == 0b111000 {
            Self::Mubuf
        } else if word >> 26 == 0b111010 {
            Self::Mtbuf
        } else if word >> 26 == 0b111100 {
            Self::Mimg
        } else if word >> 26 == 0b111110 {
            Self::Exp
        } else if word >> 25 == 0b0111111 {
            Self::Vop1
        } else if word >> 25 == 0b0111110 {
            Self::Vopc
        } else if word >> 31 == 0 {
            Self::Vop2
        } else {
            Self::Unknown
        }
    }

    /// Base instruction length in dwords, before any literal constant.
    pub fn base_length(&self) -> usize {
        match self {
            Self::Vop3
            | Self::Ds
            | Self::Mubuf
            | Self::Mtbuf
            | Self::Mimg
            | Self::Exp
            | Self::Flat => 2,
            _ => 1,
        }
    }
}

/// Well-known opcode numbers used by the analyzer, the fetch-shader miner
/// and the compiler. Only the handful the pipeline actually inspects.
pub mod opcodes {
    /// SOPP: end of program.
    pub const S_ENDPGM: u16 = 1;
    /// SOPP: wait for outstanding memory counters.
    pub const S_WAITCNT: u16 = 12;
    /// SOP1: jump through an sgpr pair; terminates a fetch shader.
    pub const S_SETPC_B64: u16 = 32;
    /// SMRD: load 4 dwords (a buffer resource descriptor).
    pub const S_LOAD_DWORDX4: u16 = 2;
    /// MUBUF: buffer_load_format_x .. _xyzw occupy opcodes 0..=3; the
    /// opcode number encodes the element count minus one.
    pub const BUFFER_LOAD_FORMAT_X: u16 = 0;
    pub const BUFFER_LOAD_FORMAT_XYZW: u16 = 3;
    /// VOP1: move.
    pub const V_MOV_B32: u16 = 1;
    /// VOP2 arithmetic handled by the compiler.
    pub const V_ADD_F32: u16 = 3;
    pub const V_SUB_F32: u16 = 4;
    pub const V_MUL_F32: u16 = 8;
}

/// One structurally decoded instruction: encoding family, opcode number
/// and the raw words (including any literal). Produced transiently and
/// discarded after the analysis/codegen pass that consumed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction {
    pub encoding: Encoding,
    pub opcode: u16,
    /// Raw instruction words; `words.len()` is the cursor advance.
    pub words: SmallVec<[u32; 3]>,
    /// Dword offset of this instruction within the decoded slice.
    pub offset: usize,
}

impl DecodedInstruction {
    pub fn length_dwords(&self) -> usize {
        self.words.len()
    }

    /// Trailing literal constant, when the encoding selected one.
    pub fn literal(&self) -> Option<u32> {
        if self.words.len() > self.encoding.base_length() {
            Some(self.words[self.words.len() - 1])
        } else {
            None
        }
    }

    // Encoding-specific field accessors. Callers are expected to have
    // checked the encoding; a mismatched call yields meaningless bits,
    // never a panic.

    pub fn sop1_ssrc0(&self) -> u32 {
        self.words[0] & 0xFF
    }

    pub fn sop1_sdst(&self) -> u32 {
        (self.words[0] >> 16) & 0x7F
    }

    pub fn smrd_sdst(&self) -> u32 {
        (self.words[0] >> 15) & 0x7F
    }

    pub fn smrd_sbase(&self) -> u32 {
        (self.words[0] >> 9) & 0x3F
    }

    pub fn smrd_offset(&self) -> u32 {
        self.words[0] & 0xFF
    }

    pub fn smrd_imm(&self) -> bool {
        self.words[0] & 0x100 != 0
    }

    pub fn vop1_src0(&self) -> u32 {
        self.words[0] & 0x1FF
    }

    pub fn vop1_vdst(&self) -> u32 {
        (self.words[0] >> 17) & 0xFF
    }

    pub fn vop2_src0(&self) -> u32 {
        self.words[0] & 0x1FF
    }

    pub fn vop2_vsrc1(&self) -> u32 {
        (self.words[0] >> 9) & 0xFF
    }

    pub fn vop2_vdst(&self) -> u32 {
        (self.words[0] >> 17) & 0xFF
    }

    pub fn mubuf_idxen(&self) -> bool {
        self.words[0] & 0x2000 != 0
    }

    pub fn mubuf_vdata(&self) -> u32 {
        (self.words[1] >> 8) & 0xFF
    }

    pub fn mubuf_srsrc(&self) -> u32 {
        (self.words[1] >> 16) & 0x1F
    }

    pub fn exp_target(&self) -> u32 {
        (self.words[0] >> 4) & 0x3F
    }

    pub fn exp_enable(&self) -> u32 {
        self.words[0] & 0xF
    }

    pub fn exp_vsrc(&self, i: usize) -> u32 {
        (self.words[1] >> (i * 8)) & 0xFF
    }
}

fn extract_opcode(encoding: Encoding, word: u32) -> u16 {
    match encoding {
        Encoding::Sop2 => ((word >> 23) & 0x7F) as u16,
        Encoding::Sopk => ((word >> 23) & 0x1F) as u16,
        Encoding::Sop1 => ((word >> 8) & 0xFF) as u16,
        Encoding::Sopc | Encoding::Sopp => ((word >> 16) & 0x7F) as u16,
        Encoding::Smrd => ((word >> 22) & 0x1F) as u16,
        Encoding::Vop2 => ((word >> 25) & 0x3F) as u16,
        Encoding::Vop1 => ((word >> 9) & 0xFF) as u16,
        Encoding::Vopc => ((word >> 17) & 0xFF) as u16,
        Encoding::Vop3 => ((word >> 17) & 0x1FF) as u16,
        Encoding::Vintrp => ((word >> 16) & 0x3) as u16,
        Encoding::Ds => ((word >> 18) & 0xFF) as u16,
        Encoding::Mubuf | Encoding::Mimg | Encoding::Flat => ((word >> 18) & 0x7F) as u16,
        Encoding::Mtbuf => ((word >> 16) & 0x7) as u16,
        Encoding::Exp | Encoding::Unknown => 0,
    }
}

fn has_literal(encoding: Encoding, word: u32) -> bool {
    match encoding {
        Encoding::Sop2 | Encoding::Sopc => {
            word & 0xFF == LITERAL_SELECTOR || (word >> 8) & 0xFF == LITERAL_SELECTOR
        }
        Encoding::Sop1 => word & 0xFF == LITERAL_SELECTOR,
        Encoding::Vop2 | Encoding::Vop1 | Encoding::Vopc => word & 0x1FF == LITERAL_SELECTOR,
        // SMRD takes its offset from an sgpr unless the imm bit is set;
        // selector 255 in the sgpr case means a literal follows.
        Encoding::Smrd => word & 0x100 == 0 && word & 0xFF == LITERAL_SELECTOR,
        _ => false,
    }
}

/// Lazy, restartable decoder over a finite slice of instruction words.
pub struct InstructionDecoder<'a> {
    words: &'a [u32],
    cursor: usize,
}

impl<'a> InstructionDecoder<'a> {
    pub fn new(words: &'a [u32]) -> Self {
        Self { words, cursor: 0 }
    }

    /// Reset the cursor so the slice can be decoded again (the compiler's
    /// second pass).
    pub fn restart(&mut self) {
        self.cursor = 0;
    }

    /// Dwords consumed so far.
    pub fn position(&self) -> usize {
        self.cursor
    }
}

impl Iterator for InstructionDecoder<'_> {
    type Item = Result<DecodedInstruction, ShaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.words.len() {
            return None;
        }
        let offset = self.cursor;
        let word = self.words[offset];
        let encoding = Encoding::classify(word);

        let mut length = encoding.base_length();
        if has_literal(encoding, word) {
            length += 1;
        }
        if length == 0 {
            // Unreachable by construction, but a zero-length step would
            // loop forever, so guard it as a hard decoder defect.
            return Some(Err(ShaderError::decode(offset, "zero-length decode step")));
        }
        let end = offset + length;
        if end > self.words.len() {
            return Some(Err(ShaderError::decode(
                offset,
                format!(
                    "instruction of {} dwords extends past end of code ({} dwords)",
                    length,
                    self.words.len()
                ),
            )));
        }

        self.cursor = end;
        Some(Ok(DecodedInstruction {
            encoding,
            opcode: extract_opcode(encoding, word),
            words: SmallVec::from_slice(&self.words[offset..end]),
            offset,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // s_endpgm
    const S_ENDPGM: u32 = 0xBF81_0000;
    // v_mov_b32 v0, v1 (VOP1 op 1, src0 = 256+1)
    const V_MOV_V0_V1: u32 = 0x7E00_0301;
    // v_mov_b32 v2, literal (src0 = 255)
    const V_MOV_V2_LIT: u32 = 0x7E04_02FF;

    #[test]
    fn classifies_scalar_families() {
        assert_eq!(Encoding::classify(S_ENDPGM), Encoding::Sopp);
        assert_eq!(Encoding::classify(0xBE80_2000), Encoding::Sop1);
        assert_eq!(Encoding::classify(0xBF06_8000), Encoding::Sopc);
        assert_eq!(Encoding::classify(0xB000_0000), Encoding::Sopk);
        assert_eq!(Encoding::classify(0x8000_0000), Encoding::Sop2);
        assert_eq!(Encoding::classify(0xC080_0000), Encoding::Smrd);
    }

    #[test]
    fn classifies_vector_families() {
        assert_eq!(Encoding::classify(V_MOV_V0_V1), Encoding::Vop1);
        assert_eq!(Encoding::classify(0x7C00_0000), Encoding::Vopc);
        assert_eq!(Encoding::classify(0x0200_0000), Encoding::Vop2);
        assert_eq!(Encoding::classify(0xD000_0000), Encoding::Vop3);
        assert_eq!(Encoding::classify(0xE000_0000), Encoding::Mubuf);
        assert_eq!(Encoding::classify(0xF800_0000), Encoding::Exp);
    }

    #[test]
    fn literal_extends_instruction() {
        let code = [V_MOV_V2_LIT, 0x3F80_0000, S_ENDPGM];
        let decoded: Vec<_> = InstructionDecoder::new(&code)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].length_dwords(), 2);
        assert_eq!(decoded[0].literal(), Some(0x3F80_0000));
        assert_eq!(decoded[1].opcode, opcodes::S_ENDPGM);
    }

    #[test]
    fn cursor_strictly_advances() {
        let code = [V_MOV_V0_V1, V_MOV_V0_V1, S_ENDPGM];
        let mut dec = InstructionDecoder::new(&code);
        let mut last = 0;
        while let Some(inst) = dec.next() {
            let inst = inst.unwrap();
            assert!(dec.position() > last);
            last = dec.position();
            assert_eq!(inst.offset + inst.length_dwords(), last);
        }
        assert_eq!(last, code.len());
    }

    #[test]
    fn decoding_twice_yields_identical_sequences() {
        let code = [
            V_MOV_V2_LIT,
            0x4048_F5C3,
            0xE000_2000, // buffer_load_format_x
            0x8000_0000,
            V_MOV_V0_V1,
            S_ENDPGM,
        ];
        let first: Vec<_> = InstructionDecoder::new(&code)
            .collect::<Result<_, _>>()
            .unwrap();
        let second: Vec<_> = InstructionDecoder::new(&code)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(first, second);

        let mut dec = InstructionDecoder::new(&code);
        while dec.next().is_some() {}
        dec.restart();
        let third: Vec<_> = dec.collect::<Result<_, _>>().unwrap();
        assert_eq!(first, third);
    }

    #[test]
    fn truncated_two_dword_instruction_fails() {
        let code = [0xE000_2000]; // MUBUF without its second word
        let err = InstructionDecoder::new(&code).next().unwrap();
        assert!(matches!(err, Err(ShaderError::DecodeError { offset: 0, .. })));
    }

    #[test]
    fn truncated_literal_fails() {
        let code = [V_MOV_V2_LIT];
        let err = InstructionDecoder::new(&code).next().unwrap();
        assert!(matches!(err, Err(ShaderError::DecodeError { .. })));
    }
}
