//! Analysis pass over a decoded instruction stream.
//!
//! The recompiler is two-pass: this pass walks the stream once and records
//! the static facts codegen needs (register pressure, exports, control
//! flow shape), then codegen re-decodes the same slice with the collected
//! context threaded through. The pass writes only into the `AnalysisInfo`
//! it is given, so a compile call never touches shared state and stays
//! reentrant.

use crate::decoder::{opcodes, DecodedInstruction, Encoding, InstructionDecoder};
use crate::error::ShaderError;

/// Static facts accumulated over one analysis pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisInfo {
    pub instruction_count: usize,
    /// Highest vgpr index written, plus one. Zero when none.
    pub vgpr_count: u32,
    /// Highest sgpr index written, plus one. Zero when none.
    pub sgpr_count: u32,
    /// Number of export instructions (position/attribute/MRT writes).
    pub export_count: usize,
    /// Scalar memory loads; a proxy for resource-descriptor fetches.
    pub scalar_load_count: usize,
    pub branch_count: usize,
    /// Instructions whose encoding family could not be classified.
    pub unknown_count: usize,
    pub ends_with_endpgm: bool,
}

/// Stateless analyzer; see module docs.
pub struct Analyzer;

impl Analyzer {
    /// Decode every instruction once, accumulating into `info`. Running
    /// the same stream through a fresh `AnalysisInfo` yields an identical
    /// result (the decode itself is idempotent).
    pub fn analyze(
        info: &mut AnalysisInfo,
        decoder: InstructionDecoder<'_>,
    ) -> Result<(), ShaderError> {
        for inst in decoder {
            let inst = inst?;
            Self::record(info, &inst);
        }
        Ok(())
    }

    fn record(info: &mut AnalysisInfo, inst: &DecodedInstruction) {
        info.instruction_count += 1;
        match inst.encoding {
            Encoding::Vop1 => {
                info.vgpr_count = info.vgpr_count.max(inst.vop1_vdst() + 1);
            }
            Encoding::Vop2 => {
                info.vgpr_count = info.vgpr_count.max(inst.vop2_vdst() + 1);
            }
            Encoding::Sop1 => {
                info.sgpr_count = info.sgpr_count.max(inst.sop1_sdst() + 1);
            }
            Encoding::Smrd => {
                info.scalar_load_count += 1;
                info.sgpr_count = info.sgpr_count.max(inst.smrd_sdst() + 1);
            }
            Encoding::Mubuf => {
                info.vgpr_count = info.vgpr_count.max(inst.mubuf_vdata() + 1);
            }
            Encoding::Exp => {
                info.export_count += 1;
            }
            Encoding::Sopp => {
                // s_branch and the conditional branches occupy 2..=11.
                if (2..=11).contains(&inst.opcode) {
                    info.branch_count += 1;
                }
                if inst.opcode == opcodes::S_ENDPGM {
                    info.ends_with_endpgm = true;
                }
            }
            Encoding::Unknown => {
                info.unknown_count += 1;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const V_MOV_V3_V1: u32 = 0x7E06_0301;
    const S_ENDPGM: u32 = 0xBF81_0000;
    const EXP_POS0: u32 = 0xF800_00CF;
    const EXP_POS0_W1: u32 = 0x0302_0100;

    #[test]
    fn accumulates_static_facts() {
        let code = [V_MOV_V3_V1, EXP_POS0, EXP_POS0_W1, S_ENDPGM];
        let mut info = AnalysisInfo::default();
        Analyzer::analyze(&mut info, InstructionDecoder::new(&code)).unwrap();
        assert_eq!(info.instruction_count, 3);
        assert_eq!(info.vgpr_count, 4);
        assert_eq!(info.export_count, 1);
        assert!(info.ends_with_endpgm);
    }

    #[test]
    fn analysis_is_idempotent() {
        let code = [V_MOV_V3_V1, V_MOV_V3_V1, S_ENDPGM];
        let mut a = AnalysisInfo::default();
        let mut b = AnalysisInfo::default();
        Analyzer::analyze(&mut a, InstructionDecoder::new(&code)).unwrap();
        Analyzer::analyze(&mut b, InstructionDecoder::new(&code)).unwrap();
        assert_eq!(a, b);
    }
}
