//! Fetch-shader mining.
//!
//! A fetch shader is a small secondary program whose only job is loading
//! vertex attributes from memory into vgprs before the main vertex shader
//! runs. We never execute it; instead its instruction stream is scanned
//! for typed buffer loads, each of which describes one externally supplied
//! vertex input: the destination vgpr, the element count implied by the
//! load format, and the semantic index given by encounter order.

use crate::decoder::{opcodes, DecodedInstruction, Encoding, InstructionDecoder};
use crate::error::ShaderError;
use serde::Serialize;

/// One inferred vertex input binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VertexInputSemantic {
    /// Semantic index; equals the attribute location in the native
    /// pipeline's vertex input state.
    pub semantic: u8,
    /// First vgpr the fetch shader writes for this attribute.
    pub vgpr: u8,
    /// Number of 32-bit elements loaded (1..=4).
    pub size_in_elements: u8,
}

/// Decoded fetch shader: the instruction list up to the terminating jump
/// plus the semantics mined from it.
#[derive(Debug, Clone)]
pub struct FetchShader {
    instructions: Vec<DecodedInstruction>,
    semantics: Vec<VertexInputSemantic>,
}

impl FetchShader {
    /// Decode `code` until `s_setpc_b64` (the return into the caller) or
    /// the end of the slice, extracting vertex input semantics.
    pub fn parse(code: &[u32]) -> Result<Self, ShaderError> {
        let mut instructions = Vec::new();
        let mut semantics = Vec::new();

        for inst in InstructionDecoder::new(code) {
            let inst = inst?;
            let done = inst.encoding == Encoding::Sop1 && inst.opcode == opcodes::S_SETPC_B64;

            if inst.encoding == Encoding::Mubuf
                && (opcodes::BUFFER_LOAD_FORMAT_X..=opcodes::BUFFER_LOAD_FORMAT_XYZW)
                    .contains(&inst.opcode)
            {
                let semantic = semantics.len() as u8;
                semantics.push(VertexInputSemantic {
                    semantic,
                    vgpr: inst.mubuf_vdata() as u8,
                    size_in_elements: (inst.opcode - opcodes::BUFFER_LOAD_FORMAT_X) as u8 + 1,
                });
            }

            instructions.push(inst);
            if done {
                break;
            }
        }

        log::debug!(
            "fetch shader: {} instructions, {} vertex inputs",
            instructions.len(),
            semantics.len()
        );
        Ok(Self { instructions, semantics })
    }

    pub fn instructions(&self) -> &[DecodedInstruction] {
        &self.instructions
    }

    /// Mined semantics, in encounter (= location) order.
    pub fn semantics(&self) -> &[VertexInputSemantic] {
        &self.semantics
    }
}
