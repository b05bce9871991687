//! Top-level shader module: ties the locator, the fetch-shader miner and
//! the two-pass recompiler together.

use std::sync::Arc;

use crate::analyzer::{AnalysisInfo, Analyzer};
use crate::binary::{InputUsageSlot, ProgramInfo, PsslKey, ShaderStage};
use crate::compiler::Compiler;
use crate::decoder::InstructionDecoder;
use crate::error::ShaderError;
use crate::fetch::{FetchShader, VertexInputSemantic};

/// Compiled artifact, indexable by [`PsslKey`]. Compilation is
/// deterministic: equal keys imply byte-identical `spirv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledShader {
    pub key: PsslKey,
    pub stage: ShaderStage,
    pub spirv: Vec<u32>,
    /// Vertex input bindings, in location order; empty for non-vertex
    /// stages or when no fetch shader was supplied.
    pub inputs: Vec<VertexInputSemantic>,
}

/// One shader program plus its optional fetch shader.
#[derive(Debug, Clone)]
pub struct ShaderModule {
    code: Vec<u32>,
    info: ProgramInfo,
    fetch: Option<FetchShader>,
}

impl ShaderModule {
    /// Construct from a raw shader binary without a fetch shader.
    pub fn new(code: &[u8]) -> Result<Self, ShaderError> {
        Self::with_fetch(code, None)
    }

    /// Construct from a raw shader binary and, for vertex programs that
    /// declare one, the fetch-shader code it points at.
    ///
    /// The fetch program is decoded eagerly: its vertex-input semantics
    /// must be merged into the binding metadata *before* the main program
    /// compiles, so slots of type `SubPtrFetchShader` resolve to concrete
    /// attribute descriptions rather than staying an indirection.
    pub fn with_fetch(code: &[u8], fetch_code: Option<&[u8]>) -> Result<Self, ShaderError> {
        let info = ProgramInfo::parse(code)?;
        if info.code_size_bytes() as usize > code.len() {
            return Err(ShaderError::MalformedHeader {
                reason: format!(
                    "header claims {} code bytes but buffer holds {}",
                    info.code_size_bytes(),
                    code.len()
                ),
            });
        }
        let words = words_from_bytes(&code[..info.code_size_bytes() as usize]);

        let fetch = match fetch_code {
            Some(bytes) if info.has_fetch_shader() => {
                Some(FetchShader::parse(&words_from_bytes(bytes))?)
            }
            Some(_) => {
                log::warn!("fetch shader supplied but program declares no fetch-shader slot");
                None
            }
            None => None,
        };

        Ok(Self { code: words, info, fetch })
    }

    pub fn program_info(&self) -> &ProgramInfo {
        &self.info
    }

    /// The program's code, in dwords, as bounded by the header.
    pub fn code(&self) -> &[u32] {
        &self.code
    }

    pub fn key(&self) -> PsslKey {
        self.info.key()
    }

    pub fn input_usage_slots(&self) -> &[InputUsageSlot] {
        self.info.input_usage_slots()
    }

    /// Vertex input semantics mined from the fetch shader; empty when the
    /// program has none.
    pub fn vs_input_semantics(&self) -> &[VertexInputSemantic] {
        self.fetch.as_ref().map_or(&[], |f| f.semantics())
    }

    /// Recompile to portable bytecode. Analysis and codegen each decode
    /// the code slice once; the analyzer context is threaded into codegen
    /// by value, so concurrent compiles of different modules never share
    /// state.
    pub fn compile(&self) -> Result<CompiledShader, ShaderError> {
        let stage = self.info.stage()?;

        let mut analysis = AnalysisInfo::default();
        Analyzer::analyze(&mut analysis, InstructionDecoder::new(&self.code))?;

        let semantics = self.vs_input_semantics().to_vec();
        if stage == ShaderStage::Vertex && self.info.has_fetch_shader() && semantics.is_empty() {
            log::warn!(
                "vertex shader {:?} declares a fetch shader but none was supplied; \
                 inputs will be undeclared",
                self.key()
            );
        }

        let spirv = Compiler::new(stage, analysis, &semantics)
            .compile(InstructionDecoder::new(&self.code))?;

        log::debug!(
            "compiled {} shader {:?}: {} dwords of bytecode, {} inputs",
            stage.name(),
            self.key(),
            spirv.len(),
            semantics.len()
        );
        Ok(CompiledShader { key: self.key(), stage, spirv, inputs: semantics })
    }

    /// Compile and wrap for cache insertion.
    pub fn compile_shared(&self) -> Result<Arc<CompiledShader>, ShaderError> {
        self.compile().map(Arc::new)
    }
}

/// Copy a little-endian byte stream into dwords, ignoring any ragged tail.
fn words_from_bytes(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::{BinaryType, UsageType};
    use crate::test_utils::ShaderBinaryBuilder;

    const S_ENDPGM: u32 = 0xBF81_0000;
    const EXP_POS0: u32 = 0xF800_00CF;
    const EXP_POS0_W1: u32 = 0x0302_0100;

    fn fetch_blob() -> Vec<u8> {
        // buffer_load_format_xyzw v[0:3] + s_setpc_b64
        let words = [0xE00C_2000u32, 0x8002_0000, 0xBE80_2000];
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn vertex_module_with_fetch_reports_semantics() {
        let code = [EXP_POS0, EXP_POS0_W1, S_ENDPGM];
        let blob = ShaderBinaryBuilder::new(BinaryType::VsVs, &code)
            .slot(UsageType::SubPtrFetchShader, 0, 2)
            .build();
        let module = ShaderModule::with_fetch(&blob, Some(&fetch_blob())).unwrap();
        assert_eq!(module.vs_input_semantics().len(), 1);
        assert_eq!(module.vs_input_semantics()[0].size_in_elements, 4);

        let compiled = module.compile().unwrap();
        assert_eq!(compiled.stage, ShaderStage::Vertex);
        assert_eq!(compiled.inputs, module.vs_input_semantics());
        assert_eq!(compiled.spirv[0], 0x0723_0203);
    }

    #[test]
    fn compile_is_deterministic() {
        let code = [EXP_POS0, EXP_POS0_W1, S_ENDPGM];
        let blob = ShaderBinaryBuilder::new(BinaryType::VsVs, &code)
            .slot(UsageType::SubPtrFetchShader, 0, 2)
            .build();
        let fetch = fetch_blob();
        let a = ShaderModule::with_fetch(&blob, Some(&fetch)).unwrap().compile().unwrap();
        let b = ShaderModule::with_fetch(&blob, Some(&fetch)).unwrap().compile().unwrap();
        assert_eq!(a.spirv, b.spirv);
        assert_eq!(a.inputs, b.inputs);
    }

    #[test]
    fn unsupported_stage_fails_before_codegen() {
        let blob = ShaderBinaryBuilder::new(BinaryType::VsEs, &[S_ENDPGM]).build();
        let module = ShaderModule::new(&blob).unwrap();
        assert_eq!(module.compile(), Err(ShaderError::UnsupportedStage("ES")));
    }

    #[test]
    fn fetch_without_declaring_slot_is_ignored() {
        let blob = ShaderBinaryBuilder::new(BinaryType::VsVs, &[S_ENDPGM]).build();
        let module = ShaderModule::with_fetch(&blob, Some(&fetch_blob())).unwrap();
        assert!(module.vs_input_semantics().is_empty());
    }
}
