//! GCN-to-SPIR-V codegen pass.
//!
//! Second pass of the recompiler: re-decodes the instruction stream the
//! analyzer already walked and emits portable bytecode incrementally. The
//! translation is best-effort: vector moves, float add/sub/mul and
//! exports flow through a vgpr value map; anything without a mapping is
//! skipped with a warning and counted, never a hard failure. An
//! unsupported *stage* has already failed hard before this pass runs.
//!
//! Translation is deterministic: all emission order is driven by the
//! instruction stream and builder ids are allocated monotonically, so
//! equal inputs produce byte-identical bytecode.

use std::collections::HashMap;

use crate::analyzer::AnalysisInfo;
use crate::binary::ShaderStage;
use crate::decoder::{opcodes, DecodedInstruction, Encoding, InstructionDecoder};
use crate::error::ShaderError;
use crate::fetch::VertexInputSemantic;
use crate::spirv::{
    SpirvBuilder, BUILTIN_POSITION, DECORATION_BUILTIN, DECORATION_LOCATION,
    EXEC_MODEL_FRAGMENT, EXEC_MODEL_GEOMETRY, EXEC_MODEL_GL_COMPUTE, EXEC_MODEL_TESS_CONTROL,
    EXEC_MODEL_TESS_EVAL, EXEC_MODEL_VERTEX, EXEC_MODE_LOCAL_SIZE, EXEC_MODE_ORIGIN_UPPER_LEFT,
    STORAGE_INPUT, STORAGE_OUTPUT,
};

// Export targets: MRT0..7 are 0..=7, POS0..3 are 12..=15.
const EXP_TARGET_MRT0: u32 = 0;
const EXP_TARGET_POS0: u32 = 12;
const EXP_TARGET_POS3: u32 = 15;

/// Codegen pass. Consumes the analyzer context and the (already merged)
/// vertex input semantics; see [`crate::module::ShaderModule`].
pub struct Compiler {
    stage: ShaderStage,
    analysis: AnalysisInfo,
    semantics: Vec<VertexInputSemantic>,
    builder: SpirvBuilder,
    /// Current SPIR-V value id per vgpr, scalar f32 domain.
    vgpr_values: HashMap<u32, u32>,
    position_out: Option<u32>,
    color_out: Option<u32>,
    interface: Vec<u32>,
    skipped: usize,
}

impl Compiler {
    pub fn new(
        stage: ShaderStage,
        analysis: AnalysisInfo,
        semantics: &[VertexInputSemantic],
    ) -> Self {
        Self {
            stage,
            analysis,
            semantics: semantics.to_vec(),
            builder: SpirvBuilder::new(),
            vgpr_values: HashMap::new(),
            position_out: None,
            color_out: None,
            interface: Vec::new(),
            skipped: 0,
        }
    }

    /// Run codegen over a fresh decode of the same slice the analyzer saw.
    pub fn compile(mut self, decoder: InstructionDecoder<'_>) -> Result<Vec<u32>, ShaderError> {
        self.declare_interface();
        let func = self.builder.begin_function();
        self.load_vertex_inputs();

        for inst in decoder {
            let inst = inst?;
            if inst.encoding == Encoding::Sopp && inst.opcode == opcodes::S_ENDPGM {
                break;
            }
            self.translate(&inst);
        }

        self.builder.end_function();
        let exec_model = exec_model_for(self.stage);
        self.builder
            .entry_point(exec_model, func, "main", &self.interface.clone());
        match self.stage {
            ShaderStage::Pixel => {
                self.builder
                    .execution_mode(func, EXEC_MODE_ORIGIN_UPPER_LEFT, &[]);
            }
            ShaderStage::Compute => {
                self.builder
                    .execution_mode(func, EXEC_MODE_LOCAL_SIZE, &[1, 1, 1]);
            }
            _ => {}
        }

        if self.skipped > 0 {
            log::warn!(
                "fixme: {} of {} instructions not translated ({:?} stage)",
                self.skipped,
                self.analysis.instruction_count,
                self.stage
            );
        }
        Ok(self.builder.build())
    }

    /// Declare stage inputs/outputs ahead of the function body.
    fn declare_interface(&mut self) {
        match self.stage {
            ShaderStage::Vertex => {
                let vec4 = self.builder.type_float_vec(4);
                let out_ptr = self.builder.type_pointer(STORAGE_OUTPUT, vec4);
                let pos = self.builder.variable(out_ptr, STORAGE_OUTPUT);
                self.builder
                    .decorate(pos, DECORATION_BUILTIN, &[BUILTIN_POSITION]);
                self.position_out = Some(pos);
                self.interface.push(pos);

                for sem in self.semantics.clone() {
                    let ty = self.builder.type_float_vec(sem.size_in_elements as u32);
                    let ptr = self.builder.type_pointer(STORAGE_INPUT, ty);
                    let var = self.builder.variable(ptr, STORAGE_INPUT);
                    self.builder
                        .decorate(var, DECORATION_LOCATION, &[sem.semantic as u32]);
                    self.interface.push(var);
                }
            }
            ShaderStage::Pixel => {
                let vec4 = self.builder.type_float_vec(4);
                let out_ptr = self.builder.type_pointer(STORAGE_OUTPUT, vec4);
                let color = self.builder.variable(out_ptr, STORAGE_OUTPUT);
                self.builder.decorate(color, DECORATION_LOCATION, &[0]);
                self.color_out = Some(color);
                self.interface.push(color);
            }
            // Compute, geometry and the tessellation stages translate the
            // body only; they have no fixed interface here.
            _ => {}
        }
    }

    /// Seed the vgpr map from the declared vertex inputs, mirroring what
    /// the fetch shader would have produced at runtime.
    fn load_vertex_inputs(&mut self) {
        if self.stage != ShaderStage::Vertex {
            return;
        }
        // Interface slot 0 is the position output; inputs follow in
        // semantic order.
        let inputs: Vec<(VertexInputSemantic, u32)> = self
            .semantics
            .iter()
            .copied()
            .zip(self.interface.iter().copied().skip(1))
            .collect();
        let float = self.builder.type_float();
        for (sem, var) in inputs {
            let count = sem.size_in_elements as u32;
            let ty = self.builder.type_float_vec(count);
            let value = self.builder.load(ty, var);
            if count == 1 {
                self.vgpr_values.insert(sem.vgpr as u32, value);
            } else {
                for c in 0..count {
                    let comp = self.builder.composite_extract(float, value, c);
                    self.vgpr_values.insert(sem.vgpr as u32 + c, comp);
                }
            }
        }
    }

    fn translate(&mut self, inst: &DecodedInstruction) {
        match inst.encoding {
            Encoding::Vop1 if inst.opcode == opcodes::V_MOV_B32 => {
                match self.resolve_src(inst.vop1_src0(), inst.literal()) {
                    Some(value) => {
                        self.vgpr_values.insert(inst.vop1_vdst(), value);
                    }
                    None => self.skip(inst),
                }
            }
            Encoding::Vop2 => {
                let src0 = self.resolve_src(inst.vop2_src0(), inst.literal());
                let src1 = self.vgpr_values.get(&inst.vop2_vsrc1()).copied();
                match (inst.opcode, src0, src1) {
                    (opcodes::V_ADD_F32, Some(a), Some(b)) => {
                        let float = self.builder.type_float();
                        let r = self.builder.f_add(float, a, b);
                        self.vgpr_values.insert(inst.vop2_vdst(), r);
                    }
                    (opcodes::V_SUB_F32, Some(a), Some(b)) => {
                        let float = self.builder.type_float();
                        let r = self.builder.f_sub(float, a, b);
                        self.vgpr_values.insert(inst.vop2_vdst(), r);
                    }
                    (opcodes::V_MUL_F32, Some(a), Some(b)) => {
                        let float = self.builder.type_float();
                        let r = self.builder.f_mul(float, a, b);
                        self.vgpr_values.insert(inst.vop2_vdst(), r);
                    }
                    _ => self.skip(inst),
                }
            }
            Encoding::Exp => self.translate_export(inst),
            // Waits and the scalar set-up preamble carry no data flow the
            // portable module needs to reproduce.
            Encoding::Sopp if inst.opcode == opcodes::S_WAITCNT => {}
            _ => self.skip(inst),
        }
    }

    fn translate_export(&mut self, inst: &DecodedInstruction) {
        let target = inst.exp_target();
        let out = if (EXP_TARGET_POS0..=EXP_TARGET_POS3).contains(&target) {
            self.position_out
        } else if target == EXP_TARGET_MRT0 {
            self.color_out
        } else {
            None
        };
        let Some(out) = out else {
            self.skip(inst);
            return;
        };

        let zero = self.builder.const_f32(0.0);
        let mut components = [zero; 4];
        for (i, component) in components.iter_mut().enumerate() {
            if inst.exp_enable() & (1 << i) != 0 {
                if let Some(&v) = self.vgpr_values.get(&inst.exp_vsrc(i)) {
                    *component = v;
                }
            }
        }
        let vec4 = self.builder.type_float_vec(4);
        let value = self.builder.composite_construct(vec4, &components);
        self.builder.store(out, value);
    }

    /// Resolve a 9-bit vector-ALU source operand to a SPIR-V value id.
    /// Returns `None` for operand kinds the translator does not model
    /// (sgprs, the execute mask, ...).
    fn resolve_src(&mut self, src: u32, literal: Option<u32>) -> Option<u32> {
        match src {
            // vgpr
            256..=511 => self.vgpr_values.get(&(src - 256)).copied(),
            // inline integer zero; treated as float zero in this domain
            128 => Some(self.builder.const_f32(0.0)),
            // inline float constants
            240 => Some(self.builder.const_f32(0.5)),
            241 => Some(self.builder.const_f32(-0.5)),
            242 => Some(self.builder.const_f32(1.0)),
            243 => Some(self.builder.const_f32(-1.0)),
            244 => Some(self.builder.const_f32(2.0)),
            245 => Some(self.builder.const_f32(-2.0)),
            246 => Some(self.builder.const_f32(4.0)),
            247 => Some(self.builder.const_f32(-4.0)),
            // literal constant dword, reinterpreted as f32
            255 => literal.map(|bits| self.builder.const_f32(f32::from_bits(bits))),
            _ => None,
        }
    }

    fn skip(&mut self, inst: &DecodedInstruction) {
        self.skipped += 1;
        log::debug!(
            "fixme: skipping untranslated {:?} opcode {} at dword {}",
            inst.encoding,
            inst.opcode,
            inst.offset
        );
    }
}

fn exec_model_for(stage: ShaderStage) -> u32 {
    match stage {
        ShaderStage::Vertex => EXEC_MODEL_VERTEX,
        ShaderStage::Hull => EXEC_MODEL_TESS_CONTROL,
        ShaderStage::Domain => EXEC_MODEL_TESS_EVAL,
        ShaderStage::Geometry => EXEC_MODEL_GEOMETRY,
        ShaderStage::Pixel => EXEC_MODEL_FRAGMENT,
        ShaderStage::Compute => EXEC_MODEL_GL_COMPUTE,
    }
}
