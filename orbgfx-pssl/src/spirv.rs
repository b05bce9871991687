//! Minimal SPIR-V module builder.
//!
//! Emits portable shader bytecode section by section in the order the
//! SPIR-V spec mandates (capabilities, memory model, entry points,
//! execution modes, decorations, types/constants/globals, functions).
//! Result ids are allocated monotonically and types/constants are
//! deduplicated on emission, so building the same sequence of calls twice
//! produces byte-identical words; this is the determinism the shader cache
//! relies on.

use std::collections::HashMap;

const SPIRV_MAGIC: u32 = 0x0723_0203;
const SPIRV_VERSION: u32 = 0x0001_0000;
const SPIRV_GENERATOR: u32 = 0;

// Opcodes used by the generator.
const OP_CAPABILITY: u16 = 17;
const OP_MEMORY_MODEL: u16 = 14;
const OP_ENTRY_POINT: u16 = 15;
const OP_EXECUTION_MODE: u16 = 16;
const OP_DECORATE: u16 = 71;
const OP_TYPE_VOID: u16 = 19;
const OP_TYPE_FLOAT: u16 = 22;
const OP_TYPE_VECTOR: u16 = 23;
const OP_TYPE_POINTER: u16 = 32;
const OP_TYPE_FUNCTION: u16 = 33;
const OP_CONSTANT: u16 = 43;
const OP_VARIABLE: u16 = 59;
const OP_LOAD: u16 = 61;
const OP_STORE: u16 = 62;
const OP_FUNCTION: u16 = 54;
const OP_FUNCTION_END: u16 = 56;
const OP_LABEL: u16 = 248;
const OP_RETURN: u16 = 253;
const OP_FADD: u16 = 129;
const OP_FSUB: u16 = 131;
const OP_FMUL: u16 = 133;
const OP_COMPOSITE_CONSTRUCT: u16 = 80;
const OP_COMPOSITE_EXTRACT: u16 = 81;

// Enumerant values.
pub const CAP_SHADER: u32 = 1;
pub const ADDRESSING_LOGICAL: u32 = 0;
pub const MEMORY_MODEL_GLSL450: u32 = 1;
pub const EXEC_MODEL_VERTEX: u32 = 0;
pub const EXEC_MODEL_TESS_CONTROL: u32 = 1;
pub const EXEC_MODEL_TESS_EVAL: u32 = 2;
pub const EXEC_MODEL_GEOMETRY: u32 = 3;
pub const EXEC_MODEL_FRAGMENT: u32 = 4;
pub const EXEC_MODEL_GL_COMPUTE: u32 = 5;
pub const EXEC_MODE_ORIGIN_UPPER_LEFT: u32 = 7;
pub const EXEC_MODE_LOCAL_SIZE: u32 = 17;
pub const STORAGE_INPUT: u32 = 1;
pub const STORAGE_OUTPUT: u32 = 3;
pub const DECORATION_BUILTIN: u32 = 11;
pub const DECORATION_LOCATION: u32 = 30;
pub const BUILTIN_POSITION: u32 = 0;
pub const FUNCTION_CONTROL_NONE: u32 = 0;

fn instr(out: &mut Vec<u32>, opcode: u16, operands: &[u32]) {
    out.push(((operands.len() as u32 + 1) << 16) | opcode as u32);
    out.extend_from_slice(operands);
}

/// Pack a UTF-8 string into SPIR-V words (nul-terminated, little-endian).
fn string_words(s: &str) -> Vec<u32> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Sectioned SPIR-V word builder.
pub struct SpirvBuilder {
    id_bound: u32,
    capabilities: Vec<u32>,
    memory_model: Vec<u32>,
    entry_points: Vec<u32>,
    execution_modes: Vec<u32>,
    annotations: Vec<u32>,
    types_constants: Vec<u32>,
    functions: Vec<u32>,

    // Deduplication caches (keys only; emission order stays call order).
    type_void: Option<u32>,
    type_float: Option<u32>,
    type_vectors: HashMap<u32, u32>,
    type_fn_void: Option<u32>,
    type_pointers: HashMap<(u32, u32), u32>,
    constants_f32: HashMap<u32, u32>,
}

impl SpirvBuilder {
    pub fn new() -> Self {
        let mut b = Self {
            id_bound: 1,
            capabilities: Vec::new(),
            memory_model: Vec::new(),
            entry_points: Vec::new(),
            execution_modes: Vec::new(),
            annotations: Vec::new(),
            types_constants: Vec::new(),
            functions: Vec::new(),
            type_void: None,
            type_float: None,
            type_vectors: HashMap::new(),
            type_fn_void: None,
            type_pointers: HashMap::new(),
            constants_f32: HashMap::new(),
        };
        instr(&mut b.capabilities, OP_CAPABILITY, &[CAP_SHADER]);
        instr(
            &mut b.memory_model,
            OP_MEMORY_MODEL,
            &[ADDRESSING_LOGICAL, MEMORY_MODEL_GLSL450],
        );
        b
    }

    pub fn alloc_id(&mut self) -> u32 {
        let id = self.id_bound;
        self.id_bound += 1;
        id
    }

    pub fn entry_point(&mut self, exec_model: u32, function: u32, name: &str, interface: &[u32]) {
        let mut operands = vec![exec_model, function];
        operands.extend(string_words(name));
        operands.extend_from_slice(interface);
        instr(&mut self.entry_points, OP_ENTRY_POINT, &operands);
    }

    pub fn execution_mode(&mut self, function: u32, mode: u32, args: &[u32]) {
        let mut operands = vec![function, mode];
        operands.extend_from_slice(args);
        instr(&mut self.execution_modes, OP_EXECUTION_MODE, &operands);
    }

    pub fn decorate(&mut self, target: u32, decoration: u32, args: &[u32]) {
        let mut operands = vec![target, decoration];
        operands.extend_from_slice(args);
        instr(&mut self.annotations, OP_DECORATE, &operands);
    }

    pub fn type_void(&mut self) -> u32 {
        if let Some(id) = self.type_void {
            return id;
        }
        let id = self.alloc_id();
        instr(&mut self.types_constants, OP_TYPE_VOID, &[id]);
        self.type_void = Some(id);
        id
    }

    pub fn type_float(&mut self) -> u32 {
        if let Some(id) = self.type_float {
            return id;
        }
        let id = self.alloc_id();
        instr(&mut self.types_constants, OP_TYPE_FLOAT, &[id, 32]);
        self.type_float = Some(id);
        id
    }

    /// `vecN` of 32-bit floats; `component_count` of 1 yields plain float.
    pub fn type_float_vec(&mut self, component_count: u32) -> u32 {
        if component_count <= 1 {
            return self.type_float();
        }
        if let Some(&id) = self.type_vectors.get(&component_count) {
            return id;
        }
        let float = self.type_float();
        let id = self.alloc_id();
        instr(
            &mut self.types_constants,
            OP_TYPE_VECTOR,
            &[id, float, component_count],
        );
        self.type_vectors.insert(component_count, id);
        id
    }

    pub fn type_fn_void(&mut self) -> u32 {
        if let Some(id) = self.type_fn_void {
            return id;
        }
        let void = self.type_void();
        let id = self.alloc_id();
        instr(&mut self.types_constants, OP_TYPE_FUNCTION, &[id, void]);
        self.type_fn_void = Some(id);
        id
    }

    pub fn type_pointer(&mut self, storage_class: u32, pointee: u32) -> u32 {
        if let Some(&id) = self.type_pointers.get(&(storage_class, pointee)) {
            return id;
        }
        let id = self.alloc_id();
        instr(
            &mut self.types_constants,
            OP_TYPE_POINTER,
            &[id, storage_class, pointee],
        );
        self.type_pointers.insert((storage_class, pointee), id);
        id
    }

    pub fn const_f32(&mut self, value: f32) -> u32 {
        let bits = value.to_bits();
        if let Some(&id) = self.constants_f32.get(&bits) {
            return id;
        }
        let float = self.type_float();
        let id = self.alloc_id();
        instr(&mut self.types_constants, OP_CONSTANT, &[float, id, bits]);
        self.constants_f32.insert(bits, id);
        id
    }

    /// Module-scope variable (inputs/outputs).
    pub fn variable(&mut self, ptr_type: u32, storage_class: u32) -> u32 {
        let id = self.alloc_id();
        instr(
            &mut self.types_constants,
            OP_VARIABLE,
            &[ptr_type, id, storage_class],
        );
        id
    }

    pub fn begin_function(&mut self) -> u32 {
        let void = self.type_void();
        let fn_type = self.type_fn_void();
        let func = self.alloc_id();
        instr(
            &mut self.functions,
            OP_FUNCTION,
            &[void, func, FUNCTION_CONTROL_NONE, fn_type],
        );
        let label = self.alloc_id();
        instr(&mut self.functions, OP_LABEL, &[label]);
        func
    }

    pub fn end_function(&mut self) {
        instr(&mut self.functions, OP_RETURN, &[]);
        instr(&mut self.functions, OP_FUNCTION_END, &[]);
    }

    pub fn load(&mut self, result_type: u32, pointer: u32) -> u32 {
        let id = self.alloc_id();
        instr(&mut self.functions, OP_LOAD, &[result_type, id, pointer]);
        id
    }

    pub fn store(&mut self, pointer: u32, value: u32) {
        instr(&mut self.functions, OP_STORE, &[pointer, value]);
    }

    pub fn composite_extract(&mut self, result_type: u32, composite: u32, index: u32) -> u32 {
        let id = self.alloc_id();
        instr(
            &mut self.functions,
            OP_COMPOSITE_EXTRACT,
            &[result_type, id, composite, index],
        );
        id
    }

    pub fn composite_construct(&mut self, result_type: u32, components: &[u32]) -> u32 {
        let id = self.alloc_id();
        let mut operands = vec![result_type, id];
        operands.extend_from_slice(components);
        instr(&mut self.functions, OP_COMPOSITE_CONSTRUCT, &operands);
        id
    }

    pub fn f_add(&mut self, result_type: u32, a: u32, b: u32) -> u32 {
        self.binary_op(OP_FADD, result_type, a, b)
    }

    pub fn f_sub(&mut self, result_type: u32, a: u32, b: u32) -> u32 {
        self.binary_op(OP_FSUB, result_type, a, b)
    }

    pub fn f_mul(&mut self, result_type: u32, a: u32, b: u32) -> u32 {
        self.binary_op(OP_FMUL, result_type, a, b)
    }

    fn binary_op(&mut self, opcode: u16, result_type: u32, a: u32, b: u32) -> u32 {
        let id = self.alloc_id();
        instr(&mut self.functions, opcode, &[result_type, id, a, b]);
        id
    }

    /// Concatenate the header and all sections into the final word stream.
    pub fn build(self) -> Vec<u32> {
        let mut words = vec![
            SPIRV_MAGIC,
            SPIRV_VERSION,
            SPIRV_GENERATOR,
            self.id_bound,
            0, // reserved schema
        ];
        words.extend(self.capabilities);
        words.extend(self.memory_model);
        words.extend(self.entry_points);
        words.extend(self.execution_modes);
        words.extend(self.annotations);
        words.extend(self.types_constants);
        words.extend(self.functions);
        words
    }
}

impl Default for SpirvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_well_formed() {
        let words = SpirvBuilder::new().build();
        assert_eq!(words[0], SPIRV_MAGIC);
        assert_eq!(words[1], SPIRV_VERSION);
        assert_eq!(words[4], 0);
    }

    #[test]
    fn types_and_constants_deduplicate() {
        let mut b = SpirvBuilder::new();
        let f1 = b.type_float();
        let f2 = b.type_float();
        assert_eq!(f1, f2);
        let c1 = b.const_f32(1.0);
        let c2 = b.const_f32(1.0);
        assert_eq!(c1, c2);
        assert_ne!(c1, b.const_f32(2.0));
    }

    #[test]
    fn identical_call_sequences_build_identical_words() {
        let build = || {
            let mut b = SpirvBuilder::new();
            let vec4 = b.type_float_vec(4);
            let ptr = b.type_pointer(STORAGE_OUTPUT, vec4);
            let var = b.variable(ptr, STORAGE_OUTPUT);
            b.decorate(var, DECORATION_BUILTIN, &[BUILTIN_POSITION]);
            let func = b.begin_function();
            b.entry_point(EXEC_MODEL_VERTEX, func, "main", &[var]);
            let zero = b.const_f32(0.0);
            let v = b.composite_construct(vec4, &[zero, zero, zero, zero]);
            b.store(var, v);
            b.end_function();
            b.build()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn entry_point_name_is_nul_terminated() {
        let mut b = SpirvBuilder::new();
        let func = b.begin_function();
        b.entry_point(EXEC_MODEL_FRAGMENT, func, "main", &[]);
        b.end_function();
        let words = b.build();
        // "main" packs into two words: "main" + nul padding.
        let needle = [
            u32::from_le_bytes(*b"main"),
            0u32,
        ];
        assert!(words.windows(2).any(|w| w == needle));
    }
}
