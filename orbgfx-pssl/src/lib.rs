//! PSSL shader binary introspection and GCN-to-SPIR-V recompilation.
//!
//! Shader binaries produced for the console's GPU embed an `OrbShdr`
//! metadata record inside the raw code stream. This crate locates that
//! record, recovers the resource-binding slot table that precedes it,
//! structurally decodes the GCN instruction words, and recompiles them
//! (best-effort) into portable SPIR-V bytecode for a native pipeline
//! backend, together with the vertex-input semantics mined from the
//! program's fetch shader.
//!
//! The pipeline, leaf first:
//!
//! 1. [`binary::ProgramInfo`]: signature scan + header/slot recovery
//! 2. [`decoder::InstructionDecoder`]: lazy structural segmentation
//! 3. [`fetch::FetchShader`]: vertex-input semantics mining
//! 4. [`analyzer::Analyzer`] + [`compiler::Compiler`]: two-pass recompile
//! 5. [`module::ShaderModule`]: the public entry point tying it together
//! 6. [`cache::ShaderCache`]: dedup of compiled artifacts by [`binary::PsslKey`]

pub mod analyzer;
pub mod binary;
pub mod cache;
pub mod compiler;
pub mod decoder;
pub mod dump;
pub mod error;
pub mod fetch;
pub mod module;
pub mod spirv;
pub mod test_utils;

pub use binary::{InputUsageSlot, ProgramInfo, PsslKey, ShaderStage, UsageType};
pub use error::ShaderError;
pub use fetch::VertexInputSemantic;
pub use module::{CompiledShader, ShaderModule};
