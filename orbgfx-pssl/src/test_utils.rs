//! Builders for synthetic shader binaries.
//!
//! Real PSSL binaries come out of a proprietary toolchain; for tests (and
//! for exercising the CLI without console assets) we assemble buffers with
//! the same layout: code dwords, then the input-usage slot table, then the
//! usage-mask table, then the `OrbShdr` header.

use crate::binary::{BinaryType, UsageType, SHADER_BINARY_SIGNATURE};

/// Number of usage-mask dwords the builder places between the slot table
/// and the header. Arbitrary but non-zero so the backward offset
/// arithmetic is actually exercised.
const MASK_DWORDS: u8 = 2;

pub struct ShaderBinaryBuilder {
    binary_type: BinaryType,
    code: Vec<u32>,
    slots: Vec<(UsageType, u8, u8)>,
    hash0: u32,
    hash1: u32,
}

impl ShaderBinaryBuilder {
    pub fn new(binary_type: BinaryType, code: &[u32]) -> Self {
        Self {
            binary_type,
            code: code.to_vec(),
            slots: Vec::new(),
            hash0: 0xCAFE_0000,
            hash1: 0x0000_BABE,
        }
    }

    pub fn slot(mut self, usage_type: UsageType, api_slot: u8, start_register: u8) -> Self {
        self.slots.push((usage_type, api_slot, start_register));
        self
    }

    pub fn hashes(mut self, hash0: u32, hash1: u32) -> Self {
        self.hash0 = hash0;
        self.hash1 = hash1;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut blob = Vec::new();
        for word in &self.code {
            blob.extend_from_slice(&word.to_le_bytes());
        }
        for (usage, api_slot, start_register) in &self.slots {
            blob.extend_from_slice(&[usage.to_u8(), *api_slot, *start_register, 0]);
        }
        for i in 0..MASK_DWORDS {
            blob.extend_from_slice(&(0x8000_0000u32 | i as u32).to_le_bytes());
        }

        let code_len = (self.code.len() * 4) as u32;
        let packed: u32 = 0x1 // pssl_or_cg
            | (self.binary_type as u32) << 2
            | code_len << 8;

        let mut header = Vec::with_capacity(28);
        header.extend_from_slice(SHADER_BINARY_SIGNATURE);
        header.push(1); // version
        header.extend_from_slice(&packed.to_le_bytes());
        header.push(MASK_DWORDS); // chunk_usage_base_offset_in_dw
        header.push(self.slots.len() as u8);
        header.extend_from_slice(&0u16.to_le_bytes()); // flags
        header.extend_from_slice(&self.hash0.to_le_bytes());
        header.extend_from_slice(&self.hash1.to_le_bytes());

        // crc32 over the code stream plus the header up to this field.
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&blob[..code_len as usize]);
        hasher.update(&header);
        header.extend_from_slice(&hasher.finalize().to_le_bytes());

        blob.extend_from_slice(&header);
        blob
    }
}
