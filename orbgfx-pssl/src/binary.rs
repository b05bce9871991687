//! Shader binary locator.
//!
//! PSSL shader binaries embed a fixed-size `ShaderBinaryInfo` record inside
//! the raw code stream, identified by the 7-byte `OrbShdr` signature. The
//! record is preceded in memory by a usage-mask table, which is itself
//! preceded by the input-usage slot table:
//!
//! ```text
//! [ code dwords ... ][ input usage slots ][ usage masks ][ header ] ...
//!                    ^ header_off - chunk*4 - slots*4    ^ signature match
//! ```
//!
//! Everything here treats the buffer as untrusted: fields are read through
//! a bounds-checked cursor and every derived table address is range-checked
//! against the buffer before it is dereferenced.

use crate::error::ShaderError;

/// Signature identifying the embedded binary-info record.
pub const SHADER_BINARY_SIGNATURE: &[u8; 7] = b"OrbShdr";

/// Upper bound on the byte-by-byte signature scan (5 MiB).
pub const SHADER_BINARY_SEARCH_MAX: usize = 1024 * 1024 * 5;

/// Size of the serialized `ShaderBinaryInfo` record in bytes.
pub const SHADER_BINARY_HEADER_SIZE: usize = 28;

/// Sanity limit on the slot table; the hardware exposes at most 16 user
/// data registers, so anything past 32 is garbage.
pub const MAX_INPUT_USAGE_SLOTS: usize = 32;

/// Bounds-checked little-endian field reader over an untrusted buffer.
struct ByteReader<'a> {
    buf: &'a [u8],
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8], ShaderError> {
        self.buf
            .get(offset..offset.checked_add(len).ok_or_else(|| {
                ShaderError::malformed(format!("field offset overflow at {offset}"))
            })?)
            .ok_or_else(|| {
                ShaderError::malformed(format!(
                    "field at [{offset}, {}) exceeds buffer of {} bytes",
                    offset + len,
                    self.buf.len()
                ))
            })
    }

    fn read_u8(&self, offset: usize) -> Result<u8, ShaderError> {
        Ok(self.bytes(offset, 1)?[0])
    }

    fn read_u16(&self, offset: usize) -> Result<u16, ShaderError> {
        let b = self.bytes(offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&self, offset: usize) -> Result<u32, ShaderError> {
        let b = self.bytes(offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Raw shader binary type values as emitted by the platform toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BinaryType {
    Ps = 0,
    VsVs = 1,
    VsEs = 2,
    Gs = 3,
    VsLs = 4,
    Hs = 5,
    DsVs = 6,
    Cs = 7,
}

impl BinaryType {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Ps),
            1 => Some(Self::VsVs),
            2 => Some(Self::VsEs),
            3 => Some(Self::Gs),
            4 => Some(Self::VsLs),
            5 => Some(Self::Hs),
            6 => Some(Self::DsVs),
            7 => Some(Self::Cs),
            _ => None,
        }
    }
}

/// Shader stage classification exposed to the pipeline backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Pixel,
    Vertex,
    Compute,
    Geometry,
    Hull,
    Domain,
}

impl ShaderStage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pixel => "pixel",
            Self::Vertex => "vertex",
            Self::Compute => "compute",
            Self::Geometry => "geometry",
            Self::Hull => "hull",
            Self::Domain => "domain",
        }
    }
}

/// Identity of a compiled shader: the content-hash pair from the header.
///
/// Two shaders with equal keys are assumed bit-identical, so the key is
/// usable for deduplicating compiled artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PsslKey {
    pub crc32: u32,
    pub hash: u64,
}

/// Fixed-size binary-info record, decoded field by field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderBinaryHeader {
    pub version: u8,
    pub is_pssl: bool,
    pub cached: bool,
    /// Raw binary type value (see [`BinaryType`]).
    pub binary_type: u8,
    pub source_type: u8,
    /// Code length in bytes; does not include the header or its tables.
    pub length: u32,
    /// Distance from the header back to the usage-mask table, in dwords.
    pub chunk_usage_base_offset_in_dw: u8,
    pub num_input_usage_slots: u8,
    pub flags: u16,
    pub shader_hash0: u32,
    pub shader_hash1: u32,
    pub crc32: u32,
}

impl ShaderBinaryHeader {
    /// Decode the record at `offset`; the signature must already have been
    /// matched there.
    fn parse(reader: &ByteReader<'_>, offset: usize) -> Result<Self, ShaderError> {
        let packed = reader.read_u32(offset + 8)?;
        Ok(Self {
            version: reader.read_u8(offset + 7)?,
            is_pssl: packed & 0x1 != 0,
            cached: packed & 0x2 != 0,
            binary_type: ((packed >> 2) & 0xF) as u8,
            source_type: ((packed >> 6) & 0x3) as u8,
            length: packed >> 8,
            chunk_usage_base_offset_in_dw: reader.read_u8(offset + 12)?,
            num_input_usage_slots: reader.read_u8(offset + 13)?,
            flags: reader.read_u16(offset + 14)?,
            shader_hash0: reader.read_u32(offset + 16)?,
            shader_hash1: reader.read_u32(offset + 20)?,
            crc32: reader.read_u32(offset + 24)?,
        })
    }
}

/// Resource-binding usage types from the platform shader ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageType {
    ImmResource,
    ImmSampler,
    ImmConstBuffer,
    ImmVertexBuffer,
    ImmRwResource,
    ImmAluFloatConst,
    ImmAluBool32Const,
    ImmGdsCounterRange,
    ImmGdsMemoryRange,
    ImmGwsBase,
    ImmShaderResourceTable,
    ImmLdsEsGsSize,
    /// Pointer to a fetch shader; its presence marks the owning program as
    /// having externally described vertex inputs.
    SubPtrFetchShader,
    PtrResourceTable,
    PtrInternalResourceTable,
    PtrSamplerTable,
    PtrConstBufferTable,
    PtrVertexBufferTable,
    PtrSoBufferTable,
    PtrRwResourceTable,
    PtrInternalGlobalTable,
    PtrExtendedUserData,
    PtrIndirectResourceTable,
    PtrIndirectInternalResourceTable,
    PtrIndirectRwResourceTable,
    Unknown(u8),
}

impl UsageType {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0x00 => Self::ImmResource,
            0x01 => Self::ImmSampler,
            0x02 => Self::ImmConstBuffer,
            0x03 => Self::ImmVertexBuffer,
            0x04 => Self::ImmRwResource,
            0x05 => Self::ImmAluFloatConst,
            0x06 => Self::ImmAluBool32Const,
            0x07 => Self::ImmGdsCounterRange,
            0x08 => Self::ImmGdsMemoryRange,
            0x09 => Self::ImmGwsBase,
            0x0A => Self::ImmShaderResourceTable,
            0x0D => Self::ImmLdsEsGsSize,
            0x12 => Self::SubPtrFetchShader,
            0x13 => Self::PtrResourceTable,
            0x14 => Self::PtrInternalResourceTable,
            0x15 => Self::PtrSamplerTable,
            0x16 => Self::PtrConstBufferTable,
            0x17 => Self::PtrVertexBufferTable,
            0x18 => Self::PtrSoBufferTable,
            0x19 => Self::PtrRwResourceTable,
            0x1A => Self::PtrInternalGlobalTable,
            0x1B => Self::PtrExtendedUserData,
            0x1C => Self::PtrIndirectResourceTable,
            0x1D => Self::PtrIndirectInternalResourceTable,
            0x1E => Self::PtrIndirectRwResourceTable,
            other => Self::Unknown(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::ImmResource => 0x00,
            Self::ImmSampler => 0x01,
            Self::ImmConstBuffer => 0x02,
            Self::ImmVertexBuffer => 0x03,
            Self::ImmRwResource => 0x04,
            Self::ImmAluFloatConst => 0x05,
            Self::ImmAluBool32Const => 0x06,
            Self::ImmGdsCounterRange => 0x07,
            Self::ImmGdsMemoryRange => 0x08,
            Self::ImmGwsBase => 0x09,
            Self::ImmShaderResourceTable => 0x0A,
            Self::ImmLdsEsGsSize => 0x0D,
            Self::SubPtrFetchShader => 0x12,
            Self::PtrResourceTable => 0x13,
            Self::PtrInternalResourceTable => 0x14,
            Self::PtrSamplerTable => 0x15,
            Self::PtrConstBufferTable => 0x16,
            Self::PtrVertexBufferTable => 0x17,
            Self::PtrSoBufferTable => 0x18,
            Self::PtrRwResourceTable => 0x19,
            Self::PtrInternalGlobalTable => 0x1A,
            Self::PtrExtendedUserData => 0x1B,
            Self::PtrIndirectResourceTable => 0x1C,
            Self::PtrIndirectInternalResourceTable => 0x1D,
            Self::PtrIndirectRwResourceTable => 0x1E,
            Self::Unknown(v) => v,
        }
    }
}

/// One resource binding slot. The sequence order of slots is the binding
/// index used by the native pipeline layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputUsageSlot {
    pub usage_type: UsageType,
    pub api_slot: u8,
    pub start_register: u8,
    pub extra: u8,
}

/// Introspection result for one shader binary: the located header plus the
/// owned, ordered copy of its input-usage slot table.
///
/// Constructed once per shader object by scanning; immutable thereafter.
#[derive(Debug, Clone)]
pub struct ProgramInfo {
    header: ShaderBinaryHeader,
    header_offset: usize,
    slots: Vec<InputUsageSlot>,
}

impl ProgramInfo {
    /// Scan `code` for the embedded binary-info record and recover the
    /// header and slot table.
    pub fn parse(code: &[u8]) -> Result<Self, ShaderError> {
        let searched = code.len().min(SHADER_BINARY_SEARCH_MAX);
        let header_offset = find_signature(&code[..searched])
            .ok_or(ShaderError::NotFound { searched })?;

        let reader = ByteReader::new(code);
        let header = ShaderBinaryHeader::parse(&reader, header_offset)?;
        validate_header(&header)?;

        // The usage-mask table sits `chunkUsageBaseOffsetInDW` dwords before
        // the header; the slot table sits immediately before the masks.
        // Both walks go backwards, so underflow means a corrupt header.
        let mask_offset = header_offset
            .checked_sub(header.chunk_usage_base_offset_in_dw as usize * 4)
            .ok_or_else(|| {
                ShaderError::malformed("usage-mask table offset precedes buffer start")
            })?;
        let slot_count = header.num_input_usage_slots as usize;
        let slots_offset = mask_offset.checked_sub(slot_count * 4).ok_or_else(|| {
            ShaderError::malformed("input-usage slot table offset precedes buffer start")
        })?;

        let mut slots = Vec::with_capacity(slot_count);
        for i in 0..slot_count {
            let base = slots_offset + i * 4;
            slots.push(InputUsageSlot {
                usage_type: UsageType::from_u8(reader.read_u8(base)?),
                api_slot: reader.read_u8(base + 1)?,
                start_register: reader.read_u8(base + 2)?,
                extra: reader.read_u8(base + 3)?,
            });
        }

        log::debug!(
            "located shader binary info at +{:#x}: type={} len={} slots={}",
            header_offset,
            header.binary_type,
            header.length,
            header.num_input_usage_slots
        );

        Ok(Self { header, header_offset, slots })
    }

    pub fn header(&self) -> &ShaderBinaryHeader {
        &self.header
    }

    /// Byte offset of the located header within the original buffer.
    pub fn header_offset(&self) -> usize {
        self.header_offset
    }

    pub fn code_size_bytes(&self) -> u32 {
        self.header.length
    }

    pub fn code_size_dwords(&self) -> u32 {
        self.header.length / 4
    }

    /// Stage classification. The two geometry-pipeline passthrough types
    /// (LS/ES) are recognized but unsupported and fail hard.
    pub fn stage(&self) -> Result<ShaderStage, ShaderError> {
        let ty = BinaryType::from_u8(self.header.binary_type).ok_or_else(|| {
            ShaderError::malformed(format!("unknown binary type {}", self.header.binary_type))
        })?;
        match ty {
            BinaryType::Ps => Ok(ShaderStage::Pixel),
            BinaryType::VsVs => Ok(ShaderStage::Vertex),
            BinaryType::Gs => Ok(ShaderStage::Geometry),
            BinaryType::Hs => Ok(ShaderStage::Hull),
            BinaryType::DsVs => Ok(ShaderStage::Domain),
            BinaryType::Cs => Ok(ShaderStage::Compute),
            BinaryType::VsEs => Err(ShaderError::UnsupportedStage("ES")),
            BinaryType::VsLs => Err(ShaderError::UnsupportedStage("LS")),
        }
    }

    /// Cache key for the compiled artifact.
    pub fn key(&self) -> PsslKey {
        PsslKey {
            crc32: self.header.crc32,
            hash: (self.header.shader_hash1 as u64) << 32 | self.header.shader_hash0 as u64,
        }
    }

    pub fn input_usage_slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn input_usage_slot(&self, idx: usize) -> Option<&InputUsageSlot> {
        self.slots.get(idx)
    }

    pub fn input_usage_slots(&self) -> &[InputUsageSlot] {
        &self.slots
    }

    /// True iff any slot carries a fetch-shader sub-pointer. First match
    /// wins; scan order is slot order.
    pub fn has_fetch_shader(&self) -> bool {
        self.slots
            .iter()
            .any(|s| s.usage_type == UsageType::SubPtrFetchShader)
    }

    /// User-data register holding the fetch-shader pointer, if any.
    pub fn fetch_shader_start_register(&self) -> Option<u8> {
        self.slots
            .iter()
            .find(|s| s.usage_type == UsageType::SubPtrFetchShader)
            .map(|s| s.start_register)
    }

    /// Advisory crc32 check over the code stream and the header prefix.
    /// A mismatch is logged but not fatal; some toolchains leave the field
    /// stale when post-processing binaries.
    pub fn verify_crc32(&self, code: &[u8]) -> bool {
        let code_len = (self.header.length as usize).min(code.len());
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&code[..code_len]);
        if let Some(prefix) = code.get(self.header_offset..self.header_offset + 24) {
            hasher.update(prefix);
        }
        let computed = hasher.finalize();
        if computed != self.header.crc32 {
            log::warn!(
                "shader crc32 mismatch: header says {:#010x}, computed {:#010x}",
                self.header.crc32,
                computed
            );
            return false;
        }
        true
    }
}

fn find_signature(buf: &[u8]) -> Option<usize> {
    if buf.len() < SHADER_BINARY_HEADER_SIZE {
        return None;
    }
    (0..=buf.len() - SHADER_BINARY_HEADER_SIZE)
        .find(|&i| &buf[i..i + SHADER_BINARY_SIGNATURE.len()] == SHADER_BINARY_SIGNATURE)
}

fn validate_header(header: &ShaderBinaryHeader) -> Result<(), ShaderError> {
    if header.length == 0 {
        return Err(ShaderError::malformed("zero code length"));
    }
    if header.length % 4 != 0 {
        return Err(ShaderError::malformed(format!(
            "code length {} is not dword aligned",
            header.length
        )));
    }
    if header.num_input_usage_slots as usize > MAX_INPUT_USAGE_SLOTS {
        return Err(ShaderError::malformed(format!(
            "input usage slot count {} exceeds maximum {}",
            header.num_input_usage_slots, MAX_INPUT_USAGE_SLOTS
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ShaderBinaryBuilder;

    #[test]
    fn locates_header_and_slots() {
        let code = [0xBEEF_0001u32, 0xBEEF_0002, 0xBF81_0000];
        let blob = ShaderBinaryBuilder::new(BinaryType::VsVs, &code)
            .slot(UsageType::ImmConstBuffer, 0, 4)
            .slot(UsageType::SubPtrFetchShader, 0, 2)
            .build();

        let info = ProgramInfo::parse(&blob).unwrap();
        assert_eq!(info.code_size_bytes(), 12);
        assert_eq!(info.code_size_dwords(), 3);
        assert_eq!(info.stage().unwrap(), ShaderStage::Vertex);
        assert_eq!(info.input_usage_slot_count(), 2);
        assert_eq!(
            info.input_usage_slot(0).unwrap().usage_type,
            UsageType::ImmConstBuffer
        );
        assert!(info.has_fetch_shader());
        assert_eq!(info.fetch_shader_start_register(), Some(2));
    }

    #[test]
    fn header_fields_match_raw_bytes() {
        let code = [0u32; 4];
        let blob = ShaderBinaryBuilder::new(BinaryType::Ps, &code)
            .hashes(0x1111_2222, 0x3333_4444)
            .build();
        let info = ProgramInfo::parse(&blob).unwrap();

        let off = info.header_offset();
        assert_eq!(&blob[off..off + 7], SHADER_BINARY_SIGNATURE);
        let packed = u32::from_le_bytes(blob[off + 8..off + 12].try_into().unwrap());
        assert_eq!(packed >> 8, info.header().length);
        assert_eq!((packed >> 2) & 0xF, info.header().binary_type as u32);
        assert_eq!(blob[off + 13], info.header().num_input_usage_slots);
        assert_eq!(
            info.key(),
            PsslKey { crc32: info.header().crc32, hash: 0x3333_4444_1111_2222 }
        );
    }

    #[test]
    fn missing_signature_is_not_found() {
        let blob = vec![0u8; 4096];
        match ProgramInfo::parse(&blob) {
            Err(ShaderError::NotFound { searched }) => assert_eq!(searched, 4096),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn empty_slot_list_has_no_fetch_shader() {
        let blob = ShaderBinaryBuilder::new(BinaryType::Ps, &[0u32; 2]).build();
        let info = ProgramInfo::parse(&blob).unwrap();
        assert_eq!(info.input_usage_slot_count(), 0);
        assert!(!info.has_fetch_shader());
    }

    #[test]
    fn slot_table_outside_buffer_is_malformed() {
        // A slot count large enough to walk the table off the front of the
        // buffer must be rejected before any read happens.
        let mut blob = ShaderBinaryBuilder::new(BinaryType::Ps, &[0u32; 2]).build();
        let off = ProgramInfo::parse(&blob).unwrap().header_offset();
        blob[off + 13] = 31; // num_input_usage_slots
        match ProgramInfo::parse(&blob) {
            Err(ShaderError::MalformedHeader { .. }) => {}
            other => panic!("expected MalformedHeader, got {other:?}"),
        }
    }

    #[test]
    fn zero_length_is_malformed() {
        let mut blob = ShaderBinaryBuilder::new(BinaryType::Ps, &[0u32; 2]).build();
        let off = ProgramInfo::parse(&blob).unwrap().header_offset();
        // Clear the 24-bit length field, keeping the low flag bits.
        let mut packed = u32::from_le_bytes(blob[off + 8..off + 12].try_into().unwrap());
        packed &= 0xFF;
        blob[off + 8..off + 12].copy_from_slice(&packed.to_le_bytes());
        assert!(matches!(
            ProgramInfo::parse(&blob),
            Err(ShaderError::MalformedHeader { .. })
        ));
    }

    #[test]
    fn ls_es_stages_are_unsupported() {
        let blob = ShaderBinaryBuilder::new(BinaryType::VsLs, &[0u32; 2]).build();
        let info = ProgramInfo::parse(&blob).unwrap();
        assert_eq!(info.stage(), Err(ShaderError::UnsupportedStage("LS")));
    }

    #[test]
    fn crc32_round_trips_through_builder() {
        let blob = ShaderBinaryBuilder::new(BinaryType::Ps, &[0xDEAD_BEEFu32; 8]).build();
        let info = ProgramInfo::parse(&blob).unwrap();
        assert!(info.verify_crc32(&blob));
    }
}
