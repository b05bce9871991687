//! Command-stream interpreter.
//!
//! Walks the draw and constant command buffers of a submission packet
//! by packet, replays register writes into the [`GnmContext`] shadow
//! state, and emits translated calls on a [`CommandRecorder`]. Streams
//! are interpreted strictly in order; the first malformed packet aborts
//! the whole submission.

use orbgfx_pssl::PsslKey;

use crate::backend::{
    CommandBufferHandle, CommandRecorder, FramebufferHandle, IndexType, RenderPassHandle,
};
use crate::context::{GnmContext, RegSpace};
use crate::error::GnmError;
use crate::pm4::{ItOpcode, Pm4Packet, Pm4Reader};

/// Stream hints embedded by the runtime inside NOP payloads. The first
/// payload dword carries the hint opcode; shader-binding hints follow
/// with the key material (crc32, hash low, hash high).
mod hint {
    pub const BASE: u32 = 0x6875_0000;
    pub const MASK: u32 = 0xFFFF_0000;
    pub const SET_VS_SHADER: u32 = BASE | 0x01;
    pub const SET_PS_SHADER: u32 = BASE | 0x02;
    pub const SET_CS_SHADER: u32 = BASE | 0x03;
}

/// Render pass and framebuffer the draw stream renders into; chosen by
/// the driver before interpretation starts.
#[derive(Debug, Clone, Copy)]
pub struct FrameBinding {
    pub render_pass: RenderPassHandle,
    pub framebuffer: FramebufferHandle,
    pub render_area: (u32, u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    /// Constant command buffer: state setup only, draws are malformed.
    Constant,
    Draw,
}

impl StreamKind {
    fn label(self) -> &'static str {
        match self {
            Self::Constant => "constant",
            Self::Draw => "draw",
        }
    }
}

/// One interpreter instance per display buffer slot; carries its shadow
/// context across frames.
pub struct CommandParser {
    context: GnmContext,
    recorder: Box<dyn CommandRecorder>,
}

impl CommandParser {
    pub fn new(context: GnmContext, recorder: Box<dyn CommandRecorder>) -> Self {
        Self { context, recorder }
    }

    pub fn context(&self) -> &GnmContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut GnmContext {
        &mut self.context
    }

    /// Interprets one submission. The constant buffer runs first so its
    /// state is visible to the draw buffer, then the draw buffer runs
    /// inside the bound render pass.
    ///
    /// On failure the partial recording is discarded; the parser and its
    /// recorder are reusable for the next submission.
    pub fn process(
        &mut self,
        dcb: &[u32],
        ccb: Option<&[u32]>,
        binding: &FrameBinding,
    ) -> Result<CommandBufferHandle, GnmError> {
        match self.record(dcb, ccb, binding) {
            Ok(command_buffer) => Ok(command_buffer),
            Err(err) => {
                self.recorder.abort();
                Err(err)
            }
        }
    }

    fn record(
        &mut self,
        dcb: &[u32],
        ccb: Option<&[u32]>,
        binding: &FrameBinding,
    ) -> Result<CommandBufferHandle, GnmError> {
        if let Some(ccb) = ccb {
            self.run(ccb, StreamKind::Constant)?;
        }
        self.recorder
            .begin_render_pass(binding.render_pass, binding.framebuffer, binding.render_area);
        self.run(dcb, StreamKind::Draw)?;
        self.recorder.end_render_pass();
        Ok(self.recorder.finish())
    }

    fn run(&mut self, words: &[u32], kind: StreamKind) -> Result<(), GnmError> {
        let mut reader = Pm4Reader::new(words);
        loop {
            let offset = reader.offset();
            let Some(packet) = reader.next() else { break };
            match packet? {
                Pm4Packet::Type2 => {}
                Pm4Packet::Type0 { base_reg, payload } => {
                    // Legacy encoding; GNM streams do not use it for
                    // anything the shadow state tracks.
                    log::debug!(
                        "ignoring type-0 write of {} dwords at reg {base_reg:#x}",
                        payload.len()
                    );
                }
                Pm4Packet::Type3 { opcode, payload } => {
                    self.exec(offset, opcode, payload, kind)?;
                }
            }
        }
        Ok(())
    }

    fn exec(
        &mut self,
        offset: usize,
        opcode: u8,
        payload: &[u32],
        kind: StreamKind,
    ) -> Result<(), GnmError> {
        let op = ItOpcode::from_u8(opcode).ok_or_else(|| {
            GnmError::malformed(offset, format!("unrecognized type-3 opcode {opcode:#04x}"))
        })?;
        match op {
            ItOpcode::Nop => self.exec_nop(offset, payload)?,
            ItOpcode::ClearState => {
                log::debug!("clear_state");
                self.context.reset();
            }
            ItOpcode::ContextControl => {
                log::debug!("context_control: {payload:x?}");
            }
            ItOpcode::SetContextReg => {
                self.write_regs(offset, RegSpace::Context, payload)?;
            }
            ItOpcode::SetShReg => {
                self.write_regs(offset, RegSpace::Sh, payload)?;
            }
            ItOpcode::SetUconfigReg => {
                self.write_regs(offset, RegSpace::Uconfig, payload)?;
            }
            ItOpcode::IndexType => {
                let value = *payload.first().ok_or_else(|| {
                    GnmError::malformed(offset, "index_type packet without payload")
                })?;
                let index_type = if value & 1 == 0 { IndexType::U16 } else { IndexType::U32 };
                self.context.set_index_type(index_type);
            }
            ItOpcode::NumInstances => {
                let count = *payload.first().ok_or_else(|| {
                    GnmError::malformed(offset, "num_instances packet without payload")
                })?;
                self.context.set_num_instances(count);
            }
            ItOpcode::DrawIndexAuto => {
                self.require_draw(offset, kind, "draw_index_auto")?;
                let vertex_count = *payload.first().ok_or_else(|| {
                    GnmError::malformed(offset, "draw_index_auto packet without payload")
                })?;
                self.sync_draw_state();
                self.recorder.draw(vertex_count, self.context.num_instances());
                log::trace!("draw {vertex_count} vertices");
            }
            ItOpcode::DrawIndex2 => {
                self.require_draw(offset, kind, "draw_index_2")?;
                let &[_max_size, base_lo, base_hi, index_count, ..] = payload else {
                    return Err(GnmError::malformed(
                        offset,
                        format!("draw_index_2 payload of {} dwords (need 4)", payload.len()),
                    ));
                };
                let address = u64::from(base_lo) | (u64::from(base_hi) << 32);
                self.context.set_index_base(address);
                self.sync_draw_state();
                self.recorder.bind_index_buffer(address, self.context.index_type());
                self.recorder.draw_indexed(index_count, self.context.num_instances());
                log::trace!("draw {index_count} indices from {address:#x}");
            }
            ItOpcode::DispatchDirect => {
                self.require_draw(offset, kind, "dispatch_direct")?;
                let &[x, y, z, ..] = payload else {
                    return Err(GnmError::malformed(
                        offset,
                        format!("dispatch_direct payload of {} dwords (need 3)", payload.len()),
                    ));
                };
                self.recorder.bind_compute_pipeline(self.context.shaders().cs);
                self.recorder.dispatch(x, y, z);
                log::trace!("dispatch {x}x{y}x{z}");
            }
            ItOpcode::WaitRegMem
            | ItOpcode::EventWrite
            | ItOpcode::EventWriteEop
            | ItOpcode::AcquireMem => {
                // Collapsed to a full barrier; fine-grained GPU sync is
                // invisible behind a serialized submission model.
                if kind == StreamKind::Draw {
                    self.recorder.pipeline_barrier();
                }
            }
            ItOpcode::IndirectBuffer => {
                return Err(GnmError::malformed(
                    offset,
                    "nested indirect command buffers not supported",
                ));
            }
        }
        Ok(())
    }

    fn exec_nop(&mut self, offset: usize, payload: &[u32]) -> Result<(), GnmError> {
        let Some(&first) = payload.first() else { return Ok(()) };
        if first & hint::MASK != hint::BASE {
            return Ok(());
        }
        match first {
            hint::SET_VS_SHADER | hint::SET_PS_SHADER | hint::SET_CS_SHADER => {
                let &[_, crc32, hash_lo, hash_hi] = payload else {
                    return Err(GnmError::malformed(
                        offset,
                        "shader hint without key material",
                    ));
                };
                let key = PsslKey {
                    crc32,
                    hash: u64::from(hash_lo) | (u64::from(hash_hi) << 32),
                };
                let shaders = self.context.shaders_mut();
                match first {
                    hint::SET_VS_SHADER => shaders.vs = Some(key),
                    hint::SET_PS_SHADER => shaders.ps = Some(key),
                    _ => shaders.cs = Some(key),
                }
                log::debug!("shader hint {first:#x}: key {key:?}");
            }
            other => {
                log::debug!("ignoring unknown stream hint {other:#x}");
            }
        }
        Ok(())
    }

    fn write_regs(
        &mut self,
        offset: usize,
        space: RegSpace,
        payload: &[u32],
    ) -> Result<(), GnmError> {
        let (&base, values) = payload.split_first().ok_or_else(|| {
            GnmError::malformed(offset, "register write packet without offset dword")
        })?;
        let base = (base & 0xFFFF) as usize;
        for (i, &value) in values.iter().enumerate() {
            if !self.context.write_reg(space, base + i, value) {
                return Err(GnmError::malformed(
                    offset,
                    format!("register offset {:#x} out of range for {space:?}", base + i),
                ));
            }
        }
        Ok(())
    }

    fn require_draw(
        &self,
        offset: usize,
        kind: StreamKind,
        what: &str,
    ) -> Result<(), GnmError> {
        if kind == StreamKind::Draw {
            Ok(())
        } else {
            Err(GnmError::malformed(
                offset,
                format!("{what} packet in {} command buffer", kind.label()),
            ))
        }
    }

    /// Pushes the context-derived dynamic state ahead of a graphics
    /// draw.
    fn sync_draw_state(&mut self) {
        let shaders = *self.context.shaders();
        self.recorder.bind_pipeline(shaders.vs, shaders.ps);
        self.recorder.set_viewport(&self.context.viewport());
        self.recorder.set_scissor(&self.context.scissor());
    }
}
