//! Shadowed GPU register state.
//!
//! The interpreter replays register writes from the command stream into
//! these shadow files and derives dynamic pipeline state (viewport,
//! scissor, index format, instancing) from them on demand at draw time.

use orbgfx_pssl::PsslKey;

use crate::backend::{IndexType, ScissorRect, Viewport};

/// Size of each shadowed register file, in dword registers relative to
/// the file's base.
pub const REG_SPACE_DWORDS: usize = 0x400;

/// Context register offsets the state derivation reads.
pub mod ctx_reg {
    pub const PA_SC_WINDOW_SCISSOR_TL: usize = 0x081;
    pub const PA_SC_WINDOW_SCISSOR_BR: usize = 0x082;
    pub const PA_CL_VPORT_XSCALE: usize = 0x10F;
    pub const PA_CL_VPORT_XOFFSET: usize = 0x110;
    pub const PA_CL_VPORT_YSCALE: usize = 0x111;
    pub const PA_CL_VPORT_YOFFSET: usize = 0x112;
    pub const PA_CL_VPORT_ZSCALE: usize = 0x113;
    pub const PA_CL_VPORT_ZOFFSET: usize = 0x114;
}

/// The register spaces reachable through SET_*_REG packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegSpace {
    Context,
    Sh,
    Uconfig,
}

/// Per-stage shader bindings announced through stream hints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShaderBindings {
    pub vs: Option<PsslKey>,
    pub ps: Option<PsslKey>,
    pub cs: Option<PsslKey>,
}

pub struct GnmContext {
    context_regs: Vec<u32>,
    sh_regs: Vec<u32>,
    uconfig_regs: Vec<u32>,
    index_type: IndexType,
    index_base: u64,
    num_instances: u32,
    shaders: ShaderBindings,
    default_extent: (u32, u32),
}

impl GnmContext {
    pub fn new(default_extent: (u32, u32)) -> Self {
        Self {
            context_regs: vec![0; REG_SPACE_DWORDS],
            sh_regs: vec![0; REG_SPACE_DWORDS],
            uconfig_regs: vec![0; REG_SPACE_DWORDS],
            index_type: IndexType::default(),
            index_base: 0,
            num_instances: 1,
            shaders: ShaderBindings::default(),
            default_extent,
        }
    }

    /// Returns to the power-on state; used between frames and for
    /// CLEAR_STATE packets.
    pub fn reset(&mut self) {
        self.context_regs.fill(0);
        self.sh_regs.fill(0);
        self.uconfig_regs.fill(0);
        self.index_type = IndexType::default();
        self.index_base = 0;
        self.num_instances = 1;
        self.shaders = ShaderBindings::default();
    }

    /// Writes one shadow register. `false` when the offset falls
    /// outside the register file.
    pub fn write_reg(&mut self, space: RegSpace, offset: usize, value: u32) -> bool {
        let file = match space {
            RegSpace::Context => &mut self.context_regs,
            RegSpace::Sh => &mut self.sh_regs,
            RegSpace::Uconfig => &mut self.uconfig_regs,
        };
        match file.get_mut(offset) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn read_reg(&self, space: RegSpace, offset: usize) -> Option<u32> {
        let file = match space {
            RegSpace::Context => &self.context_regs,
            RegSpace::Sh => &self.sh_regs,
            RegSpace::Uconfig => &self.uconfig_regs,
        };
        file.get(offset).copied()
    }

    fn ctx_f32(&self, offset: usize) -> f32 {
        f32::from_bits(self.context_regs[offset])
    }

    /// Viewport derived from the PA_CL_VPORT transform registers. The
    /// hardware stores the transform as scale/offset pairs; the
    /// rectangle form the backend wants is recovered from them. Falls
    /// back to the full surface when the registers were never written.
    pub fn viewport(&self) -> Viewport {
        let xscale = self.ctx_f32(ctx_reg::PA_CL_VPORT_XSCALE);
        let yscale = self.ctx_f32(ctx_reg::PA_CL_VPORT_YSCALE);
        if xscale == 0.0 || yscale == 0.0 {
            let (width, height) = self.default_extent;
            return Viewport {
                x: 0.0,
                y: 0.0,
                width: width as f32,
                height: height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
        }
        let xoffset = self.ctx_f32(ctx_reg::PA_CL_VPORT_XOFFSET);
        let yoffset = self.ctx_f32(ctx_reg::PA_CL_VPORT_YOFFSET);
        let zscale = self.ctx_f32(ctx_reg::PA_CL_VPORT_ZSCALE);
        let zoffset = self.ctx_f32(ctx_reg::PA_CL_VPORT_ZOFFSET);
        Viewport {
            x: xoffset - xscale,
            y: yoffset - yscale.abs(),
            width: 2.0 * xscale,
            height: 2.0 * yscale.abs(),
            min_depth: zoffset,
            max_depth: zoffset + zscale,
        }
    }

    /// Scissor rectangle from the PA_SC_WINDOW registers, TL/BR packed
    /// as x in the low and y in the high halfword. Falls back to the
    /// full surface when unset.
    pub fn scissor(&self) -> ScissorRect {
        let tl = self.context_regs[ctx_reg::PA_SC_WINDOW_SCISSOR_TL];
        let br = self.context_regs[ctx_reg::PA_SC_WINDOW_SCISSOR_BR];
        if br == 0 {
            let (width, height) = self.default_extent;
            return ScissorRect { x: 0, y: 0, width, height };
        }
        let (x0, y0) = (tl & 0x7FFF, (tl >> 16) & 0x7FFF);
        let (x1, y1) = (br & 0x7FFF, (br >> 16) & 0x7FFF);
        ScissorRect {
            x: x0,
            y: y0,
            width: x1.saturating_sub(x0),
            height: y1.saturating_sub(y0),
        }
    }

    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    pub fn set_index_type(&mut self, index_type: IndexType) {
        self.index_type = index_type;
    }

    pub fn index_base(&self) -> u64 {
        self.index_base
    }

    pub fn set_index_base(&mut self, address: u64) {
        self.index_base = address;
    }

    /// Instance count applied to subsequent draws; persists until the
    /// stream changes it again.
    pub fn num_instances(&self) -> u32 {
        self.num_instances
    }

    pub fn set_num_instances(&mut self, count: u32) {
        // Hardware treats zero as one.
        self.num_instances = count.max(1);
    }

    pub fn shaders(&self) -> &ShaderBindings {
        &self.shaders
    }

    pub fn shaders_mut(&mut self) -> &mut ShaderBindings {
        &mut self.shaders
    }

    pub fn default_extent(&self) -> (u32, u32) {
        self.default_extent
    }
}
