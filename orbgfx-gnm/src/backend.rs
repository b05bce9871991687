//! Trait boundary to the native graphics backend.
//!
//! The interpreter and driver never talk to a concrete graphics API;
//! they record intent through these traits. Handles are opaque 64-bit
//! tokens minted by the backend, valid until the matching destroy call.

use std::sync::Arc;

use orbgfx_pssl::PsslKey;

use crate::error::NativeError;
use crate::render_target::{AttachmentView, MAX_RENDER_TARGETS};

macro_rules! handle_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub u64);
    };
}

handle_type!(RenderPassHandle);
handle_type!(FramebufferHandle);
handle_type!(ImageViewHandle);
handle_type!(SemaphoreHandle);
handle_type!(FenceHandle);
handle_type!(CommandBufferHandle);

/// Pixel format of an image attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    #[default]
    Unknown,
    B8G8R8A8Unorm,
    R8G8B8A8Unorm,
    R16G16B16A16Float,
    D32Float,
    D24UnormS8Uint,
}

/// Layout an attachment is expected to be in while rendered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageLayout {
    #[default]
    Undefined,
    General,
    ColorAttachmentOptimal,
    DepthStencilAttachmentOptimal,
    PresentSrc,
}

/// Format and layout of one attachment slot within a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentFormat {
    pub format: ImageFormat,
    pub layout: ImageLayout,
}

/// Per-slot format description a render pass is created from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPassFormat {
    pub sample_count: u32,
    pub color: [Option<AttachmentFormat>; MAX_RENDER_TARGETS],
    pub depth: Option<AttachmentFormat>,
}

impl Default for RenderPassFormat {
    fn default() -> Self {
        Self { sample_count: 1, color: [None; MAX_RENDER_TARGETS], depth: None }
    }
}

/// Everything the backend needs to create a framebuffer: a compatible
/// render pass plus the packed attachment views and dimensions.
#[derive(Debug, Clone, Copy)]
pub struct FramebufferDescriptor<'a> {
    pub render_pass: RenderPassHandle,
    pub attachments: &'a [ImageViewHandle],
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

/// Pipeline stage a queue submission waits at before consuming its
/// wait semaphore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    TopOfPipe,
    ColorAttachmentOutput,
    BottomOfPipe,
}

/// One queue submission: a finished command buffer fenced in between an
/// acquire semaphore and a present semaphore.
#[derive(Debug, Clone, Copy)]
pub struct SubmitInfo {
    pub command_buffer: CommandBufferHandle,
    pub wait_semaphore: SemaphoreHandle,
    pub wait_stage: PipelineStage,
    pub signal_semaphore: SemaphoreHandle,
}

#[derive(Debug, Clone, Copy)]
pub struct PresentInfo {
    pub wait_semaphore: SemaphoreHandle,
    pub image_index: u32,
}

/// Index element width for indexed draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexType {
    #[default]
    U16,
    U32,
}

/// Viewport rectangle with depth range, in framebuffer coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Device-level operations: object lifetime, queue submission and
/// presentation. Implemented once per native API.
pub trait GraphicsDevice {
    fn create_render_pass(&self, format: &RenderPassFormat) -> Result<RenderPassHandle, NativeError>;
    fn create_framebuffer(
        &self,
        desc: &FramebufferDescriptor<'_>,
    ) -> Result<FramebufferHandle, NativeError>;
    fn destroy_framebuffer(&self, handle: FramebufferHandle);

    fn create_semaphore(&self) -> Result<SemaphoreHandle, NativeError>;
    fn destroy_semaphore(&self, handle: SemaphoreHandle);

    /// Fences start signaled so the first frame of each sync slot does
    /// not block on work that was never submitted.
    fn create_fence_signaled(&self) -> Result<FenceHandle, NativeError>;
    fn destroy_fence(&self, handle: FenceHandle);
    /// Blocks without timeout until the fence signals.
    fn wait_for_fence(&self, handle: FenceHandle);
    fn reset_fence(&self, handle: FenceHandle);

    fn create_recorder(&self) -> Box<dyn CommandRecorder>;

    fn acquire_next_image(&self, signal: SemaphoreHandle) -> Result<u32, NativeError>;
    fn submit(&self, info: &SubmitInfo, fence: FenceHandle) -> Result<(), NativeError>;
    fn present(&self, info: &PresentInfo) -> Result<(), NativeError>;
}

/// The display/swapchain surface the driver presents to.
pub trait VideoOut {
    /// Pump windowing events; called from `submit_done`.
    fn process_events(&mut self);
    fn surface_extent(&self) -> (u32, u32);
    fn swapchain_format(&self) -> ImageFormat;
    fn swapchain_image_count(&self) -> u32;
    fn swapchain_image_view(&self, index: u32) -> Arc<AttachmentView>;
}

/// Records translated drawing commands for one frame. `finish` seals
/// the recording and hands back the backend's command buffer.
pub trait CommandRecorder {
    fn begin_render_pass(
        &mut self,
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        render_area: (u32, u32),
    );
    fn end_render_pass(&mut self);

    /// Binds the graphics pipeline for the given shader pair; the
    /// backend resolves the keys against its pipeline cache.
    fn bind_pipeline(&mut self, vs: Option<PsslKey>, ps: Option<PsslKey>);
    fn bind_compute_pipeline(&mut self, cs: Option<PsslKey>);
    fn set_viewport(&mut self, viewport: &Viewport);
    fn set_scissor(&mut self, rect: &ScissorRect);
    fn bind_index_buffer(&mut self, address: u64, index_type: IndexType);

    fn draw(&mut self, vertex_count: u32, instance_count: u32);
    fn draw_indexed(&mut self, index_count: u32, instance_count: u32);
    fn dispatch(&mut self, group_x: u32, group_y: u32, group_z: u32);
    /// Full barrier; stands in for the stream's cache/sync packets.
    fn pipeline_barrier(&mut self);

    fn finish(&mut self) -> CommandBufferHandle;
    /// Discards everything recorded since the last `finish`. Invoked
    /// when a submission aborts mid-stream so the next frame on the
    /// same recorder starts clean.
    fn abort(&mut self);
}
