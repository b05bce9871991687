//! Submission driver.
//!
//! The outermost surface of the crate: owns the backend device, the
//! video-out surface, the per-display-buffer interpreters and the frame
//! orchestrator, and exposes the console-style submit entry points that
//! return [`SubmitStatus`] codes instead of typed errors.

use std::sync::Arc;

use orbgfx_pssl::cache::ShaderCache;

use crate::backend::{
    AttachmentFormat, GraphicsDevice, ImageLayout, RenderPassFormat, RenderPassHandle, VideoOut,
};
use crate::context::GnmContext;
use crate::error::{GnmError, SubmitStatus};
use crate::frame::{FrameOrchestrator, MAX_FRAMES_IN_FLIGHT};
use crate::framebuffer::Framebuffer;
use crate::interpreter::{CommandParser, FrameBinding};
use crate::render_target::{Attachment, FramebufferSize, RenderTargets};

/// Handle of the main video output.
pub const VIDEO_HANDLE_MAIN: u32 = 1;

/// One submission: a draw command buffer plus an optional constant
/// command buffer that runs ahead of it.
#[derive(Debug, Clone, Copy)]
pub struct Submission<'a> {
    pub dcb: &'a [u32],
    pub ccb: Option<&'a [u32]>,
}

pub struct GnmDriver {
    device: Arc<dyn GraphicsDevice>,
    video_out: Box<dyn VideoOut>,
    orchestrator: FrameOrchestrator,
    shader_cache: ShaderCache,
    render_pass: Option<RenderPassHandle>,
    framebuffers: Vec<Framebuffer>,
    parsers: Vec<CommandParser>,
}

impl GnmDriver {
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        video_out: Box<dyn VideoOut>,
    ) -> Result<Self, GnmError> {
        let orchestrator = FrameOrchestrator::new(Arc::clone(&device), MAX_FRAMES_IN_FLIGHT)?;
        Ok(Self {
            device,
            video_out,
            orchestrator,
            shader_cache: ShaderCache::new(),
            render_pass: None,
            framebuffers: Vec::new(),
            parsers: Vec::new(),
        })
    }

    /// Creates the presentation render pass, one framebuffer per
    /// swapchain image and one interpreter per display buffer.
    pub fn init(&mut self, buffer_count: usize) -> Result<(), GnmError> {
        let extent = self.video_out.surface_extent();

        let mut format = RenderPassFormat::default();
        format.color[0] = Some(AttachmentFormat {
            format: self.video_out.swapchain_format(),
            layout: ImageLayout::ColorAttachmentOptimal,
        });
        let render_pass = self.device.create_render_pass(&format).map_err(GnmError::Native)?;
        self.render_pass = Some(render_pass);

        let default_size = FramebufferSize { width: extent.0, height: extent.1, layers: 1 };
        self.framebuffers.clear();
        for index in 0..self.video_out.swapchain_image_count() {
            let view = self.video_out.swapchain_image_view(index);
            let mut targets = RenderTargets::default();
            targets.color[0] = Attachment::bound(view, ImageLayout::ColorAttachmentOptimal);
            self.framebuffers.push(Framebuffer::new(
                Arc::clone(&self.device),
                &targets,
                Some(render_pass),
                default_size,
            )?);
        }

        self.parsers.clear();
        for _ in 0..buffer_count {
            self.parsers
                .push(CommandParser::new(GnmContext::new(extent), self.device.create_recorder()));
        }
        log::info!(
            "driver initialized: {}x{}, {} swapchain images, {buffer_count} display buffers",
            extent.0,
            extent.1,
            self.framebuffers.len()
        );
        Ok(())
    }

    pub fn shader_cache(&self) -> &ShaderCache {
        &self.shader_cache
    }

    pub fn shader_cache_mut(&mut self) -> &mut ShaderCache {
        &mut self.shader_cache
    }

    pub fn frame_count(&self) -> u64 {
        self.orchestrator.frame_count()
    }

    pub fn sync_slot_index(&self) -> usize {
        self.orchestrator.slot_index()
    }

    /// Submit without an explicit flip request; renders into display
    /// buffer 0.
    pub fn submit_command_buffers(&mut self, submissions: &[Submission<'_>]) -> SubmitStatus {
        self.submit_and_flip_command_buffers(submissions, VIDEO_HANDLE_MAIN, 0, 0, 0)
    }

    /// Console-style combined submit-and-flip. Exactly one submission
    /// per call is supported; anything else is rejected before any
    /// interpreter or backend work, so a failed call has no GPU-visible
    /// side effect.
    pub fn submit_and_flip_command_buffers(
        &mut self,
        submissions: &[Submission<'_>],
        video_handle: u32,
        display_buffer_index: usize,
        flip_mode: u32,
        flip_arg: i64,
    ) -> SubmitStatus {
        if video_handle != VIDEO_HANDLE_MAIN {
            log::error!("submit to unknown video handle {video_handle}");
            return SubmitStatus::ErrorUnknown;
        }
        log::trace!(
            "submit: {} pair(s), buffer {display_buffer_index}, flip mode {flip_mode}, arg {flip_arg}",
            submissions.len()
        );
        match self.submit_inner(submissions, display_buffer_index) {
            Ok(()) => SubmitStatus::Ok,
            Err(err) => {
                log::error!("submission failed: {err}");
                SubmitStatus::ErrorUnknown
            }
        }
    }

    fn submit_inner(
        &mut self,
        submissions: &[Submission<'_>],
        display_buffer_index: usize,
    ) -> Result<(), GnmError> {
        // Serialized submission model: one dcb/ccb pair per call.
        if submissions.len() != 1 {
            return Err(GnmError::UnsupportedBatch { count: submissions.len() });
        }
        let submission = &submissions[0];

        let render_pass = self.render_pass.ok_or(GnmError::NoRenderPass)?;
        if display_buffer_index >= self.parsers.len() {
            return Err(GnmError::InvalidBufferIndex {
                index: display_buffer_index,
                count: self.parsers.len(),
            });
        }

        // Acquire before recording so the frame renders into the
        // framebuffer of the image that will actually be presented.
        let image_index = self.orchestrator.begin_frame()?;
        let framebuffer = self
            .framebuffers
            .get(image_index as usize)
            .ok_or(GnmError::NoRenderPass)?;
        let binding = FrameBinding {
            render_pass,
            framebuffer: framebuffer.handle(),
            render_area: framebuffer.render_area(),
        };

        let parser = &mut self.parsers[display_buffer_index];
        let command_buffer = parser.process(submission.dcb, submission.ccb, &binding)?;
        self.orchestrator.submit_and_present(command_buffer, image_index)
    }

    /// End-of-frame housekeeping: pumps video-out events.
    pub fn submit_done(&mut self) -> SubmitStatus {
        self.video_out.process_events();
        SubmitStatus::Ok
    }
}
