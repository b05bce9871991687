//! Mock backend recording every native call for inspection.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use orbgfx_gnm::backend::{
    CommandBufferHandle, CommandRecorder, FenceHandle, FramebufferDescriptor, FramebufferHandle,
    GraphicsDevice, ImageFormat, ImageViewHandle, IndexType, PresentInfo, RenderPassFormat,
    RenderPassHandle, ScissorRect, SemaphoreHandle, SubmitInfo, VideoOut, Viewport,
};
use orbgfx_gnm::error::NativeError;
use orbgfx_gnm::render_target::AttachmentView;
use orbgfx_pssl::PsslKey;

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    CreateRenderPass,
    CreateFramebuffer { attachments: Vec<ImageViewHandle>, width: u32, height: u32 },
    DestroyFramebuffer(FramebufferHandle),
    WaitFence(FenceHandle),
    ResetFence(FenceHandle),
    Acquire,
    Submit { command_buffer: CommandBufferHandle, fence: FenceHandle },
    Present { image_index: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    BeginRenderPass { render_pass: RenderPassHandle, framebuffer: FramebufferHandle },
    EndRenderPass,
    BindPipeline { vs: Option<PsslKey>, ps: Option<PsslKey> },
    BindComputePipeline { cs: Option<PsslKey> },
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    BindIndexBuffer { address: u64, index_type: IndexType },
    Draw { vertex_count: u32, instance_count: u32 },
    DrawIndexed { index_count: u32, instance_count: u32 },
    Dispatch { x: u32, y: u32, z: u32 },
    Barrier,
    Finish(CommandBufferHandle),
}

#[derive(Default)]
pub struct MockDevice {
    next_handle: AtomicU64,
    pub events: Mutex<Vec<DeviceEvent>>,
    pub recorded: Arc<Mutex<Vec<RecorderEvent>>>,
    /// Image indices handed out by `acquire_next_image`, front first;
    /// empty means index 0.
    pub next_images: Mutex<Vec<u32>>,
}

impl MockDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn next(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn recorded(&self) -> Vec<RecorderEvent> {
        self.recorded.lock().unwrap().clone()
    }

    fn push(&self, event: DeviceEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl GraphicsDevice for MockDevice {
    fn create_render_pass(
        &self,
        _format: &RenderPassFormat,
    ) -> Result<RenderPassHandle, NativeError> {
        self.push(DeviceEvent::CreateRenderPass);
        Ok(RenderPassHandle(self.next()))
    }

    fn create_framebuffer(
        &self,
        desc: &FramebufferDescriptor<'_>,
    ) -> Result<FramebufferHandle, NativeError> {
        self.push(DeviceEvent::CreateFramebuffer {
            attachments: desc.attachments.to_vec(),
            width: desc.width,
            height: desc.height,
        });
        Ok(FramebufferHandle(self.next()))
    }

    fn destroy_framebuffer(&self, handle: FramebufferHandle) {
        self.push(DeviceEvent::DestroyFramebuffer(handle));
    }

    fn create_semaphore(&self) -> Result<SemaphoreHandle, NativeError> {
        Ok(SemaphoreHandle(self.next()))
    }

    fn destroy_semaphore(&self, _handle: SemaphoreHandle) {}

    fn create_fence_signaled(&self) -> Result<FenceHandle, NativeError> {
        Ok(FenceHandle(self.next()))
    }

    fn destroy_fence(&self, _handle: FenceHandle) {}

    fn wait_for_fence(&self, handle: FenceHandle) {
        self.push(DeviceEvent::WaitFence(handle));
    }

    fn reset_fence(&self, handle: FenceHandle) {
        self.push(DeviceEvent::ResetFence(handle));
    }

    fn create_recorder(&self) -> Box<dyn CommandRecorder> {
        Box::new(MockRecorder {
            log: Arc::clone(&self.recorded),
            next_handle: CommandBufferHandle(self.next()),
        })
    }

    fn acquire_next_image(&self, _signal: SemaphoreHandle) -> Result<u32, NativeError> {
        self.push(DeviceEvent::Acquire);
        let mut queued = self.next_images.lock().unwrap();
        if queued.is_empty() {
            Ok(0)
        } else {
            Ok(queued.remove(0))
        }
    }

    fn submit(&self, info: &SubmitInfo, fence: FenceHandle) -> Result<(), NativeError> {
        self.push(DeviceEvent::Submit { command_buffer: info.command_buffer, fence });
        Ok(())
    }

    fn present(&self, info: &PresentInfo) -> Result<(), NativeError> {
        self.push(DeviceEvent::Present { image_index: info.image_index });
        Ok(())
    }
}

pub struct MockRecorder {
    log: Arc<Mutex<Vec<RecorderEvent>>>,
    next_handle: CommandBufferHandle,
}

impl MockRecorder {
    fn push(&self, event: RecorderEvent) {
        self.log.lock().unwrap().push(event);
    }
}

impl CommandRecorder for MockRecorder {
    fn begin_render_pass(
        &mut self,
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        _render_area: (u32, u32),
    ) {
        self.push(RecorderEvent::BeginRenderPass { render_pass, framebuffer });
    }

    fn end_render_pass(&mut self) {
        self.push(RecorderEvent::EndRenderPass);
    }

    fn bind_pipeline(&mut self, vs: Option<PsslKey>, ps: Option<PsslKey>) {
        self.push(RecorderEvent::BindPipeline { vs, ps });
    }

    fn bind_compute_pipeline(&mut self, cs: Option<PsslKey>) {
        self.push(RecorderEvent::BindComputePipeline { cs });
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.push(RecorderEvent::SetViewport(*viewport));
    }

    fn set_scissor(&mut self, rect: &ScissorRect) {
        self.push(RecorderEvent::SetScissor(*rect));
    }

    fn bind_index_buffer(&mut self, address: u64, index_type: IndexType) {
        self.push(RecorderEvent::BindIndexBuffer { address, index_type });
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        self.push(RecorderEvent::Draw { vertex_count, instance_count });
    }

    fn draw_indexed(&mut self, index_count: u32, instance_count: u32) {
        self.push(RecorderEvent::DrawIndexed { index_count, instance_count });
    }

    fn dispatch(&mut self, group_x: u32, group_y: u32, group_z: u32) {
        self.push(RecorderEvent::Dispatch { x: group_x, y: group_y, z: group_z });
    }

    fn pipeline_barrier(&mut self) {
        self.push(RecorderEvent::Barrier);
    }

    fn finish(&mut self) -> CommandBufferHandle {
        self.push(RecorderEvent::Finish(self.next_handle));
        self.next_handle
    }

    fn abort(&mut self) {
        // Drop everything since the last sealed recording, mirroring a
        // backend that resets its command buffer.
        let mut log = self.log.lock().unwrap();
        let keep = log
            .iter()
            .rposition(|event| matches!(event, RecorderEvent::Finish(_)))
            .map_or(0, |index| index + 1);
        log.truncate(keep);
    }
}

pub struct MockVideoOut {
    extent: (u32, u32),
    views: Vec<Arc<AttachmentView>>,
    pub events_pumped: Arc<AtomicU32>,
}

impl MockVideoOut {
    pub fn new(extent: (u32, u32), image_count: u32) -> Self {
        let views = (0..image_count)
            .map(|i| {
                Arc::new(AttachmentView::new(
                    ImageViewHandle(0x1000 + u64::from(i)),
                    ImageFormat::B8G8R8A8Unorm,
                    extent,
                    1,
                    1,
                ))
            })
            .collect();
        Self { extent, views, events_pumped: Arc::new(AtomicU32::new(0)) }
    }
}

impl VideoOut for MockVideoOut {
    fn process_events(&mut self) {
        self.events_pumped.fetch_add(1, Ordering::SeqCst);
    }

    fn surface_extent(&self) -> (u32, u32) {
        self.extent
    }

    fn swapchain_format(&self) -> ImageFormat {
        ImageFormat::B8G8R8A8Unorm
    }

    fn swapchain_image_count(&self) -> u32 {
        self.views.len() as u32
    }

    fn swapchain_image_view(&self, index: u32) -> Arc<AttachmentView> {
        Arc::clone(&self.views[index as usize])
    }
}
