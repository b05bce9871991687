//! Native framebuffer construction from aggregated render targets.
//!
//! Bound attachments are packed into a dense list (empty slots drop
//! out), handed to the backend, and the resulting native object is
//! owned here together with shared references to every view so no
//! attachment can be destroyed while the framebuffer is alive.

use std::sync::Arc;

use crate::backend::{FramebufferDescriptor, FramebufferHandle, GraphicsDevice, RenderPassHandle};
use crate::error::GnmError;
use crate::render_target::{AttachmentView, FramebufferSize, RenderTargets};

/// Which logical slot a packed attachment index came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentSlot {
    Color(usize),
    Depth,
}

pub struct Framebuffer {
    device: Arc<dyn GraphicsDevice>,
    handle: FramebufferHandle,
    render_pass: RenderPassHandle,
    size: FramebufferSize,
    // Keeps every attached view alive for the framebuffer's lifetime.
    attachments: Vec<Arc<AttachmentView>>,
    slot_map: Vec<AttachmentSlot>,
}

impl Framebuffer {
    /// Packs the bound attachments in slot order (color 0..7, then
    /// depth) and creates the native framebuffer. Fails with
    /// [`GnmError::NoRenderPass`] before any native call when no
    /// render pass is supplied.
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        targets: &RenderTargets,
        render_pass: Option<RenderPassHandle>,
        default_size: FramebufferSize,
    ) -> Result<Self, GnmError> {
        let render_pass = render_pass.ok_or(GnmError::NoRenderPass)?;
        let size = targets.compute_render_size(default_size);

        let mut attachments = Vec::new();
        let mut slot_map = Vec::new();
        for (slot, attachment) in targets.color.iter().enumerate() {
            if let Some(view) = &attachment.view {
                attachments.push(Arc::clone(view));
                slot_map.push(AttachmentSlot::Color(slot));
            }
        }
        if let Some(view) = &targets.depth.view {
            attachments.push(Arc::clone(view));
            slot_map.push(AttachmentSlot::Depth);
        }

        let handles: Vec<_> = attachments.iter().map(|view| view.handle()).collect();
        let handle = device
            .create_framebuffer(&FramebufferDescriptor {
                render_pass,
                attachments: &handles,
                width: size.width,
                height: size.height,
                layers: size.layers,
            })
            .map_err(GnmError::FramebufferCreationFailed)?;

        log::debug!(
            "created framebuffer {:?}: {}x{}x{}, {} attachments",
            handle,
            size.width,
            size.height,
            size.layers,
            attachments.len()
        );

        Ok(Self { device, handle, render_pass, size, attachments, slot_map })
    }

    pub fn handle(&self) -> FramebufferHandle {
        self.handle
    }

    pub fn render_pass(&self) -> RenderPassHandle {
        self.render_pass
    }

    pub fn size(&self) -> FramebufferSize {
        self.size
    }

    pub fn render_area(&self) -> (u32, u32) {
        (self.size.width, self.size.height)
    }

    pub fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    /// Maps a packed attachment index back to its logical slot.
    pub fn original_slot(&self, packed_index: usize) -> Option<AttachmentSlot> {
        self.slot_map.get(packed_index).copied()
    }

    pub fn attachment(&self, packed_index: usize) -> Option<&Arc<AttachmentView>> {
        self.attachments.get(packed_index)
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        self.device.destroy_framebuffer(self.handle);
    }
}

impl std::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framebuffer")
            .field("handle", &self.handle)
            .field("render_pass", &self.render_pass)
            .field("size", &self.size)
            .field("slot_map", &self.slot_map)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::backend::{
        CommandRecorder, FenceHandle, ImageFormat, ImageLayout, ImageViewHandle, PresentInfo,
        RenderPassFormat, SemaphoreHandle, SubmitInfo,
    };
    use crate::error::NativeError;
    use crate::render_target::Attachment;

    #[derive(Default)]
    struct CountingDevice {
        next: AtomicU64,
        created: Mutex<Vec<(Vec<ImageViewHandle>, u32, u32, u32)>>,
        destroyed: AtomicU64,
        fail_create: bool,
    }

    impl GraphicsDevice for CountingDevice {
        fn create_render_pass(
            &self,
            _format: &RenderPassFormat,
        ) -> Result<RenderPassHandle, NativeError> {
            unreachable!()
        }

        fn create_framebuffer(
            &self,
            desc: &FramebufferDescriptor<'_>,
        ) -> Result<FramebufferHandle, NativeError> {
            if self.fail_create {
                return Err(NativeError(-3));
            }
            self.created.lock().unwrap().push((
                desc.attachments.to_vec(),
                desc.width,
                desc.height,
                desc.layers,
            ));
            Ok(FramebufferHandle(self.next.fetch_add(1, Ordering::SeqCst) + 1))
        }

        fn destroy_framebuffer(&self, _handle: FramebufferHandle) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }

        fn create_semaphore(&self) -> Result<SemaphoreHandle, NativeError> {
            unreachable!()
        }
        fn destroy_semaphore(&self, _handle: SemaphoreHandle) {}
        fn create_fence_signaled(&self) -> Result<FenceHandle, NativeError> {
            unreachable!()
        }
        fn destroy_fence(&self, _handle: FenceHandle) {}
        fn wait_for_fence(&self, _handle: FenceHandle) {}
        fn reset_fence(&self, _handle: FenceHandle) {}
        fn create_recorder(&self) -> Box<dyn CommandRecorder> {
            unreachable!()
        }
        fn acquire_next_image(&self, _signal: SemaphoreHandle) -> Result<u32, NativeError> {
            unreachable!()
        }
        fn submit(&self, _info: &SubmitInfo, _fence: FenceHandle) -> Result<(), NativeError> {
            unreachable!()
        }
        fn present(&self, _info: &PresentInfo) -> Result<(), NativeError> {
            unreachable!()
        }
    }

    fn view(id: u64, extent: (u32, u32)) -> Arc<AttachmentView> {
        Arc::new(AttachmentView::new(
            ImageViewHandle(id),
            ImageFormat::R8G8B8A8Unorm,
            extent,
            1,
            1,
        ))
    }

    const DEFAULT: FramebufferSize = FramebufferSize { width: 1280, height: 720, layers: 1 };

    #[test]
    fn packs_attachments_and_maps_slots() {
        let device = Arc::new(CountingDevice::default());
        let mut targets = RenderTargets::default();
        targets.color[2] = Attachment::bound(view(10, (64, 64)), ImageLayout::ColorAttachmentOptimal);
        targets.color[5] = Attachment::bound(view(11, (64, 64)), ImageLayout::ColorAttachmentOptimal);
        targets.depth =
            Attachment::bound(view(12, (64, 64)), ImageLayout::DepthStencilAttachmentOptimal);

        let fb = Framebuffer::new(
            device.clone(),
            &targets,
            Some(RenderPassHandle(1)),
            DEFAULT,
        )
        .unwrap();

        assert_eq!(fb.attachment_count(), 3);
        assert_eq!(fb.original_slot(0), Some(AttachmentSlot::Color(2)));
        assert_eq!(fb.original_slot(1), Some(AttachmentSlot::Color(5)));
        assert_eq!(fb.original_slot(2), Some(AttachmentSlot::Depth));
        assert_eq!(fb.original_slot(3), None);

        let created = device.created.lock().unwrap();
        assert_eq!(
            created[0].0,
            vec![ImageViewHandle(10), ImageViewHandle(11), ImageViewHandle(12)]
        );
        assert_eq!((created[0].1, created[0].2), (64, 64));
    }

    #[test]
    fn missing_render_pass_fails_before_native_call() {
        let device = Arc::new(CountingDevice::default());
        let targets = RenderTargets::default();
        let err = Framebuffer::new(device.clone(), &targets, None, DEFAULT).unwrap_err();
        assert_eq!(err, GnmError::NoRenderPass);
        assert!(device.created.lock().unwrap().is_empty());
    }

    #[test]
    fn native_failure_is_propagated() {
        let device = Arc::new(CountingDevice { fail_create: true, ..Default::default() });
        let targets = RenderTargets::default();
        let err =
            Framebuffer::new(device, &targets, Some(RenderPassHandle(1)), DEFAULT).unwrap_err();
        assert_eq!(err, GnmError::FramebufferCreationFailed(NativeError(-3)));
    }

    #[test]
    fn drop_destroys_native_object() {
        let device = Arc::new(CountingDevice::default());
        let targets = RenderTargets::default();
        let fb =
            Framebuffer::new(device.clone(), &targets, Some(RenderPassHandle(1)), DEFAULT).unwrap();
        drop(fb);
        assert_eq!(device.destroyed.load(Ordering::SeqCst), 1);
    }
}
