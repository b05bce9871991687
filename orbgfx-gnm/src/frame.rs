//! Frame pacing and presentation.
//!
//! A small ring of sync slots caps the number of frames in flight.
//! Each slot owns an acquire semaphore, a render-finished semaphore and
//! a fence; the CPU blocks on the slot's fence before reusing it, so at
//! most [`MAX_FRAMES_IN_FLIGHT`] frames are ever recorded ahead of the
//! GPU.

use std::sync::Arc;

use crate::backend::{
    FenceHandle, GraphicsDevice, PipelineStage, PresentInfo, SemaphoreHandle, SubmitInfo,
};
use crate::error::{GnmError, NativeError};

/// Depth of the sync ring.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

#[derive(Debug, Clone, Copy)]
struct SyncSlot {
    image_available: SemaphoreHandle,
    render_finished: SemaphoreHandle,
    in_flight: FenceHandle,
}

struct SyncRing {
    slots: Vec<SyncSlot>,
    current: usize,
}

impl SyncRing {
    fn new(device: &dyn GraphicsDevice, depth: usize) -> Result<Self, NativeError> {
        let mut slots = Vec::with_capacity(depth);
        for _ in 0..depth {
            slots.push(SyncSlot {
                image_available: device.create_semaphore()?,
                render_finished: device.create_semaphore()?,
                // Signaled at creation: the first pass over the ring
                // must not wait for frames that were never submitted.
                in_flight: device.create_fence_signaled()?,
            });
        }
        Ok(Self { slots, current: 0 })
    }

    fn current(&self) -> SyncSlot {
        self.slots[self.current]
    }

    fn advance(&mut self) {
        self.current = (self.current + 1) % self.slots.len();
    }
}

/// Owns the per-frame sync objects and runs the submit/present cycle.
pub struct FrameOrchestrator {
    device: Arc<dyn GraphicsDevice>,
    sync: SyncRing,
    frame_count: u64,
}

impl FrameOrchestrator {
    pub fn new(device: Arc<dyn GraphicsDevice>, depth: usize) -> Result<Self, GnmError> {
        let sync = SyncRing::new(device.as_ref(), depth).map_err(GnmError::Native)?;
        Ok(Self { device, sync, frame_count: 0 })
    }

    /// Index of the sync slot the next frame will use.
    pub fn slot_index(&self) -> usize {
        self.sync.current
    }

    /// Total frames submitted so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Opens the frame: waits for the slot's previous work to retire,
    /// then acquires the swapchain image the frame will render into.
    /// The slot's fence stays signaled until [`Self::submit_and_present`],
    /// so a frame abandoned after this call cannot deadlock the slot.
    pub fn begin_frame(&mut self) -> Result<u32, GnmError> {
        let slot = self.sync.current();
        self.device.wait_for_fence(slot.in_flight);
        self.device
            .acquire_next_image(slot.image_available)
            .map_err(GnmError::Native)
    }

    /// Closes the frame opened by [`Self::begin_frame`]: submit fenced
    /// between the two semaphores, present the acquired image, then
    /// rotate to the next slot.
    pub fn submit_and_present(
        &mut self,
        command_buffer: crate::backend::CommandBufferHandle,
        image_index: u32,
    ) -> Result<(), GnmError> {
        let slot = self.sync.current();

        self.device.reset_fence(slot.in_flight);
        self.device
            .submit(
                &SubmitInfo {
                    command_buffer,
                    wait_semaphore: slot.image_available,
                    wait_stage: PipelineStage::ColorAttachmentOutput,
                    signal_semaphore: slot.render_finished,
                },
                slot.in_flight,
            )
            .map_err(GnmError::Native)?;
        self.device
            .present(&PresentInfo { wait_semaphore: slot.render_finished, image_index })
            .map_err(GnmError::Native)?;

        self.sync.advance();
        self.frame_count += 1;
        log::trace!("frame {} presented to image {image_index}", self.frame_count);
        Ok(())
    }
}

impl Drop for FrameOrchestrator {
    fn drop(&mut self) {
        for slot in &self.sync.slots {
            self.device.destroy_semaphore(slot.image_available);
            self.device.destroy_semaphore(slot.render_finished);
            self.device.destroy_fence(slot.in_flight);
        }
    }
}
