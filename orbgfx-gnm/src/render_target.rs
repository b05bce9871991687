//! Render target aggregation.
//!
//! A draw's output surface is described by up to eight color slots plus
//! one depth slot, each optionally bound to an attachment view. This
//! module derives the two aggregate properties a framebuffer is built
//! from: the common render size and the per-slot format list.

use std::sync::Arc;

use crate::backend::{AttachmentFormat, ImageFormat, ImageLayout, ImageViewHandle, RenderPassFormat};

/// Number of color render target slots.
pub const MAX_RENDER_TARGETS: usize = 8;

/// An image view the backend created for us, bundled with the static
/// properties the aggregation logic needs. Shared between the slot
/// bindings and any framebuffer built over them.
#[derive(Debug)]
pub struct AttachmentView {
    handle: ImageViewHandle,
    format: ImageFormat,
    extent: (u32, u32),
    layers: u32,
    sample_count: u32,
}

impl AttachmentView {
    pub fn new(
        handle: ImageViewHandle,
        format: ImageFormat,
        extent: (u32, u32),
        layers: u32,
        sample_count: u32,
    ) -> Self {
        Self { handle, format, extent, layers, sample_count }
    }

    pub fn handle(&self) -> ImageViewHandle {
        self.handle
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn extent(&self) -> (u32, u32) {
        self.extent
    }

    pub fn layer_count(&self) -> u32 {
        self.layers
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }
}

/// One bound attachment slot.
#[derive(Debug, Clone, Default)]
pub struct Attachment {
    pub view: Option<Arc<AttachmentView>>,
    pub layout: ImageLayout,
}

impl Attachment {
    pub fn bound(view: Arc<AttachmentView>, layout: ImageLayout) -> Self {
        Self { view: Some(view), layout }
    }

    pub fn is_bound(&self) -> bool {
        self.view.is_some()
    }
}

/// The full set of render target slots for one draw batch.
#[derive(Debug, Clone, Default)]
pub struct RenderTargets {
    pub color: [Attachment; MAX_RENDER_TARGETS],
    pub depth: Attachment,
}

/// Dimensions shared by every attachment of a framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferSize {
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

/// Selects how `render_pass_format` walks the color slots.
///
/// `Legacy` reproduces a long-standing inverted scan that skipped every
/// *bound* slot, so no bound color format was ever reported. `Fixed` is
/// the corrected behavior and the default; `Legacy` stays available for
/// comparing against captures taken with the old scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatScanMode {
    Legacy,
    #[default]
    Fixed,
}

impl RenderTargets {
    /// Render size every attachment can satisfy: the pointwise minimum
    /// of all bound extents and layer counts, or `default` when nothing
    /// is bound.
    pub fn compute_render_size(&self, default: FramebufferSize) -> FramebufferSize {
        let mut size = default;
        let views = self
            .color
            .iter()
            .chain(std::iter::once(&self.depth))
            .filter_map(|slot| slot.view.as_deref());
        for view in views {
            let (width, height) = view.extent();
            size.width = size.width.min(width);
            size.height = size.height.min(height);
            size.layers = size.layers.min(view.layer_count());
        }
        size
    }

    /// Per-slot format list a compatible render pass is created from.
    pub fn render_pass_format(&self, mode: FormatScanMode) -> RenderPassFormat {
        let mut format = RenderPassFormat::default();
        for (slot, attachment) in self.color.iter().enumerate() {
            match mode {
                FormatScanMode::Legacy => {
                    // Inverted check kept verbatim: bound slots are
                    // skipped and empty ones contribute nothing either,
                    // leaving every color entry unset.
                    if attachment.is_bound() {
                        continue;
                    }
                }
                FormatScanMode::Fixed => {
                    let Some(view) = attachment.view.as_deref() else {
                        continue;
                    };
                    format.sample_count = view.sample_count();
                    format.color[slot] = Some(AttachmentFormat {
                        format: view.format(),
                        layout: attachment.layout,
                    });
                }
            }
        }
        if let Some(view) = self.depth.view.as_deref() {
            format.sample_count = view.sample_count();
            format.depth = Some(AttachmentFormat {
                format: view.format(),
                layout: self.depth.layout,
            });
        }
        format
    }

    /// Number of bound slots, depth included.
    pub fn attachment_count(&self) -> usize {
        let colors = self.color.iter().filter(|slot| slot.is_bound()).count();
        colors + usize::from(self.depth.is_bound())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(id: u64, format: ImageFormat, extent: (u32, u32), layers: u32) -> Arc<AttachmentView> {
        Arc::new(AttachmentView::new(ImageViewHandle(id), format, extent, layers, 1))
    }

    const DEFAULT: FramebufferSize = FramebufferSize { width: 1920, height: 1080, layers: 1 };

    #[test]
    fn render_size_is_pointwise_minimum() {
        let mut targets = RenderTargets::default();
        targets.color[0] = Attachment::bound(
            view(1, ImageFormat::R8G8B8A8Unorm, (1920, 1080), 2),
            ImageLayout::ColorAttachmentOptimal,
        );
        targets.depth = Attachment::bound(
            view(2, ImageFormat::D32Float, (960, 540), 1),
            ImageLayout::DepthStencilAttachmentOptimal,
        );

        let size = targets.compute_render_size(DEFAULT);
        assert_eq!(size, FramebufferSize { width: 960, height: 540, layers: 1 });
    }

    #[test]
    fn render_size_falls_back_to_default_when_nothing_bound() {
        let targets = RenderTargets::default();
        assert_eq!(targets.compute_render_size(DEFAULT), DEFAULT);
    }

    #[test]
    fn fixed_scan_reports_bound_color_formats() {
        let mut targets = RenderTargets::default();
        targets.color[0] = Attachment::bound(
            view(1, ImageFormat::B8G8R8A8Unorm, (64, 64), 1),
            ImageLayout::ColorAttachmentOptimal,
        );
        targets.color[3] = Attachment::bound(
            view(2, ImageFormat::R16G16B16A16Float, (64, 64), 1),
            ImageLayout::General,
        );

        let format = targets.render_pass_format(FormatScanMode::Fixed);
        assert_eq!(
            format.color[0],
            Some(AttachmentFormat {
                format: ImageFormat::B8G8R8A8Unorm,
                layout: ImageLayout::ColorAttachmentOptimal,
            })
        );
        assert_eq!(
            format.color[3],
            Some(AttachmentFormat {
                format: ImageFormat::R16G16B16A16Float,
                layout: ImageLayout::General,
            })
        );
        assert!(format.color[1].is_none());
        assert!(format.depth.is_none());
    }

    #[test]
    fn legacy_scan_never_reports_color_formats() {
        let mut targets = RenderTargets::default();
        targets.color[0] = Attachment::bound(
            view(1, ImageFormat::B8G8R8A8Unorm, (64, 64), 1),
            ImageLayout::ColorAttachmentOptimal,
        );

        let format = targets.render_pass_format(FormatScanMode::Legacy);
        assert!(format.color.iter().all(Option::is_none));
    }

    #[test]
    fn depth_format_reported_in_both_modes() {
        let mut targets = RenderTargets::default();
        targets.depth = Attachment::bound(
            view(1, ImageFormat::D24UnormS8Uint, (64, 64), 1),
            ImageLayout::DepthStencilAttachmentOptimal,
        );

        for mode in [FormatScanMode::Legacy, FormatScanMode::Fixed] {
            let format = targets.render_pass_format(mode);
            assert_eq!(
                format.depth,
                Some(AttachmentFormat {
                    format: ImageFormat::D24UnormS8Uint,
                    layout: ImageLayout::DepthStencilAttachmentOptimal,
                })
            );
        }
    }
}
