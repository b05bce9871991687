//! GNM command-stream virtualization.
//!
//! Takes the dword command buffers a title's graphics runtime builds
//! for the console GPU and replays them against a native backend:
//! packets are framed ([`pm4`]), interpreted against shadowed register
//! state ([`interpreter`], [`context`]), rendered into aggregated
//! render targets ([`render_target`], [`framebuffer`]) and paced
//! through a bounded frame ring ([`frame`]). [`driver::GnmDriver`] ties
//! it together behind console-style submit entry points.
//!
//! The native graphics API is reached only through the traits in
//! [`backend`]; nothing in this crate links a concrete API.

pub mod backend;
pub mod context;
pub mod driver;
pub mod error;
pub mod frame;
pub mod framebuffer;
pub mod interpreter;
pub mod pm4;
pub mod render_target;

pub use driver::{GnmDriver, Submission};
pub use error::{GnmError, NativeError, SubmitStatus};
pub use render_target::{FormatScanMode, RenderTargets};
