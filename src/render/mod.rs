mod camera;
pub mod session;
mod software;

pub use camera::{clip_planes, framing_distance, layer_mask, PreviewCamera, FRAMING_FORWARD};
pub use session::{
    resolve_reference, PreviewError, PreviewRenderSession, SessionState, SubjectReference,
};
pub use software::SoftwareRenderer;

use crate::scene::Hierarchy;
use image::RgbaImage;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("render target size must be non-zero (got {width}x{height})")]
    InvalidTargetSize { width: u32, height: u32 },
    #[error("failed to allocate {width}x{height} capture buffers")]
    TargetAllocationFailed { width: u32, height: u32 },
    #[error("unknown render target {0:?}")]
    UnknownTarget(RenderTargetHandle),
    #[error("render backend unavailable: {0}")]
    Unavailable(String),
}

/// Opaque reference to an offscreen color+depth target owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetHandle(u32);

impl RenderTargetHandle {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn id(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub triangles: usize,
    pub covered_pixels: usize,
}

/// What a preview session needs from a renderer.
///
/// Targets are explicit: nothing here reads or writes an implicit "active"
/// target, and every target handed out must be given back through
/// `destroy_render_target`.
pub trait RenderBackend {
    fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<RenderTargetHandle, RenderError>;

    /// Clear `target` to the camera's clear color and draw every active,
    /// visible renderable on a layer the camera can see.
    fn render(
        &mut self,
        scene: &Hierarchy,
        camera: &PreviewCamera,
        target: RenderTargetHandle,
    ) -> Result<FrameStats, RenderError>;

    fn read_pixels(&mut self, target: RenderTargetHandle) -> Result<RgbaImage, RenderError>;

    fn destroy_render_target(&mut self, target: RenderTargetHandle);
}
