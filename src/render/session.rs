//! Single-shot preview capture of one subject hierarchy.
//!
//! A session borrows a disposable copy of the subject, moves every node of
//! it onto the preview layer, frames a camera from the subject's reference
//! height and owns one offscreen target. Everything it changed is put back
//! by [`PreviewRenderSession::dispose`], which also runs on drop, so an
//! early `?` or a panic still restores layers and the target and leaves the
//! subject active.

use crate::render::{
    framing_distance, FrameStats, PreviewCamera, RenderBackend, RenderError, RenderTargetHandle,
};
use crate::scene::{Hierarchy, NodeId, LAYER_COUNT};
use crate::settings::PreviewSettings;
use glam::Vec3;
use image::RgbaImage;

const HEIGHT_MARGIN_SCALE: f32 = 1.2;
const HEIGHT_MARGIN_OFFSET: f32 = 0.1;

#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("subject has no usable view height or landmark")]
    NoReferencePoint,
    #[error("subject node {0:?} is not part of the hierarchy")]
    MissingSubject(NodeId),
    #[error("preview layer {0} is out of range")]
    InvalidLayer(u8),
    #[error("capture produced no visible geometry on layer {layer}")]
    CaptureUnavailable { layer: u8 },
    #[error("session is {0:?}; capture needs a framed session")]
    InvalidState(SessionState),
    #[error(transparent)]
    Render(#[from] RenderError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Framed,
    Captured,
    Disposed,
}

/// Framing input derived from the subject's authored proportions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubjectReference {
    /// Reference height, margin already applied.
    pub height: f32,
    /// Landmark to re-aim at during capture (the head bone).
    pub head: Option<NodeId>,
}

impl SubjectReference {
    pub fn fallback(height: f32) -> Self {
        Self { height, head: None }
    }

    pub fn from_view_height(view_height: f32, head: Option<NodeId>) -> Self {
        Self {
            height: view_height * HEIGHT_MARGIN_SCALE + HEIGHT_MARGIN_OFFSET,
            head,
        }
    }
}

/// Derive the reference height from the avatar descriptor.
pub fn resolve_reference(hierarchy: &Hierarchy) -> Result<SubjectReference, PreviewError> {
    let descriptor = hierarchy.descriptor().ok_or(PreviewError::NoReferencePoint)?;
    let reference = SubjectReference::from_view_height(
        descriptor.view_position[1],
        descriptor.head.filter(|head| hierarchy.contains(*head)),
    );
    if !reference.height.is_finite() || reference.height <= 0.0 {
        return Err(PreviewError::NoReferencePoint);
    }
    Ok(reference)
}

pub struct PreviewRenderSession<'a, B: RenderBackend> {
    subject: &'a mut Hierarchy,
    root: NodeId,
    backend: &'a mut B,
    state: SessionState,
    reference: SubjectReference,
    layer: u8,
    offset: Vec3,
    distance: f32,
    require_visible_geometry: bool,
    camera: Option<PreviewCamera>,
    target: Option<RenderTargetHandle>,
    saved_layers: Vec<(NodeId, u8)>,
}

impl<'a, B: RenderBackend> PreviewRenderSession<'a, B> {
    /// Isolate `root` of `subject` on the preview layer, frame a camera and
    /// allocate the capture target.
    ///
    /// `subject` must be a throwaway copy: its layers and activation are
    /// rewritten in place until the session is disposed.
    pub fn open(
        subject: &'a mut Hierarchy,
        root: NodeId,
        reference: SubjectReference,
        settings: &PreviewSettings,
        backend: &'a mut B,
    ) -> Result<Self, PreviewError> {
        if !subject.contains(root) {
            return Err(PreviewError::MissingSubject(root));
        }
        if settings.layer >= LAYER_COUNT {
            return Err(PreviewError::InvalidLayer(settings.layer));
        }
        if !reference.height.is_finite() || reference.height <= 0.0 {
            return Err(PreviewError::NoReferencePoint);
        }

        let distance = framing_distance(
            reference.height,
            settings.fov_deg,
            settings.distance_multiplier,
        );
        let mut session = Self {
            subject,
            root,
            backend,
            state: SessionState::Created,
            reference,
            layer: settings.layer,
            offset: Vec3::from(settings.offset),
            distance,
            require_visible_geometry: settings.require_visible_geometry,
            camera: None,
            target: None,
            saved_layers: Vec::new(),
        };

        // From here on any early return drops `session`, which disposes it.
        session.isolate();
        let origin = session.subject.world_position(root);
        session.camera = Some(PreviewCamera::frame_subject(
            origin,
            reference.height,
            distance,
            session.offset,
            settings.fov_deg,
            settings.layer,
        ));
        let target = session
            .backend
            .create_render_target(settings.image_size, settings.image_size)?;
        session.target = Some(target);
        session.set_subject_active(false);
        session.state = SessionState::Framed;

        log::debug!(
            "Preview session framed: height {:.3}, distance {:.3}, {} nodes on layer {}",
            reference.height,
            distance,
            session.saved_layers.len(),
            session.layer
        );
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn camera(&self) -> Option<&PreviewCamera> {
        self.camera.as_ref()
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    /// Nodes whose layer is currently overridden.
    pub fn overridden_nodes(&self) -> usize {
        self.saved_layers.len()
    }

    /// Render one frame of the subject and read it back.
    ///
    /// The subject is only active for the duration of the call. Repeated
    /// calls re-render.
    pub fn capture(&mut self) -> Result<RgbaImage, PreviewError> {
        if !matches!(self.state, SessionState::Framed | SessionState::Captured) {
            return Err(PreviewError::InvalidState(self.state));
        }
        let (Some(target), Some(mut camera)) = (self.target, self.camera) else {
            return Err(PreviewError::InvalidState(self.state));
        };

        if let Some(head) = self.reference.head.filter(|head| self.subject.contains(*head)) {
            let origin = self.subject.world_position(self.root);
            let landmark = self.subject.world_position(head);
            camera.aim_at_landmark(
                origin,
                landmark,
                self.distance,
                self.offset,
                self.reference.height,
            );
            self.camera = Some(camera);
        }

        self.set_subject_active(true);
        let frame = self.render_frame(&camera, target);
        self.set_subject_active(false);
        let (image, stats) = frame?;

        if stats.covered_pixels == 0 {
            if self.require_visible_geometry {
                return Err(PreviewError::CaptureUnavailable { layer: self.layer });
            }
            log::warn!(
                "Preview capture on layer {} produced an empty image",
                self.layer
            );
        }
        self.state = SessionState::Captured;
        Ok(image)
    }

    /// Restore every overridden layer, release the target and reactivate
    /// the subject. Safe to call any number of times.
    pub fn dispose(&mut self) {
        if self.state == SessionState::Disposed {
            return;
        }
        let restored = self.saved_layers.len();
        for (id, layer) in self.saved_layers.drain(..) {
            if let Some(node) = self.subject.node_mut(id) {
                node.set_layer(layer);
            }
        }
        if let Some(target) = self.target.take() {
            self.backend.destroy_render_target(target);
        }
        self.camera = None;
        self.set_subject_active(true);
        self.state = SessionState::Disposed;
        log::debug!("Preview session disposed, {} layers restored", restored);
    }

    fn isolate(&mut self) {
        let nodes: Vec<NodeId> = self.subject.descendants(self.root).collect();
        self.saved_layers.reserve(nodes.len());
        for id in nodes {
            if let Some(node) = self.subject.node_mut(id) {
                self.saved_layers.push((id, node.layer()));
                node.set_layer(self.layer);
            }
        }
    }

    fn set_subject_active(&mut self, active: bool) {
        if let Some(node) = self.subject.node_mut(self.root) {
            node.set_active(active);
        }
    }

    fn render_frame(
        &mut self,
        camera: &PreviewCamera,
        target: RenderTargetHandle,
    ) -> Result<(RgbaImage, FrameStats), PreviewError> {
        let stats = self.backend.render(self.subject, camera, target)?;
        let image = self.backend.read_pixels(target)?;
        Ok((image, stats))
    }
}

impl<B: RenderBackend> Drop for PreviewRenderSession<'_, B> {
    fn drop(&mut self) {
        self.dispose();
    }
}
