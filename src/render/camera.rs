use glam::{Mat4, Vec3};

/// Preview cameras back off from the subject along +Z and look back at it.
pub const FRAMING_FORWARD: Vec3 = Vec3::Z;

/// Closest allowed distance, as a fraction of the reference height.
const MIN_DISTANCE_FACTOR: f32 = 0.6;
const NEAR_FACTOR: f32 = 0.01;
const FAR_FACTOR: f32 = 2.5;

/// Distance at which `height` fills a `fov_deg` vertical field of view,
/// floored at `height * 0.6`, then scaled by `multiplier`.
pub fn framing_distance(height: f32, fov_deg: f32, multiplier: f32) -> f32 {
    let half_fov = (fov_deg * 0.5).to_radians();
    let fit = height / (2.0 * half_fov.tan());
    fit.max(height * MIN_DISTANCE_FACTOR) * multiplier
}

/// Near/far planes that scale with the framing distance.
pub fn clip_planes(distance: f32) -> (f32, f32) {
    (distance * NEAR_FACTOR, distance * FAR_FACTOR)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewCamera {
    pub position: Vec3,
    pub target: Vec3,
    pub fov_y_deg: f32,
    pub near: f32,
    pub far: f32,
    pub culling_mask: u32,
    pub clear_rgba: [f32; 4],
}

impl PreviewCamera {
    /// Frame a subject standing at `origin` whose reference height is
    /// `height`. Only `layer` is visible and the background is transparent.
    pub fn frame_subject(
        origin: Vec3,
        height: f32,
        distance: f32,
        offset: Vec3,
        fov_y_deg: f32,
        layer: u8,
    ) -> Self {
        let center = origin + Vec3::Y * (height * 0.5);
        let (near, far) = clip_planes(distance);
        Self {
            position: center + FRAMING_FORWARD * distance + offset * height,
            target: center,
            fov_y_deg,
            near,
            far,
            culling_mask: layer_mask(layer),
            clear_rgba: [0.0, 0.0, 0.0, 0.0],
        }
    }

    /// Re-center on the span between the subject origin and a landmark
    /// (the head), looking slightly above the midpoint.
    pub fn aim_at_landmark(
        &mut self,
        origin: Vec3,
        landmark: Vec3,
        distance: f32,
        offset: Vec3,
        height: f32,
    ) {
        let center = (origin + landmark) * 0.5;
        self.position = center + FRAMING_FORWARD * distance + offset * height;
        self.target = (center + landmark) * 0.5;
    }

    /// (forward, right, up)
    pub fn basis(&self) -> (Vec3, Vec3, Vec3) {
        let forward = (self.target - self.position).normalize_or_zero();
        let right = forward.cross(self.up_hint()).normalize_or_zero();
        let up = right.cross(forward).normalize_or_zero();
        (forward, right, up)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up_hint())
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_deg.to_radians(), aspect, self.near, self.far)
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }

    pub fn sees_layer(&self, layer: u8) -> bool {
        self.culling_mask & layer_mask(layer) != 0
    }

    fn up_hint(&self) -> Vec3 {
        let forward = (self.target - self.position).normalize_or_zero();
        if forward.dot(Vec3::Y).abs() > 0.999 {
            Vec3::Z
        } else {
            Vec3::Y
        }
    }
}

pub fn layer_mask(layer: u8) -> u32 {
    1u32.checked_shl(u32::from(layer)).unwrap_or(0)
}
