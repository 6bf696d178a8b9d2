//! CPU rasterizer used for previews when no GPU backend is plugged in.
//!
//! Unlit, flat-colored, depth-tested triangles. Each submesh is drawn with
//! the base color of the material in the matching slot; empty slots draw
//! nothing. No face culling.

use crate::render::{FrameStats, PreviewCamera, RenderBackend, RenderError, RenderTargetHandle};
use crate::scene::Hierarchy;
use glam::{Mat4, Vec3, Vec4};
use image::{Rgba, RgbaImage};
use std::collections::HashMap;

struct Framebuffer {
    color: RgbaImage,
    depth: Vec<f32>,
}

impl Framebuffer {
    fn allocate(width: u32, height: u32) -> Result<Self, RenderError> {
        let failed = || RenderError::TargetAllocationFailed { width, height };
        let pixels = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(failed)?;

        let mut color = Vec::new();
        color
            .try_reserve_exact(pixels.checked_mul(4).ok_or_else(failed)?)
            .map_err(|_| failed())?;
        color.resize(pixels * 4, 0u8);
        let mut depth = Vec::new();
        depth.try_reserve_exact(pixels).map_err(|_| failed())?;
        depth.resize(pixels, f32::INFINITY);

        let color = RgbaImage::from_raw(width, height, color).ok_or_else(failed)?;
        Ok(Self { color, depth })
    }

    fn clear(&mut self, rgba: [f32; 4]) {
        let clear = Rgba(to_rgba8(rgba));
        for pixel in self.color.pixels_mut() {
            *pixel = clear;
        }
        self.depth.fill(f32::INFINITY);
    }

    /// Returns how many pixels went from empty to covered.
    fn draw_triangle(&mut self, clip: [Vec4; 3], color: [u8; 4]) -> usize {
        if clip.iter().any(|vertex| vertex.w <= f32::EPSILON) {
            // Behind or on the camera plane; previews never need clipping.
            return 0;
        }
        let (width, height) = self.color.dimensions();
        let (w, h) = (width as f32, height as f32);
        let screen = clip.map(|vertex| {
            let ndc = vertex.truncate() / vertex.w;
            Vec3::new((ndc.x * 0.5 + 0.5) * w, (0.5 - ndc.y * 0.5) * h, ndc.z)
        });
        let [a, b, c] = screen;
        let area = edge(a, b, c.x, c.y);
        if area.abs() < 1e-12 {
            return 0;
        }

        let min_x = a.x.min(b.x).min(c.x).floor().max(0.0);
        let min_y = a.y.min(b.y).min(c.y).floor().max(0.0);
        let max_x = a.x.max(b.x).max(c.x).ceil().min(w - 1.0);
        let max_y = a.y.max(b.y).max(c.y).ceil().min(h - 1.0);
        if min_x > max_x || min_y > max_y {
            return 0;
        }

        let mut covered = 0;
        for y in (min_y as u32)..=(max_y as u32) {
            for x in (min_x as u32)..=(max_x as u32) {
                let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
                let w0 = edge(b, c, px, py) / area;
                let w1 = edge(c, a, px, py) / area;
                let w2 = edge(a, b, px, py) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                let z = w0 * a.z + w1 * b.z + w2 * c.z;
                if !(0.0..=1.0).contains(&z) {
                    continue;
                }
                let index = (y * width + x) as usize;
                if z < self.depth[index] {
                    if self.depth[index] == f32::INFINITY {
                        covered += 1;
                    }
                    self.depth[index] = z;
                    self.color.put_pixel(x, y, Rgba(color));
                }
            }
        }
        covered
    }
}

fn edge(a: Vec3, b: Vec3, px: f32, py: f32) -> f32 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

fn to_rgba8(rgba: [f32; 4]) -> [u8; 4] {
    rgba.map(|channel| (channel.clamp(0.0, 1.0) * 255.0).round() as u8)
}

#[derive(Default)]
pub struct SoftwareRenderer {
    targets: HashMap<RenderTargetHandle, Framebuffer>,
    next_id: u32,
}

impl SoftwareRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Targets created and not yet destroyed.
    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }
}

impl RenderBackend for SoftwareRenderer {
    fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<RenderTargetHandle, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidTargetSize { width, height });
        }
        let framebuffer = Framebuffer::allocate(width, height)?;
        self.next_id = self.next_id.wrapping_add(1);
        let handle = RenderTargetHandle::new(self.next_id);
        self.targets.insert(handle, framebuffer);
        Ok(handle)
    }

    fn render(
        &mut self,
        scene: &Hierarchy,
        camera: &PreviewCamera,
        target: RenderTargetHandle,
    ) -> Result<FrameStats, RenderError> {
        let frame = self
            .targets
            .get_mut(&target)
            .ok_or(RenderError::UnknownTarget(target))?;
        frame.clear(camera.clear_rgba);

        let (width, height) = frame.color.dimensions();
        let view_projection = camera.view_projection(width as f32 / height as f32);
        let mut stats = FrameStats::default();

        let mut stack = vec![(scene.root(), Mat4::IDENTITY)];
        while let Some((id, parent_world)) = stack.pop() {
            let Some(node) = scene.node(id) else {
                continue;
            };
            if !node.is_active() {
                continue;
            }
            let world = parent_world * node.transform().matrix();
            stack.extend(node.children().iter().rev().map(|child| (*child, world)));

            if !camera.sees_layer(node.layer()) {
                continue;
            }
            let Some(renderable) = node.renderable().filter(|r| r.is_visible()) else {
                continue;
            };
            let Some(mesh) = renderable.mesh() else {
                continue;
            };

            let clip_from_object = view_projection * world;
            let clip_positions: Vec<Vec4> = mesh
                .positions()
                .iter()
                .map(|position| clip_from_object * position.extend(1.0))
                .collect();

            for (slot, triangles) in mesh.submeshes().iter().enumerate() {
                let Some(Some(material)) = renderable.slots().get(slot) else {
                    continue;
                };
                let color = to_rgba8(material.base_color_rgba);
                for [i0, i1, i2] in triangles {
                    let (Some(v0), Some(v1), Some(v2)) = (
                        clip_positions.get(*i0 as usize),
                        clip_positions.get(*i1 as usize),
                        clip_positions.get(*i2 as usize),
                    ) else {
                        continue;
                    };
                    stats.triangles += 1;
                    stats.covered_pixels += frame.draw_triangle([*v0, *v1, *v2], color);
                }
            }
        }

        log::debug!(
            "Rendered {} triangles covering {} pixels",
            stats.triangles,
            stats.covered_pixels
        );
        Ok(stats)
    }

    fn read_pixels(&mut self, target: RenderTargetHandle) -> Result<RgbaImage, RenderError> {
        self.targets
            .get(&target)
            .map(|frame| frame.color.clone())
            .ok_or(RenderError::UnknownTarget(target))
    }

    fn destroy_render_target(&mut self, target: RenderTargetHandle) {
        if self.targets.remove(&target).is_none() {
            log::warn!("Render target {:?} destroyed twice", target);
        }
    }
}
