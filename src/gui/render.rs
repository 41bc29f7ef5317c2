//! Paints a [`SchemaScene`] with the egui painter: particles, relationship
//! edges, then table groups back to front.

use eframe::egui::{self, Align2, Color32, FontId, Painter, Pos2, Rect, Shape, Stroke};
use glam::{Mat4, Vec3};

use crate::scene::arena::{hex, SceneGroup};
use crate::scene::camera::OrbitCamera;
use crate::scene::manager::SchemaScene;
use crate::scene::particles::OPACITY;

const EDGE_COLOR: u32 = 0x64748b;
const EDGE_OPACITY: f32 = 0.6;
// Label textures are 128 px tall; font sizes are relative to that.
const LABEL_TEXTURE_PX: f32 = 128.0;
const MIN_FONT_PX: f32 = 5.0;

pub const BACKGROUND: u32 = 0x0f172a;

pub fn paint_scene(painter: &Painter, viewport: Rect, scene: &SchemaScene) {
    painter.rect_filled(viewport, 0.0, hex(BACKGROUND));
    let cam = scene.camera();
    let view = cam.view_matrix();

    if scene.particles_visible() {
        for (pos, p) in scene.particles().world_positions() {
            if let Some((s, depth)) = cam.project_with(&view, pos, viewport) {
                if !viewport.contains(s) {
                    continue;
                }
                let r = (p.size * 40.0 / depth).clamp(0.5, 3.5);
                painter.circle_filled(s, r, p.color.gamma_multiply(OPACITY));
            }
        }
    }

    if scene.relationships_visible() {
        let stroke = Stroke::new(1.5, hex(EDGE_COLOR).gamma_multiply(EDGE_OPACITY));
        for edge in scene.edges().iter().filter(|e| e.visible) {
            let a = cam.project_with(&view, edge.points[0], viewport);
            let b = cam.project_with(&view, edge.points[1], viewport);
            if let (Some((a, _)), Some((b, _))) = (a, b) {
                painter.line_segment([a, b], stroke);
            }
        }
    }

    // Painter's algorithm: farthest group first
    let mut order: Vec<(f32, &SceneGroup)> = scene
        .arena()
        .iter()
        .filter_map(|(_, g)| cam.project_with(&view, g.position, viewport).map(|(_, d)| (d, g)))
        .collect();
    order.sort_by(|a, b| b.0.total_cmp(&a.0));
    for (_, group) in order {
        paint_group(painter, viewport, cam, &view, group);
    }
}

fn paint_group(painter: &Painter, viewport: Rect, cam: &OrbitCamera, view: &Mat4, group: &SceneGroup) {
    for mesh in group.meshes.iter().filter(|m| !m.role.is_label()) {
        let center = group.position + mesh.offset + Vec3::new(0.0, 0.0, mesh.size.z * 0.5);
        let hx = mesh.size.x * 0.5;
        let hy = mesh.size.y * 0.5;
        let corners = [
            center + Vec3::new(-hx, hy, 0.0),
            center + Vec3::new(hx, hy, 0.0),
            center + Vec3::new(hx, -hy, 0.0),
            center + Vec3::new(-hx, -hy, 0.0),
        ];
        let projected: Option<Vec<Pos2>> = corners
            .iter()
            .map(|c| cam.project_with(view, *c, viewport).map(|(p, _)| p))
            .collect();
        let Some(points) = projected else { continue };
        let fill = mesh.shaded_color();
        let edge = Color32::from_black_alpha(90);
        painter.add(Shape::convex_polygon(points, fill, Stroke::new(1.0, edge)));
    }

    for mesh in group.meshes.iter().filter(|m| m.role.is_label()) {
        let Some(text) = mesh.text.as_deref() else { continue };
        let center = group.position + mesh.offset;
        let half_h = Vec3::new(0.0, mesh.size.y * 0.5, 0.0);
        let (Some((c, _)), Some((top, _)), Some((bottom, _))) = (
            cam.project_with(view, center, viewport),
            cam.project_with(view, center + half_h, viewport),
            cam.project_with(view, center - half_h, viewport),
        ) else {
            continue;
        };
        let plane_px = top.distance(bottom);
        let font_px = plane_px * mesh.font_px / LABEL_TEXTURE_PX * 2.0;
        if font_px < MIN_FONT_PX {
            continue;
        }
        painter.text(c, Align2::CENTER_CENTER, text, FontId::proportional(font_px.min(64.0)), mesh.text_color);
    }
}

/// Overlay shown in the middle of the canvas while loading or after a failed load.
pub fn paint_status(painter: &Painter, viewport: Rect, text: &str, color: Color32) {
    let galley = painter.layout_no_wrap(text.to_string(), FontId::proportional(18.0), color);
    let pad = egui::vec2(16.0, 10.0);
    let rect = Rect::from_center_size(viewport.center(), galley.size() + pad * 2.0);
    painter.rect_filled(rect, 8.0, Color32::from_rgba_premultiplied(15, 23, 42, 230));
    painter.galley(rect.min + pad, galley, color);
}
