//! Arena of scene groups. One group per table, addressed by [`GroupId`] and
//! looked up by table name. Meshes belong to exactly one group and do not
//! point back at it.

use std::collections::HashMap;

use egui::Color32;
use glam::Vec3;

use super::geometry::{Aabb, Ray};
use crate::schema_utils::schema::Table;

pub const PALETTE: [u32; 10] = [
    0x3b82f6, 0x10b981, 0xf59e0b, 0xef4444, 0x8b5cf6,
    0x06b6d4, 0x84cc16, 0xf97316, 0xec4899, 0x6366f1,
];
pub const PRIMARY_FIELD_COLOR: u32 = 0xffd700;
pub const FIELD_COLOR: u32 = 0xe5e7eb;
pub const HIGHLIGHT_EMISSIVE: u32 = 0x444444;
pub const NO_EMISSIVE: u32 = 0x000000;

// Row spacing and header geometry, in world units
const ROW_STEP: f32 = 0.4;
const ROW_OFFSET: f32 = 0.5;
const HEADER_SIZE: Vec3 = Vec3::new(8.0, 1.5, 0.2);
const FIELD_SIZE: Vec3 = Vec3::new(8.0, 0.6, 0.15);
const LABEL_DEPTH: f32 = 0.01;

pub fn hex(rgb: u32) -> Color32 {
    Color32::from_rgb(((rgb >> 16) & 0xff) as u8, ((rgb >> 8) & 0xff) as u8, (rgb & 0xff) as u8)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub usize);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MeshRole {
    Header,
    TableLabel,
    FieldRow { index: usize },
    FieldName { index: usize },
    FieldType { index: usize },
}

impl MeshRole {
    pub fn is_label(&self) -> bool {
        matches!(self, MeshRole::TableLabel | MeshRole::FieldName { .. } | MeshRole::FieldType { .. })
    }
}

#[derive(Clone, Debug)]
pub struct Mesh {
    pub role: MeshRole,
    /// Center relative to the owning group's position.
    pub offset: Vec3,
    pub size: Vec3,
    pub color: Color32,
    pub emissive: Color32,
    pub text: Option<String>,
    pub text_color: Color32,
    /// Nominal font size of the label texture; scaled with distance when painted.
    pub font_px: f32,
}

impl Mesh {
    fn solid(role: MeshRole, offset: Vec3, size: Vec3, color: Color32) -> Self {
        Self {
            role,
            offset,
            size,
            color,
            emissive: hex(NO_EMISSIVE),
            text: None,
            text_color: Color32::WHITE,
            font_px: 0.0,
        }
    }

    fn label(role: MeshRole, offset: Vec3, w: f32, h: f32, text: &str, text_color: Color32, font_px: f32) -> Self {
        Self {
            role,
            offset,
            size: Vec3::new(w, h, LABEL_DEPTH),
            color: Color32::TRANSPARENT,
            emissive: hex(NO_EMISSIVE),
            text: Some(text.to_string()),
            text_color,
            font_px,
        }
    }

    pub fn world_aabb(&self, group_pos: Vec3) -> Aabb {
        Aabb::from_center_half(group_pos + self.offset, self.size * 0.5)
    }

    /// Base color lifted by the emissive term, as a lit material would show it.
    pub fn shaded_color(&self) -> Color32 {
        let e = self.emissive;
        Color32::from_rgba_unmultiplied(
            self.color.r().saturating_add(e.r()),
            self.color.g().saturating_add(e.g()),
            self.color.b().saturating_add(e.b()),
            self.color.a(),
        )
    }
}

#[derive(Clone, Debug)]
pub struct SceneGroup {
    pub table: String,
    pub position: Vec3,
    pub color: Color32,
    pub meshes: Vec<Mesh>,
}

impl SceneGroup {
    /// Header, name label, and a row/name/type triple per field.
    pub fn for_table(name: &str, table: &Table, color: Color32) -> Self {
        let n = table.fields.len();
        let header_y = n as f32 * ROW_STEP;
        let mut meshes = Vec::with_capacity(2 + 3 * n);
        meshes.push(Mesh::solid(MeshRole::Header, Vec3::new(0.0, header_y, 0.0), HEADER_SIZE, color));
        meshes.push(Mesh::label(
            MeshRole::TableLabel,
            Vec3::new(0.0, header_y, 0.11),
            7.0,
            1.0,
            name,
            Color32::WHITE,
            48.0,
        ));
        for (index, field) in table.fields.iter().enumerate() {
            let y = field_row_y(index, n);
            let row_color = if field.is_primary { hex(PRIMARY_FIELD_COLOR) } else { hex(FIELD_COLOR) };
            meshes.push(Mesh::solid(MeshRole::FieldRow { index }, Vec3::new(0.0, y, 0.0), FIELD_SIZE, row_color));
            let name_color = if field.is_primary { hex(0x000000) } else { hex(0x333333) };
            meshes.push(Mesh::label(MeshRole::FieldName { index }, Vec3::new(0.0, y, 0.08), 7.0, 0.5, &field.name, name_color, 32.0));
            meshes.push(Mesh::label(MeshRole::FieldType { index }, Vec3::new(0.0, y - 0.15, 0.08), 6.0, 0.3, &field.ty, hex(0x666666), 24.0));
        }
        Self { table: name.to_string(), position: Vec3::ZERO, color, meshes }
    }

    pub fn set_emissive(&mut self, rgb: u32) {
        let c = hex(rgb);
        for m in self.meshes.iter_mut() {
            m.emissive = c;
        }
    }

    pub fn is_highlighted(&self) -> bool {
        self.meshes.iter().any(|m| m.emissive != hex(NO_EMISSIVE))
    }
}

/// Vertical offset of field row `index` within a table of `count` fields.
/// The first field sits highest, just under the header.
pub fn field_row_y(index: usize, count: usize) -> f32 {
    (count as f32 - index as f32 - 1.0) * ROW_STEP - ROW_OFFSET
}

#[derive(Clone, Debug, PartialEq)]
pub struct PickHit {
    pub group: GroupId,
    pub mesh: usize,
    pub distance: f32,
}

#[derive(Clone, Debug, Default)]
pub struct SceneArena {
    groups: Vec<SceneGroup>,
    by_table: HashMap<String, GroupId>,
}

impl SceneArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, group: SceneGroup) -> GroupId {
        let id = GroupId(self.groups.len());
        self.by_table.insert(group.table.clone(), id);
        self.groups.push(group);
        id
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.by_table.clear();
    }

    pub fn len(&self) -> usize { self.groups.len() }
    pub fn is_empty(&self) -> bool { self.groups.is_empty() }

    pub fn id_of(&self, table: &str) -> Option<GroupId> { self.by_table.get(table).copied() }
    pub fn get(&self, id: GroupId) -> Option<&SceneGroup> { self.groups.get(id.0) }
    pub fn get_mut(&mut self, id: GroupId) -> Option<&mut SceneGroup> { self.groups.get_mut(id.0) }
    pub fn by_name(&self, table: &str) -> Option<&SceneGroup> { self.id_of(table).and_then(|id| self.get(id)) }

    pub fn iter(&self) -> impl Iterator<Item = (GroupId, &SceneGroup)> {
        self.groups.iter().enumerate().map(|(i, g)| (GroupId(i), g))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (GroupId, &mut SceneGroup)> {
        self.groups.iter_mut().enumerate().map(|(i, g)| (GroupId(i), g))
    }

    /// Nearest mesh hit by `ray` across every group.
    pub fn pick(&self, ray: &Ray) -> Option<PickHit> {
        let mut best: Option<PickHit> = None;
        for (gid, group) in self.iter() {
            for (mi, mesh) in group.meshes.iter().enumerate() {
                if let Some(t) = mesh.world_aabb(group.position).intersect(ray) {
                    if best.as_ref().map(|b| t < b.distance).unwrap_or(true) {
                        best = Some(PickHit { group: gid, mesh: mi, distance: t });
                    }
                }
            }
        }
        best
    }
}
