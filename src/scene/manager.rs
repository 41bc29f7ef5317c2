use std::fmt;

use glam::Vec3;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::arena::{hex, GroupId, SceneArena, SceneGroup, HIGHLIGHT_EMISSIVE, NO_EMISSIVE, PALETTE};
use super::camera::OrbitCamera;
use super::editor::TableDraft;
use super::geometry::Ray;
use super::layout::RadialLayout;
use super::particles::{ParticleField, DEFAULT_COUNT};
use crate::schema_utils::schema::{Field, SchemaDocument};

#[derive(Clone, Debug)]
pub struct SceneConfig {
    pub layout: RadialLayout,
    /// Seed for the layout jitter. None draws fresh jitter on every build.
    pub seed: Option<u64>,
    pub particle_count: usize,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self { layout: RadialLayout::default(), seed: None, particle_count: DEFAULT_COUNT }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    NoSelection,
    Selected(GroupId),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectOutcome {
    Hit(String),
    Miss,
}

#[derive(Clone, Debug)]
pub struct EdgeLine {
    /// Index into the document's relationship list.
    pub relationship: usize,
    pub from: GroupId,
    pub to: GroupId,
    pub points: [Vec3; 2],
    pub visible: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationLine {
    pub direction: Direction,
    pub table: String,
    pub field: String,
}

impl fmt::Display for RelationLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let glyph = match self.direction {
            Direction::Outgoing => '→',
            Direction::Incoming => '←',
        };
        write!(f, "{} {}.{}", glyph, self.table, self.field)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub fields: Vec<Field>,
    pub relationships: Vec<RelationLine>,
}

impl TableInfo {
    /// Fields plus every relationship touching `name`, with the arrow
    /// pointing away from the table for outgoing references.
    pub fn describe(document: &SchemaDocument, name: &str) -> Option<Self> {
        let table = document.get_table(name)?;
        let relationships = document
            .relationships_for(name)
            .map(|rel| {
                if rel.from_table == name {
                    RelationLine { direction: Direction::Outgoing, table: rel.to_table.clone(), field: rel.to_field.clone() }
                } else {
                    RelationLine { direction: Direction::Incoming, table: rel.from_table.clone(), field: rel.from_field.clone() }
                }
            })
            .collect();
        Some(Self { name: name.to_string(), fields: table.fields.clone(), relationships })
    }
}

/// Owns the loaded schema and everything drawn for it.
pub struct SchemaScene {
    config: SceneConfig,
    document: SchemaDocument,
    arena: SceneArena,
    edges: Vec<EdgeLine>,
    selection: Selection,
    relationships_visible: bool,
    particles_visible: bool,
    particles: ParticleField,
    camera: OrbitCamera,
    rng: StdRng,
}

fn rng_for(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_os_rng(),
    }
}

impl SchemaScene {
    pub fn new(config: SceneConfig) -> Self {
        let mut particle_rng = StdRng::from_os_rng();
        let particles = ParticleField::new(config.particle_count, &mut particle_rng);
        let rng = rng_for(config.seed);
        Self {
            config,
            document: SchemaDocument::new(),
            arena: SceneArena::new(),
            edges: Vec::new(),
            selection: Selection::NoSelection,
            relationships_visible: true,
            particles_visible: true,
            particles,
            camera: OrbitCamera::default(),
            rng,
        }
    }

    /// Replace the schema wholesale and rebuild every group, the layout and
    /// the relationship edges. A previous selection survives when its table
    /// still exists.
    pub fn build(&mut self, document: SchemaDocument) {
        let previously_selected = self.selected_table().map(str::to_string);
        self.arena.clear();
        self.edges.clear();
        self.selection = Selection::NoSelection;
        self.document = document;
        if let Some(seed) = self.config.seed {
            self.rng = StdRng::seed_from_u64(seed);
        }

        for (index, (name, table)) in self.document.tables.iter().enumerate() {
            let color = hex(PALETTE[index % PALETTE.len()]);
            self.arena.insert(SceneGroup::for_table(name, table, color));
        }
        self.layout_groups();

        for (ri, rel) in self.document.relationships.iter().enumerate() {
            match (self.arena.id_of(&rel.from_table), self.arena.id_of(&rel.to_table)) {
                (Some(from), Some(to)) => self.edges.push(EdgeLine {
                    relationship: ri,
                    from,
                    to,
                    points: [Vec3::ZERO; 2],
                    visible: self.relationships_visible,
                }),
                _ => log::debug!(
                    "skipping relationship {}.{} -> {}.{}: unknown table",
                    rel.from_table, rel.from_field, rel.to_table, rel.to_field
                ),
            }
        }
        self.refresh_edges();

        if let Some(name) = previously_selected {
            self.select_table(&name);
        }
        log::info!(
            "scene built: {} tables, {} of {} relationships drawn",
            self.arena.len(),
            self.edges.len(),
            self.document.relationships.len()
        );
    }

    fn layout_groups(&mut self) {
        let count = self.arena.len();
        let positions = self.config.layout.positions(count, &mut self.rng);
        for ((_, group), pos) in self.arena.iter_mut().zip(positions) {
            group.position = pos;
        }
    }

    fn refresh_edges(&mut self) {
        for edge in self.edges.iter_mut() {
            if let (Some(a), Some(b)) = (self.arena.get(edge.from), self.arena.get(edge.to)) {
                edge.points = [a.position, b.position];
            }
        }
    }

    /// Swap layout and particle settings. Layout changes apply on the next
    /// build or relayout; a different particle count regenerates the field.
    pub fn set_config(&mut self, config: SceneConfig) {
        if config.particle_count != self.particles.len() {
            let mut particle_rng = StdRng::from_os_rng();
            self.particles = ParticleField::new(config.particle_count, &mut particle_rng);
        }
        if config.seed != self.config.seed {
            self.rng = rng_for(config.seed);
        }
        self.config = config;
    }

    pub fn config(&self) -> &SceneConfig { &self.config }

    /// Re-run the radial layout with fresh jitter.
    pub fn relayout(&mut self) {
        self.layout_groups();
        self.refresh_edges();
    }

    pub fn document(&self) -> &SchemaDocument { &self.document }
    pub fn arena(&self) -> &SceneArena { &self.arena }
    pub fn edges(&self) -> &[EdgeLine] { &self.edges }
    pub fn selection(&self) -> Selection { self.selection }
    pub fn camera(&self) -> &OrbitCamera { &self.camera }
    pub fn camera_mut(&mut self) -> &mut OrbitCamera { &mut self.camera }
    pub fn particles(&self) -> &ParticleField { &self.particles }
    pub fn relationships_visible(&self) -> bool { self.relationships_visible }
    pub fn particles_visible(&self) -> bool { self.particles_visible }

    pub fn selected_table(&self) -> Option<&str> {
        match self.selection {
            Selection::Selected(id) => self.arena.get(id).map(|g| g.table.as_str()),
            Selection::NoSelection => None,
        }
    }

    /// Tables whose meshes currently carry the highlight.
    pub fn highlighted_tables(&self) -> Vec<&str> {
        self.arena
            .iter()
            .filter(|(_, g)| g.is_highlighted())
            .map(|(_, g)| g.table.as_str())
            .collect()
    }

    /// Select the table whose mesh the ray hits first. A miss keeps the
    /// current selection.
    pub fn select_at(&mut self, ray: &Ray) -> SelectOutcome {
        let Some(hit) = self.arena.pick(ray) else {
            return SelectOutcome::Miss;
        };
        let Some(name) = self.arena.get(hit.group).map(|g| g.table.clone()) else {
            return SelectOutcome::Miss;
        };
        self.set_selected(hit.group);
        SelectOutcome::Hit(name)
    }

    pub fn select_table(&mut self, name: &str) -> bool {
        match self.arena.id_of(name) {
            Some(id) => {
                self.set_selected(id);
                true
            }
            None => false,
        }
    }

    fn set_selected(&mut self, id: GroupId) {
        if let Selection::Selected(prev) = self.selection {
            if let Some(g) = self.arena.get_mut(prev) {
                g.set_emissive(NO_EMISSIVE);
            }
        }
        if let Some(g) = self.arena.get_mut(id) {
            g.set_emissive(HIGHLIGHT_EMISSIVE);
        }
        self.selection = Selection::Selected(id);
    }

    pub fn clear_selection(&mut self) {
        if let Selection::Selected(prev) = self.selection {
            if let Some(g) = self.arena.get_mut(prev) {
                g.set_emissive(NO_EMISSIVE);
            }
        }
        self.selection = Selection::NoSelection;
    }

    /// Table under the ray, without changing the selection.
    pub fn hover_at(&self, ray: &Ray) -> Option<&str> {
        self.arena
            .pick(ray)
            .and_then(|hit| self.arena.get(hit.group))
            .map(|g| g.table.as_str())
    }

    pub fn table_info(&self, name: &str) -> Option<TableInfo> {
        TableInfo::describe(&self.document, name)
    }

    /// Takes the outcome of a schema load. A failed load leaves an empty
    /// scene, so nothing from an earlier document stays pickable.
    pub fn finish_load<E>(&mut self, result: Result<SchemaDocument, E>) -> Result<(), E> {
        match result {
            Ok(doc) => {
                self.build(doc);
                Ok(())
            }
            Err(e) => {
                self.build(SchemaDocument::new());
                Err(e)
            }
        }
    }

    /// Takes the outcome of a table save. A saved document is always applied,
    /// even after its edit window was closed, so the scene tracks the
    /// server's revision. Returns the table's new name when the saving draft
    /// was still open; a failure is reported on that draft instead.
    pub fn finish_save<E: fmt::Display>(
        &mut self,
        editor: &mut Option<TableDraft>,
        result: Result<SchemaDocument, E>,
    ) -> Option<String> {
        match result {
            Ok(doc) => {
                let saved_as = match editor {
                    Some(draft) if draft.saving => Some(draft.name.trim().to_string()),
                    _ => None,
                };
                if saved_as.is_some() {
                    *editor = None;
                }
                self.build(doc);
                if let Some(name) = &saved_as {
                    self.select_table(name);
                }
                saved_as
            }
            Err(e) => {
                if let Some(draft) = editor.as_mut().filter(|d| d.saving) {
                    draft.saving = false;
                    draft.status = Some(e.to_string());
                }
                None
            }
        }
    }

    pub fn open_editor(&self, name: &str) -> Option<TableDraft> {
        self.document
            .get_table(name)
            .map(|t| TableDraft::from_table(name, t, self.document.revision))
    }

    pub fn toggle_relationships(&mut self) -> bool {
        self.relationships_visible = !self.relationships_visible;
        for edge in self.edges.iter_mut() {
            edge.visible = self.relationships_visible;
        }
        self.relationships_visible
    }

    pub fn toggle_particles(&mut self) -> bool {
        self.particles_visible = !self.particles_visible;
        self.particles_visible
    }

    pub fn reset_camera(&mut self) {
        self.camera.reset();
    }

    /// Per-frame step: particle drift (when visible) and camera damping.
    /// Pure computation; returns whether the camera is still settling.
    pub fn tick(&mut self, elapsed_ms: f64) -> bool {
        if self.particles_visible {
            self.particles.advance(elapsed_ms);
        }
        self.camera.update()
    }
}
