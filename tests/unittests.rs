use std::time::{Duration, Instant};

use glam::Vec3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use schema_loom::api::client::{SaveError, SchemaClient};
use schema_loom::assistant::panel::{AssistantPanel, Element, ACTIVE, CLOSE, GLOW, OPEN};
use schema_loom::persistence::settings::AppSettings;
use schema_loom::scene::camera::{OrbitCamera, DEFAULT_POSITION, MAX_DISTANCE, MIN_DISTANCE};
use schema_loom::scene::editor::{TableDraft, NEW_FIELD_TYPE_HINT};
use schema_loom::scene::geometry::{Aabb, Ray};
use schema_loom::scene::layout::{RadialLayout, DEFAULT_RADIUS};
use schema_loom::scene::manager::{SceneConfig, SchemaScene, SelectOutcome, Selection};
use schema_loom::scene::particles::ParticleField;
use schema_loom::schema_utils::schema::{
    Field, FieldRename, ForeignKey, Relationship, SchemaDocument, TableUpdate, UpdateError,
};
use schema_loom::schema_utils::sql_import::import_sql;

fn users_orders() -> SchemaDocument {
    let mut doc = SchemaDocument::new();
    doc.add_table("Users", vec![Field::new("id", "INT", true), Field::new("name", "VARCHAR(100)", false)]);
    doc.add_table("Orders", vec![Field::new("id", "INT", true), Field::new("user_id", "INT", false)]);
    doc.add_relationship(Relationship::new("Orders", "user_id", "Users", "id"));
    doc
}

// No jitter and a fixed seed: two tables sit at (25, 0, 0) and (-25, 0, 0)
fn flat_scene() -> SchemaScene {
    SchemaScene::new(SceneConfig {
        layout: RadialLayout { radius: DEFAULT_RADIUS, jitter: 0.0 },
        seed: Some(42),
        particle_count: 10,
    })
}

// A ray straight down -Z through the header of `table`
fn ray_at(scene: &SchemaScene, table: &str) -> Ray {
    let group = scene.arena().by_name(table).expect("group exists");
    let header = group.meshes[0].offset;
    Ray::new(group.position + header + Vec3::new(0.0, 0.0, 50.0), Vec3::NEG_Z)
}

fn miss_ray() -> Ray {
    Ray::new(Vec3::new(0.0, 500.0, 0.0), Vec3::Y)
}

#[test]
fn radial_layout_keeps_constant_radius_and_even_angles() {
    let layout = RadialLayout::default();
    let mut rng = StdRng::seed_from_u64(1);
    let positions = layout.positions(6, &mut rng);
    for (i, p) in positions.iter().enumerate() {
        let r = (p.x * p.x + p.z * p.z).sqrt();
        assert!((r - DEFAULT_RADIUS).abs() < 1e-3, "table {} off the ring: r={}", i, r);
        assert!(p.y >= -5.0 && p.y < 5.0, "jitter out of range: {}", p.y);
        let expected = RadialLayout::angle(i, 6);
        assert!((p.z.atan2(p.x).rem_euclid(std::f32::consts::TAU) - expected).abs() < 1e-3);
    }
    assert_eq!(RadialLayout::angle(0, 0), 0.0);
}

#[test]
fn seeded_layout_is_reproducible() {
    let config = SceneConfig { seed: Some(7), particle_count: 0, ..Default::default() };
    let mut a = SchemaScene::new(config.clone());
    let mut b = SchemaScene::new(config);
    a.build(users_orders());
    b.build(users_orders());
    let pa: Vec<Vec3> = a.arena().iter().map(|(_, g)| g.position).collect();
    let pb: Vec<Vec3> = b.arena().iter().map(|(_, g)| g.position).collect();
    assert_eq!(pa, pb);

    // Rebuilding with the same seed lands on the same spots again
    a.build(users_orders());
    let again: Vec<Vec3> = a.arena().iter().map(|(_, g)| g.position).collect();
    assert_eq!(pa, again);
}

#[test]
fn build_creates_groups_in_document_order_with_field_meshes() {
    let mut scene = flat_scene();
    scene.build(users_orders());
    assert_eq!(scene.arena().len(), 2);
    let names: Vec<&str> = scene.arena().iter().map(|(_, g)| g.table.as_str()).collect();
    assert_eq!(names, vec!["Users", "Orders"]);
    let users = scene.arena().by_name("Users").expect("users group");
    // header + label + (row, name, type) per field
    assert_eq!(users.meshes.len(), 2 + 3 * 2);
    assert_eq!(scene.edges().len(), 1);
    assert_eq!(scene.selection(), Selection::NoSelection);
}

#[test]
fn relationships_to_unknown_tables_are_skipped() {
    let mut doc = users_orders();
    doc.add_relationship(Relationship::new("Orders", "ghost_id", "Ghost", "id"));
    let mut scene = flat_scene();
    scene.build(doc);
    assert_eq!(scene.document().relationships.len(), 2);
    assert_eq!(scene.edges().len(), 1);
    let edge = &scene.edges()[0];
    let from = scene.arena().get(edge.from).expect("from group");
    let to = scene.arena().get(edge.to).expect("to group");
    assert_eq!(edge.points, [from.position, to.position]);
}

#[test]
fn selecting_moves_highlight_and_miss_keeps_it() {
    let mut scene = flat_scene();
    scene.build(users_orders());

    let users_ray = ray_at(&scene, "Users");
    assert_eq!(scene.select_at(&users_ray), SelectOutcome::Hit("Users".into()));
    assert_eq!(scene.highlighted_tables(), vec!["Users"]);

    let orders_ray = ray_at(&scene, "Orders");
    assert_eq!(scene.select_at(&orders_ray), SelectOutcome::Hit("Orders".into()));
    assert_eq!(scene.highlighted_tables(), vec!["Orders"]);
    assert_eq!(scene.selected_table(), Some("Orders"));

    assert_eq!(scene.select_at(&miss_ray()), SelectOutcome::Miss);
    assert_eq!(scene.select_at(&miss_ray()), SelectOutcome::Miss);
    assert_eq!(scene.selected_table(), Some("Orders"));
    assert_eq!(scene.highlighted_tables(), vec!["Orders"]);

    scene.clear_selection();
    assert!(scene.highlighted_tables().is_empty());
}

#[test]
fn rebuild_keeps_selection_when_table_survives() {
    let mut scene = flat_scene();
    scene.build(users_orders());
    assert!(scene.select_table("Users"));
    scene.build(users_orders());
    assert_eq!(scene.selected_table(), Some("Users"));
    assert_eq!(scene.highlighted_tables(), vec!["Users"]);

    let mut only_orders = SchemaDocument::new();
    only_orders.add_table("Orders", vec![Field::new("id", "INT", true)]);
    scene.build(only_orders);
    assert_eq!(scene.selected_table(), None);
    assert!(!scene.select_table("Users"));
}

#[test]
fn table_info_lists_fields_and_directed_relationships() {
    let mut scene = flat_scene();
    scene.build(users_orders());

    let users = scene.table_info("Users").expect("users info");
    assert_eq!(users.fields.len(), 2);
    assert!(users.fields[0].is_primary);
    let lines: Vec<String> = users.relationships.iter().map(|r| r.to_string()).collect();
    assert_eq!(lines, vec!["← Orders.user_id"]);

    let orders = scene.table_info("Orders").expect("orders info");
    let lines: Vec<String> = orders.relationships.iter().map(|r| r.to_string()).collect();
    assert_eq!(lines, vec!["→ Users.id"]);

    assert!(scene.table_info("Nope").is_none());
}

#[test]
fn self_reference_is_listed_once_as_outgoing() {
    let mut doc = SchemaDocument::new();
    doc.add_table("Employee", vec![Field::new("id", "INT", true), Field::new("manager_id", "INT", false)]);
    doc.add_relationship(Relationship::new("Employee", "manager_id", "Employee", "id"));
    let mut scene = flat_scene();
    scene.build(doc);
    let info = scene.table_info("Employee").expect("info");
    let lines: Vec<String> = info.relationships.iter().map(|r| r.to_string()).collect();
    assert_eq!(lines, vec!["→ Employee.id"]);
}

#[test]
fn toggles_are_involutions() {
    let mut scene = flat_scene();
    scene.build(users_orders());

    assert!(!scene.toggle_relationships());
    assert!(scene.edges().iter().all(|e| !e.visible));
    assert!(scene.toggle_relationships());
    assert!(scene.edges().iter().all(|e| e.visible));

    assert!(!scene.toggle_particles());
    assert!(!scene.particles_visible());
    assert!(scene.toggle_particles());

    // Hidden edges stay hidden across a rebuild
    scene.toggle_relationships();
    scene.build(users_orders());
    assert!(scene.edges().iter().all(|e| !e.visible));
}

#[test]
fn camera_reset_restores_default_view() {
    let mut cam = OrbitCamera::default();
    let p = cam.position();
    assert!((p - DEFAULT_POSITION).length() < 1e-3, "default position {:?}", p);

    cam.rotate(egui::vec2(120.0, -40.0), 600.0);
    cam.pan(egui::vec2(30.0, 10.0), 600.0);
    cam.zoom(400.0);
    for _ in 0..10 {
        cam.update();
    }
    assert!((cam.position() - DEFAULT_POSITION).length() > 1e-2);

    cam.reset();
    assert!((cam.position() - DEFAULT_POSITION).length() < 1e-3);
    assert!(cam.target().length() < 1e-6);
    assert!(!cam.update(), "no motion should be pending after reset");
}

#[test]
fn camera_zoom_is_clamped() {
    let mut cam = OrbitCamera::default();
    for _ in 0..200 {
        cam.zoom(500.0);
    }
    assert!((cam.distance() - MIN_DISTANCE).abs() < 1e-4);
    for _ in 0..200 {
        cam.zoom(-500.0);
    }
    assert!((cam.distance() - MAX_DISTANCE).abs() < 1e-4);
}

#[test]
fn camera_ray_through_center_points_at_target() {
    let cam = OrbitCamera::default();
    let viewport = egui::Rect::from_min_size(egui::pos2(0.0, 0.0), egui::vec2(800.0, 600.0));
    let ray = cam.ray_through(viewport.center(), viewport);
    let to_target = (cam.target() - cam.position()).normalize();
    assert!(ray.dir.dot(to_target) > 0.9999);
    let (screen, _) = cam.project(cam.target(), viewport).expect("target in front of camera");
    assert!((screen - viewport.center()).length() < 0.5);
}

#[test]
fn aabb_intersection_reports_nearest_entry() {
    let near = Aabb::from_center_half(Vec3::new(0.0, 0.0, 5.0), Vec3::splat(1.0));
    let far = Aabb::from_center_half(Vec3::new(0.0, 0.0, -5.0), Vec3::splat(1.0));
    let ray = Ray::new(Vec3::new(0.0, 0.0, 20.0), Vec3::NEG_Z);
    let tn = near.intersect(&ray).expect("near hit");
    let tf = far.intersect(&ray).expect("far hit");
    assert!((tn - 14.0).abs() < 1e-4);
    assert!((tf - 24.0).abs() < 1e-4);

    let sideways = Ray::new(Vec3::new(5.0, 0.0, 20.0), Vec3::NEG_Z);
    assert!(near.intersect(&sideways).is_none());
    let behind = Ray::new(Vec3::new(0.0, 0.0, 20.0), Vec3::Z);
    assert!(near.intersect(&behind).is_none());
}

#[test]
fn particles_advance_deterministically() {
    let mut a = ParticleField::new(50, &mut StdRng::seed_from_u64(3));
    let mut b = ParticleField::new(50, &mut StdRng::seed_from_u64(3));
    for t in [0.0, 16.0, 33.0] {
        a.advance(t);
        b.advance(t);
    }
    let pa: Vec<Vec3> = a.world_positions().map(|(p, _)| p).collect();
    let pb: Vec<Vec3> = b.world_positions().map(|(p, _)| p).collect();
    assert_eq!(pa, pb);
    assert!((a.rotation_y() - 0.003).abs() < 1e-6);
    assert_eq!(a.len(), 50);
}

#[test]
fn hidden_particles_do_not_move() {
    let mut scene = flat_scene();
    scene.toggle_particles();
    let before: Vec<Vec3> = scene.particles().particles().iter().map(|p| p.position).collect();
    scene.tick(1000.0);
    let after: Vec<Vec3> = scene.particles().particles().iter().map(|p| p.position).collect();
    assert_eq!(before, after);
}

#[test]
fn assistant_open_then_close_ends_closed() {
    let t0 = Instant::now();
    let mut panel = AssistantPanel::default();

    panel.toggle_panel(t0);
    assert!(panel.is_open());
    assert!(panel.classes(Element::Button).contains(ACTIVE));
    panel.advance(t0);
    assert!(!panel.classes(Element::Panel).contains(OPEN), "open is deferred");
    panel.advance(t0 + Duration::from_millis(10));
    assert!(panel.classes(Element::Panel).contains(OPEN));

    panel.toggle_panel(t0 + Duration::from_millis(50));
    assert!(!panel.is_open());
    assert!(!panel.classes(Element::Button).contains(ACTIVE));
    assert!(!panel.classes(Element::Panel).contains(OPEN));
    assert!(!panel.classes(Element::Panel).contains(CLOSE), "close is deferred");
    panel.advance(t0 + Duration::from_millis(400));
    assert!(panel.classes(Element::Panel).contains(CLOSE));
    assert!(!panel.has_pending());
}

#[test]
fn assistant_quick_reclose_leaves_no_stray_open() {
    let t0 = Instant::now();
    let mut panel = AssistantPanel::default();
    panel.toggle_panel(t0);
    panel.toggle_panel(t0 + Duration::from_millis(2));
    panel.advance(t0 + Duration::from_secs(1));
    assert!(!panel.classes(Element::Panel).contains(OPEN));
    assert!(panel.classes(Element::Panel).contains(CLOSE));
}

#[test]
fn assistant_sub_control_shifts_call_bar_and_resets_on_close() {
    let t0 = Instant::now();
    let mut panel = AssistantPanel::default();
    panel.toggle_panel(t0);
    panel.advance(t0 + Duration::from_millis(10));
    panel.activate_sub_control(t0 + Duration::from_millis(20));
    assert_eq!(panel.call_bar_offset(), 20.0);
    assert_eq!(panel.next_deadline(), Some(t0 + Duration::from_millis(30)));
    panel.advance(t0 + Duration::from_millis(30));
    assert!(panel.classes(Element::Microphone).contains(OPEN));

    panel.toggle_panel(t0 + Duration::from_millis(100));
    assert_eq!(panel.call_bar_offset(), 0.0);
    assert!(!panel.classes(Element::Microphone).contains(OPEN));
    panel.advance(t0 + Duration::from_millis(400));
    assert!(panel.classes(Element::Microphone).contains(CLOSE));
}

#[test]
fn assistant_glow_follows_press_and_release() {
    let mut panel = AssistantPanel::default();
    panel.start_glow();
    assert!(panel.classes(Element::Panel).contains(GLOW));
    panel.start_glow();
    panel.stop_glow();
    assert!(!panel.classes(Element::Panel).contains(GLOW));
    // Releasing without a press is harmless
    panel.stop_glow();
    assert!(!panel.classes(Element::Panel).contains(GLOW));
}

#[test]
fn sql_import_reads_tables_keys_and_foreign_keys() {
    let sql = r#"
        CREATE TABLE `users` (
          `id` INT NOT NULL AUTO_INCREMENT,
          `email` VARCHAR(255) NOT NULL,
          PRIMARY KEY (`id`)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;

        CREATE TABLE IF NOT EXISTS orders (
          id INT,
          user_id INT,
          total DECIMAL(10,2) DEFAULT '0,00',
          key_code VARCHAR(8),
          PRIMARY KEY (id),
          KEY idx_user (user_id),
          CONSTRAINT fk_user FOREIGN KEY (user_id) REFERENCES users (id)
        );
    "#;
    let doc = import_sql(sql);
    assert_eq!(doc.table_names().collect::<Vec<_>>(), vec!["users", "orders"]);

    let users = doc.get_table("users").expect("users");
    assert_eq!(users.fields.len(), 2);
    assert!(users.fields[0].is_primary);
    assert!(!users.fields[1].is_primary);
    assert_eq!(users.fields[1].ty, "VARCHAR(255) NOT NULL");

    let orders = doc.get_table("orders").expect("orders");
    let names: Vec<&str> = orders.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["id", "user_id", "total", "key_code"]);
    assert!(orders.fields[0].is_primary);
    assert!(orders.fields[2].ty.starts_with("DECIMAL(10,2)"));
    assert_eq!(orders.foreign_keys.len(), 1);

    assert_eq!(doc.relationships, vec![Relationship::new("orders", "user_id", "users", "id")]);
}

#[test]
fn schema_document_decodes_api_json() {
    let json = r#"{
        "tables": {
            "Users": { "fields": [ { "name": "id", "type": "INT", "is_primary": true }, { "name": "name", "type": "TEXT" } ] },
            "Orders": { "fields": [ { "name": "user_id", "type": "INT" } ] }
        },
        "relationships": [ { "from_table": "Orders", "from_field": "user_id", "to_table": "Users", "to_field": "id" } ]
    }"#;
    let doc = SchemaDocument::from_json(json).expect("valid document");
    assert_eq!(doc.revision, 0);
    assert_eq!(doc.table_count(), 2);
    assert!(!doc.get_table("Users").expect("users").fields[1].is_primary);
    assert_eq!(doc.relationships_for("Users").count(), 1);

    assert!(SchemaDocument::from_json("{\"relationships\": []}").is_err());
}

#[test]
fn apply_update_checks_revision_and_renames_in_place() {
    let mut doc = users_orders();
    let update = TableUpdate {
        name: "Customers".into(),
        fields: vec![Field::new("id", "BIGINT", true), Field::new("email", "TEXT", false)],
        base_revision: 3,
        renames: vec![],
    };
    assert_eq!(
        doc.apply_update("Users", update.clone()),
        Err(UpdateError::RevisionConflict { expected: 3, found: 0 })
    );

    let ok = TableUpdate { base_revision: 0, ..update };
    let table = doc.apply_update("Users", ok).expect("update applies");
    assert_eq!(table.fields[0].ty, "BIGINT");
    assert_eq!(doc.revision, 1);
    assert_eq!(doc.table_names().collect::<Vec<_>>(), vec!["Customers", "Orders"]);
    assert_eq!(doc.relationships[0].to_table, "Customers");

    let clash = TableUpdate {
        name: "Customers".into(),
        fields: vec![Field::new("id", "INT", true)],
        base_revision: 1,
        renames: vec![],
    };
    assert_eq!(doc.apply_update("Orders", clash), Err(UpdateError::NameTaken("Customers".into())));
    let missing = TableUpdate { name: "X".into(), fields: vec![], base_revision: 1, renames: vec![] };
    assert_eq!(doc.apply_update("Nope", missing), Err(UpdateError::UnknownTable("Nope".into())));
    assert_eq!(doc.revision, 1);
}

#[test]
fn table_draft_validates_and_fills_default_type() {
    let doc = users_orders();
    let mut scene = flat_scene();
    scene.build(doc);
    let mut draft: TableDraft = scene.open_editor("Users").expect("draft");
    assert_eq!(draft.rows.len(), 2);
    assert_eq!(draft.base_revision, 0);

    draft.add_field();
    assert_eq!(draft.rows.len(), 3);
    assert!(matches!(draft.to_update(), Err(UpdateError::Invalid(_))));

    draft.rows[2].name = "created_at".into();
    let update = draft.to_update().expect("valid draft");
    assert_eq!(update.fields[2].ty, NEW_FIELD_TYPE_HINT);

    draft.rows[2].name = "name".into();
    assert!(matches!(draft.to_update(), Err(UpdateError::Invalid(_))));

    assert!(draft.remove_field(2));
    assert!(!draft.remove_field(10));
    draft.name = "  ".into();
    assert!(matches!(draft.to_update(), Err(UpdateError::Invalid(_))));

    assert!(scene.open_editor("Nope").is_none());
}

#[test]
fn settings_defaults_feed_scene_and_panel() {
    let s: AppSettings = serde_json::from_str("{}").expect("empty settings parse");
    assert_eq!(s.schema_endpoint, "http://127.0.0.1:5000");
    assert_eq!(s.api_endpoint(), "127.0.0.1:5000");
    let cfg = s.scene_config();
    assert_eq!(cfg.layout, RadialLayout::default());
    assert_eq!(cfg.particle_count, 1000);
    assert!(cfg.seed.is_none());
    let timings = s.panel_timings();
    assert_eq!(timings.open_delay, Duration::from_millis(10));
    assert_eq!(timings.close_delay, Duration::from_millis(300));
    assert_eq!(timings.call_bar_shift, 20.0);
}

#[test]
fn client_builds_endpoint_urls() {
    let client = SchemaClient::new("http://127.0.0.1:5000", None).expect("client");
    assert_eq!(client.schema_url().expect("url").as_str(), "http://127.0.0.1:5000/api/schema");
    assert_eq!(
        client.table_url("Order Items").expect("url").as_str(),
        "http://127.0.0.1:5000/api/table/Order%20Items"
    );
    let nested = SchemaClient::new("http://example.com/tools", None).expect("client");
    assert_eq!(nested.schema_url().expect("url").as_str(), "http://example.com/tools/api/schema");
    assert!(SchemaClient::new("not a url", None).is_err());
}

#[cfg(feature = "api")]
#[test]
fn server_source_loads_json_and_sql() {
    use schema_loom::api::server::load_source;

    let dir = std::env::temp_dir().join(format!("schema-loom-test-{}", uuid::Uuid::now_v7().as_simple()));
    std::fs::create_dir_all(&dir).expect("temp dir");

    let json_path = dir.join("schema.json");
    let json = serde_json::to_string(&users_orders()).expect("serialize");
    std::fs::write(&json_path, json).expect("write json");
    assert_eq!(load_source(&json_path).expect("json source"), users_orders());

    let sql_path = dir.join("dump.SQL");
    std::fs::write(&sql_path, "CREATE TABLE t (id INT PRIMARY KEY);").expect("write sql");
    let doc = load_source(&sql_path).expect("sql source");
    assert!(doc.get_table("t").expect("t").fields[0].is_primary);

    assert!(load_source(&dir.join("missing.json")).is_err());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn sql_import_reads_named_primary_key_constraint() {
    let sql = "CREATE TABLE `accounts` (\n  `id` INT NOT NULL,\n  `code` CHAR(4),\n  CONSTRAINT `pk_accounts` PRIMARY KEY (`id`, `code`)\n);\nCREATE TABLE plain (id INT, CONSTRAINT pk_plain PRIMARY KEY (id));";
    let doc = import_sql(sql);
    let accounts = doc.get_table("accounts").expect("accounts");
    assert_eq!(accounts.fields.len(), 2);
    assert!(accounts.fields.iter().all(|f| f.is_primary));
    assert!(doc.get_table("plain").expect("plain").fields[0].is_primary);
}

#[test]
fn sql_import_ignores_parens_inside_string_literals() {
    let sql = r#"
        CREATE TABLE notes (
          id INT PRIMARY KEY,
          body TEXT COMMENT 'a);',
          `odd)name` VARCHAR(10) DEFAULT "(,",
          author_id INT,
          FOREIGN KEY (author_id) REFERENCES people (id)
        ) COMMENT='notes; with (parens)';
        CREATE TABLE people (id INT PRIMARY KEY);
    "#;
    let doc = import_sql(sql);
    assert_eq!(doc.table_names().collect::<Vec<_>>(), vec!["notes", "people"]);
    let notes = doc.get_table("notes").expect("notes");
    let names: Vec<&str> = notes.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["id", "body", "odd)name", "author_id"]);
    assert_eq!(notes.fields[1].ty, "TEXT COMMENT 'a);'");
    assert_eq!(doc.relationships, vec![Relationship::new("notes", "author_id", "people", "id")]);
}

#[test]
fn field_renames_follow_into_relationships_and_foreign_keys() {
    let mut doc = users_orders();
    doc.tables.get_mut("Orders").expect("orders").foreign_keys.push(ForeignKey {
        field: "user_id".into(),
        references_table: "Users".into(),
        references_field: "id".into(),
    });
    let mut scene = flat_scene();
    scene.build(doc.clone());

    // Renaming the referenced column through the editor
    let mut draft = scene.open_editor("Users").expect("draft");
    draft.rows[0].name = "user_pk".into();
    draft.add_field();
    draft.rows[2].name = "id".into();
    let update = draft.to_update().expect("valid draft");
    assert_eq!(update.renames, vec![FieldRename { from: "id".into(), to: "user_pk".into() }]);
    doc.apply_update("Users", update).expect("update applies");
    assert_eq!(doc.relationships[0], Relationship::new("Orders", "user_id", "Users", "user_pk"));
    assert_eq!(doc.get_table("Orders").expect("orders").foreign_keys[0].references_field, "user_pk");

    // Renaming the referencing column together with its table
    let update = TableUpdate {
        name: "Purchases".into(),
        fields: vec![Field::new("id", "INT", true), Field::new("customer_id", "INT", false)],
        base_revision: 1,
        renames: vec![
            FieldRename { from: "user_id".into(), to: "customer_id".into() },
            FieldRename { from: "missing".into(), to: "id".into() },
        ],
    };
    doc.apply_update("Orders", update).expect("update applies");
    assert_eq!(doc.relationships[0], Relationship::new("Purchases", "customer_id", "Users", "user_pk"));
    assert_eq!(
        doc.get_table("Purchases").expect("purchases").foreign_keys[0],
        ForeignKey { field: "customer_id".into(), references_table: "Users".into(), references_field: "user_pk".into() }
    );
    assert_eq!(doc.revision, 2);
}

#[test]
fn saved_document_lands_after_editor_closed() {
    let mut scene = flat_scene();
    scene.build(users_orders());
    let mut draft = scene.open_editor("Users").expect("draft");
    draft.name = "Customers".into();
    let update = draft.to_update().expect("valid draft");
    draft.saving = true;

    let mut server_doc = users_orders();
    server_doc.apply_update("Users", update).expect("server applies");

    // Window already gone when the answer arrives
    let mut editor: Option<TableDraft> = None;
    assert_eq!(scene.finish_save(&mut editor, Ok::<_, SaveError>(server_doc.clone())), None);
    assert_eq!(scene.document().revision, 1);
    assert!(scene.arena().by_name("Customers").is_some());
    assert_eq!(scene.open_editor("Orders").expect("draft").base_revision, 1);

    // Window still open: it closes and the saved table is selected
    let mut next = scene.open_editor("Orders").expect("draft");
    next.saving = true;
    let mut editor = Some(next);
    let update = editor.as_ref().expect("draft").to_update().expect("valid draft");
    server_doc.apply_update("Orders", update).expect("server applies");
    assert_eq!(scene.finish_save(&mut editor, Ok::<_, SaveError>(server_doc)), Some("Orders".to_string()));
    assert!(editor.is_none());
    assert_eq!(scene.selected_table(), Some("Orders"));
    assert_eq!(scene.document().revision, 2);

    // A failure stays on the open draft and leaves the scene alone
    let mut failing = scene.open_editor("Orders").expect("draft");
    failing.saving = true;
    let mut editor = Some(failing);
    assert_eq!(scene.finish_save(&mut editor, Err(SaveError::Conflict)), None);
    let draft = editor.expect("draft kept open");
    assert!(!draft.saving);
    assert_eq!(draft.status.as_deref(), Some(SaveError::Conflict.to_string().as_str()));
    assert_eq!(scene.document().revision, 2);
}

#[test]
fn failed_load_clears_the_previous_scene() {
    let mut scene = flat_scene();
    assert_eq!(scene.finish_load::<String>(Ok(users_orders())), Ok(()));
    let ray = ray_at(&scene, "Users");
    assert!(matches!(scene.select_at(&ray), SelectOutcome::Hit(_)));

    assert_eq!(scene.finish_load(Err("connection refused".to_string())), Err("connection refused".to_string()));
    assert!(scene.arena().is_empty());
    assert!(scene.edges().is_empty());
    assert_eq!(scene.selection(), Selection::NoSelection);
    assert!(scene.open_editor("Users").is_none());
    assert!(scene.table_info("Users").is_none());
    assert_eq!(scene.select_at(&ray), SelectOutcome::Miss);
}

#[cfg(feature = "api")]
fn temp_dir() -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("schema-loom-test-{}", uuid::Uuid::now_v7().as_simple()));
    std::fs::create_dir_all(&dir).expect("temp dir");
    dir
}

// A port nothing listens on once the temporary listener is dropped
#[cfg(feature = "api")]
fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

// Serves `body` with `status` for every path on its own actix system thread
#[cfg(feature = "api")]
fn serve_fixed(status: u16, body: &'static str) -> String {
    use actix_web::{http::StatusCode, web, App, HttpResponse, HttpServer};

    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        actix_web::rt::System::new().block_on(async move {
            let server = HttpServer::new(move || {
                App::new().default_service(web::to(move || async move {
                    HttpResponse::build(StatusCode::from_u16(status).expect("status")).body(body)
                }))
            })
            .workers(1)
            .bind(("127.0.0.1", 0))
            .expect("bind");
            tx.send(server.addrs()[0]).expect("send addr");
            server.run().await.expect("serve");
        });
    });
    format!("http://{}", rx.recv().expect("server address"))
}

#[cfg(feature = "api")]
#[actix_web::test]
async fn table_routes_map_update_errors_to_status_codes() {
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use schema_loom::api::server::ApiState;

    let dir = temp_dir();
    let state = ApiState::new(users_orders(), None, dir.clone());
    let app = test::init_service(App::new().configure(|sc| state.configure(sc))).await;

    let put = |table: &str, name: &str, base_revision: u64| {
        test::TestRequest::put()
            .uri(&format!("/api/table/{}", table))
            .set_json(TableUpdate {
                name: name.into(),
                fields: vec![Field::new("id", "INT", true)],
                base_revision,
                renames: vec![],
            })
            .to_request()
    };

    let resp = test::call_service(&app, put("Users", "Customers", 0)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let doc: SchemaDocument = test::read_body_json(resp).await;
    assert_eq!(doc.revision, 1);
    assert_eq!(doc.table_names().collect::<Vec<_>>(), vec!["Customers", "Orders"]);

    let resp = test::call_service(&app, put("Orders", "Orders", 0)).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let resp = test::call_service(&app, put("Users", "Users", 1)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let resp = test::call_service(&app, put("Orders", "Customers", 1)).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let resp = test::call_service(&app, put("Orders", "  ", 1)).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/table/Customers").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/table/Users").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(state.snapshot().expect("store").revision, 1);

    let locked = ApiState::new(users_orders(), Some("secret".into()), dir.clone());
    let app = test::init_service(App::new().configure(|sc| locked.configure(sc))).await;
    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/schema").to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let req = test::TestRequest::get().uri("/api/schema").insert_header(("X-API-Key", "secret")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let _ = std::fs::remove_dir_all(&dir);
}

#[cfg(feature = "api")]
#[test]
fn client_save_outcomes_against_running_server() {
    use schema_loom::api::client::FetchError;
    use schema_loom::api::server::{is_running, start_server, stop_server};

    let dir = temp_dir();
    let source = dir.join("schema.json");
    std::fs::write(&source, serde_json::to_string(&users_orders()).expect("serialize")).expect("write source");
    let port = free_port();
    let settings = AppSettings {
        api_port: port,
        schema_source: Some(source),
        api_log_override: Some(dir.join("logs")),
        ..AppSettings::default()
    };
    start_server(&settings).expect("server starts");
    assert!(is_running());

    let endpoint = format!("http://127.0.0.1:{}", port);
    let client = SchemaClient::new(&endpoint, None).expect("client");
    assert_eq!(client.fetch_schema().expect("fetch"), users_orders());

    let update = |name: &str, base_revision: u64| TableUpdate {
        name: name.into(),
        fields: vec![Field::new("id", "INT", true)],
        base_revision,
        renames: vec![],
    };
    let saved = client.save_table("Users", &update("Customers", 0)).expect("save");
    assert_eq!(saved.revision, 1);
    assert_eq!(saved.relationships[0].to_table, "Customers");

    assert!(matches!(client.save_table("Orders", &update("Orders", 0)), Err(SaveError::Conflict)));
    assert!(matches!(client.save_table("Users", &update("Users", 1)), Err(SaveError::NotFound)));
    match client.save_table("Orders", &update("Customers", 1)) {
        Err(SaveError::Rejected(msg)) => assert!(msg.contains("already exists"), "unexpected body: {}", msg),
        other => panic!("expected a rejection, got {:?}", other),
    }

    let elsewhere = SchemaClient::new(&format!("{}/elsewhere", endpoint), None).expect("client");
    assert!(matches!(elsewhere.fetch_schema(), Err(FetchError::Status(404))));

    stop_server();
    let _ = std::fs::remove_dir_all(&dir);
}

#[cfg(feature = "api")]
#[test]
fn fetch_reports_refused_connection_status_and_bad_body() {
    use schema_loom::api::client::FetchError;

    let closed = SchemaClient::new(&format!("http://127.0.0.1:{}", free_port()), None).expect("client");
    assert!(matches!(closed.fetch_schema(), Err(FetchError::Http(_))));

    let failing = SchemaClient::new(&serve_fixed(503, "down for maintenance"), None).expect("client");
    assert!(matches!(failing.fetch_schema(), Err(FetchError::Status(503))));

    let garbled = SchemaClient::new(&serve_fixed(200, r#"{"tables": 5}"#), None).expect("client");
    assert!(matches!(garbled.fetch_schema(), Err(FetchError::Decode(_))));
}
