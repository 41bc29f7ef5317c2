use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::{Duration, Instant};

use eframe::egui::{self, Color32, Key, KeyboardShortcut, Modifiers, PointerButton, RichText, Sense, Stroke};

use crate::api;
use crate::api::client::{spawn_fetch, spawn_save, FetchError, SaveError};
use crate::assistant::panel::AssistantPanel;
use crate::gui::{assistant_widget, render};
use crate::persistence::settings::AppSettings;
use crate::scene::editor::{TableDraft, NEW_FIELD_TYPE_HINT};
use crate::scene::manager::{SchemaScene, SelectOutcome};
use crate::schema_utils::schema::SchemaDocument;

const LOAD_ERROR_TEXT: &str = "Error loading database schema";

enum LoadState {
    Loading,
    Ready,
    Failed(String),
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum NoticeStyle {
    Subtle,
    Prominent,
}

pub struct SchemaApp {
    scene: SchemaScene,
    assistant: AssistantPanel,
    load_state: LoadState,
    fetch_rx: Option<Receiver<Result<SchemaDocument, FetchError>>>,
    save_rx: Option<Receiver<Result<SchemaDocument, SaveError>>>,
    editor: Option<TableDraft>,
    hovered_table: Option<String>,
    started: Instant,
    sidebar_open: bool,
    // toast
    last_info: Option<String>,
    last_info_time: Option<Instant>,
    last_info_style: NoticeStyle,
    // preferences
    app_settings: AppSettings,
    show_prefs_window: bool,
    prefs_edit: AppSettings,
    prefs_status: Option<String>,
    prefs_schema_source_str: String,
    prefs_api_log_override_str: String,
    prefs_seed_str: String,
    prefs_api_key_str: String,
    api_running: bool,
    api_error: Option<String>,
}

fn path_string(p: &Option<std::path::PathBuf>) -> String {
    match p {
        Some(p) => p.display().to_string(),
        None => String::new(),
    }
}

fn optional_path(s: &str) -> Option<std::path::PathBuf> {
    if s.trim().is_empty() { None } else { Some(std::path::PathBuf::from(s.trim())) }
}

impl SchemaApp {
    pub fn new(app_settings: AppSettings) -> Self {
        let api_running = api::server::is_running();
        let mut app = Self {
            scene: SchemaScene::new(app_settings.scene_config()),
            assistant: AssistantPanel::new(app_settings.panel_timings()),
            load_state: LoadState::Loading,
            fetch_rx: None,
            save_rx: None,
            editor: None,
            hovered_table: None,
            started: Instant::now(),
            sidebar_open: true,
            last_info: None,
            last_info_time: None,
            last_info_style: NoticeStyle::Prominent,
            prefs_edit: app_settings.clone(),
            app_settings,
            show_prefs_window: false,
            prefs_status: None,
            prefs_schema_source_str: String::new(),
            prefs_api_log_override_str: String::new(),
            prefs_seed_str: String::new(),
            prefs_api_key_str: String::new(),
            api_running,
            api_error: None,
        };
        app.menu_reload_schema();
        app
    }

    fn notify(&mut self, msg: impl Into<String>, style: NoticeStyle) {
        self.last_info = Some(msg.into());
        self.last_info_time = Some(Instant::now());
        self.last_info_style = style;
    }

    pub fn menu_reload_schema(&mut self) {
        self.load_state = LoadState::Loading;
        self.fetch_rx = Some(spawn_fetch(
            self.app_settings.schema_endpoint.clone(),
            self.app_settings.api_key.clone(),
        ));
    }

    pub fn menu_reset_view(&mut self) {
        self.scene.reset_camera();
    }

    pub fn menu_toggle_relationships(&mut self) {
        let shown = self.scene.toggle_relationships();
        self.notify(if shown { "Relationships shown" } else { "Relationships hidden" }, NoticeStyle::Subtle);
    }

    pub fn menu_toggle_particles(&mut self) {
        let shown = self.scene.toggle_particles();
        self.notify(if shown { "Particles shown" } else { "Particles hidden" }, NoticeStyle::Subtle);
    }

    pub fn menu_relayout(&mut self) {
        self.scene.relayout();
    }

    pub fn menu_open_prefs(&mut self) {
        self.prefs_edit = self.app_settings.clone();
        self.prefs_schema_source_str = path_string(&self.prefs_edit.schema_source);
        self.prefs_api_log_override_str = path_string(&self.prefs_edit.api_log_override);
        self.prefs_seed_str = self.prefs_edit.layout_seed.map(|s| s.to_string()).unwrap_or_default();
        self.prefs_api_key_str = self.prefs_edit.api_key.clone().unwrap_or_default();
        self.prefs_status = None;
        self.show_prefs_window = true;
    }

    fn open_editor(&mut self, table: &str) {
        if self.save_rx.is_some() {
            self.notify("A save is still in progress", NoticeStyle::Subtle);
            return;
        }
        if let Some(draft) = self.scene.open_editor(table) {
            self.editor = Some(draft);
        }
    }

    fn save_editor(&mut self) {
        let Some(draft) = self.editor.as_mut() else { return };
        match draft.to_update() {
            Ok(update) => {
                draft.status = None;
                draft.saving = true;
                self.save_rx = Some(spawn_save(
                    self.app_settings.schema_endpoint.clone(),
                    self.app_settings.api_key.clone(),
                    draft.original_name.clone(),
                    update,
                ));
            }
            Err(e) => draft.status = Some(e.to_string()),
        }
    }

    fn poll_background(&mut self) {
        let fetched = match &self.fetch_rx {
            Some(rx) => match rx.try_recv() {
                Ok(res) => Some(res.map_err(|e| e.to_string())),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => Some(Err("schema fetch worker exited".to_string())),
            },
            None => None,
        };
        if let Some(res) = fetched {
            self.fetch_rx = None;
            match self.scene.finish_load(res) {
                Ok(()) => self.load_state = LoadState::Ready,
                Err(e) => {
                    // The cleared scene has nothing to edit
                    if self.save_rx.is_none() {
                        self.editor = None;
                    }
                    self.load_state = LoadState::Failed(e);
                }
            }
        }
        self.poll_save();
    }

    // Polled until the worker answers, whether or not the edit window is open
    fn poll_save(&mut self) {
        let Some(rx) = &self.save_rx else { return };
        let res = match rx.try_recv() {
            Ok(res) => res,
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => Err(SaveError::Rejected("save worker exited".into())),
        };
        self.save_rx = None;
        let saved = res.is_ok();
        if let Some(name) = self.scene.finish_save(&mut self.editor, res) {
            self.notify(format!("Saved table {}", name), NoticeStyle::Prominent);
        }
        if saved {
            self.load_state = LoadState::Ready;
        }
    }

    fn show_info_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Table");
        ui.separator();
        let Some(name) = self.scene.selected_table().map(str::to_string) else {
            ui.label("Click a table to see its fields and relationships.");
            ui.small("Double-click to edit.");
            return;
        };
        let Some(info) = self.scene.table_info(&name) else { return };
        ui.label(RichText::new(&info.name).strong().size(18.0));
        ui.add_space(6.0);
        egui::ScrollArea::vertical().show(ui, |ui| {
            for field in &info.fields {
                ui.horizontal(|ui| {
                    ui.monospace(&field.name);
                    ui.weak(&field.ty);
                    if field.is_primary {
                        ui.colored_label(Color32::GOLD, "(PK)");
                    }
                });
            }
            if !info.relationships.is_empty() {
                ui.add_space(8.0);
                ui.label(RichText::new("Relationships").strong());
                for line in &info.relationships {
                    ui.monospace(line.to_string());
                }
            }
        });
        ui.separator();
        if ui.button("Edit Table…").clicked() {
            self.open_editor(&name);
        }
    }

    fn show_canvas(&mut self, ui: &mut egui::Ui) {
        let available = ui.available_rect_before_wrap();
        let resp = ui.allocate_rect(available, Sense::click_and_drag());
        let height = available.height();

        if resp.dragged_by(PointerButton::Primary) {
            self.scene.camera_mut().rotate(resp.drag_delta(), height);
        } else if resp.dragged_by(PointerButton::Secondary) || resp.dragged_by(PointerButton::Middle) {
            self.scene.camera_mut().pan(resp.drag_delta(), height);
        }
        if resp.hovered() {
            let scroll = ui.input(|i| i.smooth_scroll_delta.y);
            self.scene.camera_mut().zoom(scroll);
        }

        self.hovered_table = resp
            .hover_pos()
            .map(|p| self.scene.camera().ray_through(p, available))
            .and_then(|ray| self.scene.hover_at(&ray).map(str::to_string));
        if self.hovered_table.is_some() {
            ui.ctx().set_cursor_icon(egui::CursorIcon::PointingHand);
        }

        if let Some(pos) = resp.interact_pointer_pos() {
            let ray = self.scene.camera().ray_through(pos, available);
            if resp.double_clicked() {
                if let Some(name) = self.scene.hover_at(&ray).map(str::to_string) {
                    self.open_editor(&name);
                }
            } else if resp.clicked() {
                if let SelectOutcome::Hit(name) = self.scene.select_at(&ray) {
                    log::debug!("selected table {}", name);
                }
            }
        }

        let painter = ui.painter_at(available);
        render::paint_scene(&painter, available, &self.scene);
        match &self.load_state {
            LoadState::Loading => render::paint_status(&painter, available, "Loading database schema…", Color32::LIGHT_GRAY),
            LoadState::Failed(_) => render::paint_status(&painter, available, LOAD_ERROR_TEXT, Color32::from_rgb(248, 113, 113)),
            LoadState::Ready => {
                if self.scene.arena().is_empty() {
                    render::paint_status(&painter, available, "Schema has no tables", Color32::LIGHT_GRAY);
                }
            }
        }
        if let Some(name) = &self.hovered_table {
            if let Some(pos) = resp.hover_pos() {
                painter.text(
                    pos + egui::vec2(14.0, 14.0),
                    egui::Align2::LEFT_TOP,
                    name,
                    egui::FontId::proportional(13.0),
                    Color32::WHITE,
                );
            }
        }
    }

    fn show_editor_window(&mut self, ctx: &egui::Context) {
        let Some(draft) = self.editor.as_mut() else { return };
        let mut open = true;
        let mut save_clicked = false;
        let mut cancel_clicked = false;
        egui::Window::new(format!("Edit Table: {}", draft.original_name))
            .open(&mut open)
            .resizable(true)
            .collapsible(false)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.label("Table name:");
                    ui.text_edit_singleline(&mut draft.name);
                });
                ui.separator();
                let mut remove: Option<usize> = None;
                egui::Grid::new("editor_fields").striped(true).show(ui, |ui| {
                    ui.strong("Field");
                    ui.strong("Type");
                    ui.strong("PK");
                    ui.label("");
                    ui.end_row();
                    for (idx, row) in draft.rows.iter_mut().enumerate() {
                        ui.add(egui::TextEdit::singleline(&mut row.name).hint_text("Field name").desired_width(140.0));
                        ui.add(egui::TextEdit::singleline(&mut row.ty).hint_text(NEW_FIELD_TYPE_HINT).desired_width(140.0));
                        ui.checkbox(&mut row.is_primary, "");
                        if ui.small_button("Remove").clicked() {
                            remove = Some(idx);
                        }
                        ui.end_row();
                    }
                });
                if let Some(idx) = remove {
                    draft.remove_field(idx);
                }
                if ui.button("Add Field").clicked() {
                    draft.add_field();
                }
                ui.separator();
                if let Some(msg) = &draft.status {
                    ui.colored_label(Color32::RED, msg);
                }
                ui.horizontal(|ui| {
                    let save = ui.add_enabled(!draft.saving, egui::Button::new("Save"));
                    if save.clicked() {
                        save_clicked = true;
                    }
                    if ui.add_enabled(!draft.saving, egui::Button::new("Cancel")).clicked() {
                        cancel_clicked = true;
                    }
                    if draft.saving {
                        ui.spinner();
                    }
                });
            });
        if save_clicked {
            self.save_editor();
        }
        // Closing is refused while a save is in flight; its result still has to land
        let saving = self.editor.as_ref().is_some_and(|d| d.saving);
        if (!open || cancel_clicked) && !saving {
            self.editor = None;
        }
    }

    fn show_prefs_window(&mut self, ctx: &egui::Context) {
        let mut open = true;
        egui::Window::new("Preferences")
            .open(&mut open)
            .resizable(true)
            .collapsible(false)
            .show(ctx, |ui| {
                ui.heading("Schema");
                ui.separator();
                ui.label("Schema endpoint:");
                ui.text_edit_singleline(&mut self.prefs_edit.schema_endpoint);
                ui.label("API key sent with requests (empty for none):");
                ui.text_edit_singleline(&mut self.prefs_api_key_str);

                ui.add_space(8.0);
                ui.heading("Scene");
                ui.separator();
                ui.add(egui::Slider::new(&mut self.prefs_edit.layout_radius, 5.0..=100.0).text("Layout radius"));
                ui.add(egui::Slider::new(&mut self.prefs_edit.layout_jitter, 0.0..=30.0).text("Position jitter"));
                ui.horizontal(|ui| {
                    ui.label("Layout seed (empty for random):");
                    ui.text_edit_singleline(&mut self.prefs_seed_str);
                });
                ui.add(egui::Slider::new(&mut self.prefs_edit.particle_count, 0..=5000).text("Particles"));

                ui.add_space(8.0);
                ui.heading("Assistant");
                ui.separator();
                ui.add(egui::Slider::new(&mut self.prefs_edit.panel_open_delay_ms, 0..=1000).text("Open delay (ms)"));
                ui.add(egui::Slider::new(&mut self.prefs_edit.panel_close_delay_ms, 0..=2000).text("Close delay (ms)"));
                ui.add(egui::Slider::new(&mut self.prefs_edit.call_bar_shift, 0.0..=100.0).text("Call bar shift (px)"));

                ui.add_space(8.0);
                ui.heading("Embedded API");
                ui.separator();
                ui.checkbox(&mut self.prefs_edit.api_enabled, "Serve the schema API from this app");
                ui.horizontal(|ui| {
                    ui.label("Bind address:");
                    ui.text_edit_singleline(&mut self.prefs_edit.api_bind_addr);
                });
                ui.horizontal(|ui| {
                    ui.label("Port:");
                    ui.add(egui::DragValue::new(&mut self.prefs_edit.api_port).range(1..=65535));
                });
                ui.label("Schema source (.sql dump or .json document):");
                ui.text_edit_singleline(&mut self.prefs_schema_source_str);
                ui.label("API log directory (leave empty for OS temp):");
                ui.text_edit_singleline(&mut self.prefs_api_log_override_str);
                if ui.button("Clear to default (OS temp)").clicked() {
                    self.prefs_api_log_override_str.clear();
                }
                ui.small(format!("Default: {}", AppSettings::api_log_default_dir().display()));

                ui.add_space(8.0);
                ui.label("Settings save directory:");
                ui.monospace(AppSettings::settings_dir().display().to_string());

                if let Some(msg) = &self.prefs_status {
                    ui.separator();
                    ui.colored_label(Color32::RED, msg);
                }
                ui.separator();
                ui.horizontal(|ui| {
                    if ui.button("Save").clicked() {
                        self.apply_prefs();
                    }
                    if ui.button("Cancel").clicked() {
                        self.show_prefs_window = false;
                    }
                });
            });
        if !open {
            self.show_prefs_window = false;
        }
    }

    fn apply_prefs(&mut self) {
        self.prefs_edit.layout_seed = if self.prefs_seed_str.trim().is_empty() {
            None
        } else {
            match self.prefs_seed_str.trim().parse::<u64>() {
                Ok(s) => Some(s),
                Err(_) => {
                    self.prefs_status = Some("Layout seed must be a whole number".into());
                    return;
                }
            }
        };
        self.prefs_edit.schema_source = optional_path(&self.prefs_schema_source_str);
        self.prefs_edit.api_log_override = optional_path(&self.prefs_api_log_override_str);
        self.prefs_edit.api_key = if self.prefs_api_key_str.trim().is_empty() {
            None
        } else {
            Some(self.prefs_api_key_str.trim().to_string())
        };

        if let Err(e) = self.prefs_edit.save() {
            self.prefs_status = Some(format!("Failed to save preferences: {}", e));
            return;
        }
        let old = &self.app_settings;
        let old_api = (old.api_enabled, old.api_bind_addr.clone(), old.api_port, old.api_key.clone(), old.schema_source.clone());
        let old_endpoint = old.schema_endpoint.clone();
        self.app_settings = self.prefs_edit.clone();
        let new = &self.app_settings;
        let new_api = (new.api_enabled, new.api_bind_addr.clone(), new.api_port, new.api_key.clone(), new.schema_source.clone());

        self.scene.set_config(self.app_settings.scene_config());
        self.assistant.set_timings(self.app_settings.panel_timings());

        let mut reload = old_endpoint != self.app_settings.schema_endpoint;
        if old_api != new_api {
            api::server::stop_server();
            self.api_error = None;
            if self.app_settings.api_enabled {
                if let Err(e) = api::server::start_server(&self.app_settings) {
                    log::error!("failed to start API server: {:#}", e);
                    self.api_error = Some(e.to_string());
                }
            }
            self.api_running = api::server::is_running();
            reload = true;
        }
        if reload {
            self.menu_reload_schema();
        }
        self.notify("Preferences saved", NoticeStyle::Prominent);
        self.show_prefs_window = false;
    }

    fn show_toast(&self, ctx: &egui::Context) {
        let (Some(msg), Some(when)) = (&self.last_info, self.last_info_time) else { return };
        if when.elapsed() > Duration::from_secs(3) {
            return;
        }
        let margin = egui::vec2(12.0, 12.0 + assistant_widget::FOOTPRINT);
        egui::Area::new("bottom_right_toast".into())
            .anchor(egui::Align2::RIGHT_BOTTOM, egui::vec2(-margin.x, -margin.y))
            .interactable(false)
            .show(ctx, |ui| {
                let (fill, stroke_col, stroke_w, text_col) = match self.last_info_style {
                    NoticeStyle::Subtle => (
                        Color32::from_rgba_premultiplied(20, 20, 20, 170),
                        Color32::from_gray(60),
                        0.5,
                        Color32::from_gray(200),
                    ),
                    NoticeStyle::Prominent => (
                        Color32::from_rgba_premultiplied(30, 30, 30, 230),
                        Color32::from_gray(100),
                        1.5,
                        Color32::LIGHT_GREEN,
                    ),
                };
                egui::Frame::popup(ui.style())
                    .corner_radius(egui::CornerRadius::same(8))
                    .stroke(Stroke { width: stroke_w, color: stroke_col })
                    .fill(fill)
                    .inner_margin(egui::Margin::symmetric(10, 6))
                    .show(ui, |ui| {
                        ui.colored_label(text_col, msg);
                    });
            });
        ctx.request_repaint_after(Duration::from_millis(250));
    }
}

impl eframe::App for SchemaApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_background();

        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let settling = self.scene.tick(elapsed_ms);

        let reload_sc = KeyboardShortcut::new(Modifiers::COMMAND, Key::R);
        let reset_sc = KeyboardShortcut::new(Modifiers::COMMAND, Key::Num0);
        if ctx.input_mut(|i| i.consume_shortcut(&reload_sc)) {
            self.menu_reload_schema();
        }
        if ctx.input_mut(|i| i.consume_shortcut(&reset_sc)) {
            self.menu_reset_view();
        }

        if self.show_prefs_window {
            self.show_prefs_window(ctx);
        }

        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label("Schema-Loom");

                ui.menu_button("File", |ui| {
                    if ui.add(egui::Button::new("Reload Schema").shortcut_text(ctx.format_shortcut(&reload_sc))).clicked() {
                        self.menu_reload_schema();
                        ui.close();
                    }
                    if ui.button("Preferences…").clicked() {
                        self.menu_open_prefs();
                        ui.close();
                    }
                    ui.separator();
                    if ui.button("Quit").clicked() {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                        ui.close();
                    }
                });

                ui.menu_button("View", |ui| {
                    if ui.add(egui::Button::new("Reset View").shortcut_text(ctx.format_shortcut(&reset_sc))).clicked() {
                        self.menu_reset_view();
                        ui.close();
                    }
                    let rel_label = if self.scene.relationships_visible() { "Hide Relationships" } else { "Show Relationships" };
                    if ui.button(rel_label).clicked() {
                        self.menu_toggle_relationships();
                        ui.close();
                    }
                    let particle_label = if self.scene.particles_visible() { "Hide Particles" } else { "Show Particles" };
                    if ui.button(particle_label).clicked() {
                        self.menu_toggle_particles();
                        ui.close();
                    }
                    if ui.button("Re-run Layout").clicked() {
                        self.menu_relayout();
                        ui.close();
                    }
                    ui.separator();
                    let sidebar_label = if self.sidebar_open { "Hide Sidebar" } else { "Show Sidebar" };
                    if ui.button(sidebar_label).clicked() {
                        self.sidebar_open = !self.sidebar_open;
                        ui.close();
                    }
                });

                ui.separator();
                if ui.button("Reset Camera").clicked() {
                    self.menu_reset_view();
                }
                if ui.selectable_label(self.scene.relationships_visible(), "Relationships").clicked() {
                    self.menu_toggle_relationships();
                }
                if ui.selectable_label(self.scene.particles_visible(), "Particles").clicked() {
                    self.menu_toggle_particles();
                }

                ui.separator();
                let doc = self.scene.document();
                ui.small(format!("T:{} R:{} rev {}", doc.table_count(), doc.relationship_count(), doc.revision));
                if self.api_running {
                    ui.small(format!("API on {}", self.app_settings.api_endpoint()));
                }
                if let Some(err) = &self.api_error {
                    ui.colored_label(Color32::RED, err);
                }
                if let LoadState::Failed(err) = &self.load_state {
                    ui.colored_label(Color32::RED, LOAD_ERROR_TEXT).on_hover_text(err);
                }
            });
        });

        if self.sidebar_open {
            egui::SidePanel::right("info_panel")
                .resizable(true)
                .default_width(260.0)
                .show(ctx, |ui| self.show_info_panel(ui));
        }

        egui::CentralPanel::default()
            .frame(egui::Frame::new().fill(crate::scene::arena::hex(render::BACKGROUND)))
            .show(ctx, |ui| self.show_canvas(ui));

        self.show_editor_window(ctx);
        assistant_widget::show(ctx, &mut self.assistant, Instant::now());
        self.show_toast(ctx);

        if self.scene.particles_visible() || settling {
            ctx.request_repaint();
        } else if self.fetch_rx.is_some() || self.save_rx.is_some() {
            ctx.request_repaint_after(Duration::from_millis(50));
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        if api::server::is_running() {
            api::server::stop_server();
        }
    }
}
