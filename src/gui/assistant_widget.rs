//! Bottom-right assistant: a round toggle button with a slide-out panel
//! holding the call bar and the microphone. All state lives in
//! [`AssistantPanel`]; this module only maps its classes to pixels.

use std::time::Instant;

use eframe::egui::{self, Color32, CornerRadius, Margin, Stroke};

use crate::assistant::panel::{AssistantPanel, Element, ACTIVE, GLOW, OPEN};

const ACCENT: Color32 = Color32::from_rgb(99, 102, 241);
const GLOW_COLOR: Color32 = Color32::from_rgb(165, 180, 252);
const PANEL_WIDTH: f32 = 220.0;

/// Height reserved at the bottom-right, so toasts can stack above it.
pub const FOOTPRINT: f32 = 72.0;

pub fn show(ctx: &egui::Context, panel: &mut AssistantPanel, now: Instant) {
    panel.advance(now);

    let close_secs = panel.timings().close_delay.as_secs_f32();
    let open_t = ctx.animate_bool_with_time(
        egui::Id::new("assistant_panel_open"),
        panel.classes(Element::Panel).contains(OPEN),
        close_secs,
    );
    let mic_t = ctx.animate_bool_with_time(
        egui::Id::new("assistant_mic_open"),
        panel.classes(Element::Microphone).contains(OPEN),
        close_secs,
    );
    let offset = ctx.animate_value_with_time(
        egui::Id::new("assistant_call_bar_offset"),
        panel.call_bar_offset(),
        close_secs,
    );

    egui::Area::new("assistant".into())
        .anchor(egui::Align2::RIGHT_BOTTOM, egui::vec2(-16.0, -16.0))
        .show(ctx, |ui| {
            ui.horizontal(|ui| {
                if open_t > 0.0 {
                    let glowing = panel.classes(Element::Panel).contains(GLOW);
                    let stroke = if glowing {
                        Stroke::new(3.0, GLOW_COLOR)
                    } else {
                        Stroke::new(1.0, Color32::from_gray(70))
                    };
                    egui::Frame::new()
                        .fill(Color32::from_rgba_unmultiplied(30, 41, 59, (235.0 * open_t) as u8))
                        .stroke(stroke)
                        .corner_radius(CornerRadius::same(20))
                        .inner_margin(Margin::symmetric(10, 8))
                        .show(ui, |ui| {
                            ui.set_width(PANEL_WIDTH * open_t);
                            ui.horizontal(|ui| {
                                ui.add_space(offset);
                                if ui.add(egui::Button::new("Call").corner_radius(12)).clicked() {
                                    panel.activate_sub_control(now);
                                }
                                if mic_t > 0.0 {
                                    let tint = Color32::WHITE.gamma_multiply(mic_t);
                                    let mic = ui.add(
                                        egui::Button::new(egui::RichText::new("Mic").color(tint))
                                            .corner_radius(12)
                                            .sense(egui::Sense::click_and_drag()),
                                    );
                                    if mic.is_pointer_button_down_on() {
                                        panel.start_glow();
                                    }
                                }
                            });
                        });
                }

                let active = panel.classes(Element::Button).contains(ACTIVE);
                let fill = if active { ACCENT } else { Color32::from_gray(50) };
                let label = if active { "×" } else { "AI" };
                let button = egui::Button::new(egui::RichText::new(label).size(18.0).color(Color32::WHITE))
                    .fill(fill)
                    .corner_radius(24)
                    .min_size(egui::vec2(48.0, 48.0));
                if ui.add(button).on_hover_text("Assistant").clicked() {
                    panel.toggle_panel(now);
                }
            });
        });

    // Releasing anywhere ends the glow, not just over the microphone
    if ctx.input(|i| i.pointer.any_released()) {
        panel.stop_glow();
    }

    if let Some(due) = panel.next_deadline() {
        ctx.request_repaint_after(due.saturating_duration_since(now));
    }
    if (open_t > 0.0 && open_t < 1.0) || (mic_t > 0.0 && mic_t < 1.0) {
        ctx.request_repaint();
    }
}
