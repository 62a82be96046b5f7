use egui::{Color32, Context};
use crate::events::UiEvent;
use crate::ui::{UiComponent, UiContext};

#[derive(Default)]
pub struct CentralPanel {
    /// Last size sent to the viewport, in physical pixels.
    last_size: Option<(u32, u32)>,
}

impl UiComponent for CentralPanel {
    fn show(&mut self, ctx: &Context, ui_ctx: &mut UiContext) {
        egui::CentralPanel::default()
            .frame(egui::Frame::default().fill(Color32::TRANSPARENT))
            .show(ctx, |ui| {
                // claim the whole panel so the viewport never collapses to zero
                let (rect, _) = ui.allocate_exact_size(ui.available_size(), egui::Sense::hover());
                ui_ctx.viewport_rect = Some(rect);

                let scale = ctx.pixels_per_point();
                let size = (
                    (rect.width() * scale).round() as u32,
                    (rect.height() * scale).round() as u32,
                );
                if size.0 > 0 && size.1 > 0 && self.last_size != Some(size) {
                    self.last_size = Some(size);
                    ui_ctx.send_event(UiEvent::Resize { width: size.0, height: size.1 });
                }

                match ui_ctx.viewport_texture {
                    Some(texture) => {
                        let uv = egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));
                        ui.painter().image(texture, rect, uv, Color32::WHITE);
                    }
                    None => {
                        let hint = if ui_ctx.status.is_active() {
                            "Converting… the model appears here when it is ready."
                        } else {
                            "Select an image and convert it to see the model here."
                        };
                        ui.painter().text(
                            rect.center(),
                            egui::Align2::CENTER_CENTER,
                            hint,
                            egui::FontId::proportional(16.0),
                            Color32::GRAY,
                        );
                    }
                }
            });
    }
}
