use egui::{Color32, Context, RichText};
use df_core::{JobStatus, StepState};
use crate::state::DownloadState;
use crate::events::UiEvent;
use crate::ui::{UiComponent, UiContext};

const ERROR_COLOR: Color32 = Color32::from_rgb(230, 90, 80);

#[derive(Default)]
pub struct SidePanel {}

impl SidePanel {
    fn image_section(&self, ui: &mut egui::Ui, ui_ctx: &UiContext) {
        ui.heading(RichText::new("🖼 Image").size(16.0));
        ui.add_space(5.0);

        if ui.button("📂 Select image…").clicked() {
            if let Some(path) = rfd::FileDialog::new()
                .add_filter("Image", &["png", "jpg", "jpeg"])
                .pick_file()
            {
                ui_ctx.send_event(UiEvent::SelectFile(path));
            }
        }

        match &ui_ctx.selected {
            Some(name) => ui.label(RichText::new(name).strong()),
            None => ui.label(RichText::new("No image selected").color(Color32::GRAY)),
        };
        if let Some(e) = &ui_ctx.validation_error {
            ui.label(RichText::new(e).color(ERROR_COLOR));
        }

        ui.add_space(8.0);
        let convert = ui.add_enabled(
            ui_ctx.selected.is_some() && !ui_ctx.status.is_active(),
            egui::Button::new(RichText::new("🧊 Convert to 3D").size(14.0))
                .min_size(egui::vec2(ui.available_width(), 30.0)),
        );
        if convert.clicked() {
            ui_ctx.send_event(UiEvent::Convert);
        }
    }

    fn progress_section(&self, ui: &mut egui::Ui, ui_ctx: &UiContext) {
        ui.horizontal(|ui| {
            if ui_ctx.status.is_active() {
                ui.spinner();
            }
            ui.label(format!("{} {:?}", ui_ctx.status.icon(), ui_ctx.status));
        });

        if ui_ctx.status == JobStatus::Processing {
            for (step, state) in ui_ctx.steps {
                let text = match state {
                    StepState::Complete => RichText::new(format!("✓ {}", step.label())).color(Color32::LIGHT_GREEN),
                    StepState::Active => RichText::new(format!("▶ {}", step.label())).strong(),
                    StepState::Pending => RichText::new(format!("  {}", step.label())).color(Color32::GRAY),
                };
                ui.label(text);
            }
            if !ui_ctx.progress_message.is_empty() {
                ui.label(RichText::new(&ui_ctx.progress_message).color(Color32::LIGHT_BLUE));
            }
        }

        if let Some(job_id) = &ui_ctx.polling_job {
            ui.label(RichText::new(format!("Polling job {}", job_id)).small().color(Color32::GRAY));
        }
        if let Some(secs) = ui_ctx.elapsed_secs {
            ui.label(RichText::new(format!("Finished in {}s", secs)).small());
        }

        if ui_ctx.status == JobStatus::Error {
            if let Some(e) = &ui_ctx.job_error {
                ui.label(RichText::new(e).color(ERROR_COLOR));
            }
        }
        if let Some(e) = &ui_ctx.asset_error {
            ui.label(RichText::new(e).color(ERROR_COLOR));
        }
    }

    fn download_section(&self, ui: &mut egui::Ui, ui_ctx: &UiContext) {
        let ready = ui_ctx.status == JobStatus::Complete && ui_ctx.download != DownloadState::InProgress;
        let download = ui.add_enabled(
            ready,
            egui::Button::new("💾 Download model.glb").min_size(egui::vec2(ui.available_width(), 24.0)),
        );
        if download.clicked() {
            ui_ctx.send_event(UiEvent::Download);
        }

        match &ui_ctx.download {
            DownloadState::Idle => {}
            DownloadState::InProgress => {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Downloading…");
                });
            }
            DownloadState::Saved(path) => {
                ui.label(RichText::new(format!("Saved {}", path.display())).small());
            }
            DownloadState::Failed(e) => {
                ui.label(RichText::new(format!("Download failed: {}", e)).color(ERROR_COLOR));
            }
        }
    }
}

impl UiComponent for SidePanel {
    fn show(&mut self, ctx: &Context, ui_ctx: &mut UiContext) {
        egui::SidePanel::left("side_panel")
            .default_width(300.0)
            .show(ctx, |ui| {
                ui.heading("DepthForge");
                ui.separator();

                self.image_section(ui, ui_ctx);
                ui.separator();

                self.progress_section(ui, ui_ctx);
                ui.separator();

                self.download_section(ui, ui_ctx);
                ui.separator();

                ui.heading("🎮 Camera Controls");
                ui.label("• Left drag: Rotate");
                ui.label("• Mouse wheel: Zoom");

                if ui.button("🔄 Reset Camera").clicked() {
                    ui_ctx.send_event(UiEvent::ResetCamera);
                }
            });
    }
}
