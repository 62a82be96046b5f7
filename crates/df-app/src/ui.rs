mod central_panel;
mod side_panel;

pub use central_panel::CentralPanel;
pub use side_panel::SidePanel;

use std::sync::Arc;
use egui::Context;
use egui_wgpu::wgpu;
use winit::window::Window;
use df_core::{JobStatus, Step, StepState};
use crate::events::{EventProxy, UiEvent};
use crate::gfx::GfxState;
use crate::state::{AppState, DownloadState};
use crate::viewport::gpu::PresentTarget;

/// What the panels read each frame, refreshed from [`AppState`] before
/// drawing. Panels never touch the state directly; they send [`UiEvent`]s.
pub struct UiContext {
    proxy: EventProxy,

    pub status: JobStatus,
    pub steps: [(Step, StepState); 4],
    pub progress_message: String,
    pub job_error: Option<String>,
    pub validation_error: Option<String>,
    pub asset_error: Option<String>,
    pub selected: Option<String>,
    pub download: DownloadState,
    pub polling_job: Option<String>,
    pub elapsed_secs: Option<i64>,

    /// Viewport image registered with the egui renderer, if one is live.
    pub viewport_texture: Option<egui::TextureId>,
    /// Screen area of the viewport in points, written by the central panel.
    pub viewport_rect: Option<egui::Rect>,
}

impl UiContext {
    pub fn new(proxy: EventProxy) -> Self {
        Self {
            proxy,
            status: JobStatus::Idle,
            steps: Step::ALL.map(|s| (s, StepState::Pending)),
            progress_message: String::new(),
            job_error: None,
            validation_error: None,
            asset_error: None,
            selected: None,
            download: DownloadState::Idle,
            polling_job: None,
            elapsed_secs: None,
            viewport_texture: None,
            viewport_rect: None,
        }
    }

    pub fn refresh(&mut self, state: &AppState) {
        self.status = state.job.status;
        self.steps = state.job.progress.step_states();
        self.progress_message = state.job.progress.message.clone();
        self.job_error = state.job.error.clone();
        self.validation_error = state.validation_error.clone();
        self.asset_error = state.asset_error.clone();
        self.selected = state.selected.as_ref().map(|f| f.name.clone());
        self.download = state.download.clone();
        self.polling_job = state.polling_job().map(str::to_string);
        self.elapsed_secs = state.job.elapsed_secs();
    }

    pub fn send_event(&self, event: UiEvent) {
        self.proxy.send_ui(event);
    }
}

pub trait UiComponent {
    fn show(&mut self, ctx: &Context, ui_ctx: &mut UiContext);
}

/// Tracks which offscreen target is registered with egui.
struct ViewportTexture {
    id: egui::TextureId,
    generation: u64,
}

pub struct UiState {
    pub(crate) egui_state: egui_winit::State,
    pub(crate) egui_ctx: egui::Context,
    pub(crate) egui_renderer: egui_wgpu::Renderer,

    components: Vec<Box<dyn UiComponent>>,
    pub(crate) ui_ctx: UiContext,
    present: PresentTarget,
    viewport_texture: Option<ViewportTexture>,
}

impl UiState {
    pub fn new(gfx: &GfxState, window: Arc<Window>, proxy: EventProxy, present: PresentTarget) -> Self {
        let egui_ctx = egui::Context::default();

        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );

        let egui_renderer = egui_wgpu::Renderer::new(
            &gfx.device, gfx.config.format, egui_wgpu::RendererOptions::default());

        Self {
            egui_ctx,
            egui_state,
            egui_renderer,
            components: Vec::new(),
            ui_ctx: UiContext::new(proxy),
            present,
            viewport_texture: None,
        }
    }

    pub fn add_component(&mut self, component: Box<dyn UiComponent>) {
        self.components.push(component);
    }

    /// Registers the renderer's latest color target with egui, swapping the
    /// texture in place when the target was recreated.
    fn sync_viewport_texture(&mut self, device: &wgpu::Device) {
        let frame = self.present.current();
        self.viewport_texture = match (frame, self.viewport_texture.take()) {
            (None, Some(old)) => {
                self.egui_renderer.free_texture(&old.id);
                None
            }
            (None, None) => None,
            (Some(frame), Some(old)) if old.generation == frame.generation => Some(old),
            (Some(frame), Some(old)) => {
                self.egui_renderer.update_egui_texture_from_wgpu_texture(
                    device,
                    &frame.view,
                    wgpu::FilterMode::Linear,
                    old.id,
                );
                Some(ViewportTexture { id: old.id, generation: frame.generation })
            }
            (Some(frame), None) => {
                let id = self.egui_renderer.register_native_texture(
                    device,
                    &frame.view,
                    wgpu::FilterMode::Linear,
                );
                Some(ViewportTexture { id, generation: frame.generation })
            }
        };
        self.ui_ctx.viewport_texture = self.viewport_texture.as_ref().map(|t| t.id);
    }

    pub fn draw(&mut self, window: &Window, device: &wgpu::Device, state: &AppState) -> egui::FullOutput {
        self.sync_viewport_texture(device);
        self.ui_ctx.refresh(state);

        let raw_input = self.egui_state.take_egui_input(window);

        self.egui_ctx.run(raw_input, |ctx| {
            for component in self.components.iter_mut() {
                component.show(ctx, &mut self.ui_ctx);
            }
        })
    }

    /// Whether a window-space point in physical pixels falls on the viewport.
    pub fn is_over_viewport(&self, x: f64, y: f64) -> bool {
        let scale = self.egui_ctx.pixels_per_point();
        let pos = egui::pos2(x as f32 / scale, y as f32 / scale);
        self.ui_ctx.viewport_rect.is_some_and(|r| r.contains(pos))
    }
}
