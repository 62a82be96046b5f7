use std::path::PathBuf;
use std::sync::Arc;
use egui_wgpu::wgpu;
use egui_wgpu::wgpu::StoreOp;
use log::{error, info};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowAttributes, WindowId};
use crate::app::App;
use crate::backend::JobApi;
use crate::config::Config;
use crate::error::AppError;
use crate::events::{DfEvent, UiEvent};
use crate::gfx::GfxState;
use crate::ui::{self, UiState};
use crate::viewport::gpu::{GpuRenderer, PresentTarget};
use crate::viewport::renderer::RenderBackend;

/// Pixels of trackpad scroll that count as one wheel step.
const PIXELS_PER_STEP: f32 = 50.0;

/// Everything that only exists once the window does.
struct Viewer {
    window: Arc<Window>,
    gfx: GfxState,
    ui: UiState,
    app: App,
}

impl Viewer {
    async fn new(window: Arc<Window>, config: Config, api: Arc<dyn JobApi>) -> Result<Self, AppError> {
        let gfx = GfxState::new(window.clone()).await?;
        let present = PresentTarget::new();

        let (device, queue, target) = (gfx.device.clone(), gfx.queue.clone(), present.clone());
        let app = App::new(
            config,
            api,
            Box::new(move |size| {
                Box::new(GpuRenderer::new(device.clone(), queue.clone(), target.clone(), size))
                    as Box<dyn RenderBackend>
            }),
        );

        let mut ui_state = UiState::new(&gfx, window.clone(), app.proxy(), present);
        // side panels claim their space before the central panel
        ui_state.add_component(Box::new(ui::SidePanel::default()));
        ui_state.add_component(Box::new(ui::CentralPanel::default()));

        Ok(Self { window, gfx, ui: ui_state, app })
    }

    fn send(&mut self, event: UiEvent) {
        self.app.user_event(DfEvent::Ui(event));
    }

    fn render(&mut self) -> Result<(), AppError> {
        let size = self.window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Ok(());
        }

        // offscreen viewport pass, sampled by the UI below
        self.app.state.frame();

        let output = match self.gfx.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.gfx.reconfigure();
                return Ok(());
            }
            Err(e) => return Err(AppError::Render(format!("acquiring frame: {}", e))),
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self.gfx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Window Encoder"),
        });

        let full_output = self.ui.draw(&self.window, &self.gfx.device, &self.app.state);

        self.ui.egui_state.handle_platform_output(&self.window, full_output.platform_output);

        let paint_jobs = self.ui.egui_ctx.tessellate(full_output.shapes, full_output.pixels_per_point);
        let screen_desc = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [size.width, size.height],
            pixels_per_point: full_output.pixels_per_point,
        };

        for (id, delta) in &full_output.textures_delta.set {
            self.ui.egui_renderer.update_texture(&self.gfx.device, &self.gfx.queue, *id, delta);
        }

        self.ui.egui_renderer.update_buffers(
            &self.gfx.device,
            &self.gfx.queue,
            &mut encoder,
            &paint_jobs,
            &screen_desc,
        );

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("egui pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r: 0.1, g: 0.1, b: 0.1, a: 1.0 }),
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                ..Default::default()
            });

            self.ui.egui_renderer.render(&mut rpass.forget_lifetime(), &paint_jobs, &screen_desc);
        }

        for id in &full_output.textures_delta.free {
            self.ui.egui_renderer.free_texture(id);
        }

        self.gfx.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}

/// Window front end: a winit handler that forwards window input to the
/// [`App`] as [`UiEvent`]s and pumps its queue between frames.
pub struct ViewerApp {
    config: Config,
    api: Arc<dyn JobApi>,
    initial_image: Option<PathBuf>,
    viewer: Option<Viewer>,

    mouse_pressed: bool,
    last_mouse_pos: Option<(f64, f64)>,
}

impl ViewerApp {
    pub fn new(config: Config, api: Arc<dyn JobApi>, initial_image: Option<PathBuf>) -> Self {
        Self {
            config,
            api,
            initial_image,
            viewer: None,
            mouse_pressed: false,
            last_mouse_pos: None,
        }
    }
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.viewer.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title("DepthForge")
            .with_inner_size(winit::dpi::LogicalSize::new(1280.0, 800.0));

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                error!("Could not open a window: {}", e);
                event_loop.exit();
                return;
            }
        };

        let viewer = pollster::block_on(Viewer::new(window, self.config.clone(), self.api.clone()));
        match viewer {
            Ok(mut viewer) => {
                if let Some(path) = self.initial_image.take() {
                    viewer.send(UiEvent::SelectFile(path));
                }
                info!("Window ready");
                self.viewer = Some(viewer);
            }
            Err(e) => {
                error!("Could not start the renderer: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(viewer) = &mut self.viewer else {
            return;
        };

        if viewer.window.id() != window_id {
            return;
        }

        // Let egui handle the event first
        let response = viewer.ui.egui_state.on_window_event(&viewer.window, &event);
        if response.repaint {
            viewer.window.request_redraw();
        }

        match event {
            WindowEvent::CloseRequested => {
                viewer.send(UiEvent::Shutdown);
                event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => {
                viewer.gfx.resize(physical_size);
                viewer.window.request_redraw();
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = viewer.render() {
                    error!("Render failed: {}", e);
                }
            }
            WindowEvent::MouseInput { state, button: MouseButton::Left, .. } => {
                // a drag only orbits if it starts on the viewport
                let over_viewport = self
                    .last_mouse_pos
                    .is_some_and(|(x, y)| viewer.ui.is_over_viewport(x, y));
                self.mouse_pressed = state == ElementState::Pressed && over_viewport && !response.consumed;
            }
            WindowEvent::CursorMoved { position, .. } => {
                let pos = (position.x, position.y);
                if self.mouse_pressed {
                    if let Some((lx, ly)) = self.last_mouse_pos {
                        let (dx, dy) = ((pos.0 - lx) as f32, (pos.1 - ly) as f32);
                        viewer.send(UiEvent::Orbit { dx, dy });
                    }
                }
                self.last_mouse_pos = Some(pos);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let over_viewport = self
                    .last_mouse_pos
                    .is_some_and(|(x, y)| viewer.ui.is_over_viewport(x, y));
                if over_viewport {
                    let steps = match delta {
                        MouseScrollDelta::LineDelta(_, y) => y,
                        MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / PIXELS_PER_STEP,
                    };
                    viewer.send(UiEvent::Zoom(steps));
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(viewer) = &mut self.viewer else {
            return;
        };

        viewer.app.pump();
        if !viewer.app.is_running() {
            event_loop.exit();
            return;
        }
        viewer.window.request_redraw();
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(viewer) = self.viewer.as_mut() {
            viewer.app.state.shutdown();
        }
    }
}
