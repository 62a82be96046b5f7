pub mod camera;
pub mod controls;
pub mod gpu;
pub mod lights;
pub mod renderer;
pub mod scene;
pub mod surface;

use glam::Mat4;
use log::{debug, info};
use crate::error::AppError;
use crate::loader::LoadedModel;
use crate::viewport::camera::PerspectiveCamera;
use crate::viewport::controls::OrbitControls;
use crate::viewport::lights::{Grid, studio_rig};
use crate::viewport::renderer::{RenderBackend, RenderStats};
use crate::viewport::scene::{NodeId, NodeKind, Scene};
use crate::viewport::surface::{ResizeListener, SurfaceMount, SurfaceSize, SurfaceHost};

/// Everything a live viewport owns: scene, camera, controls, the render
/// surface and its host registrations. At most one model is resident.
pub struct ViewportHandle {
    pub scene: Scene,
    pub camera: PerspectiveCamera,
    pub controls: OrbitControls,
    renderer: Box<dyn RenderBackend>,
    size: SurfaceSize,
    resize_listener: Option<ResizeListener>,
    mount: Option<SurfaceMount>,
    model: Option<NodeId>,
    torn_down: bool,
}

impl ViewportHandle {
    /// Builds the scene and attaches a renderer to `host`.
    pub fn activate(host: &SurfaceHost, mut renderer: Box<dyn RenderBackend>) -> Self {
        let size = host.size();
        let mount = host.mount();
        let resize_listener = host.add_resize_listener();

        renderer.resize(size);

        let camera = PerspectiveCamera::new(size.aspect());
        let controls = OrbitControls::new(&camera);

        let mut scene = Scene::new();
        for (name, light) in studio_rig() {
            scene.add(name, Mat4::IDENTITY, NodeKind::Light(light));
        }
        scene.add("grid", Mat4::IDENTITY, NodeKind::Grid(Grid::default()));

        info!("Viewport activated at {}x{}", size.width, size.height);

        Self {
            scene,
            camera,
            controls,
            renderer,
            size,
            resize_listener: Some(resize_listener),
            mount: Some(mount),
            model: None,
            torn_down: false,
        }
    }

    /// One iteration of the render loop: apply pending resizes, advance the
    /// damped controls, draw.
    pub fn frame(&mut self) -> Result<(), AppError> {
        if self.torn_down {
            return Ok(());
        }

        if let Some(size) = self.resize_listener.as_mut().and_then(|l| l.latest()) {
            self.apply_resize(size);
        }

        self.controls.update(&mut self.camera);
        self.renderer.render(&self.scene, &self.camera)
    }

    fn apply_resize(&mut self, size: SurfaceSize) {
        if size.is_empty() || size == self.size {
            return;
        }
        debug!("Viewport resized to {}x{}", size.width, size.height);
        self.size = size;
        self.camera.set_aspect(size.aspect());
        self.renderer.resize(size);
    }

    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    pub fn reset_camera(&mut self) {
        self.controls.reset(&mut self.camera);
    }

    pub fn orbit(&mut self, dx: f32, dy: f32) {
        self.controls.rotate(dx, dy, self.size.height);
    }

    pub fn zoom(&mut self, steps: f32) {
        self.controls.zoom(steps);
    }

    /// Evicts the resident model, then inserts `model` with its normalization
    /// transform.
    pub fn replace_model(&mut self, model: LoadedModel) -> NodeId {
        if let Some(old) = self.model.take() {
            if let Some(node) = self.scene.remove(old) {
                debug!("Evicted model {}", node.name);
            }
        }

        let name = model.name.clone();
        let transform = model.normalization.matrix();
        let id = self.scene.add(name, transform, NodeKind::Model(model));
        self.model = Some(id);
        id
    }

    pub fn resident_model(&self) -> Option<&LoadedModel> {
        let node = self.scene.get(self.model?)?;
        match &node.kind {
            NodeKind::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn model_count(&self) -> usize {
        self.scene.models().count()
    }

    pub fn render_stats(&self) -> RenderStats {
        self.renderer.stats()
    }

    pub fn snapshot(&self, path: &std::path::Path) -> Result<(), AppError> {
        self.renderer.snapshot(path)
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Removes the resize listener, releases the surface and disposes the
    /// renderer. Calling it again is a no-op.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        self.resize_listener = None;
        self.model = None;
        self.scene.clear();
        self.renderer.dispose();
        self.mount = None;

        info!("Viewport torn down");
    }
}

impl Drop for ViewportHandle {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use crate::loader::Mesh;
    use crate::viewport::renderer::HeadlessRenderer;

    fn host() -> SurfaceHost {
        SurfaceHost::new(SurfaceSize::new(800, 600))
    }

    fn viewport(host: &SurfaceHost) -> ViewportHandle {
        ViewportHandle::activate(host, Box::new(HeadlessRenderer::new(host.size())))
    }

    fn cube(name: &str, scale: f32) -> LoadedModel {
        let positions = (0..8)
            .map(|i| Vec3::new((i & 1) as f32, ((i >> 1) & 1) as f32, ((i >> 2) & 1) as f32) * scale)
            .collect();
        LoadedModel::from_meshes(name, vec![Mesh { positions, indices: None }]).unwrap()
    }

    #[test]
    fn test_activation_builds_scene() {
        let host = host();
        let viewport = viewport(&host);

        assert_eq!(viewport.scene.lights().count(), 3);
        assert_eq!(viewport.model_count(), 0);
        assert!((viewport.camera.aspect_ratio - 800.0 / 600.0).abs() < 1e-6);
        assert_eq!(host.resize_listener_count(), 1);
        assert_eq!(host.mounted_count(), 1);
    }

    #[test]
    fn test_second_model_evicts_first() {
        let host = host();
        let mut viewport = viewport(&host);

        let first = viewport.replace_model(cube("first", 1.0));
        let second = viewport.replace_model(cube("second", 5.0));

        assert_eq!(viewport.model_count(), 1);
        assert!(viewport.scene.get(first).is_none());
        assert!(viewport.scene.get(second).is_some());
        assert_eq!(viewport.resident_model().unwrap().name, "second");
    }

    #[test]
    fn test_resize_updates_camera_and_renderer() {
        let host = host();
        let mut viewport = viewport(&host);

        host.resize(SurfaceSize::new(1000, 500));
        viewport.frame().unwrap();

        assert_eq!(viewport.size(), SurfaceSize::new(1000, 500));
        assert!((viewport.camera.aspect_ratio - 2.0).abs() < 1e-6);
        assert_eq!(viewport.render_stats().width, 1000);
        assert_eq!(viewport.render_stats().frames, 1);
    }

    #[test]
    fn test_frames_render_resident_model() {
        let host = host();
        let mut viewport = viewport(&host);
        viewport.replace_model(cube("cube", 3.0));

        viewport.frame().unwrap();
        assert!(viewport.render_stats().model_fragments > 0);
    }

    #[test]
    fn test_reset_camera_after_orbit() {
        let host = host();
        let mut viewport = viewport(&host);
        let home = viewport.camera.position;

        viewport.orbit(200.0, 50.0);
        viewport.zoom(2.0);
        for _ in 0..10 {
            viewport.frame().unwrap();
        }
        assert_ne!(viewport.camera.position, home);

        viewport.reset_camera();
        assert_eq!(viewport.camera.position, home);
    }

    #[test]
    fn test_teardown_releases_window_resources() {
        let host = host();
        let mut viewport = viewport(&host);
        viewport.replace_model(cube("cube", 1.0));

        viewport.teardown();
        viewport.teardown();

        assert!(viewport.is_torn_down());
        assert_eq!(viewport.model_count(), 0);
        assert_eq!(host.resize_listener_count(), 0);
        assert_eq!(host.mounted_count(), 0);
        assert!(viewport.frame().is_ok());
    }

    #[test]
    fn test_listeners_do_not_leak_across_instances() {
        let host = host();
        for _ in 0..3 {
            let viewport = viewport(&host);
            drop(viewport);
        }
        assert_eq!(host.resize_listener_count(), 0);
        assert_eq!(host.mounted_count(), 0);
    }
}
