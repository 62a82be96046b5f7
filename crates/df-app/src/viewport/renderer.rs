use std::path::Path;
use glam::{Mat4, Vec3};
use image::{Rgba, RgbaImage};
use log::{debug, info, warn};
use crate::error::AppError;
use crate::viewport::camera::PerspectiveCamera;
use crate::viewport::lights::Light;
use crate::viewport::scene::{NodeKind, Scene};
use crate::viewport::surface::SurfaceSize;

const CLEAR: Rgba<u8> = Rgba([26, 26, 26, 255]);
const GRID: Rgba<u8> = Rgba([70, 70, 70, 255]);
pub(crate) const MODEL_BASE: Vec3 = Vec3::new(0.85, 0.78, 0.7);
const GRID_SAMPLES: usize = 128;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub frames: u64,
    pub width: u32,
    pub height: u32,
    /// Model samples drawn in the last frame: points that passed the depth
    /// test on the CPU, submitted vertices on the GPU
    pub model_fragments: usize,
}

/// The drawing surface a viewport renders into.
pub trait RenderBackend: Send {
    fn resize(&mut self, size: SurfaceSize);

    fn render(&mut self, scene: &Scene, camera: &PerspectiveCamera) -> Result<(), AppError>;

    /// Releases the surface. Rendering afterwards is an error.
    fn dispose(&mut self);

    fn is_disposed(&self) -> bool;

    fn stats(&self) -> RenderStats;

    fn snapshot(&self, path: &Path) -> Result<(), AppError>;
}

/// CPU point rasterizer with a depth buffer. Draws the grid and every model
/// vertex; good enough to check framing without a GPU.
pub struct HeadlessRenderer {
    color: RgbaImage,
    depth: Vec<f32>,
    stats: RenderStats,
    disposed: bool,
}

impl HeadlessRenderer {
    pub fn new(size: SurfaceSize) -> Self {
        let mut renderer = Self {
            color: RgbaImage::new(0, 0),
            depth: Vec::new(),
            stats: RenderStats::default(),
            disposed: false,
        };
        renderer.resize(size);
        renderer
    }

    pub fn boxed(size: SurfaceSize) -> Box<dyn RenderBackend> {
        Box::new(Self::new(size))
    }

    fn plot(&mut self, view_proj: &Mat4, world: Vec3, color: Rgba<u8>) -> bool {
        let (width, height) = self.color.dimensions();
        let clip = *view_proj * world.extend(1.0);
        if clip.w <= 0.0 {
            return false;
        }

        let ndc = clip.truncate() / clip.w;
        if ndc.x.abs() > 1.0 || ndc.y.abs() > 1.0 || !(0.0..=1.0).contains(&ndc.z) {
            return false;
        }

        let x = (((ndc.x + 1.0) * 0.5 * width as f32) as u32).min(width - 1);
        let y = (((1.0 - ndc.y) * 0.5 * height as f32) as u32).min(height - 1);
        let index = (y * width + x) as usize;
        if ndc.z >= self.depth[index] {
            return false;
        }

        self.depth[index] = ndc.z;
        self.color.put_pixel(x, y, color);
        true
    }
}

fn light_level(scene: &Scene) -> f32 {
    scene
        .lights()
        .map(|light| match light {
            Light::Ambient { intensity, .. } => *intensity,
            // directional lights contribute half without normals to weight them
            Light::Directional { intensity, .. } => *intensity * 0.5,
        })
        .sum::<f32>()
        .min(1.0)
}

impl RenderBackend for HeadlessRenderer {
    fn resize(&mut self, size: SurfaceSize) {
        let size = size.clamped();
        let Some(pixels) = size.pixel_count() else {
            warn!("Ignoring resize to {}x{}", size.width, size.height);
            return;
        };

        debug!("Resizing headless surface to {}x{}", size.width, size.height);
        self.color = RgbaImage::from_pixel(size.width, size.height, CLEAR);
        self.depth = vec![f32::INFINITY; pixels];
        self.stats.width = size.width;
        self.stats.height = size.height;
    }

    fn render(&mut self, scene: &Scene, camera: &PerspectiveCamera) -> Result<(), AppError> {
        if self.disposed {
            return Err(AppError::Render("surface was disposed".into()));
        }
        if self.color.width() == 0 || self.color.height() == 0 {
            return Ok(());
        }

        for pixel in self.color.pixels_mut() {
            *pixel = CLEAR;
        }
        self.depth.fill(f32::INFINITY);

        let view_proj = camera.view_proj();
        let level = light_level(scene);
        let shade = MODEL_BASE * level * 255.0;
        let model_color = Rgba([shade.x as u8, shade.y as u8, shade.z as u8, 255]);

        let mut fragments = 0;
        for node in scene.nodes() {
            match &node.kind {
                NodeKind::Grid(grid) => {
                    for (a, b) in grid.lines() {
                        for i in 0..=GRID_SAMPLES {
                            let p = a.lerp(b, i as f32 / GRID_SAMPLES as f32);
                            self.plot(&view_proj, node.transform.transform_point3(p), GRID);
                        }
                    }
                }
                NodeKind::Model(model) => {
                    for mesh in model.meshes.iter() {
                        for p in &mesh.positions {
                            if self.plot(&view_proj, node.transform.transform_point3(*p), model_color) {
                                fragments += 1;
                            }
                        }
                    }
                }
                NodeKind::Light(_) => {}
            }
        }

        self.stats.frames += 1;
        self.stats.model_fragments = fragments;
        Ok(())
    }

    fn dispose(&mut self) {
        if !self.disposed {
            info!("Disposing headless surface after {} frames", self.stats.frames);
        }
        self.disposed = true;
        self.color = RgbaImage::new(0, 0);
        self.depth = Vec::new();
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn stats(&self) -> RenderStats {
        self.stats
    }

    fn snapshot(&self, path: &Path) -> Result<(), AppError> {
        if self.disposed {
            return Err(AppError::Render("surface was disposed".into()));
        }
        self.color
            .save(path)
            .map_err(|e| AppError::Render(format!("saving {}: {}", path.display(), e)))
    }
}
