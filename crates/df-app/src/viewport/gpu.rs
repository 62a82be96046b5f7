use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use bytemuck::{Pod, Zeroable};
use egui_wgpu::wgpu;
use egui_wgpu::wgpu::util::DeviceExt;
use glam::{Mat4, Vec3};
use log::{debug, info};
use crate::error::AppError;
use crate::loader::Mesh;
use crate::viewport::camera::PerspectiveCamera;
use crate::viewport::lights::Light;
use crate::viewport::renderer::{MODEL_BASE, RenderBackend, RenderStats};
use crate::viewport::scene::{NodeId, NodeKind, Scene, SceneNode};
use crate::viewport::surface::SurfaceSize;

/// Format of the offscreen color target; the UI samples it as a texture.
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const CLEAR: wgpu::Color = wgpu::Color { r: 0.0103, g: 0.0103, b: 0.0103, a: 1.0 };
const GRID_COLOR: [f32; 4] = [0.061, 0.061, 0.061, 1.0];

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl Vertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3
    ];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SceneUniform {
    pub view_proj: [[f32; 4]; 4],
    pub ambient: [f32; 4],
    pub key_dir: [f32; 4],
    pub key_color: [f32; 4],
    pub fill_dir: [f32; 4],
    pub fill_color: [f32; 4],
}

impl SceneUniform {
    /// Packs the camera and the scene's lights. The shadow caster takes the
    /// key slot and the first other directional light the fill slot; any
    /// further directional lights are not drawn.
    pub fn new(scene: &Scene, camera: &PerspectiveCamera) -> Self {
        let mut uniform = Self {
            view_proj: camera.view_proj().to_cols_array_2d(),
            ..Self::default()
        };

        let mut ambient = Vec3::ZERO;
        let mut key = None;
        let mut fill = None;
        for light in scene.lights() {
            match light {
                Light::Ambient { color, .. } => ambient += *color * light.intensity(),
                Light::Directional { color, position, .. } => {
                    let packed = (
                        position.normalize_or_zero().extend(0.0).to_array(),
                        (*color * light.intensity()).extend(1.0).to_array(),
                    );
                    let slot = if light.casts_shadow() { &mut key } else { &mut fill };
                    if slot.is_none() {
                        *slot = Some(packed);
                    }
                }
            }
        }

        uniform.ambient = ambient.extend(1.0).to_array();
        if let Some((dir, color)) = key {
            uniform.key_dir = dir;
            uniform.key_color = color;
        }
        if let Some((dir, color)) = fill {
            uniform.fill_dir = dir;
            uniform.fill_color = color;
        }
        uniform
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct NodeUniform {
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 4],
    color: [f32; 4],
}

impl NodeUniform {
    fn new(transform: Mat4, color: [f32; 4]) -> Self {
        Self {
            model: transform.to_cols_array_2d(),
            normal: transform.inverse().transpose().to_cols_array_2d(),
            color,
        }
    }
}

/// Triangles of `mesh`, sequential when it has no index list. Triangles
/// that reference missing vertices are dropped.
pub fn triangles(mesh: &Mesh) -> Vec<[u32; 3]> {
    let count = mesh.positions.len() as u32;
    let indices = mesh.indices.clone().unwrap_or_else(|| (0..count).collect());

    indices
        .chunks_exact(3)
        .map(|t| [t[0], t[1], t[2]])
        .filter(|t| t.iter().all(|&i| i < count))
        .collect()
}

/// Area-weighted vertex normals. Vertices touched by no triangle point up.
pub fn vertex_normals(positions: &[Vec3], triangles: &[[u32; 3]]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for &[a, b, c] in triangles {
        let (pa, pb, pc) = (positions[a as usize], positions[b as usize], positions[c as usize]);
        let face = (pb - pa).cross(pc - pa);
        for i in [a, b, c] {
            normals[i as usize] += face;
        }
    }

    normals
        .into_iter()
        .map(|n| n.try_normalize().unwrap_or(Vec3::Y))
        .collect()
}

pub fn mesh_vertices(mesh: &Mesh) -> (Vec<Vertex>, Vec<u32>) {
    let triangles = triangles(mesh);
    let normals = vertex_normals(&mesh.positions, &triangles);
    let vertices = mesh
        .positions
        .iter()
        .zip(normals)
        .map(|(p, n)| Vertex { position: p.to_array(), normal: n.to_array() })
        .collect();
    (vertices, triangles.into_iter().flatten().collect())
}

#[derive(Clone)]
pub struct PresentedFrame {
    pub view: wgpu::TextureView,
    pub size: SurfaceSize,
    pub generation: u64,
}

#[derive(Default)]
struct PresentSlot {
    frame: Option<PresentedFrame>,
    generation: u64,
}

/// Where the GPU renderer leaves its color target for the UI to draw.
#[derive(Clone, Default)]
pub struct PresentTarget {
    slot: Arc<Mutex<PresentSlot>>,
}

impl PresentTarget {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PresentSlot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn current(&self) -> Option<PresentedFrame> {
        self.lock().frame.clone()
    }

    fn publish(&self, view: wgpu::TextureView, size: SurfaceSize) -> u64 {
        let mut slot = self.lock();
        slot.generation += 1;
        let generation = slot.generation;
        slot.frame = Some(PresentedFrame { view, size, generation });
        generation
    }

    /// Clears the slot if it still holds `generation`.
    fn retract(&self, generation: u64) {
        let mut slot = self.lock();
        if slot.frame.as_ref().is_some_and(|f| f.generation == generation) {
            slot.frame = None;
        }
    }
}

struct Targets {
    _color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    generation: u64,
}

struct GpuMesh {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
}

enum Geometry {
    Triangles(Vec<GpuMesh>),
    Lines { vertices: wgpu::Buffer, count: u32 },
}

struct GpuNode {
    transform: Mat4,
    color: [f32; 4],
    uniform: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    geometry: Geometry,
    vertex_count: usize,
}

/// Draws the scene with wgpu into an offscreen target that the window UI
/// composites into its central panel.
pub struct GpuRenderer {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    present: PresentTarget,

    mesh_pipeline: wgpu::RenderPipeline,
    line_pipeline: wgpu::RenderPipeline,
    scene_buffer: wgpu::Buffer,
    scene_bind_group: wgpu::BindGroup,
    node_layout: wgpu::BindGroupLayout,

    targets: Option<Targets>,
    nodes: HashMap<NodeId, GpuNode>,
    stats: RenderStats,
    disposed: bool,
}

fn uniform_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    fragment: &str,
    topology: wgpu::PrimitiveTopology,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(fragment),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[Vertex::desc()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(fragment),
            targets: &[Some(wgpu::ColorTargetState {
                format: COLOR_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: Default::default(),
            bias: Default::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

impl GpuRenderer {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        present: PresentTarget,
        size: SurfaceSize,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::include_wgsl!("mesh.wgsl"));

        let scene_layout = uniform_layout(&device, "Scene Layout");
        let node_layout = uniform_layout(&device, "Node Layout");

        let scene_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Buffer"),
            contents: bytemuck::cast_slice(&[SceneUniform::default()]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let scene_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Bind Group"),
            layout: &scene_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: scene_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Viewport Pipeline Layout"),
            bind_group_layouts: &[&scene_layout, &node_layout],
            push_constant_ranges: &[],
        });
        let mesh_pipeline = create_pipeline(
            &device,
            &pipeline_layout,
            &shader,
            "fs_mesh",
            wgpu::PrimitiveTopology::TriangleList,
        );
        let line_pipeline = create_pipeline(
            &device,
            &pipeline_layout,
            &shader,
            "fs_line",
            wgpu::PrimitiveTopology::LineList,
        );

        let mut renderer = Self {
            device,
            queue,
            present,
            mesh_pipeline,
            line_pipeline,
            scene_buffer,
            scene_bind_group,
            node_layout,
            targets: None,
            nodes: HashMap::new(),
            stats: RenderStats::default(),
            disposed: false,
        };
        renderer.resize(size);
        renderer
    }

    fn create_targets(&self, size: SurfaceSize) -> Targets {
        let extent = wgpu::Extent3d {
            width: size.width,
            height: size.height,
            depth_or_array_layers: 1,
        };
        let texture = |label: &str, format: wgpu::TextureFormat, usage: wgpu::TextureUsages| {
            self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: extent,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            })
        };

        let color = texture(
            "Viewport Color",
            COLOR_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        );
        let depth = texture("Viewport Depth", DEPTH_FORMAT, wgpu::TextureUsages::RENDER_ATTACHMENT);

        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());
        let generation = self.present.publish(color_view.clone(), size);

        Targets { _color: color, color_view, depth_view, generation }
    }

    fn upload_node(&self, node: &SceneNode) -> Option<GpuNode> {
        let (geometry, color, vertex_count) = match &node.kind {
            NodeKind::Light(_) => return None,
            NodeKind::Grid(grid) => {
                let vertices: Vec<Vertex> = grid
                    .lines()
                    .into_iter()
                    .flat_map(|(a, b)| [a, b])
                    .map(|p| Vertex { position: p.to_array(), normal: Vec3::Y.to_array() })
                    .collect();
                let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Grid Vertices"),
                    contents: bytemuck::cast_slice(&vertices),
                    usage: wgpu::BufferUsages::VERTEX,
                });
                let count = vertices.len() as u32;
                (Geometry::Lines { vertices: buffer, count }, GRID_COLOR, 0)
            }
            NodeKind::Model(model) => {
                let mut meshes = Vec::new();
                let mut vertex_count = 0;
                for mesh in model.meshes.iter() {
                    let (vertices, indices) = mesh_vertices(mesh);
                    if indices.is_empty() {
                        continue;
                    }
                    vertex_count += vertices.len();
                    meshes.push(GpuMesh {
                        vertices: self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some("Model Vertices"),
                            contents: bytemuck::cast_slice(&vertices),
                            usage: wgpu::BufferUsages::VERTEX,
                        }),
                        indices: self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some("Model Indices"),
                            contents: bytemuck::cast_slice(&indices),
                            usage: wgpu::BufferUsages::INDEX,
                        }),
                        index_count: indices.len() as u32,
                    });
                }
                debug!("Uploaded {} ({} meshes, {} vertices)", node.name, meshes.len(), vertex_count);
                (Geometry::Triangles(meshes), MODEL_BASE.extend(1.0).to_array(), vertex_count)
            }
        };

        let uniform = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Node Buffer"),
            contents: bytemuck::cast_slice(&[NodeUniform::new(node.transform, color)]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Node Bind Group"),
            layout: &self.node_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform.as_entire_binding(),
            }],
        });

        Some(GpuNode {
            transform: node.transform,
            color,
            uniform,
            bind_group,
            geometry,
            vertex_count,
        })
    }

    /// Uploads nodes new to the cache, refreshes moved ones and drops those
    /// no longer in `scene`.
    fn sync_nodes(&mut self, scene: &Scene) {
        self.nodes.retain(|id, _| scene.get(*id).is_some());

        for node in scene.nodes() {
            if let Some(gpu) = self.nodes.get_mut(&node.id) {
                if gpu.transform != node.transform {
                    gpu.transform = node.transform;
                    let uniform = NodeUniform::new(node.transform, gpu.color);
                    self.queue.write_buffer(&gpu.uniform, 0, bytemuck::cast_slice(&[uniform]));
                }
                continue;
            }
            if let Some(gpu) = self.upload_node(node) {
                self.nodes.insert(node.id, gpu);
            }
        }
    }
}

impl RenderBackend for GpuRenderer {
    fn resize(&mut self, size: SurfaceSize) {
        let size = size.clamped();
        if let Some(old) = self.targets.take() {
            self.present.retract(old.generation);
        }
        if self.disposed || size.is_empty() {
            return;
        }

        debug!("Resizing GPU surface to {}x{}", size.width, size.height);
        self.targets = Some(self.create_targets(size));
        self.stats.width = size.width;
        self.stats.height = size.height;
    }

    fn render(&mut self, scene: &Scene, camera: &PerspectiveCamera) -> Result<(), AppError> {
        if self.disposed {
            return Err(AppError::Render("surface was disposed".into()));
        }
        self.sync_nodes(scene);
        let Some(targets) = self.targets.as_ref() else {
            return Ok(());
        };

        let uniform = SceneUniform::new(scene, camera);
        self.queue.write_buffer(&self.scene_buffer, 0, bytemuck::cast_slice(&[uniform]));

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Viewport Encoder"),
        });

        let mut model_vertices = 0;
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Viewport Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &targets.color_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &targets.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });
            pass.set_bind_group(0, &self.scene_bind_group, &[]);

            // insertion order is draw order
            for node in scene.nodes() {
                let Some(gpu) = self.nodes.get(&node.id) else {
                    continue;
                };
                pass.set_bind_group(1, &gpu.bind_group, &[]);

                match &gpu.geometry {
                    Geometry::Lines { vertices, count } => {
                        pass.set_pipeline(&self.line_pipeline);
                        pass.set_vertex_buffer(0, vertices.slice(..));
                        pass.draw(0..*count, 0..1);
                    }
                    Geometry::Triangles(meshes) => {
                        pass.set_pipeline(&self.mesh_pipeline);
                        for mesh in meshes {
                            pass.set_vertex_buffer(0, mesh.vertices.slice(..));
                            pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
                            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                        }
                        model_vertices += gpu.vertex_count;
                    }
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        self.stats.frames += 1;
        self.stats.model_fragments = model_vertices;
        Ok(())
    }

    fn dispose(&mut self) {
        if !self.disposed {
            info!("Disposing GPU surface after {} frames", self.stats.frames);
        }
        self.disposed = true;
        self.nodes.clear();
        if let Some(targets) = self.targets.take() {
            self.present.retract(targets.generation);
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn stats(&self) -> RenderStats {
        self.stats
    }

    fn snapshot(&self, _path: &Path) -> Result<(), AppError> {
        Err(AppError::Render("snapshots are taken with the headless renderer".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewport::lights::studio_rig;

    fn flat(indices: Option<Vec<u32>>) -> Mesh {
        Mesh {
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::new(1.0, 1.0, 0.0)],
            indices,
        }
    }

    #[test]
    fn test_flat_triangle_normals_face_the_winding() {
        let (vertices, indices) = mesh_vertices(&flat(Some(vec![0, 1, 2])));
        assert_eq!(indices, vec![0, 1, 2]);
        for v in &vertices[..3] {
            assert_eq!(v.normal, [0.0, 0.0, 1.0]);
        }
        // untouched by any triangle
        assert_eq!(vertices[3].normal, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_unindexed_mesh_is_sequential() {
        // the fourth vertex does not complete a triangle
        assert_eq!(triangles(&flat(None)), vec![[0, 1, 2]]);
    }

    #[test]
    fn test_out_of_range_triangles_are_dropped() {
        let tris = triangles(&flat(Some(vec![0, 1, 2, 1, 3, 9, 2, 1, 3])));
        assert_eq!(tris, vec![[0, 1, 2], [2, 1, 3]]);
    }

    #[test]
    fn test_studio_rig_packs_key_and_fill() {
        let mut scene = Scene::new();
        for (name, light) in studio_rig() {
            scene.add(name, Mat4::IDENTITY, NodeKind::Light(light));
        }

        let uniform = SceneUniform::new(&scene, &PerspectiveCamera::default());
        assert_eq!(uniform.ambient, [0.6, 0.6, 0.6, 1.0]);
        assert_eq!(uniform.key_color, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(uniform.fill_color, [0.4, 0.4, 0.4, 1.0]);

        let key = Vec3::from_slice(&uniform.key_dir[..3]);
        assert!(key.abs_diff_eq(Vec3::new(5.0, 10.0, 7.5).normalize(), 1e-6));
        assert_eq!(uniform.key_dir[3], 0.0);
    }

    #[test]
    fn test_unlit_scene_packs_black() {
        let uniform = SceneUniform::new(&Scene::new(), &PerspectiveCamera::default());
        assert_eq!(uniform.ambient, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(uniform.key_color, [0.0; 4]);
    }

    #[test]
    fn test_uniform_layout_matches_shader() {
        assert_eq!(std::mem::size_of::<SceneUniform>(), 144);
        assert_eq!(std::mem::size_of::<NodeUniform>(), 144);
        assert_eq!(std::mem::size_of::<Vertex>(), 24);
    }
}
