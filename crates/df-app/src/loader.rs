use std::collections::HashSet;
use std::sync::Arc;
use glam::{Mat4, Vec3};
use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tracing::Instrument;
use df_core::{Aabb, Normalization, TARGET_SIZE};
use crate::backend::JobApi;
use crate::error::AppError;
use crate::events::{AssetEvent, EventProxy};

/// Message shown when an asset cannot be fetched or parsed.
pub const LOAD_FAILED: &str = "Failed to load 3D model";

/// Triangle geometry in model space, node transforms already applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub positions: Vec<Vec3>,
    pub indices: Option<Vec<u32>>,
}

/// A parsed asset together with the transform that normalizes it.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub name: String,
    pub meshes: Arc<Vec<Mesh>>,
    pub normalization: Normalization,
}

impl LoadedModel {
    pub fn from_meshes(name: impl Into<String>, meshes: Vec<Mesh>) -> Result<Self, AppError> {
        let bounds = bounds_of(&meshes).ok_or(df_core::Error::EmptyModel)?;
        let normalization = Normalization::fit(&bounds, TARGET_SIZE)?;

        Ok(Self {
            name: name.into(),
            meshes: Arc::new(meshes),
            normalization,
        })
    }

    /// Parses a binary glTF, flattening the default scene's node hierarchy.
    pub fn from_glb(name: impl Into<String>, bytes: &[u8]) -> Result<Self, AppError> {
        let (document, buffers, _images) = gltf::import_slice(bytes)?;

        let scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .ok_or_else(|| AppError::Model("asset contains no scene".into()))?;

        let meshes = collect_meshes(&scene, &buffers)?;
        Self::from_meshes(name, meshes)
    }

    pub fn vertex_count(&self) -> usize {
        self.meshes.iter().map(|m| m.positions.len()).sum()
    }

    /// Bounds before normalization
    pub fn raw_bounds(&self) -> Option<Aabb> {
        bounds_of(&self.meshes)
    }

    /// Bounds once placed in the scene
    pub fn normalized_bounds(&self) -> Option<Aabb> {
        let n = self.normalization;
        Aabb::from_points(
            self.meshes
                .iter()
                .flat_map(|m| m.positions.iter().map(move |p| n.apply(*p))),
        )
    }
}

fn bounds_of(meshes: &[Mesh]) -> Option<Aabb> {
    Aabb::from_points(meshes.iter().flat_map(|m| m.positions.iter().copied()))
}

/// Walks the scene graph without recursion, baking each node's world matrix
/// into its mesh positions. glTF node hierarchies are trees, so a node seen
/// twice means the asset is malformed.
fn collect_meshes(scene: &gltf::Scene, buffers: &[gltf::buffer::Data]) -> Result<Vec<Mesh>, AppError> {
    let mut out = Vec::new();
    let mut visited = HashSet::new();
    let mut stack: Vec<(gltf::Node, Mat4)> = scene.nodes().map(|n| (n, Mat4::IDENTITY)).collect();

    while let Some((node, parent)) = stack.pop() {
        if !visited.insert(node.index()) {
            return Err(AppError::Model(format!(
                "node {} is reachable more than once from scene {}",
                node.index(),
                scene.index()
            )));
        }

        let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());

        if let Some(mesh) = node.mesh() {
            for primitive in mesh.primitives() {
                let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| &d.0[..]));

                let Some(positions) = reader.read_positions() else {
                    debug!("Skipping primitive without positions in mesh {:?}", mesh.name());
                    continue;
                };

                out.push(Mesh {
                    positions: positions.map(|p| world.transform_point3(Vec3::from(p))).collect(),
                    indices: reader.read_indices().map(|i| i.into_u32().collect()),
                });
            }
        }

        stack.extend(node.children().map(|child| (child, world)));
    }

    Ok(out)
}

/// Fetches assets in the background. Only the most recently requested URL
/// may reach the viewport; completions for older URLs are dropped.
pub struct AssetLoader {
    api: Arc<dyn JobApi>,
    proxy: EventProxy,
    current: Option<String>,
    task: Option<JoinHandle<()>>,
}

impl AssetLoader {
    pub fn new(api: Arc<dyn JobApi>, proxy: EventProxy) -> Self {
        Self {
            api,
            proxy,
            current: None,
            task: None,
        }
    }

    pub fn load(&mut self, url: &str) {
        info!("Loading model from {}", url);
        self.current = Some(url.to_string());

        let api = self.api.clone();
        let proxy = self.proxy.clone();
        let url = url.to_string();
        let span = tracing::info_span!("asset_load", url = %url);

        self.task = Some(tokio::spawn(
            async move {
                let event = match fetch_model(api.as_ref(), &url).await {
                    Ok(model) => {
                        info!("Parsed {} ({} vertices)", model.name, model.vertex_count());
                        AssetEvent::Loaded { url, model }
                    }
                    Err(e) => {
                        warn!("Loading {} failed: {}", url, e);
                        AssetEvent::Failed { url, error: e.to_string() }
                    }
                };
                proxy.send_asset(event);
            }
            .instrument(span),
        ));
    }

    pub fn is_current(&self, url: &str) -> bool {
        self.current.as_deref() == Some(url)
    }

    /// Forgets the current URL so any in-flight result is ignored.
    pub fn clear(&mut self) {
        self.current = None;
        self.task = None;
    }
}

async fn fetch_model(api: &dyn JobApi, url: &str) -> Result<LoadedModel, AppError> {
    let bytes = api.fetch(url).await?;
    let name = url.rsplit('/').next().unwrap_or(url).to_string();

    tokio::task::spawn_blocking(move || LoadedModel::from_glb(name, &bytes))
        .await
        .map_err(|e| AppError::Model(format!("parser task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cuboid(min: Vec3, max: Vec3) -> Mesh {
        let positions = (0..8)
            .map(|i| {
                Vec3::new(
                    if i & 1 == 0 { min.x } else { max.x },
                    if i & 2 == 0 { min.y } else { max.y },
                    if i & 4 == 0 { min.z } else { max.z },
                )
            })
            .collect();
        Mesh { positions, indices: None }
    }

    #[test]
    fn test_model_is_normalized_on_construction() {
        let model = LoadedModel::from_meshes("box", vec![
            cuboid(Vec3::new(10.0, 0.0, 0.0), Vec3::new(14.0, 2.0, 1.0)),
        ])
        .unwrap();

        let b = model.normalized_bounds().unwrap();
        assert!(b.center().length() < 1e-5);
        assert!((b.max_dimension() - TARGET_SIZE).abs() < 1e-5);
        assert_eq!(model.vertex_count(), 8);
    }

    #[test]
    fn test_bounds_span_all_meshes() {
        let model = LoadedModel::from_meshes("two", vec![
            cuboid(Vec3::ZERO, Vec3::ONE),
            cuboid(Vec3::splat(3.0), Vec3::splat(4.0)),
        ])
        .unwrap();

        let raw = model.raw_bounds().unwrap();
        assert_eq!(raw.min, Vec3::ZERO);
        assert_eq!(raw.max, Vec3::splat(4.0));
    }

    #[test]
    fn test_empty_and_flat_models_fail() {
        assert!(matches!(
            LoadedModel::from_meshes("none", vec![]),
            Err(AppError::Geometry(df_core::Error::EmptyModel))
        ));
        assert!(matches!(
            LoadedModel::from_meshes("point", vec![cuboid(Vec3::ONE, Vec3::ONE)]),
            Err(AppError::Geometry(df_core::Error::DegenerateBounds(_)))
        ));
    }

    /// Packs a glTF document and its binary chunk into a GLB container.
    fn glb(doc: serde_json::Value, bin: &[u8]) -> Vec<u8> {
        let mut json = serde_json::to_vec(&doc).unwrap();
        while json.len() % 4 != 0 {
            json.push(b' ');
        }
        let mut bin = bin.to_vec();
        while bin.len() % 4 != 0 {
            bin.push(0);
        }

        let total = 12 + 8 + json.len() + 8 + bin.len();
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(b"glTF");
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&(json.len() as u32).to_le_bytes());
        out.extend_from_slice(b"JSON");
        out.extend_from_slice(&json);
        out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        out.extend_from_slice(b"BIN\0");
        out.extend_from_slice(&bin);
        out
    }

    /// One triangle mesh, with `nodes` supplied by the caller.
    fn triangle_glb(nodes: serde_json::Value) -> Vec<u8> {
        let positions: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let bin: &[u8] = bytemuck::cast_slice(&positions);

        glb(serde_json::json!({
            "asset": { "version": "2.0" },
            "scene": 0,
            "scenes": [{ "nodes": [0] }],
            "nodes": nodes,
            "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 } }] }],
            "accessors": [{
                "bufferView": 0,
                "componentType": 5126,
                "count": 3,
                "type": "VEC3",
                "min": [0.0, 0.0, 0.0],
                "max": [1.0, 1.0, 0.0]
            }],
            "bufferViews": [{ "buffer": 0, "byteLength": bin.len() }],
            "buffers": [{ "byteLength": bin.len() }]
        }), bin)
    }

    #[test]
    fn test_child_transforms_are_baked() {
        let bytes = triangle_glb(serde_json::json!([
            { "children": [1], "translation": [10.0, 0.0, 0.0] },
            { "mesh": 0, "scale": [2.0, 2.0, 2.0] },
        ]));

        let model = LoadedModel::from_glb("nested", &bytes).unwrap();
        let raw = model.raw_bounds().unwrap();
        assert_eq!(raw.min, Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(raw.max, Vec3::new(12.0, 2.0, 0.0));
    }

    #[test]
    fn test_cyclic_node_graph_is_a_model_error() {
        let bytes = triangle_glb(serde_json::json!([
            { "mesh": 0, "children": [1] },
            { "children": [0] },
        ]));

        let err = LoadedModel::from_glb("cycle", &bytes).unwrap_err();
        assert!(matches!(err, AppError::Model(_)), "{err}");
    }

    #[test]
    fn test_garbage_bytes_are_a_parse_error() {
        assert!(matches!(
            LoadedModel::from_glb("junk", b"definitely not a glb"),
            Err(AppError::Gltf(_))
        ));
    }
}
