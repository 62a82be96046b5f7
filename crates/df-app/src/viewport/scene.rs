use glam::Mat4;
use uuid::Uuid;
use crate::loader::LoadedModel;
use crate::viewport::lights::{Grid, Light};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(Uuid);

impl NodeId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Light(Light),
    Grid(Grid),
    Model(LoadedModel),
}

#[derive(Debug, Clone)]
pub struct SceneNode {
    pub id: NodeId,
    pub name: String,
    pub transform: Mat4,
    pub kind: NodeKind,
}

/// Flat scene graph; insertion order is draw order.
#[derive(Debug, Default)]
pub struct Scene {
    nodes: Vec<SceneNode>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, transform: Mat4, kind: NodeKind) -> NodeId {
        let id = NodeId::new();
        self.nodes.push(SceneNode {
            id,
            name: name.into(),
            transform,
            kind,
        });
        id
    }

    pub fn remove(&mut self, id: NodeId) -> Option<SceneNode> {
        let index = self.nodes.iter().position(|n| n.id == id)?;
        Some(self.nodes.remove(index))
    }

    pub fn get(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &SceneNode> {
        self.nodes.iter()
    }

    pub fn models(&self) -> impl Iterator<Item = (&SceneNode, &LoadedModel)> {
        self.nodes.iter().filter_map(|n| match &n.kind {
            NodeKind::Model(model) => Some((n, model)),
            _ => None,
        })
    }

    pub fn lights(&self) -> impl Iterator<Item = &Light> {
        self.nodes.iter().filter_map(|n| match &n.kind {
            NodeKind::Light(light) => Some(light),
            _ => None,
        })
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}
