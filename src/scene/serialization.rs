use crate::scene::{AvatarDescriptor, Hierarchy, Material, Mesh, NodeId, Renderable, Transform};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("node '{node}' references unknown material '{material}'")]
    UnknownMaterial { node: String, material: String },
    #[error("descriptor head path '{0}' does not resolve to a node")]
    UnknownHeadPath(String),
    #[error("layer {layer} on node '{node}' is out of range")]
    InvalidLayer { node: String, layer: u8 },
}

pub type Result<T> = std::result::Result<T, SerializationError>;

/// Serializable material table entry.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MaterialData {
    pub name: String,
    pub base_color_rgba: [f32; 4],
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MeshData {
    Cuboid { min: [f32; 3], max: [f32; 3] },
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RenderableData {
    /// Material names by slot; `null` keeps the slot empty.
    pub materials: Vec<Option<String>>,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub mesh: Option<MeshData>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NodeData {
    pub name: String,
    #[serde(default)]
    pub transform: Transform,
    #[serde(default)]
    pub layer: u8,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub renderable: Option<RenderableData>,
    #[serde(default)]
    pub children: Vec<NodeData>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DescriptorData {
    pub view_position: [f32; 3],
    /// Path of the head bone below the root.
    #[serde(default)]
    pub head_path: Option<String>,
}

/// On-disk form of a [`Hierarchy`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SceneDocument {
    #[serde(default)]
    pub materials: Vec<MaterialData>,
    pub root: NodeData,
    #[serde(default)]
    pub descriptor: Option<DescriptorData>,
}

fn default_true() -> bool {
    true
}

impl SceneDocument {
    pub fn to_hierarchy(&self) -> Result<Hierarchy> {
        let materials: HashMap<&str, Arc<Material>> = self
            .materials
            .iter()
            .map(|data| {
                (
                    data.name.as_str(),
                    Material::shared(&data.name, data.base_color_rgba),
                )
            })
            .collect();

        let mut hierarchy = Hierarchy::new(&self.root.name);
        let root = hierarchy.root();
        apply_node(&mut hierarchy, root, &self.root, &materials)?;

        if let Some(descriptor) = &self.descriptor {
            let head = match &descriptor.head_path {
                Some(path) => Some(
                    hierarchy
                        .find_path(root, path)
                        .ok_or_else(|| SerializationError::UnknownHeadPath(path.clone()))?,
                ),
                None => None,
            };
            hierarchy.set_descriptor(Some(AvatarDescriptor {
                view_position: descriptor.view_position,
                head,
            }));
        }
        Ok(hierarchy)
    }
}

fn apply_node(
    hierarchy: &mut Hierarchy,
    id: NodeId,
    data: &NodeData,
    materials: &HashMap<&str, Arc<Material>>,
) -> Result<()> {
    if data.layer >= crate::scene::LAYER_COUNT {
        return Err(SerializationError::InvalidLayer {
            node: data.name.clone(),
            layer: data.layer,
        });
    }
    let renderable = data
        .renderable
        .as_ref()
        .map(|renderable| build_renderable(&data.name, renderable, materials))
        .transpose()?;

    if let Some(node) = hierarchy.node_mut(id) {
        node.set_transform(data.transform);
        node.set_layer(data.layer);
        node.set_active(data.active);
        node.set_renderable(renderable);
    }

    for child in &data.children {
        let child_id = hierarchy.add_child(id, &child.name);
        apply_node(hierarchy, child_id, child, materials)?;
    }
    Ok(())
}

fn build_renderable(
    node: &str,
    data: &RenderableData,
    materials: &HashMap<&str, Arc<Material>>,
) -> Result<Renderable> {
    let slots = data
        .materials
        .iter()
        .map(|name| match name {
            Some(name) => materials
                .get(name.as_str())
                .cloned()
                .map(Some)
                .ok_or_else(|| SerializationError::UnknownMaterial {
                    node: node.to_string(),
                    material: name.clone(),
                }),
            None => Ok(None),
        })
        .collect::<Result<Vec<_>>>()?;

    let mut renderable = Renderable::new(slots);
    renderable.set_visible(data.visible);
    if let Some(MeshData::Cuboid { min, max }) = &data.mesh {
        renderable = renderable.with_mesh(Arc::new(Mesh::cuboid(
            *min,
            *max,
            data.materials.len(),
        )));
    }
    Ok(renderable)
}

pub fn save_scene_to_file(scene: &SceneDocument, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(scene)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn load_scene_from_file(path: &Path) -> Result<SceneDocument> {
    let json = std::fs::read_to_string(path)?;
    let scene: SceneDocument = serde_json::from_str(&json)?;
    Ok(scene)
}
