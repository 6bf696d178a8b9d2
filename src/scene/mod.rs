pub mod mesh;
pub mod serialization;

pub use mesh::Mesh;

use glam::{Mat4, Vec3};
use std::sync::Arc;

/// Layer every freshly created node starts on.
pub const LAYER_DEFAULT: u8 = 0;
/// Layers are indices into a 32-bit culling mask.
pub const LAYER_COUNT: u8 = 32;

/// Index of a node inside its [`Hierarchy`] arena.
///
/// Ids are stable for the lifetime of the hierarchy and survive `clone()`,
/// so an id taken from an original tree addresses the same node in a copy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Surface description shared between renderers.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Material {
    pub name: String,
    pub base_color_rgba: [f32; 4],
}

impl Material {
    pub fn shared(name: &str, base_color_rgba: [f32; 4]) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            base_color_rgba,
        })
    }
}

/// A material slot; `None` is an empty slot.
pub type MaterialSlot = Option<Arc<Material>>;

/// Renderable payload attached to a node.
#[derive(Debug, Clone)]
pub struct Renderable {
    slots: Vec<MaterialSlot>,
    visible: bool,
    mesh: Option<Arc<Mesh>>,
}

impl Renderable {
    pub fn new(slots: Vec<MaterialSlot>) -> Self {
        Self {
            slots,
            visible: true,
            mesh: None,
        }
    }

    pub fn with_mesh(mut self, mesh: Arc<Mesh>) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn slots(&self) -> &[MaterialSlot] {
        &self.slots
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Replace the material in `index`. The slot layout never grows, so an
    /// out-of-range index is rejected.
    pub fn set_slot(&mut self, index: usize, material: Arc<Material>) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => {
                *slot = Some(material);
                true
            }
            None => false,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn mesh(&self) -> Option<&Arc<Mesh>> {
        self.mesh.as_ref()
    }
}

/// Local transform relative to the parent node.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Transform {
    pub position: [f32; 3],
    pub rotation_deg: [f32; 3],
    pub scale: [f32; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            rotation_deg: [0.0, 0.0, 0.0],
            scale: [1.0, 1.0, 1.0],
        }
    }
}

impl Transform {
    pub fn from_position(position: [f32; 3]) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_cols_array(&compose_transform_matrix(
            self.position,
            self.rotation_deg,
            self.scale,
        ))
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    transform: Transform,
    layer: u8,
    active: bool,
    renderable: Option<Renderable>,
}

impl Node {
    fn new(name: &str, parent: Option<NodeId>) -> Self {
        Self {
            name: name.to_string(),
            parent,
            children: Vec::new(),
            transform: Transform::default(),
            layer: LAYER_DEFAULT,
            active: true,
            renderable: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    pub fn layer(&self) -> u8 {
        self.layer
    }

    pub fn set_layer(&mut self, layer: u8) {
        debug_assert!(layer < LAYER_COUNT, "layer {layer} out of range");
        self.layer = layer;
    }

    /// The node's own flag; see [`Hierarchy::is_active_in_hierarchy`] for
    /// the effective state.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn renderable(&self) -> Option<&Renderable> {
        self.renderable.as_ref()
    }

    pub fn renderable_mut(&mut self) -> Option<&mut Renderable> {
        self.renderable.as_mut()
    }

    pub fn set_renderable(&mut self, renderable: Option<Renderable>) {
        self.renderable = renderable;
    }
}

/// Humanoid reference data authored on an avatar root.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AvatarDescriptor {
    /// Eye position relative to the avatar root.
    pub view_position: [f32; 3],
    /// Head bone, when the rig is humanoid.
    pub head: Option<NodeId>,
}

/// Rooted object tree stored as an arena. Node 0 is always the root.
#[derive(Debug, Clone)]
pub struct Hierarchy {
    nodes: Vec<Node>,
    descriptor: Option<AvatarDescriptor>,
}

impl Hierarchy {
    pub fn new(root_name: &str) -> Self {
        Self {
            nodes: vec![Node::new(root_name, None)],
            descriptor: None,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    /// Append a child under `parent`. Panics if `parent` does not belong to
    /// this hierarchy.
    pub fn add_child(&mut self, parent: NodeId, name: &str) -> NodeId {
        assert!(self.contains(parent), "parent {parent:?} not in hierarchy");
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(name, Some(parent)));
        self.nodes[parent.index()].children.push(id);
        id
    }

    /// Convenience for building trees: adds a child carrying `renderable`.
    pub fn add_renderable(&mut self, parent: NodeId, name: &str, renderable: Renderable) -> NodeId {
        let id = self.add_child(parent, name);
        self.nodes[id.index()].renderable = Some(renderable);
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(Node::name)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(Node::children).unwrap_or(&[])
    }

    pub fn renderable(&self, id: NodeId) -> Option<&Renderable> {
        self.node(id).and_then(Node::renderable)
    }

    pub fn renderable_mut(&mut self, id: NodeId) -> Option<&mut Renderable> {
        self.node_mut(id).and_then(Node::renderable_mut)
    }

    pub fn descriptor(&self) -> Option<&AvatarDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn set_descriptor(&mut self, descriptor: Option<AvatarDescriptor>) {
        self.descriptor = descriptor;
    }

    /// Depth-first pre-order walk of `root` and everything below it.
    pub fn descendants(&self, root: NodeId) -> Descendants<'_> {
        let stack = if self.contains(root) {
            vec![root]
        } else {
            Vec::new()
        };
        Descendants {
            hierarchy: self,
            stack,
        }
    }

    /// True when `node` is `ancestor` or sits somewhere below it.
    pub fn is_descendant_of(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.node(id).and_then(Node::parent);
        }
        false
    }

    /// `/`-joined names from just below `ancestor` down to `node`. The
    /// ancestor itself yields an empty path.
    pub fn relative_path(&self, node: NodeId, ancestor: NodeId) -> Option<String> {
        let mut names = Vec::new();
        let mut current = node;
        while current != ancestor {
            let entry = self.node(current)?;
            names.push(entry.name.as_str());
            current = entry.parent?;
        }
        names.reverse();
        Some(names.join("/"))
    }

    /// Resolve a `/`-separated path below `from`, taking the first child
    /// with a matching name at each level. An empty path resolves to `from`.
    pub fn find_path(&self, from: NodeId, path: &str) -> Option<NodeId> {
        if !self.contains(from) {
            return None;
        }
        let mut current = from;
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            current = self
                .children(current)
                .iter()
                .copied()
                .find(|child| self.name(*child) == Some(segment))?;
        }
        Some(current)
    }

    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut current = self.node(id);
        while let Some(node) = current {
            matrix = node.transform.matrix() * matrix;
            current = node.parent.and_then(|parent| self.node(parent));
        }
        matrix
    }

    pub fn world_position(&self, id: NodeId) -> Vec3 {
        self.world_matrix(id).transform_point3(Vec3::ZERO)
    }

    /// A node is effectively active only when it and every ancestor are.
    pub fn is_active_in_hierarchy(&self, id: NodeId) -> bool {
        let mut current = self.node(id);
        if current.is_none() {
            return false;
        }
        while let Some(node) = current {
            if !node.active {
                return false;
            }
            current = node.parent.and_then(|parent| self.node(parent));
        }
        true
    }

    /// Number of renderables at or below `root`, inactive nodes included.
    pub fn renderable_count(&self, root: NodeId) -> usize {
        self.descendants(root)
            .filter(|id| self.renderable(*id).is_some())
            .count()
    }
}

pub struct Descendants<'a> {
    hierarchy: &'a Hierarchy,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        // Reverse so the first child is visited first.
        self.stack
            .extend(self.hierarchy.children(id).iter().rev().copied());
        Some(id)
    }
}

pub fn compose_transform_matrix(
    position: [f32; 3],
    rotation_deg: [f32; 3],
    scale: [f32; 3],
) -> [f32; 16] {
    let (rx, ry, rz) = (
        rotation_deg[0].to_radians(),
        rotation_deg[1].to_radians(),
        rotation_deg[2].to_radians(),
    );
    let (sx, cx) = rx.sin_cos();
    let (sy, cy) = ry.sin_cos();
    let (sz, cz) = rz.sin_cos();

    // Rotation order: Z (roll) * Y (yaw) * X (pitch)
    let r00 = cz * cy;
    let r01 = cz * sy * sx - sz * cx;
    let r02 = cz * sy * cx + sz * sx;
    let r10 = sz * cy;
    let r11 = sz * sy * sx + cz * cx;
    let r12 = sz * sy * cx - cz * sx;
    let r20 = -sy;
    let r21 = cy * sx;
    let r22 = cy * cx;

    let (sx, sy, sz) = (scale[0], scale[1], scale[2]);
    [
        r00 * sx,
        r10 * sx,
        r20 * sx,
        0.0,
        r01 * sy,
        r11 * sy,
        r21 * sy,
        0.0,
        r02 * sz,
        r12 * sz,
        r22 * sz,
        0.0,
        position[0],
        position[1],
        position[2],
        1.0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outfit() -> (Hierarchy, NodeId, NodeId) {
        let mut tree = Hierarchy::new("Avatar");
        let outfit = tree.add_child(tree.root(), "Outfit");
        let shirt = tree.add_renderable(outfit, "Shirt", Renderable::new(vec![None]));
        (tree, outfit, shirt)
    }

    #[test]
    fn relative_path_excludes_ancestor() {
        let (tree, outfit, shirt) = outfit();
        assert_eq!(tree.relative_path(shirt, tree.root()).as_deref(), Some("Outfit/Shirt"));
        assert_eq!(tree.relative_path(shirt, outfit).as_deref(), Some("Shirt"));
        assert_eq!(tree.relative_path(outfit, outfit).as_deref(), Some(""));
        assert_eq!(tree.relative_path(outfit, shirt), None);
    }

    #[test]
    fn find_path_takes_first_matching_sibling() {
        let mut tree = Hierarchy::new("Root");
        let first = tree.add_child(tree.root(), "Dup");
        let _second = tree.add_child(tree.root(), "Dup");
        assert_eq!(tree.find_path(tree.root(), "Dup"), Some(first));
        assert_eq!(tree.find_path(tree.root(), ""), Some(tree.root()));
        assert_eq!(tree.find_path(tree.root(), "Missing"), None);
    }

    #[test]
    fn descendants_are_pre_order() {
        let mut tree = Hierarchy::new("R");
        let a = tree.add_child(tree.root(), "A");
        let a1 = tree.add_child(a, "A1");
        let b = tree.add_child(tree.root(), "B");
        let order: Vec<NodeId> = tree.descendants(tree.root()).collect();
        assert_eq!(order, vec![tree.root(), a, a1, b]);
    }

    #[test]
    fn clone_preserves_ids() {
        let (tree, _, shirt) = outfit();
        let copy = tree.clone();
        assert_eq!(copy.name(shirt), Some("Shirt"));
        assert!(copy.renderable(shirt).is_some());
    }

    #[test]
    fn activity_is_inherited() {
        let (mut tree, outfit, shirt) = outfit();
        assert!(tree.is_active_in_hierarchy(shirt));
        tree.node_mut(outfit).unwrap().set_active(false);
        assert!(!tree.is_active_in_hierarchy(shirt));
        assert!(tree.node(shirt).unwrap().is_active());
    }

    #[test]
    fn world_position_accumulates_parents() {
        let (mut tree, outfit, shirt) = outfit();
        tree.node_mut(outfit)
            .unwrap()
            .set_transform(Transform::from_position([0.0, 1.0, 0.0]));
        tree.node_mut(shirt)
            .unwrap()
            .set_transform(Transform::from_position([0.5, 0.25, 0.0]));
        let world = tree.world_position(shirt);
        assert!((world - Vec3::new(0.5, 1.25, 0.0)).length() < 1e-5);
    }

    #[test]
    fn set_slot_rejects_out_of_range() {
        let mut renderable = Renderable::new(vec![None, None]);
        let red = Material::shared("Red", [1.0, 0.0, 0.0, 1.0]);
        assert!(renderable.set_slot(1, red.clone()));
        assert!(!renderable.set_slot(2, red));
        assert_eq!(renderable.slot_count(), 2);
    }
}
