//! Flattened node table
//!
//! Nodes are registered on first reference. Registering a node registers its
//! parent first, so every parent index in the table is smaller than the index
//! of its children.

use glam::Mat4;
use spmdl_format::{NodeRecord, StringPool, NO_INDEX};

use crate::scene::SourceScene;

/// 3x4 column-major affine part of a matrix
pub fn matrix3x4(m: &Mat4) -> [f32; 12] {
    let c = m.to_cols_array();
    [c[0], c[1], c[2], c[4], c[5], c[6], c[8], c[9], c[10], c[12], c[13], c[14]]
}

/// Source node index -> output node index
#[derive(Debug, Clone)]
pub struct NodeTable {
    remap: Vec<Option<u32>>,
    order: Vec<usize>,
}

impl NodeTable {
    pub fn new(scene: &SourceScene) -> Self {
        Self {
            remap: vec![None; scene.nodes.len()],
            order: Vec::new(),
        }
    }

    /// Register `node` (and its ancestors) and return its output index
    pub fn register(&mut self, scene: &SourceScene, node: usize) -> u32 {
        if let Some(index) = self.remap[node] {
            return index;
        }
        if let Some(parent) = scene.nodes[node].parent {
            self.register(scene, parent);
        }
        let index = self.order.len() as u32;
        self.remap[node] = Some(index);
        self.order.push(node);
        index
    }

    /// Output index of an already registered node
    pub fn get(&self, node: usize) -> Option<u32> {
        self.remap.get(node).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Source node indices in output order
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Output records, names interned into `strings`
    pub fn records(&self, scene: &SourceScene, strings: &mut StringPool) -> Vec<NodeRecord> {
        self.order
            .iter()
            .map(|&source| {
                let node = &scene.nodes[source];
                NodeRecord {
                    parent: node.parent.and_then(|p| self.get(p)).unwrap_or(NO_INDEX),
                    name: strings.intern(&node.name),
                    translation: node.translation.to_array(),
                    rotation: node.rotation.to_array(),
                    scale: node.scale.to_array(),
                    local: matrix3x4(&node.local),
                    world: matrix3x4(&node.world),
                }
            })
            .collect()
    }
}
