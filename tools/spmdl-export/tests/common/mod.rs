//! Shared fixtures for spmdl-export integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3};
use gltf_json as json;
use json::validation::Checked::Valid;
use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use spmdl_export::{
    Bone, Face, IndexedAttribute, MeshPart, SkinCluster, SourceMesh, SourceNode, SourceScene,
    VertexFormat,
};

pub const SKINNED_FORMAT: &str = "pos_rgb32f,nrm_rgba8sn,uv_rg16f;bonei_rg8u,bonew_rg8un";

pub fn rng(seed: u64) -> Pcg32 {
    Pcg32::seed_from_u64(seed)
}

// ============================================================================
// Source scenes
// ============================================================================

/// Root, a mesh node and a two-bone chain below the root
pub fn scene_nodes() -> Vec<SourceNode> {
    vec![
        SourceNode::new("root", None),
        SourceNode::new("mesh", Some(0)),
        SourceNode::new("hips", Some(0)),
        SourceNode::new("spine", Some(2)),
    ]
}

/// Unit quad in the XY plane as a single 4-corner face
pub fn quad_mesh(node: usize) -> SourceMesh {
    SourceMesh {
        name: "quad".to_string(),
        node,
        positions: IndexedAttribute::new(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            vec![0, 1, 2, 3],
        ),
        normals: Some(IndexedAttribute::new(vec![Vec3::Z], vec![0; 4])),
        uvs: Some(IndexedAttribute::new(
            vec![Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y],
            vec![0, 1, 2, 3],
        )),
        colors: None,
        faces: vec![Face {
            index_begin: 0,
            num_indices: 4,
        }],
        face_materials: Vec::new(),
        materials: vec!["stone".to_string()],
        skin: Vec::new(),
    }
}

pub fn cluster(bone: usize, vertices: &[u32], weights: &[f32]) -> SkinCluster {
    SkinCluster {
        bone,
        mesh_to_bind: Mat4::from_translation(Vec3::new(0.0, -(bone as f32), 0.0)),
        vertices: vertices.to_vec(),
        weights: weights.to_vec(),
    }
}

/// Quad skinned to `hips` and `spine`
pub fn skinned_quad_scene() -> SourceScene {
    let mut mesh = quad_mesh(1);
    mesh.skin = vec![
        cluster(2, &[0, 1, 2], &[1.0, 1.0, 0.25]),
        cluster(3, &[2, 3], &[0.75, 1.0]),
    ];
    SourceScene {
        nodes: scene_nodes(),
        meshes: vec![mesh],
    }
}

// ============================================================================
// Mesh parts
// ============================================================================

/// Random skinned part: `vertex_count` vertices with distinct positions,
/// `triangle_count` triangles over three distinct vertices each, and
/// `bone_count` bones referenced through 4 influences per vertex
pub fn random_skinned_part(
    rng: &mut Pcg32,
    vertex_count: usize,
    triangle_count: usize,
    bone_count: usize,
) -> MeshPart {
    let format = Arc::new(VertexFormat::parse("pos_rgb32f,bonei_rgba8u,bonew_rgba8un").unwrap());
    let mut part = MeshPart::empty(0, 1, Some("random".to_string()), format);

    for v in 0..vertex_count {
        part.vertex_data.extend_from_slice(&[v as f32, rng.random::<f32>(), rng.random::<f32>()]);
        for _ in 0..4 {
            part.vertex_data.push(rng.random_range(0..bone_count) as f32);
        }
        let weights: [f32; 4] = std::array::from_fn(|_| rng.random::<f32>() + 0.01);
        let total: f32 = weights.iter().sum();
        part.vertex_data.extend(weights.iter().map(|w| w / total));
    }
    part.vertex_count = vertex_count;

    for _ in 0..triangle_count {
        let a = rng.random_range(0..vertex_count as u32);
        let mut b = rng.random_range(0..vertex_count as u32);
        while b == a {
            b = rng.random_range(0..vertex_count as u32);
        }
        let mut c = rng.random_range(0..vertex_count as u32);
        while c == a || c == b {
            c = rng.random_range(0..vertex_count as u32);
        }
        part.indices.extend_from_slice(&[a, b, c]);
    }

    part.bones = (0..bone_count)
        .map(|node| Bone {
            node,
            bind_matrix: Mat4::from_translation(Vec3::new(node as f32, 0.0, 0.0)),
        })
        .collect();
    part
}

/// Every triangle of `part` as the bit patterns of its three corner rows,
/// with local bone indices replaced by the bone's node
pub fn corner_triangles(part: &MeshPart) -> Vec<Vec<u32>> {
    let range = part.bone_index_range();
    part.indices
        .chunks_exact(3)
        .map(|triangle| {
            triangle
                .iter()
                .flat_map(|&v| {
                    let mut row = part.vertex(v as usize).to_vec();
                    if let Some(range) = range.clone() {
                        for value in &mut row[range] {
                            *value = part.bones[*value as usize].node as f32;
                        }
                    }
                    row.into_iter().map(f32::to_bits).collect::<Vec<_>>()
                })
                .collect()
        })
        .collect()
}

// ============================================================================
// GLB fixtures
// ============================================================================

/// Binary chunk with its buffer views and accessors, one view per accessor
#[derive(Default)]
pub struct GlbBuffer {
    pub data: Vec<u8>,
    pub views: Vec<json::buffer::View>,
    pub accessors: Vec<json::Accessor>,
}

impl GlbBuffer {
    fn push(
        &mut self,
        bytes: &[u8],
        count: usize,
        component: json::accessor::ComponentType,
        type_: json::accessor::Type,
        target: Option<json::buffer::Target>,
    ) -> json::Index<json::Accessor> {
        let offset = self.data.len();
        self.data.extend_from_slice(bytes);
        while !self.data.len().is_multiple_of(4) {
            self.data.push(0);
        }

        self.views.push(json::buffer::View {
            buffer: json::Index::new(0),
            byte_length: bytes.len().into(),
            byte_offset: Some((offset as u64).into()),
            byte_stride: None,
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            target: target.map(Valid),
        });
        self.accessors.push(json::Accessor {
            buffer_view: Some(json::Index::new(self.views.len() as u32 - 1)),
            byte_offset: Some(0u64.into()),
            count: count.into(),
            component_type: Valid(json::accessor::GenericComponentType(component)),
            extensions: Default::default(),
            extras: Default::default(),
            type_: Valid(type_),
            min: None,
            max: None,
            name: None,
            normalized: false,
            sparse: None,
        });
        json::Index::new(self.accessors.len() as u32 - 1)
    }

    /// Positions with the min/max bounds glTF requires
    pub fn positions(&mut self, positions: &[[f32; 3]]) -> json::Index<json::Accessor> {
        let index = self.vec3(positions);
        let mut min = [f32::INFINITY; 3];
        let mut max = [f32::NEG_INFINITY; 3];
        for p in positions {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }
        let accessor = &mut self.accessors[index.value()];
        accessor.min = Some(json::Value::Array(min.into_iter().map(json::Value::from).collect()));
        accessor.max = Some(json::Value::Array(max.into_iter().map(json::Value::from).collect()));
        index
    }

    pub fn vec2(&mut self, data: &[[f32; 2]]) -> json::Index<json::Accessor> {
        self.push(
            bytemuck::cast_slice(data),
            data.len(),
            json::accessor::ComponentType::F32,
            json::accessor::Type::Vec2,
            Some(json::buffer::Target::ArrayBuffer),
        )
    }

    pub fn vec3(&mut self, data: &[[f32; 3]]) -> json::Index<json::Accessor> {
        self.push(
            bytemuck::cast_slice(data),
            data.len(),
            json::accessor::ComponentType::F32,
            json::accessor::Type::Vec3,
            Some(json::buffer::Target::ArrayBuffer),
        )
    }

    pub fn vec4(&mut self, data: &[[f32; 4]]) -> json::Index<json::Accessor> {
        self.push(
            bytemuck::cast_slice(data),
            data.len(),
            json::accessor::ComponentType::F32,
            json::accessor::Type::Vec4,
            Some(json::buffer::Target::ArrayBuffer),
        )
    }

    pub fn joints(&mut self, joints: &[[u8; 4]]) -> json::Index<json::Accessor> {
        self.push(
            bytemuck::cast_slice(joints),
            joints.len(),
            json::accessor::ComponentType::U8,
            json::accessor::Type::Vec4,
            Some(json::buffer::Target::ArrayBuffer),
        )
    }

    pub fn matrices(&mut self, matrices: &[Mat4]) -> json::Index<json::Accessor> {
        let columns: Vec<[f32; 16]> = matrices.iter().map(Mat4::to_cols_array).collect();
        self.push(
            bytemuck::cast_slice(&columns),
            matrices.len(),
            json::accessor::ComponentType::F32,
            json::accessor::Type::Mat4,
            None,
        )
    }

    pub fn indices(&mut self, indices: &[u16]) -> json::Index<json::Accessor> {
        self.push(
            bytemuck::cast_slice(indices),
            indices.len(),
            json::accessor::ComponentType::U16,
            json::accessor::Type::Scalar,
            Some(json::buffer::Target::ElementArrayBuffer),
        )
    }
}

pub fn node(name: &str, translation: Option<[f32; 3]>, children: &[u32]) -> json::Node {
    json::Node {
        camera: None,
        children: (!children.is_empty())
            .then(|| children.iter().map(|&c| json::Index::new(c)).collect()),
        extensions: Default::default(),
        extras: Default::default(),
        matrix: None,
        mesh: None,
        name: Some(name.to_string()),
        rotation: None,
        scale: None,
        translation,
        skin: None,
        weights: None,
    }
}

pub fn primitive(
    attributes: &[(json::mesh::Semantic, json::Index<json::Accessor>)],
    indices: Option<json::Index<json::Accessor>>,
    material: Option<u32>,
) -> json::mesh::Primitive {
    json::mesh::Primitive {
        attributes: attributes
            .iter()
            .map(|(semantic, accessor)| (Valid(semantic.clone()), *accessor))
            .collect::<BTreeMap<_, _>>(),
        extensions: Default::default(),
        extras: Default::default(),
        indices,
        material: material.map(json::Index::new),
        mode: Valid(json::mesh::Mode::Triangles),
        targets: None,
    }
}

/// Document over one binary buffer, with one scene holding `scene_nodes`
pub fn document(
    buffer: &GlbBuffer,
    nodes: Vec<json::Node>,
    scene_nodes: &[u32],
    meshes: Vec<json::Mesh>,
    skins: Vec<json::Skin>,
    materials: &[&str],
) -> json::Root {
    json::Root {
        accessors: buffer.accessors.clone(),
        animations: Vec::new(),
        asset: json::Asset {
            copyright: None,
            extensions: Default::default(),
            extras: Default::default(),
            generator: Some("spmdl-export-test".to_string()),
            min_version: None,
            version: "2.0".to_string(),
        },
        buffers: vec![json::Buffer {
            byte_length: 0u64.into(),
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            uri: None,
        }],
        buffer_views: buffer.views.clone(),
        cameras: Vec::new(),
        extensions: Default::default(),
        extras: Default::default(),
        extensions_required: Vec::new(),
        extensions_used: Vec::new(),
        images: Vec::new(),
        materials: materials
            .iter()
            .map(|name| json::Material {
                name: Some(name.to_string()),
                ..Default::default()
            })
            .collect(),
        meshes,
        nodes,
        samplers: Vec::new(),
        scene: Some(json::Index::new(0)),
        scenes: vec![json::Scene {
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            nodes: scene_nodes.iter().map(|&n| json::Index::new(n)).collect(),
        }],
        skins,
        textures: Vec::new(),
    }
}

fn mesh(name: &str, primitives: Vec<json::mesh::Primitive>) -> json::Mesh {
    json::Mesh {
        extensions: Default::default(),
        extras: Default::default(),
        name: Some(name.to_string()),
        primitives,
        weights: None,
    }
}

/// Assemble a GLB container from a glTF document and its binary chunk
pub fn assemble_glb(root: &json::Root, buffer_data: &[u8]) -> Vec<u8> {
    let mut root = root.clone();
    root.buffers[0].byte_length = buffer_data.len().into();

    let json_string = json::serialize::to_string(&root).unwrap();
    let json_bytes = json_string.as_bytes();

    let json_padding = (4 - (json_bytes.len() % 4)) % 4;
    let json_chunk_length = json_bytes.len() + json_padding;
    let buffer_padding = (4 - (buffer_data.len() % 4)) % 4;
    let buffer_chunk_length = buffer_data.len() + buffer_padding;
    let total_length = 12 + 8 + json_chunk_length + 8 + buffer_chunk_length;

    let mut glb = Vec::with_capacity(total_length);
    glb.extend_from_slice(b"glTF");
    glb.extend_from_slice(&2u32.to_le_bytes());
    glb.extend_from_slice(&(total_length as u32).to_le_bytes());

    glb.extend_from_slice(&(json_chunk_length as u32).to_le_bytes());
    glb.extend_from_slice(&0x4E4F534Au32.to_le_bytes()); // "JSON"
    glb.extend_from_slice(json_bytes);
    glb.extend(std::iter::repeat_n(0x20, json_padding));

    glb.extend_from_slice(&(buffer_chunk_length as u32).to_le_bytes());
    glb.extend_from_slice(&0x004E4942u32.to_le_bytes()); // "BIN\0"
    glb.extend_from_slice(buffer_data);
    glb.extend(std::iter::repeat_n(0, buffer_padding));

    glb
}

const QUAD_POSITIONS: [[f32; 3]; 4] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [1.0, 1.0, 0.0],
    [0.0, 1.0, 0.0],
];

/// Skinned quad: node 0 `body` instances the mesh, node 1 `hips` with child
/// node 2 `spine` are the joints. Vertices 0 and 1 follow hips, vertex 3
/// follows spine and vertex 2 is split evenly between them.
pub fn skinned_quad_glb() -> Vec<u8> {
    use json::mesh::Semantic::*;

    let mut buffer = GlbBuffer::default();
    let positions = buffer.positions(&QUAD_POSITIONS);
    let normals = buffer.vec3(&[[0.0, 0.0, 1.0]; 4]);
    let uvs = buffer.vec2(&[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
    let joints = buffer.joints(&[[0, 0, 0, 0], [0, 0, 0, 0], [0, 1, 0, 0], [1, 0, 0, 0]]);
    let weights = buffer.vec4(&[
        [1.0, 0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0, 0.0],
        [0.5, 0.5, 0.0, 0.0],
        [1.0, 0.0, 0.0, 0.0],
    ]);
    let inverse_binds = buffer.matrices(&[
        Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0)),
        Mat4::from_translation(Vec3::new(0.0, -1.5, 0.0)),
    ]);
    let indices = buffer.indices(&[0, 1, 2, 0, 2, 3]);

    let mut body = node("body", None, &[]);
    body.mesh = Some(json::Index::new(0));
    body.skin = Some(json::Index::new(0));
    let nodes = vec![
        body,
        node("hips", Some([0.0, 1.0, 0.0]), &[2]),
        node("spine", Some([0.0, 0.5, 0.0]), &[]),
    ];

    let quad = primitive(
        &[
            (Positions, positions),
            (Normals, normals),
            (TexCoords(0), uvs),
            (Joints(0), joints),
            (Weights(0), weights),
        ],
        Some(indices),
        Some(0),
    );
    let skin = json::Skin {
        extensions: Default::default(),
        extras: Default::default(),
        inverse_bind_matrices: Some(inverse_binds),
        joints: vec![json::Index::new(1), json::Index::new(2)],
        name: Some("rig".to_string()),
        skeleton: None,
    };

    let root = document(
        &buffer,
        nodes,
        &[0, 1],
        vec![mesh("quad", vec![quad])],
        vec![skin],
        &["skin_mat"],
    );
    assemble_glb(&root, &buffer.data)
}

/// One mesh with two primitives: a red quad with material `paint`, then a
/// triangle with neither vertex colors nor a material
pub fn painted_mesh_glb() -> Vec<u8> {
    use json::mesh::Semantic::*;

    let mut buffer = GlbBuffer::default();
    let quad_positions = buffer.positions(&QUAD_POSITIONS);
    let colors = buffer.vec4(&[[1.0, 0.0, 0.0, 1.0]; 4]);
    let quad_indices = buffer.indices(&[0, 1, 2, 0, 2, 3]);
    let triangle_positions = buffer.positions(&[[2.0, 0.0, 0.0], [3.0, 0.0, 0.0], [2.0, 1.0, 0.0]]);

    let mut painted = node("painted", None, &[]);
    painted.mesh = Some(json::Index::new(0));

    let primitives = vec![
        primitive(&[(Positions, quad_positions), (Colors(0), colors)], Some(quad_indices), Some(0)),
        primitive(&[(Positions, triangle_positions)], None, None),
    ];

    let root = document(
        &buffer,
        vec![painted],
        &[0],
        vec![mesh("painted", primitives)],
        Vec::new(),
        &["paint"],
    );
    assemble_glb(&root, &buffer.data)
}
