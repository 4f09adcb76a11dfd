//! Topology tables of the 2D and 3D reference octant.
//!
//! Faces are numbered `-x, +x, -y, +y, -z, +z`. Node `i` sits at the local
//! coordinates `(i & 1, (i >> 1) & 1, (i >> 2) & 1)`, so nodes and children
//! share the same Z order. Edges only exist in 3D; in 2D the faces play the
//! role of edges and `n_edges` is zero.
//!
//! The tables are built once per dimension on first access and never change
//! afterwards.

use std::sync::OnceLock;

use itertools::Itertools;

use crate::{
    constants::{MAX_EDGES, MAX_FACES, MAX_LEVEL, MAX_NODES},
    error::{OctreeError, OctreeResult},
};

/// Edge coefficients in 3D. The zero entry is the direction of the edge.
const EDGE_COEFFS_3D: [[i8; 3]; MAX_EDGES] = [
    [-1, 0, -1],
    [1, 0, -1],
    [0, -1, -1],
    [0, 1, -1],
    [-1, -1, 0],
    [1, -1, 0],
    [-1, 1, 0],
    [1, 1, 0],
    [-1, 0, 1],
    [1, 0, 1],
    [0, -1, 1],
    [0, 1, 1],
];

static CONSTANTS_2D: OnceLock<TreeConstants> = OnceLock::new();
static CONSTANTS_3D: OnceLock<TreeConstants> = OnceLock::new();

/// Immutable topology table for one dimension.
#[derive(Debug, Clone)]
pub struct TreeConstants {
    /// Space dimension.
    pub dim: u8,
    /// Deepest admissible level.
    pub max_level: u8,
    /// Number of children of an octant.
    pub n_children: usize,
    /// Number of faces of an octant.
    pub n_faces: usize,
    /// Number of edges of an octant (zero in 2D).
    pub n_edges: usize,
    /// Number of nodes of an octant.
    pub n_nodes: usize,
    /// Number of nodes on each face.
    pub n_nodes_per_face: usize,
    /// Face on the other side of each face.
    pub opposite_face: [usize; MAX_FACES],
    /// Nodes of each face, ascending. Only the first `n_nodes_per_face` entries are used.
    pub face_node: [[usize; 4]; MAX_FACES],
    /// Faces sharing each node. Only the first `dim` entries are used.
    pub node_face: [[usize; 3]; MAX_NODES],
    /// Edges sharing each node (3D only).
    pub node_edge: [[usize; 3]; MAX_NODES],
    /// The two faces sharing each edge (3D only).
    pub edge_face: [[usize; 2]; MAX_EDGES],
    /// The two nodes of each edge (3D only).
    pub edge_node: [[usize; 2]; MAX_EDGES],
    /// The other edges parallel to each edge (3D only).
    pub parallel_edges: [[usize; 3]; MAX_EDGES],
    /// Outward normal of each face.
    pub normals: [[i8; 3]; MAX_FACES],
    /// Outward direction of each edge (3D only).
    pub edge_coeffs: [[i8; 3]; MAX_EDGES],
    /// Outward direction of each node.
    pub node_coeffs: [[i8; 3]; MAX_NODES],
    /// Local coordinates of each node.
    pub node_coordinates: [[u8; 3]; MAX_NODES],
    /// Twice the local displacement of each edge center (3D only).
    pub edge_displacements: [[u8; 3]; MAX_EDGES],
    /// Twice the local displacement of each face center.
    pub face_displacements: [[u8; 3]; MAX_FACES],
    /// Logical edge length per level.
    pub lengths: Vec<u32>,
    /// Logical face area per level.
    pub areas: Vec<u64>,
    /// Logical volume per level.
    pub volumes: Vec<u64>,
}

impl TreeConstants {
    /// Return the table for dimension `dim`.
    pub fn instance(dim: u8) -> OctreeResult<&'static TreeConstants> {
        match dim {
            2 => Ok(CONSTANTS_2D.get_or_init(|| TreeConstants::build(2))),
            3 => Ok(CONSTANTS_3D.get_or_init(|| TreeConstants::build(3))),
            _ => Err(OctreeError::InvalidDimension(dim)),
        }
    }

    /// Table for a dimension that was validated before.
    pub(crate) fn of(dim: u8) -> &'static TreeConstants {
        if dim == 2 {
            CONSTANTS_2D.get_or_init(|| TreeConstants::build(2))
        } else {
            CONSTANTS_3D.get_or_init(|| TreeConstants::build(3))
        }
    }

    /// Node index of the given local node coordinates (each 0 or 1).
    pub fn node_from_coordinates(&self, coords: [u8; 3]) -> usize {
        let z = if self.dim == 3 { coords[2] } else { 0 };
        (coords[0] | (coords[1] << 1) | (z << 2)) as usize
    }

    /// Number of elements of the given codimension: faces for 1, edges for 2 in 3D,
    /// nodes for `dim`.
    pub fn n_of_codim(&self, codim: u8) -> usize {
        match (self.dim, codim) {
            (_, 1) => self.n_faces,
            (3, 2) => self.n_edges,
            (d, c) if c == d => self.n_nodes,
            _ => 0,
        }
    }

    /// Outward direction of the `index`-th element of codimension `codim`.
    pub fn coefficients(&self, codim: u8, index: usize) -> [i8; 3] {
        match (self.dim, codim) {
            (_, 1) => self.normals[index],
            (3, 2) => self.edge_coeffs[index],
            _ => self.node_coeffs[index],
        }
    }

    fn build(dim: u8) -> Self {
        let d = dim as usize;
        let n_faces = 2 * d;
        let n_nodes = 1 << d;
        let n_edges = if dim == 3 { 12 } else { 0 };

        let mut node_coordinates = [[0u8; 3]; MAX_NODES];
        let mut node_coeffs = [[0i8; 3]; MAX_NODES];
        for (node, coords) in node_coordinates.iter_mut().enumerate().take(n_nodes) {
            for (axis, c) in coords.iter_mut().enumerate().take(d) {
                *c = ((node >> axis) & 1) as u8;
                node_coeffs[node][axis] = 2 * (*c as i8) - 1;
            }
        }

        let mut opposite_face = [0usize; MAX_FACES];
        let mut normals = [[0i8; 3]; MAX_FACES];
        let mut face_displacements = [[0u8; 3]; MAX_FACES];
        let mut face_node = [[0usize; 4]; MAX_FACES];
        for face in 0..n_faces {
            let axis = face / 2;
            let side = (face % 2) as u8;
            opposite_face[face] = face ^ 1;
            normals[face][axis] = 2 * side as i8 - 1;
            for (a, disp) in face_displacements[face].iter_mut().enumerate().take(d) {
                *disp = if a == axis { 2 * side } else { 1 };
            }
            let on_face = (0..n_nodes)
                .filter(|&node| node_coordinates[node][axis] == side)
                .collect_vec();
            face_node[face][..on_face.len()].copy_from_slice(&on_face);
        }

        let mut node_face = [[0usize; 3]; MAX_NODES];
        for node in 0..n_nodes {
            for axis in 0..d {
                node_face[node][axis] = 2 * axis + node_coordinates[node][axis] as usize;
            }
        }

        let mut edge_coeffs = [[0i8; 3]; MAX_EDGES];
        let mut edge_face = [[0usize; 2]; MAX_EDGES];
        let mut edge_node = [[0usize; 2]; MAX_EDGES];
        let mut edge_displacements = [[0u8; 3]; MAX_EDGES];
        let mut parallel_edges = [[0usize; 3]; MAX_EDGES];
        let mut node_edge = [[0usize; 3]; MAX_NODES];
        if dim == 3 {
            edge_coeffs = EDGE_COEFFS_3D;
            for edge in 0..n_edges {
                let coeffs = edge_coeffs[edge];
                let faces = (0..3)
                    .filter(|&a| coeffs[a] != 0)
                    .map(|a| 2 * a + (coeffs[a] > 0) as usize)
                    .collect_vec();
                edge_face[edge].copy_from_slice(&faces);

                let nodes = (0..n_nodes)
                    .filter(|&node| {
                        (0..3).all(|a| {
                            coeffs[a] == 0 || node_coeffs[node][a] == coeffs[a]
                        })
                    })
                    .collect_vec();
                edge_node[edge].copy_from_slice(&nodes);

                for a in 0..3 {
                    edge_displacements[edge][a] = (coeffs[a] + 1) as u8;
                }

                let direction = coeffs.iter().position(|&c| c == 0).unwrap_or(0);
                let parallel = (0..n_edges)
                    .filter(|&other| other != edge && edge_coeffs[other][direction] == 0)
                    .collect_vec();
                parallel_edges[edge].copy_from_slice(&parallel);
            }

            for (node, edges) in node_edge.iter_mut().enumerate() {
                let touching = (0..n_edges)
                    .filter(|&edge| edge_node[edge].contains(&node))
                    .collect_vec();
                edges.copy_from_slice(&touching);
            }
        }

        let lengths = (0..=MAX_LEVEL)
            .map(|level| 1u32 << (MAX_LEVEL - level))
            .collect_vec();
        let areas = lengths
            .iter()
            .map(|&len| (len as u64).pow(dim as u32 - 1))
            .collect_vec();
        let volumes = lengths
            .iter()
            .map(|&len| (len as u64).pow(dim as u32))
            .collect_vec();

        Self {
            dim,
            max_level: MAX_LEVEL,
            n_children: n_nodes,
            n_faces,
            n_edges,
            n_nodes,
            n_nodes_per_face: n_nodes / 2,
            opposite_face,
            face_node,
            node_face,
            node_edge,
            edge_face,
            edge_node,
            parallel_edges,
            normals,
            edge_coeffs,
            node_coeffs,
            node_coordinates,
            edge_displacements,
            face_displacements,
            lengths,
            areas,
            volumes,
        }
    }
}
