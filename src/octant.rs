//! Octants of a linear octree.
//!
//! An octant is identified by its level and a level relative Morton key: the
//! children of an octant with key `k` have keys `(k << dim) | i` for `i` in
//! `0..2^dim`. Octants are ordered by their absolute key, which is the key
//! of their first descendant on the deepest level, and then by level. This
//! is the Z order in which a linear octree stores its leaves; an ancestor
//! always sorts before its descendants.

use std::{
    cmp::Ordering,
    hash::{Hash, Hasher},
    io::{Read, Write},
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::{
    constants::{LOGICAL_LENGTH, MAX_LEVEL, OWNED_LAYER},
    error::{OctreeError, OctreeResult},
    morton::{decode, encode, xyz_key},
    topology::TreeConstants,
};

const PBOUND_OFFSET: u16 = 6;
const NEW_REFINED_BIT: u16 = 12;
const NEW_COARSENED_BIT: u16 = 13;
const BALANCE_BIT: u16 = 14;
const AUX_BIT: u16 = 15;

/// A cell of the octree.
#[derive(Clone, Copy, Debug)]
pub struct Octant {
    morton: u64,
    level: u8,
    marker: i8,
    info: u16,
    dim: u8,
    ghost_layer: i32,
}

impl Octant {
    /// Size in bytes of the binary record of an octant.
    pub const BINARY_SIZE: usize = 8 + 1 + 1 + 2 + 1 + 4;

    /// Build an octant from its key without any checks.
    ///
    /// The caller guarantees a supported `dim`, `level <= MAX_LEVEL` and a key
    /// within range of the level. Boundary flags are derived from the position.
    pub(crate) fn from_key(dim: u8, level: u8, morton: u64) -> Self {
        let mut octant = Self {
            morton,
            level,
            marker: 0,
            info: 1 << BALANCE_BIT,
            dim,
            ghost_layer: OWNED_LAYER,
        };
        octant.update_bounds();
        octant
    }

    /// The root octant covering the whole logical domain.
    pub fn root(dim: u8) -> OctreeResult<Self> {
        TreeConstants::instance(dim)?;
        Ok(Self::from_key(dim, 0, 0))
    }

    /// Create the octant of the given level whose lower corner sits at `coords`.
    ///
    /// Coordinates are logical, i.e. on `[0, 2^MAX_LEVEL)`, and must be aligned
    /// to the octant size of `level`. The `z` coordinate must be zero in 2D.
    pub fn from_coordinates(dim: u8, level: u8, coords: [u32; 3]) -> OctreeResult<Self> {
        TreeConstants::instance(dim)?;
        if level > MAX_LEVEL {
            return Err(OctreeError::LevelOutOfRange(level));
        }

        let shift = MAX_LEVEL - level;
        let size = 1u32 << shift;
        let used = if dim == 2 { 2 } else { 3 };
        let valid = coords.iter().enumerate().all(|(axis, &c)| {
            if axis < used {
                c < LOGICAL_LENGTH && c % size == 0
            } else {
                c == 0
            }
        });
        if !valid {
            return Err(OctreeError::InvalidCoordinates { coords, level });
        }

        let scaled = [coords[0] >> shift, coords[1] >> shift, coords[2] >> shift];
        Ok(Self::from_key(dim, level, encode(dim, scaled)))
    }

    /// Space dimension.
    pub fn dim(&self) -> u8 {
        self.dim
    }

    /// Refinement level.
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Refinement marker. Positive values request refinement, negative values coarsening.
    pub fn marker(&self) -> i8 {
        self.marker
    }

    /// Level relative Morton key.
    pub fn morton(&self) -> u64 {
        self.morton
    }

    /// Morton key of the first descendant on the deepest level.
    pub fn absolute_key(&self) -> u64 {
        self.morton << self.depth_shift()
    }

    /// Logical coordinates of the lower corner.
    pub fn logical_coordinates(&self) -> [u32; 3] {
        let shift = MAX_LEVEL - self.level;
        decode(self.dim, self.morton).map(|c| c << shift)
    }

    /// Logical edge length.
    pub fn logical_size(&self) -> u32 {
        1 << (MAX_LEVEL - self.level)
    }

    /// Logical area of a face.
    pub fn logical_area(&self) -> u64 {
        TreeConstants::of(self.dim).areas[self.level as usize]
    }

    /// Logical volume.
    pub fn logical_volume(&self) -> u64 {
        TreeConstants::of(self.dim).volumes[self.level as usize]
    }

    /// Logical center.
    pub fn logical_center(&self) -> [f64; 3] {
        self.displaced_point([1, 1, 1])
    }

    /// Logical center of a face.
    pub fn logical_face_center(&self, face: usize) -> [f64; 3] {
        self.displaced_point(TreeConstants::of(self.dim).face_displacements[face])
    }

    /// Logical center of an edge (3D only).
    pub fn logical_edge_center(&self, edge: usize) -> [f64; 3] {
        self.displaced_point(TreeConstants::of(self.dim).edge_displacements[edge])
    }

    fn displaced_point(&self, twice_local: [u8; 3]) -> [f64; 3] {
        let coords = self.logical_coordinates();
        let half = 0.5 * self.logical_size() as f64;
        let mut point = [0.0; 3];
        for axis in 0..self.dim as usize {
            point[axis] = coords[axis] as f64 + half * twice_local[axis] as f64;
        }
        point
    }

    /// Logical coordinates of node `node`.
    pub fn logical_node(&self, node: usize) -> [u32; 3] {
        let local = TreeConstants::of(self.dim).node_coordinates[node];
        let size = self.logical_size();
        let mut coords = self.logical_coordinates();
        for axis in 0..self.dim as usize {
            coords[axis] += local[axis] as u32 * size;
        }
        coords
    }

    /// Logical coordinates of all nodes.
    pub fn logical_nodes(&self) -> Vec<[u32; 3]> {
        (0..TreeConstants::of(self.dim).n_nodes)
            .map(|node| self.logical_node(node))
            .collect()
    }

    /// Outward normal of `face`.
    pub fn normal(&self, face: usize) -> [i8; 3] {
        TreeConstants::of(self.dim).normals[face]
    }

    /// Whether `face` lies on the boundary of the domain.
    pub fn bound(&self, face: usize) -> bool {
        self.info & (1 << face) != 0
    }

    /// Whether any face lies on the boundary of the domain.
    pub fn any_bound(&self) -> bool {
        self.info & 0x3f != 0
    }

    /// Whether `edge` lies on the boundary of the domain.
    pub fn edge_bound(&self, edge: usize) -> bool {
        let faces = TreeConstants::of(self.dim).edge_face[edge];
        faces.iter().any(|&face| self.bound(face))
    }

    /// Whether `node` lies on the boundary of the domain.
    pub fn node_bound(&self, node: usize) -> bool {
        let faces = TreeConstants::of(self.dim).node_face[node];
        faces[..self.dim as usize]
            .iter()
            .any(|&face| self.bound(face))
    }

    /// Whether `face` lies on a process boundary.
    pub fn pbound(&self, face: usize) -> bool {
        self.info & (1 << (PBOUND_OFFSET + face as u16)) != 0
    }

    /// Whether any face lies on a process boundary.
    pub fn any_pbound(&self) -> bool {
        self.info & (0x3f << PBOUND_OFFSET) != 0
    }

    /// Whether the octant was created by the last refinement.
    pub fn is_new_refined(&self) -> bool {
        self.info & (1 << NEW_REFINED_BIT) != 0
    }

    /// Whether the octant was created by the last coarsening.
    pub fn is_new_coarsened(&self) -> bool {
        self.info & (1 << NEW_COARSENED_BIT) != 0
    }

    /// Whether the 2:1 balance is enforced on this octant.
    pub fn balance(&self) -> bool {
        self.info & (1 << BALANCE_BIT) != 0
    }

    /// Free flag for callers.
    pub fn aux(&self) -> bool {
        self.info & (1 << AUX_BIT) != 0
    }

    /// Whether this is a ghost copy of an octant owned by another rank.
    pub fn is_ghost(&self) -> bool {
        self.ghost_layer != OWNED_LAYER
    }

    /// Halo depth of a ghost, `-1` for owned octants.
    pub fn ghost_layer(&self) -> i32 {
        self.ghost_layer
    }

    /// Raw information bits.
    pub fn info(&self) -> u16 {
        self.info
    }

    pub(crate) fn set_marker(&mut self, marker: i8) {
        self.marker = marker;
    }

    pub(crate) fn set_balance(&mut self, balance: bool) {
        self.set_bit(BALANCE_BIT, balance);
    }

    pub(crate) fn set_aux(&mut self, aux: bool) {
        self.set_bit(AUX_BIT, aux);
    }

    pub(crate) fn set_new_refined(&mut self, value: bool) {
        self.set_bit(NEW_REFINED_BIT, value);
    }

    pub(crate) fn set_new_coarsened(&mut self, value: bool) {
        self.set_bit(NEW_COARSENED_BIT, value);
    }

    pub(crate) fn set_pbound(&mut self, face: usize, value: bool) {
        self.set_bit(PBOUND_OFFSET + face as u16, value);
    }

    pub(crate) fn clear_pbound(&mut self) {
        self.info &= !(0x3f << PBOUND_OFFSET);
    }

    pub(crate) fn set_ghost_layer(&mut self, layer: i32) {
        self.ghost_layer = layer;
    }

    fn set_bit(&mut self, bit: u16, value: bool) {
        if value {
            self.info |= 1 << bit;
        } else {
            self.info &= !(1 << bit);
        }
    }

    fn update_bounds(&mut self) {
        let coords = self.logical_coordinates();
        let size = self.logical_size();
        self.info &= !0x3f;
        for axis in 0..self.dim as usize {
            if coords[axis] == 0 {
                self.info |= 1 << (2 * axis);
            }
            if coords[axis] + size == LOGICAL_LENGTH {
                self.info |= 1 << (2 * axis + 1);
            }
        }
    }

    fn depth_shift(&self) -> u32 {
        self.dim as u32 * (MAX_LEVEL - self.level) as u32
    }

    /// Morton key of the last descendant on the deepest level.
    pub fn last_descendant_key(&self) -> u64 {
        let shift = self.depth_shift();
        (self.morton << shift) | ((1u64 << shift) - 1)
    }

    /// The last descendant on the deepest level.
    pub fn build_last_descendant(&self) -> Octant {
        Self::from_key(self.dim, MAX_LEVEL, self.last_descendant_key())
    }

    /// The first descendant on the deepest level.
    pub fn build_first_descendant(&self) -> Octant {
        Self::from_key(self.dim, MAX_LEVEL, self.absolute_key())
    }

    /// Key of the father, `None` for the root.
    pub fn father_key(&self) -> Option<u64> {
        (self.level > 0).then(|| self.morton >> self.dim)
    }

    /// The father octant.
    pub fn build_father(&self) -> OctreeResult<Octant> {
        let key = self.father_key().ok_or(OctreeError::RootHasNoFather)?;
        let mut father = Self::from_key(self.dim, self.level - 1, key);
        father.set_balance(self.balance());
        Ok(father)
    }

    /// Number of children.
    pub fn count_children(&self) -> usize {
        1 << self.dim
    }

    /// The children in Z order.
    ///
    /// Children carry the marker decreased by one (never below zero), the
    /// balance flag of the parent and are flagged as newly refined.
    pub fn build_children(&self) -> OctreeResult<Vec<Octant>> {
        if self.level >= MAX_LEVEL {
            return Err(OctreeError::MaxLevelReached);
        }
        let marker = (self.marker - 1).max(0);
        Ok((0..self.count_children() as u64)
            .map(|index| {
                let key = (self.morton << self.dim) | index;
                let mut child = Self::from_key(self.dim, self.level + 1, key);
                child.marker = marker;
                child.set_balance(self.balance());
                child.set_new_refined(true);
                child
            })
            .collect())
    }

    /// Index of the octant among its siblings.
    pub fn child_index(&self) -> usize {
        if self.level == 0 {
            0
        } else {
            (self.morton & ((1 << self.dim) - 1)) as usize
        }
    }

    /// Whether `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &Octant) -> bool {
        self.level < other.level
            && (other.morton >> (self.dim as u32 * (other.level - self.level) as u32)) == self.morton
    }

    /// Whether `self` is equal to or an ancestor of `other`.
    pub fn contains(&self, other: &Octant) -> bool {
        self == other || self.is_ancestor_of(other)
    }

    /// Whether both octants have the same father.
    pub fn is_sibling_of(&self, other: &Octant) -> bool {
        self.level > 0 && self.level == other.level && self.father_key() == other.father_key()
    }

    /// Key of node `node` that is shared by every octant touching the node.
    ///
    /// The key only depends on the logical position of the node, so it does
    /// not change when the octant is refined or coarsened.
    pub fn node_persistent_key(&self, node: usize) -> u64 {
        xyz_key(self.dim, self.logical_node(node))
    }

    /// The octant of the same size displaced by `delta` octant sizes.
    ///
    /// Returns `None` if the displaced octant leaves the domain.
    pub(crate) fn displaced(&self, delta: [i8; 3]) -> Option<Octant> {
        let coords = self.logical_coordinates();
        let size = self.logical_size() as i64;
        let mut moved = [0u32; 3];
        for axis in 0..self.dim as usize {
            let c = coords[axis] as i64 + delta[axis] as i64 * size;
            if c < 0 || c >= LOGICAL_LENGTH as i64 {
                return None;
            }
            moved[axis] = (c >> (MAX_LEVEL - self.level)) as u32;
        }
        Some(Self::from_key(self.dim, self.level, encode(self.dim, moved)))
    }

    /// Whether `other` touches `self` on the face, edge or node in direction `delta`.
    ///
    /// `other` is expected to lie inside `self.displaced(delta)`.
    pub(crate) fn touches(&self, other: &Octant, delta: [i8; 3]) -> bool {
        let mine = self.logical_coordinates();
        let theirs = other.logical_coordinates();
        let size = self.logical_size();
        let other_size = other.logical_size();
        (0..self.dim as usize).all(|axis| match delta[axis] {
            -1 => theirs[axis] + other_size == mine[axis],
            1 => theirs[axis] == mine[axis] + size,
            _ => true,
        })
    }

    /// Write the fixed size little endian record of the octant.
    pub fn write_binary<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u64::<LittleEndian>(self.morton)?;
        writer.write_u8(self.level)?;
        writer.write_i8(self.marker)?;
        writer.write_u16::<LittleEndian>(self.info)?;
        writer.write_u8(self.dim)?;
        writer.write_i32::<LittleEndian>(self.ghost_layer)?;
        Ok(())
    }

    /// Read an octant written by [Octant::write_binary].
    pub fn read_binary<R: Read>(reader: &mut R) -> OctreeResult<Octant> {
        let morton = reader.read_u64::<LittleEndian>()?;
        let level = reader.read_u8()?;
        let marker = reader.read_i8()?;
        let info = reader.read_u16::<LittleEndian>()?;
        let dim = reader.read_u8()?;
        let ghost_layer = reader.read_i32::<LittleEndian>()?;

        if dim != 2 && dim != 3 {
            return Err(OctreeError::InvalidStream(format!("dimension {dim}")));
        }
        if level > MAX_LEVEL {
            return Err(OctreeError::InvalidStream(format!("level {level}")));
        }
        if morton >> (dim as u32 * level as u32) != 0 {
            return Err(OctreeError::InvalidStream(format!(
                "key {morton} out of range on level {level}"
            )));
        }

        Ok(Octant {
            morton,
            level,
            marker,
            info,
            dim,
            ghost_layer,
        })
    }
}

impl Default for Octant {
    /// The root of a 3D tree.
    fn default() -> Self {
        Self::from_key(3, 0, 0)
    }
}

impl PartialEq for Octant {
    fn eq(&self, other: &Self) -> bool {
        self.morton == other.morton && self.level == other.level
    }
}

impl Eq for Octant {}

impl Hash for Octant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.morton.hash(state);
        self.level.hash(state);
    }
}

impl Ord for Octant {
    fn cmp(&self, other: &Self) -> Ordering {
        self.absolute_key()
            .cmp(&other.absolute_key())
            .then(self.level.cmp(&other.level))
    }
}

impl PartialOrd for Octant {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Octant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [x, y, z] = self.logical_coordinates();
        write!(
            f,
            "Octant(level: {}, key: {}, coords: ({}, {}, {}), marker: {})",
            self.level, self.morton, x, y, z, self.marker
        )
    }
}

#[cfg(test)]
mod test {
    use itertools::Itertools;

    use super::Octant;
    use crate::{
        constants::{LOGICAL_LENGTH, MAX_LEVEL},
        error::OctreeError,
    };

    #[test]
    fn test_root_children_2d() {
        let root = Octant::root(2).unwrap();
        assert!((0..4).all(|face| root.bound(face)));

        let children = root.build_children().unwrap();
        assert_eq!(children.iter().map(|c| c.morton()).collect_vec(), [0, 1, 2, 3]);
        assert!(children.iter().all(|c| c.level() == 1 && c.is_new_refined()));

        let half = LOGICAL_LENGTH / 2;
        assert_eq!(children[1].logical_coordinates(), [half, 0, 0]);
        assert_eq!(children[2].logical_coordinates(), [0, half, 0]);
        assert!(children[3].bound(1) && children[3].bound(3));
        assert!(!children[3].bound(0) && !children[3].bound(2));

        for child in &children {
            assert_eq!(child.build_father().unwrap(), root);
            assert!(root.is_ancestor_of(child));
            assert!(child.is_sibling_of(&children[0]));
        }
        assert!(matches!(root.build_father(), Err(OctreeError::RootHasNoFather)));
    }

    #[test]
    fn test_ordering() {
        let root = Octant::root(3).unwrap();
        let children = root.build_children().unwrap();
        let grand = children[1].build_children().unwrap();

        let mut all = vec![children[2], grand[3], root, children[0], grand[0], children[1]];
        all.sort();
        assert_eq!(
            all,
            [root, children[0], children[1], grand[0], grand[3], children[2]]
        );
        assert_eq!(grand[0].absolute_key(), children[1].absolute_key());
    }

    #[test]
    fn test_descendants() {
        let root = Octant::root(2).unwrap();
        let child = root.build_children().unwrap()[2];
        let last = child.build_last_descendant();
        assert_eq!(last.level(), MAX_LEVEL);
        assert!(child.is_ancestor_of(&last));
        assert_eq!(child.last_descendant_key() - child.absolute_key() + 1, child.logical_volume());
    }

    #[test]
    fn test_from_coordinates() {
        let size = 1 << (MAX_LEVEL - 3);
        let octant = Octant::from_coordinates(3, 3, [size, 2 * size, 0]).unwrap();
        assert_eq!(octant.logical_coordinates(), [size, 2 * size, 0]);
        assert_eq!(octant.logical_size(), size);
        assert_eq!(octant.logical_center(), [1.5 * size as f64, 2.5 * size as f64, 0.5 * size as f64]);

        assert!(matches!(
            Octant::from_coordinates(3, 3, [size / 2, 0, 0]),
            Err(OctreeError::InvalidCoordinates { .. })
        ));
        assert!(matches!(
            Octant::from_coordinates(2, 1, [0, 0, 4]),
            Err(OctreeError::InvalidCoordinates { .. })
        ));
        assert!(matches!(
            Octant::from_coordinates(3, MAX_LEVEL + 1, [0, 0, 0]),
            Err(OctreeError::LevelOutOfRange(_))
        ));
        assert!(matches!(Octant::root(1), Err(OctreeError::InvalidDimension(1))));
    }

    #[test]
    fn test_max_level_has_no_children() {
        let octant = Octant::from_coordinates(2, MAX_LEVEL, [5, 7, 0]).unwrap();
        assert!(matches!(octant.build_children(), Err(OctreeError::MaxLevelReached)));
    }

    #[test]
    fn test_persistent_node_keys() {
        let root = Octant::root(2).unwrap();
        let children = root.build_children().unwrap();
        // The center node is shared by all four children.
        let keys = [
            children[0].node_persistent_key(3),
            children[1].node_persistent_key(2),
            children[2].node_persistent_key(1),
            children[3].node_persistent_key(0),
        ];
        assert!(keys.iter().all_equal());

        let grand = children[0].build_children().unwrap();
        assert_eq!(grand[0].node_persistent_key(0), root.node_persistent_key(0));
    }

    #[test]
    fn test_binary_record() {
        let mut octant = Octant::from_coordinates(3, 4, [0, 1 << 16, 0]).unwrap();
        octant.set_marker(-1);
        octant.set_ghost_layer(2);
        octant.set_pbound(1, true);

        let mut buffer = Vec::new();
        octant.write_binary(&mut buffer).unwrap();
        assert_eq!(buffer.len(), Octant::BINARY_SIZE);

        let restored = Octant::read_binary(&mut buffer.as_slice()).unwrap();
        assert_eq!(restored, octant);
        assert_eq!(restored.marker(), -1);
        assert_eq!(restored.ghost_layer(), 2);
        assert_eq!(restored.info(), octant.info());

        buffer[10] = 7;
        buffer[12] = 9;
        assert!(matches!(
            Octant::read_binary(&mut buffer.as_slice()),
            Err(OctreeError::InvalidStream(_))
        ));
    }

    #[test]
    fn test_displaced_and_touching() {
        let root = Octant::root(2).unwrap();
        let children = root.build_children().unwrap();
        assert_eq!(children[0].displaced([1, 0, 0]), Some(children[1]));
        assert_eq!(children[0].displaced([1, 1, 0]), Some(children[3]));
        assert_eq!(children[0].displaced([-1, 0, 0]), None);

        let grand = children[1].build_children().unwrap();
        assert!(children[0].touches(&grand[0], [1, 0, 0]));
        assert!(children[0].touches(&grand[2], [1, 0, 0]));
        assert!(!children[0].touches(&grand[1], [1, 0, 0]));
    }
}
