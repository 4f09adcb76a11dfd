//! Geometry information

use crate::{constants::LOGICAL_LENGTH, octant::Octant};

/// Maps the logical domain `[0, 2^MAX_LEVEL]^dim` of an octree to a physical cube.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mapping {
    dim: u8,
    origin: [f64; 3],
    length: f64,
}

impl Mapping {
    /// Create a new mapping onto the cube with lower corner `origin` and edge `length`.
    pub fn new(dim: u8, origin: [f64; 3], length: f64) -> Self {
        Self {
            dim,
            origin,
            length,
        }
    }

    /// Return the lower corner of the physical domain.
    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    /// Return the edge length of the physical domain.
    pub fn length(&self) -> f64 {
        self.length
    }

    fn scale(&self) -> f64 {
        self.length / LOGICAL_LENGTH as f64
    }

    /// Map a point from logical coordinates to the physical domain.
    ///
    /// In 2D the z coordinate stays at the origin.
    pub fn logical_to_physical(&self, point: [f64; 3]) -> [f64; 3] {
        let scale = self.scale();
        let mut mapped = self.origin;
        for axis in 0..self.dim as usize {
            mapped[axis] += scale * point[axis];
        }
        mapped
    }

    /// Map a point from the physical domain to logical coordinates.
    pub fn physical_to_logical(&self, point: [f64; 3]) -> [f64; 3] {
        let scale = self.scale();
        let mut mapped = [0.0; 3];
        for axis in 0..self.dim as usize {
            mapped[axis] = (point[axis] - self.origin[axis]) / scale;
        }
        mapped
    }

    /// Logical coordinates of the deepest octant containing `point`.
    ///
    /// Points on the upper boundary belong to the last octant along that axis.
    /// Returns `None` for points outside of the domain.
    pub fn locate(&self, point: [f64; 3]) -> Option<[u32; 3]> {
        let logical = self.physical_to_logical(point);
        let mut coords = [0u32; 3];
        for axis in 0..self.dim as usize {
            let c = logical[axis];
            if !(0.0..=LOGICAL_LENGTH as f64).contains(&c) {
                return None;
            }
            coords[axis] = (c as u32).min(LOGICAL_LENGTH - 1);
        }
        Some(coords)
    }

    /// Physical edge length of a logical length.
    pub fn map_size(&self, size: u32) -> f64 {
        self.scale() * size as f64
    }

    /// Physical area of a logical area.
    pub fn map_area(&self, area: u64) -> f64 {
        self.scale().powi(self.dim as i32 - 1) * area as f64
    }

    /// Physical volume of a logical volume.
    pub fn map_volume(&self, volume: u64) -> f64 {
        self.scale().powi(self.dim as i32) * volume as f64
    }

    /// Physical center of an octant.
    pub fn center(&self, octant: &Octant) -> [f64; 3] {
        self.logical_to_physical(octant.logical_center())
    }

    /// Physical center of a face of an octant.
    pub fn face_center(&self, octant: &Octant, face: usize) -> [f64; 3] {
        self.logical_to_physical(octant.logical_face_center(face))
    }

    /// Physical edge length of an octant.
    pub fn size(&self, octant: &Octant) -> f64 {
        self.map_size(octant.logical_size())
    }

    /// Physical face area of an octant.
    pub fn area(&self, octant: &Octant) -> f64 {
        self.map_area(octant.logical_area())
    }

    /// Physical volume of an octant.
    pub fn volume(&self, octant: &Octant) -> f64 {
        self.map_volume(octant.logical_volume())
    }

    /// Physical nodes of an octant.
    pub fn nodes(&self, octant: &Octant) -> Vec<[f64; 3]> {
        octant
            .logical_nodes()
            .into_iter()
            .map(|node| self.logical_to_physical(node.map(|c| c as f64)))
            .collect()
    }
}

impl std::fmt::Display for Mapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [x, y, z] = self.origin;
        write!(
            f,
            "(dim: {}, origin: ({}, {}, {}), length: {})",
            self.dim, x, y, z, self.length
        )
    }
}
