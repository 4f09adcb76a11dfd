//! Configuration of an octree.

use crate::{
    error::{OctreeError, OctreeResult},
    geometry::Mapping,
};

/// Parameters shared by the local and the distributed octree.
#[derive(Clone, Debug, PartialEq)]
pub struct OctreeConfig {
    /// Space dimension, 2 or 3.
    pub dim: u8,
    /// Depth of the ghost layer of a distributed tree.
    pub halo_layers: usize,
    /// Codimension up to which the 2:1 balance is enforced: 1 for faces,
    /// 2 for edges in 3D (nodes in 2D), 3 for nodes in 3D.
    pub balance_codim: u8,
    /// Physical position of the lower corner of the domain.
    pub origin: [f64; 3],
    /// Physical edge length of the domain.
    pub length: f64,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            dim: 3,
            halo_layers: 1,
            balance_codim: 1,
            origin: [0.0; 3],
            length: 1.0,
        }
    }
}

impl OctreeConfig {
    /// Default configuration in `dim` dimensions.
    pub fn new(dim: u8) -> Self {
        Self::default().with_dim(dim)
    }

    /// Set the dimension.
    pub fn with_dim(mut self, dim: u8) -> Self {
        self.dim = dim;
        self
    }

    /// Set the ghost layer depth.
    pub fn with_halo_layers(mut self, halo_layers: usize) -> Self {
        self.halo_layers = halo_layers;
        self
    }

    /// Set the balance codimension.
    pub fn with_balance_codim(mut self, balance_codim: u8) -> Self {
        self.balance_codim = balance_codim;
        self
    }

    /// Set the lower corner of the domain.
    pub fn with_origin(mut self, origin: [f64; 3]) -> Self {
        self.origin = origin;
        self
    }

    /// Set the edge length of the domain.
    pub fn with_length(mut self, length: f64) -> Self {
        self.length = length;
        self
    }

    /// Check that all parameters are admissible.
    pub fn validate(&self) -> OctreeResult<()> {
        if self.dim != 2 && self.dim != 3 {
            return Err(OctreeError::InvalidDimension(self.dim));
        }
        if self.balance_codim == 0 || self.balance_codim > self.dim {
            return Err(OctreeError::InvalidConfig(format!(
                "balance codimension {} in {} dimensions",
                self.balance_codim, self.dim
            )));
        }
        if self.halo_layers == 0 {
            return Err(OctreeError::InvalidConfig(
                "at least one ghost layer is required".to_string(),
            ));
        }
        if !(self.length.is_finite() && self.length > 0.0) {
            return Err(OctreeError::InvalidConfig(format!(
                "domain length {}",
                self.length
            )));
        }
        if self.origin.iter().any(|c| !c.is_finite()) {
            return Err(OctreeError::InvalidConfig(format!(
                "domain origin {:?}",
                self.origin
            )));
        }
        Ok(())
    }

    /// Mapping between logical and physical coordinates.
    pub fn mapping(&self) -> Mapping {
        Mapping::new(self.dim, self.origin, self.length)
    }
}
