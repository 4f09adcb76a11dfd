//! Global constants of the octree.

/// Deepest admissible refinement level of an octant.
///
/// Logical coordinates live on `[0, 2^MAX_LEVEL]`, so a node coordinate needs
/// `MAX_LEVEL + 1` bits. This keeps 3D keys within the 21 bits per axis of a
/// 64 bit Morton index.
pub const MAX_LEVEL: u8 = 20;

/// Number of logical units along each axis of the root octant.
pub const LOGICAL_LENGTH: u32 = 1 << MAX_LEVEL;

/// Number of bits reserved per axis in a 3D key.
pub const BITS_PER_AXIS_3D: u32 = 21;

/// Number of bits reserved per axis in a 2D key.
pub const BITS_PER_AXIS_2D: u32 = 32;

/// Largest number of faces an octant can have.
pub const MAX_FACES: usize = 6;

/// Largest number of edges an octant can have.
pub const MAX_EDGES: usize = 12;

/// Largest number of nodes (and children) an octant can have.
pub const MAX_NODES: usize = 8;

/// Ghost layer value of an owned octant.
pub const OWNED_LAYER: i32 = -1;
