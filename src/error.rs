//! Error types.

use crate::constants::MAX_LEVEL;

/// Errors raised by the pierced containers and their synchronization.
#[derive(Debug, thiserror::Error)]
pub enum PiercedError {
    /// The id is stored already.
    #[error("id {0} is already stored in the kernel")]
    DuplicateId(String),

    /// The id is not stored.
    #[error("id {0} is not stored in the kernel")]
    NotFound(String),

    /// The slave is registered already.
    #[error("slave is already registered with the kernel")]
    AlreadyRegistered,

    /// The storage no longer follows a kernel.
    #[error("storage is not attached to a kernel")]
    Detached,

    /// A reorder does not list every live slot exactly once.
    #[error("invalid reorder: {0}")]
    InvalidOrder(String),

    /// A journal could not be decoded.
    #[error("corrupt sync journal: {0}")]
    CorruptJournal(String),

    /// Reading or writing a journal failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised while exchanging data between ranks.
#[derive(Debug, thiserror::Error)]
pub enum CommError {
    /// A peer went away.
    #[error("rank {0} is no longer reachable")]
    Disconnected(usize),

    /// An exchange got the wrong number of buffers.
    #[error("exchange needs {expected} buffers, got {found}")]
    SizeMismatch {
        /// Number of ranks.
        expected: usize,
        /// Number of buffers passed in.
        found: usize,
    },

    /// The ranks disagree about shared state.
    #[error("inconsistent distributed state: {0}")]
    Inconsistent(String),

    /// The transport failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by octants, local and distributed octrees.
#[derive(Debug, thiserror::Error)]
pub enum OctreeError {
    /// Only 2D and 3D trees exist.
    #[error("dimension {0} is not supported, expected 2 or 3")]
    InvalidDimension(u8),

    /// The level is deeper than [MAX_LEVEL].
    #[error("level {0} exceeds the maximum level {MAX_LEVEL}")]
    LevelOutOfRange(u8),

    /// The coordinates do not describe an octant of the level.
    #[error("coordinates {coords:?} are not valid for an octant on level {level}")]
    InvalidCoordinates {
        /// Logical coordinates that were passed in.
        coords: [u32; 3],
        /// Requested level.
        level: u8,
    },

    /// Octants on the deepest level have no children.
    #[error("octant on the maximum level cannot be refined")]
    MaxLevelReached,

    /// The root has no father.
    #[error("the root octant has no father")]
    RootHasNoFather,

    /// The id does not belong to the tree.
    #[error("octant {0} is not owned by this tree")]
    UnknownOctant(u64),

    /// The octant has no face, edge or node with this index.
    #[error("an octant has no element {index} of codimension {codim}")]
    InvalidEntity {
        /// Requested codimension.
        codim: u8,
        /// Requested index.
        index: usize,
    },

    /// A parameter is not admissible.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A binary stream could not be decoded.
    #[error("invalid octant stream: {0}")]
    InvalidStream(String),

    /// Error of the underlying containers.
    #[error(transparent)]
    Pierced(#[from] PiercedError),

    /// Error of the communication layer.
    #[error(transparent)]
    Comm(#[from] CommError),

    /// Reading or writing failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type of octree operations.
pub type OctreeResult<T> = Result<T, OctreeError>;
