//! Records of how octants changed during adaption and partitioning.

use crate::octree::OctantId;

/// What happened to a group of octants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AdaptionKind {
    /// An octant was replaced by its children.
    Refinement,
    /// A family of siblings was replaced by their father.
    Coarsening,
    /// Octants were removed.
    Deletion,
    /// Octants were sent to another rank.
    PartitionSend,
    /// Octants were received from another rank.
    PartitionRecv,
}

/// One entry of the changelog returned by adaption and partitioning.
///
/// `previous` lists the ids before the change, `current` the ids after it.
/// Ids of octants that left the rank are no longer valid and received
/// octants get fresh ids.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdaptionInfo {
    /// Kind of change.
    pub kind: AdaptionKind,
    /// Rank on the other side of a partition exchange.
    pub rank: Option<usize>,
    /// Ids before the change.
    pub previous: Vec<OctantId>,
    /// Ids after the change.
    pub current: Vec<OctantId>,
}

impl AdaptionInfo {
    /// A local change.
    pub fn new(kind: AdaptionKind, previous: Vec<OctantId>, current: Vec<OctantId>) -> Self {
        Self {
            kind,
            rank: None,
            previous,
            current,
        }
    }

    /// A change that involves another rank.
    pub fn with_rank(
        kind: AdaptionKind,
        rank: usize,
        previous: Vec<OctantId>,
        current: Vec<OctantId>,
    ) -> Self {
        Self {
            kind,
            rank: Some(rank),
            previous,
            current,
        }
    }
}

/// Count the entries of a changelog with the given kind.
pub fn count_kind(changelog: &[AdaptionInfo], kind: AdaptionKind) -> usize {
    changelog.iter().filter(|info| info.kind == kind).count()
}
