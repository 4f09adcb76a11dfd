//! Distributed octree.
//!
//! Every rank owns a contiguous range of the global Morton order in a
//! [LocalTree] and keeps copies of the adjacent octants of other ranks as
//! ghosts. The tree starts in serial mode, where all ranks hold the same
//! octants, and becomes distributed with the first partition.
mod ghosts;
mod partition;

use itertools::Itertools;
use tracing::debug;

pub use partition::PartitionData;

use crate::{
    adaption::AdaptionInfo,
    comm::Communicator,
    config::OctreeConfig,
    constants::MAX_LEVEL,
    error::{OctreeError, OctreeResult},
    geometry::Mapping,
    morton::encode,
    octant::Octant,
    octree::{LocalTree, Neighbour, OctantId},
    tools::{gather_to_all, global_all, global_any},
};

/// An octree distributed over the ranks of a communicator.
pub struct ParaTree<C: Communicator> {
    comm: C,
    config: OctreeConfig,
    mapping: Mapping,
    tree: LocalTree,
    ghosts: Vec<Octant>,
    ghost_owners: Vec<usize>,
    /// Per rank, the local octants sent to it as ghosts.
    ghost_send: Vec<Vec<OctantId>>,
    /// Per rank, the indices of the ghosts it sent.
    ghost_recv: Vec<Vec<usize>>,
    /// Per rank, the first and last deepest key of its range, `None` for empty ranks.
    partition_ranges: Vec<Option<(u64, u64)>>,
    global_num_octants: u64,
    global_offset: u64,
    serial: bool,
}

impl<C: Communicator> ParaTree<C> {
    /// A tree holding the root octant on every rank.
    pub fn new(config: OctreeConfig, comm: C) -> OctreeResult<Self> {
        config.validate()?;
        let tree = LocalTree::new(config.dim)?;
        Self::from_local_tree(config, tree, comm)
    }

    /// A uniform tree of the given level, replicated on every rank.
    pub fn uniform(config: OctreeConfig, level: u8, comm: C) -> OctreeResult<Self> {
        config.validate()?;
        if level > MAX_LEVEL {
            return Err(OctreeError::LevelOutOfRange(level));
        }
        let n_octants = 1u64 << (config.dim as u32 * level as u32);
        let octants = (0..n_octants)
            .map(|key| Octant::from_key(config.dim, level, key))
            .collect_vec();
        let tree = LocalTree::from_octants(config.dim, octants)?;
        Self::from_local_tree(config, tree, comm)
    }

    fn from_local_tree(config: OctreeConfig, mut tree: LocalTree, comm: C) -> OctreeResult<Self> {
        tree.set_balance_codim(config.balance_codim)?;
        let size = comm.size();
        let mut para = Self {
            mapping: config.mapping(),
            config,
            tree,
            ghosts: Vec::new(),
            ghost_owners: Vec::new(),
            ghost_send: vec![Vec::new(); size],
            ghost_recv: vec![Vec::new(); size],
            partition_ranges: vec![None; size],
            global_num_octants: 0,
            global_offset: 0,
            serial: true,
            comm,
        };
        para.refresh_partition_info()?;
        Ok(para)
    }

    /// The communicator.
    pub fn comm(&self) -> &C {
        &self.comm
    }

    /// Rank of this process.
    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    /// Number of ranks.
    pub fn size(&self) -> usize {
        self.comm.size()
    }

    /// The configuration.
    pub fn config(&self) -> &OctreeConfig {
        &self.config
    }

    /// Mapping to the physical domain.
    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// The octants of this rank.
    pub fn tree(&self) -> &LocalTree {
        &self.tree
    }

    /// Whether every rank still holds the whole tree.
    pub fn is_serial(&self) -> bool {
        self.serial
    }

    /// Number of octants over all ranks.
    pub fn global_num_octants(&self) -> u64 {
        self.global_num_octants
    }

    /// Global index of the first local octant.
    pub fn global_offset(&self) -> u64 {
        self.global_offset
    }

    /// Global index of a local octant in Morton order.
    pub fn global_index(&self, id: OctantId) -> Option<u64> {
        self.tree
            .index_of(id)
            .map(|index| self.global_offset + index as u64)
    }

    /// The ghost octants in Morton order.
    pub fn ghosts(&self) -> &[Octant] {
        &self.ghosts
    }

    /// Rank owning the ghost with the given index.
    pub fn ghost_owner(&self, index: usize) -> Option<usize> {
        self.ghost_owners.get(index).copied()
    }

    /// Rank owning the deepest octant with the given key.
    pub fn owner_of_key(&self, key: u64) -> Option<usize> {
        if self.serial {
            return Some(self.rank());
        }
        self.partition_ranges
            .iter()
            .position(|range| matches!(range, Some((first, last)) if *first <= key && key <= *last))
    }

    /// Rank owning a point of the physical domain.
    pub fn point_owner(&self, point: [f64; 3]) -> Option<usize> {
        let logical = self.mapping.locate(point)?;
        self.owner_of_key(encode(self.config.dim, logical))
    }

    /// Set the refinement marker of a local octant.
    pub fn set_marker(&mut self, id: OctantId, marker: i8) -> OctreeResult<()> {
        self.tree.set_marker(id, marker)
    }

    /// Set the same marker on every local octant.
    pub fn mark_all(&mut self, marker: i8) {
        self.tree.mark_all(marker);
    }

    /// Enable or disable the 2:1 balance of a local octant.
    pub fn set_balance(&mut self, id: OctantId, balance: bool) -> OctreeResult<()> {
        self.tree.set_balance(id, balance)
    }

    /// Neighbours of a local octant, ghosts included.
    pub fn find_neighbours(
        &self,
        id: OctantId,
        codim: u8,
        index: usize,
    ) -> OctreeResult<Vec<Neighbour>> {
        self.tree.find_neighbours(id, codim, index, &self.ghosts)
    }

    /// Whether the tree is 2:1 balanced on all ranks.
    pub fn is_balanced(&self) -> OctreeResult<bool> {
        if self.serial {
            return Ok(self.tree.is_balanced(&[]));
        }
        global_all(self.tree.is_balanced(&self.ghosts), &self.comm)
    }

    /// Balance the markers over all ranks and apply one adaption step.
    ///
    /// Ghost markers are exchanged and the local markers balanced until no
    /// rank changes a marker anymore. Collective.
    pub fn adapt(&mut self) -> OctreeResult<Vec<AdaptionInfo>> {
        let changelog = if self.serial {
            self.tree.adapt(&[])?
        } else {
            let mut rounds = 0;
            loop {
                rounds += 1;
                self.exchange_ghost_markers()?;
                let changed = self.tree.balance(&self.ghosts);
                if !global_any(changed, &self.comm)? {
                    break;
                }
            }
            debug!(rounds, rank = self.rank(), "distributed balance converged");
            self.tree.apply()?
        };

        self.refresh_partition_info()?;
        self.update_ghosts()?;
        Ok(changelog)
    }

    /// Refine every octant once. Collective.
    pub fn global_refine(&mut self) -> OctreeResult<Vec<AdaptionInfo>> {
        self.mark_all(1);
        self.adapt()
    }

    fn exchange_ghost_markers(&mut self) -> OctreeResult<()> {
        let tree = &self.tree;
        let markers = self.try_exchange_ghost_values(|id| tree.marker(id))?;
        for (ghost, marker) in self.ghosts.iter_mut().zip(markers) {
            ghost.set_marker(marker);
        }
        Ok(())
    }

    /// Refresh the octant counts and the key ranges of all ranks.
    fn refresh_partition_info(&mut self) -> OctreeResult<()> {
        let local = self.tree.len() as u64;
        if self.serial {
            self.global_num_octants = local;
            self.global_offset = 0;
            return Ok(());
        }

        let info = match (self.tree.first_descendant_key(), self.tree.last_descendant_key()) {
            (Some(first), Some(last)) => [local, 1, first, last],
            _ => [local, 0, 0, 0],
        };
        let all = gather_to_all(&info, &self.comm)?;
        let rank = self.rank();

        self.global_num_octants = 0;
        self.global_offset = 0;
        self.partition_ranges.clear();
        for (r, chunk) in all.chunks_exact(4).enumerate() {
            if r < rank {
                self.global_offset += chunk[0];
            }
            self.global_num_octants += chunk[0];
            self.partition_ranges
                .push((chunk[1] == 1).then_some((chunk[2], chunk[3])));
        }
        Ok(())
    }
}
