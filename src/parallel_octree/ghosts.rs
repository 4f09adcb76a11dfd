//! Ghost layer of a distributed tree.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use tracing::debug;

use super::ParaTree;
use crate::{
    comm::Communicator,
    error::{CommError, OctreeResult},
    octant::Octant,
    octree::{directions, search_sorted, OctantId},
    stream::BinaryValue,
    tools::{all_to_all, global_all},
};

/// Whether an octant of `sorted` touches `octant` in one of the `directions`.
fn touches_any(sorted: &[Octant], octant: &Octant, directions: &[[i8; 3]]) -> bool {
    let mut found = Vec::new();
    directions.iter().any(|&delta| {
        search_sorted(sorted, octant, delta, &mut found);
        !found.is_empty()
    })
}

impl<C: Communicator> ParaTree<C> {
    /// Rebuild the ghost layer and the process boundary flags. Collective.
    ///
    /// Layer 0 holds the octants of other ranks that touch a local octant by
    /// a face, an edge or a node. Every further layer up to `halo_layers - 1`
    /// adds the neighbours of the previous one on the owning rank. A face is
    /// a process boundary when a ghost lies across it.
    pub fn update_ghosts(&mut self) -> OctreeResult<()> {
        let size = self.size();
        let rank = self.rank();
        for octant in self.tree.octants_mut() {
            octant.clear_pbound();
        }
        if self.serial || size == 1 {
            self.ghosts.clear();
            self.ghost_owners.clear();
            self.ghost_send = vec![Vec::new(); size];
            self.ghost_recv = vec![Vec::new(); size];
            return Ok(());
        }

        let dim = self.config.dim;
        let all_directions = directions(dim, dim);
        let octants = self.tree.octants().to_vec();

        // Candidates: octants whose neighbourhood reaches into the key range of another rank.
        let mut candidates = vec![BTreeSet::new(); size];
        for (index, octant) in octants.iter().enumerate() {
            for &delta in &all_directions {
                let Some(target) = octant.displaced(delta) else {
                    continue;
                };
                let (first, last) = (target.absolute_key(), target.last_descendant_key());
                for (r, range) in self.partition_ranges.iter().enumerate() {
                    let Some((begin, end)) = *range else {
                        continue;
                    };
                    if r != rank && begin <= last && first <= end {
                        candidates[r].insert(index);
                    }
                }
            }
        }
        let candidates = candidates
            .into_iter()
            .map(|indices| indices.into_iter().collect_vec())
            .collect_vec();

        // The receiver keeps the candidates that touch one of its octants.
        let offered = candidates
            .iter()
            .map(|indices| indices.iter().map(|&index| octants[index]).collect_vec())
            .collect_vec();
        let parts = offered.iter().map(Vec::as_slice).collect_vec();
        let received = all_to_all(&parts, &self.comm)?;
        let replies = received
            .iter()
            .map(|incoming| {
                incoming
                    .iter()
                    .map(|candidate| touches_any(&octants, candidate, &all_directions) as u8)
                    .collect_vec()
            })
            .collect_vec();
        let parts = replies.iter().map(Vec::as_slice).collect_vec();
        let accepted = all_to_all(&parts, &self.comm)?;

        // Per rank, local index to layer.
        let mut layers: Vec<BTreeMap<usize, i32>> = vec![BTreeMap::new(); size];
        for (r, (indices, flags)) in candidates.iter().zip(&accepted).enumerate() {
            if indices.len() != flags.len() {
                return Err(CommError::Inconsistent(format!(
                    "rank {r} answered {} of {} ghost candidates",
                    flags.len(),
                    indices.len()
                ))
                .into());
            }
            for (&index, &flag) in indices.iter().zip(flags) {
                if flag == 1 {
                    layers[r].insert(index, 0);
                }
            }
        }

        for layer in 1..self.config.halo_layers as i32 {
            for sent in layers.iter_mut() {
                let frontier = sent
                    .iter()
                    .filter(|(_, &l)| l == layer - 1)
                    .map(|(&index, _)| index)
                    .collect_vec();
                for index in frontier {
                    let mut found = Vec::new();
                    for &delta in &all_directions {
                        search_sorted(&octants, &octants[index], delta, &mut found);
                    }
                    for neighbour in found {
                        sent.entry(neighbour).or_insert(layer);
                    }
                }
            }
        }

        let send_octants = layers
            .iter()
            .map(|sent| {
                sent.iter()
                    .map(|(&index, &layer)| {
                        let mut ghost = octants[index];
                        ghost.set_ghost_layer(layer);
                        ghost
                    })
                    .collect_vec()
            })
            .collect_vec();
        let parts = send_octants.iter().map(Vec::as_slice).collect_vec();
        let received = all_to_all(&parts, &self.comm)?;

        let ids = self.tree.ids();
        self.ghost_send = layers
            .iter()
            .map(|sent| sent.keys().map(|&index| ids[index]).collect())
            .collect();
        self.ghosts.clear();
        self.ghost_owners.clear();
        self.ghost_recv = vec![Vec::new(); size];
        // Ranks own consecutive ranges, so the concatenation is sorted.
        for (owner, ghosts) in received.into_iter().enumerate() {
            for ghost in ghosts {
                self.ghost_recv[owner].push(self.ghosts.len());
                self.ghosts.push(ghost);
                self.ghost_owners.push(owner);
            }
        }

        let faces = &all_directions[..2 * dim as usize];
        let ghosts = &self.ghosts;
        for octant in self.tree.octants_mut() {
            for (face, &delta) in faces.iter().enumerate() {
                if touches_any(ghosts, octant, &[delta]) {
                    octant.set_pbound(face, true);
                }
            }
        }

        debug!(
            rank,
            ghosts = self.ghosts.len(),
            sent = self.ghost_send.iter().map(Vec::len).sum::<usize>(),
            "updated ghost layer"
        );
        Ok(())
    }

    /// Send a value for each local octant in the ghost layer of other ranks
    /// and return the values of the ghosts, in ghost order. Collective.
    pub fn exchange_ghost_values<V, F>(&self, value_of: F) -> OctreeResult<Vec<V>>
    where
        V: BinaryValue + Default + Clone,
        F: Fn(OctantId) -> V,
    {
        self.try_exchange_ghost_values(|id| Ok(value_of(id)))
    }

    /// Like [ParaTree::exchange_ghost_values], for values that may fail to
    /// be produced. Collective.
    ///
    /// The exchange only happens if every rank produced all its values. A
    /// rank that failed returns its own error, the others get
    /// [CommError::Inconsistent].
    pub fn try_exchange_ghost_values<V, F>(&self, value_of: F) -> OctreeResult<Vec<V>>
    where
        V: BinaryValue + Default + Clone,
        F: Fn(OctantId) -> OctreeResult<V>,
    {
        let send = self
            .ghost_send
            .iter()
            .map(|ids| ids.iter().map(|&id| value_of(id)).collect::<OctreeResult<Vec<_>>>())
            .collect::<OctreeResult<Vec<_>>>();
        if !global_all(send.is_ok(), &self.comm)? {
            return Err(match send {
                Err(err) => err,
                Ok(_) => CommError::Inconsistent(
                    "another rank failed to provide its ghost values".to_string(),
                )
                .into(),
            });
        }
        let send = send?;
        let parts = send.iter().map(Vec::as_slice).collect_vec();
        let received = all_to_all(&parts, &self.comm)?;

        let mut values = vec![V::default(); self.ghosts.len()];
        for (owner, values_of_owner) in received.into_iter().enumerate() {
            let indices = self.ghost_recv.get(owner).map(Vec::as_slice).unwrap_or_default();
            if indices.len() != values_of_owner.len() {
                return Err(CommError::Inconsistent(format!(
                    "rank {owner} sent {} ghost values, expected {}",
                    values_of_owner.len(),
                    indices.len()
                ))
                .into());
            }
            for (&index, value) in indices.iter().zip(values_of_owner) {
                values[index] = value;
            }
        }
        Ok(values)
    }
}
