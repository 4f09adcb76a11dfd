//! Load balancing of a distributed tree.

use std::collections::HashMap;

use itertools::Itertools;
use tracing::debug;

use super::ParaTree;
use crate::{
    adaption::{AdaptionInfo, AdaptionKind},
    comm::Communicator,
    constants::OWNED_LAYER,
    error::{OctreeError, OctreeResult},
    octant::Octant,
    octree::OctantId,
    pierced::SharedStorage,
    stream::{from_bytes, to_bytes, BinaryValue},
    tools::{all_to_all, global_all, global_inclusive_cumsum, global_sum, sort_to_bins},
};

/// User data that moves with the octants during a partition.
pub trait PartitionData {
    /// Serialize the values of the given octants, in order.
    fn gather(&self, ids: &[OctantId]) -> OctreeResult<Vec<u8>>;

    /// Store the values of newly received octants, in order.
    fn scatter(&self, ids: &[OctantId], bytes: &[u8]) -> OctreeResult<()>;
}

impl<V: BinaryValue + Default + Clone + 'static> PartitionData for SharedStorage<V, OctantId> {
    fn gather(&self, ids: &[OctantId]) -> OctreeResult<Vec<u8>> {
        let kernel = self.borrow().kernel().cloned();
        if let Some(kernel) = kernel {
            kernel.borrow_mut().sync();
        }
        let storage = self.borrow();
        let values = ids
            .iter()
            .map(|&id| storage.at(id).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(to_bytes(&values))
    }

    fn scatter(&self, ids: &[OctantId], bytes: &[u8]) -> OctreeResult<()> {
        let values = from_bytes::<V>(bytes)?;
        if values.len() != ids.len() {
            return Err(OctreeError::InvalidStream(format!(
                "{} values for {} octants",
                values.len(),
                ids.len()
            )));
        }
        let kernel = self.borrow().kernel().cloned();
        if let Some(kernel) = kernel {
            kernel.borrow_mut().sync();
        }
        let mut storage = self.borrow_mut();
        for (&id, value) in ids.iter().zip(values) {
            storage.set(id, value)?;
        }
        Ok(())
    }
}

/// Destination rank of every octant for an even split of the weights.
///
/// An octant goes to the rank whose share of the total weight contains the
/// midpoint of the octant's weight interval.
fn destinations(prefix: &[f64], weights: &[f64], total: f64, size: usize) -> Vec<usize> {
    let midpoints = prefix
        .iter()
        .zip(weights)
        .map(|(&end, &weight)| end - 0.5 * weight)
        .collect_vec();
    let bins = (0..size)
        .map(|r| total * r as f64 / size as f64)
        .collect_vec();
    sort_to_bins(&midpoints, &bins)
        .into_iter()
        .enumerate()
        .flat_map(|(rank, count)| std::iter::repeat(rank).take(count))
        .collect()
}

/// Send complete local families of siblings to the rank of their first member.
fn keep_families_together(octants: &[Octant], destinations: &mut [usize]) {
    let mut index = 0;
    while index < octants.len() {
        let first = &octants[index];
        let n_children = first.count_children();
        let complete = first.level() > 0
            && first.child_index() == 0
            && index + n_children <= octants.len()
            && (1..n_children).all(|m| {
                let sibling = &octants[index + m];
                sibling.is_sibling_of(first) && sibling.child_index() == m
            });
        if complete {
            let rank = destinations[index];
            destinations[index..index + n_children].fill(rank);
            index += n_children;
        } else {
            index += 1;
        }
    }
}

impl<C: Communicator> ParaTree<C> {
    /// Redistribute the octants so that every rank carries the same weight. Collective.
    ///
    /// Octants without an entry in `weights` weigh 1. The global Morton order
    /// is kept and complete families of siblings on one rank are not split.
    /// In serial mode every rank drops the octants of the other ranks.
    pub fn partition(
        &mut self,
        weights: Option<&HashMap<OctantId, f64>>,
    ) -> OctreeResult<Vec<AdaptionInfo>> {
        self.partition_with_data(weights, &[])
    }

    /// Partition and move the values of `payload` along with their octants. Collective.
    pub fn partition_with_data(
        &mut self,
        weights: Option<&HashMap<OctantId, f64>>,
        payload: &[&dyn PartitionData],
    ) -> OctreeResult<Vec<AdaptionInfo>> {
        let size = self.size();
        let rank = self.rank();
        let ids = self.tree.ids();
        let octants = self.tree.octants().to_vec();

        let mut local_weights = ids
            .iter()
            .map(|id| weights.and_then(|w| w.get(id)).copied().unwrap_or(1.0))
            .collect_vec();
        let valid = local_weights.iter().all(|w| w.is_finite() && *w >= 0.0);
        if !global_all(valid, &self.comm)? {
            return Err(OctreeError::InvalidConfig(
                "partition weights must be finite and non negative".to_string(),
            ));
        }

        let (mut prefix, mut total) = self.weight_prefix(&local_weights)?;
        if total <= 0.0 {
            local_weights.fill(1.0);
            (prefix, total) = self.weight_prefix(&local_weights)?;
        }
        let mut destinations = destinations(&prefix, &local_weights, total, size);
        keep_families_together(&octants, &mut destinations);

        let mut changelog = Vec::new();
        if self.serial {
            let dropped = ids
                .iter()
                .zip(&destinations)
                .filter(|(_, &destination)| destination != rank)
                .map(|(&id, _)| id)
                .collect_vec();
            for &id in &dropped {
                self.tree.erase(id)?;
            }
            self.tree.sort()?;
            if !dropped.is_empty() {
                changelog.push(AdaptionInfo::new(AdaptionKind::Deletion, dropped, Vec::new()));
            }
            self.serial = false;
        } else {
            let mut send_ids = vec![Vec::new(); size];
            let mut send_octants = vec![Vec::new(); size];
            for ((&id, octant), &destination) in ids.iter().zip(&octants).zip(&destinations) {
                if destination != rank {
                    send_ids[destination].push(id);
                    send_octants[destination].push(*octant);
                }
            }

            let payload_bytes = payload
                .iter()
                .map(|data| -> OctreeResult<Vec<Vec<u8>>> {
                    let buffers = send_ids
                        .iter()
                        .map(|ids| data.gather(ids))
                        .collect::<OctreeResult<Vec<_>>>()?;
                    Ok(self.comm.all_to_all_bytes(buffers)?)
                })
                .collect::<OctreeResult<Vec<_>>>()?;
            let parts = send_octants.iter().map(Vec::as_slice).collect_vec();
            let received = all_to_all(&parts, &self.comm)?;

            for (r, sent) in send_ids.into_iter().enumerate() {
                for &id in &sent {
                    self.tree.erase(id)?;
                }
                if !sent.is_empty() {
                    changelog.push(AdaptionInfo::with_rank(
                        AdaptionKind::PartitionSend,
                        r,
                        sent,
                        Vec::new(),
                    ));
                }
            }

            let mut recv_ids = Vec::with_capacity(size);
            for (r, incoming) in received.into_iter().enumerate() {
                let new_ids = incoming
                    .into_iter()
                    .map(|mut octant| {
                        octant.set_ghost_layer(OWNED_LAYER);
                        self.tree.insert_octant(octant)
                    })
                    .collect::<OctreeResult<Vec<_>>>()?;
                if !new_ids.is_empty() {
                    changelog.push(AdaptionInfo::with_rank(
                        AdaptionKind::PartitionRecv,
                        r,
                        Vec::new(),
                        new_ids.clone(),
                    ));
                }
                recv_ids.push(new_ids);
            }
            self.tree.sort()?;

            for (data, buffers) in payload.iter().zip(&payload_bytes) {
                for (ids, bytes) in recv_ids.iter().zip(buffers) {
                    data.scatter(ids, bytes)?;
                }
            }
        }

        self.refresh_partition_info()?;
        self.update_ghosts()?;
        debug!(
            rank,
            octants = self.tree.len(),
            global = self.global_num_octants,
            "partitioned tree"
        );
        Ok(changelog)
    }

    /// Inclusive prefix sums of the weights in global order, and the total weight.
    fn weight_prefix(&self, weights: &[f64]) -> OctreeResult<(Vec<f64>, f64)> {
        if self.serial {
            let prefix = weights
                .iter()
                .scan(0.0, |acc, &w| {
                    *acc += w;
                    Some(*acc)
                })
                .collect_vec();
            let total = prefix.last().copied().unwrap_or(0.0);
            return Ok((prefix, total));
        }
        let prefix = global_inclusive_cumsum(weights, &self.comm)?;
        let total = global_sum(weights.iter().sum::<f64>(), &self.comm)?;
        Ok((prefix, total))
    }
}
