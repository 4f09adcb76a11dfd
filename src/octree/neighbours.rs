//! Neighbour search on sorted linear trees.

use itertools::Itertools;

use super::{LocalTree, OctantId};
use crate::{
    error::{OctreeError, OctreeResult},
    octant::Octant,
    topology::TreeConstants,
};

/// An octant adjacent to another one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Neighbour {
    /// An octant of the local tree.
    Local(OctantId),
    /// The ghost at this index.
    Ghost(usize),
}

/// Push the indices of the octants in `sorted` that touch `octant` in direction `delta`.
///
/// `sorted` must be a linear tree in Morton order, i.e. without overlapping
/// octants. The neighbours are found around the box of the same size as
/// `octant` displaced by `delta`: either one octant covers the box (same size
/// or coarser) or the box holds finer octants, of which only those touching
/// `octant` are kept. Boxes outside the domain have no neighbours.
pub(crate) fn search_sorted(
    sorted: &[Octant],
    octant: &Octant,
    delta: [i8; 3],
    found: &mut Vec<usize>,
) {
    let Some(target) = octant.displaced(delta) else {
        return;
    };

    let pos = sorted.partition_point(|candidate| *candidate <= target);
    if pos > 0 && sorted[pos - 1].contains(&target) {
        found.push(pos - 1);
        return;
    }

    let last = target.last_descendant_key();
    for (index, candidate) in sorted.iter().enumerate().skip(pos) {
        if candidate.absolute_key() > last {
            break;
        }
        if target.is_ancestor_of(candidate) && octant.touches(candidate, delta) {
            found.push(index);
        }
    }
}

/// All directions of the elements of codimension `1..=max_codim`.
pub(crate) fn directions(dim: u8, max_codim: u8) -> Vec<[i8; 3]> {
    let constants = TreeConstants::of(dim);
    (1..=max_codim)
        .flat_map(|codim| {
            (0..constants.n_of_codim(codim)).map(move |index| constants.coefficients(codim, index))
        })
        .collect()
}

impl LocalTree {
    /// Neighbours of octant `id` across its element `index` of codimension `codim`.
    ///
    /// Codimension 1 are faces, `dim` are nodes and 2 are edges in 3D. Ghost
    /// neighbours are reported by their index in `ghosts`, which must be sorted.
    pub fn find_neighbours(
        &self,
        id: OctantId,
        codim: u8,
        index: usize,
        ghosts: &[Octant],
    ) -> OctreeResult<Vec<Neighbour>> {
        let octant = *self.octant(id).ok_or(OctreeError::UnknownOctant(id))?;
        let constants = TreeConstants::of(self.dim);
        if codim == 0 || codim > self.dim || index >= constants.n_of_codim(codim) {
            return Err(OctreeError::InvalidEntity { codim, index });
        }
        let delta = constants.coefficients(codim, index);

        let mut local = Vec::new();
        search_sorted(self.octants(), &octant, delta, &mut local);
        let mut remote = Vec::new();
        search_sorted(ghosts, &octant, delta, &mut remote);

        let mut neighbours = local
            .into_iter()
            .filter_map(|slot| self.id_at(slot).map(Neighbour::Local))
            .collect_vec();
        neighbours.extend(remote.into_iter().map(Neighbour::Ghost));
        Ok(neighbours)
    }

    /// Local and ghost indices of all neighbours up to codimension `max_codim`.
    pub(crate) fn neighbour_indices(
        &self,
        octant: &Octant,
        ghosts: &[Octant],
        directions: &[[i8; 3]],
    ) -> (Vec<usize>, Vec<usize>) {
        let mut local = Vec::new();
        let mut remote = Vec::new();
        for &delta in directions {
            search_sorted(self.octants(), octant, delta, &mut local);
            search_sorted(ghosts, octant, delta, &mut remote);
        }
        local.sort_unstable();
        local.dedup();
        remote.sort_unstable();
        remote.dedup();
        (local, remote)
    }
}
