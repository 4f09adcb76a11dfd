//! 2:1 balance of refinement markers.

use itertools::Itertools;
use tracing::debug;

use super::{directions, LocalTree};
use crate::{constants::MAX_LEVEL, octant::Octant};

/// Level an octant reaches in the next adaption step.
fn target_level(octant: &Octant) -> i16 {
    (octant.level() as i16 + octant.marker().signum() as i16).clamp(0, MAX_LEVEL as i16)
}

impl LocalTree {
    /// Expand the markers so that the next adaption step keeps the tree 2:1 balanced.
    ///
    /// Octants with the balance flag are refined when a neighbour will end up
    /// more than one level finer. A coarsening is cancelled when it would break
    /// the balance or when not all siblings of the family are local and marked
    /// for coarsening. Ghost markers are taken as they are. Returns whether any
    /// marker changed.
    pub fn balance(&mut self, ghosts: &[Octant]) -> bool {
        let octants = self.octants().to_vec();
        let directions = directions(self.dim, self.balance_codim);
        let neighbours = octants
            .iter()
            .map(|octant| self.neighbour_indices(octant, ghosts, &directions))
            .collect_vec();

        let initial = octants.iter().map(target_level).collect_vec();
        let ghost_targets = ghosts.iter().map(target_level).collect_vec();
        let mut targets = initial.clone();
        let n_children = 1usize << self.dim;

        let mut sweeps = 0;
        loop {
            sweeps += 1;
            let mut changed = false;

            for (index, octant) in octants.iter().enumerate() {
                if !octant.balance() {
                    continue;
                }
                let (local, remote) = &neighbours[index];
                let finest = local
                    .iter()
                    .map(|&k| targets[k])
                    .chain(remote.iter().map(|&k| ghost_targets[k]))
                    .max();
                if let Some(finest) = finest {
                    if finest - 1 > targets[index] {
                        targets[index] = finest - 1;
                        changed = true;
                    }
                }
            }

            for (index, octant) in octants.iter().enumerate() {
                let level = octant.level() as i16;
                if targets[index] >= level {
                    continue;
                }
                let complete = index
                    .checked_sub(octant.child_index())
                    .filter(|first| first + n_children <= octants.len())
                    .is_some_and(|first| {
                        (0..n_children).all(|m| {
                            let sibling = &octants[first + m];
                            sibling.is_sibling_of(octant)
                                && sibling.child_index() == m
                                && targets[first + m] < level
                        })
                    });
                if !complete {
                    targets[index] = level;
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }

        let mut updated = 0;
        for (index, octant) in octants.iter().enumerate() {
            if targets[index] != initial[index] {
                let marker = targets[index] - octant.level() as i16;
                self.octants.raw_at_mut(index).set_marker(marker as i8);
                updated += 1;
            }
        }
        debug!(updated, sweeps, ghosts = ghosts.len(), "balanced markers");
        updated > 0
    }

    /// Whether no octant with the balance flag has a neighbour more than one level finer.
    pub fn is_balanced(&self, ghosts: &[Octant]) -> bool {
        let directions = directions(self.dim, self.balance_codim);
        let octants = self.octants();
        octants.iter().filter(|octant| octant.balance()).all(|octant| {
            let (local, remote) = self.neighbour_indices(octant, ghosts, &directions);
            local
                .iter()
                .map(|&k| &octants[k])
                .chain(remote.iter().map(|&k| &ghosts[k]))
                .all(|neighbour| neighbour.level() <= octant.level() + 1)
        })
    }
}

#[cfg(test)]
mod test {
    use crate::{constants::LOGICAL_LENGTH, octant::Octant, octree::LocalTree};

    #[test]
    fn test_refinement_propagates() {
        let mut tree = LocalTree::new(2).unwrap();
        tree.global_refine().unwrap();
        tree.global_refine().unwrap();
        let corner = tree.locate_logical_point([0, 0, 0]).unwrap();
        tree.set_marker(corner, 1).unwrap();
        tree.adapt(&[]).unwrap();

        // Refining a level 3 corner child needs its level 2 face neighbours refined.
        let corner = tree.locate_logical_point([0, 0, 0]).unwrap();
        tree.set_marker(corner, 1).unwrap();
        assert!(!tree.balance(&[]));
        assert_eq!(tree.marker(corner).unwrap(), 1);
        let quarter = LOGICAL_LENGTH / 4;
        let right = tree.locate_logical_point([quarter, 0, 0]).unwrap();
        let above = tree.locate_logical_point([0, quarter, 0]).unwrap();
        let diagonal = tree.locate_logical_point([quarter, quarter, 0]).unwrap();
        assert_eq!(tree.marker(right).unwrap(), 0);
        assert_eq!(tree.marker(diagonal).unwrap(), 0);

        let sibling = tree.locate_logical_point([LOGICAL_LENGTH / 8, 0, 0]).unwrap();
        tree.set_marker(sibling, 1).unwrap();
        assert!(tree.balance(&[]));
        assert_eq!(tree.marker(right).unwrap(), 1);
        assert_eq!(tree.marker(above).unwrap(), 0);
        assert_eq!(tree.marker(diagonal).unwrap(), 0);

        // Node balance also pulls in the diagonal neighbour.
        tree.set_balance_codim(2).unwrap();
        let child = tree.locate_logical_point([3 * LOGICAL_LENGTH / 16, 3 * LOGICAL_LENGTH / 16, 0]);
        tree.set_marker(child.unwrap(), 1).unwrap();
        assert!(tree.balance(&[]));
        assert_eq!(tree.marker(diagonal).unwrap(), 1);
        assert!(!tree.balance(&[]));
    }

    #[test]
    fn test_ghosts_pull_refinement() {
        let mut full = LocalTree::new(2).unwrap();
        full.global_refine().unwrap();
        full.global_refine().unwrap();
        let half = LOGICAL_LENGTH / 2;
        let (local, mut ghosts): (Vec<Octant>, Vec<Octant>) = full
            .octants()
            .iter()
            .copied()
            .partition(|octant| octant.logical_coordinates()[0] < half);
        let mut tree = LocalTree::from_octants(2, local).unwrap();

        // A remote octant next to the local one at (quarter, 0) goes two levels down.
        let quarter = LOGICAL_LENGTH / 4;
        let remote = ghosts
            .iter()
            .position(|octant| octant.logical_coordinates() == [half, 0, 0])
            .unwrap();
        let children = ghosts[remote].build_children().unwrap();
        ghosts.splice(remote..remote + 1, children);
        let ghost = ghosts
            .iter_mut()
            .find(|octant| octant.logical_coordinates() == [half, 0, 0])
            .unwrap();
        ghost.set_marker(1);

        assert!(tree.is_balanced(&ghosts));
        assert!(tree.balance(&ghosts));
        let neighbour = tree.locate_logical_point([quarter, 0, 0]).unwrap();
        assert_eq!(tree.marker(neighbour).unwrap(), 1);
        tree.adapt(&ghosts).unwrap();
        assert_eq!(tree.len(), 8 - 1 + 4);
        assert!(tree.is_balanced(&ghosts));
    }
}
