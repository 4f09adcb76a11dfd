//! Distributed scenarios on in-process ranks.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use pierced_octree::{
    adaption::{count_kind, AdaptionKind},
    comm::{Communicator, ThreadComm},
    config::OctreeConfig,
    constants::LOGICAL_LENGTH,
    octant::Octant,
    octree::Neighbour,
    parallel_octree::{ParaTree, PartitionData},
    pierced::SyncMode,
    tools::{gather_to_all, global_any, is_sorted_array},
};

/// Run `f` on `size` ranks, each in its own thread.
fn run_on_ranks<F>(size: usize, f: F)
where
    F: Fn(ThreadComm) + Sync,
{
    let universe = ThreadComm::universe(size);
    std::thread::scope(|scope| {
        for comm in universe {
            let f = &f;
            scope.spawn(move || f(comm));
        }
    });
}

/// Whether the closed boxes of two octants intersect.
fn touching(a: &Octant, b: &Octant) -> bool {
    let (ca, cb) = (a.logical_coordinates(), b.logical_coordinates());
    let (sa, sb) = (a.logical_size(), b.logical_size());
    (0..a.dim() as usize).all(|axis| ca[axis] <= cb[axis] + sb && cb[axis] <= ca[axis] + sa)
}

/// Whether two octants share a face of positive measure.
fn face_adjacent(a: &Octant, b: &Octant) -> bool {
    let dim = a.dim() as usize;
    let (ca, cb) = (a.logical_coordinates(), b.logical_coordinates());
    let (sa, sb) = (a.logical_size(), b.logical_size());
    (0..dim).any(|axis| {
        (ca[axis] + sa == cb[axis] || cb[axis] + sb == ca[axis])
            && (0..dim)
                .filter(|&other| other != axis)
                .all(|other| ca[other] < cb[other] + sb && cb[other] < ca[other] + sa)
    })
}

/// Whether `b` lies across face `face` of `a`, sharing part of it.
fn across_face(a: &Octant, b: &Octant, face: usize) -> bool {
    let dim = a.dim() as usize;
    let axis = face / 2;
    let (ca, cb) = (a.logical_coordinates(), b.logical_coordinates());
    let (sa, sb) = (a.logical_size(), b.logical_size());
    let adjacent = if face % 2 == 1 {
        ca[axis] + sa == cb[axis]
    } else {
        cb[axis] + sb == ca[axis]
    };
    adjacent
        && (0..dim)
            .filter(|&other| other != axis)
            .all(|other| ca[other] < cb[other] + sb && cb[other] < ca[other] + sa)
}

#[test]
fn test_partition_balance_and_order() {
    run_on_ranks(4, |comm| {
        let rank = comm.rank();
        let mut para = ParaTree::uniform(OctreeConfig::new(2), 3, comm).unwrap();
        assert_eq!(para.global_num_octants(), 64);

        let changelog = para.partition(None).unwrap();
        assert!(!para.is_serial());
        assert_eq!(para.tree().len(), 16);
        assert_eq!(para.global_offset(), 16 * rank as u64);
        assert_eq!(para.global_num_octants(), 64);
        assert_eq!(changelog.len(), 1);
        assert_eq!(changelog[0].kind, AdaptionKind::Deletion);
        assert_eq!(changelog[0].previous.len(), 48);

        let keys = para
            .tree()
            .octants()
            .iter()
            .map(Octant::absolute_key)
            .collect_vec();
        assert!(is_sorted_array(&keys, para.comm()).unwrap());

        // Rank 0 gets four times the weight.
        let weights: HashMap<_, _> = para
            .tree()
            .ids()
            .into_iter()
            .map(|id| (id, if rank == 0 { 4.0 } else { 1.0 }))
            .collect();
        let changelog = para.partition(Some(&weights)).unwrap();
        if rank == 0 {
            assert_eq!(para.tree().len(), 8);
            assert_eq!(count_kind(&changelog, AdaptionKind::PartitionSend), 1);
            assert_eq!(changelog[0].rank, Some(1));
        }
        assert_eq!(para.global_num_octants(), 64);
        let keys = para
            .tree()
            .octants()
            .iter()
            .map(Octant::absolute_key)
            .collect_vec();
        assert!(is_sorted_array(&keys, para.comm()).unwrap());

        // Every octant has exactly one owner and the owners agree with the ranges.
        let all = gather_to_all(para.tree().octants(), para.comm()).unwrap();
        assert_eq!(all.len(), 64);
        assert_eq!(all.iter().unique().count(), 64);
        for octant in para.tree().octants() {
            assert_eq!(para.owner_of_key(octant.absolute_key()), Some(rank));
        }
    });
}

#[test]
fn test_ghost_layer() {
    run_on_ranks(4, |comm| {
        let rank = comm.rank();
        let mut para = ParaTree::uniform(OctreeConfig::new(2), 3, comm).unwrap();
        para.partition(None).unwrap();

        let all = gather_to_all(para.tree().octants(), para.comm()).unwrap();
        let local: HashSet<_> = para.tree().octants().iter().copied().collect();
        let expected: HashSet<_> = all
            .iter()
            .filter(|octant| !local.contains(octant))
            .filter(|octant| local.iter().any(|mine| touching(mine, octant)))
            .copied()
            .collect();
        let ghosts: HashSet<_> = para.ghosts().iter().copied().collect();
        assert_eq!(ghosts, expected);
        assert!(para.ghosts().iter().tuple_windows().all(|(a, b)| a < b));
        for (index, ghost) in para.ghosts().iter().enumerate() {
            assert!(ghost.is_ghost());
            assert_eq!(ghost.ghost_layer(), 0);
            let owner = para.ghost_owner(index).unwrap();
            assert_ne!(owner, rank);
            assert_eq!(para.owner_of_key(ghost.absolute_key()), Some(owner));
        }

        // Each rank holds one quadrant, so the process boundary runs through the middle.
        let half = LOGICAL_LENGTH / 2;
        for octant in para.tree().octants() {
            let [x, y, _] = octant.logical_coordinates();
            let size = octant.logical_size();
            assert_eq!(octant.pbound(0), x == half);
            assert_eq!(octant.pbound(1), x + size == half);
            assert_eq!(octant.pbound(2), y == half);
            assert_eq!(octant.pbound(3), y + size == half);
        }

        // Ghost values come from the owners.
        let values = para
            .exchange_ghost_values(|_| 10 * para.rank() as u32)
            .unwrap();
        for (index, value) in values.into_iter().enumerate() {
            assert_eq!(value, 10 * para.ghost_owner(index).unwrap() as u32);
        }
    });
}

#[test]
fn test_ghost_layer_of_graded_tree() {
    run_on_ranks(2, |comm| {
        let rank = comm.rank();
        let mut para = ParaTree::uniform(OctreeConfig::new(2), 1, comm).unwrap();
        // Refine the lower right child, then the lower right grandchild.
        let ids = para.tree().ids();
        para.set_marker(ids[1], 1).unwrap();
        para.adapt().unwrap();
        let ids = para.tree().ids();
        para.set_marker(ids[2], 1).unwrap();
        para.adapt().unwrap();
        assert_eq!(para.tree().len(), 10);

        let weights: HashMap<_, _> = para
            .tree()
            .ids()
            .into_iter()
            .zip([1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 4.0, 2.0, 2.0])
            .collect();
        para.partition(Some(&weights)).unwrap();
        assert_eq!(para.tree().len(), if rank == 0 { 7 } else { 3 });

        let all = gather_to_all(para.tree().octants(), para.comm()).unwrap();
        let local: HashSet<_> = para.tree().octants().iter().copied().collect();
        let remote = all
            .into_iter()
            .filter(|octant| !local.contains(octant))
            .collect_vec();
        let expected: HashSet<_> = remote
            .iter()
            .filter(|octant| local.iter().any(|mine| touching(mine, octant)))
            .copied()
            .collect();
        let ghosts: HashSet<_> = para.ghosts().iter().copied().collect();
        assert_eq!(ghosts, expected);
        assert_eq!(ghosts.len(), if rank == 0 { 3 } else { 5 });

        for (id, octant) in para.tree().iter() {
            for face in 0..4 {
                let across = remote.iter().any(|other| across_face(octant, other, face));
                assert_eq!(octant.pbound(face), across, "{octant} face {face}");
                let ghost_neighbour = para
                    .find_neighbours(id, 1, face)
                    .unwrap()
                    .into_iter()
                    .any(|neighbour| matches!(neighbour, Neighbour::Ghost(_)));
                assert_eq!(octant.pbound(face), ghost_neighbour, "{octant} face {face}");
            }
        }

        if rank == 0 {
            // The coarse corner octant sees only local octants across its +x face.
            let corner = para.tree().octants()[0];
            assert_eq!(corner.level(), 1);
            assert!(!corner.pbound(1));
            assert!(corner.pbound(3));
        }
    });
}

#[test]
fn test_two_ghost_layers() {
    run_on_ranks(2, |comm| {
        let config = OctreeConfig::new(2).with_halo_layers(2);
        let mut para = ParaTree::uniform(config, 3, comm).unwrap();
        para.partition(None).unwrap();

        let layers = para
            .ghosts()
            .iter()
            .map(Octant::ghost_layer)
            .counts();
        // The two halves meet along a line of eight octants.
        assert_eq!(layers[&0], 8);
        assert_eq!(layers[&1], 8);
    });
}

#[test]
fn test_adapt_keeps_global_balance() {
    run_on_ranks(3, |comm| {
        let mut para = ParaTree::uniform(OctreeConfig::new(2), 2, comm).unwrap();
        para.partition(None).unwrap();

        if let Some(corner) = para.tree().locate_logical_point([0, 0, 0]) {
            para.set_marker(corner, 3).unwrap();
        }
        let mut refined = 0;
        for _ in 0..3 {
            let changelog = para.adapt().unwrap();
            refined += count_kind(&changelog, AdaptionKind::Refinement);
            assert!(para.is_balanced().unwrap());
        }
        let remaining = para.tree().iter().any(|(_, octant)| octant.marker() != 0);
        assert!(!global_any(remaining, para.comm()).unwrap());

        let all = gather_to_all(para.tree().octants(), para.comm()).unwrap();
        assert_eq!(all.len() as u64, para.global_num_octants());
        assert_eq!(all.iter().map(Octant::level).max(), Some(5));
        for (a, b) in all.iter().tuple_combinations() {
            if face_adjacent(a, b) {
                assert!(a.level().abs_diff(b.level()) <= 1, "{a} and {b}");
            }
        }
        let refined = gather_to_all(&[refined as u64], para.comm()).unwrap();
        // The corner octant alone is refined once per step.
        assert!(refined.iter().sum::<u64>() >= 3);
    });
}

#[test]
fn test_data_migrates_with_octants() {
    run_on_ranks(2, |comm| {
        let rank = comm.rank();
        let mut para = ParaTree::uniform(OctreeConfig::new(2), 2, comm).unwrap();
        let storage = para
            .tree()
            .attach_storage::<f64>(SyncMode::Journaled)
            .unwrap();
        for (id, octant) in para.tree().iter() {
            storage
                .borrow_mut()
                .set(id, octant.absolute_key() as f64)
                .unwrap();
        }
        let payload: [&dyn PartitionData; 1] = [&storage];

        para.partition_with_data(None, &payload).unwrap();
        assert_eq!(para.tree().len(), 8);

        // Make rank 1 heavy so that it hands a family over to rank 0.
        let weight = if rank == 1 { 3.0 } else { 1.0 };
        let weights: HashMap<_, _> = para.tree().ids().into_iter().map(|id| (id, weight)).collect();
        let changelog = para.partition_with_data(Some(&weights), &payload).unwrap();
        let expected = if rank == 0 { 12 } else { 4 };
        assert_eq!(para.tree().len(), expected);
        if rank == 0 {
            assert_eq!(count_kind(&changelog, AdaptionKind::PartitionRecv), 1);
            assert_eq!(changelog[0].current.len(), 4);
        }

        para.tree().sync_storages();
        let storage = storage.borrow();
        for (id, octant) in para.tree().iter() {
            assert_eq!(*storage.at(id).unwrap(), octant.absolute_key() as f64);
        }
    });
}
