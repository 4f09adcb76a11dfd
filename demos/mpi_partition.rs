//! Partition a refined 3D tree across MPI ranks.

use pierced_octree::{
    comm::MpiComm,
    config::OctreeConfig,
    parallel_octree::ParaTree,
    tools::{global_max, global_sum},
};

pub fn main() {
    // Initialise MPI
    let universe = mpi::initialize().unwrap();

    // Wrap the world communicator
    let comm = MpiComm::new(universe.world());

    let mut para = ParaTree::uniform(OctreeConfig::new(3), 3, comm).unwrap();
    para.partition(None).unwrap();

    // Refine the octants in the lower corner of the domain.
    let corner = para
        .tree()
        .iter()
        .filter(|(_, octant)| octant.logical_coordinates().iter().all(|&c| c == 0))
        .map(|(id, _)| id)
        .collect::<Vec<_>>();
    for id in corner {
        para.set_marker(id, 3).unwrap();
    }
    for _ in 0..3 {
        para.adapt().unwrap();
    }
    para.partition(None).unwrap();
    assert!(para.is_balanced().unwrap());

    let local = para.tree().len() as u64;
    let largest = global_max(local, para.comm()).unwrap();
    let ghosts = global_sum(para.ghosts().len() as u64, para.comm()).unwrap();

    if para.rank() == 0 {
        println!(
            "{} octants on {} ranks, at most {largest} per rank, {ghosts} ghosts.",
            para.global_num_octants(),
            para.size()
        );
    }
}
