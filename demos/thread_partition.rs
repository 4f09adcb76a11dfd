//! Partition a refined 3D tree over four threads.

use pierced_octree::{
    comm::{Communicator, ThreadComm},
    config::OctreeConfig,
    parallel_octree::ParaTree,
    tools::{gather_to_all, global_sum},
};

pub fn main() {
    let universe = ThreadComm::universe(4);

    std::thread::scope(|scope| {
        for comm in universe {
            scope.spawn(move || {
                let rank = comm.rank();
                let mut para = ParaTree::uniform(OctreeConfig::new(3), 2, comm).unwrap();
                para.partition(None).unwrap();

                // Refine towards the centre of the domain.
                let centre = [0.5, 0.5, 0.5];
                if para.point_owner(centre) == Some(rank) {
                    let logical = para.mapping().locate(centre).unwrap();
                    let id = para.tree().locate_logical_point(logical).unwrap();
                    para.set_marker(id, 2).unwrap();
                }
                para.adapt().unwrap();
                para.adapt().unwrap();
                para.partition(None).unwrap();
                assert!(para.is_balanced().unwrap());

                let counts = gather_to_all(&[para.tree().len() as u64], para.comm()).unwrap();
                let ghosts = global_sum(para.ghosts().len() as u64, para.comm()).unwrap();
                if rank == 0 {
                    println!(
                        "{} octants over {} ranks: {counts:?}, {ghosts} ghosts in total.",
                        para.global_num_octants(),
                        para.size()
                    );
                }
            });
        }
    });
}
