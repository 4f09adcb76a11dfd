//! Refine a 2D tree around random points and keep a value per octant.

use pierced_octree::{
    adaption::{count_kind, AdaptionKind},
    config::OctreeConfig,
    octree::LocalTree,
    pierced::SyncMode,
    tools::{generate_random_points, seeded_rng},
};

pub fn main() {
    let config = OctreeConfig::new(2);
    let mapping = config.mapping();
    let mut tree = LocalTree::new(config.dim).unwrap();
    tree.global_refine().unwrap();

    // The storage follows every edit of the tree.
    let levels = tree.attach_storage::<u8>(SyncMode::Concurrent).unwrap();

    let mut rng = seeded_rng(0);
    let points = generate_random_points(config.dim, 20, &mut rng);

    for step in 0..4 {
        for point in &points {
            if let Some(id) = mapping
                .locate(*point)
                .and_then(|logical| tree.locate_logical_point(logical))
            {
                tree.set_marker(id, 1).unwrap();
            }
        }
        let changelog = tree.adapt(&[]).unwrap();
        for (id, octant) in tree.iter() {
            levels.borrow_mut().set(id, octant.level()).unwrap();
        }
        println!(
            "Step {step}: {} refinements, {} octants.",
            count_kind(&changelog, AdaptionKind::Refinement),
            tree.len()
        );
    }

    assert!(tree.is_balanced(&[]));
    let deepest = levels.borrow().raw_values().iter().copied().max().unwrap();
    println!("Tree is 2:1 balanced, deepest level {deepest}.");
}
