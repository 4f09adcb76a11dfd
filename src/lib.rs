//! Morton ordered adaptive octrees with stable id storage.
//!
//! A [LocalTree](octree::LocalTree) keeps the leaves of a 2D or 3D tree in a
//! [PiercedVector](pierced::PiercedVector): octants keep their ids while the
//! tree is refined, coarsened and partitioned, and every structural edit is
//! forwarded to the storages attached to the kernel of the tree.
//! [ParaTree](parallel_octree::ParaTree) distributes the tree over the ranks
//! of a [Communicator](comm::Communicator) and maintains its ghost layer.
#![cfg_attr(feature = "strict", deny(warnings), deny(unused_crate_dependencies))]
#![warn(missing_docs)]

pub mod adaption;
pub mod comm;
pub mod config;
pub mod constants;
pub mod error;
pub mod geometry;
pub mod morton;
pub mod octant;
pub mod octree;
pub mod parallel_octree;
pub mod pierced;
pub mod stream;
pub mod tools;
pub mod topology;
