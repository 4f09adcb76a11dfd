//! Containers with stable ids.
//!
//! A [PiercedKernel] hands out slots for ids and keeps them stable under
//! erasure by leaving holes. Any number of value arrays can follow a kernel:
//! [PiercedStorage] as a registered slave, [PiercedVector] as the owner of
//! the kernel and its primary values.
mod kernel;
mod storage;
mod sync;
mod vector;

pub use kernel::{KernelRef, PiercedId, PiercedKernel};
pub use storage::{PiercedIter, PiercedStorage, SharedStorage};
pub use sync::{PiercedSyncMaster, PiercedSyncSlave, SyncAction, SyncMode};
pub use vector::PiercedVector;
