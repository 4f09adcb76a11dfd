//! Communicators connecting the ranks of a distributed tree.
//!
//! Every collective of the crate is built on a single primitive, a personalized
//! all to all exchange of byte buffers. [SerialComm] is the trivial single
//! rank communicator, [ThreadComm] connects ranks living in threads of one
//! process and `MpiComm` (feature `mpi`) wraps an MPI communicator.

use crossbeam_channel::{unbounded, Receiver, Sender};
use itertools::Itertools;
#[cfg(feature = "mpi")]
use mpi::{
    datatype::{Partition, PartitionMut},
    traits::{Communicator as _, CommunicatorCollectives},
};

use crate::error::CommError;
#[cfg(feature = "mpi")]
use crate::tools::displacements;

/// A group of ranks that exchange data collectively.
///
/// All ranks must call the collectives in the same order.
pub trait Communicator {
    /// Rank of the calling process.
    fn rank(&self) -> usize;

    /// Number of ranks.
    fn size(&self) -> usize;

    /// Send `buffers[j]` to rank `j` and return the buffers received from every rank.
    fn all_to_all_bytes(&self, buffers: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, CommError>;
}

fn check_buffer_count(buffers: &[Vec<u8>], size: usize) -> Result<(), CommError> {
    if buffers.len() != size {
        return Err(CommError::SizeMismatch {
            expected: size,
            found: buffers.len(),
        });
    }
    Ok(())
}

/// The communicator of a single rank.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialComm;

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_to_all_bytes(&self, buffers: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, CommError> {
        check_buffer_count(&buffers, 1)?;
        Ok(buffers)
    }
}

/// A rank of an in-process universe, connected to its peers by channels.
///
/// Each ordered pair of ranks has its own unbounded channel, so sends never
/// block and messages between two ranks arrive in order.
pub struct ThreadComm {
    rank: usize,
    senders: Vec<Sender<Vec<u8>>>,
    receivers: Vec<Receiver<Vec<u8>>>,
}

impl ThreadComm {
    /// Create the communicators of `size` ranks. Move each one into its own thread.
    pub fn universe(size: usize) -> Vec<ThreadComm> {
        let mut senders = (0..size).map(|_| Vec::with_capacity(size)).collect_vec();
        let mut receivers = (0..size).map(|_| Vec::with_capacity(size)).collect_vec();
        for from in 0..size {
            for to in receivers.iter_mut() {
                let (sender, receiver) = unbounded();
                senders[from].push(sender);
                to.push(receiver);
            }
        }

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (senders, receivers))| ThreadComm {
                rank,
                senders,
                receivers,
            })
            .collect()
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.senders.len()
    }

    fn all_to_all_bytes(&self, buffers: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, CommError> {
        check_buffer_count(&buffers, self.size())?;
        for (to, buffer) in buffers.into_iter().enumerate() {
            self.senders[to]
                .send(buffer)
                .map_err(|_| CommError::Disconnected(to))?;
        }
        self.receivers
            .iter()
            .enumerate()
            .map(|(from, receiver)| receiver.recv().map_err(|_| CommError::Disconnected(from)))
            .collect()
    }
}

/// An MPI communicator.
#[cfg(feature = "mpi")]
pub struct MpiComm<C: CommunicatorCollectives> {
    comm: C,
}

#[cfg(feature = "mpi")]
impl<C: CommunicatorCollectives> MpiComm<C> {
    /// Wrap an MPI communicator, e.g. `universe.world()`.
    pub fn new(comm: C) -> Self {
        Self { comm }
    }

    /// The wrapped communicator.
    pub fn inner(&self) -> &C {
        &self.comm
    }
}

#[cfg(feature = "mpi")]
impl<C: CommunicatorCollectives> Communicator for MpiComm<C> {
    fn rank(&self) -> usize {
        self.comm.rank() as usize
    }

    fn size(&self) -> usize {
        self.comm.size() as usize
    }

    fn all_to_all_bytes(&self, buffers: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, CommError> {
        check_buffer_count(&buffers, self.size())?;

        // First send the counts around, then the data in one varcount exchange.
        let counts = buffers
            .iter()
            .map(|buffer| {
                i32::try_from(buffer.len())
                    .map_err(|_| CommError::Inconsistent(format!("buffer of {} bytes", buffer.len())))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut recv_counts = vec![0i32; counts.len()];
        self.comm.all_to_all_into(&counts[..], &mut recv_counts[..]);

        let send = buffers.concat();
        let mut recv = vec![0u8; recv_counts.iter().map(|&c| c as usize).sum()];
        {
            let send_partition = Partition::new(&send[..], &counts[..], displacements(&counts));
            let mut recv_partition =
                PartitionMut::new(&mut recv[..], &recv_counts[..], displacements(&recv_counts));
            self.comm
                .all_to_all_varcount_into(&send_partition, &mut recv_partition);
        }

        let mut rest = recv.as_slice();
        Ok(recv_counts
            .iter()
            .map(|&count| {
                let (head, tail) = rest.split_at(count as usize);
                rest = tail;
                head.to_vec()
            })
            .collect())
    }
}
