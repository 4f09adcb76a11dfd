//! Utility routines.
//!
//! The collectives are layered on [Communicator::all_to_all_bytes] and move
//! values in their [BinaryValue] representation.

use itertools::Itertools;
use num::traits::Zero;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{
    comm::Communicator,
    error::{CommError, OctreeResult},
    stream::{from_bytes, to_bytes, BinaryValue},
};

/// Send `parts[j]` to rank `j` and return the parts received from every rank.
pub fn all_to_all<T: BinaryValue, C: Communicator>(
    parts: &[&[T]],
    comm: &C,
) -> OctreeResult<Vec<Vec<T>>> {
    let buffers = parts.iter().map(|part| to_bytes(part)).collect_vec();
    comm.all_to_all_bytes(buffers)?
        .iter()
        .map(|bytes| from_bytes(bytes))
        .collect()
}

/// Gather array to all processes, concatenated in rank order.
pub fn gather_to_all<T: BinaryValue, C: Communicator>(arr: &[T], comm: &C) -> OctreeResult<Vec<T>> {
    let parts = vec![arr; comm.size()];
    Ok(all_to_all(&parts, comm)?.into_iter().concat())
}

/// Redistribute an array: the first `counts[0]` elements go to rank 0, the
/// next `counts[1]` to rank 1 and so on.
pub fn redistribute<T: BinaryValue, C: Communicator>(
    arr: &[T],
    counts: &[usize],
    comm: &C,
) -> OctreeResult<Vec<T>> {
    if counts.len() != comm.size() {
        return Err(CommError::SizeMismatch {
            expected: comm.size(),
            found: counts.len(),
        }
        .into());
    }
    if counts.iter().sum::<usize>() != arr.len() {
        return Err(CommError::Inconsistent(format!(
            "counts {counts:?} do not cover {} elements",
            arr.len()
        ))
        .into());
    }

    let mut rest = arr;
    let parts = counts
        .iter()
        .map(|&count| {
            let (head, tail) = rest.split_at(count);
            rest = tail;
            head
        })
        .collect_vec();
    Ok(all_to_all(&parts, comm)?.into_iter().concat())
}

/// Sum of a value over all ranks.
pub fn global_sum<T: BinaryValue + Zero + Copy, C: Communicator>(
    value: T,
    comm: &C,
) -> OctreeResult<T> {
    Ok(gather_to_all(&[value], comm)?
        .into_iter()
        .fold(T::zero(), |acc, x| acc + x))
}

/// Maximum of a value over all ranks.
pub fn global_max<T: BinaryValue + Copy + PartialOrd, C: Communicator>(
    value: T,
    comm: &C,
) -> OctreeResult<T> {
    Ok(gather_to_all(&[value], comm)?
        .into_iter()
        .fold(value, |acc, x| if x > acc { x } else { acc }))
}

/// Whether the flag is set on any rank.
pub fn global_any<C: Communicator>(flag: bool, comm: &C) -> OctreeResult<bool> {
    Ok(gather_to_all(&[flag as u8], comm)?.contains(&1))
}

/// Whether the flag is set on all ranks.
pub fn global_all<C: Communicator>(flag: bool, comm: &C) -> OctreeResult<bool> {
    Ok(!gather_to_all(&[flag as u8], comm)?.contains(&0))
}

/// Sum of the values of all lower ranks.
pub fn exclusive_scan_sum<T: BinaryValue + Zero + Copy, C: Communicator>(
    value: T,
    comm: &C,
) -> OctreeResult<T> {
    Ok(gather_to_all(&[value], comm)?
        .into_iter()
        .take(comm.rank())
        .fold(T::zero(), |acc, x| acc + x))
}

/// Perform a global inclusive cumulative sum operation.
///
/// For the array `[1, 3, 5, 7]` split over two ranks as `[1, 3]` and `[5, 7]`
/// the output will be `[1, 4]` and `[9, 16]`.
pub fn global_inclusive_cumsum<T: BinaryValue + Zero + Copy, C: Communicator>(
    arr: &[T],
    comm: &C,
) -> OctreeResult<Vec<T>> {
    let mut scan = arr
        .iter()
        .scan(T::zero(), |state, &x| {
            *state = *state + x;
            Some(*state)
        })
        .collect_vec();
    let local_total = scan.last().copied().unwrap_or_else(T::zero);
    let offset = exclusive_scan_sum(local_total, comm)?;
    for elem in &mut scan {
        *elem = *elem + offset;
    }
    Ok(scan)
}

/// Check if a distributed array is sorted, across rank boundaries as well.
pub fn is_sorted_array<T: BinaryValue + PartialOrd + Copy, C: Communicator>(
    arr: &[T],
    comm: &C,
) -> OctreeResult<bool> {
    let locally_sorted = arr.iter().tuple_windows().all(|(a, b)| a <= b);

    let ends = match (arr.first(), arr.last()) {
        (Some(&first), Some(&last)) => vec![first, last],
        _ => Vec::new(),
    };
    let parts = vec![ends.as_slice(); comm.size()];
    let ends = all_to_all(&parts, comm)?;
    let boundaries_sorted = ends
        .iter()
        .filter(|ends| !ends.is_empty())
        .tuple_windows()
        .all(|(previous, next)| previous[1] <= next[0]);

    Ok(global_all(locally_sorted, comm)? && boundaries_sorted)
}

/// Distribute a sorted sequence into bins.
///
/// The bins are defined by their sorted lower bounds: bin `j` is the half-open
/// interval `[bins[j], bins[j + 1])` and the final bin is `[bins[p - 1], ∞)`.
/// Elements below `bins[0]` count into the first bin. The function returns the
/// number of elements per bin, which fully describes the distribution since
/// the elements are sorted.
pub fn sort_to_bins<T: PartialOrd>(sorted_keys: &[T], bins: &[T]) -> Vec<usize> {
    let nbins = bins.len();
    let mut bin_counts = vec![0; nbins];
    if nbins == 0 {
        return bin_counts;
    }

    let mut bin = 0;
    for key in sorted_keys {
        // Move the bin forward until the key fits.
        while bin + 1 < nbins && bins[bin + 1] <= *key {
            bin += 1;
        }
        bin_counts[bin] += 1;
    }
    bin_counts
}

/// Compute displacements from a vector of counts.
///
/// For the counts `[3, 4, 5]` the displacements are `[0, 3, 7]`.
pub fn displacements<T: Zero + Copy>(counts: &[T]) -> Vec<T> {
    counts
        .iter()
        .scan(T::zero(), |acc, &x| {
            let tmp = *acc;
            *acc = *acc + x;
            Some(tmp)
        })
        .collect()
}

/// Get a seeded rng
pub fn seeded_rng(seed: usize) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed as u64)
}

/// Generate random points in the unit cube (unit square with `z = 0` in 2D).
pub fn generate_random_points<R: Rng>(dim: u8, npoints: usize, rng: &mut R) -> Vec<[f64; 3]> {
    (0..npoints)
        .map(|_| {
            let mut point = [0.0; 3];
            for coord in point.iter_mut().take(dim as usize) {
                *coord = rng.gen();
            }
            point
        })
        .collect()
}
