//! Routines for working with Morton indices.
//!
//! Coordinates are interleaved with the "magic bits" method: each coordinate is
//! spread so that its bits sit 3 apart (3D) or 2 apart (2D), and the spread values
//! are OR'd together shifted by their axis. Decoding gathers the bits back.
//!
//! Coordinates must fit the reserved width (21 bits per axis in 3D, 32 bits per
//! axis in 2D). Wider inputs are truncated, not rejected.

/// Key value that never belongs to a valid octant.
pub const INVALID_MORTON: u64 = u64::MAX;

/// Spread the lowest 21 bits of `a` so that consecutive bits are 3 positions apart.
#[inline]
pub fn split_by_3(a: u32) -> u64 {
    let mut x = (a as u64) & 0x1f_ffff;
    x = (x | x << 32) & 0x001f_0000_0000_ffff;
    x = (x | x << 16) & 0x001f_0000_ff00_00ff;
    x = (x | x << 8) & 0x100f_00f0_0f00_f00f;
    x = (x | x << 4) & 0x10c3_0c30_c30c_30c3;
    x = (x | x << 2) & 0x1249_2492_4924_9249;
    x
}

/// Spread the 32 bits of `a` so that consecutive bits are 2 positions apart.
#[inline]
pub fn split_by_2(a: u32) -> u64 {
    let mut x = a as u64;
    x = (x | x << 16) & 0x0000_ffff_0000_ffff;
    x = (x | x << 8) & 0x00ff_00ff_00ff_00ff;
    x = (x | x << 4) & 0x0f0f_0f0f_0f0f_0f0f;
    x = (x | x << 2) & 0x3333_3333_3333_3333;
    x = (x | x << 1) & 0x5555_5555_5555_5555;
    x
}

/// Gather every third bit of `morton`, starting at bit 0.
#[inline]
pub fn gather_third_bits(morton: u64) -> u32 {
    let mut x = morton & 0x1249_2492_4924_9249;
    x = (x ^ (x >> 2)) & 0x10c3_0c30_c30c_30c3;
    x = (x ^ (x >> 4)) & 0x100f_00f0_0f00_f00f;
    x = (x ^ (x >> 8)) & 0x001f_0000_ff00_00ff;
    x = (x ^ (x >> 16)) & 0x001f_0000_0000_ffff;
    x = (x ^ (x >> 32)) & 0x0000_0000_001f_ffff;
    x as u32
}

/// Gather every second bit of `morton`, starting at bit 0.
#[inline]
pub fn gather_second_bits(morton: u64) -> u32 {
    let mut x = morton & 0x5555_5555_5555_5555;
    x = (x ^ (x >> 1)) & 0x3333_3333_3333_3333;
    x = (x ^ (x >> 2)) & 0x0f0f_0f0f_0f0f_0f0f;
    x = (x ^ (x >> 4)) & 0x00ff_00ff_00ff_00ff;
    x = (x ^ (x >> 8)) & 0x0000_ffff_0000_ffff;
    x = (x ^ (x >> 16)) & 0x0000_0000_ffff_ffff;
    x as u32
}

/// Morton key of a 3D position.
#[inline]
pub fn encode_3d(x: u32, y: u32, z: u32) -> u64 {
    split_by_3(x) | (split_by_3(y) << 1) | (split_by_3(z) << 2)
}

/// Morton key of a 2D position.
#[inline]
pub fn encode_2d(x: u32, y: u32) -> u64 {
    split_by_2(x) | (split_by_2(y) << 1)
}

/// Morton key of a position in `dim` dimensions. The `z` entry is ignored in 2D.
#[inline]
pub fn encode(dim: u8, coords: [u32; 3]) -> u64 {
    if dim == 2 {
        encode_2d(coords[0], coords[1])
    } else {
        encode_3d(coords[0], coords[1], coords[2])
    }
}

/// Coordinate along `axis` of a 3D Morton key.
#[inline]
pub fn decode_3d(morton: u64, axis: usize) -> u32 {
    gather_third_bits(morton >> axis)
}

/// Coordinate along `axis` of a 2D Morton key.
#[inline]
pub fn decode_2d(morton: u64, axis: usize) -> u32 {
    gather_second_bits(morton >> axis)
}

/// All coordinates of a Morton key. The `z` entry is zero in 2D.
#[inline]
pub fn decode(dim: u8, morton: u64) -> [u32; 3] {
    if dim == 2 {
        [decode_2d(morton, 0), decode_2d(morton, 1), 0]
    } else {
        [
            decode_3d(morton, 0),
            decode_3d(morton, 1),
            decode_3d(morton, 2),
        ]
    }
}

/// Non interleaved key of a 3D position.
///
/// Unlike the Morton key this does not preserve locality, it only makes
/// coordinate triples comparable and hashable as a single integer.
#[inline]
pub fn xyz_key_3d(x: u32, y: u32, z: u32) -> u64 {
    const SHIFT: u32 = u64::BITS / 3;
    (x as u64) | ((y as u64) << SHIFT) | ((z as u64) << (2 * SHIFT))
}

/// Non interleaved key of a 2D position.
#[inline]
pub fn xyz_key_2d(x: u32, y: u32) -> u64 {
    const SHIFT: u32 = u64::BITS / 2;
    (x as u64) | ((y as u64) << SHIFT)
}

/// Non interleaved key of a position in `dim` dimensions.
#[inline]
pub fn xyz_key(dim: u8, coords: [u32; 3]) -> u64 {
    if dim == 2 {
        xyz_key_2d(coords[0], coords[1])
    } else {
        xyz_key_3d(coords[0], coords[1], coords[2])
    }
}
