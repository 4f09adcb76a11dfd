//! Fixed size binary records used for checkpoints and exchanges between ranks.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::{
    error::{OctreeError, OctreeResult},
    octant::Octant,
};

/// A value with a fixed size little endian binary representation.
pub trait BinaryValue: Sized {
    /// Number of bytes of the record.
    const SIZE: usize;

    /// Write the record.
    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()>;

    /// Read a record.
    fn read_from<R: Read>(reader: &mut R) -> OctreeResult<Self>;
}

macro_rules! binary_value {
    ($ty:ty, $size:expr, $write:ident, $read:ident) => {
        impl BinaryValue for $ty {
            const SIZE: usize = $size;

            fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
                writer.$write::<LittleEndian>(*self)
            }

            fn read_from<R: Read>(reader: &mut R) -> OctreeResult<Self> {
                Ok(reader.$read::<LittleEndian>()?)
            }
        }
    };
}

binary_value!(u16, 2, write_u16, read_u16);
binary_value!(u32, 4, write_u32, read_u32);
binary_value!(u64, 8, write_u64, read_u64);
binary_value!(i16, 2, write_i16, read_i16);
binary_value!(i32, 4, write_i32, read_i32);
binary_value!(i64, 8, write_i64, read_i64);
binary_value!(f32, 4, write_f32, read_f32);
binary_value!(f64, 8, write_f64, read_f64);

impl BinaryValue for u8 {
    const SIZE: usize = 1;

    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u8(*self)
    }

    fn read_from<R: Read>(reader: &mut R) -> OctreeResult<Self> {
        Ok(reader.read_u8()?)
    }
}

impl BinaryValue for i8 {
    const SIZE: usize = 1;

    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_i8(*self)
    }

    fn read_from<R: Read>(reader: &mut R) -> OctreeResult<Self> {
        Ok(reader.read_i8()?)
    }
}

impl BinaryValue for Octant {
    const SIZE: usize = Octant::BINARY_SIZE;

    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        self.write_binary(writer)
    }

    fn read_from<R: Read>(reader: &mut R) -> OctreeResult<Self> {
        Octant::read_binary(reader)
    }
}

/// Serialize a slice of values.
pub fn to_bytes<T: BinaryValue>(values: &[T]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * T::SIZE);
    for value in values {
        // Writing into a vector cannot fail.
        let _ = value.write_to(&mut bytes);
    }
    bytes
}

/// Deserialize values written by [to_bytes].
pub fn from_bytes<T: BinaryValue>(bytes: &[u8]) -> OctreeResult<Vec<T>> {
    if bytes.len() % T::SIZE != 0 {
        return Err(OctreeError::InvalidStream(format!(
            "{} bytes do not hold records of {} bytes",
            bytes.len(),
            T::SIZE
        )));
    }
    let mut reader = bytes;
    (0..bytes.len() / T::SIZE)
        .map(|_| T::read_from(&mut reader))
        .collect()
}
