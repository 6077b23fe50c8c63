use byteorder::{BigEndian, WriteBytesExt};
use std::io::{Error, ErrorKind, Result};

/// Utility trait for serializing data inside class files
///
/// Class files have a couple of conventions that make an extra trait worth it:
///
///   - tags are always `u8`
///   - sequences are prefixed with their length as a `u16`
///   - everything is big-endian
///
pub trait Serialize: Sized {
    /// Serialize construct into a binary output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

impl Serialize for u8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(*self)
    }
}

impl Serialize for u16 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<BigEndian>(*self)
    }
}

impl Serialize for u32 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<BigEndian>(*self)
    }
}

impl Serialize for i8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i8(*self)
    }
}

impl Serialize for i16 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i16::<BigEndian>(*self)
    }
}

impl Serialize for i32 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i32::<BigEndian>(*self)
    }
}

impl Serialize for i64 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i64::<BigEndian>(*self)
    }
}

/// Size in `u16` is the first thing serialized
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        u16_length(self.len())?.serialize(writer)?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

/// Convert a length into the `u16` the class file format expects
pub fn u16_length(len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| {
        let msg = format!("Length {} does not fit in a u16", len);
        Error::new(ErrorKind::InvalidData, msg)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_and_length_prefixed() {
        let mut out = vec![];
        vec![0x0102u16, 0xCAFE].serialize(&mut out).unwrap();
        (-2i32).serialize(&mut out).unwrap();
        assert_eq!(out, vec![0, 2, 1, 2, 0xCA, 0xFE, 0xFF, 0xFF, 0xFF, 0xFE]);
    }

    #[test]
    fn oversized_sequences_are_rejected() {
        let too_many = vec![0u8; 70_000];
        assert!(too_many.serialize(&mut vec![]).is_err());
    }
}
