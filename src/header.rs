//! The fixed 48-byte container header.
//!
//! ```text
//! Offset  Size  Field
//! 0       4     Magic  54 5A 50 03 ("TZP\3")
//! 4       2     Version u16 LE = 0x0301 (bytes 01 03)
//! 6       2     Global flags
//! 8       8     Original length, u64
//! 16      4     Block count, u32
//! 20      4     Base block size, u32
//! 24      8     Global hash: first 8 bytes of SHA-256(input)
//! 32      4     Metadata length, u32
//! 36      12    Reserved, zero-filled
//! ```

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::TzpError;

pub const MAGIC: [u8; 4] = [0x54, 0x5A, 0x50, 0x03];
pub const VERSION: u16 = 0x0301;
pub const HEADER_SIZE: usize = 48;
const RESERVED: usize = 12;

// Global flag bits.
pub const GF_ANALYZED: u16 = 0x0001;
/// Reserved in v3.1, must be 0.
pub const GF_DICTIONARIES: u16 = 0x0002;
pub const GF_PREPROCESSED: u16 = 0x0004;
pub const GF_MULTI_PASS: u16 = 0x0008;
pub const GF_ADAPTIVE_BLOCKS: u16 = 0x0010;
pub const GF_PATTERN_OPTIMIZED: u16 = 0x0020;
/// Every bit a v3.1 writer may set; excludes the reserved dictionary bit.
pub const GF_KNOWN_MASK: u16 =
    GF_ANALYZED | GF_PREPROCESSED | GF_MULTI_PASS | GF_ADAPTIVE_BLOCKS | GF_PATTERN_OPTIMIZED;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub flags: u16,
    pub original_len: u64,
    pub block_count: u32,
    pub base_block_size: u32,
    pub global_hash: [u8; 8],
    pub metadata_len: u32,
}

impl FileHeader {
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&MAGIC)?;
        writer.write_u16::<LittleEndian>(VERSION)?;
        writer.write_u16::<LittleEndian>(self.flags)?;
        writer.write_u64::<LittleEndian>(self.original_len)?;
        writer.write_u32::<LittleEndian>(self.block_count)?;
        writer.write_u32::<LittleEndian>(self.base_block_size)?;
        writer.write_all(&self.global_hash)?;
        writer.write_u32::<LittleEndian>(self.metadata_len)?;
        writer.write_all(&[0u8; RESERVED])?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self, TzpError> {
        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .map_err(|_| TzpError::UnsupportedFormat("truncated header".into()))?;
        if magic != MAGIC {
            return Err(TzpError::UnsupportedFormat(format!(
                "bad magic {:02X} {:02X} {:02X} {:02X}",
                magic[0], magic[1], magic[2], magic[3]
            )));
        }
        let version = reader.read_u16::<LittleEndian>()?;
        if version != VERSION {
            return Err(TzpError::UnsupportedFormat(format!(
                "unsupported version 0x{version:04X}"
            )));
        }
        let flags = reader.read_u16::<LittleEndian>()?;
        if flags & !GF_KNOWN_MASK != 0 {
            return Err(TzpError::UnsupportedFormat(format!(
                "reserved global flag bits set: 0x{flags:04X}"
            )));
        }
        let original_len = reader.read_u64::<LittleEndian>()?;
        let block_count = reader.read_u32::<LittleEndian>()?;
        let base_block_size = reader.read_u32::<LittleEndian>()?;
        let mut global_hash = [0u8; 8];
        reader.read_exact(&mut global_hash)?;
        let metadata_len = reader.read_u32::<LittleEndian>()?;
        let mut reserved = [0u8; RESERVED];
        reader.read_exact(&mut reserved)?;

        Ok(Self {
            flags,
            original_len,
            block_count,
            base_block_size,
            global_hash,
            metadata_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FileHeader {
        FileHeader {
            flags: GF_ANALYZED | GF_ADAPTIVE_BLOCKS,
            original_len: 123_456_789,
            block_count: 42,
            base_block_size: 1024 * 1024,
            global_hash: [1, 2, 3, 4, 5, 6, 7, 8],
            metadata_len: 256,
        }
    }

    #[test]
    fn roundtrip() {
        let header = sample();
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(FileHeader::read(&buf[..]).unwrap(), header);
    }

    #[test]
    fn magic_and_version_bytes_are_fixed() {
        let mut buf = Vec::new();
        sample().write(&mut buf).unwrap();
        assert_eq!(&buf[..4], &[0x54, 0x5A, 0x50, 0x03]);
        // Version 0x0301 little-endian.
        assert_eq!(&buf[4..6], &[0x01, 0x03]);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut buf = Vec::new();
        sample().write(&mut buf).unwrap();
        buf[0] = b'X';
        assert!(matches!(
            FileHeader::read(&buf[..]),
            Err(TzpError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut buf = Vec::new();
        sample().write(&mut buf).unwrap();
        buf[4] = 0x00;
        buf[5] = 0x02;
        assert!(matches!(
            FileHeader::read(&buf[..]),
            Err(TzpError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn reserved_flag_bits_are_rejected() {
        let mut buf = Vec::new();
        sample().write(&mut buf).unwrap();
        buf[7] |= 0x80; // set a bit in 0x8000
        assert!(matches!(
            FileHeader::read(&buf[..]),
            Err(TzpError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn truncated_header_is_rejected() {
        let mut buf = Vec::new();
        sample().write(&mut buf).unwrap();
        assert!(FileHeader::read(&buf[..20]).is_err());
    }
}
