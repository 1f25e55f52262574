//! Block index entries and the per-block encode/decode pipeline.
//!
//! Each block contributes one fixed 24-byte entry to the index.  The CRC32
//! is always computed over the block's *original* bytes, never the
//! preprocessed or compressed form, so the reader can validate the full
//! inverse pipeline end to end no matter which transforms ran.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;
use tracing::debug;

use crate::codec::{self, Algorithm};
use crate::error::TzpError;
use crate::preprocess::{self, Preprocess};
use crate::strategy::BlockStrategy;

pub const INDEX_ENTRY_SIZE: usize = 24;

// Block flag bits.
pub const FLAG_DELTA: u16 = 0x0001;
pub const FLAG_RLE: u16 = 0x0002;
/// Reserved; never emitted.
pub const FLAG_TYPE_SPECIFIC: u16 = 0x0004;
pub const FLAG_HYBRID: u16 = 0x0008;
/// Every bit a v3.1 writer may set; excludes the reserved transform bit.
pub const FLAG_KNOWN_MASK: u16 = FLAG_DELTA | FLAG_RLE | FLAG_HYBRID;

/// One 24-byte block index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRecord {
    /// Offset into the payload region (not the file).
    pub payload_offset: u64,
    pub compressed_size: u32,
    pub original_size: u32,
    pub algorithm_code: u8,
    pub level: u8,
    pub flags: u16,
    /// CRC32 (IEEE) of the original block bytes.
    pub crc32: u32,
}

impl BlockRecord {
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u64::<LittleEndian>(self.payload_offset)?;
        writer.write_u32::<LittleEndian>(self.compressed_size)?;
        writer.write_u32::<LittleEndian>(self.original_size)?;
        writer.write_u8(self.algorithm_code)?;
        writer.write_u8(self.level)?;
        writer.write_u16::<LittleEndian>(self.flags)?;
        writer.write_u32::<LittleEndian>(self.crc32)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            payload_offset: reader.read_u64::<LittleEndian>()?,
            compressed_size: reader.read_u32::<LittleEndian>()?,
            original_size: reader.read_u32::<LittleEndian>()?,
            algorithm_code: reader.read_u8()?,
            level: reader.read_u8()?,
            flags: reader.read_u16::<LittleEndian>()?,
            crc32: reader.read_u32::<LittleEndian>()?,
        })
    }

    pub fn algorithm(&self) -> Result<Algorithm, crate::codec::CodecError> {
        Algorithm::from_wire(self.algorithm_code, self.level)
    }
}

/// Output of the encode pipeline for one block: the index-entry fields
/// (minus the payload offset, assigned at assembly) plus the payload.
#[derive(Debug)]
pub struct EncodedBlock {
    pub payload: Vec<u8>,
    pub original_size: u32,
    pub algorithm: Algorithm,
    pub flags: u16,
    pub crc32: u32,
}

impl EncodedBlock {
    pub fn record(&self, payload_offset: u64) -> BlockRecord {
        BlockRecord {
            payload_offset,
            compressed_size: self.payload.len() as u32,
            original_size: self.original_size,
            algorithm_code: self.algorithm.code(),
            level: self.algorithm.level_byte(),
            flags: self.flags,
            crc32: self.crc32,
        }
    }
}

pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Run one block through its strategy.  Falls back to a stored block when
/// the codec fails or the compressed form is not smaller than the input.
pub fn encode_block(data: &[u8], strategy: &BlockStrategy) -> EncodedBlock {
    let checksum = crc32(data);

    if strategy.algorithm == Algorithm::Stored {
        return stored_block(data, checksum);
    }

    let transformed;
    let (input, preprocess_flag): (&[u8], u16) = match strategy.preprocess {
        Some(Preprocess::Delta) => {
            transformed = preprocess::delta_encode(data);
            (&transformed, FLAG_DELTA)
        }
        Some(Preprocess::Rle) => {
            transformed = preprocess::rle_encode(data);
            (&transformed, FLAG_RLE)
        }
        None => (data, 0),
    };

    let compressed = match codec::compress(strategy.algorithm, input) {
        Ok(compressed) => compressed,
        Err(e) => {
            debug!("codec failed, storing block verbatim: {e}");
            return stored_block(data, checksum);
        }
    };

    if compressed.len() >= data.len() {
        return stored_block(data, checksum);
    }

    let mut flags = preprocess_flag;
    if matches!(strategy.algorithm, Algorithm::Hybrid(_, _)) {
        flags |= FLAG_HYBRID;
    }

    EncodedBlock {
        payload: compressed,
        original_size: data.len() as u32,
        algorithm: strategy.algorithm,
        flags,
        crc32: checksum,
    }
}

fn stored_block(data: &[u8], checksum: u32) -> EncodedBlock {
    EncodedBlock {
        payload: data.to_vec(),
        original_size: data.len() as u32,
        algorithm: Algorithm::Stored,
        flags: 0,
        crc32: checksum,
    }
}

/// Reverse the pipeline for one block and verify its checksum.  Any
/// failure to reproduce bytes matching the stored CRC — including a codec
/// that refuses the payload — reports the block as corrupt.
pub fn decode_block(index: usize, record: &BlockRecord, payload: &[u8]) -> Result<Vec<u8>, TzpError> {
    let mismatch = || TzpError::BlockChecksumMismatch { index };

    let algorithm = record
        .algorithm()
        .map_err(|e| TzpError::MalformedIndex(format!("block {index}: {e}")))?;

    let decoded = if algorithm == Algorithm::Stored {
        payload.to_vec()
    } else {
        let expanded = codec::decompress(algorithm, payload, record.original_size as usize)
            .map_err(|_| mismatch())?;
        match (record.flags & FLAG_DELTA != 0, record.flags & FLAG_RLE != 0) {
            (true, _) => preprocess::delta_decode(&expanded),
            (_, true) => preprocess::rle_decode(&expanded).ok_or_else(mismatch)?,
            _ => expanded,
        }
    };

    if decoded.len() != record.original_size as usize {
        return Err(mismatch());
    }
    if crc32(&decoded) != record.crc32 {
        return Err(mismatch());
    }
    Ok(decoded)
}
