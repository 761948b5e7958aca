//! PNG chunk layout: signature, chunk types, the chunk cursor, and CRC-32.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{PngError, Result};

/// PNG signature bytes.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Chunk lengths are unsigned but must not exceed 2^31 - 1 bytes.
const MAX_CHUNK_LENGTH: u32 = (1 << 31) - 1;

/// PNG chunk type.
///
/// Type codes are fixed 4-byte binary identifiers, not character strings;
/// the case bits of the individual bytes carry the chunk properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkType([u8; 4]);

impl ChunkType {
    /// IHDR - Image header.
    pub const IHDR: Self = Self(*b"IHDR");
    /// PLTE - Palette.
    pub const PLTE: Self = Self(*b"PLTE");
    /// IDAT - Image data.
    pub const IDAT: Self = Self(*b"IDAT");
    /// IEND - Image end.
    pub const IEND: Self = Self(*b"IEND");
    /// gAMA - Image gamma.
    pub const GAMA: Self = Self(*b"gAMA");

    /// Create from bytes.
    pub fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Get bytes.
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Check if chunk is critical (bit 5 of the first byte clear).
    pub fn is_critical(&self) -> bool {
        (self.0[0] & 0x20) == 0
    }

    /// Check if chunk is ancillary.
    pub fn is_ancillary(&self) -> bool {
        !self.is_critical()
    }
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// One chunk as it appears on the wire.
///
/// `length` counts only the data field, never the type or CRC.
#[derive(Debug, Clone)]
pub struct RawChunk<'a> {
    /// Length of the data field.
    pub length: u32,
    /// Chunk type code.
    pub chunk_type: ChunkType,
    /// Data field.
    pub data: &'a [u8],
    /// Stored CRC over the type and data fields.
    pub crc: u32,
}

/// Byte cursor over a PNG datastream.
///
/// All multi-byte fields are big-endian and every read is bounds-checked
/// against the end of the buffer.
#[derive(Debug)]
pub struct ChunkReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ChunkReader<'a> {
    /// Create a reader over a full PNG datastream.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Check and consume the 8-byte PNG signature.
    pub fn read_signature(&mut self) -> Result<()> {
        if self.data.len() < PNG_SIGNATURE.len() || self.data[..8] != PNG_SIGNATURE {
            return Err(PngError::BadSignature);
        }
        self.pos = PNG_SIGNATURE.len();
        Ok(())
    }

    /// Read the next chunk: length, type, data slice, and stored CRC.
    pub fn next_chunk(&mut self) -> Result<RawChunk<'a>> {
        let header_end = self
            .pos
            .checked_add(8)
            .ok_or(PngError::CorruptedFile)?;
        if self.data.len() < header_end {
            return Err(PngError::CorruptedFile);
        }

        let length = BigEndian::read_u32(&self.data[self.pos..]);
        if length > MAX_CHUNK_LENGTH {
            return Err(PngError::CorruptedFile);
        }
        let chunk_type = ChunkType::new([
            self.data[self.pos + 4],
            self.data[self.pos + 5],
            self.data[self.pos + 6],
            self.data[self.pos + 7],
        ]);

        let data_end = header_end
            .checked_add(length as usize)
            .ok_or(PngError::CorruptedFile)?;
        let crc_end = data_end.checked_add(4).ok_or(PngError::CorruptedFile)?;
        if self.data.len() < crc_end {
            return Err(PngError::CorruptedFile);
        }

        let data = &self.data[header_end..data_end];
        let crc = BigEndian::read_u32(&self.data[data_end..]);
        self.pos = crc_end;

        Ok(RawChunk {
            length,
            chunk_type,
            data,
            crc,
        })
    }
}

/// Reflected CRC-32 polynomial used by PNG (ISO 3309 / ITU-T V.42).
const CRC_POLYNOMIAL: u32 = 0xEDB88320;

/// One CRC-32 table entry: the message byte run through eight polynomial
/// division steps, least significant bit first.
const fn crc_entry(message_byte: u32) -> u32 {
    let mut value = message_byte;
    let mut round = 0;
    while round < 8 {
        value = if value & 1 == 1 {
            CRC_POLYNOMIAL ^ (value >> 1)
        } else {
            value >> 1
        };
        round += 1;
    }
    value
}

/// CRC-32 lookup table, one entry per possible message byte.
static CRC_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut byte = 0;
    while byte < 256 {
        table[byte] = crc_entry(byte as u32);
        byte += 1;
    }
    table
};

fn crc_update(mut crc: u32, data: &[u8]) -> u32 {
    for &byte in data {
        let idx = ((crc ^ byte as u32) & 0xFF) as usize;
        crc = CRC_TABLE[idx] ^ (crc >> 8);
    }
    crc
}

/// Calculate the CRC32 of a byte slice.
pub fn crc32(data: &[u8]) -> u32 {
    crc_update(0xFFFFFFFF, data) ^ 0xFFFFFFFF
}

/// Calculate the chunk CRC over the type field followed by the data field.
pub fn chunk_crc(chunk_type: ChunkType, data: &[u8]) -> u32 {
    crc_update(crc_update(0xFFFFFFFF, chunk_type.as_bytes()), data) ^ 0xFFFFFFFF
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_type_properties() {
        assert!(ChunkType::IHDR.is_critical());
        assert!(ChunkType::IDAT.is_critical());
        assert!(ChunkType::GAMA.is_ancillary());
        assert!(ChunkType::new(*b"tEXt").is_ancillary());

        assert_eq!(format!("{}", ChunkType::PLTE), "PLTE");
    }

    #[test]
    fn test_crc32_known_value() {
        // CRC of the bare IEND type code, as stored in every PNG file.
        assert_eq!(crc32(b"IEND"), 0xAE42_6082);
    }

    #[test]
    fn test_chunk_crc_matches_concatenation() {
        let data = [1u8, 2, 3, 4];
        let mut concat = Vec::new();
        concat.extend_from_slice(b"IDAT");
        concat.extend_from_slice(&data);
        assert_eq!(chunk_crc(ChunkType::IDAT, &data), crc32(&concat));
    }

    #[test]
    fn test_read_signature() {
        let mut stream = PNG_SIGNATURE.to_vec();
        stream.extend_from_slice(&[0, 0, 0, 0]);
        let mut reader = ChunkReader::new(&stream);
        assert!(reader.read_signature().is_ok());

        let mut bad = PNG_SIGNATURE.to_vec();
        bad[0] = 0x88;
        let mut reader = ChunkReader::new(&bad);
        assert_eq!(reader.read_signature(), Err(PngError::BadSignature));

        let mut reader = ChunkReader::new(&[0x89, 0x50]);
        assert_eq!(reader.read_signature(), Err(PngError::BadSignature));
    }

    #[test]
    fn test_next_chunk() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&2u32.to_be_bytes());
        stream.extend_from_slice(b"IDAT");
        stream.extend_from_slice(&[0xAA, 0xBB]);
        stream.extend_from_slice(&chunk_crc(ChunkType::IDAT, &[0xAA, 0xBB]).to_be_bytes());

        let mut reader = ChunkReader::new(&stream);
        let chunk = reader.next_chunk().unwrap();
        assert_eq!(chunk.length, 2);
        assert_eq!(chunk.chunk_type, ChunkType::IDAT);
        assert_eq!(chunk.data, &[0xAA, 0xBB]);
        assert_eq!(chunk.crc, chunk_crc(ChunkType::IDAT, &[0xAA, 0xBB]));
    }

    #[test]
    fn test_next_chunk_truncated() {
        // Declares 16 data bytes but carries only 2.
        let mut stream = Vec::new();
        stream.extend_from_slice(&16u32.to_be_bytes());
        stream.extend_from_slice(b"IDAT");
        stream.extend_from_slice(&[0xAA, 0xBB]);

        let mut reader = ChunkReader::new(&stream);
        assert_eq!(reader.next_chunk().unwrap_err(), PngError::CorruptedFile);
    }

    #[test]
    fn test_next_chunk_rejects_oversized_length() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&0xFFFF_FFFFu32.to_be_bytes());
        stream.extend_from_slice(b"IDAT");

        let mut reader = ChunkReader::new(&stream);
        assert_eq!(reader.next_chunk().unwrap_err(), PngError::CorruptedFile);
    }
}
