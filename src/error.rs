//! Error types for PNG decoding.

use thiserror::Error;

use crate::chunk::ChunkType;

/// Result type for PNG decoding operations.
pub type Result<T> = std::result::Result<T, PngError>;

/// Errors that can occur while decoding a PNG datastream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PngError {
    /// Data does not begin with the PNG file signature.
    #[error("data has wrong file signature for a PNG file")]
    BadSignature,

    /// Data does not match any supported container format.
    #[error("data is not a supported image container")]
    TypeNotSupported,

    /// The chunk sequence is not valid for a PNG datastream.
    #[error("invalid chunk sequence: {0}")]
    InvalidFile(String),

    /// The first chunk of the datastream is not IHDR.
    #[error("IHDR chunk not found at the start of the datastream")]
    IhdrNotFound,

    /// More than one IHDR chunk was found.
    #[error("multiple IHDR chunks in datastream")]
    MultipleIhdr,

    /// The datastream ended without any IDAT chunk.
    #[error("no IDAT chunk before IEND")]
    NoIdat,

    /// An indexed-colour image has no PLTE chunk.
    #[error("indexed-colour image is missing the PLTE chunk")]
    NoPlte,

    /// A PLTE chunk appeared for a colour type that forbids it.
    #[error("unexpected PLTE chunk for colour type {0}")]
    UnexpectedPlte(u8),

    /// A gAMA chunk appeared after PLTE or IDAT.
    #[error("gAMA chunk after PLTE or IDAT")]
    GamaAfterPlte,

    /// More than one gAMA chunk was found.
    #[error("multiple gAMA chunks in datastream")]
    MultipleGama,

    /// An IDAT chunk declared a length above the per-chunk limit.
    #[error("IDAT chunk length {0} exceeds the size limit")]
    IdatSizeLimit(u32),

    /// The IHDR chunk has the wrong length or invalid fixed fields.
    #[error("corrupt IHDR chunk")]
    CorruptIhdr,

    /// The IHDR bit depth is not one of 1, 2, 4, 8, 16.
    #[error("invalid bit depth {0} in IHDR chunk")]
    BadBitDepth(u8),

    /// The IHDR colour type is not one of 0, 2, 3, 4, 6.
    #[error("invalid colour type {0} in IHDR chunk")]
    BadColourType(u8),

    /// The bit depth is not allowed for the colour type.
    #[error("invalid combination of bit depth {bit_depth} and colour type {colour_type}")]
    BadBitDepthCombination {
        /// Colour type from IHDR.
        colour_type: u8,
        /// Bit depth from IHDR.
        bit_depth: u8,
    },

    /// The IHDR interlace method is not 0 or 1.
    #[error("invalid interlace method {0} in IHDR chunk")]
    BadInterlace(u8),

    /// A dimension exceeds the configured maximum.
    #[error("image dimensions {width}x{height} exceed the maximum image size")]
    ImageTooBig {
        /// Width from IHDR.
        width: u32,
        /// Height from IHDR.
        height: u32,
    },

    /// Width or height is zero.
    #[error("image has a zero width or height")]
    ZeroSize,

    /// A chunk CRC did not match the stored value.
    #[error("CRC mismatch in {chunk} chunk: stored {stored:#010x}, computed {computed:#010x}")]
    CrcMismatch {
        /// Chunk whose CRC failed.
        chunk: ChunkType,
        /// CRC stored in the datastream.
        stored: u32,
        /// CRC computed over the chunk type and data.
        computed: u32,
    },

    /// The two-byte zlib header is missing or fails its check.
    #[error("zlib stream header is corrupted")]
    ZlibHeaderCorrupted,

    /// The zlib compression method is not DEFLATE.
    #[error("unsupported zlib compression method {0}")]
    ZlibCompression(u8),

    /// The zlib stream requests a preset dictionary, which PNG forbids.
    #[error("zlib preset dictionary is not allowed in PNG")]
    PresetDict,

    /// A zlib header field holds a value outside its allowed range.
    #[error("invalid zlib compression info value {0}")]
    InvalidZlibValue(u8),

    /// A Huffman code-length vector cannot form a valid code.
    #[error("invalid Huffman code lengths")]
    BadHuffmanCodeLengths,

    /// The compressed stream is malformed.
    #[error("corrupted compressed data stream")]
    CorruptedFile,

    /// Decompression produced more data than the image declares.
    #[error("decompressed output exceeds the declared image size")]
    OutOfMemory,

    /// A buffer allocation failed.
    #[error("memory allocation failed")]
    MemoryError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PngError::BadBitDepthCombination {
            colour_type: 3,
            bit_depth: 16,
        };
        assert!(err.to_string().contains("bit depth 16"));
        assert!(err.to_string().contains("colour type 3"));

        let err = PngError::ImageTooBig {
            width: 1 << 25,
            height: 1,
        };
        assert!(err.to_string().contains("33554432x1"));
    }

    #[test]
    fn test_crc_mismatch_display() {
        let err = PngError::CrcMismatch {
            chunk: ChunkType::IHDR,
            stored: 0xDEADBEEF,
            computed: 0x12345678,
        };
        let msg = err.to_string();
        assert!(msg.contains("IHDR"));
        assert!(msg.contains("0xdeadbeef"));
    }
}
