// Codec implementations often use patterns that trigger clippy warnings
#![allow(clippy::needless_range_loop)]

//! PNG Datastream Decoder
//!
//! This crate provides a pure Rust decoder for PNG 1.2 datastreams with its
//! own zlib/DEFLATE implementation (RFC 1950/1951). It supports:
//!
//! - All five PNG colour types and every legal bit depth
//! - Stored, fixed-Huffman, and dynamic-Huffman DEFLATE blocks
//! - Per-chunk CRC-32 and stream Adler-32 verification (on by default)
//! - gAMA and PLTE handling, with the full chunk ordering rules
//! - Scanline defiltering for non-interlaced images
//!
//! Interlaced (Adam7) images are validated and inflated, but their passes
//! are returned without de-interleaving.
//!
//! # Example
//!
//! ```no_run
//! use pngdec::PngDecoder;
//!
//! let data = std::fs::read("image.png").unwrap();
//! let mut decoder = PngDecoder::new();
//! let image = decoder.decode(&data).unwrap();
//!
//! println!("{}x{}, {:?}", image.width(), image.height(), image.info.color_type);
//! ```

#![warn(missing_docs)]

/// Bit-level stream reading (public for testing).
pub mod bitstream;
/// Chunk layout and CRC-32 (public for testing).
pub mod chunk;
mod decoder;
mod error;
/// Scanline filters (public for testing).
pub mod filter;
/// Huffman decoding (public for testing).
pub mod huffman;
/// Zlib/DEFLATE decompression (public for testing).
pub mod inflate;
mod tables;

pub use chunk::{chunk_crc, crc32, ChunkType, PNG_SIGNATURE};
pub use decoder::{
    ColorType, DecodedImage, DecoderConfig, InterlaceMethod, PngDecoder, PngInfo,
    IDAT_INITIAL_CAPACITY, MAX_IMAGE_DIMENSION,
};
pub use error::{PngError, Result};

/// Check whether a buffer starts with the PNG signature.
pub fn probe_png(data: &[u8]) -> bool {
    data.len() >= PNG_SIGNATURE.len() && data[..PNG_SIGNATURE.len()] == PNG_SIGNATURE
}

/// Decode an image from a byte buffer, detecting the container first.
///
/// Buffers whose magic bytes match no supported container fail with
/// `TypeNotSupported`; PNG is currently the only supported container.
pub fn decode(data: &[u8]) -> Result<DecodedImage> {
    if !probe_png(data) {
        return Err(PngError::TypeNotSupported);
    }
    PngDecoder::new().decode(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_png() {
        assert!(probe_png(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00]));
        assert!(!probe_png(&[0x89, 0x50, 0x4E, 0x47]));
        assert!(!probe_png(b"GIF89a\x00\x00"));
    }

    #[test]
    fn test_decode_rejects_unknown_container() {
        assert_eq!(
            decode(b"GIF89a\x00\x00").unwrap_err(),
            PngError::TypeNotSupported
        );
    }
}
