//! PNG decoder: chunk state machine, IHDR validation, and pixel recovery.

use byteorder::{BigEndian, ByteOrder};
use tracing::debug;

use crate::chunk::{chunk_crc, ChunkReader, ChunkType, RawChunk};
use crate::error::{PngError, Result};
use crate::filter::defilter;
use crate::inflate::zlib_decompress;

/// Default maximum allowed width or height in pixels.
pub const MAX_IMAGE_DIMENSION: u32 = 1 << 24;

/// Initial capacity of the compressed-data accumulator.
pub const IDAT_INITIAL_CAPACITY: usize = 4096;

/// Largest accepted length for a single IDAT chunk.
const IDAT_CHUNK_LIMIT: u32 = 1 << 30;

const IHDR_LENGTH: u32 = 13;

/// Adam7 interlace pass parameters: (start_x, start_y, step_x, step_y).
const ADAM7_PASSES: [(u64, u64, u64, u64); 7] = [
    (0, 0, 8, 8),
    (4, 0, 8, 8),
    (0, 4, 4, 8),
    (2, 0, 4, 4),
    (0, 2, 2, 4),
    (1, 0, 2, 2),
    (0, 1, 1, 2),
];

/// PNG colour type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorType {
    /// Greyscale.
    Grayscale = 0,
    /// Truecolour.
    Rgb = 2,
    /// Palette index.
    Indexed = 3,
    /// Greyscale with alpha.
    GrayscaleAlpha = 4,
    /// Truecolour with alpha.
    Rgba = 6,
}

impl ColorType {
    /// Create colour type from its IHDR value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ColorType::Grayscale),
            2 => Some(ColorType::Rgb),
            3 => Some(ColorType::Indexed),
            4 => Some(ColorType::GrayscaleAlpha),
            6 => Some(ColorType::Rgba),
            _ => None,
        }
    }

    /// Get number of channels per pixel.
    pub fn channels(&self) -> u8 {
        match self {
            ColorType::Grayscale => 1,
            ColorType::Rgb => 3,
            ColorType::Indexed => 1,
            ColorType::GrayscaleAlpha => 2,
            ColorType::Rgba => 4,
        }
    }

    /// Check whether the bit depth is allowed for this colour type.
    pub fn allows_bit_depth(&self, bit_depth: u8) -> bool {
        match self {
            ColorType::Grayscale => matches!(bit_depth, 1 | 2 | 4 | 8 | 16),
            ColorType::Rgb => matches!(bit_depth, 8 | 16),
            ColorType::Indexed => matches!(bit_depth, 1 | 2 | 4 | 8),
            ColorType::GrayscaleAlpha => matches!(bit_depth, 8 | 16),
            ColorType::Rgba => matches!(bit_depth, 8 | 16),
        }
    }
}

/// PNG interlace method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterlaceMethod {
    /// No interlacing.
    None = 0,
    /// Adam7 interlacing.
    Adam7 = 1,
}

impl InterlaceMethod {
    /// Create from the IHDR value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(InterlaceMethod::None),
            1 => Some(InterlaceMethod::Adam7),
            _ => None,
        }
    }
}

/// Decoder configuration.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Maximum allowed width or height in pixels.
    pub max_dimension: u32,
    /// Verify each chunk CRC against the stored value.
    pub verify_crc: bool,
    /// Verify the Adler-32 checksum of the inflated data.
    pub verify_checksums: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_dimension: MAX_IMAGE_DIMENSION,
            verify_crc: true,
            verify_checksums: true,
        }
    }
}

/// Image information parsed from the IHDR and gAMA chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PngInfo {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Bits per sample or palette index.
    pub bit_depth: u8,
    /// Colour type.
    pub color_type: ColorType,
    /// Interlace method.
    pub interlace: InterlaceMethod,
    /// Gamma in 1/100000 units, as stored in the gAMA chunk.
    pub gamma: Option<u32>,
}

impl PngInfo {
    /// Gamma as a floating point value.
    pub fn gamma_scaled(&self) -> Option<f32> {
        self.gamma.map(|g| g as f32 / 100_000.0)
    }

    /// Bytes per packed scanline, excluding the filter byte.
    pub fn row_bytes(&self) -> u64 {
        let bits = self.width as u64 * self.bit_depth as u64 * self.color_type.channels() as u64;
        bits.div_ceil(8)
    }

    /// Bytes per pixel as used by the scanline filters (minimum 1).
    pub fn bytes_per_pixel(&self) -> usize {
        let bits = self.bit_depth as usize * self.color_type.channels() as usize;
        bits.div_ceil(8)
    }

    /// Exact length of the inflated datastream for this image.
    ///
    /// Every scanline carries one filter byte; interlaced images store the
    /// seven Adam7 passes back to back, empty passes omitted entirely.
    pub fn raw_len(&self) -> u64 {
        let (w, h) = (self.width as u64, self.height as u64);
        let bits_per_pixel = self.bit_depth as u64 * self.color_type.channels() as u64;
        match self.interlace {
            InterlaceMethod::None => h * (1 + self.row_bytes()),
            InterlaceMethod::Adam7 => ADAM7_PASSES
                .iter()
                .map(|&(start_x, start_y, step_x, step_y)| {
                    let pass_w = (w + step_x - 1 - start_x) / step_x;
                    let pass_h = (h + step_y - 1 - start_y) / step_y;
                    if pass_w == 0 || pass_h == 0 {
                        0
                    } else {
                        pass_h * (1 + (pass_w * bits_per_pixel).div_ceil(8))
                    }
                })
                .sum(),
        }
    }
}

/// A decoded image.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// Header information.
    pub info: PngInfo,
    /// Palette entries, when a PLTE chunk was present.
    pub palette: Option<Vec<[u8; 3]>>,
    /// Inflated datastream: filtered scanlines, exactly as compressed.
    pub raw: Vec<u8>,
    /// Defiltered scanlines without filter bytes.
    ///
    /// Empty for interlaced images, whose passes are returned in `raw`
    /// without de-interleaving.
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    /// Image width in pixels.
    pub fn width(&self) -> u32 {
        self.info.width
    }

    /// Image height in pixels.
    pub fn height(&self) -> u32 {
        self.info.height
    }
}

/// PNG decoder.
///
/// Walks the chunk sequence, enforcing the ordering and multiplicity rules
/// of PNG 1.2, accumulates the IDAT payloads, and inflates and defilters
/// them once IEND is reached. A decoder value is reusable; every call to
/// [`decode`](Self::decode) starts from a clean state.
#[derive(Debug, Default)]
pub struct PngDecoder {
    config: DecoderConfig,
    info: Option<PngInfo>,
    palette: Option<Vec<[u8; 3]>>,
    compressed: Vec<u8>,
    idat_count: u32,
    idat_done: bool,
}

impl PngDecoder {
    /// Create a decoder with the default configuration.
    pub fn new() -> Self {
        Self::with_config(DecoderConfig::default())
    }

    /// Create a decoder with an explicit configuration.
    pub fn with_config(config: DecoderConfig) -> Self {
        Self {
            config,
            info: None,
            palette: None,
            compressed: Vec::new(),
            idat_count: 0,
            idat_done: false,
        }
    }

    /// Get the parsed image info, if a decode has progressed past IHDR.
    pub fn info(&self) -> Option<&PngInfo> {
        self.info.as_ref()
    }

    /// Get the accumulated compressed data: the exact concatenation of all
    /// IDAT data fields, in order.
    pub fn compressed_data(&self) -> &[u8] {
        &self.compressed
    }

    /// Decode a complete PNG datastream.
    pub fn decode(&mut self, data: &[u8]) -> Result<DecodedImage> {
        self.reset();

        let mut chunks = ChunkReader::new(data);
        chunks.read_signature()?;

        loop {
            let chunk = chunks.next_chunk()?;
            debug!(chunk = %chunk.chunk_type, length = chunk.length, "processing chunk");

            if self.config.verify_crc {
                let computed = chunk_crc(chunk.chunk_type, chunk.data);
                if computed != chunk.crc {
                    return Err(PngError::CrcMismatch {
                        chunk: chunk.chunk_type,
                        stored: chunk.crc,
                        computed,
                    });
                }
            }

            if self.info.is_none() && chunk.chunk_type != ChunkType::IHDR {
                return Err(PngError::IhdrNotFound);
            }
            if self.idat_count > 0 && chunk.chunk_type != ChunkType::IDAT {
                self.idat_done = true;
            }

            match chunk.chunk_type {
                ChunkType::IHDR => self.process_ihdr(&chunk)?,
                ChunkType::GAMA => self.process_gama(&chunk)?,
                ChunkType::PLTE => self.process_plte(&chunk)?,
                ChunkType::IDAT => self.process_idat(&chunk)?,
                ChunkType::IEND => {
                    self.check_end_state()?;
                    break;
                }
                other if other.is_ancillary() => {
                    debug!(chunk = %other, "skipping ancillary chunk");
                }
                other => {
                    return Err(PngError::InvalidFile(format!(
                        "unsupported critical chunk {other}"
                    )));
                }
            }
        }

        let info = self.info.clone().ok_or(PngError::IhdrNotFound)?;
        let expected = usize::try_from(info.raw_len()).map_err(|_| PngError::OutOfMemory)?;

        let raw = zlib_decompress(&self.compressed, expected, self.config.verify_checksums)?;
        if raw.len() != expected {
            return Err(PngError::CorruptedFile);
        }

        let pixels = if info.interlace == InterlaceMethod::None {
            defilter(
                &raw,
                info.height as usize,
                info.row_bytes() as usize,
                info.bytes_per_pixel(),
            )?
        } else {
            Vec::new()
        };

        Ok(DecodedImage {
            info,
            palette: self.palette.take(),
            raw,
            pixels,
        })
    }

    fn reset(&mut self) {
        self.info = None;
        self.palette = None;
        self.compressed.clear();
        self.idat_count = 0;
        self.idat_done = false;
    }

    fn process_ihdr(&mut self, chunk: &RawChunk<'_>) -> Result<()> {
        if self.info.is_some() {
            return Err(PngError::MultipleIhdr);
        }
        if chunk.length != IHDR_LENGTH {
            return Err(PngError::CorruptIhdr);
        }

        let width = BigEndian::read_u32(&chunk.data[0..]);
        let height = BigEndian::read_u32(&chunk.data[4..]);
        let bit_depth = chunk.data[8];
        let colour_type = chunk.data[9];
        let compression_method = chunk.data[10];
        let filter_method = chunk.data[11];
        let interlace_method = chunk.data[12];

        let color_type =
            ColorType::from_u8(colour_type).ok_or(PngError::BadColourType(colour_type))?;
        if !matches!(bit_depth, 1 | 2 | 4 | 8 | 16) {
            return Err(PngError::BadBitDepth(bit_depth));
        }
        if !color_type.allows_bit_depth(bit_depth) {
            return Err(PngError::BadBitDepthCombination {
                colour_type,
                bit_depth,
            });
        }
        if compression_method != 0 || filter_method != 0 {
            return Err(PngError::CorruptIhdr);
        }
        let interlace = InterlaceMethod::from_u8(interlace_method)
            .ok_or(PngError::BadInterlace(interlace_method))?;

        if width == 0 || height == 0 {
            return Err(PngError::ZeroSize);
        }
        if width > self.config.max_dimension || height > self.config.max_dimension {
            return Err(PngError::ImageTooBig { width, height });
        }

        self.info = Some(PngInfo {
            width,
            height,
            bit_depth,
            color_type,
            interlace,
            gamma: None,
        });
        Ok(())
    }

    fn process_gama(&mut self, chunk: &RawChunk<'_>) -> Result<()> {
        if self.palette.is_some() || self.idat_count > 0 {
            return Err(PngError::GamaAfterPlte);
        }
        let info = self.info.as_mut().ok_or(PngError::IhdrNotFound)?;
        if info.gamma.is_some() {
            return Err(PngError::MultipleGama);
        }
        if chunk.length != 4 {
            return Err(PngError::CorruptedFile);
        }
        info.gamma = Some(BigEndian::read_u32(chunk.data));
        Ok(())
    }

    fn process_plte(&mut self, chunk: &RawChunk<'_>) -> Result<()> {
        let info = self.info.as_ref().ok_or(PngError::IhdrNotFound)?;
        if self.palette.is_some() {
            return Err(PngError::InvalidFile("multiple PLTE chunks".into()));
        }
        if self.idat_count > 0 {
            return Err(PngError::InvalidFile("PLTE chunk after IDAT".into()));
        }
        if matches!(
            info.color_type,
            ColorType::Grayscale | ColorType::GrayscaleAlpha
        ) {
            return Err(PngError::UnexpectedPlte(info.color_type as u8));
        }
        if chunk.data.is_empty() || chunk.data.len() % 3 != 0 || chunk.data.len() > 256 * 3 {
            return Err(PngError::CorruptedFile);
        }

        let palette = chunk
            .data
            .chunks_exact(3)
            .map(|rgb| [rgb[0], rgb[1], rgb[2]])
            .collect();
        self.palette = Some(palette);
        Ok(())
    }

    fn process_idat(&mut self, chunk: &RawChunk<'_>) -> Result<()> {
        if self.idat_done {
            return Err(PngError::InvalidFile("IDAT chunks are not contiguous".into()));
        }
        if chunk.length > IDAT_CHUNK_LIMIT {
            return Err(PngError::IdatSizeLimit(chunk.length));
        }

        self.reserve_compressed(chunk.data.len())?;
        self.compressed.extend_from_slice(chunk.data);
        self.idat_count += 1;
        Ok(())
    }

    /// Validate the rules that can only be judged once IEND arrives.
    fn check_end_state(&self) -> Result<()> {
        let info = self.info.as_ref().ok_or(PngError::IhdrNotFound)?;
        if self.idat_count == 0 {
            return Err(PngError::NoIdat);
        }
        if info.color_type == ColorType::Indexed && self.palette.is_none() {
            return Err(PngError::NoPlte);
        }
        Ok(())
    }

    /// Grow the compressed accumulator by doubling from a 4 KiB floor.
    fn reserve_compressed(&mut self, additional: usize) -> Result<()> {
        let needed = self.compressed.len() + additional;
        if needed <= self.compressed.capacity() {
            return Ok(());
        }
        let mut target = self.compressed.capacity().max(IDAT_INITIAL_CAPACITY);
        while target < needed {
            target *= 2;
        }
        self.compressed
            .try_reserve_exact(target - self.compressed.len())
            .map_err(|_| PngError::MemoryError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_info(width: u32, height: u32, bit_depth: u8, interlace: InterlaceMethod) -> PngInfo {
        PngInfo {
            width,
            height,
            bit_depth,
            color_type: ColorType::Grayscale,
            interlace,
            gamma: None,
        }
    }

    #[test]
    fn test_color_type() {
        assert_eq!(ColorType::from_u8(0), Some(ColorType::Grayscale));
        assert_eq!(ColorType::from_u8(6), Some(ColorType::Rgba));
        assert_eq!(ColorType::from_u8(1), None);
        assert_eq!(ColorType::from_u8(5), None);

        assert_eq!(ColorType::Rgb.channels(), 3);
        assert_eq!(ColorType::Indexed.channels(), 1);
        assert!(ColorType::Indexed.allows_bit_depth(8));
        assert!(!ColorType::Indexed.allows_bit_depth(16));
        assert!(!ColorType::Rgb.allows_bit_depth(4));
    }

    #[test]
    fn test_config_defaults() {
        let config = DecoderConfig::default();
        assert_eq!(config.max_dimension, 1 << 24);
        assert!(config.verify_crc);
        assert!(config.verify_checksums);
    }

    #[test]
    fn test_row_bytes() {
        // 1-bit grayscale packs 8 pixels per byte.
        assert_eq!(gray_info(32, 32, 1, InterlaceMethod::None).row_bytes(), 4);
        assert_eq!(gray_info(33, 1, 1, InterlaceMethod::None).row_bytes(), 5);

        let rgb16 = PngInfo {
            width: 3,
            height: 1,
            bit_depth: 16,
            color_type: ColorType::Rgb,
            interlace: InterlaceMethod::None,
            gamma: None,
        };
        assert_eq!(rgb16.row_bytes(), 18);
        assert_eq!(rgb16.bytes_per_pixel(), 6);
    }

    #[test]
    fn test_raw_len_non_interlaced() {
        let info = gray_info(32, 32, 1, InterlaceMethod::None);
        assert_eq!(info.raw_len(), 32 * (1 + 4));
    }

    #[test]
    fn test_raw_len_adam7_single_pixel() {
        // A 1x1 interlaced image has data only in pass 1.
        let info = gray_info(1, 1, 8, InterlaceMethod::Adam7);
        assert_eq!(info.raw_len(), 2);
    }

    #[test]
    fn test_raw_len_adam7_8x8() {
        // 8x8 8-bit grayscale: every pass is exactly its nominal size.
        let info = gray_info(8, 8, 8, InterlaceMethod::Adam7);
        // Passes (w x h): 1x1, 1x1, 2x1, 2x2, 4x2, 4x4, 8x4.
        let expected = (1 + 1)
            + (1 + 1)
            + (2 + 1)
            + 2 * (2 + 1)
            + 2 * (4 + 1)
            + 4 * (4 + 1)
            + 4 * (8 + 1);
        assert_eq!(info.raw_len(), expected as u64);
    }

    #[test]
    fn test_gamma_scaled() {
        let mut info = gray_info(1, 1, 8, InterlaceMethod::None);
        assert_eq!(info.gamma_scaled(), None);
        info.gamma = Some(45455);
        assert!((info.gamma_scaled().unwrap() - 0.45455).abs() < 1e-6);
    }

    #[test]
    fn test_decoder_starts_empty() {
        let decoder = PngDecoder::new();
        assert!(decoder.info().is_none());
        assert!(decoder.compressed_data().is_empty());
    }
}
