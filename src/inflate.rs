//! Zlib envelope parsing and DEFLATE decompression.
//!
//! The decompressor takes the full compressed buffer (PNG supplies it as the
//! concatenation of all IDAT data fields) and inflates it in one call. The
//! 32 KiB LZ77 window is implicit in the output buffer: back-references are
//! always resolved against bytes already emitted.

use tracing::trace;

use crate::bitstream::BitReader;
use crate::error::{PngError, Result};
use crate::huffman::HuffmanTable;
use crate::tables::{
    CODE_LENGTH_ORDER, DIST_BASES, DIST_EXTRA, END_OF_BLOCK, FIXED_DISTANCE_LENGTHS,
    FIXED_LITERAL_LENGTHS, LENGTH_BASES, LENGTH_EXTRA, MAX_DIST_SYMBOL, MAX_LENGTH_SYMBOL,
};

/// Decompress a zlib stream (RFC 1950 envelope around RFC 1951 DEFLATE).
///
/// `output_limit` is the exact number of bytes the caller expects; a stream
/// that tries to produce more fails with `OutOfMemory` so a hostile input
/// cannot inflate beyond what the image header declares. When
/// `verify_checksums` is set the Adler-32 trailer is checked against the
/// inflated output.
pub fn zlib_decompress(data: &[u8], output_limit: usize, verify_checksums: bool) -> Result<Vec<u8>> {
    if data.len() < 2 {
        return Err(PngError::ZlibHeaderCorrupted);
    }
    let cmf = data[0];
    let flg = data[1];
    if (cmf as u32 * 256 + flg as u32) % 31 != 0 {
        return Err(PngError::ZlibHeaderCorrupted);
    }
    let cm = cmf & 0x0F;
    if cm != 8 {
        return Err(PngError::ZlibCompression(cm));
    }
    let cinfo = cmf >> 4;
    if cinfo > 7 {
        return Err(PngError::InvalidZlibValue(cinfo));
    }
    if flg & 0x20 != 0 {
        return Err(PngError::PresetDict);
    }

    let mut output = Vec::new();
    output
        .try_reserve_exact(output_limit)
        .map_err(|_| PngError::MemoryError)?;

    let mut reader = BitReader::new(&data[2..]);
    inflate(&mut reader, &mut output, output_limit)?;

    if verify_checksums {
        reader.align_to_byte();
        let mut trailer = Vec::with_capacity(4);
        reader.copy_aligned(4, &mut trailer)?;
        let stored = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let computed = adler32(&output);
        if stored != computed {
            return Err(PngError::CorruptedFile);
        }
    }

    Ok(output)
}

/// Decode DEFLATE blocks until the final block has been processed.
fn inflate(reader: &mut BitReader<'_>, output: &mut Vec<u8>, limit: usize) -> Result<()> {
    loop {
        let bfinal = reader.get_bits(1)?;
        let btype = reader.get_bits(2)?;
        trace!(bfinal, btype, "deflate block");

        match btype {
            0 => stored_block(reader, output, limit)?,
            1 => {
                let literals = HuffmanTable::build(&FIXED_LITERAL_LENGTHS)?;
                let distances = HuffmanTable::build(&FIXED_DISTANCE_LENGTHS)?;
                decode_block(reader, &literals, &distances, output, limit)?;
            }
            2 => {
                let (literals, distances) = dynamic_tables(reader)?;
                decode_block(reader, &literals, &distances, output, limit)?;
            }
            _ => return Err(PngError::CorruptedFile),
        }

        if bfinal == 1 {
            return Ok(());
        }
    }
}

/// BTYPE 00: uncompressed bytes preceded by LEN and its complement.
fn stored_block(reader: &mut BitReader<'_>, output: &mut Vec<u8>, limit: usize) -> Result<()> {
    reader.align_to_byte();
    let len = reader.get_bits(16)? as usize;
    let nlen = reader.get_bits(16)? as usize;
    if len != !nlen & 0xFFFF {
        return Err(PngError::CorruptedFile);
    }
    if output.len() + len > limit {
        return Err(PngError::OutOfMemory);
    }
    reader.copy_aligned(len, output)
}

/// BTYPE 10: read the code-length code, expand the transmitted lengths, and
/// build the literal/length and distance tables.
fn dynamic_tables(reader: &mut BitReader<'_>) -> Result<(HuffmanTable, HuffmanTable)> {
    let hlit = reader.get_bits(5)? as usize + 257;
    let hdist = reader.get_bits(5)? as usize + 1;
    let hclen = reader.get_bits(4)? as usize + 4;

    let mut cl_lens = [0u8; 19];
    for i in 0..hclen {
        cl_lens[CODE_LENGTH_ORDER[i]] = reader.get_bits(3)? as u8;
    }
    let cl_table = HuffmanTable::build(&cl_lens)?;

    let total = hlit + hdist;
    let mut lens: Vec<u8> = Vec::with_capacity(total);
    while lens.len() < total {
        let symbol = cl_table.decode(reader)?;
        match symbol {
            0..=15 => lens.push(symbol as u8),
            16 => {
                let prev = *lens.last().ok_or(PngError::CorruptedFile)?;
                let repeat = 3 + reader.get_bits(2)? as usize;
                if lens.len() + repeat > total {
                    return Err(PngError::BadHuffmanCodeLengths);
                }
                for _ in 0..repeat {
                    lens.push(prev);
                }
            }
            17 => {
                let repeat = 3 + reader.get_bits(3)? as usize;
                if lens.len() + repeat > total {
                    return Err(PngError::BadHuffmanCodeLengths);
                }
                lens.resize(lens.len() + repeat, 0);
            }
            18 => {
                let repeat = 11 + reader.get_bits(7)? as usize;
                if lens.len() + repeat > total {
                    return Err(PngError::BadHuffmanCodeLengths);
                }
                lens.resize(lens.len() + repeat, 0);
            }
            _ => return Err(PngError::CorruptedFile),
        }
    }

    let literals = HuffmanTable::build(&lens[..hlit])?;
    let distances = HuffmanTable::build(&lens[hlit..])?;
    Ok((literals, distances))
}

/// The common literal/length decode loop shared by fixed and dynamic blocks.
fn decode_block(
    reader: &mut BitReader<'_>,
    literals: &HuffmanTable,
    distances: &HuffmanTable,
    output: &mut Vec<u8>,
    limit: usize,
) -> Result<()> {
    loop {
        let symbol = literals.decode(reader)?;
        if symbol < END_OF_BLOCK {
            if output.len() >= limit {
                return Err(PngError::OutOfMemory);
            }
            output.push(symbol as u8);
        } else if symbol == END_OF_BLOCK {
            return Ok(());
        } else {
            if symbol > MAX_LENGTH_SYMBOL {
                return Err(PngError::CorruptedFile);
            }
            let index = (symbol - 257) as usize;
            let length =
                LENGTH_BASES[index] as usize + reader.get_bits(LENGTH_EXTRA[index] as u32)? as usize;

            let dist_symbol = distances.decode(reader)?;
            if dist_symbol > MAX_DIST_SYMBOL {
                return Err(PngError::CorruptedFile);
            }
            let index = dist_symbol as usize;
            let distance =
                DIST_BASES[index] as usize + reader.get_bits(DIST_EXTRA[index] as u32)? as usize;

            if distance > output.len() {
                return Err(PngError::CorruptedFile);
            }
            if output.len() + length > limit {
                return Err(PngError::OutOfMemory);
            }
            // One byte at a time: with distance < length the copy reads
            // bytes it has just written, which is the DEFLATE RLE trick.
            for _ in 0..length {
                let byte = output[output.len() - distance];
                output.push(byte);
            }
        }
    }
}

/// Adler-32 checksum (RFC 1950 §8).
pub fn adler32(data: &[u8]) -> u32 {
    const MOD_ADLER: u32 = 65521;
    let mut a = 1u32;
    let mut b = 0u32;
    for &byte in data {
        a = (a + byte as u32) % MOD_ADLER;
        b = (b + a) % MOD_ADLER;
    }
    (b << 16) | a
}
