//! PNG scanline filters (decode side).
//!
//! Every scanline of the inflated stream starts with one filter-type byte.
//! Reconstruction adds a predicted value to each filtered byte, where the
//! prediction draws on up to three reconstructed neighbours: the byte one
//! pixel to the left, the byte directly above, and the byte above-left.
//! Neighbours that fall outside the image read as zero.

use crate::error::{PngError, Result};

/// Scanline filter method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    /// Bytes are stored unmodified.
    None = 0,
    /// Difference from the byte one pixel to the left.
    Sub = 1,
    /// Difference from the byte directly above.
    Up = 2,
    /// Difference from the mean of left and above.
    Average = 3,
    /// Difference from the Paeth prediction of the three neighbours.
    Paeth = 4,
}

impl FilterType {
    /// Parse the filter byte that leads a scanline.
    pub fn from_u8(value: u8) -> Option<Self> {
        const ALL: [FilterType; 5] = [
            FilterType::None,
            FilterType::Sub,
            FilterType::Up,
            FilterType::Average,
            FilterType::Paeth,
        ];
        ALL.into_iter().find(|filter| *filter as u8 == value)
    }

    /// Predict one byte from its reconstructed neighbours.
    fn predict(self, left: u8, up: u8, up_left: u8) -> u8 {
        match self {
            FilterType::None => 0,
            FilterType::Sub => left,
            FilterType::Up => up,
            FilterType::Average => ((left as u16 + up as u16) / 2) as u8,
            FilterType::Paeth => paeth(left, up, up_left),
        }
    }
}

/// Reverse a scanline filter in place.
///
/// `prior` is the reconstructed previous scanline; the first row passes an
/// empty slice so every "above" neighbour reads as zero.
pub fn unfilter_row(filter: FilterType, row: &mut [u8], prior: &[u8], bytes_per_pixel: usize) {
    if filter == FilterType::None {
        return;
    }
    for i in 0..row.len() {
        let left = if i < bytes_per_pixel {
            0
        } else {
            row[i - bytes_per_pixel]
        };
        let up = prior.get(i).copied().unwrap_or(0);
        let up_left = if i < bytes_per_pixel {
            0
        } else {
            prior.get(i - bytes_per_pixel).copied().unwrap_or(0)
        };
        row[i] = row[i].wrapping_add(filter.predict(left, up, up_left));
    }
}

/// Paeth prediction: form the linear estimate `left + up - up_left`, then
/// return whichever neighbour lands closest to it, ties broken in the
/// order left, up, up-left.
fn paeth(left: u8, up: u8, up_left: u8) -> u8 {
    let (a, b, c) = (left as i16, up as i16, up_left as i16);
    let estimate = a + b - c;
    let to_left = (estimate - a).abs();
    let to_up = (estimate - b).abs();
    let to_up_left = (estimate - c).abs();

    if to_left <= to_up && to_left <= to_up_left {
        left
    } else if to_up <= to_up_left {
        up
    } else {
        up_left
    }
}

/// Defilter a whole non-interlaced image.
///
/// `raw` is the inflated stream of `height` scanlines, each one filter byte
/// followed by `row_bytes` data bytes. Returns the packed rows without the
/// filter bytes. An unrecognised filter byte fails with `CorruptedFile`.
pub fn defilter(
    raw: &[u8],
    height: usize,
    row_bytes: usize,
    bytes_per_pixel: usize,
) -> Result<Vec<u8>> {
    if raw.len() != height * (1 + row_bytes) {
        return Err(PngError::CorruptedFile);
    }

    let mut output = Vec::new();
    output
        .try_reserve_exact(height * row_bytes)
        .map_err(|_| PngError::MemoryError)?;

    let mut pos = 0;
    for y in 0..height {
        let filter_type = FilterType::from_u8(raw[pos]).ok_or(PngError::CorruptedFile)?;
        pos += 1;

        output.extend_from_slice(&raw[pos..pos + row_bytes]);
        pos += row_bytes;

        let row_start = y * row_bytes;
        let (done, current) = output.split_at_mut(row_start);
        let prior: &[u8] = if y > 0 {
            &done[row_start - row_bytes..]
        } else {
            &[]
        };
        unfilter_row(filter_type, current, prior, bytes_per_pixel);
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_type() {
        assert_eq!(FilterType::from_u8(0), Some(FilterType::None));
        assert_eq!(FilterType::from_u8(4), Some(FilterType::Paeth));
        assert_eq!(FilterType::from_u8(5), None);
    }

    #[test]
    fn test_unfilter_sub() {
        let mut row = vec![7, 11, 13, 3, 2];
        unfilter_row(FilterType::Sub, &mut row, &[], 3);
        // Bytes past the first pixel add the byte one pixel back.
        assert_eq!(row, vec![7, 11, 13, 10, 13]);
    }

    #[test]
    fn test_unfilter_up() {
        let prior = [40, 50, 60];
        let mut row = vec![1, 2, 3];
        unfilter_row(FilterType::Up, &mut row, &prior, 3);
        assert_eq!(row, vec![41, 52, 63]);
    }

    #[test]
    fn test_unfilter_average() {
        let prior = [10, 20];
        let mut row = vec![5, 5];
        unfilter_row(FilterType::Average, &mut row, &prior, 1);
        // First byte: 5 + (0 + 10)/2 = 10; second: 5 + (10 + 20)/2 = 20.
        assert_eq!(row, vec![10, 20]);
    }

    #[test]
    fn test_unfilter_average_first_row() {
        // Without a prior row the average degenerates to left/2.
        let mut row = vec![10, 5];
        unfilter_row(FilterType::Average, &mut row, &[], 1);
        assert_eq!(row, vec![10, 10]);
    }

    #[test]
    fn test_unfilter_paeth_first_row() {
        // With no previous row the predictor degenerates to the left byte.
        let mut row = vec![100, 10];
        unfilter_row(FilterType::Paeth, &mut row, &[], 1);
        assert_eq!(row, vec![100, 110]);
    }

    #[test]
    fn test_paeth_neighbour_selection() {
        assert_eq!(paeth(0, 0, 0), 0);
        assert_eq!(paeth(100, 100, 100), 100);
        // Estimate is 20 + 50 - 10 = 60; up (50) is closest.
        assert_eq!(paeth(20, 50, 10), 50);
        // Estimate is 10 + 40 - 40 = 10; left (10) wins exactly.
        assert_eq!(paeth(10, 40, 40), 10);
    }

    #[test]
    fn test_defilter_two_rows() {
        // 2x2 grayscale 8-bit: row 0 unfiltered, row 1 Up-filtered.
        let raw = [0, 1, 2, 2, 3, 4];
        let out = defilter(&raw, 2, 2, 1).unwrap();
        assert_eq!(out, vec![1, 2, 4, 6]); // row 1: 3+1, 4+2
    }

    #[test]
    fn test_defilter_rejects_bad_filter_byte() {
        let raw = [9, 1, 2];
        assert_eq!(defilter(&raw, 1, 2, 1).unwrap_err(), PngError::CorruptedFile);
    }

    #[test]
    fn test_defilter_rejects_wrong_length() {
        let raw = [0, 1];
        assert_eq!(defilter(&raw, 1, 2, 1).unwrap_err(), PngError::CorruptedFile);
    }
}
