//! PNG filtering implementation.
//!
//! PNG uses filtering to improve compression by exploiting correlations
//! between adjacent pixels. Each filtered row is prefixed with its filter
//! type byte; [`unfilter_row`] reverses the transformation in place.

use crate::error::{Error, Result};

/// Filter type bytes as defined by the PNG format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FilterType {
    /// Bytes unchanged.
    None = 0,
    /// Difference from the pixel to the left.
    Sub = 1,
    /// Difference from the pixel above.
    Up = 2,
    /// Difference from the mean of left and above.
    Average = 3,
    /// Difference from the Paeth predictor.
    Paeth = 4,
}

impl FilterType {
    /// All filter types in byte order.
    pub const ALL: [FilterType; 5] = [
        FilterType::None,
        FilterType::Sub,
        FilterType::Up,
        FilterType::Average,
        FilterType::Paeth,
    ];

    /// Parse a filter type byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.get(byte as usize).copied()
    }
}

/// How the filter of each row is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterStrategy {
    /// Same filter on every row.
    Fixed(FilterType),
    /// Per row, the filter with the smallest sum of absolute signed bytes.
    MinSum,
    /// Per row, the filter whose output has the lowest byte entropy.
    Entropy,
    /// Per row, the filter producing the fewest distinct byte pairs.
    Bigrams,
}

impl FilterStrategy {
    /// Short label used in logs and reports.
    pub fn label(self) -> &'static str {
        match self {
            FilterStrategy::Fixed(FilterType::None) => "none",
            FilterStrategy::Fixed(FilterType::Sub) => "sub",
            FilterStrategy::Fixed(FilterType::Up) => "up",
            FilterStrategy::Fixed(FilterType::Average) => "average",
            FilterStrategy::Fixed(FilterType::Paeth) => "paeth",
            FilterStrategy::MinSum => "minsum",
            FilterStrategy::Entropy => "entropy",
            FilterStrategy::Bigrams => "bigrams",
        }
    }
}

impl std::fmt::Display for FilterStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Scratch buffers reused across rows to avoid per-row allocations.
struct Scratch {
    candidates: [Vec<u8>; 5],
    bigrams: Vec<u64>,
}

impl Scratch {
    fn new(row_len: usize) -> Self {
        Self {
            candidates: std::array::from_fn(|_| Vec::with_capacity(row_len)),
            bigrams: Vec::new(),
        }
    }
}

/// Stateful row filterer for one image (or one Adam7 pass).
///
/// Remembers the previous unfiltered row so rows can be fed one at a time.
pub struct RowFilter {
    strategy: FilterStrategy,
    bpp: usize,
    prev: Vec<u8>,
    scratch: Scratch,
}

impl RowFilter {
    /// Create a filterer for rows of `row_len` bytes with `bpp` bytes per pixel.
    pub fn new(strategy: FilterStrategy, bpp: usize, row_len: usize) -> Self {
        Self {
            strategy,
            bpp: bpp.max(1),
            prev: vec![0; row_len],
            scratch: Scratch::new(row_len),
        }
    }

    /// Start a new image or pass whose rows are `row_len` bytes.
    pub fn reset(&mut self, row_len: usize) {
        self.prev.clear();
        self.prev.resize(row_len, 0);
    }

    /// Filter `row` and append the filter byte plus filtered bytes to `output`.
    pub fn filter(&mut self, row: &[u8], output: &mut Vec<u8>) {
        if self.prev.len() != row.len() {
            self.reset(row.len());
        }
        match self.strategy {
            FilterStrategy::Fixed(filter) => {
                output.push(filter as u8);
                apply_filter(filter, row, &self.prev, self.bpp, output);
            }
            heuristic => {
                let best = choose_filter(heuristic, row, &self.prev, self.bpp, &mut self.scratch);
                output.push(best as u8);
                output.extend_from_slice(&self.scratch.candidates[best as usize]);
            }
        }
        self.prev.clear();
        self.prev.extend_from_slice(row);
    }
}

/// Filter a whole image in one call (no interlacing).
pub fn filter_rows(rows: &[Vec<u8>], bpp: usize, strategy: FilterStrategy) -> Vec<u8> {
    let row_len = rows.first().map_or(0, Vec::len);
    let mut filter = RowFilter::new(strategy, bpp, row_len);
    let mut output = Vec::with_capacity((row_len + 1) * rows.len());
    for row in rows {
        filter.filter(row, &mut output);
    }
    output
}

fn apply_filter(filter: FilterType, row: &[u8], prev: &[u8], bpp: usize, output: &mut Vec<u8>) {
    match filter {
        FilterType::None => output.extend_from_slice(row),
        FilterType::Sub => filter_sub(row, bpp, output),
        FilterType::Up => filter_up(row, prev, output),
        FilterType::Average => filter_average(row, prev, bpp, output),
        FilterType::Paeth => filter_paeth(row, prev, bpp, output),
    }
}

/// Try every filter, leaving each result in the scratch buffers, and return the best.
fn choose_filter(
    strategy: FilterStrategy,
    row: &[u8],
    prev: &[u8],
    bpp: usize,
    scratch: &mut Scratch,
) -> FilterType {
    let mut best = FilterType::None;
    let mut best_score = u64::MAX;
    // MinSum stops once a candidate is already close to zero.
    let early_stop = (row.len() as u64 / 4).saturating_add(1);

    for filter in FilterType::ALL {
        let buf = &mut scratch.candidates[filter as usize];
        buf.clear();
        apply_filter(filter, row, prev, bpp, buf);
        let score = match strategy {
            FilterStrategy::MinSum => score_sum(buf),
            FilterStrategy::Entropy => score_entropy(buf),
            FilterStrategy::Bigrams => score_bigrams(buf, &mut scratch.bigrams),
            FilterStrategy::Fixed(_) => 0,
        };
        if score < best_score {
            best_score = score;
            best = filter;
            if best_score == 0
                || (strategy == FilterStrategy::MinSum && best_score <= early_stop)
            {
                break;
            }
        }
    }
    best
}

/// Sub filter: difference from left pixel.
fn filter_sub(row: &[u8], bpp: usize, output: &mut Vec<u8>) {
    for (i, &byte) in row.iter().enumerate() {
        let left = if i >= bpp { row[i - bpp] } else { 0 };
        output.push(byte.wrapping_sub(left));
    }
}

/// Up filter: difference from above pixel.
fn filter_up(row: &[u8], prev_row: &[u8], output: &mut Vec<u8>) {
    for (i, &byte) in row.iter().enumerate() {
        output.push(byte.wrapping_sub(prev_row[i]));
    }
}

/// Average filter: difference from average of left and above.
fn filter_average(row: &[u8], prev_row: &[u8], bpp: usize, output: &mut Vec<u8>) {
    for (i, &byte) in row.iter().enumerate() {
        let left = if i >= bpp { row[i - bpp] as u16 } else { 0 };
        let above = prev_row[i] as u16;
        output.push(byte.wrapping_sub(((left + above) / 2) as u8));
    }
}

/// Paeth filter: difference from Paeth predictor.
fn filter_paeth(row: &[u8], prev_row: &[u8], bpp: usize, output: &mut Vec<u8>) {
    for (i, &byte) in row.iter().enumerate() {
        let left = if i >= bpp { row[i - bpp] } else { 0 };
        let above = prev_row[i];
        let upper_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
        output.push(byte.wrapping_sub(paeth_predictor(left, above, upper_left)));
    }
}

/// Paeth predictor function.
///
/// Selects the value (a, b, or c) closest to p = a + b - c.
#[inline]
fn paeth_predictor(a: u8, b: u8, c: u8) -> u8 {
    let a_i = a as i16;
    let b_i = b as i16;
    let c_i = c as i16;

    let p = a_i + b_i - c_i;
    let pa = (p - a_i).abs();
    let pb = (p - b_i).abs();
    let pc = (p - c_i).abs();

    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Sum of absolute values, reading filtered bytes as signed.
///
/// Lower scores typically result in better compression.
#[inline]
fn score_sum(filtered: &[u8]) -> u64 {
    filtered
        .iter()
        .map(|&b| (b as i8).unsigned_abs() as u64)
        .sum()
}

/// Shannon entropy of the byte histogram, in millibits per row.
fn score_entropy(filtered: &[u8]) -> u64 {
    if filtered.is_empty() {
        return 0;
    }
    let mut hist = [0u32; 256];
    for &b in filtered {
        hist[b as usize] += 1;
    }
    let n = filtered.len() as f64;
    let bits: f64 = hist
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let c = c as f64;
            -c * (c / n).log2()
        })
        .sum();
    (bits * 1000.0) as u64
}

/// Number of distinct adjacent byte pairs.
fn score_bigrams(filtered: &[u8], seen: &mut Vec<u64>) -> u64 {
    seen.clear();
    seen.resize(65536 / 64, 0);
    let mut distinct = 0u64;
    for w in filtered.windows(2) {
        let key = (w[0] as usize) << 8 | w[1] as usize;
        let (word, bit) = (key / 64, 1u64 << (key % 64));
        if seen[word] & bit == 0 {
            seen[word] |= bit;
            distinct += 1;
        }
    }
    distinct
}

/// Reverse the filter of one row in place, given the previous reconstructed row.
pub fn unfilter_row(filter_byte: u8, row: &mut [u8], prev: &[u8], bpp: usize) -> Result<()> {
    let filter = FilterType::from_byte(filter_byte)
        .ok_or_else(|| Error::Format(format!("unknown filter type {filter_byte}")))?;
    let bpp = bpp.max(1);
    match filter {
        FilterType::None => {}
        FilterType::Sub => {
            for i in bpp..row.len() {
                row[i] = row[i].wrapping_add(row[i - bpp]);
            }
        }
        FilterType::Up => {
            for (b, &above) in row.iter_mut().zip(prev) {
                *b = b.wrapping_add(above);
            }
        }
        FilterType::Average => {
            for i in 0..row.len() {
                let left = if i >= bpp { row[i - bpp] as u16 } else { 0 };
                let above = prev[i] as u16;
                row[i] = row[i].wrapping_add(((left + above) / 2) as u8);
            }
        }
        FilterType::Paeth => {
            for i in 0..row.len() {
                let left = if i >= bpp { row[i - bpp] } else { 0 };
                let upper_left = if i >= bpp { prev[i - bpp] } else { 0 };
                row[i] = row[i].wrapping_add(paeth_predictor(left, prev[i], upper_left));
            }
        }
    }
    Ok(())
}
