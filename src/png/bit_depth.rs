//! Sample packing and bit-depth arithmetic.
//!
//! Samples below 8 bits are packed MSB-first, 16-bit samples are big-endian.
//! Scaling between depths uses bit replication, so a reduction is lossless
//! exactly when every sample lies on the smaller depth's replication grid.

/// Unpack `count` samples of `bit_depth` bits from a scanline.
pub fn unpack_samples(row: &[u8], bit_depth: u8, count: usize) -> Vec<u16> {
    match bit_depth {
        8 => row.iter().take(count).map(|&b| b as u16).collect(),
        16 => row
            .chunks_exact(2)
            .take(count)
            .map(|p| u16::from_be_bytes([p[0], p[1]]))
            .collect(),
        1 | 2 | 4 => {
            let bits = bit_depth as usize;
            let per_byte = 8 / bits;
            let mask = (1u16 << bits) - 1;
            (0..count)
                .map(|i| {
                    let byte = row.get(i / per_byte).copied().unwrap_or(0) as u16;
                    let shift = 8 - bits * (i % per_byte + 1);
                    (byte >> shift) & mask
                })
                .collect()
        }
        _ => Vec::new(),
    }
}

/// Pack samples into a scanline at `bit_depth`, padding the last byte with zeros.
pub fn pack_samples(samples: &[u16], bit_depth: u8) -> Vec<u8> {
    match bit_depth {
        8 => samples.iter().map(|&s| s as u8).collect(),
        16 => samples.iter().flat_map(|s| s.to_be_bytes()).collect(),
        1 | 2 | 4 => pack_bits(samples, bit_depth),
        _ => Vec::new(),
    }
}

/// Pack sub-byte samples MSB-first.
pub fn pack_bits(data: &[u16], bits: u8) -> Vec<u8> {
    debug_assert!(
        matches!(bits, 1 | 2 | 4),
        "pack_bits expected bit depth 1, 2, or 4"
    );
    let mut out = Vec::with_capacity((data.len() * bits as usize).div_ceil(8));
    let mut acc: u8 = 0;
    let mut acc_bits = 0;
    let mask = (1u16 << bits) - 1;
    for &v in data {
        acc = (acc << bits) | (v & mask) as u8;
        acc_bits += bits as usize;
        if acc_bits == 8 {
            out.push(acc);
            acc = 0;
            acc_bits = 0;
        }
    }
    if acc_bits > 0 {
        acc <<= 8 - acc_bits;
        out.push(acc);
    }
    out
}

/// Largest sample value at `bit_depth`.
#[inline]
pub const fn max_value(bit_depth: u8) -> u16 {
    if bit_depth >= 16 {
        u16::MAX
    } else {
        (1u16 << bit_depth) - 1
    }
}

/// Scale a sample to 16 bits by bit replication.
#[inline]
pub fn scale_to_16(sample: u16, bit_depth: u8) -> u16 {
    match bit_depth {
        16 => sample,
        8 => sample * 257,
        4 => sample * 4369,
        2 => sample * 21845,
        1 => sample * 65535,
        _ => sample,
    }
}

/// Scale a sample down to `to` bits, if it sits exactly on that depth's grid.
///
/// `value` is given at `from` bits. Returns `None` when the reduction would
/// lose information.
pub fn exact_downscale(value: u16, from: u8, to: u8) -> Option<u16> {
    if to >= from {
        return Some(value);
    }
    let reduced = value >> (from - to);
    let back = rescale(reduced, to, from);
    (back == value).then_some(reduced)
}

/// Rescale a sample from `from` bits to `to` bits by bit replication.
pub fn rescale(value: u16, from: u8, to: u8) -> u16 {
    if from == to {
        return value;
    }
    let wide = scale_to_16(value, from) as u32;
    // Every 1/2/4/8-bit sample replicates evenly into 16 bits; dropping the
    // low bits inverts that for any target depth.
    (wide >> (16 - to as u32)) as u16
}

/// Smallest gray bit depth that represents every (`from`-bit) sample exactly.
pub fn min_gray_depth<I>(samples: I, from: u8) -> u8
where
    I: IntoIterator<Item = u16>,
{
    let candidates: &[u8] = &[1, 2, 4, 8, 16];
    let mut best_index = 0;
    for v in samples {
        while candidates[best_index] < from
            && exact_downscale(v, from, candidates[best_index]).is_none()
        {
            best_index += 1;
        }
        if candidates[best_index] >= from {
            return from;
        }
    }
    candidates[best_index].min(from)
}

/// Smallest palette bit depth for `len` entries.
pub fn palette_bit_depth(len: usize) -> u8 {
    if len <= 2 {
        1
    } else if len <= 4 {
        2
    } else if len <= 16 {
        4
    } else {
        8
    }
}
