//! Adam7 interlacing.
//!
//! ```text
//! 1 6 4 6 2 6 4 6
//! 7 7 7 7 7 7 7 7
//! 5 6 5 6 5 6 5 6
//! 7 7 7 7 7 7 7 7
//! 3 6 4 6 3 6 4 6
//! 7 7 7 7 7 7 7 7
//! 5 6 5 6 5 6 5 6
//! 7 7 7 7 7 7 7 7
//! ```
//!
//! Passes are extracted from and merged into full-resolution scanlines at any
//! bits-per-pixel, including packed sub-byte samples.

/// One of the seven reduced images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pass {
    /// First column sampled.
    pub x_start: u32,
    /// First row sampled.
    pub y_start: u32,
    /// Column step.
    pub x_step: u32,
    /// Row step.
    pub y_step: u32,
}

/// The seven passes in transmission order.
pub const PASSES: [Pass; 7] = [
    Pass {
        x_start: 0,
        y_start: 0,
        x_step: 8,
        y_step: 8,
    },
    Pass {
        x_start: 4,
        y_start: 0,
        x_step: 8,
        y_step: 8,
    },
    Pass {
        x_start: 0,
        y_start: 4,
        x_step: 4,
        y_step: 8,
    },
    Pass {
        x_start: 2,
        y_start: 0,
        x_step: 4,
        y_step: 4,
    },
    Pass {
        x_start: 0,
        y_start: 2,
        x_step: 2,
        y_step: 4,
    },
    Pass {
        x_start: 1,
        y_start: 0,
        x_step: 2,
        y_step: 2,
    },
    Pass {
        x_start: 0,
        y_start: 1,
        x_step: 1,
        y_step: 2,
    },
];

impl Pass {
    /// Dimensions of this reduced image. Either may be zero for small images.
    pub fn dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        if width <= self.x_start || height <= self.y_start {
            return (0, 0);
        }
        (
            (width - self.x_start).div_ceil(self.x_step),
            (height - self.y_start).div_ceil(self.y_step),
        )
    }
}

/// Pass dimensions for an image, in pass order.
pub fn pass_dimensions(width: u32, height: u32) -> [(u32, u32); 7] {
    PASSES.map(|p| p.dimensions(width, height))
}

#[inline]
fn get_pixel(row: &[u8], x: usize, bpp_bits: usize, out: &mut Vec<u8>) -> Option<u8> {
    if bpp_bits >= 8 {
        let bytes = bpp_bits / 8;
        out.extend_from_slice(&row[x * bytes..(x + 1) * bytes]);
        None
    } else {
        let bit = x * bpp_bits;
        let shift = 8 - bpp_bits - bit % 8;
        Some((row[bit / 8] >> shift) & ((1u8 << bpp_bits) - 1))
    }
}

/// Packs sub-byte pixels into a row buffer MSB-first.
struct BitWriter {
    bits: usize,
    acc: u8,
    filled: usize,
}

impl BitWriter {
    fn new(bits: usize) -> Self {
        Self {
            bits,
            acc: 0,
            filled: 0,
        }
    }

    fn push(&mut self, value: u8, out: &mut Vec<u8>) {
        self.acc |= value << (8 - self.bits - self.filled);
        self.filled += self.bits;
        if self.filled == 8 {
            out.push(self.acc);
            self.acc = 0;
            self.filled = 0;
        }
    }

    fn finish(self, out: &mut Vec<u8>) {
        if self.filled > 0 {
            out.push(self.acc);
        }
    }
}

/// Extract the scanlines of one pass from full-resolution scanlines.
pub fn extract_pass(scanlines: &[Vec<u8>], width: u32, bpp_bits: usize, pass: &Pass) -> Vec<Vec<u8>> {
    let height = scanlines.len() as u32;
    let (pw, ph) = pass.dimensions(width, height);
    if pw == 0 || ph == 0 {
        return Vec::new();
    }
    let row_len = (pw as usize * bpp_bits).div_ceil(8);
    (0..ph)
        .map(|py| {
            let src = &scanlines[(pass.y_start + py * pass.y_step) as usize];
            let mut out = Vec::with_capacity(row_len);
            let mut writer = BitWriter::new(bpp_bits.min(8));
            for px in 0..pw {
                let x = (pass.x_start + px * pass.x_step) as usize;
                if let Some(v) = get_pixel(src, x, bpp_bits, &mut out) {
                    writer.push(v, &mut out);
                }
            }
            if bpp_bits < 8 {
                writer.finish(&mut out);
            }
            out
        })
        .collect()
}

/// Write one pass's pixels into full-resolution scanlines.
///
/// `full` must already hold `height` zeroed rows of the full scanline length.
pub fn merge_pass(full: &mut [Vec<u8>], reduced: &[Vec<u8>], width: u32, bpp_bits: usize, pass: &Pass) {
    let height = full.len() as u32;
    let (pw, ph) = pass.dimensions(width, height);
    let mut pixel = Vec::with_capacity(8);
    for py in 0..ph.min(reduced.len() as u32) {
        let src = &reduced[py as usize];
        let dst = &mut full[(pass.y_start + py * pass.y_step) as usize];
        for px in 0..pw as usize {
            let x = (pass.x_start as usize) + px * pass.x_step as usize;
            pixel.clear();
            match get_pixel(src, px, bpp_bits, &mut pixel) {
                None => {
                    let bytes = bpp_bits / 8;
                    dst[x * bytes..(x + 1) * bytes].copy_from_slice(&pixel);
                }
                Some(v) => {
                    let bit = x * bpp_bits;
                    let shift = 8 - bpp_bits - bit % 8;
                    let mask = ((1u8 << bpp_bits) - 1) << shift;
                    dst[bit / 8] = (dst[bit / 8] & !mask) | (v << shift);
                }
            }
        }
    }
}

/// Split full-resolution scanlines into the seven passes.
pub fn interlace(scanlines: &[Vec<u8>], width: u32, bpp_bits: usize) -> Vec<Vec<Vec<u8>>> {
    PASSES
        .iter()
        .map(|pass| extract_pass(scanlines, width, bpp_bits, pass))
        .collect()
}

/// Reassemble full-resolution scanlines from the seven passes.
pub fn deinterlace(
    passes: &[Vec<Vec<u8>>],
    width: u32,
    height: u32,
    bpp_bits: usize,
) -> Vec<Vec<u8>> {
    let row_len = (width as usize * bpp_bits).div_ceil(8);
    let mut full = vec![vec![0u8; row_len]; height as usize];
    for (pass, reduced) in PASSES.iter().zip(passes) {
        merge_pass(&mut full, reduced, width, bpp_bits, pass);
    }
    full
}
