//! PNG container model.
//!
//! [`ImageDocument`] is the decoded form every pipeline stage works on: the
//! IHDR fields, the palette and transparency records that decoding depends
//! on, one unfiltered scanline per image row (in natural top-to-bottom order,
//! whatever the interlacing of the source), and the ancillary chunks.

pub mod bit_depth;
pub mod chunk;
pub mod filter;
pub mod interlace;
pub mod read;
pub mod write;

use crate::color::ColorType;
use crate::error::{Error, Result};

pub use chunk::{Chunk, ChunkPosition};
pub use read::{decode, read_document, Decoded};
pub use write::{encode, write_document};

/// PNG file signature (magic bytes).
pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Maximum supported image dimension.
pub const MAX_DIMENSION: u32 = 1 << 24;

/// Largest decompressed image stream (filter bytes included) that is decoded.
pub const MAX_IMAGE_BYTES: u64 = 1 << 32;

/// An image decoded into scanlines plus its retained records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDocument {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Bits per sample.
    pub bit_depth: u8,
    /// Color type.
    pub color_type: ColorType,
    /// PLTE entries (required for [`ColorType::Indexed`]).
    pub palette: Option<Vec<[u8; 3]>>,
    /// Raw tRNS payload: per-entry alpha for palettes, a 16-bit key otherwise.
    pub transparency: Option<Vec<u8>>,
    /// Unfiltered scanlines, one per row.
    pub scanlines: Vec<Vec<u8>>,
    /// Ancillary records in file order.
    pub metadata: Vec<Chunk>,
    /// Whether the document is serialized with Adam7 interlacing.
    pub interlaced: bool,
}

impl ImageDocument {
    /// Build a non-interlaced document from scanlines, validating its shape.
    pub fn new(
        width: u32,
        height: u32,
        bit_depth: u8,
        color_type: ColorType,
        scanlines: Vec<Vec<u8>>,
    ) -> Result<Self> {
        let doc = Self {
            width,
            height,
            bit_depth,
            color_type,
            palette: None,
            transparency: None,
            scanlines,
            metadata: Vec::new(),
            interlaced: false,
        };
        doc.validate().map_err(Error::Format)?;
        Ok(doc)
    }

    /// Build a document from tightly packed row-major pixel bytes.
    pub fn from_pixels(
        width: u32,
        height: u32,
        bit_depth: u8,
        color_type: ColorType,
        data: &[u8],
    ) -> Result<Self> {
        let row_len = checked_row_len(width, height, bit_depth, color_type).map_err(Error::Format)?;
        let expected = row_len
            .checked_mul(height as usize)
            .ok_or_else(|| Error::Format("image size overflow".into()))?;
        if data.len() != expected {
            return Err(Error::Format(format!(
                "pixel data length mismatch: expected {expected} bytes, got {}",
                data.len()
            )));
        }
        let scanlines = if row_len == 0 {
            vec![Vec::new(); height as usize]
        } else {
            data.chunks_exact(row_len).map(<[u8]>::to_vec).collect()
        };
        Self::new(width, height, bit_depth, color_type, scanlines)
    }

    /// Attach a palette (and optional tRNS alpha) to an indexed document.
    pub fn with_palette(mut self, palette: Vec<[u8; 3]>, alpha: Option<Vec<u8>>) -> Result<Self> {
        self.palette = Some(palette);
        self.transparency = alpha;
        self.validate().map_err(Error::Format)?;
        Ok(self)
    }

    /// Byte length of every scanline.
    pub fn scanline_len(&self) -> usize {
        self.color_type
            .scanline_len(self.width, self.bit_depth)
            .unwrap_or(0)
    }

    /// Byte distance to the previous pixel for filtering.
    pub fn filter_bpp(&self) -> usize {
        self.color_type.filter_bpp(self.bit_depth)
    }

    /// Bits per pixel.
    pub fn bits_per_pixel(&self) -> usize {
        self.color_type.bits_per_pixel(self.bit_depth)
    }

    /// Number of pixels.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Raw pixel bytes, rows concatenated.
    pub fn pixel_bytes(&self) -> Vec<u8> {
        self.scanlines.concat()
    }

    /// First metadata record with the given chunk type.
    pub fn metadata_chunk(&self, name: &[u8; 4]) -> Option<&Chunk> {
        self.metadata.iter().find(|c| &c.name == name)
    }

    /// Gray color key from tRNS, at native bit depth.
    pub fn gray_key(&self) -> Option<u16> {
        match (self.color_type, self.transparency.as_deref()) {
            (ColorType::Gray, Some([hi, lo, ..])) => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }

    /// RGB color key from tRNS, at native bit depth.
    pub fn rgb_key(&self) -> Option<[u16; 3]> {
        match (self.color_type, self.transparency.as_deref()) {
            (ColorType::Rgb, Some([r0, r1, g0, g1, b0, b1, ..])) => Some([
                u16::from_be_bytes([*r0, *r1]),
                u16::from_be_bytes([*g0, *g1]),
                u16::from_be_bytes([*b0, *b1]),
            ]),
            _ => None,
        }
    }

    /// Whether any pixel can be less than fully opaque.
    pub fn has_transparency(&self) -> bool {
        self.color_type.has_alpha_channel() || self.transparency.is_some()
    }

    /// Native samples of row `y` (one entry per channel per pixel).
    pub fn row_samples(&self, y: usize) -> Vec<u16> {
        bit_depth::unpack_samples(
            &self.scanlines[y],
            self.bit_depth,
            self.width as usize * self.color_type.channels(),
        )
    }

    /// Decode every pixel to 16-bit RGBA.
    ///
    /// This is the reference for pixel equality: two documents that expand to
    /// the same values display identically, whatever their color type or
    /// bit depth.
    pub fn to_rgba16(&self) -> Vec<[u16; 4]> {
        let mut out = Vec::with_capacity(self.pixel_count());
        let depth = self.bit_depth;
        let gray_key = self.gray_key();
        let rgb_key = self.rgb_key();
        let palette = self.palette.as_deref().unwrap_or(&[]);
        let alpha = self.transparency.as_deref().unwrap_or(&[]);

        for y in 0..self.height as usize {
            let samples = self.row_samples(y);
            match self.color_type {
                ColorType::Gray => {
                    for &s in &samples {
                        let v = bit_depth::scale_to_16(s, depth);
                        let a = if gray_key == Some(s) { 0 } else { u16::MAX };
                        out.push([v, v, v, a]);
                    }
                }
                ColorType::GrayAlpha => {
                    for px in samples.chunks_exact(2) {
                        let v = bit_depth::scale_to_16(px[0], depth);
                        out.push([v, v, v, bit_depth::scale_to_16(px[1], depth)]);
                    }
                }
                ColorType::Rgb => {
                    for px in samples.chunks_exact(3) {
                        let a = if rgb_key == Some([px[0], px[1], px[2]]) {
                            0
                        } else {
                            u16::MAX
                        };
                        out.push([
                            bit_depth::scale_to_16(px[0], depth),
                            bit_depth::scale_to_16(px[1], depth),
                            bit_depth::scale_to_16(px[2], depth),
                            a,
                        ]);
                    }
                }
                ColorType::Rgba => {
                    for px in samples.chunks_exact(4) {
                        out.push([
                            bit_depth::scale_to_16(px[0], depth),
                            bit_depth::scale_to_16(px[1], depth),
                            bit_depth::scale_to_16(px[2], depth),
                            bit_depth::scale_to_16(px[3], depth),
                        ]);
                    }
                }
                ColorType::Indexed => {
                    for &idx in &samples {
                        let idx = idx as usize;
                        let [r, g, b] = palette.get(idx).copied().unwrap_or([0, 0, 0]);
                        let a = alpha.get(idx).copied().unwrap_or(255);
                        out.push([
                            r as u16 * 257,
                            g as u16 * 257,
                            b as u16 * 257,
                            a as u16 * 257,
                        ]);
                    }
                }
            }
        }
        out
    }

    /// Decode every pixel to 8-bit RGBA bytes (high byte of [`Self::to_rgba16`]).
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.to_rgba16()
            .into_iter()
            .flat_map(|px| px.map(|v| (v >> 8) as u8))
            .collect()
    }

    /// Check the structural invariants.
    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        let row_len = checked_row_len(self.width, self.height, self.bit_depth, self.color_type)?;
        if self.scanlines.len() != self.height as usize {
            return Err(format!(
                "scanline count {} does not match height {}",
                self.scanlines.len(),
                self.height
            ));
        }
        if let Some(y) = self.scanlines.iter().position(|row| row.len() != row_len) {
            return Err(format!(
                "scanline {y} has {} bytes, expected {row_len}",
                self.scanlines[y].len()
            ));
        }

        match self.color_type {
            ColorType::Indexed => {
                let palette = self
                    .palette
                    .as_ref()
                    .ok_or_else(|| "palette image without PLTE".to_string())?;
                if palette.is_empty() || palette.len() > (1usize << self.bit_depth).min(256) {
                    return Err(format!(
                        "palette of {} entries invalid at bit depth {}",
                        palette.len(),
                        self.bit_depth
                    ));
                }
                if let Some(alpha) = &self.transparency {
                    if alpha.len() > palette.len() {
                        return Err(format!(
                            "tRNS has {} entries for a {}-entry palette",
                            alpha.len(),
                            palette.len()
                        ));
                    }
                }
            }
            ColorType::Gray => check_key_len(self.transparency.as_deref(), 2)?,
            ColorType::Rgb => check_key_len(self.transparency.as_deref(), 6)?,
            ColorType::GrayAlpha | ColorType::Rgba => {
                if self.transparency.is_some() {
                    return Err("tRNS not allowed with an alpha channel".into());
                }
            }
        }
        if let Some(palette) = &self.palette {
            if palette.len() > 256 {
                return Err(format!("palette has {} entries", palette.len()));
            }
        }
        Ok(())
    }
}

fn check_key_len(trns: Option<&[u8]>, len: usize) -> std::result::Result<(), String> {
    match trns {
        Some(key) if key.len() != len => Err(format!(
            "tRNS color key must be {len} bytes, got {}",
            key.len()
        )),
        _ => Ok(()),
    }
}

fn checked_row_len(
    width: u32,
    height: u32,
    bit_depth: u8,
    color_type: ColorType,
) -> std::result::Result<usize, String> {
    if width == 0 || height == 0 {
        return Err(format!("invalid image dimensions: {width}x{height}"));
    }
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(format!(
            "image {width}x{height} exceeds maximum dimension {MAX_DIMENSION}"
        ));
    }
    if !color_type.allows_bit_depth(bit_depth) {
        return Err(format!(
            "bit depth {bit_depth} is not valid for color type {color_type:?}"
        ));
    }
    color_type
        .scanline_len(width, bit_depth)
        .ok_or_else(|| "scanline length overflow".to_string())
}
