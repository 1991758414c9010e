//! Alpha channel handling.

use crate::color::ColorType;
use crate::error::{Error, Result};
use crate::png::bit_depth::{max_value, pack_samples, scale_to_16};
use crate::png::ImageDocument;

/// Zero the color samples of fully transparent pixels.
///
/// Returns whether any sample changed. Color-keyed images are left alone:
/// their transparent pixels already share one color.
pub fn clear_transparent_colors(doc: &mut ImageDocument) -> bool {
    match doc.color_type {
        ColorType::Rgba | ColorType::GrayAlpha => {
            let channels = doc.color_type.channels();
            let mut changed = false;
            for y in 0..doc.height as usize {
                let mut samples = doc.row_samples(y);
                let mut row_changed = false;
                for px in samples.chunks_exact_mut(channels) {
                    let (color, alpha) = px.split_at_mut(channels - 1);
                    if alpha[0] == 0 && color.iter().any(|&c| c != 0) {
                        color.fill(0);
                        row_changed = true;
                    }
                }
                if row_changed {
                    doc.scanlines[y] = pack_samples(&samples, doc.bit_depth);
                    changed = true;
                }
            }
            changed
        }
        ColorType::Indexed => {
            let (Some(palette), Some(alpha)) = (doc.palette.as_mut(), doc.transparency.as_ref())
            else {
                return false;
            };
            let mut changed = false;
            for (entry, &a) in palette.iter_mut().zip(alpha) {
                if a == 0 && *entry != [0, 0, 0] {
                    *entry = [0, 0, 0];
                    changed = true;
                }
            }
            changed
        }
        ColorType::Gray | ColorType::Rgb => false,
    }
}

/// Composite every pixel over the background and drop all transparency.
///
/// The background is the bKGD color when present, white otherwise. Fails with
/// a transform error when the image has nothing to remove.
pub fn remove_alpha(mut doc: ImageDocument) -> Result<ImageDocument> {
    if !doc.has_transparency() {
        let what = if doc.color_type == ColorType::Indexed {
            "palette image has no tRNS record"
        } else {
            "image has no alpha channel or transparency key"
        };
        return Err(Error::Transform(format!("cannot remove alpha: {what}")));
    }
    let bg = background(&doc);

    if doc.color_type == ColorType::Indexed {
        let alpha = doc.transparency.take().unwrap_or_default();
        if let Some(palette) = doc.palette.as_mut() {
            let bg8 = bg.map(|v| (v >> 8) as u8);
            for (entry, &a) in palette.iter_mut().zip(&alpha) {
                for (c, b) in entry.iter_mut().zip(bg8) {
                    *c = composite8(*c, b, a);
                }
            }
        }
        return Ok(doc);
    }

    let gray_out = matches!(doc.color_type, ColorType::Gray | ColorType::GrayAlpha)
        && bg[0] == bg[1]
        && bg[1] == bg[2];
    let color_type = if gray_out { ColorType::Gray } else { ColorType::Rgb };
    let bit_depth = if doc.bit_depth == 16 { 16 } else { 8 };
    let width = doc.width as usize;

    let pixels = doc.to_rgba16();
    let scanlines = pixels
        .chunks_exact(width)
        .map(|row| {
            let mut samples = Vec::with_capacity(width * color_type.channels());
            for px in row {
                let rgb = [0, 1, 2].map(|i| composite16(px[i], bg[i], px[3]));
                if gray_out {
                    samples.push(narrow(rgb[0], bit_depth));
                } else {
                    samples.extend(rgb.map(|v| narrow(v, bit_depth)));
                }
            }
            pack_samples(&samples, bit_depth)
        })
        .collect();

    Ok(ImageDocument {
        bit_depth,
        color_type,
        palette: None,
        transparency: None,
        scanlines,
        ..doc
    })
}

/// Background color from bKGD as 16-bit RGB.
fn background(doc: &ImageDocument) -> [u16; 3] {
    const WHITE: [u16; 3] = [u16::MAX; 3];
    let Some(chunk) = doc.metadata_chunk(b"bKGD") else {
        return WHITE;
    };
    let d = &chunk.data;
    let max = max_value(doc.bit_depth);
    let sample = |i: usize| scale_to_16(u16::from_be_bytes([d[i], d[i + 1]]) & max, doc.bit_depth);
    match doc.color_type {
        ColorType::Gray | ColorType::GrayAlpha if d.len() == 2 => [sample(0); 3],
        ColorType::Rgb | ColorType::Rgba if d.len() == 6 => [sample(0), sample(2), sample(4)],
        ColorType::Indexed if d.len() == 1 => doc
            .palette
            .as_ref()
            .and_then(|p| p.get(d[0] as usize))
            .map_or(WHITE, |c| c.map(|v| v as u16 * 257)),
        _ => WHITE,
    }
}

#[inline]
fn composite16(c: u16, bg: u16, a: u16) -> u16 {
    let (c, bg, a) = (c as u32, bg as u32, a as u32);
    ((c * a + bg * (65535 - a) + 32767) / 65535) as u16
}

#[inline]
fn composite8(c: u8, bg: u8, a: u8) -> u8 {
    let (c, bg, a) = (c as u32, bg as u32, a as u32);
    ((c * a + bg * (255 - a) + 127) / 255) as u8
}

#[inline]
fn narrow(v: u16, bit_depth: u8) -> u16 {
    if bit_depth == 16 {
        v
    } else {
        v >> 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::png::{Chunk, ChunkPosition};

    #[test]
    fn test_clear_transparent_colors_rgba() {
        let mut doc = ImageDocument::from_pixels(
            2,
            1,
            8,
            ColorType::Rgba,
            &[10, 20, 30, 0, 40, 50, 60, 255],
        )
        .unwrap();
        assert!(clear_transparent_colors(&mut doc));
        assert_eq!(doc.scanlines[0], vec![0, 0, 0, 0, 40, 50, 60, 255]);
        assert!(!clear_transparent_colors(&mut doc));
    }

    #[test]
    fn test_clear_transparent_palette_entries() {
        let base = ImageDocument::from_pixels(2, 1, 8, ColorType::Gray, &[0, 1]).unwrap();
        let mut doc = ImageDocument {
            color_type: ColorType::Indexed,
            ..base
        }
        .with_palette(vec![[7, 7, 7], [8, 8, 8]], Some(vec![0]))
        .unwrap();
        assert!(clear_transparent_colors(&mut doc));
        assert_eq!(doc.palette.unwrap(), vec![[0, 0, 0], [8, 8, 8]]);
    }

    #[test]
    fn test_remove_alpha_over_white() {
        let doc = ImageDocument::from_pixels(
            2,
            1,
            8,
            ColorType::Rgba,
            &[255, 0, 0, 0, 0, 0, 255, 255],
        )
        .unwrap();
        let out = remove_alpha(doc).unwrap();
        assert_eq!(out.color_type, ColorType::Rgb);
        assert_eq!(out.scanlines[0], vec![255, 255, 255, 0, 0, 255]);
    }

    #[test]
    fn test_remove_alpha_uses_background_chunk() {
        let mut doc =
            ImageDocument::from_pixels(1, 1, 8, ColorType::GrayAlpha, &[200, 0]).unwrap();
        doc.metadata = vec![Chunk::new(*b"bKGD", vec![0, 50], ChunkPosition::BeforeData)];
        let out = remove_alpha(doc).unwrap();
        assert_eq!(out.color_type, ColorType::Gray);
        assert_eq!(out.scanlines[0], vec![50]);
    }

    #[test]
    fn test_remove_alpha_half_transparent() {
        let doc =
            ImageDocument::from_pixels(1, 1, 16, ColorType::Rgba, &[0, 0, 0, 0, 0, 0, 0x80, 0x00])
                .unwrap();
        let out = remove_alpha(doc).unwrap();
        assert_eq!(out.bit_depth, 16);
        let v = u16::from_be_bytes([out.scanlines[0][0], out.scanlines[0][1]]);
        assert!((0x7FF0..=0x8010).contains(&v), "got {v:#06x}");
    }

    #[test]
    fn test_remove_alpha_palette_without_trns_fails() {
        let base = ImageDocument::from_pixels(1, 1, 8, ColorType::Gray, &[0]).unwrap();
        let doc = ImageDocument {
            color_type: ColorType::Indexed,
            ..base
        }
        .with_palette(vec![[1, 2, 3]], None)
        .unwrap();
        let err = remove_alpha(doc).unwrap_err();
        assert!(matches!(err, Error::Transform(_)));
    }

    #[test]
    fn test_remove_alpha_palette_composites_entries() {
        let base = ImageDocument::from_pixels(2, 1, 8, ColorType::Gray, &[0, 1]).unwrap();
        let doc = ImageDocument {
            color_type: ColorType::Indexed,
            ..base
        }
        .with_palette(vec![[0, 0, 0], [10, 20, 30]], Some(vec![0]))
        .unwrap();
        let out = remove_alpha(doc).unwrap();
        assert!(out.transparency.is_none());
        assert_eq!(out.palette.unwrap(), vec![[255, 255, 255], [10, 20, 30]]);
    }
}
