//! Synthetic test image generation.
//!
//! Generates deterministic documents covering every color type and bit depth
//! combination, so optimizer properties can be checked without fixture files.

#![allow(dead_code)]

use tinyimg::png::bit_depth::pack_samples;
use tinyimg::png::{self, Chunk, ChunkPosition, ImageDocument};
use tinyimg::ColorType;

/// Deterministic LCG step.
fn next(state: &mut u32) -> u32 {
    *state = state.wrapping_mul(1103515245).wrapping_add(12345);
    *state >> 16
}

/// Samples for `width * height` pixels with `channels` channels, each below `1 << bits`.
pub fn noise_samples(width: u32, height: u32, channels: usize, bits: u8, seed: u32) -> Vec<u16> {
    let mut state = seed;
    let max = if bits == 16 { u16::MAX as u32 } else { (1u32 << bits) - 1 };
    (0..width as usize * height as usize * channels)
        .map(|_| (next(&mut state) % (max + 1)) as u16)
        .collect()
}

/// Document from unpacked samples, packed at `bit_depth`.
pub fn document(
    width: u32,
    height: u32,
    bit_depth: u8,
    color_type: ColorType,
    samples: &[u16],
) -> ImageDocument {
    let per_row = width as usize * color_type.channels();
    let scanlines = samples
        .chunks_exact(per_row)
        .map(|row| pack_samples(row, bit_depth))
        .collect();
    ImageDocument::new(width, height, bit_depth, color_type, scanlines).unwrap()
}

/// Palette document with `colors` random entries.
pub fn indexed(width: u32, height: u32, bit_depth: u8, colors: usize, seed: u32) -> ImageDocument {
    let mut state = seed;
    let palette: Vec<[u8; 3]> = (0..colors)
        .map(|_| [next(&mut state) as u8, next(&mut state) as u8, next(&mut state) as u8])
        .collect();
    let indices: Vec<u16> = (0..width * height)
        .map(|_| (next(&mut state) as usize % colors) as u16)
        .collect();
    let base = document(width, height, bit_depth, ColorType::Gray, &indices);
    let alpha = Some((0..colors.min(3)).map(|i| (i * 100) as u8).collect());
    ImageDocument {
        color_type: ColorType::Indexed,
        ..base
    }
    .with_palette(palette, alpha)
    .unwrap()
}

/// RGB8 gradient with more than 256 distinct colors for sizes from 17x17 up.
pub fn gradient_rgb(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            pixels.extend_from_slice(&[
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                ((x + y) * 127 / (width + height).max(1)) as u8,
            ]);
        }
    }
    pixels
}

/// RGBA8 version of [`gradient_rgb`] with the given constant alpha.
pub fn gradient_rgba(width: u32, height: u32, alpha: u8) -> Vec<u8> {
    gradient_rgb(width, height)
        .chunks_exact(3)
        .flat_map(|p| [p[0], p[1], p[2], alpha])
        .collect()
}

/// Ancillary chunks of several kinds.
pub fn metadata() -> Vec<Chunk> {
    vec![
        Chunk::new(*b"gAMA", vec![0, 0, 0xB1, 0x8F], ChunkPosition::BeforePalette),
        Chunk::new(*b"pHYs", vec![0, 0, 0x0B, 0x13, 0, 0, 0x0B, 0x13, 1], ChunkPosition::BeforeData),
        Chunk::new(*b"tEXt", b"Comment\0synthetic".to_vec(), ChunkPosition::AfterData),
        Chunk::new(*b"tIME", vec![0x07, 0xE8, 1, 2, 3, 4, 5], ChunkPosition::AfterData),
    ]
}

/// One small document per supported color type / bit depth, each also interlaced.
pub fn document_suite() -> Vec<(String, ImageDocument)> {
    let (w, h) = (13, 11);
    let mut suite = Vec::new();
    for depth in [1u8, 2, 4, 8, 16] {
        suite.push((
            format!("gray{depth}"),
            document(w, h, depth, ColorType::Gray, &noise_samples(w, h, 1, depth, depth as u32)),
        ));
    }
    for depth in [8u8, 16] {
        suite.push((
            format!("gray_alpha{depth}"),
            document(w, h, depth, ColorType::GrayAlpha, &noise_samples(w, h, 2, depth, 3)),
        ));
        suite.push((
            format!("rgb{depth}"),
            document(w, h, depth, ColorType::Rgb, &noise_samples(w, h, 3, depth, 5)),
        ));
        suite.push((
            format!("rgba{depth}"),
            document(w, h, depth, ColorType::Rgba, &noise_samples(w, h, 4, depth, 7)),
        ));
    }
    for depth in [1u8, 2, 4, 8] {
        let colors = (1usize << depth).min(200);
        suite.push((format!("indexed{depth}"), indexed(w, h, depth, colors, 11)));
    }

    // Few colors: every reduction has something to do.
    let few: Vec<u16> = noise_samples(w, h, 4, 8, 13)
        .chunks_exact(4)
        .flat_map(|px| [px[0] & 0xC0, px[1] & 0x80, 0, 255])
        .collect();
    suite.push(("rgba8_few_colors".into(), document(w, h, 8, ColorType::Rgba, &few)));

    let wide: Vec<u16> = noise_samples(w, h, 3, 8, 17).iter().map(|&v| v * 257).collect();
    suite.push(("rgb16_reducible".into(), document(w, h, 16, ColorType::Rgb, &wide)));

    let mut keyed = document(w, h, 8, ColorType::Rgb, &noise_samples(w, h, 3, 8, 19));
    keyed.transparency = Some(vec![0, keyed.scanlines[0][0], 0, keyed.scanlines[0][1], 0, keyed.scanlines[0][2]]);
    suite.push(("rgb8_keyed".into(), keyed));

    let interlaced: Vec<(String, ImageDocument)> = suite
        .iter()
        .map(|(name, doc)| {
            let mut doc = doc.clone();
            doc.interlaced = true;
            (format!("{name}_adam7"), doc)
        })
        .collect();
    suite.extend(interlaced);
    suite
}

/// Encode with a cheap fixed filter so the optimizer has room to improve.
pub fn encode_input(doc: &ImageDocument) -> Vec<u8> {
    png::encode(doc, 1).unwrap()
}
