//! PNG conformance tests.
//!
//! Checks the container layout the writer produces and that documents
//! written by it decode correctly with the `image` crate.

use rand::{rngs::StdRng, Rng, SeedableRng};
use tinyimg::png::{self, ImageDocument};
use tinyimg::ColorType;

fn rgb(width: u32, height: u32, pixels: &[u8]) -> ImageDocument {
    ImageDocument::from_pixels(width, height, 8, ColorType::Rgb, pixels).unwrap()
}

/// Test that PNG output has correct header.
#[test]
fn test_png_signature() {
    let result = png::encode(&rgb(1, 1, &[255, 0, 0]), 6).unwrap();
    assert_eq!(
        &result[0..8],
        &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]
    );
}

/// Test IHDR chunk format.
#[test]
fn test_ihdr_chunk() {
    let mut doc = rgb(100, 100, &vec![0u8; 100 * 100 * 3]);
    doc.interlaced = true;
    let result = png::encode(&doc, 6).unwrap();

    // Length (4 bytes) + "IHDR" (4 bytes) + data (13 bytes) + CRC (4 bytes)
    assert_eq!(&result[8..12], &[0, 0, 0, 13]);
    assert_eq!(&result[12..16], b"IHDR");
    assert_eq!(&result[16..20], &[0, 0, 0, 100]);
    assert_eq!(&result[20..24], &[0, 0, 0, 100]);
    assert_eq!(result[24], 8); // bit depth
    assert_eq!(result[25], 2); // color type
    assert_eq!(result[26], 0); // compression
    assert_eq!(result[27], 0); // filter method
    assert_eq!(result[28], 1); // Adam7
}

/// Test that IEND chunk is present at end.
#[test]
fn test_iend_chunk() {
    let result = png::encode(&rgb(10, 10, &[128u8; 10 * 10 * 3]), 6).unwrap();
    let iend_start = result.len() - 12;
    assert_eq!(&result[iend_start..iend_start + 4], &[0, 0, 0, 0]);
    assert_eq!(&result[iend_start + 4..iend_start + 8], b"IEND");
    // CRC of "IEND"
    assert_eq!(
        &result[iend_start + 8..iend_start + 12],
        &[0xAE, 0x42, 0x60, 0x82]
    );
}

/// Test color type and bit depth fields for every legal combination.
#[test]
fn test_color_types_and_depths() {
    let cases = [
        (ColorType::Gray, &[1u8, 2, 4, 8, 16][..]),
        (ColorType::Rgb, &[8, 16][..]),
        (ColorType::GrayAlpha, &[8, 16][..]),
        (ColorType::Rgba, &[8, 16][..]),
    ];
    for (color_type, depths) in cases {
        for &depth in depths {
            let len = color_type.scanline_len(4, depth).unwrap() * 4;
            let doc = ImageDocument::from_pixels(4, 4, depth, color_type, &vec![0x5A; len]).unwrap();
            let result = png::encode(&doc, 6).unwrap();
            assert_eq!(result[24], depth);
            assert_eq!(result[25], color_type.png_code());
        }
    }
}

/// Ensure encoded PNGs decode correctly via the `image` crate.
#[test]
fn test_png_roundtrip_decode_rgb() {
    let pixels = vec![
        255, 0, 0, 0, 255, 0, 0, 0, 255, // row 0
        255, 255, 0, 0, 255, 255, 255, 0, 255, // row 1
    ];
    let encoded = png::encode(&rgb(3, 2, &pixels), 9).unwrap();
    let decoded = image::load_from_memory(&encoded).expect("decode").to_rgb8();
    assert_eq!(decoded.width(), 3);
    assert_eq!(decoded.height(), 2);
    assert_eq!(decoded.as_raw(), &pixels);
}

/// Randomized small images across color types, plain and interlaced.
#[test]
fn test_png_roundtrip_random_small() {
    let mut rng = StdRng::seed_from_u64(42);
    let dims = [(1, 1), (2, 3), (3, 2), (4, 4), (8, 5), (9, 9)];
    let color_types = [
        ColorType::Gray,
        ColorType::GrayAlpha,
        ColorType::Rgb,
        ColorType::Rgba,
    ];

    for &(w, h) in &dims {
        for &ct in &color_types {
            for interlaced in [false, true] {
                let mut pixels = vec![0u8; (w * h) as usize * ct.channels()];
                rng.fill(pixels.as_mut_slice());
                let mut doc = ImageDocument::from_pixels(w, h, 8, ct, &pixels).unwrap();
                doc.interlaced = interlaced;

                let encoded = png::encode(&doc, 6).expect("encode random png");
                let decoded = image::load_from_memory(&encoded).expect("decode").to_rgba8();
                assert_eq!(decoded.width(), w);
                assert_eq!(decoded.height(), h);
                assert_eq!(decoded.into_raw(), doc.to_rgba8());
            }
        }
    }
}

/// Palette images with transparency decode through the reference decoder.
#[test]
fn test_indexed_with_transparency() {
    let base = ImageDocument::from_pixels(4, 1, 2, ColorType::Gray, &[0b00_01_10_11]).unwrap();
    let doc = ImageDocument {
        color_type: ColorType::Indexed,
        ..base
    }
    .with_palette(
        vec![[10, 20, 30], [40, 50, 60], [70, 80, 90], [100, 110, 120]],
        Some(vec![0, 128]),
    )
    .unwrap();
    let encoded = png::encode(&doc, 6).unwrap();
    let decoded = image::load_from_memory(&encoded).expect("decode").to_rgba8();
    assert_eq!(
        decoded.as_raw(),
        &[10, 20, 30, 0, 40, 50, 60, 128, 70, 80, 90, 255, 100, 110, 120, 255]
    );
}

/// Test compression levels.
#[test]
fn test_compression_levels() {
    let pixels: Vec<u8> = (0..64 * 64 * 3).map(|i| (i % 256) as u8).collect();
    let doc = rgb(64, 64, &pixels);
    let level1_size = png::encode(&doc, 1).unwrap().len();
    let level9_size = png::encode(&doc, 9).unwrap().len();
    assert!(level9_size <= level1_size);
}

/// Test error handling for invalid input.
#[test]
fn test_invalid_input() {
    assert!(ImageDocument::from_pixels(0, 1, 8, ColorType::Rgb, &[]).is_err());
    assert!(ImageDocument::from_pixels(1, 0, 8, ColorType::Rgb, &[]).is_err());
    assert!(ImageDocument::from_pixels(1, 1, 8, ColorType::Rgb, &[0, 0]).is_err());
    assert!(ImageDocument::from_pixels(1, 1, 8, ColorType::Rgb, &[0, 0, 0, 0]).is_err());
    assert!(ImageDocument::from_pixels(1, 1, 4, ColorType::Rgb, &[0, 0]).is_err());
}

/// Test large image encoding.
#[test]
fn test_large_image() {
    let result = png::encode(&rgb(1000, 1000, &vec![100u8; 1000 * 1000 * 3]), 6).unwrap();
    assert_eq!(&result[0..8], &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]);
    assert_eq!(&result[16..20], &[0, 0, 0x03, 0xE8]); // 1000 in big-endian
    assert_eq!(&result[20..24], &[0, 0, 0x03, 0xE8]);
    assert_eq!(png::read_document(&result).unwrap().height, 1000);
}
