//! Lossless color type and bit depth reductions.
//!
//! The document is expanded to canonical 16-bit RGBA once, and the smallest
//! encoding that reproduces those values exactly is chosen:
//!
//! - 16-bit samples become 8-bit when every high byte equals its low byte
//! - an all-opaque alpha channel is dropped
//! - a single fully transparent color becomes a tRNS color key
//! - achromatic RGB becomes grayscale
//! - at most 256 distinct colors become a palette
//! - palettes are compacted and gray/palette bit depths minimized

use std::collections::HashMap;

use crate::color::ColorType;
use crate::png::bit_depth::{min_gray_depth, pack_samples, palette_bit_depth, rescale};
use crate::png::ImageDocument;

const OPAQUE: u16 = u16::MAX;

/// Pixel statistics that decide which encodings are exact.
struct Analysis {
    needs_16: bool,
    opaque: bool,
    gray: bool,
    /// RGB of the fully transparent pixels, when it can serve as a color key.
    key: Option<[u16; 3]>,
    /// Distinct colors with counts, or `None` once there are more than 256.
    colors: Option<HashMap<[u16; 4], u32>>,
}

fn analyze(pixels: &[[u16; 4]]) -> Analysis {
    let mut needs_16 = false;
    let mut opaque = true;
    let mut binary_alpha = true;
    let mut gray = true;
    let mut transparent: Option<[u16; 3]> = None;
    let mut single_transparent = true;
    let mut colors: Option<HashMap<[u16; 4], u32>> = Some(HashMap::new());

    for px in pixels {
        let [r, g, b, a] = *px;
        needs_16 |= px.iter().any(|&v| v >> 8 != v & 0xFF);
        gray &= r == g && g == b;
        if a != OPAQUE {
            opaque = false;
            if a != 0 {
                binary_alpha = false;
            } else {
                match transparent {
                    None => transparent = Some([r, g, b]),
                    Some(t) if t != [r, g, b] => single_transparent = false,
                    Some(_) => {}
                }
            }
        }
        if let Some(map) = colors.as_mut() {
            *map.entry(*px).or_insert(0) += 1;
            if map.len() > 256 {
                colors = None;
            }
        }
    }

    let mut key = None;
    if !opaque && binary_alpha && single_transparent {
        if let Some(t) = transparent {
            // The key color must not also appear on an opaque pixel.
            let collides = pixels
                .iter()
                .any(|px| px[3] == OPAQUE && [px[0], px[1], px[2]] == t);
            if !collides {
                key = Some(t);
            }
        }
    }

    Analysis {
        needs_16,
        opaque,
        gray,
        key,
        colors,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Gray { depth: u8, keyed: bool },
    GrayAlpha { depth: u8 },
    Rgb { depth: u8, keyed: bool },
    Rgba { depth: u8 },
    Palette { depth: u8 },
}

impl Target {
    fn bits(self) -> usize {
        match self {
            Target::Gray { depth, .. } | Target::Palette { depth } => depth as usize,
            Target::GrayAlpha { depth } => 2 * depth as usize,
            Target::Rgb { depth, .. } => 3 * depth as usize,
            Target::Rgba { depth } => 4 * depth as usize,
        }
    }

    fn color_type(self) -> ColorType {
        match self {
            Target::Gray { .. } => ColorType::Gray,
            Target::GrayAlpha { .. } => ColorType::GrayAlpha,
            Target::Rgb { .. } => ColorType::Rgb,
            Target::Rgba { .. } => ColorType::Rgba,
            Target::Palette { .. } => ColorType::Indexed,
        }
    }

    /// Tie-break rank: grayscale, then palette, then truecolor.
    fn rank(self) -> u8 {
        match self {
            Target::Gray { .. } | Target::GrayAlpha { .. } => 0,
            Target::Palette { .. } => 1,
            Target::Rgb { .. } | Target::Rgba { .. } => 2,
        }
    }
}

fn candidates(stats: &Analysis, pixels: &[[u16; 4]]) -> Vec<Target> {
    let wide = if stats.needs_16 { 16 } else { 8 };
    let mut out = Vec::with_capacity(3);

    if stats.gray {
        if stats.opaque || stats.key.is_some() {
            let key_gray = stats.key.map(|k| k[0]);
            let values = pixels
                .iter()
                .filter(|px| px[3] == OPAQUE)
                .map(|px| px[0])
                .chain(key_gray);
            out.push(Target::Gray {
                depth: min_gray_depth(values, 16),
                keyed: stats.key.is_some(),
            });
        } else {
            out.push(Target::GrayAlpha { depth: wide });
        }
    }
    if stats.opaque || stats.key.is_some() {
        out.push(Target::Rgb {
            depth: wide,
            keyed: stats.key.is_some(),
        });
    } else {
        out.push(Target::Rgba { depth: wide });
    }
    if let (false, Some(colors)) = (stats.needs_16, &stats.colors) {
        out.push(Target::Palette {
            depth: palette_bit_depth(colors.len()),
        });
    }
    out
}

/// Find a smaller exact encoding of `doc`. Returns `None` when the current one
/// is already the best.
pub fn reduce(doc: &ImageDocument) -> Option<ImageDocument> {
    let pixels = doc.to_rgba16();
    let stats = analyze(&pixels);

    let current = doc.color_type;
    let best = candidates(&stats, &pixels)
        .into_iter()
        .min_by_key(|t| (t.bits(), t.color_type() != current, t.rank()))?;

    let reduced = build(doc, &pixels, &stats, best);
    if reduced == *doc {
        return None;
    }
    tracing::debug!(
        from = ?doc.color_type,
        from_depth = doc.bit_depth,
        to = ?reduced.color_type,
        to_depth = reduced.bit_depth,
        "reduced color encoding"
    );
    Some(reduced)
}

fn build(doc: &ImageDocument, pixels: &[[u16; 4]], stats: &Analysis, target: Target) -> ImageDocument {
    let width = doc.width as usize;
    let mut palette = None;
    let mut transparency = None;
    let mut index: HashMap<[u16; 4], u16> = HashMap::new();

    let bit_depth = match target {
        Target::Gray { depth, keyed } => {
            if keyed {
                let k = stats.key.map_or(0, |k| rescale(k[0], 16, depth));
                transparency = Some(k.to_be_bytes().to_vec());
            }
            depth
        }
        Target::Rgb { depth, keyed } => {
            if keyed {
                let key = stats.key.unwrap_or_default();
                transparency = Some(
                    key.iter()
                        .flat_map(|&v| rescale(v, 16, depth).to_be_bytes())
                        .collect(),
                );
            }
            depth
        }
        Target::GrayAlpha { depth } | Target::Rgba { depth } => depth,
        Target::Palette { depth } => {
            let entries = palette_order(doc, stats);
            index = entries
                .iter()
                .enumerate()
                .map(|(i, c)| (*c, i as u16))
                .collect();
            palette = Some(
                entries
                    .iter()
                    .map(|c| [c[0], c[1], c[2]].map(|v| (v >> 8) as u8))
                    .collect(),
            );
            let alpha: Vec<u8> = entries.iter().map(|c| (c[3] >> 8) as u8).collect();
            transparency = trim_transparency(&alpha);
            depth
        }
    };

    let color_type = target.color_type();
    let mut samples = Vec::with_capacity(width * color_type.channels());
    let scanlines = pixels
        .chunks_exact(width)
        .map(|row| {
            samples.clear();
            for px in row {
                push_samples(target, px, &index, &mut samples);
            }
            pack_samples(&samples, bit_depth)
        })
        .collect();

    ImageDocument {
        width: doc.width,
        height: doc.height,
        bit_depth,
        color_type,
        palette,
        transparency,
        scanlines,
        metadata: doc.metadata.clone(),
        interlaced: doc.interlaced,
    }
}

#[inline]
fn push_samples(target: Target, px: &[u16; 4], index: &HashMap<[u16; 4], u16>, out: &mut Vec<u16>) {
    match target {
        Target::Gray { depth, .. } => out.push(rescale(px[0], 16, depth)),
        Target::GrayAlpha { depth } => {
            out.push(rescale(px[0], 16, depth));
            out.push(rescale(px[3], 16, depth));
        }
        Target::Rgb { depth, .. } => out.extend(px[..3].iter().map(|&v| rescale(v, 16, depth))),
        Target::Rgba { depth } => out.extend(px.iter().map(|&v| rescale(v, 16, depth))),
        Target::Palette { .. } => out.push(index.get(px).copied().unwrap_or(0)),
    }
}

/// Palette entry order: transparent entries first so tRNS can be trimmed.
///
/// An existing palette keeps its relative order (minus unused and duplicate
/// entries); a new one is sorted by descending frequency.
fn palette_order(doc: &ImageDocument, stats: &Analysis) -> Vec<[u16; 4]> {
    let counts = stats.colors.as_ref();
    let used = |c: &[u16; 4]| counts.is_some_and(|m| m.contains_key(c));

    let mut entries: Vec<[u16; 4]> = if doc.color_type == ColorType::Indexed {
        let palette = doc.palette.as_deref().unwrap_or(&[]);
        let alpha = doc.transparency.as_deref().unwrap_or(&[]);
        let mut seen = Vec::with_capacity(palette.len());
        for (i, rgb) in palette.iter().enumerate() {
            let a = alpha.get(i).copied().unwrap_or(255);
            let c = [rgb[0], rgb[1], rgb[2], a].map(|v| v as u16 * 257);
            if used(&c) && !seen.contains(&c) {
                seen.push(c);
            }
        }
        seen
    } else {
        let mut by_count: Vec<([u16; 4], u32)> = counts
            .map(|m| m.iter().map(|(c, n)| (*c, *n)).collect())
            .unwrap_or_default();
        by_count.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        by_count.into_iter().map(|(c, _)| c).collect()
    };
    // Stable: keeps the order within each group.
    entries.sort_by_key(|c| c[3] == OPAQUE);
    entries
}

/// Drop trailing opaque entries; `None` if every entry is opaque.
fn trim_transparency(alpha: &[u8]) -> Option<Vec<u8>> {
    let last = alpha.iter().rposition(|&a| a != 255)?;
    Some(alpha[..=last].to_vec())
}
