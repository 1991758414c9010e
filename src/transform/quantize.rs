//! Lossy palette quantization.
//!
//! Median cut builds the palette; the palette size is the smallest one whose
//! perceptual error stays within [`LossyOptions::max_delta_e`]. The error of a
//! palette is the 95th percentile, over the distinct source colors of a pixel
//! sample, of the CIE76 difference to the color each one maps to. Grouping by
//! source color keeps a dominant background from outvoting fine detail.

use std::collections::HashMap;

use tracing::debug;

use crate::color::{rgba_difference, ColorType};
use crate::error::Result;
use crate::optimizer::Deadline;
use crate::png::bit_depth::pack_samples;
use crate::png::ImageDocument;

/// Most pixels inspected when measuring palette error.
const MAX_SAMPLES: usize = 50_000;

/// Options for lossy compression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossyOptions {
    /// Largest acceptable CIE76 color difference (95th percentile).
    pub max_delta_e: f64,
    /// Enable Floyd–Steinberg dithering (on RGB channels only).
    pub dithering: bool,
}

impl Default for LossyOptions {
    fn default() -> Self {
        Self {
            // Roughly one just-noticeable difference.
            max_delta_e: 2.3,
            dithering: false,
        }
    }
}

/// Quantize `doc` to a palette image.
///
/// Returns `None` when the image already fits in a lossless palette or the
/// threshold disables quantization. If the deadline passes during the palette
/// size search, the smallest size known to be within the threshold is used.
pub fn quantize(
    doc: &ImageDocument,
    options: &LossyOptions,
    deadline: &Deadline,
) -> Result<Option<ImageDocument>> {
    if options.max_delta_e <= 0.0 || !options.max_delta_e.is_finite() {
        return Ok(None);
    }
    let rgba = doc.to_rgba8();
    let pixels: Vec<[u8; 4]> = rgba
        .chunks_exact(4)
        .map(|p| [p[0], p[1], p[2], p[3]])
        .collect();

    let mut hist: HashMap<u32, u32> = HashMap::new();
    for &px in &pixels {
        *hist.entry(color_key(px)).or_insert(0) += 1;
    }
    if hist.len() <= 256 && doc.bit_depth <= 8 {
        debug!(colors = hist.len(), "image fits a lossless palette; skipping quantization");
        return Ok(None);
    }
    let mut colors: Vec<ColorCount> = hist
        .into_iter()
        .map(|(k, count)| ColorCount {
            rgba: key_color(k),
            count,
        })
        .collect();
    // HashMap order is random; sort to keep palettes reproducible.
    colors.sort_unstable_by_key(|c| color_key(c.rgba));

    let sampled = sampled_colors(&pixels);
    let threshold = options.max_delta_e;

    let palette256 = median_cut_palette(colors.clone(), 256);
    let mapping256 = map_colors(&colors, &palette256);
    let metric256 = palette_error(&sampled, &palette256, &mapping256);

    // Smallest palette measured within the threshold; the 256-color one otherwise.
    let mut palette = palette256;
    if metric256 <= threshold {
        let mut used = mapping256.values().copied().collect::<Vec<u8>>();
        used.sort_unstable();
        used.dedup();
        let mut lo = 1usize;
        let mut hi = used.len().clamp(1, 256);
        while lo < hi {
            if deadline.expired() {
                debug!(lo, hi, "deadline reached during palette search");
                break;
            }
            let mid = (lo + hi) / 2;
            let candidate = median_cut_palette(colors.clone(), mid);
            let metric = palette_error(&sampled, &candidate, &map_colors(&colors, &candidate));
            if metric <= threshold {
                hi = mid;
                palette = candidate;
            } else {
                lo = mid + 1;
            }
        }
    }

    let indices = if options.dithering {
        dither(&pixels, doc.width as usize, &palette)
    } else {
        let mapping = map_colors(&colors, &palette);
        pixels
            .iter()
            .map(|&px| mapping.get(&color_key(px)).copied().unwrap_or(0))
            .collect()
    };
    debug!(
        source_colors = colors.len(),
        palette = palette.len(),
        error = metric256,
        "quantized image"
    );
    Ok(Some(build_indexed(doc, &palette, &indices)))
}

#[derive(Clone)]
struct ColorCount {
    rgba: [u8; 4],
    count: u32,
}

#[derive(Clone)]
struct ColorBox {
    colors: Vec<ColorCount>,
    min: [u8; 4],
    max: [u8; 4],
}

impl ColorBox {
    fn from_colors(colors: Vec<ColorCount>) -> Self {
        let mut min = [255u8; 4];
        let mut max = [0u8; 4];
        for c in &colors {
            for i in 0..4 {
                min[i] = min[i].min(c.rgba[i]);
                max[i] = max[i].max(c.rgba[i]);
            }
        }
        Self { colors, min, max }
    }

    /// Widest channel and its extent.
    fn range(&self) -> (usize, u8) {
        let mut channel = 0;
        let mut widest = 0;
        for i in 0..4 {
            let extent = self.max[i].saturating_sub(self.min[i]);
            if extent > widest {
                widest = extent;
                channel = i;
            }
        }
        (channel, widest)
    }

    fn can_split(&self) -> bool {
        self.colors.len() > 1
    }

    fn split(self) -> (ColorBox, ColorBox) {
        let (channel, _) = self.range();
        let mut colors = self.colors;
        colors.sort_by_key(|c| (c.rgba[channel], color_key(c.rgba)));

        let total: u64 = colors.iter().map(|c| c.count as u64).sum();
        let mut acc = 0u64;
        let mut split_idx = 0;
        for (i, c) in colors.iter().enumerate() {
            acc += c.count as u64;
            if acc >= total / 2 {
                split_idx = i;
                break;
            }
        }
        // Both halves must be non-empty.
        let split_idx = split_idx.min(colors.len() - 2);
        let right = colors.split_off(split_idx + 1);
        (ColorBox::from_colors(colors), ColorBox::from_colors(right))
    }

    fn make_palette_entry(&self) -> [u8; 4] {
        let mut sums = [0u64; 4];
        let mut total: u64 = 0;
        for c in &self.colors {
            let cnt = c.count as u64;
            for (sum, &v) in sums.iter_mut().zip(&c.rgba) {
                *sum += v as u64 * cnt;
            }
            total += cnt;
        }
        if total == 0 {
            return [0, 0, 0, 255];
        }
        // Rounded weighted mean.
        sums.map(|s| ((s + total / 2) / total) as u8)
    }
}

fn median_cut_palette(colors: Vec<ColorCount>, max_colors: usize) -> Vec<[u8; 4]> {
    if colors.is_empty() {
        return vec![[0, 0, 0, 255]];
    }
    let max_colors = max_colors.clamp(1, 256);
    let mut boxes = vec![ColorBox::from_colors(colors)];
    while boxes.len() < max_colors {
        // pick box with largest range
        let Some((idx, _)) = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.can_split())
            .max_by_key(|(_, b)| b.range().1)
        else {
            break;
        };
        let b = boxes.remove(idx);
        let (l, r) = b.split();
        boxes.push(l);
        boxes.push(r);
    }

    boxes.iter().map(ColorBox::make_palette_entry).collect()
}

fn nearest_palette_index(color: [u8; 4], palette: &[[u8; 4]]) -> u8 {
    let mut best_idx = 0u8;
    let mut best_dist = u32::MAX;
    for (i, p) in palette.iter().enumerate() {
        let dist: u32 = (0..4)
            .map(|c| {
                let d = color[c] as i32 - p[c] as i32;
                (d * d) as u32
            })
            .sum();
        if dist < best_dist {
            best_dist = dist;
            best_idx = i as u8;
        }
    }
    best_idx
}

fn map_colors(colors: &[ColorCount], palette: &[[u8; 4]]) -> HashMap<u32, u8> {
    colors
        .iter()
        .map(|c| (color_key(c.rgba), nearest_palette_index(c.rgba, palette)))
        .collect()
}

/// Distinct colors of an evenly spaced pixel sample, in first-seen order.
fn sampled_colors(pixels: &[[u8; 4]]) -> Vec<[u8; 4]> {
    let step = (pixels.len() / MAX_SAMPLES).max(1);
    let mut seen = std::collections::HashSet::new();
    pixels
        .iter()
        .step_by(step)
        .filter(|&&px| seen.insert(color_key(px)))
        .copied()
        .collect()
}

/// 95th percentile of the per-source-color difference.
fn palette_error(sampled: &[[u8; 4]], palette: &[[u8; 4]], mapping: &HashMap<u32, u8>) -> f64 {
    let mut errors: Vec<f64> = sampled
        .iter()
        .map(|&src| {
            let idx = mapping.get(&color_key(src)).copied().unwrap_or(0) as usize;
            rgba_difference(src, palette[idx])
        })
        .collect();
    if errors.is_empty() {
        return 0.0;
    }
    errors.sort_by(f64::total_cmp);
    let p = ((errors.len() as f64 * 0.95).ceil() as usize).saturating_sub(1);
    errors[p.min(errors.len() - 1)]
}

// Floyd–Steinberg dithering on RGB (alpha preserved).
fn dither(pixels: &[[u8; 4]], width: usize, palette: &[[u8; 4]]) -> Vec<u8> {
    let mut indices = Vec::with_capacity(pixels.len());
    let mut err = vec![[0f32; 3]; width + 2];
    let mut next_err = vec![[0f32; 3]; width + 2];

    for row in pixels.chunks_exact(width) {
        for (x, px) in row.iter().enumerate() {
            let mut adjusted = *px;
            for c in 0..3 {
                adjusted[c] = (px[c] as f32 + err[x + 1][c]).clamp(0.0, 255.0) as u8;
            }
            let idx = nearest_palette_index(adjusted, palette);
            indices.push(idx);
            let p = palette[idx as usize];

            //       * 7
            // 3 5 1
            for c in 0..3 {
                let e = adjusted[c] as f32 - p[c] as f32;
                err[x + 2][c] += e * 7.0 / 16.0;
                next_err[x][c] += e * 3.0 / 16.0;
                next_err[x + 1][c] += e * 5.0 / 16.0;
                next_err[x + 2][c] += e * 1.0 / 16.0;
            }
        }
        err.fill([0.0; 3]);
        std::mem::swap(&mut err, &mut next_err);
    }
    indices
}

/// Assemble an 8-bit palette document, transparent entries first.
fn build_indexed(doc: &ImageDocument, palette: &[[u8; 4]], indices: &[u8]) -> ImageDocument {
    let mut order: Vec<usize> = (0..palette.len()).collect();
    order.sort_by_key(|&i| palette[i][3] == 255);
    let mut remap = vec![0u16; palette.len()];
    for (new, &old) in order.iter().enumerate() {
        remap[old] = new as u16;
    }
    let entries: Vec<[u8; 4]> = order.iter().map(|&i| palette[i]).collect();
    let alpha: Vec<u8> = entries.iter().map(|c| c[3]).collect();
    let transparency = alpha
        .iter()
        .rposition(|&a| a != 255)
        .map(|last| alpha[..=last].to_vec());

    let width = doc.width as usize;
    let scanlines = indices
        .chunks_exact(width)
        .map(|row| {
            let samples: Vec<u16> = row.iter().map(|&i| remap[i as usize]).collect();
            pack_samples(&samples, 8)
        })
        .collect();

    ImageDocument {
        width: doc.width,
        height: doc.height,
        bit_depth: 8,
        color_type: ColorType::Indexed,
        palette: Some(entries.iter().map(|c| [c[0], c[1], c[2]]).collect()),
        transparency,
        scanlines,
        metadata: doc.metadata.clone(),
        interlaced: doc.interlaced,
    }
}

#[inline]
fn color_key(c: [u8; 4]) -> u32 {
    u32::from_be_bytes(c)
}

#[inline]
fn key_color(k: u32) -> [u8; 4] {
    k.to_be_bytes()
}
