//! Pixel Transform Stage.
//!
//! Applies alpha handling, metadata stripping, lossless color reductions and
//! the target interlacing to a document. Every step either leaves the decoded
//! pixels untouched or is an explicit lossy request ([`AlphaPolicy`]).

pub mod alpha;
pub mod quantize;
pub mod reduce;

use tracing::debug;

use crate::error::Result;
use crate::png::chunk::depends_on_encoding;
use crate::png::ImageDocument;

pub use quantize::LossyOptions;

/// Which ancillary chunks are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StripChunks {
    /// Keep every ancillary chunk.
    None,
    /// Keep only chunks that affect how colors are displayed.
    Safe,
    /// Drop every ancillary chunk.
    #[default]
    All,
}

impl StripChunks {
    /// Chunks kept by [`StripChunks::Safe`].
    pub const DISPLAY_CHUNKS: [[u8; 4]; 8] = [
        *b"cICP", *b"iCCP", *b"sRGB", *b"gAMA", *b"cHRM", *b"sBIT", *b"mDCv", *b"cLLi",
    ];

    /// Whether a chunk of type `name` survives this policy.
    pub fn keeps(self, name: &[u8; 4]) -> bool {
        match self {
            StripChunks::None => true,
            StripChunks::Safe => Self::DISPLAY_CHUNKS.contains(name),
            StripChunks::All => false,
        }
    }
}

/// Treatment of the alpha channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlphaPolicy {
    /// Pixels are left exactly as they are.
    #[default]
    Keep,
    /// The color of fully transparent pixels is zeroed. Visually lossless.
    Optimize,
    /// Transparency is composited away over the bKGD color (white if absent).
    Remove,
}

/// Interlacing of the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interlacing {
    /// Same as the input.
    #[default]
    Keep,
    /// Non-interlaced.
    Off,
    /// Adam7.
    Adam7,
}

impl Interlacing {
    /// Resolve against the input's interlacing.
    pub fn resolve(self, input_interlaced: bool) -> bool {
        match self {
            Interlacing::Keep => input_interlaced,
            Interlacing::Off => false,
            Interlacing::Adam7 => true,
        }
    }
}

/// What the transform stage is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformPolicy {
    /// Metadata stripping.
    pub strip: StripChunks,
    /// Alpha handling.
    pub alpha: AlphaPolicy,
    /// Output interlacing.
    pub interlace: Interlacing,
    /// Whether lossless color type and bit depth reductions run.
    pub reductions: bool,
}

impl Default for TransformPolicy {
    fn default() -> Self {
        Self {
            strip: StripChunks::All,
            alpha: AlphaPolicy::Keep,
            interlace: Interlacing::Keep,
            reductions: true,
        }
    }
}

/// What the transform stage changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformSummary {
    /// Whether any decoded pixel value changed.
    pub pixels_changed: bool,
    /// Names of the chunks that were removed.
    pub dropped_chunks: Vec<String>,
    /// Whether color type, bit depth, palette, or transparency changed.
    pub encoding_changed: bool,
    /// Whether the interlacing changed.
    pub interlace_changed: bool,
}

impl TransformSummary {
    /// True when the output document serializes the input image as-is.
    pub fn is_identity(&self) -> bool {
        !self.pixels_changed
            && self.dropped_chunks.is_empty()
            && !self.encoding_changed
            && !self.interlace_changed
    }
}

/// Metadata stripping only, for documents that are re-emitted without transforms.
pub fn strip_metadata(doc: &mut ImageDocument, strip: StripChunks) -> Vec<String> {
    let mut dropped = Vec::new();
    doc.metadata.retain(|chunk| {
        let keep = strip.keeps(&chunk.name);
        if !keep {
            dropped.push(chunk.name_str());
        }
        keep
    });
    dropped
}

/// Run the transform stage.
pub fn apply(mut doc: ImageDocument, policy: &TransformPolicy) -> Result<(ImageDocument, TransformSummary)> {
    let mut summary = TransformSummary::default();
    let before = Encoding::of(&doc);

    match policy.alpha {
        AlphaPolicy::Keep => {}
        AlphaPolicy::Optimize => {
            summary.pixels_changed |= alpha::clear_transparent_colors(&mut doc);
        }
        AlphaPolicy::Remove => {
            doc = alpha::remove_alpha(doc)?;
            summary.pixels_changed = true;
        }
    }

    summary.dropped_chunks = strip_metadata(&mut doc, policy.strip);

    if policy.reductions {
        if let Some(reduced) = reduce::reduce(&doc) {
            doc = reduced;
        }
    }

    if Encoding::of(&doc) != before {
        summary.encoding_changed = true;
        doc.metadata.retain(|chunk| {
            let stale = depends_on_encoding(&chunk.name);
            if stale {
                summary.dropped_chunks.push(chunk.name_str());
            }
            !stale
        });
    }

    let interlaced = policy.interlace.resolve(doc.interlaced);
    summary.interlace_changed = interlaced != doc.interlaced;
    doc.interlaced = interlaced;

    debug!(
        color_type = ?doc.color_type,
        bit_depth = doc.bit_depth,
        interlaced = doc.interlaced,
        dropped = summary.dropped_chunks.len(),
        pixels_changed = summary.pixels_changed,
        "transform complete"
    );
    Ok((doc, summary))
}

/// The parts of a document that determine how samples are interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Encoding {
    color_type: crate::color::ColorType,
    bit_depth: u8,
    palette: Option<Vec<[u8; 3]>>,
    transparency: Option<Vec<u8>>,
}

impl Encoding {
    fn of(doc: &ImageDocument) -> Self {
        Self {
            color_type: doc.color_type,
            bit_depth: doc.bit_depth,
            palette: doc.palette.clone(),
            transparency: doc.transparency.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::ColorType;
    use crate::png::{Chunk, ChunkPosition};

    fn rgba_doc(pixels: &[[u8; 4]], width: u32) -> ImageDocument {
        let data: Vec<u8> = pixels.iter().flatten().copied().collect();
        let height = pixels.len() as u32 / width;
        ImageDocument::from_pixels(width, height, 8, ColorType::Rgba, &data).unwrap()
    }

    fn with_chunks(mut doc: ImageDocument) -> ImageDocument {
        doc.metadata = vec![
            Chunk::new(*b"gAMA", vec![0, 0, 0xB1, 0x8F], ChunkPosition::BeforePalette),
            Chunk::new(*b"bKGD", vec![0, 0, 0, 0, 0, 0], ChunkPosition::BeforeData),
            Chunk::new(*b"tEXt", b"Title\0x".to_vec(), ChunkPosition::AfterData),
        ];
        doc
    }

    #[test]
    fn test_strip_policies() {
        let doc = with_chunks(rgba_doc(&[[1, 2, 3, 255]], 1));
        let policy = |strip| TransformPolicy {
            strip,
            reductions: false,
            ..TransformPolicy::default()
        };

        let (out, summary) = apply(doc.clone(), &policy(StripChunks::None)).unwrap();
        assert_eq!(out.metadata.len(), 3);
        assert!(summary.is_identity());

        let (out, summary) = apply(doc.clone(), &policy(StripChunks::Safe)).unwrap();
        assert_eq!(out.metadata.len(), 1);
        assert_eq!(&out.metadata[0].name, b"gAMA");
        assert_eq!(summary.dropped_chunks, vec!["bKGD", "tEXt"]);

        let (out, _) = apply(doc, &policy(StripChunks::All)).unwrap();
        assert!(out.metadata.is_empty());
    }

    #[test]
    fn test_reduction_drops_stale_background() {
        let doc = with_chunks(rgba_doc(&[[0, 0, 0, 255], [255, 255, 255, 255]], 2));
        let policy = TransformPolicy {
            strip: StripChunks::None,
            ..TransformPolicy::default()
        };
        let (out, summary) = apply(doc.clone(), &policy).unwrap();
        assert_eq!(out.color_type, ColorType::Gray);
        assert!(summary.encoding_changed);
        assert!(!summary.pixels_changed);
        assert!(out.metadata.iter().all(|c| &c.name != b"bKGD"));
        assert_eq!(out.to_rgba16(), doc.to_rgba16());
    }

    #[test]
    fn test_interlace_targets() {
        let doc = rgba_doc(&[[1, 2, 3, 4]], 1);
        let policy = TransformPolicy {
            interlace: Interlacing::Adam7,
            ..TransformPolicy::default()
        };
        let (out, summary) = apply(doc, &policy).unwrap();
        assert!(out.interlaced);
        assert!(summary.interlace_changed);
        assert!(!Interlacing::Keep.resolve(false));
        assert!(Interlacing::Keep.resolve(true));
        assert!(!Interlacing::Off.resolve(true));
    }

    #[test]
    fn test_alpha_remove_requires_alpha() {
        let doc = ImageDocument::from_pixels(1, 1, 8, ColorType::Rgb, &[1, 2, 3]).unwrap();
        let policy = TransformPolicy {
            alpha: AlphaPolicy::Remove,
            ..TransformPolicy::default()
        };
        let err = apply(doc, &policy).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Transform);
    }
}
