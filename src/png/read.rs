//! Format Reader.
//!
//! Supported:
//! - Color types: 0 (Gray), 2 (RGB), 3 (Indexed), 4 (Gray+Alpha), 6 (RGBA)
//! - Bit depths: 1, 2, 4, 8, 16 as allowed per color type
//! - Non-interlaced and Adam7 images
//! - Ancillary chunks are kept in file order along with their position
//!
//! Every chunk length is checked against the remaining input before use.
//! A corrupt ancillary chunk is skipped; a corrupt critical chunk is fatal.

use tracing::{debug, warn};

use super::chunk::{is_critical, Chunk, ChunkPosition, Chunks};
use super::filter::unfilter_row;
use super::interlace::{self, PASSES};
use super::{ImageDocument, MAX_DIMENSION, MAX_IMAGE_BYTES, PNG_SIGNATURE};
use crate::color::ColorType;
use crate::compress::zlib;
use crate::error::{Error, Result};

/// Reader output: the document plus what is needed to re-emit the input as-is.
#[derive(Debug, Clone)]
pub struct Decoded {
    /// The decoded image.
    pub document: ImageDocument,
    /// Concatenated IDAT payload exactly as stored in the input.
    pub idat: Vec<u8>,
    /// Whether the reader had to discard or repair anything.
    ///
    /// When set, the input bytes are not a faithful serialization of
    /// `document` and must not be passed through.
    pub repaired: bool,
}

struct Ihdr {
    width: u32,
    height: u32,
    bit_depth: u8,
    color_type: ColorType,
    interlaced: bool,
}

/// Decode a PNG from memory.
pub fn decode(png_data: &[u8]) -> Result<Decoded> {
    if png_data.len() < PNG_SIGNATURE.len() + 12 {
        return Err(Error::Format("PNG too small".into()));
    }
    if png_data[..8] != PNG_SIGNATURE {
        return Err(Error::Format("invalid PNG signature".into()));
    }

    let mut ihdr: Option<Ihdr> = None;
    let mut palette: Option<Vec<[u8; 3]>> = None;
    let mut trns: Option<Vec<u8>> = None;
    let mut idat: Vec<u8> = Vec::new();
    let mut metadata: Vec<Chunk> = Vec::new();
    let mut idat_state = IdatState::NotSeen;
    let mut seen_iend = false;
    let mut repaired = false;

    let mut chunks = Chunks::new(png_data, PNG_SIGNATURE.len());
    for chunk in chunks.by_ref() {
        let chunk = chunk?;
        let name = chunk.name;
        let critical = is_critical(&name);

        if ihdr.is_none() && &name != b"IHDR" {
            return Err(Error::Format("first chunk is not IHDR".into()));
        }
        if !chunk.crc_ok {
            if critical {
                return Err(Error::Format(format!(
                    "CRC mismatch for chunk {:?}",
                    String::from_utf8_lossy(&name)
                )));
            }
            warn!(chunk = %String::from_utf8_lossy(&name), "skipping ancillary chunk with bad CRC");
            repaired = true;
            continue;
        }
        if idat_state == IdatState::Reading && &name != b"IDAT" {
            idat_state = IdatState::Done;
        }

        match &name {
            b"IHDR" => {
                if ihdr.is_some() {
                    return Err(Error::Format("multiple IHDR chunks".into()));
                }
                ihdr = Some(parse_ihdr(chunk.data)?);
            }
            b"PLTE" => {
                if palette.is_some() {
                    return Err(Error::Format("multiple PLTE chunks".into()));
                }
                if idat_state != IdatState::NotSeen {
                    return Err(Error::Format("PLTE after image data".into()));
                }
                palette = Some(parse_palette(chunk.data)?);
            }
            b"tRNS" => {
                if idat_state != IdatState::NotSeen {
                    return Err(Error::Format("tRNS after image data".into()));
                }
                trns = Some(chunk.data.to_vec());
            }
            b"IDAT" => {
                if idat_state == IdatState::Done {
                    return Err(Error::Format("IDAT chunks are not consecutive".into()));
                }
                idat_state = IdatState::Reading;
                idat.extend_from_slice(chunk.data);
            }
            b"IEND" => {
                seen_iend = true;
                break;
            }
            b"acTL" | b"fcTL" | b"fdAT" => {
                warn!(chunk = %String::from_utf8_lossy(&name), "discarding animation chunk");
                repaired = true;
            }
            _ if critical => {
                return Err(Error::Format(format!(
                    "unsupported critical chunk {:?}",
                    String::from_utf8_lossy(&name)
                )));
            }
            _ => {
                let observed = match idat_state {
                    IdatState::NotSeen if palette.is_none() => ChunkPosition::BeforePalette,
                    IdatState::NotSeen => ChunkPosition::BeforeData,
                    _ => ChunkPosition::AfterData,
                };
                metadata.push(Chunk::new(name, chunk.data.to_vec(), observed));
            }
        }
    }

    if !seen_iend {
        return Err(Error::Format("missing IEND chunk".into()));
    }
    if chunks.offset() < png_data.len() {
        debug!(
            trailing = png_data.len() - chunks.offset(),
            "ignoring data after IEND"
        );
        repaired = true;
    }
    let ihdr = ihdr.ok_or_else(|| Error::Format("missing IHDR chunk".into()))?;
    if idat.is_empty() {
        return Err(Error::Format("missing IDAT chunk".into()));
    }

    match ihdr.color_type {
        ColorType::Indexed => {
            if palette.is_none() {
                return Err(Error::Format("palette image missing PLTE chunk".into()));
            }
        }
        ColorType::Gray | ColorType::GrayAlpha => {
            if palette.is_some() {
                return Err(Error::Format("PLTE chunk in grayscale image".into()));
            }
        }
        ColorType::Rgb | ColorType::Rgba => {
            // A suggested palette for truecolor images carries no pixel data.
            if palette.take().is_some() {
                debug!("dropping suggested palette of truecolor image");
                repaired = true;
            }
        }
    }
    if let (ColorType::Indexed, Some(alpha), Some(pal)) = (ihdr.color_type, &mut trns, &palette) {
        if alpha.len() > pal.len() {
            warn!(entries = alpha.len(), palette = pal.len(), "truncating oversized tRNS");
            alpha.truncate(pal.len());
            repaired = true;
        }
    }

    let scanlines = decode_scanlines(&ihdr, &idat)?;
    let document = ImageDocument {
        width: ihdr.width,
        height: ihdr.height,
        bit_depth: ihdr.bit_depth,
        color_type: ihdr.color_type,
        palette,
        transparency: trns,
        scanlines,
        metadata,
        interlaced: ihdr.interlaced,
    };
    document.validate().map_err(Error::Format)?;
    if document.color_type == ColorType::Indexed {
        check_palette_indices(&document)?;
    }

    debug!(
        width = document.width,
        height = document.height,
        bit_depth = document.bit_depth,
        color_type = ?document.color_type,
        interlaced = document.interlaced,
        chunks = document.metadata.len(),
        "decoded PNG"
    );
    Ok(Decoded {
        document,
        idat,
        repaired,
    })
}

/// Decode a PNG from memory, keeping only the document.
pub fn read_document(png_data: &[u8]) -> Result<ImageDocument> {
    decode(png_data).map(|d| d.document)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdatState {
    NotSeen,
    Reading,
    Done,
}

fn parse_ihdr(data: &[u8]) -> Result<Ihdr> {
    let [w0, w1, w2, w3, h0, h1, h2, h3, bit_depth, color_type, compression, filter, interlace] =
        *data
    else {
        return Err(Error::Format("IHDR length must be 13".into()));
    };
    let width = u32::from_be_bytes([w0, w1, w2, w3]);
    let height = u32::from_be_bytes([h0, h1, h2, h3]);

    if compression != 0 {
        return Err(Error::Format(format!(
            "unsupported compression method {compression}"
        )));
    }
    if filter != 0 {
        return Err(Error::Format(format!("unsupported filter method {filter}")));
    }
    let interlaced = match interlace {
        0 => false,
        1 => true,
        other => {
            return Err(Error::Format(format!(
                "unsupported interlace method {other}"
            )))
        }
    };
    if width == 0 || height == 0 {
        return Err(Error::Format(format!(
            "invalid image dimensions: {width}x{height}"
        )));
    }
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(Error::Format(format!(
            "image {width}x{height} exceeds maximum dimension {MAX_DIMENSION}"
        )));
    }
    let color_type = ColorType::from_png(color_type)
        .ok_or_else(|| Error::Format(format!("invalid color type {color_type}")))?;
    if !color_type.allows_bit_depth(bit_depth) {
        return Err(Error::Format(format!(
            "bit depth {bit_depth} is not valid for color type {color_type:?}"
        )));
    }
    Ok(Ihdr {
        width,
        height,
        bit_depth,
        color_type,
        interlaced,
    })
}

fn parse_palette(data: &[u8]) -> Result<Vec<[u8; 3]>> {
    if data.is_empty() || data.len() % 3 != 0 || data.len() > 256 * 3 {
        return Err(Error::Format(format!(
            "invalid PLTE length {}",
            data.len()
        )));
    }
    Ok(data.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect())
}

fn decode_scanlines(ihdr: &Ihdr, idat: &[u8]) -> Result<Vec<Vec<u8>>> {
    let ct = ihdr.color_type;
    let bpp_bits = ct.bits_per_pixel(ihdr.bit_depth);
    let filter_bpp = ct.filter_bpp(ihdr.bit_depth);
    let row_len = |w: u32| {
        ct.scanline_len(w, ihdr.bit_depth)
            .ok_or_else(|| Error::Format("image size overflow".into()))
    };

    let passes: Vec<(u32, u32)> = if ihdr.interlaced {
        PASSES
            .iter()
            .map(|p| p.dimensions(ihdr.width, ihdr.height))
            .collect()
    } else {
        vec![(ihdr.width, ihdr.height)]
    };
    let mut expected = 0usize;
    for &(w, h) in &passes {
        if w == 0 || h == 0 {
            continue;
        }
        let bytes = (row_len(w)? + 1)
            .checked_mul(h as usize)
            .ok_or_else(|| Error::Format("image size overflow".into()))?;
        expected = expected
            .checked_add(bytes)
            .ok_or_else(|| Error::Format("image size overflow".into()))?;
    }

    if expected as u64 > MAX_IMAGE_BYTES {
        return Err(Error::Format(format!(
            "image data of {expected} bytes exceeds the {MAX_IMAGE_BYTES} byte limit"
        )));
    }
    let raw = zlib::decompress(idat, expected)?;
    let mut cursor = 0;
    let mut reduced_images = Vec::with_capacity(passes.len());
    for &(w, h) in &passes {
        if w == 0 || h == 0 {
            reduced_images.push(Vec::new());
            continue;
        }
        let len = row_len(w)?;
        let mut rows: Vec<Vec<u8>> = Vec::with_capacity(h as usize);
        let mut prev = vec![0u8; len];
        for _ in 0..h {
            let filter_byte = raw[cursor];
            let mut row = raw[cursor + 1..cursor + 1 + len].to_vec();
            cursor += len + 1;
            unfilter_row(filter_byte, &mut row, &prev, filter_bpp)?;
            prev.clone_from(&row);
            rows.push(row);
        }
        reduced_images.push(rows);
    }

    if ihdr.interlaced {
        Ok(interlace::deinterlace(
            &reduced_images,
            ihdr.width,
            ihdr.height,
            bpp_bits,
        ))
    } else {
        Ok(reduced_images.pop().unwrap_or_default())
    }
}

fn check_palette_indices(doc: &ImageDocument) -> Result<()> {
    let entries = doc.palette.as_ref().map_or(0, Vec::len) as u16;
    for y in 0..doc.height as usize {
        if let Some(&idx) = doc.row_samples(y).iter().find(|&&i| i >= entries) {
            return Err(Error::Format(format!(
                "palette index {idx} out of range for {entries} entries (row {y})"
            )));
        }
    }
    Ok(())
}
