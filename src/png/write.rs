//! Format Writer.
//!
//! Chunk order: signature, IHDR, chunks placed before PLTE, PLTE, tRNS,
//! chunks placed before IDAT, IDAT (split into 256 KiB pieces), chunks placed
//! after IDAT, IEND.

use std::borrow::Cow;

use super::chunk::{write_chunk, ChunkPosition};
use super::filter::{FilterStrategy, FilterType, RowFilter};
use super::interlace::{self, PASSES};
use super::{ImageDocument, PNG_SIGNATURE};
use crate::color::ColorType;
use crate::compress::zlib;
use crate::error::{Error, Result};

/// Largest payload of a single IDAT chunk.
const IDAT_CHUNK_SIZE: usize = 256 * 1024;

/// Scanline groups in serialization order: the whole image, or the seven
/// Adam7 passes (empty passes omitted) when the document is interlaced.
pub fn serialization_passes(doc: &ImageDocument) -> Vec<Cow<'_, [Vec<u8>]>> {
    if !doc.interlaced {
        return vec![Cow::Borrowed(doc.scanlines.as_slice())];
    }
    let bpp_bits = doc.bits_per_pixel();
    PASSES
        .iter()
        .map(|pass| interlace::extract_pass(&doc.scanlines, doc.width, bpp_bits, pass))
        .filter(|rows| !rows.is_empty())
        .map(Cow::Owned)
        .collect()
}

/// Filter every scanline with `strategy`, resetting the filter between passes.
pub fn filtered_stream(doc: &ImageDocument, strategy: FilterStrategy) -> Vec<u8> {
    let row_len = doc.scanline_len();
    let mut out = Vec::with_capacity((row_len + 1) * doc.height as usize + 8);
    let mut filter = RowFilter::new(strategy, doc.filter_bpp(), row_len);
    for pass in serialization_passes(doc) {
        filter.reset(pass.first().map_or(0, Vec::len));
        for row in pass.iter() {
            filter.filter(row, &mut out);
        }
    }
    out
}

/// Serialize `doc` around an already-compressed zlib stream.
pub fn write_document(doc: &ImageDocument, idat: &[u8]) -> Result<Vec<u8>> {
    doc.validate()
        .map_err(|e| Error::Serialization(format!("cannot serialize document: {e}")))?;
    if idat.is_empty() {
        return Err(Error::Serialization("empty image data stream".into()));
    }

    let metadata_len: usize = doc.metadata.iter().map(|c| c.data.len() + 12).sum();
    let mut output = Vec::with_capacity(idat.len() + metadata_len + 1024);
    output.extend_from_slice(&PNG_SIGNATURE);

    write_ihdr(&mut output, doc)?;
    write_metadata(&mut output, doc, ChunkPosition::BeforePalette)?;
    if let Some(palette) = &doc.palette {
        if doc.color_type == ColorType::Indexed {
            let data: Vec<u8> = palette.iter().flatten().copied().collect();
            write_chunk(&mut output, b"PLTE", &data)?;
        }
    }
    if let Some(trns) = &doc.transparency {
        if !trns.is_empty() {
            write_chunk(&mut output, b"tRNS", trns)?;
        }
    }
    write_metadata(&mut output, doc, ChunkPosition::BeforeData)?;
    for piece in idat.chunks(IDAT_CHUNK_SIZE) {
        write_chunk(&mut output, b"IDAT", piece)?;
    }
    write_metadata(&mut output, doc, ChunkPosition::AfterData)?;
    write_chunk(&mut output, b"IEND", &[])?;
    Ok(output)
}

/// Filter, compress, and serialize `doc` with a single fixed heuristic.
///
/// Palette and sub-byte images use no filter, everything else Paeth, and the
/// stream is compressed at zlib `level`.
pub fn encode(doc: &ImageDocument, level: u8) -> Result<Vec<u8>> {
    let strategy = FilterStrategy::Fixed(default_filter(doc));
    let idat = zlib::compress(&filtered_stream(doc, strategy), level)?;
    write_document(doc, &idat)
}

/// Fixed filter that suits the document's pixel layout.
pub fn default_filter(doc: &ImageDocument) -> FilterType {
    if doc.color_type == ColorType::Indexed || doc.bit_depth < 8 {
        FilterType::None
    } else {
        FilterType::Paeth
    }
}

fn write_ihdr(output: &mut Vec<u8>, doc: &ImageDocument) -> Result<()> {
    let mut data = Vec::with_capacity(13);
    data.extend_from_slice(&doc.width.to_be_bytes());
    data.extend_from_slice(&doc.height.to_be_bytes());
    data.push(doc.bit_depth);
    data.push(doc.color_type.png_code());
    data.push(0); // compression method
    data.push(0); // filter method
    data.push(u8::from(doc.interlaced));
    write_chunk(output, b"IHDR", &data)
}

fn write_metadata(output: &mut Vec<u8>, doc: &ImageDocument, position: ChunkPosition) -> Result<()> {
    for chunk in doc.metadata.iter().filter(|c| c.position == position) {
        write_chunk(output, &chunk.name, &chunk.data)?;
    }
    Ok(())
}
