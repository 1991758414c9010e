//! PNG chunk handling.

use crate::compress::crc32::Crc32;
use crate::error::{Error, Result};

/// Where an ancillary chunk is written relative to the critical chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChunkPosition {
    /// After IHDR, before PLTE.
    BeforePalette,
    /// After PLTE (if any), before the first IDAT.
    BeforeData,
    /// After the last IDAT, before IEND.
    AfterData,
}

/// An ancillary chunk carried through the pipeline unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Four-byte chunk type.
    pub name: [u8; 4],
    /// Chunk payload.
    pub data: Vec<u8>,
    /// Where the writer places it.
    pub position: ChunkPosition,
}

impl Chunk {
    /// Create a chunk, placing it according to its type when the type has a
    /// fixed position and at `observed` otherwise.
    pub fn new(name: [u8; 4], data: Vec<u8>, observed: ChunkPosition) -> Self {
        let position = match &name {
            // Must sit between PLTE and IDAT.
            b"bKGD" | b"hIST" => ChunkPosition::BeforeData,
            _ => required_position(&name).map_or(observed, |req| req.min(observed)),
        };
        Self {
            name,
            data,
            position,
        }
    }

    /// Chunk type as text (lossy for non-ASCII types).
    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }

    /// Whether this chunk may be copied by an editor that changed the image data.
    pub fn is_safe_to_copy(&self) -> bool {
        is_safe_to_copy(&self.name)
    }
}

/// Critical chunks have an uppercase first letter.
#[inline]
pub fn is_critical(name: &[u8; 4]) -> bool {
    name[0].is_ascii_uppercase()
}

/// Safe-to-copy chunks have a lowercase fourth letter.
#[inline]
pub fn is_safe_to_copy(name: &[u8; 4]) -> bool {
    name[3].is_ascii_lowercase()
}

/// Chunk types must consist of ASCII letters.
#[inline]
pub fn is_valid_name(name: &[u8; 4]) -> bool {
    name.iter().all(u8::is_ascii_alphabetic)
}

/// Chunks that describe the pixel encoding and become stale once the color
/// type, bit depth, or palette changes.
pub fn depends_on_encoding(name: &[u8; 4]) -> bool {
    matches!(name, b"bKGD" | b"sBIT" | b"hIST")
}

/// Latest legal position for chunk types with ordering constraints.
pub fn required_position(name: &[u8; 4]) -> Option<ChunkPosition> {
    match name {
        b"cHRM" | b"gAMA" | b"iCCP" | b"sBIT" | b"sRGB" | b"cICP" | b"mDCv" | b"cLLi" => {
            Some(ChunkPosition::BeforePalette)
        }
        b"bKGD" | b"hIST" | b"pHYs" | b"sPLT" | b"oFFs" | b"pCAL" | b"sCAL" => {
            Some(ChunkPosition::BeforeData)
        }
        _ => None,
    }
}

/// Write a PNG chunk (length, type, data, CRC32) to the output buffer.
pub fn write_chunk(output: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) -> Result<()> {
    let len = u32::try_from(data.len())
        .ok()
        .filter(|&l| l <= i32::MAX as u32)
        .ok_or_else(|| {
            Error::Serialization(format!(
                "{} chunk of {} bytes exceeds the PNG length limit",
                String::from_utf8_lossy(chunk_type),
                data.len()
            ))
        })?;
    output.reserve(12 + data.len());

    let mut crc = Crc32::new();
    crc.update(chunk_type);
    crc.update(data);
    let crc = crc.finalize();

    output.extend_from_slice(&len.to_be_bytes());
    output.extend_from_slice(chunk_type);
    output.extend_from_slice(data);
    output.extend_from_slice(&crc.to_be_bytes());
    Ok(())
}

/// A chunk as found in the input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawChunk<'a> {
    /// Four-byte chunk type.
    pub name: [u8; 4],
    /// Payload, borrowed from the input.
    pub data: &'a [u8],
    /// Whether the stored CRC matched.
    pub crc_ok: bool,
}

/// Iterator over the chunks following the PNG signature.
///
/// Yields an error and stops on a truncated or malformed chunk header.
pub struct Chunks<'a> {
    data: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> Chunks<'a> {
    /// Iterate chunks of `data`, starting at byte offset `pos`.
    pub fn new(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos,
            done: false,
        }
    }

    /// Number of bytes consumed so far.
    pub fn offset(&self) -> usize {
        self.pos
    }

    fn next_chunk(&mut self) -> Result<Option<RawChunk<'a>>> {
        let rest = &self.data[self.pos.min(self.data.len())..];
        if rest.is_empty() {
            return Ok(None);
        }
        if rest.len() < 12 {
            return Err(Error::Format(format!(
                "truncated chunk header at offset {}",
                self.pos
            )));
        }
        let length = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
        if length > i32::MAX as u32 {
            return Err(Error::Format(format!("chunk length {length} out of range")));
        }
        let length = length as usize;
        let name = [rest[4], rest[5], rest[6], rest[7]];
        if !is_valid_name(&name) {
            return Err(Error::Format(format!(
                "invalid chunk type {:?} at offset {}",
                String::from_utf8_lossy(&name),
                self.pos
            )));
        }
        if rest.len() < 12 + length {
            return Err(Error::Format(format!(
                "truncated {} chunk: need {} bytes, have {}",
                String::from_utf8_lossy(&name),
                length + 12,
                rest.len()
            )));
        }
        let data = &rest[8..8 + length];
        let stored = u32::from_be_bytes([
            rest[8 + length],
            rest[9 + length],
            rest[10 + length],
            rest[11 + length],
        ]);
        let mut crc = Crc32::new();
        crc.update(&name);
        crc.update(data);
        self.pos += 12 + length;
        Ok(Some(RawChunk {
            name,
            data,
            crc_ok: crc.finalize() == stored,
        }))
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Result<RawChunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
