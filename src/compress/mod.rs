//! Checksums and zlib streams.

pub mod crc32;
pub mod zlib;

pub use crc32::{chunk_crc, crc32};
