//! # tinyimg
//!
//! A PNG re-encoding and optimization engine.
//!
//! Input is parsed into an [`ImageDocument`], optionally quantized, passed
//! through lossless color reductions and metadata stripping, and re-encoded
//! with the smallest (filter strategy, zlib level) combination found before a
//! deadline.
//!
//! ## Features
//!
//! - **Lossless by default**: decoded pixels of the output equal the input's
//! - **Lossless reductions**: bit depth, alpha, grayscale, and palette
//! - **Bounded lossy mode**: median-cut quantization within a CIE76 ΔE budget
//! - **Timeouts** that degrade to a valid output instead of failing
//! - Optional parallel batch processing via the `parallel` feature
//!
//! ## Example
//!
//! ```rust
//! use tinyimg::{png, ColorType, Driver, ImageDocument, Options};
//!
//! let doc = ImageDocument::from_pixels(1, 1, 8, ColorType::Rgba, &[255, 0, 0, 255]).unwrap();
//! let input = png::encode(&doc, 6).unwrap();
//!
//! let result = Driver::new(Options::from_preset(2)).run(&input).unwrap();
//! assert!(result.optimized_size <= result.original_size);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod batch;
pub mod color;
pub mod compress;
pub mod driver;
pub mod error;
pub mod optimizer;
pub mod png;
pub mod report;
pub mod transform;

pub use api::{compress, optimize, InFile, Operation, OutFile};
pub use color::ColorType;
pub use driver::{Driver, OptimizationResult, Options, Outcome, Stage};
pub use error::{Error, ErrorKind, Result};
pub use optimizer::{CompressionParameters, Deadline};
pub use png::ImageDocument;
pub use transform::{AlphaPolicy, Interlacing, LossyOptions, StripChunks};
