//! Optimization Driver.
//!
//! One [`Driver::run`] call walks `Idle → Reading → Transforming → Optimizing
//! → Writing → Done`, or ends in `Failed(kind)` from any stage. The deadline
//! spans the whole call; when it runs out before any trial finishes the driver
//! falls back to re-emitting the input's own compressed stream, or to one
//! encode with the default filter when that stream cannot be reused.

use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Error, ErrorKind, Result};
use crate::optimizer::{self, CompressionParameters, Deadline, Trial};
use crate::png::{self, ImageDocument};
use crate::report;
use crate::transform::{
    self, quantize, AlphaPolicy, Interlacing, LossyOptions, StripChunks, TransformPolicy,
    TransformSummary,
};

/// zlib level of the single encode made after the deadline has passed.
const DEGRADED_ZLIB_LEVEL: u8 = 1;

/// Everything one run is configured with.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// Trials the optimizer runs.
    pub params: CompressionParameters,
    /// Metadata stripping.
    pub strip: StripChunks,
    /// Alpha handling.
    pub alpha: AlphaPolicy,
    /// Output interlacing.
    pub interlace: Interlacing,
    /// Quantize before the transform stage.
    pub lossy: Option<LossyOptions>,
    /// Lossless color type and bit depth reductions.
    pub reductions: bool,
    /// Budget for the whole run.
    pub timeout: Option<Duration>,
    /// Log a size summary at info level when done.
    pub verbose: bool,
}

impl Options {
    /// Options for preset `level` (0-6, see [`CompressionParameters::from_preset`]).
    pub fn from_preset(level: u8) -> Self {
        Self {
            params: CompressionParameters::from_preset(level),
            strip: StripChunks::All,
            alpha: AlphaPolicy::Keep,
            interlace: Interlacing::Keep,
            lossy: None,
            reductions: true,
            timeout: None,
            verbose: false,
        }
    }

    /// The transform stage's share of the options.
    pub fn transform_policy(&self) -> TransformPolicy {
        TransformPolicy {
            strip: self.strip,
            alpha: self.alpha,
            interlace: self.interlace,
            reductions: self.reductions,
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::from_preset(2)
    }
}

/// Where a run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Not started.
    Idle,
    /// Parsing the input.
    Reading,
    /// Quantization, alpha handling, stripping, reductions.
    Transforming,
    /// Searching compression parameters.
    Optimizing,
    /// Serializing the output.
    Writing,
    /// Finished with an output.
    Done,
    /// Finished with an error of this kind.
    Failed(ErrorKind),
}

/// How the output was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Re-encoded with the best trial.
    Optimized,
    /// The input bytes, because nothing beat them.
    Unchanged,
    /// The deadline passed before any trial finished; the input's compressed
    /// stream was reused with the stripped metadata.
    Degraded,
}

/// Output and statistics of one run.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// The output file.
    pub data: Vec<u8>,
    /// Input size in bytes.
    pub original_size: usize,
    /// Output size in bytes.
    pub optimized_size: usize,
    /// Time from the start of the run.
    pub elapsed: Duration,
    /// How `data` was produced.
    pub outcome: Outcome,
    /// Winning trial, for [`Outcome::Optimized`].
    pub trial: Option<Trial>,
    /// What the transform stage changed.
    pub summary: TransformSummary,
}

impl OptimizationResult {
    /// Bytes saved; negative when the output grew.
    pub fn saved(&self) -> i64 {
        self.original_size as i64 - self.optimized_size as i64
    }

    /// Output size relative to the input, as a fraction.
    pub fn ratio(&self) -> f64 {
        if self.original_size == 0 {
            return 1.0;
        }
        self.optimized_size as f64 / self.original_size as f64
    }
}

/// Runs the pipeline for one input.
#[derive(Debug)]
pub struct Driver {
    options: Options,
    stage: Stage,
    history: Vec<Stage>,
}

impl Driver {
    /// A driver in the `Idle` stage.
    pub fn new(options: Options) -> Self {
        Self {
            options,
            stage: Stage::Idle,
            history: vec![Stage::Idle],
        }
    }

    /// Current stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Every stage entered so far, starting with `Idle`.
    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    /// The options this driver runs with.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Optimize `input`, with the deadline starting now.
    pub fn run(&mut self, input: &[u8]) -> Result<OptimizationResult> {
        let deadline = Deadline::after(self.options.timeout);
        self.run_with_deadline(input, &deadline)
    }

    /// Optimize `input` against a deadline that may have started earlier.
    pub fn run_with_deadline(
        &mut self,
        input: &[u8],
        deadline: &Deadline,
    ) -> Result<OptimizationResult> {
        match self.pipeline(input, deadline) {
            Ok(result) => {
                self.enter(Stage::Done);
                if self.options.verbose {
                    info!(
                        outcome = ?result.outcome,
                        elapsed = ?result.elapsed,
                        "{}",
                        report::size_change(result.original_size as u64, result.optimized_size as u64)
                    );
                }
                Ok(result)
            }
            Err(e) => {
                self.enter(Stage::Failed(e.kind()));
                Err(e)
            }
        }
    }

    fn enter(&mut self, stage: Stage) {
        debug!(from = ?self.stage, to = ?stage, "stage transition");
        self.stage = stage;
        self.history.push(stage);
    }

    fn pipeline(&mut self, input: &[u8], deadline: &Deadline) -> Result<OptimizationResult> {
        self.enter(Stage::Reading);
        let decoded = png::decode(input)?;
        let input_interlaced = decoded.document.interlaced;
        // Only a run with a deadline can need the untouched document again.
        let fallback = deadline.is_bounded().then(|| decoded.document.clone());

        self.enter(Stage::Transforming);
        let mut doc = decoded.document;
        let mut quantized = false;
        if let Some(lossy) = &self.options.lossy {
            if let Some(q) = quantize::quantize(&doc, lossy, deadline)? {
                doc = q;
                quantized = true;
            }
        }
        let policy = self.options.transform_policy();
        let unreduced = policy.reductions.then(|| doc.clone());
        let mut candidates = vec![transform::apply(doc, &policy)?];
        // A reduced encoding is not always smaller (PLTE overhead on tiny images),
        // so the unreduced document competes too.
        if let Some(doc) = unreduced.filter(|_| candidates[0].1.encoding_changed) {
            let plain = TransformPolicy {
                reductions: false,
                ..policy
            };
            candidates.push(transform::apply(doc, &plain)?);
        }
        for (_, summary) in &mut candidates {
            summary.pixels_changed |= quantized;
        }
        let identity_possible = !decoded.repaired && candidates.iter().any(|(_, s)| s.is_identity());

        self.enter(Stage::Optimizing);
        let mut searched = Vec::with_capacity(candidates.len());
        for (doc, summary) in candidates {
            let search = optimizer::search(&doc, &self.options.params, deadline)?;
            if let Some(best) = search.best {
                searched.push((doc, summary, best));
            }
        }

        self.enter(Stage::Writing);
        let mut best: Option<(Vec<u8>, Trial, TransformSummary)> = None;
        for (doc, summary, candidate) in searched {
            let encoded = png::write_document(&doc, &candidate.idat)?;
            if best.as_ref().map_or(true, |(data, _, _)| encoded.len() < data.len()) {
                best = Some((encoded, candidate.trial, summary));
            }
        }

        let (data, outcome, trial, summary) = match best {
            Some((encoded, _, _)) if identity_possible && input.len() <= encoded.len() => {
                debug!(
                    input = input.len(),
                    candidate = encoded.len(),
                    "keeping the input; nothing beat it"
                );
                (input.to_vec(), Outcome::Unchanged, None, TransformSummary::default())
            }
            Some((encoded, trial, summary)) => (encoded, Outcome::Optimized, Some(trial), summary),
            None => {
                let (degraded, summary) =
                    self.degrade(fallback, &decoded.idat, input_interlaced, deadline)?;
                (degraded, Outcome::Degraded, None, summary)
            }
        };

        Ok(OptimizationResult {
            original_size: input.len(),
            optimized_size: data.len(),
            data,
            elapsed: deadline.elapsed(),
            outcome,
            trial,
            summary,
        })
    }

    /// Output for a run whose deadline passed before any trial finished.
    ///
    /// The input's compressed stream is reused with only metadata stripping
    /// when it already has the requested layout. Otherwise the transformed
    /// document is encoded once with the default filter, ignoring the deadline.
    fn degrade(
        &self,
        fallback: Option<ImageDocument>,
        idat: &[u8],
        input_interlaced: bool,
        deadline: &Deadline,
    ) -> Result<(Vec<u8>, TransformSummary)> {
        let Some(mut doc) = fallback else {
            return Err(Error::Timeout {
                elapsed: deadline.elapsed(),
            });
        };
        let same_layout = self.options.interlace.resolve(input_interlaced) == input_interlaced;
        if same_layout && self.options.alpha != AlphaPolicy::Remove {
            let dropped = transform::strip_metadata(&mut doc, self.options.strip);
            debug!(dropped = dropped.len(), "deadline passed; reusing the original image data");
            let summary = TransformSummary {
                dropped_chunks: dropped,
                ..TransformSummary::default()
            };
            return Ok((png::write_document(&doc, idat)?, summary));
        }

        let (doc, summary) = transform::apply(doc, &self.options.transform_policy())?;
        debug!(
            interlaced = doc.interlaced,
            level = DEGRADED_ZLIB_LEVEL,
            "deadline passed; encoding once with the default filter"
        );
        Ok((png::encode(&doc, DEGRADED_ZLIB_LEVEL)?, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::ColorType;
    use crate::png::{Chunk, ChunkPosition};

    fn sample_png(interlaced: bool) -> Vec<u8> {
        let data: Vec<u8> = (0..24 * 16)
            .flat_map(|i: u32| [(i % 24 * 10) as u8, (i / 24 * 15) as u8, 200, 255])
            .collect();
        let mut doc = ImageDocument::from_pixels(24, 16, 8, ColorType::Rgba, &data).unwrap();
        doc.interlaced = interlaced;
        doc.metadata = vec![Chunk::new(*b"tEXt", b"Comment\0hi".to_vec(), ChunkPosition::AfterData)];
        png::encode(&doc, 1).unwrap()
    }

    #[test]
    fn test_stage_history() {
        let mut driver = Driver::new(Options::default());
        assert_eq!(driver.stage(), Stage::Idle);
        driver.run(&sample_png(false)).unwrap();
        assert_eq!(
            driver.history(),
            &[
                Stage::Idle,
                Stage::Reading,
                Stage::Transforming,
                Stage::Optimizing,
                Stage::Writing,
                Stage::Done
            ]
        );
    }

    #[test]
    fn test_failure_records_kind() {
        let mut driver = Driver::new(Options::default());
        let err = driver.run(b"not a png").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert_eq!(driver.stage(), Stage::Failed(ErrorKind::Format));
    }

    #[test]
    fn test_optimized_output_is_lossless() {
        let input = sample_png(false);
        let result = Driver::new(Options::default()).run(&input).unwrap();
        assert_eq!(result.outcome, Outcome::Optimized);
        assert!(result.optimized_size < result.original_size);
        let before = png::read_document(&input).unwrap();
        let after = png::read_document(&result.data).unwrap();
        assert_eq!(before.to_rgba16(), after.to_rgba16());
        assert_eq!(after.color_type, ColorType::Rgb);
        assert!(after.metadata.is_empty());
    }

    #[test]
    fn test_optimal_input_is_kept() {
        let first = Driver::new(Options::default())
            .run(&sample_png(false))
            .unwrap();
        let second = Driver::new(Options::default()).run(&first.data).unwrap();
        assert_eq!(second.outcome, Outcome::Unchanged);
        assert_eq!(second.data, first.data);
    }

    #[test]
    fn test_zero_timeout_degrades() {
        let input = sample_png(false);
        let options = Options {
            timeout: Some(Duration::ZERO),
            interlace: Interlacing::Off,
            ..Options::default()
        };
        let result = Driver::new(options).run(&input).unwrap();
        assert_eq!(result.outcome, Outcome::Degraded);
        let before = png::read_document(&input).unwrap();
        let after = png::read_document(&result.data).unwrap();
        assert_eq!(before.to_rgba16(), after.to_rgba16());
        assert!(after.metadata.is_empty());
    }

    #[test]
    fn test_zero_timeout_with_new_interlacing_encodes_default() {
        for (input_interlaced, interlace) in [(false, Interlacing::Adam7), (true, Interlacing::Off)] {
            let input = sample_png(input_interlaced);
            let options = Options {
                timeout: Some(Duration::ZERO),
                interlace,
                ..Options::default()
            };
            let mut driver = Driver::new(options);
            let result = driver.run(&input).unwrap();
            assert_eq!(result.outcome, Outcome::Degraded);
            assert_eq!(driver.stage(), Stage::Done);
            let before = png::read_document(&input).unwrap();
            let after = png::read_document(&result.data).unwrap();
            assert_eq!(after.interlaced, !input_interlaced);
            assert_eq!(before.to_rgba16(), after.to_rgba16());
            assert!(after.metadata.is_empty());
        }
    }

    #[test]
    fn test_expired_external_deadline_degrades() {
        let deadline = Deadline::after(Some(Duration::ZERO));
        let result = Driver::new(Options::default())
            .run_with_deadline(&sample_png(false), &deadline)
            .unwrap();
        assert_eq!(result.outcome, Outcome::Degraded);
        png::read_document(&result.data).unwrap();
    }

    #[test]
    fn test_zero_timeout_with_alpha_removal_encodes_default() {
        let options = Options {
            timeout: Some(Duration::ZERO),
            alpha: AlphaPolicy::Remove,
            ..Options::default()
        };
        let result = Driver::new(options).run(&sample_png(false)).unwrap();
        assert_eq!(result.outcome, Outcome::Degraded);
        assert!(result.summary.pixels_changed);
        let after = png::read_document(&result.data).unwrap();
        assert!(!after.color_type.has_alpha_channel());
        assert!(after.transparency.is_none());
    }

    #[test]
    fn test_lossy_run_marks_pixels_changed() {
        let data: Vec<u8> = (0..64 * 64u32)
            .flat_map(|i| [(i % 64 * 4) as u8, (i / 64 * 4) as u8, ((i * 7) % 251) as u8])
            .collect();
        let doc = ImageDocument::from_pixels(64, 64, 8, ColorType::Rgb, &data).unwrap();
        let input = png::encode(&doc, 6).unwrap();
        let options = Options {
            lossy: Some(LossyOptions::default()),
            ..Options::default()
        };
        let result = Driver::new(options).run(&input).unwrap();
        assert!(result.summary.pixels_changed);
        let out = png::read_document(&result.data).unwrap();
        assert_eq!(out.color_type, ColorType::Indexed);
    }
}
