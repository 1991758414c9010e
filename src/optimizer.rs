//! Compression Optimizer.
//!
//! A search over (filter strategy, zlib level) trials. Every trial filters and
//! compresses the scanlines one row at a time so the deadline is polled at
//! scanline granularity; a trial cut short by the deadline is discarded. The
//! smallest finished stream wins and ties go to the earlier trial, so results
//! depend only on the input and the parameters.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::compress::zlib::{ZlibWriter, MAX_LEVEL};
use crate::error::Result;
use crate::png::filter::{FilterStrategy, FilterType, RowFilter};
use crate::png::write::{default_filter, serialization_passes};
use crate::png::ImageDocument;

/// Highest preset level.
pub const MAX_PRESET: u8 = 6;

/// Point in time after which no new work is started.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    /// A deadline that never expires.
    pub fn none() -> Self {
        Self {
            start: Instant::now(),
            limit: None,
        }
    }

    /// Expires `limit` after now; `None` never expires.
    pub fn after(limit: Option<Duration>) -> Self {
        Self::starting_at(Instant::now(), limit)
    }

    /// Expires `limit` after `start`.
    pub fn starting_at(start: Instant, limit: Option<Duration>) -> Self {
        Self { start, limit }
    }

    /// Whether this deadline can expire at all.
    pub fn is_bounded(&self) -> bool {
        self.limit.is_some()
    }

    /// Whether the budget is used up.
    pub fn expired(&self) -> bool {
        self.limit.is_some_and(|limit| self.start.elapsed() >= limit)
    }

    /// Time since the deadline started counting.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}

/// What the optimizer tries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionParameters {
    /// Preset level this was built from (0-6).
    pub level: u8,
    /// Filter strategies to try, in order.
    pub filters: Vec<FilterStrategy>,
    /// zlib levels to try with every filter strategy, in order.
    pub zlib_levels: Vec<u8>,
    /// Run a single trial with a fixed filter instead of the search.
    pub fast: bool,
}

impl Default for CompressionParameters {
    fn default() -> Self {
        Self::from_preset(2)
    }
}

impl CompressionParameters {
    /// Parameters for preset `level`; levels above 6 clamp to 6.
    ///
    /// | level | filters                                 | zlib    |
    /// |-------|-----------------------------------------|---------|
    /// | 0     | minsum                                  | 1       |
    /// | 1     | minsum                                  | 6       |
    /// | 2     | none, minsum                            | 9       |
    /// | 3     | none, paeth, minsum                     | 9       |
    /// | 4     | none, sub, up, paeth, minsum, entropy   | 9       |
    /// | 5     | all five fixed, minsum, entropy, bigrams | 9, 8    |
    /// | 6     | as 5                                    | 9, 8, 7 |
    pub fn from_preset(level: u8) -> Self {
        use FilterStrategy::{Bigrams, Entropy, Fixed, MinSum};
        use FilterType::{Average, Paeth, Sub, Up};

        let level = level.min(MAX_PRESET);
        let every_filter = vec![
            Fixed(FilterType::None),
            Fixed(Sub),
            Fixed(Up),
            Fixed(Average),
            Fixed(Paeth),
            MinSum,
            Entropy,
            Bigrams,
        ];
        let (filters, zlib_levels) = match level {
            0 => (vec![MinSum], vec![1]),
            1 => (vec![MinSum], vec![6]),
            2 => (vec![Fixed(FilterType::None), MinSum], vec![MAX_LEVEL]),
            3 => (
                vec![Fixed(FilterType::None), Fixed(Paeth), MinSum],
                vec![MAX_LEVEL],
            ),
            4 => (
                vec![
                    Fixed(FilterType::None),
                    Fixed(Sub),
                    Fixed(Up),
                    Fixed(Paeth),
                    MinSum,
                    Entropy,
                ],
                vec![MAX_LEVEL],
            ),
            5 => (every_filter, vec![9, 8]),
            _ => (every_filter, vec![9, 8, 7]),
        };
        Self {
            level,
            filters,
            zlib_levels,
            fast: false,
        }
    }

    /// Same parameters with fast mode switched on or off.
    pub fn with_fast(mut self, fast: bool) -> Self {
        self.fast = fast;
        self
    }

    /// Trials for `doc`, in search order.
    pub fn trials(&self, doc: &ImageDocument) -> Vec<Trial> {
        let top_level = self.zlib_levels.iter().copied().max().unwrap_or(MAX_LEVEL);
        if self.fast || self.filters.is_empty() {
            return vec![Trial {
                filter: FilterStrategy::Fixed(default_filter(doc)),
                zlib_level: top_level.min(MAX_LEVEL),
            }];
        }
        let zlib_levels = if self.zlib_levels.is_empty() {
            vec![MAX_LEVEL]
        } else {
            self.zlib_levels.clone()
        };
        self.filters
            .iter()
            .flat_map(|&filter| {
                zlib_levels.iter().map(move |&zlib_level| Trial {
                    filter,
                    zlib_level: zlib_level.min(MAX_LEVEL),
                })
            })
            .collect()
    }
}

/// One (filter strategy, zlib level) combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trial {
    /// Row filter selection.
    pub filter: FilterStrategy,
    /// zlib compression level.
    pub zlib_level: u8,
}

/// A finished trial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// The trial that produced `idat`.
    pub trial: Trial,
    /// Compressed scanline stream.
    pub idat: Vec<u8>,
}

/// Result of a search.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// Smallest finished stream, if any trial finished.
    pub best: Option<Candidate>,
    /// Trials that ran to completion.
    pub completed: usize,
    /// Trials abandoned because the deadline passed.
    pub abandoned: usize,
}

/// Run every trial in `params` against `doc` until the deadline.
pub fn search(
    doc: &ImageDocument,
    params: &CompressionParameters,
    deadline: &Deadline,
) -> Result<SearchOutcome> {
    let trials = params.trials(doc);
    let mut outcome = SearchOutcome::default();
    // Filtered stream of the previous trial, reused when only the zlib level changes.
    let mut cached: Option<(FilterStrategy, Vec<u8>)> = None;

    for (i, trial) in trials.iter().enumerate() {
        if deadline.expired() {
            outcome.abandoned += trials.len() - i;
            debug!(remaining = trials.len() - i, "deadline reached; stopping search");
            break;
        }
        let bound = outcome.best.as_ref().map(|c| c.idat.len());
        let result = match &cached {
            Some((filter, stream)) if *filter == trial.filter => {
                compress_filtered(stream, doc.scanline_len() + 1, trial.zlib_level, bound, deadline)?
            }
            _ => {
                let (stream, idat) = run_trial(doc, *trial, bound, deadline)?;
                if let Some(stream) = stream {
                    cached = Some((trial.filter, stream));
                }
                idat
            }
        };

        match result {
            TrialResult::Finished(idat) => {
                outcome.completed += 1;
                debug!(
                    filter = %trial.filter,
                    zlib = trial.zlib_level,
                    size = idat.len(),
                    "trial finished"
                );
                if bound.map_or(true, |best| idat.len() < best) {
                    outcome.best = Some(Candidate {
                        trial: *trial,
                        idat,
                    });
                }
            }
            TrialResult::Pruned => {
                outcome.completed += 1;
                debug!(filter = %trial.filter, zlib = trial.zlib_level, "trial pruned");
            }
            TrialResult::Expired => {
                outcome.abandoned += 1;
                debug!(filter = %trial.filter, zlib = trial.zlib_level, "trial abandoned");
            }
        }
    }

    if let Some(best) = &outcome.best {
        debug!(
            filter = %best.trial.filter,
            zlib = best.trial.zlib_level,
            size = best.idat.len(),
            completed = outcome.completed,
            "best trial"
        );
    }
    Ok(outcome)
}

enum TrialResult {
    Finished(Vec<u8>),
    /// Output already exceeded the best finished stream.
    Pruned,
    Expired,
}

/// Filter and compress `doc` row by row. Also returns the filtered stream when
/// the trial got through filtering every row.
fn run_trial(
    doc: &ImageDocument,
    trial: Trial,
    bound: Option<usize>,
    deadline: &Deadline,
) -> Result<(Option<Vec<u8>>, TrialResult)> {
    let row_len = doc.scanline_len();
    let total = (row_len + 1) * doc.height as usize;
    let mut filter = RowFilter::new(trial.filter, doc.filter_bpp(), row_len);
    let mut zlib = ZlibWriter::new(trial.zlib_level, total / 2 + 64);
    let mut stream = Vec::with_capacity(total + 8);
    let mut pruned = false;

    for pass in serialization_passes(doc) {
        filter.reset(pass.first().map_or(0, Vec::len));
        for row in pass.iter() {
            if deadline.expired() {
                return Ok((None, TrialResult::Expired));
            }
            let start = stream.len();
            filter.filter(row, &mut stream);
            if !pruned {
                zlib.write(&stream[start..])?;
                pruned = bound.is_some_and(|best| zlib.compressed_so_far() > best);
            }
        }
    }
    if pruned {
        return Ok((Some(stream), TrialResult::Pruned));
    }
    let idat = zlib.finish()?;
    Ok((Some(stream), TrialResult::Finished(idat)))
}

/// Compress an already filtered stream, polling the deadline every `step` bytes.
fn compress_filtered(
    stream: &[u8],
    step: usize,
    level: u8,
    bound: Option<usize>,
    deadline: &Deadline,
) -> Result<TrialResult> {
    let mut zlib = ZlibWriter::new(level, stream.len() / 2 + 64);
    for piece in stream.chunks(step.max(1)) {
        if deadline.expired() {
            return Ok(TrialResult::Expired);
        }
        zlib.write(piece)?;
        if bound.is_some_and(|best| zlib.compressed_so_far() > best) {
            return Ok(TrialResult::Pruned);
        }
    }
    Ok(TrialResult::Finished(zlib.finish()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::ColorType;
    use crate::compress::zlib;
    use crate::png::write::filtered_stream;

    fn gradient(width: u32, height: u32) -> ImageDocument {
        let data: Vec<u8> = (0..height)
            .flat_map(|y| (0..width).flat_map(move |x| [(x * 3) as u8, (y * 5) as u8, (x ^ y) as u8]))
            .collect();
        ImageDocument::from_pixels(width, height, 8, ColorType::Rgb, &data).unwrap()
    }

    #[test]
    fn test_presets() {
        let p0 = CompressionParameters::from_preset(0);
        assert_eq!(p0.filters, vec![FilterStrategy::MinSum]);
        assert_eq!(p0.zlib_levels, vec![1]);

        let p6 = CompressionParameters::from_preset(6);
        assert_eq!(p6.filters.len(), 8);
        assert_eq!(p6.zlib_levels, vec![9, 8, 7]);

        assert_eq!(CompressionParameters::from_preset(42).level, 6);
        assert_eq!(CompressionParameters::default().level, 2);
    }

    #[test]
    fn test_fast_runs_one_trial() {
        let doc = gradient(8, 8);
        let params = CompressionParameters::from_preset(6).with_fast(true);
        let trials = params.trials(&doc);
        assert_eq!(trials.len(), 1);
        assert_eq!(trials[0].filter, FilterStrategy::Fixed(FilterType::Paeth));
        assert_eq!(trials[0].zlib_level, 9);
    }

    #[test]
    fn test_search_picks_smallest_valid_stream() {
        let doc = gradient(32, 24);
        let params = CompressionParameters::from_preset(4);
        let outcome = search(&doc, &params, &Deadline::none()).unwrap();
        let best = outcome.best.unwrap();
        assert_eq!(outcome.abandoned, 0);

        for trial in params.trials(&doc) {
            let single = CompressionParameters {
                filters: vec![trial.filter],
                zlib_levels: vec![trial.zlib_level],
                ..params.clone()
            };
            let alone = search(&doc, &single, &Deadline::none()).unwrap().best.unwrap();
            assert!(best.idat.len() <= alone.idat.len(), "{trial:?} beat the winner");
        }

        let raw = zlib::decompress(&best.idat, (doc.scanline_len() + 1) * 24).unwrap();
        assert_eq!(raw, filtered_stream(&doc, best.trial.filter));
    }

    #[test]
    fn test_search_is_deterministic() {
        let doc = gradient(20, 20);
        let params = CompressionParameters::from_preset(5);
        let a = search(&doc, &params, &Deadline::none()).unwrap().best.unwrap();
        let b = search(&doc, &params, &Deadline::none()).unwrap().best.unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_expired_deadline_finishes_nothing() {
        let doc = gradient(16, 16);
        let deadline = Deadline::after(Some(Duration::ZERO));
        assert!(deadline.expired());
        let outcome = search(&doc, &CompressionParameters::from_preset(3), &deadline).unwrap();
        assert!(outcome.best.is_none());
        assert_eq!(outcome.completed, 0);
        assert_eq!(outcome.abandoned, 3);
    }

    #[test]
    fn test_interlaced_trials_decode() {
        let mut doc = gradient(13, 9);
        doc.interlaced = true;
        let outcome = search(&doc, &CompressionParameters::from_preset(2), &Deadline::none()).unwrap();
        let best = outcome.best.unwrap();
        let expected = filtered_stream(&doc, best.trial.filter);
        assert_eq!(zlib::decompress(&best.idat, expected.len()).unwrap(), expected);
    }

    #[test]
    fn test_unbounded_deadline_never_expires() {
        assert!(!Deadline::none().expired());
        assert!(!Deadline::after(Some(Duration::from_secs(3600))).expired());
    }
}
