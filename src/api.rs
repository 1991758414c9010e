//! The two entry operations and their byte source and sink.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::driver::{Driver, OptimizationResult, Options};
use crate::error::{Error, Result};
use crate::optimizer::{CompressionParameters, Deadline};
use crate::transform::{AlphaPolicy, Interlacing, LossyOptions, StripChunks};

/// Where input bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InFile {
    /// A file on disk.
    Path(PathBuf),
    /// Bytes already in memory.
    Data(Vec<u8>),
}

impl InFile {
    /// Read the whole input.
    pub fn read(&self) -> Result<Cow<'_, [u8]>> {
        match self {
            InFile::Path(path) => fs::read(path)
                .map(Cow::Owned)
                .map_err(|e| Error::io(Some(path.clone()), e)),
            InFile::Data(data) => Ok(Cow::Borrowed(data)),
        }
    }

    /// The path, for file inputs.
    pub fn path(&self) -> Option<&Path> {
        match self {
            InFile::Path(path) => Some(path),
            InFile::Data(_) => None,
        }
    }
}

impl From<PathBuf> for InFile {
    fn from(path: PathBuf) -> Self {
        InFile::Path(path)
    }
}

impl From<&Path> for InFile {
    fn from(path: &Path) -> Self {
        InFile::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for InFile {
    fn from(data: Vec<u8>) -> Self {
        InFile::Data(data)
    }
}

/// Where output bytes go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutFile {
    /// A file on disk.
    Path {
        /// Destination.
        path: PathBuf,
        /// Copy the input file's permissions and modification time.
        preserve_attrs: bool,
    },
    /// Only returned in [`OptimizationResult::data`].
    Memory,
}

impl OutFile {
    /// A file sink that leaves attributes alone.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        OutFile::Path {
            path: path.into(),
            preserve_attrs: false,
        }
    }

    /// Write `data` to the sink.
    pub fn write(&self, data: &[u8], input: &InFile) -> Result<()> {
        let OutFile::Path {
            path,
            preserve_attrs,
        } = self
        else {
            return Ok(());
        };
        fs::write(path, data).map_err(|e| Error::io(Some(path.clone()), e))?;
        if *preserve_attrs {
            if let Some(source) = input.path() {
                copy_attributes(source, path)?;
            }
        }
        Ok(())
    }
}

fn copy_attributes(source: &Path, target: &Path) -> Result<()> {
    let metadata = fs::metadata(source).map_err(|e| Error::io(Some(source.to_path_buf()), e))?;
    let target_err = |e| Error::io(Some(target.to_path_buf()), e);
    fs::set_permissions(target, metadata.permissions()).map_err(target_err)?;
    if let Ok(modified) = metadata.modified() {
        let file = fs::File::options()
            .write(true)
            .open(target)
            .map_err(target_err)?;
        file.set_times(fs::FileTimes::new().set_modified(modified))
            .map_err(target_err)?;
    }
    debug!(target = %target.display(), "copied file attributes");
    Ok(())
}

/// Run the driver on `input` and deliver the result to `output`.
///
/// The deadline starts before the input is read.
pub fn run(input: &InFile, output: &OutFile, options: &Options) -> Result<OptimizationResult> {
    let deadline = Deadline::after(options.timeout);
    let data = input.read()?;
    let result = Driver::new(options.clone()).run_with_deadline(&data, &deadline)?;
    output.write(&result.data, input)?;
    Ok(result)
}

/// Full-control re-encode.
///
/// - `level`: preset 0-6.
/// - `strip`: drop all ancillary chunks. Metadata survives only with
///   `strip == false && preserve == true`.
/// - `alpha`: zero the color of fully transparent pixels.
/// - `interlace`: Adam7 output when set, non-interlaced otherwise.
/// - `fast`: one fixed-filter trial instead of the search.
/// - `preserve`: keep metadata (see `strip`) and, for path sinks, the input
///   file's permissions and modification time.
/// - `timeout`: budget for the whole call.
#[allow(clippy::too_many_arguments)]
pub fn optimize(
    input: &InFile,
    output: &OutFile,
    level: u8,
    strip: bool,
    alpha: bool,
    interlace: bool,
    fast: bool,
    preserve: bool,
    timeout: Option<Duration>,
) -> Result<OptimizationResult> {
    let options = optimize_options(level, strip, alpha, interlace, fast, preserve, timeout);
    run(input, &with_preserve(output, preserve), &options)
}

/// [`Options`] for the [`optimize`] flags.
pub fn optimize_options(
    level: u8,
    strip: bool,
    alpha: bool,
    interlace: bool,
    fast: bool,
    preserve: bool,
    timeout: Option<Duration>,
) -> Options {
    Options {
        params: CompressionParameters::from_preset(level).with_fast(fast),
        strip: if !strip && preserve {
            StripChunks::None
        } else {
            StripChunks::All
        },
        alpha: alpha_policy(alpha),
        interlace: if interlace {
            Interlacing::Adam7
        } else {
            Interlacing::Off
        },
        timeout,
        ..Options::from_preset(level)
    }
}

/// Simplified entry.
///
/// Writes non-interlaced output, keeps metadata only with `preserve`, and
/// with `lossy` quantizes colors within [`LossyOptions::default`]'s bound.
pub fn compress(
    input: &InFile,
    output: &OutFile,
    level: u8,
    alpha: bool,
    preserve: bool,
    verbose: bool,
    lossy: bool,
) -> Result<OptimizationResult> {
    let options = compress_options(level, alpha, preserve, verbose, lossy);
    run(input, &with_preserve(output, preserve), &options)
}

/// [`Options`] for the [`compress`] flags.
pub fn compress_options(level: u8, alpha: bool, preserve: bool, verbose: bool, lossy: bool) -> Options {
    Options {
        strip: if preserve {
            StripChunks::None
        } else {
            StripChunks::All
        },
        alpha: alpha_policy(alpha),
        interlace: Interlacing::Off,
        lossy: lossy.then(LossyOptions::default),
        verbose,
        ..Options::from_preset(level)
    }
}

fn alpha_policy(alpha: bool) -> AlphaPolicy {
    if alpha {
        AlphaPolicy::Optimize
    } else {
        AlphaPolicy::Keep
    }
}

fn with_preserve(output: &OutFile, preserve: bool) -> OutFile {
    match output {
        OutFile::Path {
            path,
            preserve_attrs,
        } => OutFile::Path {
            path: path.clone(),
            preserve_attrs: *preserve_attrs || preserve,
        },
        OutFile::Memory => OutFile::Memory,
    }
}

/// The entry operations as a closed set, with their arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// [`optimize`].
    Optimize {
        /// Source.
        input: InFile,
        /// Sink.
        output: OutFile,
        /// Preset 0-6.
        level: u8,
        /// Drop all ancillary chunks.
        strip: bool,
        /// Zero colors under full transparency.
        alpha: bool,
        /// Adam7 output.
        interlace: bool,
        /// Single trial.
        fast: bool,
        /// Keep metadata and file attributes.
        preserve: bool,
        /// Budget for the call.
        timeout: Option<Duration>,
    },
    /// [`compress`].
    Compress {
        /// Source.
        input: InFile,
        /// Sink.
        output: OutFile,
        /// Preset 0-6.
        level: u8,
        /// Zero colors under full transparency.
        alpha: bool,
        /// Keep metadata and file attributes.
        preserve: bool,
        /// Log a size summary.
        verbose: bool,
        /// Allow bounded color quantization.
        lossy: bool,
    },
}

impl Operation {
    /// Registered name of the operation.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Optimize { .. } => "optim_png",
            Operation::Compress { .. } => "tinypng",
        }
    }

    /// Number of arguments the operation takes.
    pub fn arity(&self) -> usize {
        match self {
            Operation::Optimize { .. } => 9,
            Operation::Compress { .. } => 7,
        }
    }

    /// Run the operation.
    pub fn dispatch(&self) -> Result<OptimizationResult> {
        debug!(operation = self.name(), "dispatch");
        match self {
            Operation::Optimize {
                input,
                output,
                level,
                strip,
                alpha,
                interlace,
                fast,
                preserve,
                timeout,
            } => optimize(
                input, output, *level, *strip, *alpha, *interlace, *fast, *preserve, *timeout,
            ),
            Operation::Compress {
                input,
                output,
                level,
                alpha,
                preserve,
                verbose,
                lossy,
            } => compress(input, output, *level, *alpha, *preserve, *verbose, *lossy),
        }
    }
}
