//! Multi-file runs.

use std::fs;
use std::io;
use std::path::PathBuf;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::debug;

use crate::api::{self, InFile, OutFile};
use crate::driver::{Options, Outcome};
use crate::error::{Error, Result};
use crate::report;

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    /// Source path.
    pub input: PathBuf,
    /// Destination path.
    pub output: PathBuf,
    /// Input size in bytes.
    pub original_size: u64,
    /// Output size in bytes.
    pub optimized_size: u64,
    /// How the output was produced.
    pub outcome: Outcome,
}

/// Reports for a whole batch, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// One entry per input.
    pub files: Vec<FileReport>,
}

impl BatchReport {
    /// One line per file, with shared leading directories removed.
    pub fn lines(&self) -> Vec<String> {
        let inputs: Vec<String> = self
            .files
            .iter()
            .map(|f| f.input.display().to_string())
            .collect();
        let outputs: Vec<String> = self
            .files
            .iter()
            .map(|f| f.output.display().to_string())
            .collect();
        let in_index = report::find_truncate_index(&inputs);
        let out_index = report::find_truncate_index(&outputs);

        self.files
            .iter()
            .zip(inputs.iter().zip(&outputs))
            .map(|(file, (input, output))| {
                let shown_in = report::truncate_path(input, in_index);
                let shown_out = report::truncate_path(output, out_index);
                let shown_in = if input == output { shown_out.clone() } else { shown_in };
                report::file_line(&shown_in, &shown_out, file.original_size, file.optimized_size)
            })
            .collect()
    }

    /// Total bytes before and after.
    pub fn totals(&self) -> (u64, u64) {
        self.files.iter().fold((0, 0), |(before, after), f| {
            (before + f.original_size, after + f.optimized_size)
        })
    }
}

/// Optimize every `inputs[i]` into `outputs[i]`.
///
/// Nothing is written unless the lists have the same length and every input
/// exists. Missing output directories are created. With the `parallel`
/// feature the files are processed on the rayon pool.
pub fn run(
    inputs: &[PathBuf],
    outputs: &[PathBuf],
    options: &Options,
    preserve_attrs: bool,
) -> Result<BatchReport> {
    if inputs.len() != outputs.len() {
        return Err(Error::io(
            None,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "{} inputs but {} outputs; the lists must have the same length",
                    inputs.len(),
                    outputs.len()
                ),
            ),
        ));
    }
    if let Some(missing) = inputs.iter().find(|p| !p.is_file()) {
        return Err(Error::io(
            Some(missing.clone()),
            io::Error::new(io::ErrorKind::NotFound, "input file does not exist"),
        ));
    }
    for output in outputs {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                debug!(dir = %parent.display(), "creating output directory");
                fs::create_dir_all(parent).map_err(|e| Error::io(Some(parent.to_path_buf()), e))?;
            }
        }
    }

    let job = |(input, output): (&PathBuf, &PathBuf)| -> Result<FileReport> {
        let sink = OutFile::Path {
            path: output.clone(),
            preserve_attrs,
        };
        let result = api::run(&InFile::Path(input.clone()), &sink, options)?;
        Ok(FileReport {
            input: input.clone(),
            output: output.clone(),
            original_size: result.original_size as u64,
            optimized_size: result.optimized_size as u64,
            outcome: result.outcome,
        })
    };

    #[cfg(feature = "parallel")]
    let files = inputs
        .par_iter()
        .zip(outputs.par_iter())
        .map(job)
        .collect::<Result<Vec<_>>>()?;
    #[cfg(not(feature = "parallel"))]
    let files = inputs
        .iter()
        .zip(outputs.iter())
        .map(job)
        .collect::<Result<Vec<_>>>()?;

    Ok(BatchReport { files })
}
