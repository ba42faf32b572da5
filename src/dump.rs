//! Sequentially copy files to a writer, one fixed-size block at a time.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Bytes requested per `read(2)`.
pub const BLOCK_SIZE: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    #[error("failed to open {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write output: {0}")]
    Write(#[source] io::Error),
}

/// Totals from [`copy_files`].
#[derive(Debug, Default)]
pub struct DumpReport {
    /// Bytes written to the output across all files.
    pub bytes: u64,
    /// Files copied through to end-of-file.
    pub files: usize,
    /// Files that could not be opened or read to the end.
    pub failures: Vec<DumpError>,
}

impl DumpReport {
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Copy one file to `out`, returning the number of bytes copied.
///
/// Only the bytes each read actually returned are written. A read that returns zero bytes ends
/// the copy; a read that fails is reported as [`DumpError::Read`], not mistaken for end-of-file.
pub fn copy_file<W: Write>(path: &Path, out: &mut W) -> Result<u64, DumpError> {
    let mut file = File::open(path).map_err(|source| DumpError::Open {
        path: path.to_owned(),
        source,
    })?;

    let mut block = [0u8; BLOCK_SIZE];
    let mut copied = 0u64;
    loop {
        let n = match file.read(&mut block) {
            Ok(0) => return Ok(copied),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(DumpError::Read {
                    path: path.to_owned(),
                    source,
                })
            }
        };
        out.write_all(&block[..n]).map_err(DumpError::Write)?;
        copied += n as u64;
    }
}

/// Copy each file in `paths` to `out`, in order.
///
/// A file that cannot be opened or read is recorded in the report and skipped; the remaining
/// files are still copied. A failure to write to `out` stops everything and is returned.
pub fn copy_files<P, W>(
    paths: impl IntoIterator<Item = P>,
    out: &mut W,
) -> Result<DumpReport, DumpError>
where
    P: AsRef<Path>,
    W: Write,
{
    let mut report = DumpReport::default();

    for (index, path) in paths.into_iter().enumerate() {
        let path = path.as_ref();
        debug!(index, path = %path.display(), "dumping");

        match copy_file(path, out) {
            Ok(bytes) => {
                report.bytes += bytes;
                report.files += 1;
            }
            Err(err @ DumpError::Write(_)) => return Err(err),
            Err(err) => {
                warn!(%err, "skipping file");
                report.failures.push(err);
            }
        }
    }

    out.flush().map_err(DumpError::Write)?;
    Ok(report)
}
