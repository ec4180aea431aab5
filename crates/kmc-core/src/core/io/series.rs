use super::traits::SnapshotFormat;
use crate::core::lattice::Lattice;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Files written by a [`SnapshotSeries`] and the first write that failed.
#[derive(Debug, Default)]
pub struct SeriesRecord {
    pub written: Vec<PathBuf>,
    pub failure: Option<(PathBuf, io::Error)>,
}

pub type SharedSeriesRecord = Arc<Mutex<SeriesRecord>>;

/// Writes numbered snapshots `{dir}/{root}{n}.{ext}`, counting from 1.
///
/// Periodic actions cannot return errors, so failures are kept in a shared
/// [`SeriesRecord`] that the caller inspects once the run is over.
#[derive(Debug)]
pub struct SnapshotSeries<F> {
    format: F,
    dir: PathBuf,
    file_root: String,
    counter: u32,
    record: SharedSeriesRecord,
}

impl<F: SnapshotFormat> SnapshotSeries<F> {
    pub fn new(format: F, dir: impl Into<PathBuf>, file_root: impl Into<String>) -> Self {
        Self {
            format,
            dir: dir.into(),
            file_root: file_root.into(),
            counter: 0,
            record: SharedSeriesRecord::default(),
        }
    }

    pub fn record(&self) -> SharedSeriesRecord {
        Arc::clone(&self.record)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes the next snapshot in the series.
    pub fn write_next(&mut self, lattice: &Lattice, elapsed_time: f64) {
        self.counter += 1;
        let path = self
            .dir
            .join(format!("{}{}.{}", self.file_root, self.counter, F::EXTENSION));
        let result = self.format.write_to_path(lattice, elapsed_time, &path);

        let mut record = self.record.lock().unwrap_or_else(PoisonError::into_inner);
        match result {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Snapshot written");
                record.written.push(path);
            }
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "Snapshot failed");
                if record.failure.is_none() {
                    record.failure = Some((path, io::Error::other(err)));
                }
            }
        }
    }
}
