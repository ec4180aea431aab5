use crate::core::lattice::Lattice;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Defines how a lattice snapshot is serialized.
///
/// Implementors only write to an arbitrary [`Write`]; writing to a path goes
/// through a buffered file by default.
pub trait SnapshotFormat {
    /// The error type for output operations.
    type Error: Error + From<io::Error> + Send + Sync + 'static;

    /// File extension of the snapshots, without the leading dot.
    const EXTENSION: &'static str;

    /// Writes a snapshot of `lattice` taken at simulated time `elapsed_time`.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_to(
        &self,
        lattice: &Lattice,
        elapsed_time: f64,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error>;

    /// Writes a snapshot to a newly created file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or writing fails.
    fn write_to_path<P: AsRef<Path>>(
        &self,
        lattice: &Lattice,
        elapsed_time: f64,
        path: P,
    ) -> Result<(), Self::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write_to(lattice, elapsed_time, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}
