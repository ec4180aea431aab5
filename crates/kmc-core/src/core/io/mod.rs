//! Snapshot output for lattices.
//!
//! Formats implement [`traits::SnapshotFormat`]; [`series::SnapshotSeries`]
//! writes a numbered sequence of snapshots from inside a periodic action.

pub mod height_map;
pub mod point3d;
pub mod series;
pub mod traits;

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to write row: {0}")]
    Row(#[from] csv::Error),
}

/// Space-delimited, header-less row writer shared by the text formats.
fn row_writer<W: io::Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .from_writer(writer)
}
