use super::traits::SnapshotFormat;
use super::{SnapshotError, row_writer};
use crate::core::cell::CellInds;
use crate::core::lattice::Lattice;
use std::io::Write;

/// Column heights stored in the bottom plane, one `i j h` row per column
/// after a `# imin imaxP1 jmin jmaxP1 time:t` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeightMapSnapshot {
    pub height_int: usize,
}

impl SnapshotFormat for HeightMapSnapshot {
    type Error = SnapshotError;
    const EXTENSION: &'static str = "dat";

    fn write_to(
        &self,
        lattice: &Lattice,
        elapsed_time: f64,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error> {
        let bbox = lattice.local_planar_bbox(false);
        writeln!(
            writer,
            "# {} {} {} {} time:{}",
            bbox.imin, bbox.imax_p1, bbox.jmin, bbox.jmax_p1, elapsed_time
        )?;

        let mut rows = row_writer(writer);
        for i in bbox.imin..bbox.imax_p1 {
            for j in bbox.jmin..bbox.jmax_p1 {
                let h = lattice.get_int(&CellInds::new(i, j, 0), self.height_int);
                rows.serialize((i, j, h))?;
            }
        }
        rows.flush()?;
        Ok(())
    }
}
