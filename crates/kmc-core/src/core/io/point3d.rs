use super::traits::SnapshotFormat;
use super::{SnapshotError, row_writer};
use crate::core::cell::CellInds;
use crate::core::lattice::Lattice;
use std::io::Write;

/// Occupied cells as a point cloud: an `x y z value` header followed by one
/// row per occupied cell, ordered by plane, then `i`, then `j`.
///
/// Values use Rust's shortest round-trip float formatting, so integral values
/// keep a trailing `.0` (`2.0`, not `2` as a C++ stream prints them). Compare
/// files from other writers numerically, not byte for byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point3dSnapshot {
    /// Integer value that is positive for occupied cells.
    pub occupied_int: usize,
    /// Floating point value written in the last column.
    pub value_float: usize,
}

impl SnapshotFormat for Point3dSnapshot {
    type Error = SnapshotError;
    const EXTENSION: &'static str = "3D";

    fn write_to(
        &self,
        lattice: &Lattice,
        _elapsed_time: f64,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error> {
        writeln!(writer, "x y z value")?;

        let bbox = lattice.local_planar_bbox(false);
        let mut rows = row_writer(writer);
        for k in 0..lattice.curr_height() {
            for i in bbox.imin..bbox.imax_p1 {
                for j in bbox.jmin..bbox.jmax_p1 {
                    let ci = CellInds::new(i, j, k);
                    if lattice.get_int(&ci, self.occupied_int) > 0 {
                        rows.serialize((i, j, k, lattice.get_float(&ci, self.value_float)))?;
                    }
                }
            }
        }
        rows.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lattice::LatticeParams;

    #[test]
    fn only_occupied_cells_are_written_in_plane_order() {
        let mut lattice = Lattice::new(
            LatticeParams::new()
                .global_planar_dims(2, 2)
                .num_ints_per_cell(1)
                .num_floats_per_cell(1),
        )
        .unwrap();
        lattice.add_planes(1);
        for (ci, value) in [
            (CellInds::new(1, 1, 1), 0.25),
            (CellInds::new(1, 0, 0), 0.5),
            (CellInds::new(0, 1, 0), 2.0),
        ] {
            lattice.set_int(&ci, 0, 1);
            lattice.set_float(&ci, 0, value);
        }

        let mut out = Vec::new();
        Point3dSnapshot {
            occupied_int: 0,
            value_float: 0,
        }
        .write_to(&lattice, 0.0, &mut out)
        .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "x y z value\n0 1 0 2.0\n1 0 0 0.5\n1 1 1 0.25\n"
        );
    }

    #[test]
    fn integral_values_keep_their_fraction_digit() {
        let mut lattice = Lattice::new(
            LatticeParams::new()
                .global_planar_dims(1, 1)
                .num_ints_per_cell(1)
                .num_floats_per_cell(1),
        )
        .unwrap();
        let ci = CellInds::new(0, 0, 0);
        lattice.set_int(&ci, 0, 1);
        lattice.set_float(&ci, 0, 3.0);

        let mut out = Vec::new();
        Point3dSnapshot {
            occupied_int: 0,
            value_float: 0,
        }
        .write_to(&lattice, 0.0, &mut out)
        .unwrap();

        let text = String::from_utf8(out).unwrap();
        let value = text.lines().nth(1).unwrap().split(' ').nth(3).unwrap();
        assert_eq!(value, "3.0");
        assert_eq!(value.parse::<f64>().unwrap(), 3.0);
    }
}
