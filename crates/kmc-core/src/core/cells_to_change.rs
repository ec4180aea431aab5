use super::cell::{CellInds, CellIndsOffset};
use super::lattice::Lattice;

/// The cells a semi-manually tracked executor is going to modify.
///
/// Holds offsets relative to a center (index 0 is always the center itself).
/// Once the executor calls [`CellsToChange::set_center`], the offsets resolve
/// to absolute cells, and the simulation refreshes exactly those cells and
/// their dependents after the event instead of recording every write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellsToChange {
    offsets: Vec<CellIndsOffset>,
    cell_inds: Vec<CellInds>,
}

impl CellsToChange {
    pub(crate) fn from_offsets(offsets: &[CellIndsOffset]) -> Self {
        Self {
            offsets: offsets.to_vec(),
            cell_inds: Vec::with_capacity(offsets.len()),
        }
    }

    pub fn set_center(&mut self, ci: &CellInds) {
        self.cell_inds.clear();
        self.cell_inds
            .extend(self.offsets.iter().map(|&off| *ci + off));
    }

    /// Whether [`CellsToChange::set_center`] was called since the last reset.
    pub fn has_center(&self) -> bool {
        !self.cell_inds.is_empty()
    }

    /// # Panics
    ///
    /// Panics if the center has not been set.
    pub fn center(&self) -> &CellInds {
        &self.cell_inds[0]
    }

    pub fn get_cell_inds(&self, which: usize) -> &CellInds {
        &self.cell_inds[which]
    }

    pub fn cell_inds(&self) -> &[CellInds] {
        &self.cell_inds
    }

    pub fn offsets(&self) -> &[CellIndsOffset] {
        &self.offsets
    }

    pub fn get_int(&self, lattice: &Lattice, which_offset: usize, which_int: usize) -> i32 {
        lattice.get_int(&self.cell_inds[which_offset], which_int)
    }

    pub fn get_float(&self, lattice: &Lattice, which_offset: usize, which_float: usize) -> f64 {
        lattice.get_float(&self.cell_inds[which_offset], which_float)
    }

    pub fn set_int(&self, lattice: &mut Lattice, which_offset: usize, which_int: usize, val: i32) {
        lattice.set_int(&self.cell_inds[which_offset], which_int, val);
    }

    pub fn set_float(
        &self,
        lattice: &mut Lattice,
        which_offset: usize,
        which_float: usize,
        val: f64,
    ) {
        lattice.set_float(&self.cell_inds[which_offset], which_float, val);
    }

    pub fn add_lattice_planes(&self, lattice: &mut Lattice, num_planes: i32) {
        lattice.add_planes(num_planes);
    }

    pub(crate) fn reset_center(&mut self) {
        self.cell_inds.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lattice::LatticeParams;

    #[test]
    fn set_center_resolves_offsets_in_order() {
        let mut ctc = CellsToChange::from_offsets(&[
            CellIndsOffset::ZERO,
            CellIndsOffset::new(1, 0, 0),
            CellIndsOffset::new(0, -1, 0),
        ]);
        assert!(!ctc.has_center());

        ctc.set_center(&CellInds::new(2, 2, 0));
        assert_eq!(*ctc.center(), CellInds::new(2, 2, 0));
        assert_eq!(
            ctc.cell_inds(),
            &[
                CellInds::new(2, 2, 0),
                CellInds::new(3, 2, 0),
                CellInds::new(2, 1, 0)
            ]
        );
    }

    #[test]
    fn values_are_read_and_written_through_lattice() {
        let mut lattice = Lattice::new(
            LatticeParams::new()
                .global_planar_dims(3, 3)
                .num_ints_per_cell(1)
                .num_floats_per_cell(1),
        )
        .unwrap();
        let mut ctc =
            CellsToChange::from_offsets(&[CellIndsOffset::ZERO, CellIndsOffset::new(1, 0, 0)]);
        ctc.set_center(&CellInds::new(2, 0, 0));

        ctc.set_int(&mut lattice, 1, 0, 4);
        ctc.set_float(&mut lattice, 0, 0, 0.25);
        assert_eq!(lattice.get_int(&CellInds::new(0, 0, 0), 0), 4);
        assert_eq!(ctc.get_int(&lattice, 1, 0), 4);
        assert_eq!(ctc.get_float(&lattice, 0, 0), 0.25);

        ctc.add_lattice_planes(&mut lattice, 2);
        assert_eq!(lattice.curr_height(), 3);
    }
}
