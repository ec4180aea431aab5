use super::cell::{CellInds, CellIndsOffset};
use super::lattice::Lattice;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum NeighborError {
    #[error("There should be at least one offset.")]
    NoOffsets,
    #[error("Offset with index 0 is reserved for the offset with components (0,0,0).")]
    ReservedOffset,
    #[error("Offset index {which} is out of bounds (number of offsets: {len}).")]
    OutOfBounds { which: usize, len: usize },
}

/// An indexed set of offsets describing a neighborhood.
///
/// Index 0 always holds `(0,0,0)`, so that the center cell of a neighborhood
/// can be addressed like any of its neighbors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellNeighOffsets {
    offsets: Vec<CellIndsOffset>,
}

impl Default for CellNeighOffsets {
    fn default() -> Self {
        Self {
            offsets: vec![CellIndsOffset::ZERO],
        }
    }
}

impl CellNeighOffsets {
    /// Creates `num_offsets` offsets, all initially `(0,0,0)`.
    pub fn new(num_offsets: usize) -> Result<Self, NeighborError> {
        let mut cno = Self::default();
        cno.reset_offsets(num_offsets)?;
        Ok(cno)
    }

    pub fn reset_offsets(&mut self, num_offsets: usize) -> Result<(), NeighborError> {
        if num_offsets < 1 {
            return Err(NeighborError::NoOffsets);
        }
        self.offsets.clear();
        self.offsets.resize(num_offsets, CellIndsOffset::ZERO);
        Ok(())
    }

    pub fn add_offset(
        &mut self,
        which: usize,
        offset: CellIndsOffset,
    ) -> Result<(), NeighborError> {
        if which == 0 {
            return Err(NeighborError::ReservedOffset);
        }
        let len = self.offsets.len();
        let slot = self
            .offsets
            .get_mut(which)
            .ok_or(NeighborError::OutOfBounds { which, len })?;
        *slot = offset;
        Ok(())
    }

    /// Builder-style variant of [`CellNeighOffsets::add_offset`].
    pub fn with_offset(
        mut self,
        which: usize,
        offset: CellIndsOffset,
    ) -> Result<Self, NeighborError> {
        self.add_offset(which, offset)?;
        Ok(self)
    }

    pub fn clear_offsets(&mut self) {
        self.offsets.clear();
        self.offsets.push(CellIndsOffset::ZERO);
    }

    pub fn get_offset(&self, which: usize) -> CellIndsOffset {
        self.offsets[which]
    }

    pub fn num_offsets(&self) -> usize {
        self.offsets.len()
    }

    pub fn offsets(&self) -> &[CellIndsOffset] {
        &self.offsets
    }
}

/// Absolute indices of a cell handed out by a [`CellNeighProbe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellToProbe(CellInds);

impl CellToProbe {
    pub fn inds(&self) -> &CellInds {
        &self.0
    }
}

/// Read-only view of the lattice around one cell, used by propensity functions.
#[derive(Debug, Clone, Copy)]
pub struct CellNeighProbe<'a> {
    lattice: &'a Lattice,
    center: CellInds,
    offsets: &'a [CellIndsOffset],
}

impl<'a> CellNeighProbe<'a> {
    pub fn new(lattice: &'a Lattice, center: CellInds, offsets: &'a [CellIndsOffset]) -> Self {
        Self {
            lattice,
            center,
            offsets,
        }
    }

    pub fn center(&self) -> &CellInds {
        &self.center
    }

    pub fn get_cell_to_probe(&self, which: usize) -> CellToProbe {
        CellToProbe(self.center + self.offsets[which])
    }

    pub fn get_int(&self, ctp: &CellToProbe, which: usize) -> i32 {
        self.lattice.get_int(&ctp.0, which)
    }

    pub fn get_float(&self, ctp: &CellToProbe, which: usize) -> f64 {
        self.lattice.get_float(&ctp.0, which)
    }

    pub fn exceeds_lattice_height(&self, ctp: &CellToProbe) -> bool {
        ctp.0.k >= self.lattice.curr_height()
    }

    pub fn below_lattice_bottom(&self, ctp: &CellToProbe) -> bool {
        ctp.0.k < 0
    }
}
