use super::cell::{CellInds, wrap_ind};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum LatticeError {
    #[error("There must be at least one integer or floating point number defined per lattice site.")]
    NoValuesPerCell,
    #[error(
        "One of the in-plane dimensions of the lattice is less than or equal to zero (or was not set)."
    )]
    BadPlanarDims,
}

/// Callback that fills in the values of a freshly appended cell.
///
/// Receives the indices of the new cell, the lattice with the new plane
/// already on top (so `curr_height()` is `ci.k + 1`), and zero-initialized
/// integer and float slices sized to the per-cell value counts. Cells of the
/// new plane read as zero until the callback has filled them.
pub type SetEmptyCellVals =
    Box<dyn FnMut(&CellInds, &Lattice, &mut [i32], &mut [f64]) + Send + Sync>;

/// One-shot initializer run at the end of lattice construction.
pub type LatticeInit = Box<dyn FnOnce(&mut Lattice) + Send>;

/// Planar extent of a region of the lattice; the upper bounds are exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatticePlanarBBox {
    pub imin: i32,
    pub imax_p1: i32,
    pub jmin: i32,
    pub jmax_p1: i32,
}

impl LatticePlanarBBox {
    pub fn i_extent(&self) -> i32 {
        self.imax_p1 - self.imin
    }

    pub fn j_extent(&self) -> i32 {
        self.jmax_p1 - self.jmin
    }

    pub fn area(&self) -> f64 {
        f64::from(self.i_extent()) * f64::from(self.j_extent())
    }
}

/// How the lattice reacts to writes and appended planes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrackType {
    #[default]
    None,
    /// Only remember that something changed.
    CheckOnlyIfChangeOccurs,
    /// Record the indices of every set cell, plus every cell of appended planes.
    RecordChangedCellInds,
    /// Record only the cells of appended planes.
    RecordOnlyOtherChangedCellInds,
}

/// Construction parameters for a [`Lattice`].
pub struct LatticeParams {
    pub global_planar_dims: [i32; 2],
    pub num_ints_per_cell: usize,
    pub num_floats_per_cell: usize,
    pub num_planes_to_reserve: usize,
    pub set_empty_cell_vals: Option<SetEmptyCellVals>,
    pub lat_init: LatticeInit,
}

impl Default for LatticeParams {
    fn default() -> Self {
        Self {
            global_planar_dims: [0, 0],
            num_ints_per_cell: 0,
            num_floats_per_cell: 0,
            num_planes_to_reserve: 1,
            set_empty_cell_vals: None,
            lat_init: Box::new(|lattice: &mut Lattice| lattice.add_planes(1)),
        }
    }
}

impl fmt::Debug for LatticeParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatticeParams")
            .field("global_planar_dims", &self.global_planar_dims)
            .field("num_ints_per_cell", &self.num_ints_per_cell)
            .field("num_floats_per_cell", &self.num_floats_per_cell)
            .field("num_planes_to_reserve", &self.num_planes_to_reserve)
            .field("set_empty_cell_vals", &self.set_empty_cell_vals.is_some())
            .finish_non_exhaustive()
    }
}

impl LatticeParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global_planar_dims(mut self, dim_i: i32, dim_j: i32) -> Self {
        self.global_planar_dims = [dim_i, dim_j];
        self
    }
    pub fn num_ints_per_cell(mut self, n: usize) -> Self {
        self.num_ints_per_cell = n;
        self
    }
    pub fn num_floats_per_cell(mut self, n: usize) -> Self {
        self.num_floats_per_cell = n;
        self
    }
    pub fn num_planes_to_reserve(mut self, n: usize) -> Self {
        self.num_planes_to_reserve = n;
        self
    }
    pub fn set_empty_cell_vals(
        mut self,
        f: impl FnMut(&CellInds, &Lattice, &mut [i32], &mut [f64]) + Send + Sync + 'static,
    ) -> Self {
        self.set_empty_cell_vals = Some(Box::new(f));
        self
    }
    pub fn lat_init(mut self, f: impl FnOnce(&mut Lattice) + Send + 'static) -> Self {
        self.lat_init = Box::new(f);
        self
    }
}

#[derive(Debug, Clone)]
struct Plane {
    ints: Vec<i32>,
    floats: Vec<f64>,
}

/// A stack of rectangular planes with periodic in-plane boundaries.
///
/// Each cell carries a fixed number of integer and floating point values. The
/// lattice grows upward by appending planes, and can optionally record which
/// cells were written so the simulation can refresh only the affected events.
pub struct Lattice {
    dims: [i32; 2],
    n_ints: usize,
    n_floats: usize,
    planes: Vec<Plane>,
    set_empty_cell_vals: Option<SetEmptyCellVals>,

    track_type: TrackType,
    modified: bool,
    changed_cell_inds: BTreeSet<CellInds>,
    other_checked_cell_inds: Vec<CellInds>,
}

impl fmt::Debug for Lattice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lattice")
            .field("dims", &self.dims)
            .field("n_ints", &self.n_ints)
            .field("n_floats", &self.n_floats)
            .field("height", &self.planes.len())
            .field("track_type", &self.track_type)
            .finish_non_exhaustive()
    }
}

impl Lattice {
    /// Creates a lattice and runs its initializer.
    ///
    /// # Errors
    ///
    /// Returns an error if no values are stored per cell, or if either planar
    /// dimension is not positive.
    pub fn new(params: LatticeParams) -> Result<Self, LatticeError> {
        let LatticeParams {
            global_planar_dims,
            num_ints_per_cell,
            num_floats_per_cell,
            num_planes_to_reserve,
            set_empty_cell_vals,
            lat_init,
        } = params;

        if num_ints_per_cell < 1 && num_floats_per_cell < 1 {
            return Err(LatticeError::NoValuesPerCell);
        }
        if global_planar_dims.iter().any(|&d| d <= 0) {
            return Err(LatticeError::BadPlanarDims);
        }

        let mut lattice = Self {
            dims: global_planar_dims,
            n_ints: num_ints_per_cell,
            n_floats: num_floats_per_cell,
            planes: Vec::with_capacity(num_planes_to_reserve),
            set_empty_cell_vals,
            track_type: TrackType::None,
            modified: false,
            changed_cell_inds: BTreeSet::new(),
            other_checked_cell_inds: Vec::new(),
        };

        lat_init(&mut lattice);
        Ok(lattice)
    }

    pub fn n_ints_per_cell(&self) -> usize {
        self.n_ints
    }

    pub fn n_floats_per_cell(&self) -> usize {
        self.n_floats
    }

    pub fn curr_height(&self) -> i32 {
        self.planes.len() as i32
    }

    pub fn planes_reserved(&self) -> usize {
        self.planes.capacity()
    }

    pub fn reserve_planes(&mut self, num_planes: usize) {
        self.planes
            .reserve(num_planes.saturating_sub(self.planes.len()));
    }

    pub fn n_procs(&self) -> i32 {
        1
    }

    pub fn proc_id(&self) -> i32 {
        0
    }

    pub fn proc_per_dim(&self, _dim: usize) -> i32 {
        1
    }

    pub fn comm_coord(&self, _dim: usize) -> i32 {
        0
    }

    pub fn ghost_extent(&self) -> [i32; 2] {
        [0, 0]
    }

    pub fn num_sectors(&self) -> usize {
        1
    }

    pub fn sector_of_indices(&self, _ci: &CellInds) -> usize {
        0
    }

    fn full_bbox(&self) -> LatticePlanarBBox {
        LatticePlanarBBox {
            imin: 0,
            imax_p1: self.dims[0],
            jmin: 0,
            jmax_p1: self.dims[1],
        }
    }

    /// Planar extent owned by this process. Ghost cells do not exist in a
    /// serial lattice, so `with_ghost` has no effect.
    pub fn local_planar_bbox(&self, _with_ghost: bool) -> LatticePlanarBBox {
        self.full_bbox()
    }

    pub fn sector_planar_bbox(&self, _sector: usize) -> LatticePlanarBBox {
        self.full_bbox()
    }

    pub fn global_planar_bbox(&self) -> LatticePlanarBBox {
        self.full_bbox()
    }

    pub fn wrap_inds_if_needed(&self, ci: &mut CellInds) {
        ci.i = wrap_ind(ci.i, self.dims[0]);
        ci.j = wrap_ind(ci.j, self.dims[1]);
    }

    #[inline]
    fn cell_offset(&self, ci: &CellInds) -> (usize, usize) {
        let i = wrap_ind(ci.i, self.dims[0]) as usize;
        let j = wrap_ind(ci.j, self.dims[1]) as usize;
        let k = usize::try_from(ci.k).unwrap_or(usize::MAX);
        (k, i * self.dims[1] as usize + j)
    }

    /// Reads integer value `which` of cell `ci`.
    ///
    /// # Panics
    ///
    /// Panics if `ci.k` is outside `[0, curr_height())` or `which` is not a
    /// valid integer slot, in the same way slice indexing does.
    pub fn get_int(&self, ci: &CellInds, which: usize) -> i32 {
        let (k, cell) = self.cell_offset(ci);
        self.planes[k].ints[cell * self.n_ints + which]
    }

    /// Reads floating point value `which` of cell `ci`.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`Lattice::get_int`].
    pub fn get_float(&self, ci: &CellInds, which: usize) -> f64 {
        let (k, cell) = self.cell_offset(ci);
        self.planes[k].floats[cell * self.n_floats + which]
    }

    pub fn set_int(&mut self, ci: &CellInds, which: usize, val: i32) {
        let (k, cell) = self.cell_offset(ci);
        let n_ints = self.n_ints;
        self.planes[k].ints[cell * n_ints + which] = val;
        self.note_set(ci);
    }

    pub fn set_float(&mut self, ci: &CellInds, which: usize, val: f64) {
        let (k, cell) = self.cell_offset(ci);
        let n_floats = self.n_floats;
        self.planes[k].floats[cell * n_floats + which] = val;
        self.note_set(ci);
    }

    fn note_set(&mut self, ci: &CellInds) {
        match self.track_type {
            TrackType::None | TrackType::RecordOnlyOtherChangedCellInds => {}
            TrackType::CheckOnlyIfChangeOccurs => self.modified = true,
            TrackType::RecordChangedCellInds => {
                self.modified = true;
                self.changed_cell_inds.insert(*ci);
            }
        }
    }

    /// Appends `num_planes` planes on top of the lattice. Non-positive counts
    /// are ignored.
    pub fn add_planes(&mut self, num_planes: i32) {
        for _ in 0..num_planes.max(0) {
            self.append_plane();
        }
    }

    fn append_plane(&mut self) {
        let num_cells = (self.dims[0] * self.dims[1]) as usize;
        let new_k = self.curr_height();
        self.planes.push(Plane {
            ints: vec![0; num_cells * self.n_ints],
            floats: vec![0.0; num_cells * self.n_floats],
        });

        if let Some(mut fill) = self.set_empty_cell_vals.take() {
            let (n_ints, n_floats) = (self.n_ints, self.n_floats);
            let mut ints = vec![0; n_ints];
            let mut floats = vec![0.0; n_floats];
            for i in 0..self.dims[0] {
                for j in 0..self.dims[1] {
                    ints.iter_mut().for_each(|v| *v = 0);
                    floats.iter_mut().for_each(|v| *v = 0.0);
                    fill(&CellInds::new(i, j, new_k), self, &mut ints, &mut floats);

                    let cell = (i * self.dims[1] + j) as usize;
                    let plane = &mut self.planes[new_k as usize];
                    plane.ints[cell * n_ints..(cell + 1) * n_ints].copy_from_slice(&ints);
                    plane.floats[cell * n_floats..(cell + 1) * n_floats]
                        .copy_from_slice(&floats);
                }
            }
            self.set_empty_cell_vals = Some(fill);
        }

        match self.track_type {
            TrackType::None => {}
            TrackType::CheckOnlyIfChangeOccurs => self.modified = true,
            TrackType::RecordChangedCellInds | TrackType::RecordOnlyOtherChangedCellInds => {
                self.modified = true;
                for i in 0..self.dims[0] {
                    for j in 0..self.dims[1] {
                        self.other_checked_cell_inds
                            .push(CellInds::new(i, j, new_k));
                    }
                }
            }
        }
    }

    /// Switches the tracking mode and forgets everything recorded so far.
    pub fn track_changes(&mut self, track_type: TrackType) {
        self.track_type = track_type;
        self.modified = false;
        self.changed_cell_inds.clear();
        self.other_checked_cell_inds.clear();
    }

    pub fn track_type(&self) -> TrackType {
        self.track_type
    }

    pub fn has_changed(&self) -> bool {
        self.modified
    }

    /// Cells written since the last call to [`Lattice::track_changes`], as
    /// passed to the setters (i.e. not wrapped).
    pub fn changed_cell_inds(&self) -> &BTreeSet<CellInds> {
        &self.changed_cell_inds
    }

    /// Cells of planes appended since the last call to [`Lattice::track_changes`].
    pub fn other_checked_cell_inds(&self) -> &[CellInds] {
        &self.other_checked_cell_inds
    }

    pub(crate) fn take_recorded_changes(&mut self) -> (BTreeSet<CellInds>, Vec<CellInds>) {
        (
            std::mem::take(&mut self.changed_cell_inds),
            std::mem::take(&mut self.other_checked_cell_inds),
        )
    }
}
