use crate::core::cell::CellInds;
use crate::core::lattice::LatticePlanarBBox;

/// Compact identifier of one possible event.
///
/// Cell-centered events flatten `(i, j, event index)` into `e1` and keep the
/// plane in `e2`. Over-lattice events store their index in `e1` and encode
/// their sector as a negative `e2`, which is how the two kinds are told apart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId {
    pub(crate) e1: usize,
    pub(crate) e2: i32,
}

impl EventId {
    pub fn over_lattice(event_index: usize, sector: usize) -> Self {
        Self {
            e1: event_index,
            e2: -(sector as i32 + 1),
        }
    }

    pub fn is_for_over_lattice(&self) -> bool {
        self.e2 < 0
    }

    /// Sector of an over-lattice event.
    pub fn over_lattice_sector(&self) -> usize {
        (-self.e2 - 1) as usize
    }

    /// Index of an over-lattice event within the simulation's event list.
    pub fn over_lattice_index(&self) -> usize {
        self.e1
    }

    pub fn describe(&self, layout: &EventIdLayout) -> String {
        if self.is_for_over_lattice() {
            format!(
                "OverLatticeEvent(Sector={}; Event index={})",
                self.over_lattice_sector(),
                self.e1
            )
        } else {
            let (ci, idx) = layout.decode(self);
            format!("CellCenteredEvent(Cell indices={ci}; Event index={idx})")
        }
    }
}

/// Flattening scheme shared by every cell-centered [`EventId`] of a run.
///
/// `dims` holds the planar extents of the local region and the number of
/// cell-centered events; `ci_min` is the lower corner of the local region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventIdLayout {
    ci_min: [i32; 2],
    dims: [usize; 3],
}

impl Default for EventIdLayout {
    fn default() -> Self {
        Self {
            ci_min: [0, 0],
            dims: [1, 1, 0],
        }
    }
}

impl EventIdLayout {
    pub fn new(local_bbox: &LatticePlanarBBox, num_cell_centered_events: usize) -> Self {
        Self {
            ci_min: [local_bbox.imin, local_bbox.jmin],
            dims: [
                local_bbox.i_extent().max(1) as usize,
                local_bbox.j_extent().max(1) as usize,
                num_cell_centered_events,
            ],
        }
    }

    /// Number of distinct cell-centered ids that live in one plane.
    pub fn slots_per_plane(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    pub fn cell_centered(&self, ci: &CellInds, event_index: usize) -> EventId {
        let di = (ci.i - self.ci_min[0]) as usize;
        let dj = (ci.j - self.ci_min[1]) as usize;
        EventId {
            e1: di + self.dims[0] * (dj + self.dims[1] * event_index),
            e2: ci.k,
        }
    }

    /// Recovers the cell and event index of a cell-centered id.
    pub fn decode(&self, eid: &EventId) -> (CellInds, usize) {
        let r0 = eid.e1 / self.dims[0];
        let r1 = r0 / self.dims[1];
        let ci = CellInds::new(
            (eid.e1 - self.dims[0] * r0) as i32 + self.ci_min[0],
            (r0 - self.dims[1] * r1) as i32 + self.ci_min[1],
            eid.e2,
        );
        (ci, r1)
    }
}
