//! Executors shared by the models that store the film as one height per column.

use crate::core::cell::{CellInds, CellIndsOffset};
use crate::core::cells_to_change::CellsToChange;
use crate::core::lattice::Lattice;
use crate::core::neighbors::CellNeighOffsets;
use crate::engine::config::TrackingMode;
use crate::engine::error::EngineError;
use crate::engine::executor::EventExecutorGroup;
use crate::engine::state::SimulationState;
use itertools::iproduct;

/// Direction of the hop events, in event id order: up, down, left, right.
pub(super) const HOP_DIRECTIONS: [CellIndsOffset; 4] = [
    CellIndsOffset::planar(0, 1),
    CellIndsOffset::planar(0, -1),
    CellIndsOffset::planar(-1, 0),
    CellIndsOffset::planar(1, 0),
];

pub(super) fn deposit(ci: &CellInds, height: usize, lattice: &mut Lattice) {
    let h = lattice.get_int(ci, height);
    lattice.set_int(ci, height, h + 1);
}

pub(super) fn hop(ci: &CellInds, dir: CellIndsOffset, height: usize, lattice: &mut Lattice) {
    let to = *ci + dir;
    let from_h = lattice.get_int(ci, height);
    let to_h = lattice.get_int(&to, height);
    lattice.set_int(ci, height, from_h - 1);
    lattice.set_int(&to, height, to_h + 1);
}

pub(super) fn deposit_declared(
    ci: &CellInds,
    height: usize,
    lattice: &mut Lattice,
    ctc: &mut [CellsToChange],
) {
    let ctc = &mut ctc[0];
    ctc.set_center(ci);
    let h = ctc.get_int(lattice, 0, height);
    ctc.set_int(lattice, 0, height, h + 1);
}

/// The hop target is offset 1 of the declared cells.
pub(super) fn hop_declared(
    ci: &CellInds,
    height: usize,
    lattice: &mut Lattice,
    ctc: &mut [CellsToChange],
) {
    let ctc = &mut ctc[0];
    ctc.set_center(ci);
    let from_h = ctc.get_int(lattice, 0, height);
    let to_h = ctc.get_int(lattice, 1, height);
    ctc.set_int(lattice, 0, height, from_h - 1);
    ctc.set_int(lattice, 1, height, to_h + 1);
}

/// A group holding one hop executor per entry of [`HOP_DIRECTIONS`].
pub(super) fn hop_executors(
    height: usize,
    tracking: TrackingMode,
) -> Result<EventExecutorGroup, EngineError> {
    let mut group = EventExecutorGroup::new(HOP_DIRECTIONS.len());
    for (event, dir) in HOP_DIRECTIONS.into_iter().enumerate() {
        match tracking {
            TrackingMode::Auto => group.add_event_executor(
                event,
                move |ci: &CellInds, _: &SimulationState, lattice: &mut Lattice| {
                    hop(ci, dir, height, lattice);
                },
            )?,
            TrackingMode::SemiManual => group.add_event_executor_semi_manual(
                event,
                move |ci: &CellInds,
                      _: &SimulationState,
                      lattice: &mut Lattice,
                      ctc: &mut [CellsToChange]| {
                    hop_declared(ci, height, lattice, ctc);
                },
                vec![CellNeighOffsets::new(2)?.with_offset(1, dir)?],
            )?,
        }
    }
    Ok(group)
}

/// Column heights of the local lattice, row by row.
pub(super) fn column_heights(lattice: &Lattice, height: usize) -> Vec<i32> {
    let bbox = lattice.local_planar_bbox(false);
    iproduct!(bbox.imin..bbox.imax_p1, bbox.jmin..bbox.jmax_p1)
        .map(|(i, j)| lattice.get_int(&CellInds::new(i, j, 0), height))
        .collect()
}
