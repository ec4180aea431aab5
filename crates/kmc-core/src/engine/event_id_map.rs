use super::event_id::EventId;

/// Dense map keyed by [`EventId`].
///
/// Cell-centered keys are stored plane by plane, each plane holding one slot
/// per flattened id; planes are allocated lazily as higher keys are inserted.
/// Over-lattice keys are stored per sector.
#[derive(Debug, Clone)]
pub struct EventIdMap<T> {
    cell_centered: Vec<Vec<T>>,
    over_lattice: Vec<Vec<T>>,
    slots_per_plane: usize,
    default: T,
}

impl<T: Clone> EventIdMap<T> {
    pub fn new(
        num_sectors: usize,
        num_over_lattice_events: usize,
        slots_per_plane: usize,
        planes_to_reserve: usize,
        default: T,
    ) -> Self {
        Self {
            cell_centered: Vec::with_capacity(planes_to_reserve),
            over_lattice: vec![vec![default.clone(); num_over_lattice_events]; num_sectors],
            slots_per_plane,
            default,
        }
    }

    /// Returns the stored value, or `None` if `eid` lies beyond the allocated range.
    pub fn get(&self, eid: &EventId) -> Option<&T> {
        if eid.is_for_over_lattice() {
            self.over_lattice
                .get(eid.over_lattice_sector())?
                .get(eid.over_lattice_index())
        } else {
            self.cell_centered.get(eid.e2 as usize)?.get(eid.e1)
        }
    }

    pub fn get_mut(&mut self, eid: &EventId) -> Option<&mut T> {
        if eid.is_for_over_lattice() {
            self.over_lattice
                .get_mut(eid.over_lattice_sector())?
                .get_mut(eid.over_lattice_index())
        } else {
            self.cell_centered.get_mut(eid.e2 as usize)?.get_mut(eid.e1)
        }
    }

    /// Stores `val` under `eid`, allocating cell-centered planes as needed.
    ///
    /// # Panics
    ///
    /// Panics if `eid` is outside the layout the map was created for.
    pub fn insert(&mut self, eid: EventId, val: T) {
        if eid.is_for_over_lattice() {
            self.over_lattice[eid.over_lattice_sector()][eid.over_lattice_index()] = val;
        } else {
            let plane = eid.e2 as usize;
            while plane >= self.cell_centered.len() {
                self.cell_centered
                    .push(vec![self.default.clone(); self.slots_per_plane]);
            }
            self.cell_centered[plane][eid.e1] = val;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::CellInds;
    use crate::core::lattice::LatticePlanarBBox;
    use crate::engine::event_id::EventIdLayout;

    fn layout() -> EventIdLayout {
        EventIdLayout::new(
            &LatticePlanarBBox {
                imin: 0,
                imax_p1: 3,
                jmin: 0,
                jmax_p1: 2,
            },
            2,
        )
    }

    #[test]
    fn missing_planes_read_as_none() {
        let layout = layout();
        let map: EventIdMap<isize> = EventIdMap::new(1, 0, layout.slots_per_plane(), 4, -1);
        let eid = layout.cell_centered(&CellInds::new(1, 1, 0), 1);
        assert_eq!(map.get(&eid), None);
    }

    #[test]
    fn insert_allocates_planes_up_to_key_with_defaults() {
        let layout = layout();
        let mut map: EventIdMap<isize> = EventIdMap::new(1, 0, layout.slots_per_plane(), 1, -1);
        let high = layout.cell_centered(&CellInds::new(2, 1, 3), 0);
        map.insert(high, 17);

        assert_eq!(map.get(&high), Some(&17));
        let low = layout.cell_centered(&CellInds::new(0, 0, 1), 1);
        assert_eq!(map.get(&low), Some(&-1));
    }

    #[test]
    fn over_lattice_slots_exist_from_the_start() {
        let mut map: EventIdMap<isize> = EventIdMap::new(1, 2, 6, 1, -1);
        let eid = EventId::over_lattice(1, 0);
        assert_eq!(map.get(&eid), Some(&-1));
        *map.get_mut(&eid).unwrap() = 5;
        assert_eq!(map.get(&eid), Some(&5));
        assert_eq!(map.get(&EventId::over_lattice(2, 0)), None);
    }
}
