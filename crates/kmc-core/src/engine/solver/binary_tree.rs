use super::Solver;
use crate::core::rng::RandNumGen;
use crate::engine::error::EngineError;
use crate::engine::event_id::{EventId, EventIdLayout};
use crate::engine::event_id_map::EventIdMap;
use std::collections::VecDeque;

/// Selects events by descending a complete binary tree of partial sums.
///
/// With `n` events the tree has `2n - 1` nodes stored in one array: the
/// `n - 1` internal nodes come first and leaf `l` lives at node `l + n - 1`,
/// so every internal node `r` equals `nodes[2r + 1] + nodes[2r + 2]`.
/// `events[l]` is the event owning leaf `l`.
#[derive(Debug)]
pub struct BinaryTreeSolver {
    events: VecDeque<EventId>,
    nodes: Vec<f64>,
    node_of: EventIdMap<isize>,
}

impl Default for BinaryTreeSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl BinaryTreeSolver {
    pub fn new() -> Self {
        Self {
            events: VecDeque::new(),
            nodes: Vec::new(),
            node_of: EventIdMap::new(1, 0, 0, 0, -1),
        }
    }

    fn num_internal_nodes(&self) -> usize {
        self.events.len().saturating_sub(1)
    }

    fn update_ancestors(&mut self, node: usize) {
        let mut child = node;
        while child > 0 {
            let parent = (child - 1) / 2;
            self.nodes[parent] = self.nodes[2 * parent + 1] + self.nodes[2 * parent + 2];
            child = parent;
        }
    }

    /// Bulk loading leaves the propensities at the front of `nodes`; move them
    /// to the leaf positions and fill in the internal nodes bottom-up.
    fn make_internal_nodes(&mut self) {
        let n = self.events.len();
        let num_int = self.num_internal_nodes();
        if n > 1 {
            self.nodes.resize(num_int + n, 0.0);
            for r in (0..n).rev() {
                self.nodes[r + num_int] = self.nodes[r];
            }
            for r in (0..num_int).rev() {
                self.nodes[r] = self.nodes[2 * r + 1] + self.nodes[2 * r + 2];
            }
        }
        for (leaf, eid) in self.events.iter().enumerate() {
            self.node_of.insert(*eid, (leaf + num_int) as isize);
        }
    }

    /// Adds a leaf while keeping the tree complete: the first leaf is split
    /// into an internal node whose children are its old event and the new one.
    fn append_leaf(&mut self, eid: EventId, propensity: f64) {
        if let Some(front) = self.events.pop_front() {
            let first_leaf = self.events.len();
            self.nodes.push(self.nodes[first_leaf]);
            self.events.push_back(front);
            self.node_of.insert(front, (self.nodes.len() - 1) as isize);
        }
        self.node_of.insert(eid, self.nodes.len() as isize);
        self.nodes.push(propensity);
        self.events.push_back(eid);
        self.update_ancestors(self.nodes.len() - 1);
    }

    fn remove_leaf(&mut self, eid: EventId, node: usize) {
        let leaf = node - self.num_internal_nodes();
        self.node_of.insert(eid, -1);

        let last_leaf = self.events.len() - 1;
        if leaf != last_leaf {
            let moved = self.events[last_leaf];
            self.events[leaf] = moved;
            self.nodes[node] = self.nodes[self.nodes.len() - 1];
            self.node_of.insert(moved, node as isize);
            self.update_ancestors(node);
        }
        self.events.pop_back();
        self.nodes.pop();

        // The last two nodes are now siblings whose parent is the last
        // internal node; collapse them back into a single leaf.
        if let Some(back) = self.events.pop_back() {
            let m = self.events.len() + 1;
            if let Some(last) = self.nodes.pop() {
                self.nodes[m - 1] = last;
            }
            self.events.push_front(back);
            self.node_of.insert(back, (m - 1) as isize);
            self.update_ancestors(m - 1);
        }
    }
}

impl Solver for BinaryTreeSolver {
    fn begin_building_event_list(
        &mut self,
        layout: &EventIdLayout,
        num_over_lattice_events: usize,
        planes_reserved: usize,
    ) {
        self.node_of = EventIdMap::new(
            1,
            num_over_lattice_events,
            layout.slots_per_plane(),
            planes_reserved,
            -1,
        );
        self.events.clear();
        self.nodes.clear();
    }

    fn add_cell_centered_entry(&mut self, eid: EventId, propensity: f64) {
        self.events.push_back(eid);
        self.nodes.push(propensity);
    }

    fn add_over_lattice_entry(&mut self, eid: EventId, propensity: f64) {
        self.events.push_back(eid);
        self.nodes.push(propensity);
    }

    fn end_building_event_list(&mut self) {
        self.make_internal_nodes();
    }

    fn add_or_update_cell_centered_entry(&mut self, eid: EventId, propensity: f64) {
        let node = self.node_of.get(&eid).copied().unwrap_or(-1);
        if node < 0 {
            if propensity > 0.0 {
                self.append_leaf(eid, propensity);
            }
            return;
        }

        let node = node as usize;
        if propensity > 0.0 {
            if self.nodes[node] != propensity {
                self.nodes[node] = propensity;
                self.update_ancestors(node);
            }
        } else {
            self.remove_leaf(eid, node);
        }
    }

    fn choose_event_id_and_update_time(
        &mut self,
        rng: &mut dyn RandNumGen,
        time: &mut f64,
    ) -> Result<EventId, EngineError> {
        if self.events.is_empty() {
            return Err(EngineError::NoEvents);
        }

        let num_int = self.num_internal_nodes();
        let mut chosen = 0;
        if num_int > 0 {
            let mut r = self.nodes[0] * rng.get_num_in_open_interval_from_0_to_1();
            while chosen < num_int {
                let left = 2 * chosen + 1;
                if r <= self.nodes[left] {
                    chosen = left;
                } else {
                    r -= self.nodes[left];
                    chosen = left + 1;
                }
            }
        }

        *time += -rng.get_num_in_open_interval_from_0_to_1().ln() / self.nodes[0];
        Ok(self.events[chosen - num_int])
    }

    fn no_more_events(&self) -> bool {
        self.events.is_empty()
    }

    fn num_events(&self) -> usize {
        self.events.len()
    }

    fn total_propensity(&self) -> f64 {
        self.nodes.first().copied().unwrap_or(0.0)
    }
}
