use super::Solver;
use crate::core::rng::RandNumGen;
use crate::engine::error::EngineError;
use crate::engine::event_id::{EventId, EventIdLayout};
use crate::engine::event_id_map::EventIdMap;
use slotmap::{SlotMap, new_key_type};
use std::collections::{HashMap, VecDeque};

new_key_type! {
    struct BucketKey;
}

/// All events sharing one exact propensity value.
#[derive(Debug)]
struct Bucket {
    propensity: f64,
    events: VecDeque<EventId>,
    proxy_index: usize,
}

/// Cached contribution of one bucket to the running sum of propensities.
#[derive(Debug, Clone, Copy)]
struct ProxyEntry {
    bucket: BucketKey,
    recalc: bool,
    saved_contrib: f64,
    partial_sum: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Addr {
    bucket: Option<BucketKey>,
    index: Option<usize>,
}

/// Selects events using buckets of equal propensity (Schulze's method with
/// dynamic bucket creation).
///
/// Selection is linear in the number of distinct propensities, which is
/// small for most lattice models, and constant time within a bucket.
#[derive(Debug)]
pub struct DynamicSchulzeSolver {
    buckets: SlotMap<BucketKey, Bucket>,
    by_propensity: HashMap<u64, BucketKey>,
    proxy: Vec<ProxyEntry>,
    /// Lowest proxy position whose running sum is stale.
    dirty_from: Option<usize>,
    addr: EventIdMap<Addr>,
}

impl Default for DynamicSchulzeSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicSchulzeSolver {
    pub fn new() -> Self {
        Self {
            buckets: SlotMap::with_key(),
            by_propensity: HashMap::new(),
            proxy: Vec::new(),
            dirty_from: None,
            addr: EventIdMap::new(1, 0, 0, 0, Addr::default()),
        }
    }

    fn bucket_for(&mut self, propensity: f64) -> BucketKey {
        if let Some(&key) = self.by_propensity.get(&propensity.to_bits()) {
            return key;
        }
        let proxy_index = self.proxy.len();
        let key = self.buckets.insert(Bucket {
            propensity,
            events: VecDeque::new(),
            proxy_index,
        });
        self.by_propensity.insert(propensity.to_bits(), key);
        self.proxy.push(ProxyEntry {
            bucket: key,
            recalc: true,
            saved_contrib: 0.0,
            partial_sum: 0.0,
        });
        self.mark_dirty_from(proxy_index);
        key
    }

    fn mark_dirty_from(&mut self, proxy_index: usize) {
        self.dirty_from = Some(self.dirty_from.map_or(proxy_index, |d| d.min(proxy_index)));
    }

    fn mark_for_recalc(&mut self, key: BucketKey) {
        let proxy_index = self.buckets[key].proxy_index;
        self.proxy[proxy_index].recalc = true;
        self.mark_dirty_from(proxy_index);
    }

    fn push_into_bucket(&mut self, eid: EventId, key: BucketKey) {
        let bucket = &mut self.buckets[key];
        let index = bucket.events.len();
        bucket.events.push_back(eid);
        self.mark_for_recalc(key);
        self.addr.insert(
            eid,
            Addr {
                bucket: Some(key),
                index: Some(index),
            },
        );
    }

    fn add_entry(&mut self, eid: EventId, propensity: f64) {
        let key = self.bucket_for(propensity);
        self.push_into_bucket(eid, key);
    }

    /// Swap-removes position `index` from a bucket, fixing the address of
    /// the event that took its place.
    fn remove_from_bucket(&mut self, key: BucketKey, index: usize) {
        let events = &mut self.buckets[key].events;
        events.swap_remove_back(index);
        if let Some(&moved) = events.get(index) {
            if let Some(addr) = self.addr.get_mut(&moved) {
                addr.index = Some(index);
            }
        }
        self.mark_for_recalc(key);
    }

    fn drop_bucket_if_empty(&mut self, key: BucketKey) {
        if !self.buckets[key].events.is_empty() {
            return;
        }
        if let Some(bucket) = self.buckets.remove(key) {
            self.by_propensity.remove(&bucket.propensity.to_bits());
            self.proxy.swap_remove(bucket.proxy_index);
            if let Some(entry) = self.proxy.get(bucket.proxy_index) {
                self.buckets[entry.bucket].proxy_index = bucket.proxy_index;
            }
            self.mark_dirty_from(bucket.proxy_index);
        }
    }

    /// Refreshes stale contributions and the running sums from the first
    /// stale position onward; returns the total.
    fn refresh_partial_sums(&mut self) -> f64 {
        let start = self
            .dirty_from
            .take()
            .map_or(self.proxy.len(), |d| d.min(self.proxy.len()));
        let mut total = match start {
            0 => 0.0,
            _ => self.proxy[start - 1].partial_sum,
        };
        for entry in &mut self.proxy[start..] {
            if entry.recalc {
                let bucket = &self.buckets[entry.bucket];
                entry.saved_contrib = bucket.propensity * bucket.events.len() as f64;
                entry.recalc = false;
            }
            total += entry.saved_contrib;
            entry.partial_sum = total;
        }
        self.proxy.last().map_or(0.0, |entry| entry.partial_sum)
    }
}

impl Solver for DynamicSchulzeSolver {
    fn begin_building_event_list(
        &mut self,
        layout: &EventIdLayout,
        num_over_lattice_events: usize,
        planes_reserved: usize,
    ) {
        self.buckets.clear();
        self.by_propensity.clear();
        self.proxy.clear();
        self.dirty_from = None;
        self.addr = EventIdMap::new(
            1,
            num_over_lattice_events,
            layout.slots_per_plane(),
            planes_reserved,
            Addr::default(),
        );
    }

    fn add_cell_centered_entry(&mut self, eid: EventId, propensity: f64) {
        self.add_entry(eid, propensity);
    }

    fn add_over_lattice_entry(&mut self, eid: EventId, propensity: f64) {
        self.add_entry(eid, propensity);
    }

    fn add_or_update_cell_centered_entry(&mut self, eid: EventId, propensity: f64) {
        let current = self.addr.get(&eid).copied().unwrap_or_default();
        let (Some(key), Some(index)) = (current.bucket, current.index) else {
            if propensity > 0.0 {
                self.add_entry(eid, propensity);
            }
            return;
        };

        if propensity > 0.0 {
            if self.buckets[key].propensity == propensity {
                return;
            }
            self.remove_from_bucket(key, index);
            let new_key = self.bucket_for(propensity);
            self.push_into_bucket(eid, new_key);
        } else {
            self.remove_from_bucket(key, index);
            self.addr.insert(eid, Addr::default());
        }
        self.drop_bucket_if_empty(key);
    }

    fn choose_event_id_and_update_time(
        &mut self,
        rng: &mut dyn RandNumGen,
        time: &mut f64,
    ) -> Result<EventId, EngineError> {
        if self.buckets.is_empty() {
            return Err(EngineError::NoEvents);
        }

        let total = self.refresh_partial_sums();
        let r = total * rng.get_num_in_open_interval_from_0_to_1();

        let pos = self
            .proxy
            .partition_point(|entry| entry.partial_sum < r)
            .min(self.proxy.len() - 1);
        let entry = self.proxy[pos];
        let bucket = &self.buckets[entry.bucket];

        let index = (((entry.partial_sum - r) / bucket.propensity) as usize)
            .min(bucket.events.len().saturating_sub(1));
        let chosen = bucket.events.get(index).copied().ok_or_else(|| {
            EngineError::Internal(format!(
                "bucket for propensity {} is empty but still listed",
                bucket.propensity
            ))
        })?;

        *time += -rng.get_num_in_open_interval_from_0_to_1().ln() / total;
        Ok(chosen)
    }

    fn no_more_events(&self) -> bool {
        self.buckets.is_empty()
    }

    fn num_events(&self) -> usize {
        self.buckets.values().map(|b| b.events.len()).sum()
    }

    fn total_propensity(&self) -> f64 {
        self.buckets
            .values()
            .map(|b| b.propensity * b.events.len() as f64)
            .sum()
    }
}
