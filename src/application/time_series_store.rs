// Time-series store - Bounded rolling history per vial
use crate::domain::sample::{Sample, VialId};
use std::collections::{BTreeMap, VecDeque};

pub const DEFAULT_CAPACITY: usize = 100;

/// Per-vial sample buffers with FIFO eviction.
///
/// Live samples are kept in arrival order. Snapshots installed through
/// [`TimeSeriesStore::replace`] are sorted by timestamp before the most recent
/// `capacity` samples are kept.
#[derive(Debug, Clone)]
pub struct TimeSeriesStore {
    capacity: usize,
    series: BTreeMap<VialId, VecDeque<Sample>>,
}

impl Default for TimeSeriesStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl TimeSeriesStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            series: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert at the tail, evicting from the head past capacity.
    pub fn append(&mut self, vial: VialId, sample: Sample) {
        let capacity = self.capacity;
        let series = self
            .series
            .entry(vial)
            .or_insert_with(|| VecDeque::with_capacity(capacity));

        series.push_back(sample);
        while series.len() > capacity {
            series.pop_front();
        }
    }

    /// Like [`append`](Self::append) but skips a sample whose timestamp is
    /// already present for this vial. Returns whether it was stored.
    pub fn append_unique(&mut self, vial: VialId, sample: Sample) -> bool {
        let duplicate = self
            .series
            .get(&vial)
            .is_some_and(|series| series.iter().any(|s| s.timestamp == sample.timestamp));

        if duplicate {
            return false;
        }
        self.append(vial, sample);
        true
    }

    /// Install an authoritative sequence for one vial.
    pub fn replace(&mut self, vial: VialId, mut samples: Vec<Sample>) {
        samples.sort_by_key(|s| s.timestamp);
        let skip = samples.len().saturating_sub(self.capacity);
        let series: VecDeque<Sample> = samples.into_iter().skip(skip).collect();
        self.series.insert(vial, series);
    }

    /// Copy of the current sequence; empty if the vial was never seen.
    pub fn get(&self, vial: VialId) -> Vec<Sample> {
        self.series
            .get(&vial)
            .map(|series| series.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, vial: VialId) -> usize {
        self.series.get(&vial).map(VecDeque::len).unwrap_or(0)
    }

    pub fn vials(&self) -> Vec<VialId> {
        self.series.keys().copied().collect()
    }

    /// True when no vial holds a single sample.
    pub fn is_empty(&self) -> bool {
        self.series.values().all(VecDeque::is_empty)
    }

    /// Drop every series (chart reinitialization).
    pub fn clear(&mut self) {
        self.series.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (VialId, &VecDeque<Sample>)> {
        self.series.iter().map(|(vial, series)| (*vial, series))
    }
}
