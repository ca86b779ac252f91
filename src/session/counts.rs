use std::fmt;
use std::marker::PhantomData;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::detect::Label;

/// `count / total * 100`, or 0 when nothing has been counted yet.
pub fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

/// Per-label counters over a closed label set.
///
/// Every label always has an entry, so a reset keeps the keys and zeroes the
/// values. Serializes as a JSON object keyed by the label's wire key, in
/// declaration order.
#[derive(Clone, PartialEq, Eq)]
pub struct CountMap<K: Label> {
    counts: Vec<u64>,
    _labels: PhantomData<K>,
}

impl<K: Label> CountMap<K> {
    pub fn new() -> Self {
        Self {
            counts: vec![0; K::ALL.len()],
            _labels: PhantomData,
        }
    }

    pub fn increment(&mut self, label: K) {
        self.counts[label.index()] += 1;
    }

    pub fn get(&self, label: K) -> u64 {
        self.counts[label.index()]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, u64)> + '_ {
        K::ALL.iter().copied().zip(self.counts.iter().copied())
    }

    pub fn percentages(&self, total_frames: u64) -> PercentMap<K> {
        PercentMap {
            values: self
                .counts
                .iter()
                .map(|count| percentage(*count, total_frames))
                .collect(),
            _labels: PhantomData,
        }
    }
}

impl<K: Label> Default for CountMap<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Label> fmt::Debug for CountMap<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(label, count)| (label.key(), count)))
            .finish()
    }
}

impl<K: Label> Serialize for CountMap<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.counts.len()))?;
        for (label, count) in self.iter() {
            map.serialize_entry(label.key(), &count)?;
        }
        map.end()
    }
}

/// Per-label percentages of the frame total.
#[derive(Clone, Debug, PartialEq)]
pub struct PercentMap<K: Label> {
    values: Vec<f64>,
    _labels: PhantomData<K>,
}

impl<K: Label> PercentMap<K> {
    pub fn get(&self, label: K) -> f64 {
        self.values[label.index()]
    }
}

impl<K: Label> Serialize for PercentMap<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (label, value) in K::ALL.iter().zip(self.values.iter()) {
            map.serialize_entry(label.key(), value)?;
        }
        map.end()
    }
}
