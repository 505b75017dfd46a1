//! ReadingSet - an owned, ordered batch of readings
//!
//! The set owns every reading it holds. Ownership leaves the set only through
//! the consuming operations (`release`, `split_off`, `into_iter`), so a batch
//! handed across a boundary by value has exactly one owner at any time.

use crate::Reading;

/// Ordered batch of readings
#[derive(Debug, Default, PartialEq)]
pub struct ReadingSet {
    readings: Vec<Reading>,
}

impl ReadingSet {
    /// Take ownership of a sequence of readings
    pub fn new(readings: Vec<Reading>) -> Self {
        Self { readings }
    }

    /// Number of readings in the set
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Reading> {
        self.readings.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Reading> {
        self.readings.iter()
    }

    /// Borrow the readings as a slice
    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    /// Largest storage id in the set, if any reading carries one
    pub fn last_id(&self) -> Option<u64> {
        self.readings.iter().filter_map(Reading::id).max()
    }

    /// Move every reading of `other` to the end of this set
    pub fn append(&mut self, other: ReadingSet) {
        self.readings.extend(other.readings);
    }

    /// Split the set in two at `at`
    ///
    /// Readings `[at, len)` move into the returned set. `at` past the end
    /// yields an empty set.
    pub fn split_off(&mut self, at: usize) -> ReadingSet {
        let at = at.min(self.readings.len());
        ReadingSet::new(self.readings.split_off(at))
    }

    /// Release ownership of the readings to the caller
    pub fn release(self) -> Vec<Reading> {
        self.readings
    }
}

impl From<Vec<Reading>> for ReadingSet {
    fn from(readings: Vec<Reading>) -> Self {
        Self::new(readings)
    }
}

impl IntoIterator for ReadingSet {
    type Item = Reading;
    type IntoIter = std::vec::IntoIter<Reading>;

    fn into_iter(self) -> Self::IntoIter {
        self.readings.into_iter()
    }
}

impl<'a> IntoIterator for &'a ReadingSet {
    type Item = &'a Reading;
    type IntoIter = std::slice::Iter<'a, Reading>;

    fn into_iter(self) -> Self::IntoIter {
        self.readings.iter()
    }
}
