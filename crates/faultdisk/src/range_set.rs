use serde::{Deserialize, Serialize};

/// An inclusive sector range `[first, last]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorRange {
    pub first: u64,
    pub last: u64,
}

impl SectorRange {
    pub fn new(first: u64, last: u64) -> Self {
        debug_assert!(first <= last, "reversed sector range {first}-{last}");
        Self { first, last }
    }

    pub fn single(sector: u64) -> Self {
        Self::new(sector, sector)
    }

    /// Number of sectors in the range. Saturates for the full `0..=u64::MAX` range.
    pub fn len(&self) -> u64 {
        (self.last - self.first).saturating_add(1)
    }

    pub fn contains(&self, sector: u64) -> bool {
        self.first <= sector && sector <= self.last
    }

    fn overlaps_or_adjacent(&self, other: &SectorRange) -> bool {
        self.first <= other.last.saturating_add(1) && other.first <= self.last.saturating_add(1)
    }

    fn merge(&self, other: &SectorRange) -> SectorRange {
        SectorRange {
            first: self.first.min(other.first),
            last: self.last.max(other.last),
        }
    }
}

/// A set of sectors stored as disjoint, sorted inclusive ranges.
///
/// Invariants:
/// - Ranges are stored in ascending order.
/// - No ranges overlap or touch (adjacent ranges are merged).
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorRangeSet {
    ranges: Vec<SectorRange>,
}

impl SectorRangeSet {
    pub fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    pub fn ranges(&self) -> &[SectorRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Number of sectors in the set, saturating at `u64::MAX` for a set covering every index.
    pub fn count(&self) -> u64 {
        self.ranges
            .iter()
            .map(SectorRange::len)
            .fold(0u64, u64::saturating_add)
    }

    /// Index of the first range that ends at or after `sector`.
    fn lower_bound(&self, sector: u64) -> usize {
        self.ranges.partition_point(|r| r.last < sector)
    }

    pub fn contains(&self, sector: u64) -> bool {
        self.ranges
            .get(self.lower_bound(sector))
            .is_some_and(|r| r.contains(sector))
    }

    /// Lowest member of the set inside `[first, last]`.
    pub fn first_in(&self, first: u64, last: u64) -> Option<u64> {
        let r = self.ranges.get(self.lower_bound(first))?;
        let candidate = r.first.max(first);
        (candidate <= last).then_some(candidate)
    }

    /// Insert `[first, last]`, merging overlapping and adjacent ranges.
    pub fn insert(&mut self, first: u64, last: u64) {
        let mut new = SectorRange::new(first, last);

        let mut out = Vec::with_capacity(self.ranges.len() + 1);
        let mut inserted = false;

        for r in self.ranges.drain(..) {
            if inserted || (r.last < new.first && !r.overlaps_or_adjacent(&new)) {
                out.push(r);
                continue;
            }
            if new.last < r.first && !new.overlaps_or_adjacent(&r) {
                out.push(new);
                inserted = true;
                out.push(r);
                continue;
            }
            new = new.merge(&r);
        }

        if !inserted {
            out.push(new);
        }

        self.ranges = out;
    }

    /// Remove a single sector. Returns `false` when it was not a member.
    pub fn remove(&mut self, sector: u64) -> bool {
        let idx = self.lower_bound(sector);
        let Some(r) = self.ranges.get(idx).copied() else {
            return false;
        };
        if !r.contains(sector) {
            return false;
        }

        match (r.first == sector, r.last == sector) {
            (true, true) => {
                self.ranges.remove(idx);
            }
            (true, false) => self.ranges[idx].first = sector + 1,
            (false, true) => self.ranges[idx].last = sector - 1,
            (false, false) => {
                self.ranges[idx].last = sector - 1;
                self.ranges
                    .insert(idx + 1, SectorRange::new(sector + 1, r.last));
            }
        }
        true
    }

    /// Every member in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.ranges.iter().flat_map(|r| r.first..=r.last)
    }
}
