use crate::range_set::SectorRangeSet;
use crate::sector::SectorSpan;
use crate::sector_list::SectorList;

/// The sectors that are currently bad.
///
/// Built once from the configured [`SectorList`]; afterwards sectors can only leave the set
/// (through repair), never join it. `len() + repaired_count() == initial_count()` always holds.
#[derive(Debug, Clone)]
pub struct BadSectorRegistry {
    bad: SectorRangeSet,
    initial: u64,
    repaired: u64,
}

impl BadSectorRegistry {
    pub fn new(list: SectorList) -> Self {
        let bad = list.into_range_set();
        let initial = bad.count();
        Self {
            bad,
            initial,
            repaired: 0,
        }
    }

    pub fn contains(&self, sector: u64) -> bool {
        self.bad.contains(sector)
    }

    /// Lowest bad sector inside `span`, if any.
    pub fn first_bad_in(&self, span: SectorSpan) -> Option<u64> {
        self.bad.first_in(span.first, span.last)
    }

    /// Permanently drop `sector` from the bad set. Returns `false` if it was not bad.
    pub fn remove(&mut self, sector: u64) -> bool {
        let removed = self.bad.remove(sector);
        if removed {
            self.repaired += 1;
        }
        removed
    }

    /// Currently bad sectors in ascending order.
    pub fn snapshot(&self) -> Vec<u64> {
        self.bad.iter().collect()
    }

    /// Currently bad sectors as a compressed list.
    pub fn to_sector_list(&self) -> SectorList {
        SectorList::from_range_set(self.bad.clone())
    }

    pub fn len(&self) -> u64 {
        self.initial - self.repaired
    }

    pub fn is_empty(&self) -> bool {
        self.bad.is_empty()
    }

    pub fn initial_count(&self) -> u64 {
        self.initial
    }

    pub fn repaired_count(&self) -> u64 {
        self.repaired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(spec: &str) -> BadSectorRegistry {
        BadSectorRegistry::new(SectorList::parse(spec).unwrap())
    }

    #[test]
    fn membership_follows_parsed_list() {
        let reg = registry("1,3-4,9");
        assert!(reg.contains(1));
        assert!(reg.contains(4));
        assert!(!reg.contains(2));
        assert_eq!(reg.snapshot(), vec![1, 3, 4, 9]);
        assert_eq!(reg.len(), 4);
    }

    #[test]
    fn remove_is_permanent_and_counted() {
        let mut reg = registry("3-5");
        assert!(reg.remove(4));
        assert!(!reg.contains(4));
        assert!(!reg.remove(4));
        assert!(!reg.remove(100));

        assert_eq!(reg.snapshot(), vec![3, 5]);
        assert_eq!(reg.repaired_count(), 1);
        assert_eq!(reg.len() + reg.repaired_count(), reg.initial_count());
    }

    #[test]
    fn first_bad_in_scans_from_lowest_sector() {
        let reg = registry("7,12");
        assert_eq!(
            reg.first_bad_in(SectorSpan { first: 0, last: 20 }),
            Some(7)
        );
        assert_eq!(
            reg.first_bad_in(SectorSpan { first: 8, last: 20 }),
            Some(12)
        );
        assert_eq!(reg.first_bad_in(SectorSpan { first: 8, last: 11 }), None);
    }

    #[test]
    fn empty_registry() {
        let reg = registry("");
        assert!(reg.is_empty());
        assert_eq!(reg.initial_count(), 0);
        assert_eq!(reg.to_sector_list().to_string(), "");
    }
}
