//! Parser for bad sector lists such as `"1,3-4,9"`.
//!
//! Tokens are separated by `,`. A token is either a single decimal sector index or an inclusive
//! `low-high` range. The result is a set: duplicates collapse and input order does not matter.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::range_set::{SectorRange, SectorRangeSet};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SectorListError {
    #[error("empty entry at position {position}")]
    EmptyToken { position: usize },

    #[error("entry {token:?} at position {position} is not a sector number")]
    InvalidNumber { token: String, position: usize },

    #[error("range {token:?} at position {position} ends before it starts")]
    ReversedRange { token: String, position: usize },

    #[error("list covers every sector index, which is more sectors than can be counted")]
    EverySector,
}

/// Canonical set of sector indices parsed from a bad sector list.
///
/// Ranges are kept compressed, so `"0-4000000000"` costs one entry rather than four billion.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SectorList {
    sectors: SectorRangeSet,
}

impl SectorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(spec: &str) -> Result<Self, SectorListError> {
        let mut sectors = SectorRangeSet::new();
        if spec.trim().is_empty() {
            return Ok(Self { sectors });
        }

        for (position, raw) in spec.split(',').enumerate() {
            let token = raw.trim();
            if token.is_empty() {
                return Err(SectorListError::EmptyToken { position });
            }

            match token.split_once('-') {
                None => {
                    let sector = parse_sector(token, token, position)?;
                    sectors.insert(sector, sector);
                }
                Some((low, high)) => {
                    let low = parse_sector(low.trim(), token, position)?;
                    let high = parse_sector(high.trim(), token, position)?;
                    if high < low {
                        return Err(SectorListError::ReversedRange {
                            token: token.to_string(),
                            position,
                        });
                    }
                    sectors.insert(low, high);
                }
            }
        }

        // 2^64 sectors: the count would not fit in a u64.
        if sectors.ranges() == [SectorRange::new(0, u64::MAX)] {
            return Err(SectorListError::EverySector);
        }

        Ok(Self { sectors })
    }

    /// Number of distinct sectors.
    pub fn len(&self) -> u64 {
        self.sectors.count()
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }

    pub fn contains(&self, sector: u64) -> bool {
        self.sectors.contains(sector)
    }

    pub fn ranges(&self) -> &[SectorRange] {
        self.sectors.ranges()
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.sectors.iter()
    }

    pub(crate) fn from_range_set(sectors: SectorRangeSet) -> Self {
        Self { sectors }
    }

    pub(crate) fn into_range_set(self) -> SectorRangeSet {
        self.sectors
    }
}

fn parse_sector(digits: &str, token: &str, position: usize) -> Result<u64, SectorListError> {
    // `u64::from_str` accepts a leading `+`; sector lists are plain digits only.
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SectorListError::InvalidNumber {
            token: token.to_string(),
            position,
        });
    }
    digits
        .parse::<u64>()
        .map_err(|_| SectorListError::InvalidNumber {
            token: token.to_string(),
            position,
        })
}

impl FromStr for SectorList {
    type Err = SectorListError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl FromIterator<u64> for SectorList {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        let mut sectors = SectorRangeSet::new();
        for sector in iter {
            sectors.insert(sector, sector);
        }
        Self { sectors }
    }
}

/// Renders the compressed form, e.g. `1,3-4,9`.
impl fmt::Display for SectorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, r) in self.sectors.ranges().iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if r.first == r.last {
                write!(f, "{}", r.first)?;
            } else {
                write!(f, "{}-{}", r.first, r.last)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sectors(spec: &str) -> Vec<u64> {
        SectorList::parse(spec).unwrap().iter().collect()
    }

    #[test]
    fn parses_single_sector() {
        assert_eq!(sectors("5"), vec![5]);
    }

    #[test]
    fn parses_inclusive_range() {
        assert_eq!(sectors("2-4"), vec![2, 3, 4]);
    }

    #[test]
    fn parses_mixed_list() {
        assert_eq!(sectors("1,3-4,9"), vec![1, 3, 4, 9]);
    }

    #[test]
    fn empty_list_has_no_sectors() {
        assert!(SectorList::parse("").unwrap().is_empty());
        assert!(SectorList::parse("   ").unwrap().is_empty());
    }

    #[test]
    fn single_sector_range() {
        assert_eq!(sectors("7-7"), vec![7]);
    }

    #[test]
    fn duplicates_and_overlaps_collapse() {
        assert_eq!(sectors("4,2-5,3,5,4-6"), vec![2, 3, 4, 5, 6]);
        assert_eq!(SectorList::parse("1,1,1").unwrap().len(), 1);
    }

    #[test]
    fn order_does_not_matter() {
        assert_eq!(
            SectorList::parse("9,3-4,1").unwrap(),
            SectorList::parse("1,3-4,9").unwrap()
        );
    }

    #[test]
    fn parsing_is_deterministic() {
        let spec = "100-110,3,0,42-42";
        assert_eq!(SectorList::parse(spec).unwrap(), SectorList::parse(spec).unwrap());
    }

    #[test]
    fn whitespace_around_tokens_is_tolerated() {
        assert_eq!(sectors(" 1 , 3 - 4 ,9 "), vec![1, 3, 4, 9]);
    }

    #[test]
    fn rejects_reversed_range() {
        let err = SectorList::parse("5-2").unwrap_err();
        assert_eq!(
            err,
            SectorListError::ReversedRange {
                token: "5-2".to_string(),
                position: 0
            }
        );
    }

    #[test]
    fn rejects_non_numeric_tokens() {
        for spec in ["abc", "1,x", "1-", "-3", "1-2-3", "+4", "0x10", "1.5", "3-b"] {
            assert!(
                matches!(
                    SectorList::parse(spec),
                    Err(SectorListError::InvalidNumber { .. })
                ),
                "{spec:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_empty_tokens() {
        assert_eq!(
            SectorList::parse("1,,2").unwrap_err(),
            SectorListError::EmptyToken { position: 1 }
        );
        assert_eq!(
            SectorList::parse("1,").unwrap_err(),
            SectorListError::EmptyToken { position: 1 }
        );
    }

    #[test]
    fn rejects_values_outside_u64() {
        assert!(matches!(
            SectorList::parse("18446744073709551616"),
            Err(SectorListError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn rejects_list_covering_every_sector() {
        assert_eq!(
            SectorList::parse("0-18446744073709551615").unwrap_err(),
            SectorListError::EverySector
        );
        assert_eq!(
            SectorList::parse("5-18446744073709551615,0-6").unwrap_err(),
            SectorListError::EverySector
        );

        let almost = SectorList::parse("1-18446744073709551615").unwrap();
        assert_eq!(almost.len(), u64::MAX);
    }

    #[test]
    fn display_folds_consecutive_runs() {
        let list = SectorList::parse("9,1,3,4,10,11").unwrap();
        assert_eq!(list.to_string(), "1,3-4,9-11");
        assert_eq!(SectorList::parse(&list.to_string()).unwrap(), list);
    }

    #[test]
    fn huge_ranges_stay_compact() {
        let list = SectorList::parse("0-4000000000,17").unwrap();
        assert_eq!(list.len(), 4_000_000_001);
        assert_eq!(list.ranges().len(), 1);
        assert!(list.contains(4_000_000_000));
        assert!(!list.contains(4_000_000_001));
    }

    #[test]
    fn display_handles_u64_max() {
        let list: SectorList = [u64::MAX - 1, u64::MAX].into_iter().collect();
        assert_eq!(list.to_string(), format!("{}-{}", u64::MAX - 1, u64::MAX));
    }
}
