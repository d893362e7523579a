use std::collections::BTreeSet;

use crate::{FaultDisk, FaultDiskError, MemBackend, SectorList, SECTOR_SIZE};
use proptest::prelude::*;
use proptest::test_runner::TestCaseResult;

#[derive(Debug, Clone)]
enum Op {
    Write { offset: u32, data: Vec<u8> },
    Read { offset: u32, len: usize },
    Flush,
}

const MAX_DISK_SECTORS: u32 = 64;
const MAX_OPS: usize = 48;
const MAX_RW_LEN: usize = 4 * SECTOR_SIZE;

const SECTOR_SIZE_U32: u32 = SECTOR_SIZE as u32;

fn disk_size_strategy() -> impl Strategy<Value = u32> {
    prop_oneof![
        3 => (1u32..=MAX_DISK_SECTORS).prop_map(|sectors| sectors * SECTOR_SIZE_U32),
        // Images are not always a whole number of sectors.
        1 => 1u32..=MAX_DISK_SECTORS * SECTOR_SIZE_U32,
    ]
}

fn bad_sectors_strategy() -> impl Strategy<Value = BTreeSet<u64>> {
    // Some sectors land past the end of small disks on purpose.
    prop::collection::btree_set(0u64..(MAX_DISK_SECTORS as u64 + 4), 0..12)
}

fn offset_strategy(disk_size: u32) -> BoxedStrategy<u32> {
    // Allow offsets past the end to exercise clipping.
    let max_offset = disk_size + SECTOR_SIZE_U32;

    let any = 0u32..=max_offset;
    let sector_aligned =
        (0u32..=max_offset / SECTOR_SIZE_U32).prop_map(|lba| lba * SECTOR_SIZE_U32);
    let near_end = (0u32..=SECTOR_SIZE_U32).prop_map(move |delta| disk_size.saturating_sub(delta));

    prop_oneof![
        3 => any,
        2 => sector_aligned,
        1 => near_end,
    ]
    .boxed()
}

fn op_strategy(disk_size: u32) -> BoxedStrategy<Op> {
    prop_oneof![
        5 => (offset_strategy(disk_size), prop::collection::vec(any::<u8>(), 0..=MAX_RW_LEN))
            .prop_map(|(offset, data)| Op::Write { offset, data }),
        4 => (offset_strategy(disk_size), 0usize..=MAX_RW_LEN)
            .prop_map(|(offset, len)| Op::Read { offset, len }),
        1 => Just(Op::Flush),
    ]
    .boxed()
}

fn scenario_strategy() -> BoxedStrategy<(u32, BTreeSet<u64>, u64, Vec<Op>)> {
    (disk_size_strategy(), bad_sectors_strategy(), 0u64..6)
        .prop_flat_map(|(disk_size, bad, reserve)| {
            (
                Just(disk_size),
                Just(bad),
                Just(reserve),
                prop::collection::vec(op_strategy(disk_size), 1..=MAX_OPS),
            )
        })
        .boxed()
}

/// Straightforward per-sector model of the fault rules.
struct Model {
    data: Vec<u8>,
    bad: BTreeSet<u64>,
    reserve: u64,
}

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Data(Vec<u8>),
    Written(usize),
    BadSector(u64),
    NoReserve(u64),
}

impl Model {
    fn clip(&self, offset: usize, len: usize) -> usize {
        if offset >= self.data.len() {
            0
        } else {
            len.min(self.data.len() - offset)
        }
    }

    fn sectors(offset: usize, len: usize) -> std::ops::RangeInclusive<u64> {
        let first = (offset / SECTOR_SIZE) as u64;
        let last = ((offset + len - 1) / SECTOR_SIZE) as u64;
        first..=last
    }

    fn read(&self, offset: usize, len: usize) -> Outcome {
        let len = self.clip(offset, len);
        if len == 0 {
            return Outcome::Data(Vec::new());
        }
        for sector in Self::sectors(offset, len) {
            if self.bad.contains(&sector) {
                return Outcome::BadSector(sector);
            }
        }
        Outcome::Data(self.data[offset..offset + len].to_vec())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Outcome {
        let len = self.clip(offset, data.len());
        if len == 0 {
            return Outcome::Written(0);
        }
        for sector in Self::sectors(offset, len) {
            if self.bad.contains(&sector) {
                if self.reserve == 0 {
                    return Outcome::NoReserve(sector);
                }
                self.reserve -= 1;
                self.bad.remove(&sector);
            }
        }
        self.data[offset..offset + len].copy_from_slice(&data[..len]);
        Outcome::Written(len)
    }
}

fn outcome_of<T>(res: Result<T, FaultDiskError>, ok: impl FnOnce(T) -> Outcome) -> Outcome {
    match res {
        Ok(v) => ok(v),
        Err(FaultDiskError::BadSector { sector }) => Outcome::BadSector(sector),
        Err(FaultDiskError::NoReserve { sector }) => Outcome::NoReserve(sector),
        Err(other) => panic!("unexpected engine error: {other}"),
    }
}

fn make_pattern(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u32).wrapping_mul(31).wrapping_add(7) as u8)
        .collect()
}

fn run_ops(disk_size: u32, bad: BTreeSet<u64>, reserve: u64, ops: &[Op]) -> TestCaseResult {
    let data = make_pattern(disk_size as usize);
    let disk = FaultDisk::new(
        MemBackend::from_vec(data.clone()),
        bad.iter().copied().collect::<SectorList>(),
        reserve,
    )
    .unwrap();
    let mut model = Model {
        data,
        bad: bad.clone(),
        reserve,
    };
    let initial_bad = bad.len() as u64;

    for op in ops {
        match op {
            Op::Write { offset, data } => {
                let got = outcome_of(disk.write(*offset as u64, data), Outcome::Written);
                let want = model.write(*offset as usize, data);
                prop_assert_eq!(got, want);
            }
            Op::Read { offset, len } => {
                let before = disk.status().unwrap();
                let got = outcome_of(disk.read(*offset as u64, *len), Outcome::Data);
                let want = model.read(*offset as usize, *len);
                prop_assert_eq!(got, want);
                prop_assert_eq!(disk.status().unwrap(), before);
            }
            Op::Flush => disk.flush().unwrap(),
        }

        let status = disk.status().unwrap();
        prop_assert_eq!(status.bad_sector_count + status.repaired_sectors, initial_bad);
        prop_assert_eq!(status.repaired_sectors, reserve - status.reserve_remaining);
        prop_assert_eq!(status.reserve_remaining, model.reserve);
        prop_assert_eq!(
            disk.bad_sectors().unwrap(),
            model.bad.iter().copied().collect::<Vec<_>>()
        );
    }

    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_fault_disk_matches_reference((disk_size, bad, reserve, ops) in scenario_strategy()) {
        run_ops(disk_size, bad, reserve, &ops)?;
    }

    #[test]
    fn prop_sector_list_display_reparses(sectors in prop::collection::btree_set(any::<u64>(), 0..32)) {
        let list: SectorList = sectors.iter().copied().collect();
        let reparsed = SectorList::parse(&list.to_string()).unwrap();
        prop_assert_eq!(reparsed.iter().collect::<Vec<_>>(), sectors.into_iter().collect::<Vec<_>>());
    }
}
