//! Grouping by physical location
//!
//! An error group holds every record sharing the same
//! `(sid, memoryid, rankid, bankid)` tuple, ordered by `time_idx`.
//! Groups are constructed once per run and consumed immediately by
//! feature extraction.

use crate::record::ErrorRecord;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Physical location identifying an error group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub sid: u32,
    pub memoryid: u32,
    pub rankid: u32,
    pub bankid: u32,
}

impl GroupKey {
    pub fn of(record: &ErrorRecord) -> Self {
        Self {
            sid: record.sid,
            memoryid: record.memoryid,
            rankid: record.rankid,
            bankid: record.bankid,
        }
    }
}

/// All records for one physical location, time-ordered and non-empty
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorGroup {
    pub key: GroupKey,
    pub records: Vec<ErrorRecord>,
}

impl ErrorGroup {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Partition records into groups by physical location
///
/// Group order follows first appearance in the input, so a fixed record
/// set always yields the same group sequence.
pub fn group_records(records: Vec<ErrorRecord>) -> Vec<ErrorGroup> {
    let mut map: IndexMap<GroupKey, Vec<ErrorRecord>> = IndexMap::new();
    for record in records {
        map.entry(GroupKey::of(&record)).or_default().push(record);
    }

    map.into_iter()
        .map(|(key, mut records)| {
            records.sort_by_key(|r| r.time_idx);
            ErrorGroup { key, records }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ErrorType;

    fn record(sid: u32, bankid: u32, time_idx: u64) -> ErrorRecord {
        ErrorRecord {
            sid,
            memoryid: 0,
            rankid: 0,
            bankid,
            row: 1,
            col: 1,
            error_type: ErrorType::Read,
            time_idx,
        }
    }

    #[test]
    fn test_grouping_by_location() {
        let records = vec![record(0, 0, 0), record(0, 1, 1), record(0, 0, 2)];
        let groups = group_records(records);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1].len(), 1);
    }

    #[test]
    fn test_groups_time_ordered() {
        let records = vec![record(0, 0, 5), record(0, 0, 1), record(0, 0, 3)];
        let groups = group_records(records);

        assert_eq!(groups.len(), 1);
        let times: Vec<u64> = groups[0].records.iter().map(|r| r.time_idx).collect();
        assert_eq!(times, vec![1, 3, 5]);
    }

    #[test]
    fn test_group_order_is_first_appearance() {
        let records = vec![record(1, 0, 0), record(0, 0, 1), record(1, 0, 2)];
        let groups = group_records(records);

        assert_eq!(groups[0].key.sid, 1);
        assert_eq!(groups[1].key.sid, 0);
    }

    #[test]
    fn test_empty_input() {
        assert!(group_records(Vec::new()).is_empty());
    }
}
