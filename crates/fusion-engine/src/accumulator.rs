use crate::timers::TimerSlot;
use fusion_core::{Dbid, ItemRef};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Buffers inventory pages until the inventory goes quiet, then hands out one
/// coalesced snapshot.
#[derive(Debug)]
pub struct PacketAccumulator {
    quiet: Duration,
    buffer: Vec<ItemRef>,
    flush: TimerSlot<()>,
}

impl PacketAccumulator {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            buffer: Vec::new(),
            flush: TimerSlot::default(),
        }
    }

    /// Append a page's matching items and push the flush back by one quiet
    /// interval. An empty page still re-arms the flush.
    pub fn push<I>(&mut self, items: I, now: Instant)
    where
        I: IntoIterator<Item = ItemRef>,
    {
        self.buffer.extend(items);
        self.flush.arm(now + self.quiet, ());
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.flush.deadline()
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the snapshot when the quiet interval has elapsed.
    pub fn take_due(&mut self, now: Instant) -> Option<Vec<ItemRef>> {
        self.flush.take_due(now)?;
        Some(self.drain())
    }

    /// Coalesce the buffer by dbid (amounts add up), sorted by catalog id
    /// then dbid. The buffer is left empty.
    pub fn drain(&mut self) -> Vec<ItemRef> {
        self.flush.cancel();
        let mut by_dbid: HashMap<Dbid, usize> = HashMap::new();
        let mut merged: Vec<ItemRef> = Vec::new();
        for item in self.buffer.drain(..) {
            match by_dbid.get(&item.dbid) {
                Some(idx) => {
                    let entry = &mut merged[*idx];
                    entry.amount = entry.amount.saturating_add(item.amount);
                }
                None => {
                    by_dbid.insert(item.dbid, merged.len());
                    merged.push(item);
                }
            }
        }
        merged.sort_by_key(|item| (item.id, item.dbid));
        merged
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.flush.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusion_core::CatalogId;

    fn item(dbid: u64, id: u32, amount: u64) -> ItemRef {
        ItemRef {
            dbid: Dbid(dbid),
            id: CatalogId(id),
            amount,
        }
    }

    #[test]
    fn repeated_dbid_amounts_sum() {
        let start = Instant::now();
        let mut acc = PacketAccumulator::new(Duration::from_millis(200));
        for (offset, amount) in [(0, 2), (50, 3), (90, 4)] {
            acc.push([item(9, 5, amount)], start + Duration::from_millis(offset));
        }
        let snapshot = acc
            .take_due(start + Duration::from_millis(290))
            .expect("flush after quiet period");
        assert_eq!(snapshot, vec![item(9, 5, 9)]);
        assert_eq!(acc.buffered(), 0);
    }

    #[test]
    fn coalesced_amount_caps_at_max() {
        let start = Instant::now();
        let mut acc = PacketAccumulator::new(Duration::from_millis(200));
        acc.push([item(9, 5, u64::MAX), item(9, 5, 5)], start);
        assert_eq!(acc.drain(), vec![item(9, 5, u64::MAX)]);
    }

    #[test]
    fn each_push_delays_the_flush() {
        let start = Instant::now();
        let mut acc = PacketAccumulator::new(Duration::from_millis(200));
        acc.push([item(1, 5, 1)], start);
        acc.push(Vec::<ItemRef>::new(), start + Duration::from_millis(150));
        assert!(acc.take_due(start + Duration::from_millis(200)).is_none());
        assert_eq!(
            acc.deadline(),
            Some(start + Duration::from_millis(350))
        );
        let snapshot = acc
            .take_due(start + Duration::from_millis(350))
            .expect("flush");
        assert_eq!(snapshot.len(), 1);
        assert!(acc.take_due(start + Duration::from_secs(10)).is_none());
    }

    #[test]
    fn snapshot_is_sorted_by_catalog_id() {
        let start = Instant::now();
        let mut acc = PacketAccumulator::new(Duration::from_millis(200));
        acc.push(
            [item(30, 7, 1), item(10, 5, 1), item(20, 5, 1), item(5, 7, 1)],
            start,
        );
        let ids: Vec<(u32, u64)> = acc
            .drain()
            .iter()
            .map(|item| (item.id.0, item.dbid.0))
            .collect();
        assert_eq!(ids, vec![(5, 10), (5, 20), (7, 5), (7, 30)]);
        assert!(acc.deadline().is_none());
    }
}
