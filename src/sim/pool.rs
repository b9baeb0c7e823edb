//! Pooled block allocator backing every simulation entity
//!
//! Storage is split into blocks of a fixed number of slots. Each block keeps
//! its own free list, and blocks with room left are chained into a
//! doubly-linked free-block list so allocation never scans. The block index
//! table grows by doubling. A block whose last slot is released is dropped
//! immediately instead of being cached.
//!
//! Every allocation is stamped with a pool-wide serial number. Handles carry
//! the serial, so a double free or a use-after-free is reported instead of
//! silently touching whatever occupies the slot now.

use serde::{Deserialize, Serialize};

use crate::error::PoolError;

/// Slots per block unless configured otherwise
pub const DEFAULT_BLOCK_SLOTS: u32 = 128;

/// Stable address of a pooled value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolHandle {
    pub block: u32,
    pub slot: u32,
    pub serial: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Slot<T> {
    Vacant { next: Option<u32> },
    Occupied { serial: u64, value: T },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Block<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    used: u32,
    prev_free: Option<u32>,
    next_free: Option<u32>,
}

impl<T> Block<T> {
    fn new(size: u32) -> Self {
        let slots = (0..size)
            .map(|i| Slot::Vacant {
                next: (i + 1 < size).then_some(i + 1),
            })
            .collect();
        Self {
            slots,
            free_head: Some(0),
            used: 0,
            prev_free: None,
            next_free: None,
        }
    }
}

/// Fixed-size-class allocator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryPool<T> {
    block_slots: u32,
    blocks: Vec<Option<Box<Block<T>>>>,
    /// Table entries whose block has been released
    spare: Vec<u32>,
    /// Head of the list of blocks with at least one vacant slot
    free_blocks: Option<u32>,
    serial: u64,
    live: usize,
    #[serde(skip)]
    peak: usize,
}

impl<T> Default for MemoryPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MemoryPool<T> {
    pub fn new() -> Self {
        Self::with_block_slots(DEFAULT_BLOCK_SLOTS)
    }

    pub fn with_block_slots(block_slots: u32) -> Self {
        Self {
            block_slots: block_slots.max(1),
            blocks: Vec::new(),
            spare: Vec::new(),
            free_blocks: None,
            serial: 0,
            live: 0,
            peak: 0,
        }
    }

    /// Number of values currently allocated
    pub fn live(&self) -> usize {
        self.live
    }

    /// Highest number of values allocated at the same time
    pub fn peak(&self) -> usize {
        self.peak.max(self.live)
    }

    /// Number of blocks currently backed by storage
    pub fn block_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_some()).count()
    }

    /// Size of the block index table
    pub fn table_capacity(&self) -> usize {
        self.blocks.capacity()
    }

    /// Store a value, returning its handle
    pub fn allocate(&mut self, value: T) -> Result<PoolHandle, PoolError> {
        let index = match self.free_blocks {
            Some(index) => index,
            None => self.grow()?,
        };
        let broken = PoolError::StaleHandle { block: index, slot: 0 };
        let block = self.block_mut(index).ok_or(broken.clone())?;
        let slot = block.free_head.ok_or(broken.clone())?;
        let next = match block.slots.get(slot as usize) {
            Some(Slot::Vacant { next }) => *next,
            _ => return Err(broken),
        };

        self.serial += 1;
        let serial = self.serial;
        let block = self.block_mut(index).ok_or(broken)?;
        block.slots[slot as usize] = Slot::Occupied { serial, value };
        block.free_head = next;
        block.used += 1;
        if block.free_head.is_none() {
            self.unlink_free(index);
        }

        self.live += 1;
        self.peak = self.peak.max(self.live);
        Ok(PoolHandle {
            block: index,
            slot,
            serial,
        })
    }

    /// Release a value, handing it back to the caller
    pub fn free(&mut self, handle: PoolHandle) -> Result<T, PoolError> {
        let PoolHandle {
            block: index,
            slot,
            serial,
        } = handle;
        let stale = PoolError::StaleHandle { block: index, slot };
        let block = self.block_mut(index).ok_or(stale.clone())?;
        let free_head = block.free_head;
        let entry = block.slots.get_mut(slot as usize).ok_or(stale.clone())?;

        let previous = std::mem::replace(entry, Slot::Vacant { next: free_head });
        let value = match previous {
            Slot::Occupied { serial: current, value } if current == serial => value,
            occupied @ Slot::Occupied { .. } => {
                *entry = occupied;
                return Err(stale);
            }
            vacant @ Slot::Vacant { .. } => {
                *entry = vacant;
                return Err(PoolError::DoubleFree { block: index, slot });
            }
        };

        let was_full = free_head.is_none();
        block.free_head = Some(slot);
        block.used -= 1;
        let empty = block.used == 0;
        self.live -= 1;

        if empty {
            if !was_full {
                self.unlink_free(index);
            }
            self.blocks[index as usize] = None;
            self.spare.push(index);
        } else if was_full {
            self.link_free(index);
        }
        Ok(value)
    }

    pub fn get(&self, handle: PoolHandle) -> Option<&T> {
        let block = self.blocks.get(handle.block as usize)?.as_deref()?;
        match block.slots.get(handle.slot as usize)? {
            Slot::Occupied { serial, value } if *serial == handle.serial => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        let block = self.block_mut(handle.block)?;
        match block.slots.get_mut(handle.slot as usize)? {
            Slot::Occupied { serial, value } if *serial == handle.serial => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, handle: PoolHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Live values in storage order
    pub fn iter(&self) -> impl Iterator<Item = (PoolHandle, &T)> {
        self.blocks
            .iter()
            .enumerate()
            .filter_map(|(b, block)| block.as_deref().map(|block| (b as u32, block)))
            .flat_map(|(b, block)| {
                block
                    .slots
                    .iter()
                    .enumerate()
                    .filter_map(move |(s, slot)| match slot {
                        Slot::Occupied { serial, value } => Some((
                            PoolHandle {
                                block: b,
                                slot: s as u32,
                                serial: *serial,
                            },
                            value,
                        )),
                        Slot::Vacant { .. } => None,
                    })
            })
    }

    fn block_mut(&mut self, index: u32) -> Option<&mut Block<T>> {
        self.blocks.get_mut(index as usize)?.as_deref_mut()
    }

    /// Bring a fresh block online, growing the index table if it is full
    fn grow(&mut self) -> Result<u32, PoolError> {
        let index = match self.spare.pop() {
            Some(index) => index,
            None => {
                let len = self.blocks.len();
                if len == self.blocks.capacity() {
                    let extra = self.blocks.capacity().max(1);
                    self.blocks
                        .try_reserve_exact(extra)
                        .map_err(|_| PoolError::OutOfMemory { blocks: len })?;
                }
                let index =
                    u32::try_from(len).map_err(|_| PoolError::OutOfMemory { blocks: len })?;
                self.blocks.push(None);
                index
            }
        };
        self.blocks[index as usize] = Some(Box::new(Block::new(self.block_slots)));
        self.link_free(index);
        Ok(index)
    }

    fn link_free(&mut self, index: u32) {
        let head = self.free_blocks;
        if let Some(block) = self.block_mut(index) {
            block.prev_free = None;
            block.next_free = head;
        }
        if let Some(head) = head
            && let Some(block) = self.block_mut(head)
        {
            block.prev_free = Some(index);
        }
        self.free_blocks = Some(index);
    }

    fn unlink_free(&mut self, index: u32) {
        let Some(block) = self.block_mut(index) else {
            return;
        };
        let (prev, next) = (block.prev_free.take(), block.next_free.take());
        match prev {
            Some(prev) => {
                if let Some(block) = self.block_mut(prev) {
                    block.next_free = next;
                }
            }
            None => self.free_blocks = next,
        }
        if let Some(next) = next
            && let Some(block) = self.block_mut(next)
        {
            block.prev_free = prev;
        }
    }
}

impl<T> Drop for MemoryPool<T> {
    fn drop(&mut self) {
        if self.peak > 0 {
            log::debug!(
                "memory pool dropped: {} live, peak {}",
                self.live,
                self.peak
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_allocate_and_get() {
        let mut pool = MemoryPool::new();
        let a = pool.allocate("a").unwrap();
        let b = pool.allocate("b").unwrap();
        assert_eq!(pool.get(a), Some(&"a"));
        assert_eq!(pool.get(b), Some(&"b"));
        assert_eq!(pool.live(), 2);
        assert_ne!((a.block, a.slot), (b.block, b.slot));
    }

    #[test]
    fn test_double_free_detected() {
        let mut pool = MemoryPool::with_block_slots(4);
        let a = pool.allocate(1).unwrap();
        let _keep = pool.allocate(2).unwrap();
        assert_eq!(pool.free(a), Ok(1));
        assert_eq!(
            pool.free(a),
            Err(PoolError::DoubleFree {
                block: a.block,
                slot: a.slot
            })
        );
        assert_eq!(pool.live(), 1);
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let mut pool = MemoryPool::with_block_slots(4);
        let _keep = pool.allocate(0).unwrap();
        let old = pool.allocate(1).unwrap();
        pool.free(old).unwrap();
        let new = pool.allocate(2).unwrap();
        // Same slot, new serial
        assert_eq!((old.block, old.slot), (new.block, new.slot));
        assert_eq!(pool.get(old), None);
        assert!(matches!(pool.free(old), Err(PoolError::StaleHandle { .. })));
        assert_eq!(pool.get(new), Some(&2));
    }

    #[test]
    fn test_empty_block_released_immediately() {
        let mut pool = MemoryPool::with_block_slots(2);
        let handles: Vec<_> = (0..6).map(|i| pool.allocate(i).unwrap()).collect();
        assert_eq!(pool.block_count(), 3);

        pool.free(handles[2]).unwrap();
        assert_eq!(pool.block_count(), 3);
        pool.free(handles[3]).unwrap();
        assert_eq!(pool.block_count(), 2);

        // The released table entry is reused before the table grows
        let capacity = pool.table_capacity();
        pool.allocate(10).unwrap();
        assert_eq!(pool.block_count(), 3);
        assert_eq!(pool.table_capacity(), capacity);
    }

    #[test]
    fn test_index_table_doubles() {
        let mut pool = MemoryPool::with_block_slots(1);
        let mut capacities = Vec::new();
        for i in 0..9 {
            pool.allocate(i).unwrap();
            capacities.push(pool.table_capacity());
        }
        assert_eq!(pool.block_count(), 9);
        assert!(capacities.windows(2).all(|w| w[1] >= w[0]));
        assert!(pool.table_capacity() >= 9);
    }

    #[test]
    fn test_peak_tracking() {
        let mut pool = MemoryPool::with_block_slots(8);
        let handles: Vec<_> = (0..5).map(|i| pool.allocate(i).unwrap()).collect();
        for h in handles {
            pool.free(h).unwrap();
        }
        assert_eq!(pool.live(), 0);
        assert_eq!(pool.peak(), 5);
        assert_eq!(pool.block_count(), 0);
    }

    #[test]
    fn test_iter_visits_live_values() {
        let mut pool = MemoryPool::with_block_slots(2);
        let handles: Vec<_> = (0..5).map(|i| pool.allocate(i).unwrap()).collect();
        pool.free(handles[1]).unwrap();
        let mut seen: Vec<i32> = pool.iter().map(|(_, v)| *v).collect();
        seen.sort();
        assert_eq!(seen, vec![0, 2, 3, 4]);
        for (handle, value) in pool.iter() {
            assert_eq!(pool.get(handle), Some(value));
        }
    }

    proptest! {
        #[test]
        fn prop_live_count_and_no_double_hand_out(
            ops in prop::collection::vec((any::<bool>(), any::<usize>()), 1..300),
            block_slots in 1u32..6,
        ) {
            let mut pool = MemoryPool::with_block_slots(block_slots);
            let mut live: Vec<(PoolHandle, usize)> = Vec::new();
            let mut occupied: HashSet<(u32, u32)> = HashSet::new();
            let (mut allocs, mut frees) = (0usize, 0usize);

            for (n, (alloc, pick)) in ops.into_iter().enumerate() {
                if alloc || live.is_empty() {
                    let handle = pool.allocate(n).unwrap();
                    prop_assert!(occupied.insert((handle.block, handle.slot)));
                    live.push((handle, n));
                    allocs += 1;
                } else {
                    let (handle, value) = live.swap_remove(pick % live.len());
                    prop_assert_eq!(pool.free(handle), Ok(value));
                    prop_assert!(pool.get(handle).is_none());
                    occupied.remove(&(handle.block, handle.slot));
                    frees += 1;
                }
                prop_assert_eq!(pool.live(), allocs - frees);
            }

            for (handle, value) in &live {
                prop_assert_eq!(pool.get(*handle), Some(value));
            }
        }
    }
}
