//! Call-local storage pool
//!
//! A varlist holds the argument bindings of a call in progress. Varlists are
//! recycled: a frame popped normally hands its varlist back to the reuse
//! list, and the next claimant gets the most recently returned one with every
//! slot reset. Aborted frames release their storage outright; the emptied
//! slot goes on a separate vacant list.

use crate::value::Cell;
use tracing::debug;

/// Handle to a varlist in the [`VarlistPool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarlistId {
    index: u32,
    generation: u32,
}

impl VarlistId {
    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Claimed,
    Pooled,
    Vacant,
}

#[derive(Debug)]
struct Entry {
    generation: u32,
    state: EntryState,
    slots: Vec<Cell>,
}

/// Pool of reusable call-local storage
#[derive(Debug)]
pub struct VarlistPool {
    entries: Vec<Entry>,
    /// Pooled entries, most recently returned last
    reuse: Vec<u32>,
    /// Released entries with no storage attached
    vacant: Vec<u32>,
    max_pooled: usize,
}

impl VarlistPool {
    pub fn new(max_pooled: usize) -> Self {
        Self {
            entries: Vec::new(),
            reuse: Vec::new(),
            vacant: Vec::new(),
            max_pooled,
        }
    }

    /// Claim storage for `len` slots, every slot initialized to unreadable
    pub fn claim(&mut self, len: usize) -> VarlistId {
        let index = match self.reuse.pop() {
            Some(index) => {
                debug!(index, len, "reusing pooled varlist");
                index
            }
            None => match self.vacant.pop() {
                Some(index) => index,
                None => {
                    self.entries.push(Entry {
                        generation: 0,
                        state: EntryState::Vacant,
                        slots: Vec::new(),
                    });
                    (self.entries.len() - 1) as u32
                }
            },
        };

        let entry = &mut self.entries[index as usize];
        entry.generation = entry.generation.wrapping_add(1);
        entry.state = EntryState::Claimed;
        entry.slots.clear();
        entry.slots.resize(len, Cell::unreadable());

        VarlistId {
            index,
            generation: entry.generation,
        }
    }

    /// Reset a claimed varlist to `len` unreadable slots, keeping its identity
    pub fn reinit(&mut self, id: VarlistId, len: usize) {
        let entry = self.claimed_mut(id);
        entry.slots.clear();
        entry.slots.resize(len, Cell::unreadable());
    }

    /// Return storage to the reuse list
    ///
    /// Once the pool is full the storage is released instead.
    pub fn pool(&mut self, id: VarlistId) {
        if self.reuse.len() >= self.max_pooled {
            self.release(id);
            return;
        }
        let entry = self.claimed_mut(id);
        entry.state = EntryState::Pooled;
        self.reuse.push(id.index);
    }

    /// Drop the storage and put the entry on the vacant list
    pub fn release(&mut self, id: VarlistId) {
        let entry = self.claimed_mut(id);
        entry.state = EntryState::Vacant;
        entry.slots = Vec::new();
        self.vacant.push(id.index);
    }

    pub fn slots(&self, id: VarlistId) -> Option<&[Cell]> {
        self.entries
            .get(id.index())
            .filter(|entry| entry.generation == id.generation && entry.state == EntryState::Claimed)
            .map(|entry| entry.slots.as_slice())
    }

    pub(crate) fn slots_mut(&mut self, id: VarlistId) -> &mut [Cell] {
        &mut self.claimed_mut(id).slots
    }

    /// Number of entries waiting on the reuse list
    pub fn pooled(&self) -> usize {
        self.reuse.len()
    }

    /// Number of varlists currently owned by frames
    pub fn claimed(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.state == EntryState::Claimed)
            .count()
    }

    fn claimed_mut(&mut self, id: VarlistId) -> &mut Entry {
        let entry = &mut self.entries[id.index()];
        assert!(
            entry.generation == id.generation && entry.state == EntryState::Claimed,
            "varlist {:?} is not claimed",
            id
        );
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_pooled_storage_is_reused_fresh() {
        let mut pool = VarlistPool::new(4);
        let first = pool.claim(2);
        pool.slots_mut(first)[0] = Cell::new(Value::Integer(1));
        pool.pool(first);
        assert_eq!(pool.pooled(), 1);

        let second = pool.claim(3);
        assert_eq!(second.index(), first.index());
        assert_ne!(second.generation(), first.generation());
        assert!(pool.slots(first).is_none());
        assert_eq!(
            pool.slots(second),
            Some(&[Cell::unreadable(), Cell::unreadable(), Cell::unreadable()][..])
        );
    }

    #[test]
    fn test_release_goes_to_vacant_list() {
        let mut pool = VarlistPool::new(4);
        let id = pool.claim(1);
        pool.release(id);

        assert_eq!(pool.pooled(), 0);
        assert_eq!(pool.claimed(), 0);

        // The vacant slot is still recycled for identity
        let next = pool.claim(1);
        assert_eq!(next.index(), id.index());
    }

    #[test]
    fn test_pool_limit() {
        let mut pool = VarlistPool::new(1);
        let a = pool.claim(1);
        let b = pool.claim(1);
        pool.pool(a);
        pool.pool(b);

        assert_eq!(pool.pooled(), 1);
        assert_eq!(pool.claimed(), 0);
    }

    #[test]
    #[should_panic(expected = "is not claimed")]
    fn test_double_pool_panics() {
        let mut pool = VarlistPool::new(4);
        let id = pool.claim(1);
        pool.pool(id);
        pool.pool(id);
    }
}
