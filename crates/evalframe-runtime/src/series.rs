//! Series heap
//!
//! Arrays of cells live in an arena and are addressed by [`SeriesId`], an
//! index plus a generation so that a freed slot reused for a new series does
//! not alias old references.
//!
//! A series may carry a *hold*: while held, structural mutation (append,
//! insert, remove, clear) fails, but element assignment remains legal.
//! Frames evaluating a series hold it so their cursor stays valid.

use crate::error::RuntimeError;
use crate::value::{Cell, Value};
use std::fmt;
use std::ops::BitOr;

/// Handle to a series in the [`SeriesHeap`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeriesId {
    index: u32,
    generation: u32,
}

impl SeriesId {
    /// Raw slot index
    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// Series info bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeriesInfo(u8);

impl SeriesInfo {
    pub const NONE: SeriesInfo = SeriesInfo(0);
    /// Structural lock
    pub const HOLD: SeriesInfo = SeriesInfo(1 << 0);
    /// Lifetime is decided by the collector
    pub const MANAGED: SeriesInfo = SeriesInfo(1 << 1);
    /// May contain nulled cells
    pub const NULLEDS_LEGAL: SeriesInfo = SeriesInfo(1 << 2);

    pub fn contains(self, other: SeriesInfo) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: SeriesInfo) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: SeriesInfo) {
        self.0 &= !other.0;
    }
}

impl BitOr for SeriesInfo {
    type Output = SeriesInfo;

    fn bitor(self, rhs: SeriesInfo) -> SeriesInfo {
        SeriesInfo(self.0 | rhs.0)
    }
}

/// An array of cells with its info bits
#[derive(Debug, Clone)]
pub struct Series {
    cells: Vec<Cell>,
    info: SeriesInfo,
}

impl Series {
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn info(&self) -> SeriesInfo {
        self.info
    }

    pub fn is_held(&self) -> bool {
        self.info.contains(SeriesInfo::HOLD)
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    series: Option<Series>,
}

/// Arena of series with slot reuse
#[derive(Debug, Default)]
pub struct SeriesHeap {
    slots: Vec<Slot>,
    /// Indices of freed slots, consumed by `alloc`
    free_list: Vec<u32>,
}

impl SeriesHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a series holding `cells`
    ///
    /// Nulled cells are only accepted when `info` includes `NULLEDS_LEGAL`.
    pub fn alloc(&mut self, cells: Vec<Cell>, info: SeriesInfo) -> Result<SeriesId, RuntimeError> {
        if !info.contains(SeriesInfo::NULLEDS_LEGAL) && cells.iter().any(Cell::is_nulled) {
            return Err(RuntimeError::NulledInSeries);
        }

        let series = Series { cells, info };
        let id = match self.free_list.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.series = Some(series);
                SeriesId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    series: Some(series),
                });
                SeriesId {
                    index,
                    generation: 0,
                }
            }
        };
        Ok(id)
    }

    /// Allocate an unmanaged series from plain values
    pub fn alloc_values(&mut self, values: Vec<Value>) -> Result<SeriesId, RuntimeError> {
        self.alloc(values.into_iter().map(Cell::new).collect(), SeriesInfo::NONE)
    }

    pub fn get(&self, id: SeriesId) -> Option<&Series> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.series.as_ref())
    }

    fn get_mut(&mut self, id: SeriesId) -> Result<&mut Series, RuntimeError> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.series.as_mut())
            .ok_or(RuntimeError::StaleSeries)
    }

    /// Whether `id` still refers to a live series
    pub fn contains(&self, id: SeriesId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self, id: SeriesId) -> Option<usize> {
        self.get(id).map(Series::len)
    }

    /// Cell at `index`, or `None` past the tail
    pub fn cell(&self, id: SeriesId, index: usize) -> Option<&Cell> {
        self.get(id).and_then(|series| series.cells.get(index))
    }

    /// Number of live series
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.series.is_some()).count()
    }

    // ========================================================================
    // Holds
    // ========================================================================

    pub fn is_held(&self, id: SeriesId) -> bool {
        self.get(id).is_some_and(Series::is_held)
    }

    pub fn hold(&mut self, id: SeriesId) -> Result<(), RuntimeError> {
        self.get_mut(id)?.info.insert(SeriesInfo::HOLD);
        Ok(())
    }

    pub fn release_hold(&mut self, id: SeriesId) -> Result<(), RuntimeError> {
        self.get_mut(id)?.info.remove(SeriesInfo::HOLD);
        Ok(())
    }

    /// Hand the series over to the collector
    pub fn manage(&mut self, id: SeriesId) -> Result<(), RuntimeError> {
        self.get_mut(id)?.info.insert(SeriesInfo::MANAGED);
        Ok(())
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Overwrite the cell at `index`; legal even while held
    pub fn set(&mut self, id: SeriesId, index: usize, cell: Cell) -> Result<(), RuntimeError> {
        let series = self.get_mut(id)?;
        check_nulled(series, &cell)?;
        let len = series.cells.len();
        let slot = series
            .cells
            .get_mut(index)
            .ok_or(RuntimeError::OutOfBounds { index, len })?;
        *slot = cell;
        Ok(())
    }

    pub fn append(&mut self, id: SeriesId, cell: Cell) -> Result<(), RuntimeError> {
        let series = self.structural(id)?;
        check_nulled(series, &cell)?;
        series.cells.push(cell);
        Ok(())
    }

    pub fn insert(&mut self, id: SeriesId, index: usize, cell: Cell) -> Result<(), RuntimeError> {
        let series = self.structural(id)?;
        check_nulled(series, &cell)?;
        let len = series.cells.len();
        if index > len {
            return Err(RuntimeError::OutOfBounds { index, len });
        }
        series.cells.insert(index, cell);
        Ok(())
    }

    pub fn remove(&mut self, id: SeriesId, index: usize) -> Result<Cell, RuntimeError> {
        let series = self.structural(id)?;
        let len = series.cells.len();
        if index >= len {
            return Err(RuntimeError::OutOfBounds { index, len });
        }
        Ok(series.cells.remove(index))
    }

    pub fn clear(&mut self, id: SeriesId) -> Result<(), RuntimeError> {
        self.structural(id)?.cells.clear();
        Ok(())
    }

    fn structural(&mut self, id: SeriesId) -> Result<&mut Series, RuntimeError> {
        let series = self.get_mut(id)?;
        if series.is_held() {
            return Err(RuntimeError::SeriesHeld);
        }
        Ok(series)
    }

    // ========================================================================
    // Collection
    // ========================================================================

    /// Mark from `roots` and free every unreachable managed series
    ///
    /// Held series survive regardless of reachability. Returns the number of
    /// series marked and the number freed.
    pub fn collect(&mut self, roots: Vec<SeriesId>) -> (usize, usize) {
        let mut reachable = vec![false; self.slots.len()];
        let mut work_list = roots;
        let mut marked = 0;

        while let Some(id) = work_list.pop() {
            let idx = id.index();
            if idx >= reachable.len() || reachable[idx] {
                continue;
            }
            let Some(series) = self.get(id) else {
                continue;
            };
            reachable[idx] = true;
            marked += 1;

            work_list.extend(series.cells.iter().filter_map(|cell| cell.value.series()));
        }

        let mut swept = 0;
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if reachable[idx] {
                continue;
            }
            let collectable = slot.series.as_ref().is_some_and(|series| {
                series.info.contains(SeriesInfo::MANAGED) && !series.is_held()
            });
            if collectable {
                slot.series = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free_list.push(idx as u32);
                swept += 1;
            }
        }

        (marked, swept)
    }
}

fn check_nulled(series: &Series, cell: &Cell) -> Result<(), RuntimeError> {
    if cell.is_nulled() && !series.info.contains(SeriesInfo::NULLEDS_LEGAL) {
        return Err(RuntimeError::NulledInSeries);
    }
    Ok(())
}
