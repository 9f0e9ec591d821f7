//! Data stack
//!
//! Scratch stack shared by every frame of an engine. Scanners push the units
//! they produce here, and reification accumulates a drained stream here
//! before consolidating it into a series.

use crate::value::Cell;

#[derive(Debug, Default)]
pub struct DataStack {
    cells: Vec<Cell>,
}

impl DataStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cell: Cell) {
        self.cells.push(cell);
    }

    /// Current stack height
    pub fn dsp(&self) -> usize {
        self.cells.len()
    }

    /// Discard everything above `dsp`
    pub fn drop_to(&mut self, dsp: usize) {
        self.cells.truncate(dsp);
    }

    /// Remove everything above `dsp`, in push order
    pub fn pop_to_vec(&mut self, dsp: usize) -> Vec<Cell> {
        self.cells.split_off(dsp.min(self.cells.len()))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }
}
