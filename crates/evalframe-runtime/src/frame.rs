//! Evaluation frames
//!
//! One frame exists per nested evaluation in progress. Frames live on the
//! engine's frame stack; a frame's [`FrameId`] is its depth on that stack,
//! so the frame below it is its prior.
//!
//! ## Fetch Position
//!
//! ```text
//! series: [ a  b  c  d ]
//!              ^  ^
//!              |  pending index (next unit to fetch)
//!              current (fetched, not yet consumed)
//! ```
//!
//! The current unit is always fetched before a frame is pushed. Fetching
//! moves current into the lookback and reads exactly one unit ahead.

use crate::error::Unwind;
use crate::series::SeriesId;
use crate::source::{ApiHandle, FrameSource, Instruction};
use crate::value::{ActionRef, Cell, Specifier};
use crate::varlist::VarlistId;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// Position of a frame on the frame stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(pub(crate) usize);

impl FrameId {
    /// Zero-based depth on the frame stack
    #[inline]
    pub fn depth(self) -> usize {
        self.0
    }
}

/// Frame flag bits
///
/// Mode flags are chosen by whoever runs the frame. State flags are
/// maintained by the engine and survive any mode swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct FrameFlags(u32);

impl FrameFlags {
    pub const NONE: FrameFlags = FrameFlags(0);

    // Mode flags
    /// Keep stepping until the input is exhausted
    pub const TO_END: FrameFlags = FrameFlags(1 << 0);
    /// Do not look ahead for infix operations after a unit
    pub const NO_LOOKAHEAD: FrameFlags = FrameFlags(1 << 1);
    /// Only cells tagged `EVAL_FLIP` evaluate; everything else is inert
    pub const EXPLICIT_EVALUATE: FrameFlags = FrameFlags(1 << 2);
    /// Frame is gathering an argument for a call in its prior
    pub const FULFILLING_ARG: FrameFlags = FrameFlags(1 << 3);
    /// An expression barrier was reached
    pub const BARRIER_HIT: FrameFlags = FrameFlags(1 << 4);

    // State flags
    /// This frame placed the hold on the series it walks
    pub const TOOK_HOLD: FrameFlags = FrameFlags(1 << 16);
    /// Current value lives in a transient instruction slot
    pub const VALUE_IS_INSTRUCTION: FrameFlags = FrameFlags(1 << 17);

    pub const MODE_MASK: FrameFlags = FrameFlags(0xFFFF);
    pub const STATE_MASK: FrameFlags = FrameFlags(0xFFFF_0000);

    pub fn contains(self, other: FrameFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: FrameFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: FrameFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: FrameFlags) {
        self.0 &= !other.0;
    }

    pub fn mode(self) -> FrameFlags {
        self & Self::MODE_MASK
    }

    pub fn state(self) -> FrameFlags {
        self & Self::STATE_MASK
    }

    /// Replace the mode bits, keeping the state bits
    pub fn with_mode(self, mode: FrameFlags) -> FrameFlags {
        self.state() | mode.mode()
    }
}

impl BitOr for FrameFlags {
    type Output = FrameFlags;

    fn bitor(self, rhs: FrameFlags) -> FrameFlags {
        FrameFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for FrameFlags {
    fn bitor_assign(&mut self, rhs: FrameFlags) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for FrameFlags {
    type Output = FrameFlags;

    fn bitand(self, rhs: FrameFlags) -> FrameFlags {
        FrameFlags(self.0 & rhs.0)
    }
}

impl Not for FrameFlags {
    type Output = FrameFlags;

    fn not(self) -> FrameFlags {
        FrameFlags(!self.0)
    }
}

/// What kind of unit the frame is in the middle of evaluating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum EvalType {
    #[default]
    Neutral,
    Word,
    SetWord,
    SetPath,
    GetWord,
    Group,
    Action,
    Inert,
}

/// The fetched-but-unconsumed unit of a frame
#[derive(Debug, Clone)]
pub enum Current {
    End,
    /// Copy of a series unit or a pulled value
    Cell(Cell),
    /// Still inside its instruction slot
    Instruction(Instruction),
    /// Persistent handle value, used in place
    Handle(ApiHandle),
}

/// Evaluation frame
#[derive(Debug)]
pub struct Frame {
    pub(crate) source: FrameSource,
    pub(crate) current: Current,
    /// Receives consumed instruction values
    pub(crate) scratch: Cell,
    /// Handle whose value is the most recent lookback
    pub(crate) lookback_handle: Option<ApiHandle>,
    /// Failure met while reifying, raised when the fetch position reaches it
    pub(crate) pending_failure: Option<Unwind>,
    pub(crate) out: Option<Cell>,
    pub(crate) flags: FrameFlags,
    pub(crate) varlist: Option<VarlistId>,
    pub(crate) original: Option<ActionRef>,
    /// Arguments of `original` are still being gathered
    pub(crate) fulfilling: bool,
    pub(crate) specifier: Specifier,
    pub(crate) eval_type: EvalType,
    pub(crate) dsp_orig: usize,
    pub(crate) label: Option<String>,
}

impl Frame {
    pub(crate) fn new(
        source: FrameSource,
        current: Current,
        specifier: Specifier,
        flags: FrameFlags,
    ) -> Self {
        Self {
            source,
            current,
            scratch: Cell::unreadable(),
            lookback_handle: None,
            pending_failure: None,
            out: None,
            flags: flags.mode(),
            varlist: None,
            original: None,
            fulfilling: false,
            specifier,
            eval_type: EvalType::Neutral,
            dsp_orig: 0,
            label: None,
        }
    }

    /// Current unit is the end-of-input sentinel
    pub fn at_end(&self) -> bool {
        matches!(self.current, Current::End)
    }

    /// Copy of the current unit, `None` at end
    pub fn current(&self) -> Option<Cell> {
        match &self.current {
            Current::End => None,
            Current::Cell(cell) => Some(cell.clone()),
            Current::Instruction(instruction) => Some(instruction.peek()),
            Current::Handle(handle) => Some(handle.cell().clone()),
        }
    }

    /// Index of the next unit for series-sourced frames
    pub fn pending_index(&self) -> Option<usize> {
        match &self.source {
            FrameSource::Array { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Series the frame is walking, including a variadic splice
    pub fn pending_series(&self) -> Option<SeriesId> {
        match &self.source {
            FrameSource::Array { series, .. } => Some(*series),
            FrameSource::Variadic(variadic) => variadic.splice.map(|(series, _)| series),
            FrameSource::Injected | FrameSource::Lent => None,
        }
    }

    pub fn source(&self) -> &FrameSource {
        &self.source
    }

    pub fn is_variadic(&self) -> bool {
        self.source.is_variadic()
    }

    pub fn flags(&self) -> FrameFlags {
        self.flags
    }

    pub fn eval_type(&self) -> EvalType {
        self.eval_type
    }

    pub fn set_eval_type(&mut self, eval_type: EvalType) {
        self.eval_type = eval_type;
    }

    pub fn specifier(&self) -> Specifier {
        self.specifier
    }

    pub fn out(&self) -> Option<&Cell> {
        self.out.as_ref()
    }

    pub fn set_out(&mut self, cell: Cell) {
        self.out = Some(cell);
    }

    pub fn take_out(&mut self) -> Option<Cell> {
        self.out.take()
    }

    /// Record that an expression barrier was reached
    pub fn mark_barrier_hit(&mut self) {
        self.flags.insert(FrameFlags::BARRIER_HIT);
    }

    pub fn dsp_orig(&self) -> usize {
        self.dsp_orig
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Action being called, if any
    pub fn original(&self) -> Option<&ActionRef> {
        self.original.as_ref()
    }

    pub fn varlist(&self) -> Option<VarlistId> {
        self.varlist
    }

    pub fn is_fulfilling(&self) -> bool {
        self.original.is_some() && self.fulfilling
    }

    /// A call has its arguments and is running
    pub fn is_running_action(&self) -> bool {
        self.original.is_some() && !self.fulfilling
    }

    pub fn took_hold(&self) -> bool {
        self.flags.contains(FrameFlags::TOOK_HOLD)
    }

    /// Series this frame is obliged to release a hold on
    pub(crate) fn held_series(&self) -> Option<SeriesId> {
        if self.took_hold() {
            self.pending_series()
        } else {
            None
        }
    }
}
