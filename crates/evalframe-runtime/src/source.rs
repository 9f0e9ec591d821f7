//! Frame input sources
//!
//! A frame reads either from a series at an index, from a one-shot variadic
//! stream supplied by native code, or from a single injected value. Variadic
//! arguments are decoded into [`VariadicArg`] at the boundary so the fetch
//! engine only ever matches on a closed set of cases.

use crate::series::SeriesId;
use crate::value::{Cell, Value};
use std::cell::{Cell as Counter, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

/// One argument pulled from a variadic stream
#[derive(Debug, Clone)]
pub enum VariadicArg {
    /// End of the stream
    End,
    /// Source text to be scanned into units
    Text(String),
    /// Transient single-use value
    Instruction(Instruction),
    /// Persistent API value
    Handle(ApiHandle),
    /// Native null
    Null,
    /// Unrecognized pointer from the native side
    Malformed(usize),
}

/// A one-shot stream of native arguments
pub trait VariadicFeed {
    /// Pull the next argument
    fn pull(&mut self) -> VariadicArg;

    /// Terminal protocol, run exactly once when `End` has been pulled
    fn finish(&mut self);
}

/// Pull and finish counts observed on an [`ArgFeed`]
#[derive(Debug, Clone, Default)]
pub struct FeedCounters {
    pulls: Rc<Counter<usize>>,
    finishes: Rc<Counter<usize>>,
}

impl FeedCounters {
    pub fn pulls(&self) -> usize {
        self.pulls.get()
    }

    pub fn finishes(&self) -> usize {
        self.finishes.get()
    }
}

/// A variadic feed over a prepared list of arguments
///
/// Reports `End` once the list is exhausted, whether or not the list
/// itself ended with an explicit `End`.
#[derive(Debug)]
pub struct ArgFeed {
    args: VecDeque<VariadicArg>,
    counters: FeedCounters,
}

impl ArgFeed {
    pub fn new(args: Vec<VariadicArg>) -> Self {
        Self {
            args: args.into(),
            counters: FeedCounters::default(),
        }
    }

    /// Feed of persistent handles over plain values
    pub fn from_values(values: Vec<Value>) -> Self {
        Self::new(
            values
                .into_iter()
                .map(|value| match value {
                    Value::Nulled => VariadicArg::Null,
                    value => VariadicArg::Handle(ApiHandle::new(value)),
                })
                .collect(),
        )
    }

    /// Shared view of the pull and finish counts
    pub fn counters(&self) -> FeedCounters {
        self.counters.clone()
    }
}

impl VariadicFeed for ArgFeed {
    fn pull(&mut self) -> VariadicArg {
        self.counters.pulls.set(self.counters.pulls.get() + 1);
        self.args.pop_front().unwrap_or(VariadicArg::End)
    }

    fn finish(&mut self) {
        self.counters.finishes.set(self.counters.finishes.get() + 1);
    }
}

/// Transient instruction: a single slot consumed by the frame that fetches it
#[derive(Debug, Clone)]
pub struct Instruction(Rc<RefCell<Cell>>);

impl Instruction {
    pub fn new(value: Value) -> Self {
        Self(Rc::new(RefCell::new(Cell::new(value))))
    }

    /// Copy of the slot contents
    pub fn peek(&self) -> Cell {
        self.0.borrow().clone()
    }

    /// Take the value out, leaving an unreadable cell behind
    pub(crate) fn consume(&self) -> Cell {
        std::mem::replace(&mut *self.0.borrow_mut(), Cell::unreadable())
    }

    pub fn is_consumed(&self) -> bool {
        matches!(self.0.borrow().value, Value::Unreadable)
    }
}

#[derive(Debug)]
struct HandleInner {
    cell: Cell,
    auto_release: bool,
    releases: Counter<usize>,
}

/// Persistent API value
///
/// Auto-release handles are released by the frame that consumed them,
/// exactly once.
#[derive(Debug, Clone)]
pub struct ApiHandle(Rc<HandleInner>);

impl ApiHandle {
    pub fn new(value: Value) -> Self {
        Self::build(value, false)
    }

    /// Handle the evaluator releases once it is done with the value
    pub fn auto_release(value: Value) -> Self {
        Self::build(value, true)
    }

    fn build(value: Value, auto_release: bool) -> Self {
        Self(Rc::new(HandleInner {
            cell: Cell::new(value),
            auto_release,
            releases: Counter::new(0),
        }))
    }

    pub fn cell(&self) -> &Cell {
        &self.0.cell
    }

    pub fn is_auto_release(&self) -> bool {
        self.0.auto_release
    }

    pub fn release_count(&self) -> usize {
        self.0.releases.get()
    }

    pub(crate) fn release_if_auto(&self) {
        if self.0.auto_release && self.0.releases.get() == 0 {
            self.0.releases.set(1);
        }
    }
}

/// Variadic stream state of a frame
pub struct VariadicSource {
    pub(crate) feed: Box<dyn VariadicFeed>,
    /// Terminal protocol has run
    pub(crate) finished: bool,
    /// Series scanned from a text argument, walked before pulling again
    pub(crate) splice: Option<(SeriesId, usize)>,
}

impl VariadicSource {
    pub fn new(feed: Box<dyn VariadicFeed>) -> Self {
        Self {
            feed,
            finished: false,
            splice: None,
        }
    }

    /// No splice left to walk and nothing left to pull
    pub fn is_exhausted(&self) -> bool {
        self.finished && self.splice.is_none()
    }
}

impl fmt::Debug for VariadicSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariadicSource")
            .field("finished", &self.finished)
            .field("splice", &self.splice)
            .finish_non_exhaustive()
    }
}

/// Where a frame's units come from
#[derive(Debug)]
pub enum FrameSource {
    /// Series with the index of the next unit to fetch
    Array { series: SeriesId, index: usize },
    Variadic(VariadicSource),
    /// Only the value already in the current slot
    Injected,
    /// Position moved out to a subframe
    Lent,
}

impl FrameSource {
    pub fn is_variadic(&self) -> bool {
        matches!(self, FrameSource::Variadic(_))
    }
}
