//! Frame engine
//!
//! One [`Engine`] per thread of evaluation. It owns the frame stack, the
//! series heap, the data stack, the varlist pool and the injected step hook
//! and scanner. Everything that creates, advances or tears down a frame goes
//! through it.
//!
//! ## Frame Lifecycle
//!
//! ```text
//! construct (first unit fetched) -> push -> step* -> pop_normal | pop_abort
//! ```
//!
//! `push` holds the series an array frame walks. `pop_normal` requires the
//! input to be exhausted and pools call-local storage. `pop_abort` is legal
//! anywhere: it drains variadic input, releases holds and frees storage.

use crate::data_stack::DataStack;
use crate::error::{EvalResult, RuntimeError, Unwind};
use crate::evaluator::{Evaluator, TracingEvaluator};
use crate::fetch::{self, FetchContext};
use crate::frame::{Current, EvalType, Frame, FrameFlags, FrameId};
use crate::scanner::{Scanner, WordScanner};
use crate::series::{SeriesHeap, SeriesId};
use crate::source::{FrameSource, VariadicFeed, VariadicSource};
use crate::value::{ActionRef, Cell, CellFlags, Specifier};
use crate::varlist::VarlistPool;
use evalframe_config::EngineSettings;
use std::sync::Arc;
use tracing::{debug, trace};

/// Evaluation engine
pub struct Engine {
    pub(crate) frames: Vec<Frame>,
    pub(crate) heap: SeriesHeap,
    pub(crate) pool: VarlistPool,
    pub(crate) data_stack: DataStack,
    /// Series kept alive by native code
    pub(crate) guarded: Vec<SeriesId>,
    evaluator: Arc<dyn Evaluator>,
    scanner: Box<dyn Scanner>,
    pub(crate) settings: EngineSettings,
}

impl Engine {
    /// Create an engine with default settings
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        Self::with_config(evaluator, EngineSettings::default())
    }

    /// Create an engine from resolved configuration
    pub fn with_config(evaluator: Arc<dyn Evaluator>, settings: EngineSettings) -> Self {
        let evaluator: Arc<dyn Evaluator> = if settings.trace_steps {
            Arc::new(TracingEvaluator::new(evaluator))
        } else {
            evaluator
        };

        Self {
            frames: Vec::new(),
            heap: SeriesHeap::new(),
            pool: VarlistPool::new(settings.max_pooled),
            data_stack: DataStack::new(),
            guarded: Vec::new(),
            evaluator,
            scanner: Box::new(WordScanner),
            settings,
        }
    }

    /// Replace the scanner used for variadic text
    pub fn with_scanner(mut self, scanner: impl Scanner + 'static) -> Self {
        self.scanner = Box::new(scanner);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Number of frames on the stack
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn top(&self) -> Option<FrameId> {
        self.frames.len().checked_sub(1).map(FrameId)
    }

    /// # Panics
    ///
    /// Panics if `id` is not on the stack.
    pub fn frame(&self, id: FrameId) -> &Frame {
        &self.frames[id.0]
    }

    pub fn frame_mut(&mut self, id: FrameId) -> &mut Frame {
        &mut self.frames[id.0]
    }

    pub fn heap(&self) -> &SeriesHeap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut SeriesHeap {
        &mut self.heap
    }

    pub fn pool(&self) -> &VarlistPool {
        &self.pool
    }

    pub fn data_stack(&self) -> &DataStack {
        &self.data_stack
    }

    pub fn data_stack_mut(&mut self) -> &mut DataStack {
        &mut self.data_stack
    }

    /// Keep a series alive across collections
    pub fn guard_series(&mut self, series: SeriesId) {
        self.guarded.push(series);
    }

    pub fn unguard_series(&mut self, series: SeriesId) {
        if let Some(pos) = self.guarded.iter().rposition(|s| *s == series) {
            self.guarded.remove(pos);
        }
    }

    fn context(&mut self) -> FetchContext<'_> {
        FetchContext {
            heap: &mut self.heap,
            data_stack: &mut self.data_stack,
            scanner: self.scanner.as_ref(),
        }
    }

    pub(crate) fn split(&mut self, id: FrameId) -> (&mut Frame, FetchContext<'_>) {
        let frame = &mut self.frames[id.0];
        let ctx = FetchContext {
            heap: &mut self.heap,
            data_stack: &mut self.data_stack,
            scanner: self.scanner.as_ref(),
        };
        (frame, ctx)
    }

    // ========================================================================
    // Frame Construction
    // ========================================================================

    /// Frame over `series` starting at `index`, first unit fetched
    pub fn array_frame(
        &self,
        series: SeriesId,
        index: usize,
        specifier: Specifier,
        flags: FrameFlags,
    ) -> EvalResult<Frame> {
        if !self.heap.contains(series) {
            return Err(RuntimeError::StaleSeries.into());
        }
        let (current, pending) = match self.heap.cell(series, index) {
            Some(cell) => (Current::Cell(cell.clone()), index + 1),
            None => (Current::End, index),
        };
        Ok(Frame::new(
            FrameSource::Array {
                series,
                index: pending,
            },
            current,
            specifier,
            flags,
        ))
    }

    /// Frame that evaluates `first`, then continues with `series` at `index`
    pub fn array_frame_with_head(
        &self,
        first: Cell,
        series: SeriesId,
        index: usize,
        specifier: Specifier,
        flags: FrameFlags,
    ) -> EvalResult<Frame> {
        if !self.heap.contains(series) {
            return Err(RuntimeError::StaleSeries.into());
        }
        Ok(Frame::new(
            FrameSource::Array { series, index },
            Current::Cell(first),
            specifier,
            flags,
        ))
    }

    /// Frame over a single value
    pub fn value_frame(&self, value: Cell, specifier: Specifier, flags: FrameFlags) -> Frame {
        Frame::new(FrameSource::Injected, Current::Cell(value), specifier, flags)
    }

    /// Frame over a variadic feed, optionally preceded by `opt_first`
    ///
    /// Without a head value the first argument is pulled immediately. If that
    /// fails the rest of the feed is drained before the failure is returned.
    pub fn variadic_frame(
        &mut self,
        opt_first: Option<Cell>,
        feed: Box<dyn VariadicFeed>,
        flags: FrameFlags,
    ) -> EvalResult<Frame> {
        let mut frame = Frame::new(
            FrameSource::Variadic(VariadicSource::new(feed)),
            Current::End,
            Specifier::Specified,
            flags,
        );

        match opt_first {
            Some(first) => frame.current = Current::Cell(first),
            None => {
                let mut ctx = self.context();
                match fetch::advance(&mut frame, &mut ctx) {
                    Ok(current) => frame.current = current,
                    Err(unwind) => {
                        fetch::drain(&mut frame, &mut ctx);
                        return Err(unwind);
                    }
                }
            }
        }

        Ok(frame)
    }

    /// Frame with no input at all
    pub fn end_frame(flags: FrameFlags) -> Frame {
        Frame::new(
            FrameSource::Injected,
            Current::End,
            Specifier::Specified,
            flags,
        )
    }

    // ========================================================================
    // Push / Pop
    // ========================================================================

    /// Push a constructed frame onto the stack
    ///
    /// Fails with a stack overflow when the depth limit is reached, in which
    /// case the frame's input is settled before returning.
    pub fn push(&mut self, frame: Frame) -> EvalResult<FrameId> {
        match self.try_push(frame) {
            Ok(id) => Ok(id),
            Err((frame, unwind)) => {
                self.discard(frame);
                Err(unwind)
            }
        }
    }

    /// Push that hands the frame back on failure
    pub(crate) fn try_push(&mut self, mut frame: Frame) -> Result<FrameId, (Frame, Unwind)> {
        if self.frames.len() >= self.settings.max_depth {
            let limit = self.settings.max_depth;
            return Err((frame, RuntimeError::StackOverflow { limit }.into()));
        }

        frame.original = None;
        frame.fulfilling = false;

        if let FrameSource::Array { series, .. } = frame.source {
            if !frame.at_end() && !frame.took_hold() && !self.heap.is_held(series) {
                if let Err(err) = self.heap.hold(series) {
                    return Err((frame, err.into()));
                }
                frame.flags.insert(FrameFlags::TOOK_HOLD);
            }
        }

        frame.dsp_orig = self.data_stack.dsp();
        let id = FrameId(self.frames.len());
        trace!(
            depth = id.0,
            variadic = frame.is_variadic(),
            took_hold = frame.took_hold(),
            "push frame"
        );
        self.frames.push(frame);
        Ok(id)
    }

    /// Push a frame whose input is already exhausted
    pub fn push_at_end(&mut self, flags: FrameFlags) -> EvalResult<FrameId> {
        self.push(Self::end_frame(flags))
    }

    /// Pop a frame that consumed all of its input
    ///
    /// # Panics
    ///
    /// Panics if `id` is not the top frame, if its input is not exhausted or
    /// if its eval type is not neutral.
    pub fn pop_normal(&mut self, id: FrameId) -> Frame {
        let mut frame = self.unlink(id);
        assert!(frame.at_end(), "normal pop of a frame that is not at its end");
        assert_eq!(
            frame.eval_type,
            EvalType::Neutral,
            "normal pop of a frame in the middle of an evaluation"
        );
        self.settle(&mut frame, true);
        frame
    }

    /// Pop a frame at any point, honoring every obligation of its input
    ///
    /// # Panics
    ///
    /// Panics if `id` is not the top frame.
    pub fn pop_abort(&mut self, id: FrameId) -> Frame {
        let mut frame = self.unlink(id);
        debug!(
            depth = id.0,
            at_end = frame.at_end(),
            variadic = frame.is_variadic(),
            "abort frame"
        );
        self.settle(&mut frame, false);
        frame
    }

    /// Pop a frame that may have stopped before its end
    pub(crate) fn retire(&mut self, id: FrameId) -> Frame {
        let mut frame = self.unlink(id);
        self.settle(&mut frame, true);
        frame
    }

    /// Settle a frame that was constructed but never pushed
    pub(crate) fn discard(&mut self, mut frame: Frame) {
        self.settle(&mut frame, false);
    }

    pub(crate) fn unlink(&mut self, id: FrameId) -> Frame {
        assert_eq!(
            id.0 + 1,
            self.frames.len(),
            "only the top frame may be popped"
        );
        trace!(depth = id.0, "pop frame");
        self.frames.remove(id.0)
    }

    fn settle(&mut self, frame: &mut Frame, pool_varlist: bool) {
        fetch::drain(frame, &mut self.context());

        if let Some(varlist) = frame.varlist.take() {
            if pool_varlist {
                self.pool.pool(varlist);
            } else {
                self.pool.release(varlist);
            }
        }
        frame.original = None;
        frame.fulfilling = false;
    }

    // ========================================================================
    // Fetch
    // ========================================================================

    /// Advance the frame one unit, returning the unit that was current
    pub fn fetch_next(&mut self, id: FrameId) -> EvalResult<Cell> {
        let (frame, mut ctx) = self.split(id);
        fetch::fetch_next(frame, &mut ctx)
    }

    /// Fetch, marking the returned unit as unevaluated
    pub fn quote_next(&mut self, id: FrameId) -> EvalResult<Cell> {
        let mut cell = self.fetch_next(id)?;
        cell.flags.insert(CellFlags::UNEVALUATED);
        Ok(cell)
    }

    // ========================================================================
    // Stepping
    // ========================================================================

    /// Run the step hook on a frame
    ///
    /// Steps once, or until the input is exhausted when the frame has
    /// `TO_END`. Does nothing on a frame that is already at its end.
    pub fn step(&mut self, id: FrameId) -> EvalResult<()> {
        let evaluator = Arc::clone(&self.evaluator);
        loop {
            let frame = &mut self.frames[id.0];
            if frame.at_end() {
                return Ok(());
            }
            frame.dsp_orig = self.data_stack.dsp();

            evaluator.step(self, id)?;

            if !self.frames[id.0].flags.contains(FrameFlags::TO_END) {
                return Ok(());
            }
        }
    }

    // ========================================================================
    // Call State
    // ========================================================================

    /// Begin calling `action` on a frame and start gathering its arguments
    ///
    /// Call-local storage is claimed from the pool, or the frame's existing
    /// storage is reset, so every argument slot starts unreadable.
    pub fn begin_action(&mut self, id: FrameId, action: ActionRef) {
        let frame = &mut self.frames[id.0];
        let varlist = match frame.varlist {
            Some(varlist) => {
                self.pool.reinit(varlist, action.arity);
                varlist
            }
            None => self.pool.claim(action.arity),
        };
        frame.varlist = Some(varlist);
        frame.label = Some(action.name.clone());
        frame.original = Some(action);
        frame.fulfilling = true;
        frame.eval_type = EvalType::Action;
    }

    /// Store a gathered argument
    ///
    /// # Panics
    ///
    /// Panics unless the frame is fulfilling arguments, or if `index` is
    /// beyond the action's arity.
    pub fn set_arg(&mut self, id: FrameId, index: usize, cell: Cell) {
        let frame = &self.frames[id.0];
        assert!(
            frame.is_fulfilling(),
            "arguments can only be set while fulfilling"
        );
        let Some(varlist) = frame.varlist else {
            panic!("fulfilling frame without call-local storage");
        };
        let slots = self.pool.slots_mut(varlist);
        assert!(index < slots.len(), "argument {} beyond arity {}", index, slots.len());
        slots[index] = cell;
    }

    /// Arguments are complete; the call is now running
    pub fn finish_fulfillment(&mut self, id: FrameId) {
        let frame = &mut self.frames[id.0];
        assert!(frame.is_fulfilling(), "no argument fulfillment in progress");
        frame.fulfilling = false;
    }

    /// Arguments of the running call
    ///
    /// `None` while arguments are still being gathered or when no call is
    /// running.
    pub fn args(&self, id: FrameId) -> Option<&[Cell]> {
        let frame = &self.frames[id.0];
        if !frame.is_running_action() {
            return None;
        }
        frame.varlist.and_then(|varlist| self.pool.slots(varlist))
    }

    /// Leave the call state; storage stays with the frame until it is popped
    pub fn end_action(&mut self, id: FrameId) {
        let frame = &mut self.frames[id.0];
        frame.original = None;
        frame.fulfilling = false;
        frame.label = None;
        frame.eval_type = EvalType::Neutral;
    }
}
