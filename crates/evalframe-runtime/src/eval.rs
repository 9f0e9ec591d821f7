//! Step invocation wrappers
//!
//! Every way of driving the step hook over a frame: run a frame to its end,
//! advance it one expression at a time, evaluate in the middle of a set-word,
//! or lend a running call's position to a subframe. The remaining wrappers
//! build the frame themselves from a series, a single value or a variadic
//! feed.
//!
//! Whatever unwind a step produces is handed back unchanged, after the frames
//! the wrapper owns have been aborted.

use crate::engine::Engine;
use crate::error::{EvalResult, RuntimeError};
use crate::frame::{Current, EvalType, Frame, FrameFlags, FrameId};
use crate::series::SeriesId;
use crate::source::{ApiHandle, ArgFeed, FrameSource, VariadicArg, VariadicFeed};
use crate::value::{Cell, CellFlags, Specifier, Value};
use std::mem;

/// Result of running a frame to its end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// At least one step ran
    Completed,
    /// The source was empty; nothing was evaluated
    NoInput,
}

/// Where a series evaluation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indexor {
    End,
    /// Index of the next unit to evaluate
    At(usize),
}

/// Whether a variadic evaluation consumed all of its input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    End,
    /// Input was left over; it has been drained and released
    Remaining,
}

impl Engine {
    /// Push `frame`, step it to the end of its input and pop it
    pub fn run_to_end(&mut self, out: &mut Cell, mut frame: Frame) -> EvalResult<Completion> {
        if frame.at_end() {
            *out = Cell::nulled();
            self.discard(frame);
            return Ok(Completion::NoInput);
        }

        frame.flags.insert(FrameFlags::TO_END);
        let id = self.push(frame)?;
        if let Err(unwind) = self.step(id) {
            self.pop_abort(id);
            return Err(unwind);
        }

        let mut frame = self.pop_normal(id);
        *out = frame.take_out().unwrap_or_else(Cell::nulled);
        Ok(Completion::Completed)
    }

    /// Evaluate one expression of a pushed frame
    ///
    /// On unwind the frame is aborted before the unwind is returned, so the
    /// caller must not pop it again.
    ///
    /// # Panics
    ///
    /// Panics if the frame is mid-evaluation or runs with `TO_END` or
    /// `NO_LOOKAHEAD`.
    pub fn advance_one(&mut self, id: FrameId, out: &mut Cell) -> EvalResult<()> {
        let frame = &self.frames[id.0];
        assert_eq!(
            frame.eval_type,
            EvalType::Neutral,
            "advance_one on a frame in the middle of an evaluation"
        );
        assert!(
            !frame
                .flags
                .intersects(FrameFlags::TO_END | FrameFlags::NO_LOOKAHEAD),
            "advance_one on a frame running to end or without lookahead"
        );
        let prior_mode = frame.flags.mode();

        if let Err(unwind) = self.step(id) {
            self.pop_abort(id);
            return Err(unwind);
        }

        let frame = &mut self.frames[id.0];
        frame.eval_type = EvalType::Neutral;
        let barrier = frame.flags & FrameFlags::BARRIER_HIT;
        frame.flags = frame.flags.with_mode(prior_mode | barrier);
        *out = frame.take_out().unwrap_or_else(Cell::nulled);
        Ok(())
    }

    /// Evaluate on the same frame from inside a set-word or set-path
    ///
    /// The given mode flags apply for this step only; the prior mode flags
    /// and `dsp_orig` are restored afterwards, whether or not it unwound.
    ///
    /// # Panics
    ///
    /// Panics unless the frame's eval type is `SetWord` or `SetPath`.
    pub fn advance_mid(&mut self, id: FrameId, flags: FrameFlags) -> EvalResult<()> {
        let frame = &mut self.frames[id.0];
        assert!(
            matches!(frame.eval_type, EvalType::SetWord | EvalType::SetPath),
            "mid-frame evaluation is only legal from a set-word or set-path"
        );
        let prior_mode = frame.flags.mode();
        let prior_dsp = frame.dsp_orig;
        frame.flags = frame.flags.with_mode(flags);

        let result = self.step(id);

        let frame = &mut self.frames[id.0];
        frame.flags = frame.flags.with_mode(prior_mode);
        frame.dsp_orig = prior_dsp;
        result
    }

    /// Evaluate one expression for a running call in a child frame
    ///
    /// The parent's position moves into the child for the duration of the
    /// step and comes back advanced. A barrier hit by the child is reported
    /// on the parent.
    ///
    /// # Panics
    ///
    /// Panics unless the parent's eval type is `Action`.
    pub fn advance_subframe(
        &mut self,
        out: &mut Cell,
        parent: FrameId,
        flags: FrameFlags,
    ) -> EvalResult<()> {
        let p = &mut self.frames[parent.0];
        assert_eq!(
            p.eval_type,
            EvalType::Action,
            "subframe evaluation requires the parent to be running an action"
        );

        let carried = p.flags.state();
        p.flags = p.flags.mode();
        let mut child = Frame::new(
            mem::replace(&mut p.source, FrameSource::Lent),
            mem::replace(&mut p.current, Current::End),
            p.specifier,
            flags,
        );
        child.flags.insert(carried);
        child.scratch = mem::replace(&mut p.scratch, Cell::unreadable());
        child.lookback_handle = p.lookback_handle.take();
        child.pending_failure = p.pending_failure.take();

        let child_id = match self.try_push(child) {
            Ok(id) => id,
            Err((child, unwind)) => {
                self.restore_position(parent, child);
                return Err(unwind);
            }
        };

        let result = self.step(child_id);
        let mut child = match &result {
            Ok(()) => {
                let mut child = self.unlink(child_id);
                if let Some(varlist) = child.varlist.take() {
                    self.pool.pool(varlist);
                }
                child
            }
            Err(_) => self.pop_abort(child_id),
        };

        *out = child.take_out().unwrap_or_else(Cell::nulled);
        self.restore_position(parent, child);
        result
    }

    fn restore_position(&mut self, parent: FrameId, mut child: Frame) {
        let p = &mut self.frames[parent.0];
        p.source = mem::replace(&mut child.source, FrameSource::Lent);
        p.current = mem::replace(&mut child.current, Current::End);
        p.scratch = mem::replace(&mut child.scratch, Cell::unreadable());
        p.lookback_handle = child.lookback_handle.take();
        p.pending_failure = child.pending_failure.take();
        p.flags.insert(child.flags.state());
        if child.flags.contains(FrameFlags::BARRIER_HIT) {
            p.flags.insert(FrameFlags::BARRIER_HIT);
        }
    }

    // ========================================================================
    // Series
    // ========================================================================

    /// Evaluate a series from `index`, optionally preceded by `opt_first`
    ///
    /// Without `TO_END` this evaluates a single expression and reports where
    /// the next one starts.
    pub fn eval_array_at(
        &mut self,
        out: &mut Cell,
        opt_first: Option<Cell>,
        series: SeriesId,
        index: usize,
        specifier: Specifier,
        flags: FrameFlags,
    ) -> EvalResult<Indexor> {
        let frame = match opt_first {
            Some(first) => self.array_frame_with_head(first, series, index, specifier, flags)?,
            None => self.array_frame(series, index, specifier, flags)?,
        };
        if frame.at_end() {
            *out = Cell::nulled();
            self.discard(frame);
            return Ok(Indexor::End);
        }

        let id = self.push(frame)?;
        if let Err(unwind) = self.step(id) {
            self.pop_abort(id);
            return Err(unwind);
        }

        let at_end = self.frames[id.0].at_end();
        let mut frame = self.retire(id);
        *out = frame.take_out().unwrap_or_else(Cell::nulled);

        match frame.pending_index() {
            Some(pending) if !at_end => Ok(Indexor::At(pending - 1)),
            _ => Ok(Indexor::End),
        }
    }

    /// Evaluate a whole series
    pub fn do_array_at(
        &mut self,
        out: &mut Cell,
        series: SeriesId,
        index: usize,
        specifier: Specifier,
    ) -> EvalResult<()> {
        self.eval_array_at(out, None, series, index, specifier, FrameFlags::TO_END)?;
        Ok(())
    }

    /// Evaluate the next expression of a series
    pub fn eval_next_at(
        &mut self,
        out: &mut Cell,
        series: SeriesId,
        index: usize,
        specifier: Specifier,
    ) -> EvalResult<Indexor> {
        self.eval_array_at(out, None, series, index, specifier, FrameFlags::NONE)
    }

    /// Evaluate a single value
    pub fn eval_value(
        &mut self,
        out: &mut Cell,
        value: Cell,
        specifier: Specifier,
    ) -> EvalResult<()> {
        let frame = self.value_frame(value, specifier, FrameFlags::NONE);
        self.run_to_end(out, frame)?;
        Ok(())
    }

    // ========================================================================
    // Variadic
    // ========================================================================

    /// Evaluate from a variadic feed, optionally preceded by `opt_first`
    pub fn eval_variadic(
        &mut self,
        out: &mut Cell,
        opt_first: Option<Cell>,
        feed: Box<dyn VariadicFeed>,
        flags: FrameFlags,
    ) -> EvalResult<Progress> {
        let frame = self.variadic_frame(opt_first, feed, flags)?;
        if frame.at_end() {
            *out = Cell::nulled();
            self.discard(frame);
            return Ok(Progress::End);
        }

        let id = self.push(frame)?;
        if let Err(unwind) = self.step(id) {
            self.pop_abort(id);
            return Err(unwind);
        }

        let at_end = self.frames[id.0].at_end();
        let mut frame = self.retire(id);
        *out = frame.take_out().unwrap_or_else(Cell::nulled);
        Ok(if at_end {
            Progress::End
        } else {
            Progress::Remaining
        })
    }

    /// Evaluate a whole variadic feed; only `EVAL_FLIP` cells evaluate
    pub fn do_variadic(
        &mut self,
        out: &mut Cell,
        opt_first: Option<Cell>,
        feed: Box<dyn VariadicFeed>,
    ) -> EvalResult<()> {
        self.eval_variadic(
            out,
            opt_first,
            feed,
            FrameFlags::TO_END | FrameFlags::EXPLICIT_EVALUATE,
        )?;
        Ok(())
    }

    /// Apply `applicand` to the arguments in `feed` without evaluating them
    ///
    /// With `fully`, leftover arguments are a failure.
    pub fn apply_only(
        &mut self,
        out: &mut Cell,
        fully: bool,
        applicand: &Cell,
        feed: Box<dyn VariadicFeed>,
    ) -> EvalResult<()> {
        let mut head = applicand.clone();
        head.flags.insert(CellFlags::EVAL_FLIP);

        let progress = self.eval_variadic(
            out,
            Some(head),
            feed,
            FrameFlags::EXPLICIT_EVALUATE | FrameFlags::NO_LOOKAHEAD,
        )?;

        if fully && progress == Progress::Remaining {
            let name = match &applicand.value {
                Value::Action(action) => action.name.clone(),
                other => other.to_string(),
            };
            return Err(RuntimeError::TooManyArguments { name }.into());
        }
        Ok(())
    }

    /// Run a conditional branch
    ///
    /// Blocks are evaluated to their end. Actions are applied, receiving the
    /// condition as their argument when there is one.
    pub fn run_branch(
        &mut self,
        out: &mut Cell,
        branch: &Cell,
        condition: Option<&Cell>,
    ) -> EvalResult<()> {
        match &branch.value {
            Value::Block { series, index } => {
                self.do_array_at(out, *series, *index, Specifier::Specified)
            }
            Value::Action(_) => {
                let args = condition
                    .map(|cell| VariadicArg::Handle(ApiHandle::new(cell.value.clone())))
                    .into_iter()
                    .collect();
                self.apply_only(out, false, branch, Box::new(ArgFeed::new(args)))
            }
            other => Err(RuntimeError::InvalidBranch {
                kind: other.kind().to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{engine, int_series};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_run_to_end_sums() {
        let mut engine = engine();
        let series = int_series(&mut engine, &[10, 20, 30]);
        let frame = engine
            .array_frame(series, 0, Specifier::Specified, FrameFlags::NONE)
            .unwrap();

        let mut out = Cell::nulled();
        assert_eq!(engine.run_to_end(&mut out, frame), Ok(Completion::Completed));
        assert_eq!(out.value, Value::Integer(60));
        assert!(!engine.heap().is_held(series));
    }

    #[test]
    fn test_run_to_end_without_input() {
        let mut engine = engine();
        let series = int_series(&mut engine, &[]);
        let frame = engine
            .array_frame(series, 0, Specifier::Specified, FrameFlags::NONE)
            .unwrap();

        let mut out = Cell::new(Value::Integer(99));
        assert_eq!(engine.run_to_end(&mut out, frame), Ok(Completion::NoInput));
        assert_eq!(out, Cell::nulled());
    }

    #[test]
    fn test_eval_next_at_walks_indexes() {
        let mut engine = engine();
        let series = int_series(&mut engine, &[1, 2]);
        let mut out = Cell::nulled();

        let next = engine
            .eval_next_at(&mut out, series, 0, Specifier::Specified)
            .unwrap();
        assert_eq!(next, Indexor::At(1));
        assert_eq!(out.value, Value::Integer(1));
        assert!(!engine.heap().is_held(series));

        let next = engine
            .eval_next_at(&mut out, series, 1, Specifier::Specified)
            .unwrap();
        assert_eq!(next, Indexor::End);
        assert_eq!(out.value, Value::Integer(2));

        assert_eq!(
            engine.eval_next_at(&mut out, series, 2, Specifier::Specified),
            Ok(Indexor::End)
        );
        assert_eq!(out, Cell::nulled());
    }

    #[test]
    fn test_eval_array_at_with_head() {
        let mut engine = engine();
        let series = int_series(&mut engine, &[2, 3]);
        let mut out = Cell::nulled();

        let result = engine.eval_array_at(
            &mut out,
            Some(Cell::new(Value::Integer(1))),
            series,
            0,
            Specifier::Specified,
            FrameFlags::TO_END,
        );
        assert_eq!(result, Ok(Indexor::End));
        assert_eq!(out.value, Value::Integer(6));
    }

    #[test]
    fn test_eval_variadic_reports_remaining() {
        let mut engine = engine();
        let feed =
            ArgFeed::from_values(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
        let counters = feed.counters();
        let mut out = Cell::nulled();

        let progress = engine
            .eval_variadic(&mut out, None, Box::new(feed), FrameFlags::NONE)
            .unwrap();

        assert_eq!(progress, Progress::Remaining);
        assert_eq!(out.value, Value::Integer(1));
        assert_eq!(counters.pulls(), 4);
        assert_eq!(counters.finishes(), 1);
    }

    #[test]
    fn test_eval_value() {
        let mut engine = engine();
        let mut out = Cell::nulled();
        engine
            .eval_value(&mut out, Cell::new(Value::Integer(4)), Specifier::Specified)
            .unwrap();
        assert_eq!(out.value, Value::Integer(4));
    }

    #[test]
    fn test_invalid_branch() {
        let mut engine = engine();
        let mut out = Cell::nulled();
        assert_eq!(
            engine.run_branch(&mut out, &Cell::new(Value::Integer(1)), None),
            Err(RuntimeError::InvalidBranch {
                kind: "integer".to_string()
            }
            .into())
        );
    }

    #[test]
    fn test_failure_aborts_and_releases_hold() {
        let mut engine = engine();
        let series = engine
            .heap_mut()
            .alloc_values(vec![Value::Integer(1), Value::Blank, Value::Integer(3)])
            .unwrap();
        let mut out = Cell::nulled();

        let result = engine.do_array_at(&mut out, series, 0, Specifier::Specified);

        assert!(matches!(
            result,
            Err(crate::error::Unwind::Failed(RuntimeError::Evaluation { .. }))
        ));
        assert!(!engine.heap().is_held(series));
        assert_eq!(engine.depth(), 0);
    }

    #[test]
    fn test_subframe_hands_instruction_copy_back_to_parent() {
        use crate::gc::{RootKind, RootValue};
        use crate::source::Instruction;

        let mut engine = engine();
        let feed = ArgFeed::new(vec![
            VariadicArg::Instruction(Instruction::new(Value::Integer(5))),
            VariadicArg::Handle(ApiHandle::new(Value::Integer(1))),
        ]);
        let frame = engine
            .variadic_frame(None, Box::new(feed), FrameFlags::NONE)
            .unwrap();
        let id = engine.push(frame).unwrap();
        engine.frame_mut(id).set_eval_type(EvalType::Action);

        let mut arg = Cell::nulled();
        engine
            .advance_subframe(&mut arg, id, FrameFlags::FULFILLING_ARG)
            .unwrap();
        assert_eq!(arg.value, Value::Integer(5));

        let scratch: Vec<_> = engine
            .frame_roots()
            .into_iter()
            .filter(|root| root.kind == RootKind::Scratch)
            .collect();
        assert_eq!(scratch.len(), 1);
        assert_eq!(scratch[0].frame, id);
        assert!(matches!(
            &scratch[0].value,
            RootValue::Cell(cell) if cell.value == Value::Integer(5) && cell.is_eval_flipped()
        ));

        engine.pop_abort(id);
    }
}
