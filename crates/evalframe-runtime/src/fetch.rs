//! Fetch engine
//!
//! Advances a frame's source by exactly one unit and hands back the unit
//! that was current before. All sources go through the same two steps:
//!
//! 1. The current unit becomes the lookback. A transient instruction is
//!    copied out of its slot into the frame's scratch cell first, and an
//!    auto-release handle sitting in the previous lookback is released.
//! 2. The next unit is read from the source into the current slot.

use crate::data_stack::DataStack;
use crate::error::{EvalResult, RuntimeError};
use crate::frame::{Current, Frame, FrameFlags};
use crate::scanner::Scanner;
use crate::series::{SeriesHeap, SeriesInfo};
use crate::source::{FrameSource, VariadicArg};
use crate::value::{Cell, CellFlags};
use tracing::{trace, warn};

/// Engine state a fetch may touch besides the frame itself
pub(crate) struct FetchContext<'a> {
    pub heap: &'a mut SeriesHeap,
    pub data_stack: &'a mut DataStack,
    pub scanner: &'a dyn Scanner,
}

/// Fetch the next unit, returning the previous current unit
///
/// # Panics
///
/// Panics when the frame is already at its end.
pub(crate) fn fetch_next(frame: &mut Frame, ctx: &mut FetchContext<'_>) -> EvalResult<Cell> {
    // The old lookback slot is about to be overwritten
    if let Some(handle) = frame.lookback_handle.take() {
        handle.release_if_auto();
    }

    let lookback = match std::mem::replace(&mut frame.current, Current::End) {
        Current::End => panic!("fetch past the end of a frame's input"),
        Current::Cell(cell) => cell,
        Current::Instruction(instruction) => {
            let mut cell = instruction.consume();
            cell.flags.insert(CellFlags::EVAL_FLIP);
            frame.flags.remove(FrameFlags::VALUE_IS_INSTRUCTION);
            frame.scratch = cell.clone();
            cell
        }
        Current::Handle(handle) => {
            let cell = handle.cell().clone();
            frame.lookback_handle = Some(handle);
            cell
        }
    };

    frame.current = advance(frame, ctx)?;
    Ok(lookback)
}

/// Read the unit after the current one from the frame's source
///
/// Reaching the end of a held series releases the hold if this frame took
/// it. A failure left behind by reification is raised there too.
pub(crate) fn advance(frame: &mut Frame, ctx: &mut FetchContext<'_>) -> EvalResult<Current> {
    match &mut frame.source {
        FrameSource::Array { series, index } => {
            if let Some(cell) = ctx.heap.cell(*series, *index) {
                *index += 1;
                return Ok(Current::Cell(cell.clone()));
            }
            if frame.flags.contains(FrameFlags::TOOK_HOLD) {
                ctx.heap.release_hold(*series)?;
                frame.flags.remove(FrameFlags::TOOK_HOLD);
            }
            match frame.pending_failure.take() {
                Some(unwind) => Err(unwind),
                None => Ok(Current::End),
            }
        }

        FrameSource::Variadic(variadic) => loop {
            if let Some((series, index)) = variadic.splice {
                if let Some(cell) = ctx.heap.cell(series, index) {
                    variadic.splice = Some((series, index + 1));
                    return Ok(Current::Cell(cell.clone()));
                }
                ctx.heap.release_hold(series)?;
                frame.flags.remove(FrameFlags::TOOK_HOLD);
                variadic.splice = None;
            }

            if variadic.finished {
                return Ok(Current::End);
            }

            match variadic.feed.pull() {
                VariadicArg::End => {
                    trace!("variadic feed ended");
                    variadic.feed.finish();
                    variadic.finished = true;
                    return Ok(Current::End);
                }
                VariadicArg::Text(text) => {
                    trace!(len = text.len(), "scanning variadic text");
                    let dsp = ctx.data_stack.dsp();
                    if let Err(err) = ctx.scanner.scan(&text, &frame.specifier, ctx.data_stack) {
                        ctx.data_stack.drop_to(dsp);
                        return Err(RuntimeError::Scan(err).into());
                    }
                    let cells = ctx.data_stack.pop_to_vec(dsp);
                    if cells.is_empty() {
                        continue;
                    }
                    let series = ctx
                        .heap
                        .alloc(cells, SeriesInfo::MANAGED | SeriesInfo::NULLEDS_LEGAL)?;
                    ctx.heap.hold(series)?;
                    frame.flags.insert(FrameFlags::TOOK_HOLD);
                    variadic.splice = Some((series, 0));
                }
                VariadicArg::Instruction(instruction) => {
                    trace!("variadic instruction");
                    frame.flags.insert(FrameFlags::VALUE_IS_INSTRUCTION);
                    return Ok(Current::Instruction(instruction));
                }
                VariadicArg::Handle(handle) => {
                    if handle.cell().is_nulled() {
                        handle.release_if_auto();
                        return Err(RuntimeError::NulledApiHandle.into());
                    }
                    trace!(auto_release = handle.is_auto_release(), "variadic handle");
                    return Ok(Current::Handle(handle));
                }
                VariadicArg::Null => return Ok(Current::Cell(Cell::nulled())),
                VariadicArg::Malformed(addr) => {
                    panic!("malformed pointer {:#x} in variadic stream", addr)
                }
            }
        },

        FrameSource::Injected => Ok(Current::End),

        FrameSource::Lent => panic!("fetch from a frame whose position is lent to a subframe"),
    }
}

/// Settle every outstanding obligation of a frame's input
///
/// Consumes a pending instruction, pulls every remaining variadic argument
/// (running the terminal protocol once), releases auto-release handles and
/// drops any hold the frame took. Failures while draining are logged and
/// swallowed so that draining always completes.
pub(crate) fn drain(frame: &mut Frame, ctx: &mut FetchContext<'_>) {
    match std::mem::replace(&mut frame.current, Current::End) {
        Current::Instruction(instruction) => {
            instruction.consume();
        }
        Current::Handle(handle) => handle.release_if_auto(),
        Current::End | Current::Cell(_) => {}
    }
    frame.flags.remove(FrameFlags::VALUE_IS_INSTRUCTION);

    if let Some(handle) = frame.lookback_handle.take() {
        handle.release_if_auto();
    }
    if let Some(unwind) = frame.pending_failure.take() {
        warn!(%unwind, "pending failure dropped with its frame");
    }

    if frame.is_variadic() {
        drain_feed(frame, ctx);
    }

    if let Some(series) = frame.held_series() {
        if let Err(err) = ctx.heap.release_hold(series) {
            warn!(%err, "hold release on a dead series");
        }
        frame.flags.remove(FrameFlags::TOOK_HOLD);
    }
}

/// Pull and settle every remaining unit of a variadic source
pub(crate) fn drain_feed(frame: &mut Frame, ctx: &mut FetchContext<'_>) {
    loop {
        match advance(frame, ctx) {
            Ok(Current::End) => break,
            Ok(Current::Instruction(instruction)) => {
                instruction.consume();
                frame.flags.remove(FrameFlags::VALUE_IS_INSTRUCTION);
            }
            Ok(Current::Handle(handle)) => handle.release_if_auto(),
            Ok(Current::Cell(_)) => {}
            Err(unwind) => warn!(%unwind, "failure swallowed while draining variadic feed"),
        }
    }
}
