//! Variadic reification
//!
//! A variadic stream can only be walked once, so anything that needs to see
//! a variadic frame's input as data (the collector, a debugger) first
//! converts the rest of the stream into a series. The frame is re-pointed at
//! that series and continues exactly where it was.
//!
//! ```text
//! before:  current = b   stream: c d <end>
//! after:   series [--optimized-out-- b c d]
//!                                    ^ current, pending index 2
//! ```
//!
//! The marker word is only present for truncated reification; it tells a
//! reader that units before `b` were already consumed.
//!
//! A unit that fails to fetch (text that does not scan, a nulled handle)
//! ends the series. The rest of the stream is settled and the failure is
//! kept on the frame until its fetch position reaches the end of the series.

use crate::engine::Engine;
use crate::error::RuntimeError;
use crate::fetch::{self, FetchContext};
use crate::frame::{Current, Frame, FrameFlags, FrameId};
use crate::series::{SeriesId, SeriesInfo};
use crate::source::FrameSource;
use crate::value::{Cell, CellFlags, Value};
use std::mem;
use tracing::debug;

/// Word placed at the head of a truncated reification
pub const TRUNCATION_MARKER: &str = "--optimized-out--";

impl Engine {
    /// Drain a variadic frame's input into a fresh managed series
    ///
    /// The series is held by the frame. Returns the series id.
    ///
    /// # Panics
    ///
    /// Panics if the frame is not variadic.
    pub fn reify_variadic(
        &mut self,
        id: FrameId,
        truncated: bool,
    ) -> Result<SeriesId, RuntimeError> {
        let (frame, mut ctx) = self.split(id);
        reify(frame, &mut ctx, truncated)
    }
}

pub(crate) fn reify(
    frame: &mut Frame,
    ctx: &mut FetchContext<'_>,
    truncated: bool,
) -> Result<SeriesId, RuntimeError> {
    assert!(frame.is_variadic(), "only variadic frames can be reified");

    let dsp = ctx.data_stack.dsp();
    if truncated {
        ctx.data_stack
            .push(Cell::new(Value::Word(TRUNCATION_MARKER.to_string())));
    }

    let had_current = !frame.at_end();
    let current = mem::replace(&mut frame.current, Current::End);
    push_unit(frame, ctx, current);

    loop {
        match fetch::advance(frame, ctx) {
            Ok(Current::End) => break,
            Ok(unit) => push_unit(frame, ctx, unit),
            Err(unwind) => {
                debug!(%unwind, "variadic feed failed while reifying");
                fetch::drain_feed(frame, ctx);
                frame.pending_failure = Some(unwind);
                break;
            }
        }
    }

    let cells = ctx.data_stack.pop_to_vec(dsp);
    let len = cells.len();
    let first = usize::from(truncated);
    let current = if had_current {
        cells.get(first).cloned()
    } else {
        None
    };

    let series = ctx
        .heap
        .alloc(cells, SeriesInfo::MANAGED | SeriesInfo::NULLEDS_LEGAL)?;
    ctx.heap.hold(series)?;
    frame.flags.insert(FrameFlags::TOOK_HOLD);

    let (current, index) = match current {
        Some(cell) => (Current::Cell(cell), first + 1),
        None => (Current::End, len),
    };
    frame.current = current;
    frame.source = FrameSource::Array { series, index };

    debug!(%series, len, truncated, "reified variadic frame");
    Ok(series)
}

fn push_unit(frame: &mut Frame, ctx: &mut FetchContext<'_>, unit: Current) {
    match unit {
        Current::End => {}
        Current::Cell(cell) => ctx.data_stack.push(cell),
        Current::Instruction(instruction) => {
            let mut cell = instruction.consume();
            cell.flags.insert(CellFlags::EVAL_FLIP);
            frame.flags.remove(FrameFlags::VALUE_IS_INSTRUCTION);
            ctx.data_stack.push(cell);
        }
        Current::Handle(handle) => {
            ctx.data_stack.push(handle.cell().clone());
            handle.release_if_auto();
        }
    }
}
