//! Collection support
//!
//! The heap does the marking and sweeping. The engine's part is to report
//! what every frame keeps alive and to make variadic input visible first:
//! a stream that has not been fully pulled could still produce references,
//! so such frames are reified before any marking starts.

use crate::engine::Engine;
use crate::frame::{Current, FrameId};
use crate::series::SeriesId;
use crate::source::FrameSource;
use crate::value::{Cell, Value};
use tracing::{debug, warn};

/// Which part of a frame a root came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootKind {
    Output,
    Current,
    /// Current value still inside its instruction slot
    Instruction,
    Scratch,
    Pending,
    Varlist,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RootValue {
    Cell(Cell),
    Series(SeriesId),
}

impl RootValue {
    /// Series this root refers to, if any
    pub fn series(&self) -> Option<SeriesId> {
        match self {
            RootValue::Cell(cell) => cell.value.series(),
            RootValue::Series(series) => Some(*series),
        }
    }
}

/// A value a frame keeps alive
#[derive(Debug, Clone, PartialEq)]
pub struct GcRoot {
    pub frame: FrameId,
    pub kind: RootKind,
    pub value: RootValue,
}

/// Outcome of one collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GcStats {
    /// Variadic frames converted to series before marking
    pub reified: usize,
    pub roots: usize,
    pub instruction_roots: usize,
    pub marked: usize,
    pub swept: usize,
}

impl Engine {
    /// Every root held by the frames on the stack, bottom frame first
    pub fn frame_roots(&self) -> Vec<GcRoot> {
        let mut roots = Vec::new();

        for (depth, frame) in self.frames.iter().enumerate() {
            let id = FrameId(depth);
            let mut push = |kind, value| roots.push(GcRoot { frame: id, kind, value });

            if let Some(out) = &frame.out {
                push(RootKind::Output, RootValue::Cell(out.clone()));
            }

            match &frame.current {
                Current::End => {}
                Current::Cell(cell) => push(RootKind::Current, RootValue::Cell(cell.clone())),
                Current::Instruction(instruction) => {
                    push(RootKind::Instruction, RootValue::Cell(instruction.peek()))
                }
                Current::Handle(handle) => {
                    push(RootKind::Current, RootValue::Cell(handle.cell().clone()))
                }
            }

            if !matches!(frame.scratch.value, Value::Unreadable) {
                push(RootKind::Scratch, RootValue::Cell(frame.scratch.clone()));
            }

            if let Some(series) = frame.pending_series() {
                push(RootKind::Pending, RootValue::Series(series));
            }

            // Argument slots are only meaningful once a call owns them
            if frame.original.is_some() {
                if let Some(slots) = frame.varlist.and_then(|varlist| self.pool.slots(varlist)) {
                    for slot in slots {
                        push(RootKind::Varlist, RootValue::Cell(slot.clone()));
                    }
                }
            }
        }

        roots
    }

    /// Reify pending variadic input, then mark and sweep the heap
    pub fn collect_garbage(&mut self) -> GcStats {
        let truncated = self.settings.reify_truncated;
        let mut reified = 0;

        for depth in 0..self.frames.len() {
            let pending = matches!(
                &self.frames[depth].source,
                FrameSource::Variadic(variadic) if !variadic.is_exhausted()
            );
            if !pending {
                continue;
            }
            match self.reify_variadic(FrameId(depth), truncated) {
                Ok(_) => reified += 1,
                Err(err) => warn!(depth, %err, "could not reify variadic frame"),
            }
        }

        let roots = self.frame_roots();
        let instruction_roots = roots
            .iter()
            .filter(|root| root.kind == RootKind::Instruction)
            .count();

        let mut seeds: Vec<SeriesId> = roots.iter().filter_map(GcRoot::series).collect();
        seeds.extend(self.data_stack.iter().filter_map(|cell| cell.value.series()));
        seeds.extend(self.guarded.iter().copied());

        let (marked, swept) = self.heap.collect(seeds);
        let stats = GcStats {
            reified,
            roots: roots.len(),
            instruction_roots,
            marked,
            swept,
        };
        debug!(?stats, live = self.heap.live_count(), "collected garbage");
        stats
    }
}

impl GcRoot {
    pub fn series(&self) -> Option<SeriesId> {
        self.value.series()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameFlags;
    use crate::series::SeriesInfo;
    use crate::source::{ArgFeed, Instruction, VariadicArg};
    use crate::test_utils::{engine, int_series};
    use crate::value::Specifier;
    use pretty_assertions::assert_eq;

    fn managed_block(engine: &mut Engine, inner: &[i64]) -> SeriesId {
        let cells = inner.iter().map(|n| Cell::new(Value::Integer(*n))).collect();
        engine
            .heap_mut()
            .alloc(cells, SeriesInfo::MANAGED)
            .unwrap()
    }

    fn block(series: SeriesId) -> Value {
        Value::Block { series, index: 0 }
    }

    #[test]
    fn test_unreferenced_managed_series_is_swept() {
        let mut engine = engine();
        managed_block(&mut engine, &[1]);
        let kept = managed_block(&mut engine, &[2]);
        engine.guard_series(kept);

        let stats = engine.collect_garbage();

        assert_eq!(stats.swept, 1);
        assert!(engine.heap().contains(kept));

        engine.unguard_series(kept);
        let stats = engine.collect_garbage();
        assert_eq!(stats.swept, 1);
        assert!(!engine.heap().contains(kept));
    }

    #[test]
    fn test_nested_guards_unguard_one_at_a_time() {
        let mut engine = engine();
        let kept = managed_block(&mut engine, &[1]);
        engine.guard_series(kept);
        engine.guard_series(kept);

        engine.unguard_series(kept);
        assert_eq!(engine.collect_garbage().swept, 0);

        engine.unguard_series(kept);
        assert_eq!(engine.collect_garbage().swept, 1);
    }

    #[test]
    fn test_series_referenced_from_pending_input_survives() {
        let mut engine = engine();
        let inner = managed_block(&mut engine, &[7]);
        let outer = engine
            .heap_mut()
            .alloc(
                vec![Cell::new(Value::Integer(1)), Cell::new(block(inner))],
                SeriesInfo::MANAGED,
            )
            .unwrap();
        let frame = engine
            .array_frame(outer, 0, Specifier::Specified, FrameFlags::NONE)
            .unwrap();
        let id = engine.push(frame).unwrap();

        let stats = engine.collect_garbage();
        assert_eq!(stats.swept, 0);
        assert!(engine.heap().contains(inner));

        engine.pop_abort(id);
        engine.collect_garbage();
        assert!(!engine.heap().contains(inner));
        assert!(!engine.heap().contains(outer));
    }

    #[test]
    fn test_collection_reifies_unpulled_variadic_input() {
        let mut engine = engine();
        let inner = managed_block(&mut engine, &[3]);
        let feed = ArgFeed::from_values(vec![Value::Integer(1), block(inner)]);
        let counters = feed.counters();
        let frame = engine
            .variadic_frame(None, Box::new(feed), FrameFlags::NONE)
            .unwrap();
        let id = engine.push(frame).unwrap();

        let stats = engine.collect_garbage();

        assert_eq!(stats.reified, 1);
        assert_eq!(counters.finishes(), 1);
        assert!(!engine.frame(id).is_variadic());
        assert!(engine.heap().contains(inner));
        assert_eq!(engine.frame(id).current(), Some(Cell::new(Value::Integer(1))));

        engine.pop_abort(id);
    }

    #[test]
    fn test_instruction_in_current_is_reported() {
        let mut engine = engine();
        let inner = managed_block(&mut engine, &[4]);
        let instruction = Instruction::new(block(inner));
        let frame = engine
            .variadic_frame(
                None,
                Box::new(ArgFeed::new(vec![VariadicArg::Instruction(instruction)])),
                FrameFlags::NONE,
            )
            .unwrap();
        let id = engine.push(frame).unwrap();

        let roots = engine.frame_roots();
        assert!(roots
            .iter()
            .any(|root| root.kind == RootKind::Instruction && root.series() == Some(inner)));

        engine.pop_abort(id);
    }

    #[test]
    fn test_varlist_roots_only_while_calling() {
        let mut engine = engine();
        let held = int_series(&mut engine, &[1]);
        let id = engine.push_at_end(FrameFlags::NONE).unwrap();
        engine.begin_action(
            id,
            crate::value::ActionRef::new("keep", 1, |_| Ok(Value::Blank)),
        );
        engine.set_arg(id, 0, Cell::new(block(held)));
        engine.finish_fulfillment(id);

        let varlist_roots = |engine: &Engine| {
            engine
                .frame_roots()
                .into_iter()
                .filter(|root| root.kind == RootKind::Varlist)
                .count()
        };
        assert_eq!(varlist_roots(&engine), 1);

        engine.end_action(id);
        assert_eq!(varlist_roots(&engine), 0);
        engine.pop_normal(id);
    }
}
