//! Helpers for unit tests inside the crate

use crate::engine::Engine;
use crate::error::{EvalResult, RuntimeError};
use crate::evaluator::Evaluator;
use crate::frame::FrameId;
use crate::series::SeriesId;
use crate::value::{Cell, Value};
use std::sync::Arc;

/// Adds every integer it steps over into the frame's output
pub struct Summing;

impl Evaluator for Summing {
    fn step(&self, engine: &mut Engine, frame: FrameId) -> EvalResult<()> {
        let cell = engine.fetch_next(frame)?;
        let n = match cell.value {
            Value::Integer(n) => n,
            other => {
                return Err(RuntimeError::evaluation(format!("cannot sum {}", other.kind())).into())
            }
        };
        let f = engine.frame_mut(frame);
        let acc = match f.out() {
            Some(Cell {
                value: Value::Integer(acc),
                ..
            }) => *acc,
            _ => 0,
        };
        f.set_out(Cell::new(Value::Integer(acc + n)));
        Ok(())
    }
}

pub fn summing() -> Arc<dyn Evaluator> {
    Arc::new(Summing)
}

pub fn engine() -> Engine {
    Engine::new(summing())
}

pub fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().map(|n| Value::Integer(*n)).collect()
}

pub fn int_series(engine: &mut Engine, values: &[i64]) -> SeriesId {
    engine.heap_mut().alloc_values(ints(values)).unwrap()
}
