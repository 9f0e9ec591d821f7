//! Step hook
//!
//! The engine does not know what evaluating a unit means. It drives an
//! [`Evaluator`] injected at construction, one expression per call.

use crate::engine::Engine;
use crate::error::EvalResult;
use crate::frame::FrameId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Per-expression evaluation strategy
///
/// `step` is only called when the frame has a current unit. It evaluates
/// one expression starting at that unit, consuming what it uses through
/// [`Engine::fetch_next`], writes the result with [`Frame::set_out`] and
/// leaves the frame's eval type neutral once the expression is complete.
///
/// [`Frame::set_out`]: crate::frame::Frame::set_out
pub trait Evaluator {
    fn step(&self, engine: &mut Engine, frame: FrameId) -> EvalResult<()>;
}

/// Evaluator wrapper that logs and counts every step
pub struct TracingEvaluator {
    inner: Arc<dyn Evaluator>,
    steps: AtomicUsize,
}

impl TracingEvaluator {
    pub fn new(inner: Arc<dyn Evaluator>) -> Self {
        Self {
            inner,
            steps: AtomicUsize::new(0),
        }
    }

    /// Steps taken so far
    pub fn steps(&self) -> usize {
        self.steps.load(Ordering::Relaxed)
    }
}

impl Evaluator for TracingEvaluator {
    fn step(&self, engine: &mut Engine, frame: FrameId) -> EvalResult<()> {
        let step = self.steps.fetch_add(1, Ordering::Relaxed) + 1;
        {
            let f = engine.frame(frame);
            debug!(
                step,
                depth = frame.depth(),
                eval_type = ?f.eval_type(),
                label = f.label().unwrap_or("-"),
                variadic = f.is_variadic(),
                "evaluator step"
            );
        }

        let result = self.inner.step(engine, frame);
        if let Err(unwind) = &result {
            debug!(step, depth = frame.depth(), %unwind, "step unwound");
        }
        result
    }
}
