//! Shared test utilities for evalframe integration tests
//!
//! Provides a small evaluator that exercises every wrapper the engine
//! offers, plus helpers for building series and feeds.

#![allow(dead_code)]

use evalframe_runtime::{
    ActionRef, Cell, Engine, EvalResult, EvalType, Evaluator, FrameFlags, FrameId, RuntimeError,
    SeriesId, Unwind, Value,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

// Re-export testing utilities
pub use pretty_assertions::{assert_eq, assert_ne};

/// Evaluator with just enough semantics to drive the engine
///
/// - Integers, text, blanks and blocks evaluate to themselves
/// - `word` looks up a variable; an action value is called, gathering each
///   argument in a subframe
/// - `word:` evaluates the next expression mid-frame and stores it
/// - `:word` reads a variable without calling it
/// - Groups are evaluated to their end
/// - `throw` unwinds without fetching anything further
/// - `|` is an expression barrier and evaluates to nulled
///
/// Under `EXPLICIT_EVALUATE` only flipped cells are evaluated.
#[derive(Default)]
pub struct MiniEvaluator {
    pub variables: RefCell<HashMap<String, Value>>,
    /// Every value that was evaluated, in order
    pub log: RefCell<Vec<Value>>,
}

impl MiniEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actions(actions: Vec<ActionRef>) -> Self {
        let evaluator = Self::new();
        for action in actions {
            evaluator
                .variables
                .borrow_mut()
                .insert(action.name.clone(), Value::Action(action));
        }
        evaluator
    }

    pub fn variable(&self, name: &str) -> Option<Value> {
        self.variables.borrow().get(name).cloned()
    }

    pub fn evaluated(&self) -> Vec<Value> {
        self.log.borrow().clone()
    }

    fn call(&self, engine: &mut Engine, id: FrameId, action: ActionRef) -> EvalResult<Value> {
        engine.begin_action(id, action.clone());
        let arg_flags =
            FrameFlags::FULFILLING_ARG | (engine.frame(id).flags() & FrameFlags::EXPLICIT_EVALUATE);

        for index in 0..action.arity {
            if engine.frame(id).at_end() {
                return Err(RuntimeError::evaluation(format!(
                    "{} is missing argument {}",
                    action.name, index
                ))
                .into());
            }
            let mut arg = Cell::nulled();
            engine.advance_subframe(&mut arg, id, arg_flags)?;
            engine.set_arg(id, index, arg);
        }
        engine.finish_fulfillment(id);

        let args: Vec<Value> = engine
            .args(id)
            .map(|slots| slots.iter().map(|cell| cell.value.clone()).collect())
            .unwrap_or_default();
        let result = action.call(&args);
        engine.end_action(id);
        Ok(result?)
    }
}

impl Evaluator for MiniEvaluator {
    fn step(&self, engine: &mut Engine, id: FrameId) -> EvalResult<()> {
        let explicit = engine
            .frame(id)
            .flags()
            .contains(FrameFlags::EXPLICIT_EVALUATE);
        let cell = engine.fetch_next(id)?;

        if explicit && !cell.is_eval_flipped() {
            engine.frame_mut(id).set_out(Cell::new(cell.value));
            return Ok(());
        }
        self.log.borrow_mut().push(cell.value.clone());

        let value = match cell.value {
            Value::Word(name) if name == "throw" => {
                return Err(Unwind::Thrown {
                    label: Value::Word(name),
                    value: Value::Text("thrown".to_string()),
                });
            }
            Value::Word(name) if name == "|" => {
                engine.frame_mut(id).mark_barrier_hit();
                Value::Nulled
            }
            Value::Word(name) => match self.variable(&name) {
                Some(Value::Action(action)) => self.call(engine, id, action)?,
                Some(value) => value,
                None => {
                    return Err(RuntimeError::evaluation(format!("{} has no value", name)).into())
                }
            },
            Value::Action(action) => self.call(engine, id, action)?,
            Value::GetWord(name) => self.variable(&name).unwrap_or(Value::Nulled),
            Value::SetWord(name) => {
                if engine.frame(id).at_end() {
                    return Err(RuntimeError::evaluation(format!("{}: needs a value", name)).into());
                }
                engine.frame_mut(id).set_eval_type(EvalType::SetWord);
                engine.advance_mid(id, FrameFlags::NONE)?;
                let value = engine
                    .frame(id)
                    .out()
                    .map(|cell| cell.value.clone())
                    .unwrap_or(Value::Nulled);
                self.variables.borrow_mut().insert(name, value.clone());
                value
            }
            Value::Group { series, index } => {
                let mut out = Cell::nulled();
                let specifier = engine.frame(id).specifier();
                engine.do_array_at(&mut out, series, index, specifier)?;
                out.value
            }
            inert => inert,
        };

        let frame = engine.frame_mut(id);
        frame.set_eval_type(EvalType::Neutral);
        frame.set_out(Cell::new(value));
        Ok(())
    }
}

/// Adds up every integer in its input
pub struct SumEvaluator;

impl Evaluator for SumEvaluator {
    fn step(&self, engine: &mut Engine, id: FrameId) -> EvalResult<()> {
        let n = match engine.fetch_next(id)?.value {
            Value::Integer(n) => n,
            other => {
                return Err(RuntimeError::evaluation(format!("cannot sum {}", other)).into())
            }
        };
        let frame = engine.frame_mut(id);
        let total = match frame.out().map(|cell| &cell.value) {
            Some(Value::Integer(total)) => *total,
            _ => 0,
        };
        frame.set_out(Cell::new(Value::Integer(total + n)));
        Ok(())
    }
}

/// Engine driven by a fresh [`MiniEvaluator`] with the standard actions
pub fn mini() -> (Arc<MiniEvaluator>, Engine) {
    let evaluator = Arc::new(MiniEvaluator::with_actions(vec![add(), negate(), identity()]));
    let engine = Engine::new(evaluator.clone());
    (evaluator, engine)
}

/// `add a b`
pub fn add() -> ActionRef {
    ActionRef::new("add", 2, |args| match args {
        [Value::Integer(a), Value::Integer(b)] => Ok(Value::Integer(a + b)),
        _ => Err(RuntimeError::evaluation("add expects two integers")),
    })
}

/// `negate n`
pub fn negate() -> ActionRef {
    ActionRef::new("negate", 1, |args| match args {
        [Value::Integer(n)] => Ok(Value::Integer(-n)),
        _ => Err(RuntimeError::evaluation("negate expects an integer")),
    })
}

/// `identity x`
pub fn identity() -> ActionRef {
    ActionRef::new("identity", 1, |args| Ok(args[0].clone()))
}

pub fn int(n: i64) -> Value {
    Value::Integer(n)
}

pub fn word(name: &str) -> Value {
    Value::Word(name.to_string())
}

pub fn set_word(name: &str) -> Value {
    Value::SetWord(name.to_string())
}

/// Allocate an unmanaged series of `values`
pub fn block(engine: &mut Engine, values: Vec<Value>) -> SeriesId {
    engine
        .heap_mut()
        .alloc_values(values)
        .expect("series allocation")
}

pub fn ints(engine: &mut Engine, values: &[i64]) -> SeriesId {
    block(engine, values.iter().map(|n| int(*n)).collect())
}
