//! Evalframe Runtime - Evaluation frame engine
//!
//! This library provides the machinery an evaluator runs on:
//! - A frame stack with one-unit lookahead over series or variadic input
//! - Holds that keep series stable while a frame walks them
//! - Pooled call-local storage for action arguments
//! - Entry points for running a whole input, one step, or a branch
//! - Collection support, including reification of variadic input
//!
//! What a unit evaluates to is decided by an injected [`Evaluator`].

/// Evalframe runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Public API modules
pub mod data_stack;
pub mod engine;
pub mod error;
pub mod eval;
pub mod evaluator;
pub mod frame;
pub mod gc;
pub mod reify;
pub mod scanner;
pub mod series;
pub mod source;
pub mod value;
pub mod varlist;

pub(crate) mod fetch;

// Test utilities (only available in test builds)
#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use data_stack::DataStack;
pub use engine::Engine;
pub use error::{EvalResult, RuntimeError, ScanError, Unwind};
pub use eval::{Completion, Indexor, Progress};
pub use evaluator::{Evaluator, TracingEvaluator};
pub use evalframe_config::EngineSettings;
pub use frame::{Current, EvalType, Frame, FrameFlags, FrameId};
pub use gc::{GcRoot, GcStats, RootKind, RootValue};
pub use reify::TRUNCATION_MARKER;
pub use scanner::{NoScanner, Scanner, WordScanner};
pub use series::{Series, SeriesHeap, SeriesId, SeriesInfo};
pub use source::{
    ApiHandle, ArgFeed, FeedCounters, FrameSource, Instruction, VariadicArg, VariadicFeed,
    VariadicSource,
};
pub use value::{ActionRef, Cell, CellFlags, NativeFn, Specifier, Value};
pub use varlist::{VarlistId, VarlistPool};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smoke() {
        assert_eq!(VERSION, "0.1.0");
    }
}
