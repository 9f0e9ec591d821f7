//! Values and cells flowing through evaluation frames

use crate::error::RuntimeError;
use crate::series::SeriesId;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

/// Native function signature backing an [`ActionRef`]
pub type NativeFn = Arc<dyn Fn(&[Value]) -> Result<Value, RuntimeError> + Send + Sync>;

/// A callable with a fixed number of arguments
#[derive(Clone)]
pub struct ActionRef {
    pub name: String,
    pub arity: usize,
    pub native: NativeFn,
}

impl ActionRef {
    pub fn new<F>(name: impl Into<String>, arity: usize, native: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            arity,
            native: Arc::new(native),
        }
    }

    /// Invoke the native with fulfilled arguments
    pub fn call(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        (self.native)(args)
    }
}

impl fmt::Debug for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRef")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

impl PartialEq for ActionRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.native, &other.native)
    }
}

/// Runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absence of a value
    Nulled,
    Blank,
    Logic(bool),
    Integer(i64),
    Text(String),
    Word(String),
    SetWord(String),
    GetWord(String),
    /// Series reference positioned at `index`
    Block { series: SeriesId, index: usize },
    /// Like a block, but evaluates when encountered
    Group { series: SeriesId, index: usize },
    Action(ActionRef),
    /// Trash left behind in a consumed instruction slot
    Unreadable,
}

impl Value {
    pub fn is_nulled(&self) -> bool {
        matches!(self, Value::Nulled)
    }

    /// Series referenced by this value, if any
    pub fn series(&self) -> Option<SeriesId> {
        match self {
            Value::Block { series, .. } | Value::Group { series, .. } => Some(*series),
            _ => None,
        }
    }

    /// Datatype name for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Nulled => "null",
            Value::Blank => "blank",
            Value::Logic(_) => "logic",
            Value::Integer(_) => "integer",
            Value::Text(_) => "text",
            Value::Word(_) => "word",
            Value::SetWord(_) => "set-word",
            Value::GetWord(_) => "get-word",
            Value::Block { .. } => "block",
            Value::Group { .. } => "group",
            Value::Action(_) => "action",
            Value::Unreadable => "unreadable",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nulled => write!(f, "null"),
            Value::Blank => write!(f, "_"),
            Value::Logic(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "\"{}\"", s),
            Value::Word(w) => write!(f, "{}", w),
            Value::SetWord(w) => write!(f, "{}:", w),
            Value::GetWord(w) => write!(f, ":{}", w),
            Value::Block { series, index } => write!(f, "<block {}@{}>", series, index),
            Value::Group { series, index } => write!(f, "<group {}@{}>", series, index),
            Value::Action(action) => write!(f, "<action {}>", action.name),
            Value::Unreadable => write!(f, "--unreadable--"),
        }
    }
}

/// Per-cell flag bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct CellFlags(u8);

impl CellFlags {
    pub const NONE: CellFlags = CellFlags(0);
    /// Evaluate differently than the frame's mode would suggest
    pub const EVAL_FLIP: CellFlags = CellFlags(1 << 0);
    /// Value was produced by a quoting fetch
    pub const UNEVALUATED: CellFlags = CellFlags(1 << 1);

    pub fn contains(self, other: CellFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: CellFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: CellFlags) {
        self.0 &= !other.0;
    }
}

impl BitOr for CellFlags {
    type Output = CellFlags;

    fn bitor(self, rhs: CellFlags) -> CellFlags {
        CellFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for CellFlags {
    fn bitor_assign(&mut self, rhs: CellFlags) {
        self.0 |= rhs.0;
    }
}

/// A value slot: the value plus its cell flags
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub value: Value,
    pub flags: CellFlags,
}

impl Cell {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            flags: CellFlags::NONE,
        }
    }

    pub fn nulled() -> Self {
        Self::new(Value::Nulled)
    }

    pub fn unreadable() -> Self {
        Self::new(Value::Unreadable)
    }

    pub fn with_flags(value: Value, flags: CellFlags) -> Self {
        Self { value, flags }
    }

    pub fn is_nulled(&self) -> bool {
        self.value.is_nulled()
    }

    pub fn is_eval_flipped(&self) -> bool {
        self.flags.contains(CellFlags::EVAL_FLIP)
    }
}

impl From<Value> for Cell {
    fn from(value: Value) -> Self {
        Cell::new(value)
    }
}

/// Binding context for relative references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Specifier {
    /// Values are already fully specified
    #[default]
    Specified,
    /// Words resolve relative to the given context
    Bound(u32),
}
