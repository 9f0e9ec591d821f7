//! Scanner seam
//!
//! When a variadic stream yields raw text, the engine hands it to a
//! [`Scanner`] which pushes the resulting units on the data stack.

use crate::data_stack::DataStack;
use crate::error::ScanError;
use crate::value::{Cell, Specifier, Value};

/// Turns source text into units
pub trait Scanner {
    /// Scan `text`, pushing every unit produced on `stack` in order
    ///
    /// On failure the caller discards whatever was pushed.
    fn scan(&self, text: &str, specifier: &Specifier, stack: &mut DataStack)
        -> Result<(), ScanError>;
}

/// Rejects all text
#[derive(Debug, Default, Clone, Copy)]
pub struct NoScanner;

impl Scanner for NoScanner {
    fn scan(
        &self,
        _text: &str,
        _specifier: &Specifier,
        _stack: &mut DataStack,
    ) -> Result<(), ScanError> {
        Err(ScanError::Unsupported)
    }
}

/// Whitespace-separated tokenizer
///
/// Recognizes integers, `_` blanks, `"quoted text"`, `word`, `word:` and
/// `:word`. Words are left unbound; binding is the evaluator's concern.
#[derive(Debug, Default, Clone, Copy)]
pub struct WordScanner;

impl Scanner for WordScanner {
    fn scan(
        &self,
        text: &str,
        _specifier: &Specifier,
        stack: &mut DataStack,
    ) -> Result<(), ScanError> {
        let mut chars = text.char_indices().peekable();

        while let Some(&(start, ch)) = chars.peek() {
            if ch.is_whitespace() {
                chars.next();
                continue;
            }

            if ch == '"' {
                chars.next();
                let mut content = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '"' {
                        closed = true;
                        break;
                    }
                    content.push(c);
                }
                if !closed {
                    return Err(ScanError::UnterminatedText { offset: start });
                }
                stack.push(Cell::new(Value::Text(content)));
                continue;
            }

            let mut end = text.len();
            while let Some(&(idx, c)) = chars.peek() {
                if c.is_whitespace() {
                    end = idx;
                    break;
                }
                chars.next();
            }
            stack.push(Cell::new(classify(&text[start..end])?));
        }

        Ok(())
    }
}

fn classify(token: &str) -> Result<Value, ScanError> {
    let invalid = || ScanError::InvalidToken {
        token: token.to_string(),
    };

    if token == "_" {
        return Ok(Value::Blank);
    }

    let first = token.chars().next().ok_or_else(invalid)?;
    if first.is_ascii_digit() || ((first == '-' || first == '+') && token.len() > 1) {
        return token.parse::<i64>().map(Value::Integer).map_err(|_| invalid());
    }

    if let Some(name) = token.strip_prefix(':') {
        return if is_word(name) {
            Ok(Value::GetWord(name.to_string()))
        } else {
            Err(invalid())
        };
    }

    if let Some(name) = token.strip_suffix(':') {
        return if is_word(name) {
            Ok(Value::SetWord(name.to_string()))
        } else {
            Err(invalid())
        };
    }

    if is_word(token) {
        Ok(Value::Word(token.to_string()))
    } else {
        Err(invalid())
    }
}

fn is_word(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && !name.contains(|c: char| matches!(c, ':' | '"' | '[' | ']' | '(' | ')'))
}
