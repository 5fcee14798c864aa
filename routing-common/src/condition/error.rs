use std::fmt;
use thiserror::Error;

/// A position in the condition text. Both line and column start at 1.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A range of the condition text, the end is exclusive.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Span {
    pub start: Position,
    pub end: Position,
    /// Byte offsets into the text.
    pub offset: usize,
    pub len: usize,
}

impl Span {
    /// A span covering both spans, and everything in between.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start,
            end: other.end,
            offset: self.offset,
            len: (other.offset + other.len).saturating_sub(self.offset),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message} ({start}-{end})")]
pub struct CompilationError {
    pub message: String,
    pub start: Position,
    pub end: Position,
}

impl CompilationError {
    pub fn new<S: Into<String>>(message: S, span: Span) -> Self {
        Self {
            message: message.into(),
            start: span.start,
            end: span.end,
        }
    }
}

/// All errors found while compiling a condition, in order of their position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilationErrors(pub Vec<CompilationError>);

impl std::error::Error for CompilationErrors {}

impl CompilationErrors {
    pub fn errors(&self) -> &[CompilationError] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CompilationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to compile condition: ")?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}
