//! Source positions.
//!
//! Spans are character offsets into a script's source. Line and column
//! information is derived on demand from the script's line table.

use serde::{Deserialize, Serialize};

/// Half-open range `[start, end)` of character offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    /// Create a new span.
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// A zero-length span at the given offset.
    pub fn at(position: u32) -> Self {
        Self {
            start: position,
            end: position,
        }
    }

    /// Placeholder span for synthesized nodes.
    pub fn dummy() -> Self {
        Self { start: 0, end: 0 }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Length in characters.
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// Whether the span is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `position` falls inside the span (end inclusive).
    pub fn contains(&self, position: u32) -> bool {
        self.start <= position && position <= self.end
    }
}
