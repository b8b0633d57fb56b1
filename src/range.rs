//! Identifier ranges and their deterministic split into chunks.
//!
//! A [`Range`] is the half-open interval of student numbers a job targets.
//! It may be given in either order; the walk direction is decided once when
//! the range is constructed and every [`Chunk`] inherits it. Chunks are
//! produced in walk order so chunk 0 always holds the first identifiers to be
//! pulled, and a rerun with the same range and chunk size yields the same
//! chunk ids and bounds.

use crate::StudentNumber;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors raised while splitting a range
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RangeError {
    /// Chunk size must be at least one identifier
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    /// The range covers no identifiers
    #[error("range {start}..{end} is empty")]
    Empty {
        /// Range start
        start: StudentNumber,
        /// Range end
        end: StudentNumber,
    },
}

/// Walk direction of a range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// `start < end`, identifiers increase
    Ascending,
    /// `start > end`, identifiers decrease
    Descending,
}

impl Direction {
    /// Signed step between consecutive identifiers
    pub fn step(self) -> i64 {
        match self {
            Direction::Ascending => 1,
            Direction::Descending => -1,
        }
    }
}

/// Identifier range `[start, end)` walked from `start` towards `end`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    start: StudentNumber,
    end: StudentNumber,
    direction: Direction,
}

impl Range {
    /// Build a range. `end` is exclusive in both directions, so
    /// `Range::new(10, 5)` walks 10, 9, 8, 7, 6.
    pub fn new(start: StudentNumber, end: StudentNumber) -> Self {
        let direction = if start > end {
            Direction::Descending
        } else {
            Direction::Ascending
        };

        Self {
            start,
            end,
            direction,
        }
    }

    /// First identifier walked
    pub fn start(&self) -> StudentNumber {
        self.start
    }

    /// Exclusive bound
    pub fn end(&self) -> StudentNumber {
        self.end
    }

    /// Walk direction
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Number of identifiers covered
    pub fn len(&self) -> u64 {
        self.start.abs_diff(self.end)
    }

    /// Whether the range covers no identifiers
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Split into `ceil(len / chunk_size)` contiguous chunks in walk order.
    /// The last chunk may be shorter.
    pub fn split(&self, chunk_size: u64) -> Result<Vec<Chunk>, RangeError> {
        if chunk_size == 0 {
            return Err(RangeError::ZeroChunkSize);
        }
        if self.is_empty() {
            return Err(RangeError::Empty {
                start: self.start,
                end: self.end,
            });
        }

        let step = self.direction.step();
        let mut chunks = Vec::with_capacity(self.len().div_ceil(chunk_size) as usize);
        let mut cursor = self.start;

        while cursor != self.end {
            let size = cursor.abs_diff(self.end).min(chunk_size) as i64;
            let chunk_end = cursor + step * size;
            chunks.push(Chunk {
                id: chunks.len(),
                start: cursor,
                end: chunk_end,
            });
            cursor = chunk_end;
        }

        Ok(chunks)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Contiguous sub-interval of a [`Range`] owned by one worker at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chunk {
    id: usize,
    start: StudentNumber,
    end: StudentNumber,
}

impl Chunk {
    /// Build a chunk directly (split order id, walk start, exclusive end)
    pub fn new(id: usize, start: StudentNumber, end: StudentNumber) -> Self {
        Self { id, start, end }
    }

    /// Position in split order
    pub fn id(&self) -> usize {
        self.id
    }

    /// First identifier walked
    pub fn start(&self) -> StudentNumber {
        self.start
    }

    /// Exclusive bound
    pub fn end(&self) -> StudentNumber {
        self.end
    }

    /// Walk direction
    pub fn direction(&self) -> Direction {
        if self.start > self.end {
            Direction::Descending
        } else {
            Direction::Ascending
        }
    }

    /// Number of identifiers covered
    pub fn len(&self) -> u64 {
        self.start.abs_diff(self.end)
    }

    /// Whether the chunk covers no identifiers
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether `id` lies inside `[start, end)` in walk direction
    pub fn contains(&self, id: StudentNumber) -> bool {
        match self.direction() {
            Direction::Ascending => id >= self.start && id < self.end,
            Direction::Descending => id <= self.start && id > self.end,
        }
    }

    /// Whether `cursor` is a valid walk position (`start..=end`)
    pub fn is_valid_cursor(&self, cursor: StudentNumber) -> bool {
        cursor == self.end || self.contains(cursor)
    }

    /// Identifiers processed before reaching `cursor`
    pub fn processed_at(&self, cursor: StudentNumber) -> u64 {
        self.start.abs_diff(cursor)
    }

    /// Identifiers still to walk from `cursor` (inclusive) to `end`
    pub fn ids_from(&self, cursor: StudentNumber) -> ChunkIds {
        ChunkIds {
            next: cursor,
            end: self.end,
            step: self.direction().step(),
        }
    }

    /// All identifiers of the chunk in walk order
    pub fn ids(&self) -> ChunkIds {
        self.ids_from(self.start)
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk {} [{}..{})", self.id, self.start, self.end)
    }
}

/// Iterator over the identifiers of a chunk in walk order
#[derive(Debug, Clone)]
pub struct ChunkIds {
    next: StudentNumber,
    end: StudentNumber,
    step: i64,
}

impl Iterator for ChunkIds {
    type Item = StudentNumber;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == self.end {
            return None;
        }
        let id = self.next;
        self.next += self.step;
        Some(id)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.next.abs_diff(self.end) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkIds {}
