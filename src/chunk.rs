//! Byte cursor with line/column tracking, and the stack of chunks a parser
//! walks to support nested `.include` directives.

use crate::error::{Error, Result};

/// Nested includes deeper than this fail with `RecursionTooDeep`.
pub const MAX_CHUNK_DEPTH: usize = 16;

/// A contiguous byte range being parsed, with its own cursor and position.
/// Include macros push a new chunk on top of the stack; exhausting a chunk pops it.
pub struct Chunk {
    bytes: Vec<u8>,
    cursor: usize,
    line: usize,
    column: usize,
    /// Priority assigned to values parsed while this chunk is on top (include priority).
    pub priority: u8,
}

impl Chunk {
    pub fn new(bytes: Vec<u8>, priority: u8) -> Self {
        Chunk {
            bytes,
            cursor: 0,
            line: 1,
            column: 1,
            priority,
        }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    #[inline]
    pub fn at_end(&self) -> bool {
        self.cursor >= self.bytes.len()
    }

    #[inline]
    pub fn peek(&self) -> Option<u8> {
        self.bytes.get(self.cursor).copied()
    }

    #[inline]
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.cursor + offset).copied()
    }

    pub fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.cursor += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(b)
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn slice(&self, start: usize, end: usize) -> &[u8] {
        &self.bytes[start..end]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Snapshot of cursor/line/column, for the number lexer's backtrack-to-string fallback.
    pub fn mark(&self) -> (usize, usize, usize) {
        (self.cursor, self.line, self.column)
    }

    pub fn reset(&mut self, mark: (usize, usize, usize)) {
        self.cursor = mark.0;
        self.line = mark.1;
        self.column = mark.2;
    }
}

/// The stack of chunks a single parse walks. Exhausting the top chunk pops it
/// until the stack is empty, at which point parsing is complete.
pub struct ChunkStack {
    stack: Vec<Chunk>,
}

impl ChunkStack {
    pub fn new() -> Self {
        ChunkStack { stack: Vec::new() }
    }

    pub fn push(&mut self, bytes: Vec<u8>, priority: u8) -> Result<()> {
        if self.stack.len() >= MAX_CHUNK_DEPTH {
            return Err(Error::RecursionTooDeep {
                limit: MAX_CHUNK_DEPTH,
            });
        }
        self.stack.push(Chunk::new(bytes, priority));
        Ok(())
    }

    pub fn top(&self) -> Option<&Chunk> {
        self.stack.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Chunk> {
        self.stack.last_mut()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Pop every chunk that has been fully consumed, returning whether any
    /// chunk with remaining bytes exists.
    pub fn settle(&mut self) -> bool {
        while let Some(top) = self.stack.last() {
            if top.at_end() {
                self.stack.pop();
            } else {
                return true;
            }
        }
        false
    }

    pub fn current_priority(&self) -> u8 {
        self.stack.last().map(|c| c.priority).unwrap_or(0)
    }
}

impl Default for ChunkStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_tracks_line_and_column() {
        let mut c = Chunk::new(b"ab\ncd".to_vec(), 0);
        assert_eq!((c.line(), c.column()), (1, 1));
        c.advance();
        c.advance();
        assert_eq!((c.line(), c.column()), (1, 3));
        c.advance(); // consumes '\n'
        assert_eq!((c.line(), c.column()), (2, 1));
    }

    #[test]
    fn stack_enforces_max_depth() {
        let mut stack = ChunkStack::new();
        for _ in 0..MAX_CHUNK_DEPTH {
            stack.push(b"x".to_vec(), 0).unwrap();
        }
        assert!(stack.push(b"x".to_vec(), 0).is_err());
    }

    #[test]
    fn settle_pops_exhausted_chunks() {
        let mut stack = ChunkStack::new();
        stack.push(Vec::new(), 0).unwrap();
        stack.push(b"x".to_vec(), 0).unwrap();
        assert!(stack.settle());
        assert_eq!(stack.depth(), 1);
        stack.top_mut().unwrap().advance();
        assert!(!stack.settle());
        assert_eq!(stack.depth(), 0);
    }
}
