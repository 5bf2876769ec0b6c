//! Position-tracking character reader.
//!
//! The cursor holds one chunk of input at a time. Line, column and absolute
//! position survive across chunks, so a document fed in pieces reports the
//! same locations as one parsed in a single call.

/// What the parser sees at the current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peek {
    Char(char),
    /// The current chunk is exhausted but more input may follow.
    EndOfChunk,
    /// No more input will ever arrive.
    EndOfInput,
}

/// A point in the document. `line` and `column` are 0-based internally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Default)]
pub struct Cursor {
    chunk: Vec<char>,
    index: usize,
    position: Position,
    ended: bool,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current chunk. Any unread characters of the previous
    /// chunk are dropped, so callers only feed once the cursor reports
    /// [`Peek::EndOfChunk`].
    pub fn feed(&mut self, text: &str) {
        self.chunk.clear();
        self.chunk.extend(text.chars());
        self.index = 0;
    }

    /// Signal that no further chunks will be fed.
    pub fn end(&mut self) {
        self.ended = true;
    }

    pub fn peek(&self) -> Peek {
        match self.chunk.get(self.index) {
            Some(&c) => Peek::Char(c),
            None if self.ended => Peek::EndOfInput,
            None => Peek::EndOfChunk,
        }
    }

    /// Consume the current character.
    pub fn advance(&mut self) {
        let Some(&c) = self.chunk.get(self.index) else {
            return;
        };
        self.index += 1;
        self.position.offset += 1;
        if c == '\n' {
            self.position.line += 1;
            self.position.column = 0;
        } else {
            self.position.column += 1;
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }
}
