//! Incremental entry points built on [`Parser`].
//!
//! [`StreamParser`] accepts raw bytes as well as text and carries an
//! incomplete UTF-8 sequence over to the next chunk. The async functions are
//! thin loops around it:
//!
//! - [`parse_chunked`] / [`parse_chunked_with`]: slices an in-memory document
//!   into blocks and yields to the executor between blocks
//! - [`parse_stream`]: drains a [`Stream`] of byte or text chunks
//! - [`parse_reader`]: the blocking counterpart for any [`Read`]

use crate::error::{CodecError, Failure, Result};
use crate::parser::{Parser, Phase};
use crate::value::Table;
use futures::{Stream, StreamExt};
use std::future::Future;
use std::io::Read;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Block size used by [`parse_chunked`] callers that have no preference.
pub const DEFAULT_BLOCK_SIZE: usize = 40960;

/// Options for the incremental entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Bytes handed to the parser per step by [`parse_chunked_with`], rounded
    /// up to a character boundary. Also the read buffer size for
    /// [`parse_reader_with`].
    pub block_size: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

/// Push-style parser over byte or text chunks.
#[derive(Debug, Default)]
pub struct StreamParser {
    parser: Parser,
    pending: Vec<u8>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.parser.phase()
    }

    pub fn feed_str(&mut self, text: &str) -> Result<()> {
        if !self.pending.is_empty() {
            return Err(self.invalid_utf8());
        }
        self.parser.feed(text)?;
        Ok(())
    }

    /// Feed raw bytes. A multi-byte character split across two calls is
    /// held back until its remaining bytes arrive.
    pub fn feed_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => return Err(self.invalid_utf8()),
        };
        let rest = self.pending.split_off(valid);
        let ready = std::mem::replace(&mut self.pending, rest);
        let text = String::from_utf8(ready).map_err(|_| self.invalid_utf8())?;
        log::trace!(
            "[toml-codec] decoded {} bytes, {} held back",
            text.len(),
            self.pending.len()
        );
        self.parser.feed(&text)?;
        Ok(())
    }

    pub fn finish(self) -> Result<Table> {
        if !self.pending.is_empty() {
            return Err(self.invalid_utf8());
        }
        Ok(self.parser.finish()?)
    }

    fn invalid_utf8(&self) -> CodecError {
        self.parser
            .fail_here(Failure::lexical("Invalid UTF-8 in input"))
            .into()
    }
}

/// Parse an in-memory document `block_size` bytes at a time, yielding to the
/// executor after each block so a large document does not monopolize it.
pub async fn parse_chunked(text: &str, block_size: usize) -> Result<Table> {
    parse_chunked_with(text, &ParseOptions { block_size }).await
}

/// [`parse_chunked`] with the block size taken from `options`.
pub async fn parse_chunked_with(text: &str, options: &ParseOptions) -> Result<Table> {
    let block_size = options.block_size;
    if block_size == 0 {
        return Err(CodecError::usage("Block size must be greater than zero"));
    }
    log::debug!(
        "[toml-codec] chunked parse of {} bytes in blocks of {block_size}",
        text.len()
    );
    let mut parser = Parser::new();
    let mut rest = text;
    while !rest.is_empty() {
        let mut end = block_size.min(rest.len());
        while !rest.is_char_boundary(end) {
            end += 1;
        }
        let (block, tail) = rest.split_at(end);
        parser
            .feed(block)
            .map_err(|e| CodecError::from(e).with_source(text))?;
        rest = tail;
        yield_now().await;
    }
    parser
        .finish()
        .map_err(|e| CodecError::from(e).with_source(text))
}

/// Parse a document delivered as a stream of chunks. Chunks may split
/// multi-byte characters anywhere.
pub async fn parse_stream<S, B>(stream: S) -> Result<Table>
where
    S: Stream<Item = B>,
    B: AsRef<[u8]>,
{
    let mut stream = std::pin::pin!(stream);
    let mut parser = StreamParser::new();
    let mut chunks = 0usize;
    while let Some(chunk) = stream.next().await {
        parser.feed_bytes(chunk.as_ref())?;
        chunks += 1;
    }
    log::debug!("[toml-codec] stream parse consumed {chunks} chunks");
    parser.finish()
}

/// Parse everything `reader` produces.
pub fn parse_reader<R: Read>(reader: R) -> Result<Table> {
    parse_reader_with(reader, &ParseOptions::default())
}

pub fn parse_reader_with<R: Read>(mut reader: R, options: &ParseOptions) -> Result<Table> {
    let mut parser = StreamParser::new();
    let mut buf = vec![0u8; options.block_size.max(1)];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        parser.feed_bytes(&buf[..n])?;
    }
    parser.finish()
}

/// Completes on the second poll, after scheduling its own wake-up.
fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
