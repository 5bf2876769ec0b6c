//! # toml-codec
//!
//! Resumable TOML parser and canonical stringifier for configuration files.
//!
//! The parser is an explicit state machine that consumes one character at a
//! time, so a document can arrive in arbitrary chunks (including byte chunks
//! that split multi-byte characters) and still parse exactly as if it had
//! been handed over in one piece. The stringifier writes any value graph back
//! out in a single canonical layout.
//!
//! ## Quick start
//!
//! ```rust
//! use toml_codec::{parse, stringify, Value};
//!
//! let doc = parse("name = \"ccjk\"\n[server]\nhost = \"localhost\"\nport = 8080\n").unwrap();
//! assert_eq!(doc.get_path(&["server", "port"]), Some(&Value::from(8080)));
//!
//! let text = stringify(&doc).unwrap();
//! assert_eq!(text, "name = \"ccjk\"\n\n[server]\nhost = \"localhost\"\nport = 8_080\n");
//! assert_eq!(parse(&text).unwrap(), doc);
//! ```
//!
//! ## Modules
//!
//! - [`parser`]: state-machine parser and whole-string [`parse`]
//! - [`stream`]: [`parse_chunked`], [`parse_stream`], [`parse_reader`] and [`StreamParser`]
//! - [`stringify`](mod@stringify): canonical serialization
//! - [`value`]: the document model
//! - [`error`]: positioned parse errors and the public [`CodecError`]
//! - [`json`]: `serde` export and JSON import

mod cursor;
pub mod error;
pub mod json;
pub mod parser;
mod resolver;
pub mod stream;
pub mod stringify;
pub mod value;

pub use error::{render_context, CodecError, ErrorKind, LexError, Result};
pub use parser::{parse, Parser, Phase, MAX_DEPTH};
pub use stream::{
    parse_chunked, parse_chunked_with, parse_reader, parse_reader_with, parse_stream, ParseOptions, StreamParser,
    DEFAULT_BLOCK_SIZE,
};
pub use stringify::{stringify, stringify_scalar, stringify_value, stringify_with, StringifyOptions};
pub use value::{
    Array, ContentType, Datetime, DatetimeKind, InlineArray, InlineTable, Integer, Str, Table,
    Value, WideInt,
};
