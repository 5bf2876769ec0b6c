//! Resumable state-machine parser.
//!
//! The parser consumes one character at a time. Every grammar rule is a
//! [`State`]; rules that need sub-rules push a [`Frame`] holding the state to
//! return to, so the full parse position is an explicit stack of
//! `(state, buffer)` frames. Running out of input in the middle of a rule just
//! stops the loop; the next [`Parser::feed`] picks up where it left off.
//!
//! State handlers return one of four transitions:
//!
//! - `next(state)`: consume the character and continue in `state`
//! - `goto(state)`: switch to `state` and look at the same character again
//! - `call(sub, then)`: push a frame that resumes in `then`, run `sub`
//! - `ret(value)`: pop back to the caller and hand it `value`
//!
//! `call_now` and `ret_now` are the variants that do not consume.
//!
//! # Key design decisions
//!
//! - **State locals live in the enum**: an inline array under construction
//!   rides inside `State::ArrayAfterValue { array }`, so suspending a parse
//!   needs no extra bookkeeping.
//! - **The current section is a key path**: headers walk from the root, and
//!   assignments resolve the path again. Arrays of tables on the path resolve
//!   to their last element.
//! - **No recovery**: the first failure moves the parser to `Errored` and it
//!   refuses any further input.

use crate::cursor::{Cursor, Peek};
use crate::error::{CodecError, ErrorKind, Failure, LexError, Result};
use crate::resolver;
use crate::value::{Datetime, InlineArray, Integer, Str, Table, Value, WideInt};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

/// Parse a complete document.
///
/// On failure the returned error carries a rendered excerpt of `text`.
pub fn parse(text: &str) -> Result<Table> {
    log::debug!("[toml-codec] parsing document of {} bytes", text.len());
    let mut parser = Parser::new();
    parser
        .feed(text)
        .and_then(|()| parser.finish())
        .map_err(|e| CodecError::from(e).with_source(text))
}

/// Deepest table/array nesting a document may reach, counting every key
/// segment, section segment and open inline container on the way.
pub const MAX_DEPTH: usize = 128;

/// Coarse view of what the parser is in the middle of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    TopLevel,
    Key,
    Value,
    Header,
    Comment,
    Finished,
    Errored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Char(char),
    End,
}

enum Flow {
    Consume,
    Reprocess,
}

type Step = std::result::Result<Flow, Failure>;

/// What a finished sub-rule hands back to its caller.
#[derive(Debug)]
enum Returned {
    Value(Value),
    Key(Vec<String>),
    Segment(String),
    Char(char),
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumberPart {
    Integer,
    Fraction,
    Exponent,
    Radix(u32),
}

#[derive(Debug)]
enum State {
    // Top level
    Begin,
    LineTail,
    Comment,
    ExpectLf(Box<State>),
    Finished,
    Errored,

    // Assignments and headers
    AssignKeyDone,
    AssignValueDone { path: Vec<String> },
    HeaderStart,
    TableHeaderDone,
    ArrayHeaderDone,
    ArrayHeaderClose { path: Vec<String> },

    // Keys
    KeyStart { path: Vec<String> },
    BareKey,
    KeySegmentDone { path: Vec<String> },
    KeyAfterSegment { path: Vec<String> },

    // Values
    Value,
    Keyword { word: &'static str, matched: usize },

    // Strings
    BasicQuoteOpen,
    BasicQuotePair,
    BasicString,
    BasicStringEscaped,
    Escape,
    Unicode { width: usize },
    MlFirst { literal: bool },
    MlBasicString,
    MlBasicEscaped,
    MlBasicBackslash,
    MlTrimToEol,
    MlTrim,
    MlQuotes { literal: bool, count: usize },
    LiteralQuoteOpen,
    LiteralQuotePair,
    LiteralString,
    MlLiteralString,

    // Numbers
    SignedNumber,
    LeadingDigits,
    Integer,
    FractionStart,
    Fraction,
    ExponentSign,
    ExponentStart,
    Exponent,
    Radix { radix: u32 },
    DigitAfterUnderscore(NumberPart),

    // Dates and times
    Date,
    DateEnd,
    DateSpace,
    Time { with_date: bool, start: usize },
    TimeEnd { with_date: bool },
    TimeFraction { with_date: bool, seen: bool },
    Offset,
    OffsetDigits { start: usize },

    // Inline containers
    ArrayOpen { array: InlineArray },
    ArrayValueDone { array: InlineArray },
    ArrayAfterValue { array: InlineArray },
    InlineTableOpen { table: Table },
    InlineTableKeyDone { table: Table },
    InlineTableValueDone { table: Table, path: Vec<String> },
    InlineTableAfter { table: Table },
    InlineTableNext { table: Table },
}

#[derive(Debug)]
struct Frame {
    state: State,
    buf: String,
}

impl Frame {
    fn new(state: State) -> Self {
        Frame {
            state,
            buf: String::new(),
        }
    }
}

/// Incremental parser. Feed it text with [`feed`](Parser::feed) as it
/// arrives and call [`finish`](Parser::finish) once the input is complete.
#[derive(Debug)]
pub struct Parser {
    cursor: Cursor,
    frame: Frame,
    stack: Vec<Frame>,
    returned: Option<Returned>,
    root: Table,
    section: Vec<String>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Parser {
            cursor: Cursor::new(),
            frame: Frame::new(State::Begin),
            stack: Vec::new(),
            returned: None,
            root: Table::new(),
            section: Vec::new(),
        }
    }

    /// Process the next chunk of the document.
    pub fn feed(&mut self, chunk: &str) -> std::result::Result<(), LexError> {
        self.ensure_usable()?;
        log::trace!("[toml-codec] feeding {} bytes", chunk.len());
        self.cursor.feed(chunk);
        self.run()
    }

    /// Signal end of input and return the document.
    pub fn finish(mut self) -> std::result::Result<Table, LexError> {
        self.ensure_usable()?;
        self.cursor.end();
        self.run()?;
        match self.frame.state {
            State::Finished => Ok(self.root),
            _ => Err(Failure::lexical("Unexpected end of input").at(self.cursor.position())),
        }
    }

    pub fn phase(&self) -> Phase {
        match self.frame.state {
            State::Finished => return Phase::Finished,
            State::Errored => return Phase::Errored,
            State::Comment => return Phase::Comment,
            _ => {}
        }
        let bottom = self.stack.first().unwrap_or(&self.frame);
        match bottom.state {
            State::AssignKeyDone => Phase::Key,
            State::AssignValueDone { .. } => Phase::Value,
            State::HeaderStart
            | State::TableHeaderDone
            | State::ArrayHeaderDone
            | State::ArrayHeaderClose { .. } => Phase::Header,
            _ => Phase::TopLevel,
        }
    }

    /// Tag `failure` with the current position.
    pub(crate) fn fail_here(&self, failure: Failure) -> LexError {
        failure.at(self.cursor.position())
    }

    fn ensure_usable(&self) -> std::result::Result<(), LexError> {
        if matches!(self.frame.state, State::Errored) {
            let failure = Failure {
                kind: ErrorKind::Usage,
                message: "Parser has already failed and cannot accept more input".to_string(),
            };
            return Err(failure.at(self.cursor.position()));
        }
        Ok(())
    }

    fn run(&mut self) -> std::result::Result<(), LexError> {
        loop {
            let input = match self.cursor.peek() {
                Peek::Char(c) => Input::Char(c),
                Peek::EndOfChunk => return Ok(()),
                Peek::EndOfInput => Input::End,
            };
            self.step(input)?;
            match input {
                Input::Char(_) => self.cursor.advance(),
                Input::End => return Ok(()),
            }
        }
    }

    fn step(&mut self, input: Input) -> std::result::Result<(), LexError> {
        loop {
            match self.dispatch(input) {
                Ok(Flow::Consume) => return Ok(()),
                Ok(Flow::Reprocess) => {}
                Err(failure) => {
                    self.frame = Frame::new(State::Errored);
                    self.stack.clear();
                    return Err(failure.at(self.cursor.position()));
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    fn next(&mut self, state: State) -> Step {
        self.frame.state = state;
        Ok(Flow::Consume)
    }

    fn goto(&mut self, state: State) -> Step {
        self.frame.state = state;
        Ok(Flow::Reprocess)
    }

    fn call(&mut self, sub: State, then: State) -> Step {
        let mut parent = std::mem::replace(&mut self.frame, Frame::new(sub));
        parent.state = then;
        self.stack.push(parent);
        Ok(Flow::Consume)
    }

    fn call_now(&mut self, sub: State, then: State) -> Step {
        self.call(sub, then).map(|_| Flow::Reprocess)
    }

    fn ret(&mut self, value: Returned) -> Step {
        let Some(parent) = self.stack.pop() else {
            return Err(Failure::lexical("Internal error: return with an empty stack"));
        };
        self.frame = parent;
        self.returned = Some(value);
        Ok(Flow::Consume)
    }

    fn ret_now(&mut self, value: Returned) -> Step {
        self.ret(value).map(|_| Flow::Reprocess)
    }

    fn ret_value(&mut self, value: Value) -> Step {
        self.ret(Returned::Value(value))
    }

    fn ret_value_now(&mut self, value: Value) -> Step {
        self.ret_now(Returned::Value(value))
    }

    fn take_value(&mut self) -> std::result::Result<Value, Failure> {
        match self.returned.take() {
            Some(Returned::Value(v)) => Ok(v),
            other => Err(internal("a value", other)),
        }
    }

    fn take_key(&mut self) -> std::result::Result<Vec<String>, Failure> {
        match self.returned.take() {
            Some(Returned::Key(path)) => Ok(path),
            other => Err(internal("a key", other)),
        }
    }

    fn take_char(&mut self) -> std::result::Result<char, Failure> {
        match self.returned.take() {
            Some(Returned::Char(c)) => Ok(c),
            other => Err(internal("a character", other)),
        }
    }

    fn take_buf(&mut self) -> String {
        std::mem::take(&mut self.frame.buf)
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    fn dispatch(&mut self, input: Input) -> Step {
        let state = std::mem::replace(&mut self.frame.state, State::Errored);
        match state {
            State::Begin => self.on_begin(input),
            State::LineTail => self.on_line_tail(input),
            State::Comment => self.on_comment(input),
            State::ExpectLf(then) => match input {
                Input::Char('\n') => self.next(*then),
                _ => Err(Failure::lexical("Expected a newline after carriage return")),
            },
            State::Finished => match input {
                Input::End => self.next(State::Finished),
                Input::Char(_) => Err(Failure::lexical("Input after end of document")),
            },
            State::Errored => Err(Failure::lexical("Parser has already failed")),

            State::AssignKeyDone => {
                let path = self.take_key()?;
                match input {
                    Input::Char('=') => self.call(State::Value, State::AssignValueDone { path }),
                    _ => Err(unexpected(input, "'=' after key")),
                }
            }
            State::AssignValueDone { path } => {
                let value = self.take_value()?;
                let section = resolver::section_mut(&mut self.root, &self.section)?;
                resolver::assign(section, &path, value)?;
                self.goto(State::LineTail)
            }
            State::HeaderStart => match input {
                Input::Char('[') => self.call(State::KeyStart { path: Vec::new() }, State::ArrayHeaderDone),
                _ => self.call_now(State::KeyStart { path: Vec::new() }, State::TableHeaderDone),
            },
            State::TableHeaderDone => {
                let path = self.take_key()?;
                match input {
                    Input::Char(']') => {
                        resolver::open_table(&mut self.root, &path)?;
                        self.section = path;
                        self.next(State::LineTail)
                    }
                    _ => Err(unexpected(input, "']' to close table header")),
                }
            }
            State::ArrayHeaderDone => {
                let path = self.take_key()?;
                match input {
                    Input::Char(']') => self.next(State::ArrayHeaderClose { path }),
                    _ => Err(unexpected(input, "']]' to close array of tables header")),
                }
            }
            State::ArrayHeaderClose { path } => match input {
                Input::Char(']') => {
                    resolver::open_array_of_tables(&mut self.root, &path)?;
                    self.section = path;
                    self.next(State::LineTail)
                }
                _ => Err(unexpected(input, "']]' to close array of tables header")),
            },

            State::KeyStart { path } => self.on_key_start(input, path),
            State::BareKey => match input {
                Input::Char(c) if is_bare_key_char(c) => {
                    self.frame.buf.push(c);
                    self.next(State::BareKey)
                }
                _ => {
                    let segment = self.take_buf();
                    self.ret_now(Returned::Segment(segment))
                }
            },
            State::KeySegmentDone { mut path } => {
                match self.returned.take() {
                    Some(Returned::Segment(s)) => path.push(s),
                    Some(Returned::Value(Value::String(s))) => path.push(s.value),
                    other => return Err(internal("a key segment", other)),
                }
                self.check_depth(path.len())?;
                self.goto(State::KeyAfterSegment { path })
            }
            State::KeyAfterSegment { path } => match input {
                Input::Char(' ' | '\t') => self.next(State::KeyAfterSegment { path }),
                Input::Char('.') => self.next(State::KeyStart { path }),
                _ => self.ret_now(Returned::Key(path)),
            },

            State::Value => self.on_value(input),
            State::Keyword { word, matched } => self.on_keyword(input, word, matched),

            State::BasicQuoteOpen => match input {
                Input::Char('"') => self.next(State::BasicQuotePair),
                _ => self.goto(State::BasicString),
            },
            State::BasicQuotePair => match input {
                Input::Char('"') => self.next(State::MlFirst { literal: false }),
                _ => self.ret_value_now(Value::String(Str::new(""))),
            },
            State::BasicString => self.on_basic_string(input),
            State::BasicStringEscaped => {
                let c = self.take_char()?;
                self.frame.buf.push(c);
                self.goto(State::BasicString)
            }
            State::Escape => self.on_escape(input),
            State::Unicode { width } => self.on_unicode(input, width),
            State::MlFirst { literal } => {
                let body = if literal {
                    State::MlLiteralString
                } else {
                    State::MlBasicString
                };
                match input {
                    Input::Char('\n') => self.next(body),
                    Input::Char('\r') => self.next(State::ExpectLf(Box::new(body))),
                    _ => self.goto(body),
                }
            }
            State::MlBasicString => self.on_ml_basic_string(input),
            State::MlBasicEscaped => {
                let c = self.take_char()?;
                self.frame.buf.push(c);
                self.goto(State::MlBasicString)
            }
            State::MlBasicBackslash => match input {
                Input::Char(' ' | '\t') => self.next(State::MlTrimToEol),
                Input::Char('\n') => self.next(State::MlTrim),
                Input::Char('\r') => self.next(State::ExpectLf(Box::new(State::MlTrim))),
                _ => self.call_now(State::Escape, State::MlBasicEscaped),
            },
            State::MlTrimToEol => match input {
                Input::Char(' ' | '\t') => self.next(State::MlTrimToEol),
                Input::Char('\n') => self.next(State::MlTrim),
                Input::Char('\r') => self.next(State::ExpectLf(Box::new(State::MlTrim))),
                _ => Err(Failure::lexical(
                    "Invalid escape: a backslash followed by whitespace must end the line",
                )),
            },
            State::MlTrim => match input {
                Input::Char(' ' | '\t' | '\n') => self.next(State::MlTrim),
                Input::Char('\r') => self.next(State::ExpectLf(Box::new(State::MlTrim))),
                _ => self.goto(State::MlBasicString),
            },
            State::MlQuotes { literal, count } => self.on_ml_quotes(input, literal, count),
            State::LiteralQuoteOpen => match input {
                Input::Char('\'') => self.next(State::LiteralQuotePair),
                _ => self.goto(State::LiteralString),
            },
            State::LiteralQuotePair => match input {
                Input::Char('\'') => self.next(State::MlFirst { literal: true }),
                _ => self.ret_value_now(Value::String(Str::new(""))),
            },
            State::LiteralString => self.on_literal_string(input),
            State::MlLiteralString => self.on_ml_literal_string(input),

            State::SignedNumber => match input {
                Input::Char(c) if c.is_ascii_digit() => self.goto(State::Integer),
                Input::Char('i') => self.goto(State::Keyword {
                    word: "inf",
                    matched: 0,
                }),
                Input::Char('n') => self.goto(State::Keyword {
                    word: "nan",
                    matched: 0,
                }),
                _ => Err(unexpected(input, "a digit, 'inf' or 'nan' after sign")),
            },
            State::LeadingDigits => self.on_leading_digits(input),
            State::Integer => self.on_integer(input),
            State::FractionStart => match input {
                Input::Char(c) if c.is_ascii_digit() => {
                    self.frame.buf.push(c);
                    self.next(State::Fraction)
                }
                _ => Err(Failure::lexical("Invalid float: expected a digit after '.'")),
            },
            State::Fraction => match input {
                Input::Char(c) if c.is_ascii_digit() => {
                    self.frame.buf.push(c);
                    self.next(State::Fraction)
                }
                Input::Char('_') => self.next(State::DigitAfterUnderscore(NumberPart::Fraction)),
                Input::Char('e' | 'E') => {
                    self.frame.buf.push('e');
                    self.next(State::ExponentSign)
                }
                _ => self.finish_float(),
            },
            State::ExponentSign => match input {
                Input::Char(c @ ('+' | '-')) => {
                    self.frame.buf.push(c);
                    self.next(State::ExponentStart)
                }
                Input::Char(c) if c.is_ascii_digit() => {
                    self.frame.buf.push(c);
                    self.next(State::Exponent)
                }
                _ => Err(Failure::lexical("Invalid float: expected an exponent")),
            },
            State::ExponentStart => match input {
                Input::Char(c) if c.is_ascii_digit() => {
                    self.frame.buf.push(c);
                    self.next(State::Exponent)
                }
                _ => Err(Failure::lexical("Invalid float: expected a digit in exponent")),
            },
            State::Exponent => match input {
                Input::Char(c) if c.is_ascii_digit() => {
                    self.frame.buf.push(c);
                    self.next(State::Exponent)
                }
                Input::Char('_') => self.next(State::DigitAfterUnderscore(NumberPart::Exponent)),
                _ => self.finish_float(),
            },
            State::Radix { radix } => self.on_radix(input, radix),
            State::DigitAfterUnderscore(part) => {
                let radix = match part {
                    NumberPart::Radix(r) => r,
                    _ => 10,
                };
                match input {
                    Input::Char(c) if c.is_digit(radix) => {
                        self.frame.buf.push(c);
                        let state = match part {
                            NumberPart::Integer => State::Integer,
                            NumberPart::Fraction => State::Fraction,
                            NumberPart::Exponent => State::Exponent,
                            NumberPart::Radix(radix) => State::Radix { radix },
                        };
                        self.next(state)
                    }
                    _ => Err(Failure::lexical(
                        "Invalid number: '_' must be surrounded by digits",
                    )),
                }
            }

            State::Date => self.on_date(input),
            State::DateEnd => match input {
                Input::Char('T' | 't') => {
                    self.frame.buf.push('T');
                    let start = self.frame.buf.len();
                    self.next(State::Time {
                        with_date: true,
                        start,
                    })
                }
                Input::Char(' ') => self.next(State::DateSpace),
                _ => self.finish_date(),
            },
            State::DateSpace => match input {
                Input::Char(c) if c.is_ascii_digit() => {
                    self.frame.buf.push('T');
                    let start = self.frame.buf.len();
                    self.goto(State::Time {
                        with_date: true,
                        start,
                    })
                }
                _ => self.finish_date(),
            },
            State::Time { with_date, start } => self.on_time(input, with_date, start),
            State::TimeEnd { with_date } => match input {
                Input::Char('.') => {
                    self.frame.buf.push('.');
                    self.next(State::TimeFraction {
                        with_date,
                        seen: false,
                    })
                }
                _ if with_date => self.goto(State::Offset),
                _ => self.finish_time(),
            },
            State::TimeFraction { with_date, seen } => match input {
                Input::Char(c) if c.is_ascii_digit() => {
                    self.frame.buf.push(c);
                    self.next(State::TimeFraction {
                        with_date,
                        seen: true,
                    })
                }
                _ if !seen => Err(Failure::lexical(
                    "Invalid time: expected digits after '.'",
                )),
                _ if with_date => self.goto(State::Offset),
                _ => self.finish_time(),
            },
            State::Offset => match input {
                Input::Char('Z' | 'z') => {
                    self.frame.buf.push('Z');
                    self.finish_offset_datetime()
                }
                Input::Char(c @ ('+' | '-')) => {
                    self.frame.buf.push(c);
                    let start = self.frame.buf.len();
                    self.next(State::OffsetDigits { start })
                }
                _ => self.finish_local_datetime(),
            },
            State::OffsetDigits { start } => {
                self.push_pattern_char(input, start, "00:00", "Invalid offset, expected HH:MM")?;
                if self.frame.buf.len() - start == 5 {
                    self.finish_offset_datetime()
                } else {
                    self.next(State::OffsetDigits { start })
                }
            }

            State::ArrayOpen { array } => self.on_array_open(input, array),
            State::ArrayValueDone { mut array } => {
                let value = self.take_value()?;
                array.push(value).map_err(Failure::semantic)?;
                self.goto(State::ArrayAfterValue { array })
            }
            State::ArrayAfterValue { array } => self.on_array_after_value(input, array),
            State::InlineTableOpen { table } => match input {
                Input::Char(' ' | '\t') => self.next(State::InlineTableOpen { table }),
                Input::Char('}') => self.ret_value(Value::InlineTable(table.into_inline())),
                _ => {
                    reject_in_inline_table(input)?;
                    self.call_now(
                        State::KeyStart { path: Vec::new() },
                        State::InlineTableKeyDone { table },
                    )
                }
            },
            State::InlineTableKeyDone { table } => {
                let path = self.take_key()?;
                match input {
                    Input::Char('=') => {
                        self.call(State::Value, State::InlineTableValueDone { table, path })
                    }
                    _ => Err(unexpected(input, "'=' after key in inline table")),
                }
            }
            State::InlineTableValueDone { mut table, path } => {
                let value = self.take_value()?;
                resolver::assign(&mut table, &path, value)?;
                self.goto(State::InlineTableAfter { table })
            }
            State::InlineTableAfter { table } => match input {
                Input::Char(' ' | '\t') => self.next(State::InlineTableAfter { table }),
                Input::Char(',') => self.next(State::InlineTableNext { table }),
                Input::Char('}') => self.ret_value(Value::InlineTable(table.into_inline())),
                _ => {
                    reject_in_inline_table(input)?;
                    Err(unexpected(input, "',' or '}' in inline table"))
                }
            },
            State::InlineTableNext { table } => match input {
                Input::Char(' ' | '\t') => self.next(State::InlineTableNext { table }),
                Input::Char('}') => Err(Failure::lexical(
                    "Trailing commas are not allowed in inline tables",
                )),
                _ => {
                    reject_in_inline_table(input)?;
                    self.call_now(
                        State::KeyStart { path: Vec::new() },
                        State::InlineTableKeyDone { table },
                    )
                }
            },
        }
    }

    // ------------------------------------------------------------------
    // Top level
    // ------------------------------------------------------------------

    fn on_begin(&mut self, input: Input) -> Step {
        match input {
            Input::End => self.next(State::Finished),
            Input::Char(' ' | '\t' | '\n') => self.next(State::Begin),
            Input::Char('\r') => self.next(State::ExpectLf(Box::new(State::Begin))),
            Input::Char('#') => self.call(State::Comment, State::Begin),
            Input::Char('[') => self.next(State::HeaderStart),
            Input::Char(c) if is_bare_key_char(c) || c == '"' || c == '\'' => {
                self.call_now(State::KeyStart { path: Vec::new() }, State::AssignKeyDone)
            }
            Input::Char(c) => Err(Failure::lexical(format!(
                "Unknown character {c:?}, expected a key, a table header or a comment"
            ))),
        }
    }

    fn on_line_tail(&mut self, input: Input) -> Step {
        match input {
            Input::Char(' ' | '\t') => self.next(State::LineTail),
            Input::Char('#') => self.call(State::Comment, State::LineTail),
            Input::Char('\n') => self.next(State::Begin),
            Input::Char('\r') => self.next(State::ExpectLf(Box::new(State::Begin))),
            Input::End => self.goto(State::Begin),
            Input::Char(c) => Err(Failure::lexical(format!(
                "Unexpected character {c:?}, expected only whitespace or comments till end of line"
            ))),
        }
    }

    fn on_comment(&mut self, input: Input) -> Step {
        match input {
            Input::Char('\n' | '\r') | Input::End => self.ret_now(Returned::Nothing),
            Input::Char(c) if is_control(c) => Err(Failure::lexical(
                "Control characters are not allowed in comments",
            )),
            Input::Char(_) => self.next(State::Comment),
        }
    }

    // ------------------------------------------------------------------
    // Keys
    // ------------------------------------------------------------------

    fn on_key_start(&mut self, input: Input, path: Vec<String>) -> Step {
        match input {
            Input::Char(' ' | '\t') => self.next(State::KeyStart { path }),
            Input::Char('"') => self.call(State::BasicString, State::KeySegmentDone { path }),
            Input::Char('\'') => self.call(State::LiteralString, State::KeySegmentDone { path }),
            Input::Char(c) if is_bare_key_char(c) => {
                self.call_now(State::BareKey, State::KeySegmentDone { path })
            }
            _ => Err(unexpected(input, "a bare or quoted key")),
        }
    }

    // ------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------

    fn on_value(&mut self, input: Input) -> Step {
        match input {
            Input::Char(' ' | '\t') => self.next(State::Value),
            Input::Char('"') => self.next(State::BasicQuoteOpen),
            Input::Char('\'') => self.next(State::LiteralQuoteOpen),
            Input::Char('t') => self.goto(State::Keyword {
                word: "true",
                matched: 0,
            }),
            Input::Char('f') => self.goto(State::Keyword {
                word: "false",
                matched: 0,
            }),
            Input::Char('i') => self.goto(State::Keyword {
                word: "inf",
                matched: 0,
            }),
            Input::Char('n') => self.goto(State::Keyword {
                word: "nan",
                matched: 0,
            }),
            Input::Char(c @ ('+' | '-')) => {
                self.frame.buf.push(c);
                self.next(State::SignedNumber)
            }
            Input::Char(c) if c.is_ascii_digit() => self.goto(State::LeadingDigits),
            Input::Char('[') => {
                self.check_depth(1)?;
                self.next(State::ArrayOpen {
                    array: InlineArray::new(),
                })
            }
            Input::Char('{') => {
                self.check_depth(1)?;
                self.next(State::InlineTableOpen {
                    table: Table::new(),
                })
            }
            _ => Err(unexpected(
                input,
                "a string, number, datetime, boolean, inline array or inline table",
            )),
        }
    }

    /// Fail if going `extra` levels deeper than the enclosing frames would
    /// pass [`MAX_DEPTH`].
    fn check_depth(&self, extra: usize) -> std::result::Result<(), Failure> {
        let enclosing: usize = self
            .stack
            .iter()
            .map(|frame| match &frame.state {
                State::AssignKeyDone => self.section.len(),
                State::AssignValueDone { path } => self.section.len() + path.len(),
                State::InlineTableValueDone { path, .. } => path.len(),
                State::ArrayValueDone { .. } => 1,
                _ => 0,
            })
            .sum();
        if enclosing + extra > MAX_DEPTH {
            return Err(Failure::lexical(format!(
                "Document is nested too deeply, the limit is {MAX_DEPTH} levels"
            )));
        }
        Ok(())
    }

    fn on_keyword(&mut self, input: Input, word: &'static str, matched: usize) -> Step {
        let expected = word[matched..].chars().next();
        match input {
            Input::Char(c) if Some(c) == expected => {
                let matched = matched + 1;
                if matched < word.len() {
                    return self.next(State::Keyword { word, matched });
                }
                let negative = self.frame.buf.starts_with('-');
                let value = match word {
                    "true" => Value::Bool(true),
                    "false" => Value::Bool(false),
                    "inf" if negative => Value::Float(f64::NEG_INFINITY),
                    "inf" => Value::Float(f64::INFINITY),
                    _ => Value::Float(f64::NAN),
                };
                self.ret_value(value)
            }
            _ => Err(Failure::lexical(format!("Invalid literal, expected '{word}'"))),
        }
    }

    // ------------------------------------------------------------------
    // Strings
    // ------------------------------------------------------------------

    fn on_basic_string(&mut self, input: Input) -> Step {
        match input {
            Input::Char('"') => {
                let value = self.take_buf();
                self.ret_value(Value::String(Str::new(value)))
            }
            Input::Char('\\') => self.call(State::Escape, State::BasicStringEscaped),
            Input::Char('\n' | '\r') | Input::End => Err(Failure::lexical("Unterminated string")),
            Input::Char(c) if is_control(c) => Err(control_in_string()),
            Input::Char(c) => {
                self.frame.buf.push(c);
                self.next(State::BasicString)
            }
        }
    }

    fn on_escape(&mut self, input: Input) -> Step {
        let c = match input {
            Input::Char('b') => '\u{8}',
            Input::Char('t') => '\t',
            Input::Char('n') => '\n',
            Input::Char('f') => '\u{c}',
            Input::Char('r') => '\r',
            Input::Char('"') => '"',
            Input::Char('\\') => '\\',
            Input::Char('u') => return self.next(State::Unicode { width: 4 }),
            Input::Char('U') => return self.next(State::Unicode { width: 8 }),
            Input::Char(other) => {
                return Err(Failure::lexical(format!(
                    "Invalid escape sequence '\\{other}'"
                )))
            }
            Input::End => return Err(Failure::lexical("Unterminated escape sequence")),
        };
        self.ret(Returned::Char(c))
    }

    fn on_unicode(&mut self, input: Input, width: usize) -> Step {
        match input {
            Input::Char(c) if c.is_ascii_hexdigit() => {
                self.frame.buf.push(c);
                if self.frame.buf.len() < width {
                    return self.next(State::Unicode { width });
                }
                let hex = self.take_buf();
                let code = u32::from_str_radix(&hex, 16)
                    .map_err(|_| Failure::lexical(format!("Invalid unicode escape '{hex}'")))?;
                if (0xD800..=0xDFFF).contains(&code) {
                    return Err(Failure::range(format!(
                        "Invalid unicode escape: U+{code:04X} is a surrogate codepoint"
                    )));
                }
                let c = char::from_u32(code).ok_or_else(|| {
                    Failure::range(format!(
                        "Invalid unicode escape: U+{code:X} is out of range"
                    ))
                })?;
                self.ret(Returned::Char(c))
            }
            _ => Err(Failure::lexical(format!(
                "Invalid unicode escape, expected {width} hex digits"
            ))),
        }
    }

    fn on_ml_basic_string(&mut self, input: Input) -> Step {
        match input {
            Input::Char('"') => self.next(State::MlQuotes {
                literal: false,
                count: 1,
            }),
            Input::Char('\\') => self.next(State::MlBasicBackslash),
            Input::Char('\r') => {
                self.frame.buf.push('\n');
                self.next(State::ExpectLf(Box::new(State::MlBasicString)))
            }
            Input::Char(c) if c == '\n' || !is_control(c) => {
                self.frame.buf.push(c);
                self.next(State::MlBasicString)
            }
            Input::Char(_) => Err(control_in_string()),
            Input::End => Err(Failure::lexical("Unterminated multi-line string")),
        }
    }

    fn on_literal_string(&mut self, input: Input) -> Step {
        match input {
            Input::Char('\'') => {
                let value = self.take_buf();
                self.ret_value(Value::String(Str::new(value)))
            }
            Input::Char('\n' | '\r') | Input::End => {
                Err(Failure::lexical("Unterminated literal string"))
            }
            Input::Char(c) if is_control(c) => Err(control_in_string()),
            Input::Char(c) => {
                self.frame.buf.push(c);
                self.next(State::LiteralString)
            }
        }
    }

    fn on_ml_literal_string(&mut self, input: Input) -> Step {
        match input {
            Input::Char('\'') => self.next(State::MlQuotes {
                literal: true,
                count: 1,
            }),
            Input::Char('\r') => {
                self.frame.buf.push('\n');
                self.next(State::ExpectLf(Box::new(State::MlLiteralString)))
            }
            Input::Char(c) if c == '\n' || !is_control(c) => {
                self.frame.buf.push(c);
                self.next(State::MlLiteralString)
            }
            Input::Char(_) => Err(control_in_string()),
            Input::End => Err(Failure::lexical("Unterminated multi-line literal string")),
        }
    }

    /// A run of quote characters inside a multi-line string. Three or more
    /// close the string; up to two extra quotes before the closing delimiter
    /// belong to the content.
    fn on_ml_quotes(&mut self, input: Input, literal: bool, count: usize) -> Step {
        let quote = if literal { '\'' } else { '"' };
        match input {
            Input::Char(c) if c == quote => {
                if count == 5 {
                    return Err(Failure::lexical(
                        "Too many quotes at the end of a multi-line string",
                    ));
                }
                self.next(State::MlQuotes {
                    literal,
                    count: count + 1,
                })
            }
            _ if count >= 3 => {
                for _ in 0..count - 3 {
                    self.frame.buf.push(quote);
                }
                let value = self.take_buf();
                self.ret_value_now(Value::String(Str::multiline(value)))
            }
            _ => {
                for _ in 0..count {
                    self.frame.buf.push(quote);
                }
                if literal {
                    self.goto(State::MlLiteralString)
                } else {
                    self.goto(State::MlBasicString)
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Numbers
    // ------------------------------------------------------------------

    /// Unsigned digits at the start of a value: could still become an
    /// integer, a float, a radix integer, a date or a time.
    fn on_leading_digits(&mut self, input: Input) -> Step {
        let len = self.frame.buf.len();
        match input {
            Input::Char(c) if c.is_ascii_digit() => {
                self.frame.buf.push(c);
                self.next(State::LeadingDigits)
            }
            Input::Char('-') if len == 4 => {
                self.frame.buf.push('-');
                self.next(State::Date)
            }
            Input::Char(':') if len == 2 => {
                self.frame.buf.push(':');
                self.next(State::Time {
                    with_date: false,
                    start: 0,
                })
            }
            Input::Char(c @ ('x' | 'o' | 'b')) if self.frame.buf == "0" => {
                self.frame.buf.clear();
                let radix = match c {
                    'x' => 16,
                    'o' => 8,
                    _ => 2,
                };
                self.next(State::Radix { radix })
            }
            _ => self.goto(State::Integer),
        }
    }

    fn on_integer(&mut self, input: Input) -> Step {
        match input {
            Input::Char(c) if c.is_ascii_digit() => {
                self.frame.buf.push(c);
                self.next(State::Integer)
            }
            Input::Char('_') if self.frame.buf.ends_with(|c: char| c.is_ascii_digit()) => {
                self.next(State::DigitAfterUnderscore(NumberPart::Integer))
            }
            Input::Char('.') => {
                self.check_leading_zeros()?;
                self.frame.buf.push('.');
                self.next(State::FractionStart)
            }
            Input::Char('e' | 'E') => {
                self.check_leading_zeros()?;
                self.frame.buf.push('e');
                self.next(State::ExponentSign)
            }
            _ => self.finish_integer(),
        }
    }

    fn on_radix(&mut self, input: Input, radix: u32) -> Step {
        match input {
            Input::Char(c) if c.is_digit(radix) => {
                self.frame.buf.push(c);
                self.next(State::Radix { radix })
            }
            Input::Char('_') if !self.frame.buf.is_empty() => {
                self.next(State::DigitAfterUnderscore(NumberPart::Radix(radix)))
            }
            _ => {
                let digits = self.take_buf();
                if digits.is_empty() {
                    return Err(Failure::lexical(format!(
                        "Invalid number: expected base-{radix} digits after prefix"
                    )));
                }
                let value = match i64::from_str_radix(&digits, radix) {
                    Ok(n) => Integer::Native(n),
                    Err(_) => Integer::Wide(WideInt::from_radix(&digits, radix).ok_or_else(
                        || Failure::lexical(format!("Invalid base-{radix} number")),
                    )?),
                };
                self.ret_value_now(Value::Int(value))
            }
        }
    }

    fn check_leading_zeros(&self) -> std::result::Result<(), Failure> {
        let digits = self.frame.buf.trim_start_matches(['+', '-']);
        if digits.len() > 1 && digits.starts_with('0') {
            return Err(Failure::lexical(
                "Invalid number: leading zeros are not allowed",
            ));
        }
        Ok(())
    }

    fn finish_integer(&mut self) -> Step {
        self.check_leading_zeros()?;
        let text = self.take_buf();
        let value = match text.parse::<i64>() {
            Ok(n) => Integer::Native(n),
            Err(_) => {
                let negative = text.starts_with('-');
                let digits = text.trim_start_matches(['+', '-']);
                Integer::Wide(
                    WideInt::from_decimal(negative, digits)
                        .ok_or_else(|| Failure::lexical(format!("Invalid integer '{text}'")))?,
                )
            }
        };
        self.ret_value_now(Value::Int(value))
    }

    fn finish_float(&mut self) -> Step {
        let text = self.take_buf();
        let value = text
            .parse::<f64>()
            .map_err(|_| Failure::lexical(format!("Invalid float '{text}'")))?;
        self.ret_value_now(Value::Float(value))
    }

    // ------------------------------------------------------------------
    // Dates and times
    // ------------------------------------------------------------------

    /// Push `input` if it matches `pattern` at the current offset from
    /// `start`, where `0` in the pattern stands for any digit. A letter where
    /// a digit belongs is a non-numeric component, reported as a range error.
    fn push_pattern_char(
        &mut self,
        input: Input,
        start: usize,
        pattern: &str,
        message: &str,
    ) -> std::result::Result<(), Failure> {
        let offset = self.frame.buf.len() - start;
        let expected = pattern.as_bytes().get(offset).copied();
        match (input, expected) {
            (Input::Char(c), Some(b'0')) if c.is_ascii_digit() => {}
            (Input::Char(c), Some(b'0')) if c.is_alphanumeric() => {
                return Err(Failure::range(format!(
                    "{message}: non-numeric component {c:?}"
                )))
            }
            (Input::Char(c), Some(e)) if e != b'0' && c == char::from(e) => {}
            _ => return Err(Failure::lexical(message)),
        }
        if let Input::Char(c) = input {
            self.frame.buf.push(c);
        }
        Ok(())
    }

    fn on_date(&mut self, input: Input) -> Step {
        self.push_pattern_char(input, 0, "0000-00-00", "Invalid date, expected YYYY-MM-DD")?;
        if self.frame.buf.len() == 10 {
            self.next(State::DateEnd)
        } else {
            self.next(State::Date)
        }
    }

    fn on_time(&mut self, input: Input, with_date: bool, start: usize) -> Step {
        self.push_pattern_char(input, start, "00:00:00", "Invalid time, expected HH:MM:SS")?;
        if self.frame.buf.len() - start == 8 {
            self.next(State::TimeEnd { with_date })
        } else {
            self.next(State::Time { with_date, start })
        }
    }

    fn finish_date(&mut self) -> Step {
        let text = self.take_buf();
        let date = NaiveDate::parse_from_str(&text, "%Y-%m-%d")
            .map_err(|_| Failure::range(format!("Invalid date '{text}'")))?;
        self.ret_value_now(Value::Datetime(Datetime::Date(date)))
    }

    fn finish_time(&mut self) -> Step {
        let text = self.take_buf();
        let time = NaiveTime::parse_from_str(&text, "%H:%M:%S%.f")
            .map_err(|_| Failure::range(format!("Invalid time '{text}'")))?;
        self.ret_value_now(Value::Datetime(Datetime::Time(time)))
    }

    fn finish_local_datetime(&mut self) -> Step {
        let text = self.take_buf();
        let dt = NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(|_| Failure::range(format!("Invalid datetime '{text}'")))?;
        self.ret_value_now(Value::Datetime(Datetime::Local(dt)))
    }

    /// Called after consuming the last character of the offset.
    fn finish_offset_datetime(&mut self) -> Step {
        let text = self.take_buf();
        let dt = DateTime::parse_from_rfc3339(&text)
            .map_err(|_| Failure::range(format!("Invalid datetime '{text}'")))?;
        self.ret_value(Value::Datetime(Datetime::Offset(dt)))
    }

    // ------------------------------------------------------------------
    // Inline arrays
    // ------------------------------------------------------------------

    fn on_array_open(&mut self, input: Input, array: InlineArray) -> Step {
        match input {
            Input::Char(' ' | '\t' | '\n') => self.next(State::ArrayOpen { array }),
            Input::Char('\r') => self.next(State::ExpectLf(Box::new(State::ArrayOpen { array }))),
            Input::Char('#') => self.call(State::Comment, State::ArrayOpen { array }),
            Input::Char(']') => self.ret_value(Value::InlineArray(array)),
            Input::End => Err(Failure::lexical("Unterminated inline array")),
            Input::Char(_) => self.call_now(State::Value, State::ArrayValueDone { array }),
        }
    }

    fn on_array_after_value(&mut self, input: Input, array: InlineArray) -> Step {
        match input {
            Input::Char(' ' | '\t' | '\n') => self.next(State::ArrayAfterValue { array }),
            Input::Char('\r') => self.next(State::ExpectLf(Box::new(State::ArrayAfterValue {
                array,
            }))),
            Input::Char('#') => self.call(State::Comment, State::ArrayAfterValue { array }),
            Input::Char(',') => self.next(State::ArrayOpen { array }),
            Input::Char(']') => self.ret_value(Value::InlineArray(array)),
            Input::End => Err(Failure::lexical("Unterminated inline array")),
            Input::Char(_) => Err(unexpected(input, "',' or ']' in inline array")),
        }
    }
}

fn is_bare_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_control(c: char) -> bool {
    (c < ' ' && c != '\t') || c == '\u{7f}'
}

fn control_in_string() -> Failure {
    Failure::lexical("Control characters are not allowed in strings, use an escape sequence")
}

fn reject_in_inline_table(input: Input) -> std::result::Result<(), Failure> {
    match input {
        Input::Char('\n' | '\r') => Err(Failure::lexical(
            "Newlines are not allowed in inline tables",
        )),
        Input::Char('#') => Err(Failure::lexical("Comments are not allowed in inline tables")),
        Input::End => Err(Failure::lexical("Unterminated inline table")),
        Input::Char(_) => Ok(()),
    }
}

fn unexpected(input: Input, expected: &str) -> Failure {
    match input {
        Input::Char(c) => Failure::lexical(format!("Unexpected character {c:?}, expected {expected}")),
        Input::End => Failure::lexical(format!("Unexpected end of input, expected {expected}")),
    }
}

fn internal(expected: &str, got: Option<Returned>) -> Failure {
    Failure::lexical(format!(
        "Internal error: expected {expected} from sub-rule, got {got:?}"
    ))
}
