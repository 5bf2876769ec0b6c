//! The in-memory document model.
//!
//! Every parsed document is a [`Table`]. Scalars and containers are variants
//! of [`Value`]; the flags the resolver needs (`declared` on tables, the fixed
//! `content_type` of inline arrays) are ordinary struct fields.
//!
//! Tables keep their entries in a `Vec<(String, Value)>` so insertion order is
//! preserved without pulling in an ordered-map crate. Configuration tables are
//! small enough that linear lookup is not a concern.
//!
//! Equality is structural: it ignores `declared`, the multi-line flag on
//! strings, and whether a table or array was written inline or as a section.
//! Tables compare as maps, so entry order does not matter either; the
//! stringifier writes plain entries ahead of sections. That is the equality
//! under which `parse(stringify(v)) == v` holds.

use crate::error::{CodecError, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;

// ============================================================================
// Integers
// ============================================================================

/// An integer literal. `Native` covers everything that fits in `i64`; larger
/// magnitudes are kept exactly as [`WideInt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Integer {
    Native(i64),
    Wide(WideInt),
}

impl Integer {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Integer::Native(n) => Some(*n),
            Integer::Wide(_) => None,
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            Integer::Native(n) => *n as f64,
            Integer::Wide(w) => w.to_f64(),
        }
    }
}

impl fmt::Display for Integer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Integer::Native(n) => write!(f, "{n}"),
            Integer::Wide(w) => write!(f, "{w}"),
        }
    }
}

impl From<i64> for Integer {
    fn from(n: i64) -> Self {
        Integer::Native(n)
    }
}

/// Arbitrary-precision integer stored as a sign and a normalized decimal
/// digit string (no leading zeros, never `-0`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WideInt {
    negative: bool,
    digits: String,
}

impl WideInt {
    /// Build from decimal digits. Returns `None` if `digits` is empty or
    /// contains anything but ASCII digits.
    pub fn from_decimal(negative: bool, digits: &str) -> Option<Self> {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let trimmed = digits.trim_start_matches('0');
        let digits = if trimmed.is_empty() { "0" } else { trimmed };
        Some(WideInt {
            negative: negative && digits != "0",
            digits: digits.to_string(),
        })
    }

    /// Build from digits in base 2, 8 or 16 by converting to decimal.
    pub fn from_radix(digits: &str, radix: u32) -> Option<Self> {
        // Little-endian limbs in base 10^9.
        const BASE: u64 = 1_000_000_000;
        let mut limbs: Vec<u64> = vec![0];
        for ch in digits.chars() {
            let mut carry = u64::from(ch.to_digit(radix)?);
            for limb in limbs.iter_mut() {
                let v = *limb * u64::from(radix) + carry;
                *limb = v % BASE;
                carry = v / BASE;
            }
            while carry > 0 {
                limbs.push(carry % BASE);
                carry /= BASE;
            }
        }
        let mut text = String::new();
        for (i, limb) in limbs.iter().rev().enumerate() {
            if i == 0 {
                text.push_str(&limb.to_string());
            } else {
                text.push_str(&format!("{limb:09}"));
            }
        }
        WideInt::from_decimal(false, &text)
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Decimal magnitude without sign.
    pub fn digits(&self) -> &str {
        &self.digits
    }

    pub fn to_f64(&self) -> f64 {
        self.to_string().parse().unwrap_or(f64::NAN)
    }
}

impl fmt::Display for WideInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }
        f.write_str(&self.digits)
    }
}

// ============================================================================
// Strings
// ============================================================================

/// A string value. `multiline` records that the literal used a triple-quoted
/// form; it only influences how the value is written back out.
#[derive(Debug, Clone, Eq)]
pub struct Str {
    pub value: String,
    pub multiline: bool,
}

impl Str {
    pub fn new(value: impl Into<String>) -> Self {
        Str {
            value: value.into(),
            multiline: false,
        }
    }

    pub fn multiline(value: impl Into<String>) -> Self {
        Str {
            value: value.into(),
            multiline: true,
        }
    }
}

impl PartialEq for Str {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

// ============================================================================
// Date/time
// ============================================================================

/// One of the four date/time shapes. The variant never changes once parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datetime {
    /// Date and time with `Z` or a `±HH:MM` offset.
    Offset(DateTime<FixedOffset>),
    /// Date and time without offset ("floating").
    Local(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatetimeKind {
    OffsetDateTime,
    LocalDateTime,
    LocalDate,
    LocalTime,
}

impl Datetime {
    pub fn kind(&self) -> DatetimeKind {
        match self {
            Datetime::Offset(_) => DatetimeKind::OffsetDateTime,
            Datetime::Local(_) => DatetimeKind::LocalDateTime,
            Datetime::Date(_) => DatetimeKind::LocalDate,
            Datetime::Time(_) => DatetimeKind::LocalTime,
        }
    }
}

impl fmt::Display for Datetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datetime::Offset(dt) if dt.offset().local_minus_utc() == 0 => {
                write!(f, "{}Z", dt.format("%Y-%m-%dT%H:%M:%S%.f"))
            }
            Datetime::Offset(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.f%:z")),
            Datetime::Local(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
            Datetime::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Datetime::Time(t) => write!(f, "{}", t.format("%H:%M:%S%.f")),
        }
    }
}

impl fmt::Display for DatetimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatetimeKind::OffsetDateTime => "offset datetime",
            DatetimeKind::LocalDateTime => "local datetime",
            DatetimeKind::LocalDate => "local date",
            DatetimeKind::LocalTime => "local time",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Containers
// ============================================================================

/// A table: ordered key/value entries plus the `declared` flag set when a
/// `[header]` opened it.
#[derive(Debug, Clone, Default)]
pub struct Table {
    entries: Vec<(String, Value)>,
    declared: bool,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn new_declared() -> Self {
        Table {
            entries: Vec::new(),
            declared: true,
        }
    }

    pub fn is_declared(&self) -> bool {
        self.declared
    }

    pub(crate) fn declare(&mut self) {
        self.declared = true;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace. A replaced entry keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.get_mut(&key) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn entries(&self) -> &[(String, Value)] {
        &self.entries
    }

    /// Look up a nested value through tables and inline tables.
    pub fn get_path(&self, path: &[&str]) -> Option<&Value> {
        let (last, parents) = path.split_last()?;
        let mut current = self.entries();
        for key in parents {
            current = lookup(current, key)?.table_entries()?;
        }
        lookup(current, last)
    }

    /// Deep-merge `other` into this table. Tables present on both sides are
    /// merged recursively; every other value from `other` replaces ours.
    pub fn merge(&mut self, other: Table) {
        for (key, value) in other.entries {
            if let Value::Table(theirs) = value {
                if let Some(Value::Table(mine)) = self.get_mut(&key) {
                    mine.merge(theirs);
                    continue;
                }
                self.insert(key, Value::Table(theirs));
            } else {
                self.insert(key, value);
            }
        }
    }

    /// Merge `updates` into the table at `path`, creating missing tables on
    /// the way. Fails if a segment names something other than a table.
    pub fn merge_section(&mut self, path: &[&str], updates: Table) -> Result<()> {
        let mut current = self;
        for key in path {
            current = match current.entry_or_table(key) {
                Value::Table(table) => table,
                other => {
                    return Err(CodecError::usage(format!(
                        "Cannot merge into '{key}': it is a {}, not a table",
                        other.type_name()
                    )))
                }
            };
        }
        current.merge(updates);
        Ok(())
    }

    /// The value under `key`, inserting an empty implicit table first when
    /// the key is absent.
    pub(crate) fn entry_or_table(&mut self, key: &str) -> &mut Value {
        let idx = match self.entries.iter().position(|(k, _)| k == key) {
            Some(idx) => idx,
            None => {
                self.entries
                    .push((key.to_string(), Value::Table(Table::new())));
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx].1
    }

    /// Freeze into an inline table, converting nested tables as well.
    pub(crate) fn into_inline(self) -> InlineTable {
        let entries = self
            .entries
            .into_iter()
            .map(|(k, v)| match v {
                Value::Table(t) => (k, Value::InlineTable(t.into_inline())),
                other => (k, other),
            })
            .collect();
        InlineTable { entries }
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        entries_eq(&self.entries, &other.entries)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Table {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = Table::new();
        for (k, v) in iter {
            table.insert(k, v);
        }
        table
    }
}

fn lookup<'a>(entries: &'a [(String, Value)], key: &str) -> Option<&'a Value> {
    entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

/// Map equality over entry lists with unique keys.
fn entries_eq(a: &[(String, Value)], b: &[(String, Value)]) -> bool {
    a.len() == b.len() && a.iter().all(|(k, v)| lookup(b, k) == Some(v))
}

/// A `{ ... }` table literal. There is no mutating API: once built it stays
/// as it is.
#[derive(Debug, Clone, Default)]
pub struct InlineTable {
    entries: Vec<(String, Value)>,
}

impl InlineTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        lookup(&self.entries, key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn entries(&self) -> &[(String, Value)] {
        &self.entries
    }
}

impl PartialEq for InlineTable {
    fn eq(&self, other: &Self) -> bool {
        entries_eq(&self.entries, &other.entries)
    }
}

impl From<Table> for InlineTable {
    fn from(table: Table) -> Self {
        table.into_inline()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for InlineTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter().collect::<Table>().into_inline()
    }
}

/// An array of tables, built by `[[header]]` sections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Array {
    tables: Vec<Table>,
}

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, table: Table) {
        self.tables.push(table);
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Table> {
        self.tables.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub(crate) fn last_mut(&mut self) -> Option<&mut Table> {
        self.tables.last_mut()
    }
}

impl FromIterator<Table> for Array {
    fn from_iter<I: IntoIterator<Item = Table>>(iter: I) -> Self {
        Array {
            tables: iter.into_iter().collect(),
        }
    }
}

/// What an inline array holds. Fixed by its first element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Integer,
    Float,
    Boolean,
    String,
    Datetime(DatetimeKind),
    Array,
    Table,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::Integer => f.write_str("integer"),
            ContentType::Float => f.write_str("float"),
            ContentType::Boolean => f.write_str("boolean"),
            ContentType::String => f.write_str("string"),
            ContentType::Datetime(kind) => write!(f, "{kind}"),
            ContentType::Array => f.write_str("array"),
            ContentType::Table => f.write_str("table"),
        }
    }
}

/// A `[ ... ]` array literal. Elements share one [`ContentType`], except that
/// adding a float to an integer array (or the reverse) turns every element
/// into a float.
#[derive(Debug, Clone, Default)]
pub struct InlineArray {
    elements: Vec<Value>,
    content_type: Option<ContentType>,
}

impl InlineArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list of values, applying the same rules as [`push`].
    ///
    /// [`push`]: InlineArray::push
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Result<Self> {
        let mut array = InlineArray::new();
        for value in values {
            array.push(value).map_err(CodecError::semantic)?;
        }
        Ok(array)
    }

    /// Append an element. Fails with a description when the element's type
    /// is incompatible with the array's content type.
    pub fn push(&mut self, value: Value) -> std::result::Result<(), String> {
        let incoming = value.content_type();
        match self.content_type {
            None => {
                self.content_type = Some(incoming);
                self.elements.push(value);
            }
            Some(current) if current == incoming => self.elements.push(value),
            Some(ContentType::Integer) if incoming == ContentType::Float => {
                for element in self.elements.iter_mut() {
                    if let Value::Int(i) = element {
                        *element = Value::Float(i.to_f64());
                    }
                }
                self.content_type = Some(ContentType::Float);
                self.elements.push(value);
            }
            Some(ContentType::Float) if incoming == ContentType::Integer => {
                let widened = match &value {
                    Value::Int(i) => Value::Float(i.to_f64()),
                    _ => value,
                };
                self.elements.push(widened);
            }
            Some(current) => {
                return Err(format!(
                    "Inline arrays must be homogeneous: cannot add {incoming} to an array of {current}"
                ))
            }
        }
        Ok(())
    }

    pub fn content_type(&self) -> Option<ContentType> {
        self.content_type
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.elements.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.elements.iter()
    }

    pub fn elements(&self) -> &[Value] {
        &self.elements
    }
}

impl PartialEq for InlineArray {
    fn eq(&self, other: &Self) -> bool {
        self.elements == other.elements
    }
}

// ============================================================================
// Value
// ============================================================================

/// Any value a document can hold.
#[derive(Debug, Clone)]
pub enum Value {
    Int(Integer),
    Float(f64),
    Bool(bool),
    String(Str),
    Datetime(Datetime),
    Table(Table),
    InlineTable(InlineTable),
    Array(Array),
    InlineArray(InlineArray),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Bool(_) => "boolean",
            Value::String(_) => "string",
            Value::Datetime(_) => "datetime",
            Value::Table(_) => "table",
            Value::InlineTable(_) => "inline table",
            Value::Array(_) => "array of tables",
            Value::InlineArray(_) => "inline array",
        }
    }

    pub fn content_type(&self) -> ContentType {
        match self {
            Value::Int(_) => ContentType::Integer,
            Value::Float(_) => ContentType::Float,
            Value::Bool(_) => ContentType::Boolean,
            Value::String(_) => ContentType::String,
            Value::Datetime(dt) => ContentType::Datetime(dt.kind()),
            Value::Table(_) | Value::InlineTable(_) => ContentType::Table,
            Value::Array(_) | Value::InlineArray(_) => ContentType::Array,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Int(i) => i.as_i64(),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(&s.value),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<&Datetime> {
        match self {
            Value::Datetime(dt) => Some(dt),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Entries of a table or inline table.
    pub fn table_entries(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Table(t) => Some(t.entries()),
            Value::InlineTable(t) => Some(t.entries()),
            _ => None,
        }
    }

    pub fn is_table_like(&self) -> bool {
        matches!(self, Value::Table(_) | Value::InlineTable(_))
    }
}

fn float_eq(a: f64, b: f64) -> bool {
    if a.is_nan() || b.is_nan() {
        return a.is_nan() && b.is_nan();
    }
    a == b && a.is_sign_negative() == b.is_sign_negative()
}

fn tables_match_values(tables: &[Table], values: &[Value]) -> bool {
    tables.len() == values.len()
        && tables
            .iter()
            .zip(values)
            .all(|(t, v)| v.table_entries().is_some_and(|e| entries_eq(e, t.entries())))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => float_eq(*a, *b),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Datetime(a), Value::Datetime(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::InlineArray(a), Value::InlineArray(b)) => a == b,
            (Value::Array(a), Value::InlineArray(b)) | (Value::InlineArray(b), Value::Array(a)) => {
                tables_match_values(a.tables(), b.elements())
            }
            (a, b) if a.is_table_like() && b.is_table_like() => {
                match (a.table_entries(), b.table_entries()) {
                    (Some(x), Some(y)) => entries_eq(x, y),
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(Integer::Native(n))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(Integer::Native(i64::from(n)))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Str::new(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Str::new(s))
    }
}

impl From<Datetime> for Value {
    fn from(dt: Datetime) -> Self {
        Value::Datetime(dt)
    }
}

impl From<Table> for Value {
    fn from(t: Table) -> Self {
        Value::Table(t)
    }
}

impl From<InlineTable> for Value {
    fn from(t: InlineTable) -> Self {
        Value::InlineTable(t)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Array(a)
    }
}

impl From<InlineArray> for Value {
    fn from(a: InlineArray) -> Self {
        Value::InlineArray(a)
    }
}
