//! Key/table resolution.
//!
//! Three kinds of write reach the table tree:
//!
//! - `key.path = value` assignments ([`assign`])
//! - `[table.path]` headers ([`open_table`])
//! - `[[array.path]]` headers ([`open_array_of_tables`])
//!
//! Each walks a key path, creating implicit tables where allowed, and
//! enforces the redefinition rules. The parser's current section is kept as a
//! key path from the root and resolved with [`section_mut`]; arrays of tables
//! on that path resolve to their last element.

use crate::error::Failure;
use crate::value::{Array, Table, Value};

/// Assign `value` under `path`, relative to `table`.
///
/// Every intermediate segment must be absent or an undeclared table; the last
/// segment must be absent.
pub(crate) fn assign(table: &mut Table, path: &[String], value: Value) -> Result<(), Failure> {
    let Some((last, parents)) = path.split_last() else {
        return Err(Failure::lexical("Empty key"));
    };
    let mut current = table;
    for (depth, key) in parents.iter().enumerate() {
        current = match current.entry_or_table(key) {
            Value::Table(t) => {
                if t.is_declared() {
                    return Err(Failure::semantic(format!(
                        "Can't extend table '{}' with a dotted key, it was already declared",
                        display_path(&path[..=depth])
                    )));
                }
                t
            }
            Value::InlineTable(_) => {
                return Err(Failure::semantic(format!(
                    "Can't extend inline table '{}'",
                    display_path(&path[..=depth])
                )))
            }
            other => {
                return Err(Failure::semantic(format!(
                    "Can't redefine existing key '{}' ({}) as a table",
                    display_path(&path[..=depth]),
                    other.type_name()
                )))
            }
        };
    }
    if current.contains_key(last) {
        return Err(Failure::semantic(format!(
            "Can't redefine existing key '{}'",
            display_path(path)
        )));
    }
    current.insert(last.clone(), value);
    Ok(())
}

/// Handle a `[path]` header: walk from the root and declare the last table.
pub(crate) fn open_table(root: &mut Table, path: &[String]) -> Result<(), Failure> {
    let (last, parent) = walk_header(root, path)?;
    match parent.get_mut(last) {
        None => {
            parent.insert(last.clone(), Table::new_declared());
        }
        Some(Value::Table(t)) if !t.is_declared() => t.declare(),
        Some(Value::Table(_)) => {
            return Err(Failure::semantic(format!(
                "Can't redefine existing table '{}'",
                display_path(path)
            )))
        }
        Some(other) => {
            return Err(Failure::semantic(format!(
                "Can't redefine existing key '{}' ({}) as a table",
                display_path(path),
                other.type_name()
            )))
        }
    }
    Ok(())
}

/// Handle a `[[path]]` header: append a fresh table to the array at `path`,
/// creating the array when absent.
pub(crate) fn open_array_of_tables(root: &mut Table, path: &[String]) -> Result<(), Failure> {
    let (last, parent) = walk_header(root, path)?;
    match parent.get_mut(last) {
        None => {
            let mut array = Array::new();
            array.push(Table::new_declared());
            parent.insert(last.clone(), array);
        }
        Some(Value::Array(array)) => array.push(Table::new_declared()),
        Some(Value::InlineArray(_)) => {
            return Err(Failure::semantic(format!(
                "Can't extend inline array '{}' with an array-of-tables header",
                display_path(path)
            )))
        }
        Some(other) => {
            return Err(Failure::semantic(format!(
                "Can't redefine existing key '{}' ({}) as an array of tables",
                display_path(path),
                other.type_name()
            )))
        }
    }
    Ok(())
}

/// The table a header path currently designates.
pub(crate) fn section_mut<'a>(root: &'a mut Table, path: &[String]) -> Result<&'a mut Table, Failure> {
    let mut current = root;
    for (depth, key) in path.iter().enumerate() {
        current = match current.get_mut(key) {
            Some(Value::Table(t)) => t,
            Some(Value::Array(a)) => match a.last_mut() {
                Some(t) => t,
                None => return Err(missing_section(&path[..=depth])),
            },
            _ => return Err(missing_section(&path[..=depth])),
        };
    }
    Ok(current)
}

/// Walk every segment but the last from the root, creating implicit tables
/// and descending into the newest element of arrays of tables.
fn walk_header<'a, 'p>(
    root: &'a mut Table,
    path: &'p [String],
) -> Result<(&'p String, &'a mut Table), Failure> {
    let Some((last, parents)) = path.split_last() else {
        return Err(Failure::lexical("Empty table header"));
    };
    let mut current = root;
    for (depth, key) in parents.iter().enumerate() {
        current = match current.entry_or_table(key) {
            Value::Table(t) => t,
            Value::Array(a) => match a.last_mut() {
                Some(t) => t,
                None => return Err(missing_section(&path[..=depth])),
            },
            Value::InlineTable(_) => {
                return Err(Failure::semantic(format!(
                    "Can't extend inline table '{}'",
                    display_path(&path[..=depth])
                )))
            }
            other => {
                return Err(Failure::semantic(format!(
                    "Can't redefine existing key '{}' ({}) as a table",
                    display_path(&path[..=depth]),
                    other.type_name()
                )))
            }
        };
    }
    Ok((last, current))
}

fn missing_section(path: &[String]) -> Failure {
    Failure::semantic(format!(
        "Section '{}' is no longer a table",
        display_path(path)
    ))
}

/// Render a key path the way it would be written in a header.
pub(crate) fn display_path(path: &[String]) -> String {
    path.iter()
        .map(|segment| crate::stringify::format_key(segment))
        .collect::<Vec<_>>()
        .join(".")
}
