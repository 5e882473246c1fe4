//! Document reconstruction from edit commands
//!
//! Folds a sequence of Google Docs edit commands into the full document text.
//! Two command encodings are understood:
//!
//! - Google's own objects, tagged by `ty`: `is` (insert string `s` at 1-based
//!   index `ibi`), `ds` (delete 1-based inclusive range `si..=ei`), `mlti`
//!   (a batch of nested commands in `mts`), plus style and selection commands
//!   that do not touch the text.
//! - Compact tuples: `["insert", text, index]` and `["delete", start, end]`,
//!   0-based with an exclusive end.
//!
//! Indices count characters, not bytes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{Error, Result};

/// Command kinds that leave the text alone (styles, selections, ...)
const NO_OP_COMMANDS: &[&str] = &["as", "ae", "ase", "ast", "de", "ue", "null"];

/// Cursor and length history, one entry per text change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditMetadata {
    #[serde(default)]
    pub cursor: Vec<usize>,
    #[serde(default)]
    pub length: Vec<usize>,
}

/// A document being rebuilt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoogleText {
    #[serde(default)]
    pub text: String,
    /// Cursor after the last edit, 0-based
    #[serde(default)]
    pub position: usize,
    #[serde(default)]
    pub edit_metadata: EditMetadata,
}

impl GoogleText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Length in characters
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Insert `s` before the character at 0-based `index`
    pub fn insert(&mut self, index: usize, s: &str) -> Result<()> {
        let len = self.len();
        if index > len {
            return Err(Error::Reconstruct(format!(
                "insert at {} past end of {}-character document",
                index, len
            )));
        }
        let at = byte_offset(&self.text, index);
        self.text.insert_str(at, s);
        self.position = index + s.chars().count();
        self.record();
        Ok(())
    }

    /// Delete characters `start..end` (0-based, end exclusive)
    pub fn delete(&mut self, start: usize, end: usize) -> Result<()> {
        let len = self.len();
        if start > end || end > len {
            return Err(Error::Reconstruct(format!(
                "delete {}..{} outside {}-character document",
                start, end, len
            )));
        }
        let from = byte_offset(&self.text, start);
        let to = byte_offset(&self.text, end);
        self.text.replace_range(from..to, "");
        self.position = start;
        self.record();
        Ok(())
    }

    /// Apply one command in either encoding
    pub fn apply(&mut self, command: &Value) -> Result<()> {
        match command {
            Value::Object(_) => self.apply_google(command),
            Value::Array(items) if items.first().map_or(false, Value::is_string) => {
                self.apply_compact(items)
            }
            Value::Null => Ok(()),
            other => {
                warn!("Skipping unrecognised edit command: {}", other);
                Ok(())
            }
        }
    }

    fn apply_google(&mut self, command: &Value) -> Result<()> {
        let kind = command.get("ty").and_then(Value::as_str).unwrap_or("null");
        match kind {
            "is" => {
                let ibi = index_field(command, "ibi")?;
                let s = command.get("s").and_then(Value::as_str).unwrap_or_default();
                self.insert(one_based(ibi, "ibi")?, s)
            }
            "ds" => {
                let si = index_field(command, "si")?;
                let ei = index_field(command, "ei")?;
                self.delete(one_based(si, "si")?, ei)
            }
            "mlti" => {
                let nested = command
                    .get("mts")
                    .and_then(Value::as_array)
                    .ok_or_else(|| Error::Reconstruct("mlti command without mts".to_string()))?;
                for sub in nested {
                    self.apply(sub)?;
                }
                Ok(())
            }
            kind if NO_OP_COMMANDS.contains(&kind) => Ok(()),
            kind => {
                warn!("Unknown edit command kind '{}', skipped", kind);
                Ok(())
            }
        }
    }

    fn apply_compact(&mut self, items: &[Value]) -> Result<()> {
        let op = items[0].as_str().unwrap_or_default();
        match op {
            "insert" => {
                let s = items
                    .get(1)
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::Reconstruct("insert without text".to_string()))?;
                self.insert(tuple_index(items, 2)?, s)
            }
            "delete" => self.delete(tuple_index(items, 1)?, tuple_index(items, 2)?),
            other => {
                warn!("Unknown compact edit '{}', skipped", other);
                Ok(())
            }
        }
    }

    fn record(&mut self) {
        self.edit_metadata.cursor.push(self.position);
        self.edit_metadata.length.push(self.len());
    }
}

/// Apply `commands` in order to `doc`
pub fn command_list(mut doc: GoogleText, commands: &[Value]) -> Result<GoogleText> {
    for command in commands {
        doc.apply(command)?;
    }
    Ok(doc)
}

/// Edit commands out of a document history change log
///
/// Google's entries are arrays with the command first, followed by
/// timestamps and user ids. Compact tuples and bare command objects are
/// accepted too.
pub fn changelog_commands(changelog: &[Value]) -> Vec<Value> {
    changelog
        .iter()
        .filter_map(|entry| match entry {
            Value::Array(items) => match items.first() {
                Some(Value::String(_)) => Some(entry.clone()),
                Some(first @ (Value::Object(_) | Value::Array(_))) => Some(first.clone()),
                _ => None,
            },
            Value::Object(_) => Some(entry.clone()),
            _ => None,
        })
        .collect()
}

/// Rebuild a document from scratch from its change log
pub fn from_changelog(changelog: &[Value]) -> Result<GoogleText> {
    command_list(GoogleText::new(), &changelog_commands(changelog))
}

fn byte_offset(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len())
}

fn index_field(command: &Value, field: &str) -> Result<usize> {
    command
        .get(field)
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .ok_or_else(|| Error::Reconstruct(format!("command missing index '{}'", field)))
}

fn one_based(index: usize, field: &str) -> Result<usize> {
    index
        .checked_sub(1)
        .ok_or_else(|| Error::Reconstruct(format!("'{}' is 1-based, got 0", field)))
}

fn tuple_index(items: &[Value], at: usize) -> Result<usize> {
    items
        .get(at)
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .ok_or_else(|| Error::Reconstruct(format!("edit tuple missing index at {}", at)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compact_changelog() {
        let doc = from_changelog(&[json!(["insert", "A", 0]), json!(["insert", "B", 1])]).unwrap();
        assert_eq!(doc.text, "AB");
        assert_eq!(doc.position, 2);
        assert_eq!(doc.edit_metadata.cursor, vec![1, 2]);
        assert_eq!(doc.edit_metadata.length, vec![1, 2]);
    }

    #[test]
    fn test_google_insert_and_delete() {
        let doc = command_list(
            GoogleText::new(),
            &[
                json!({"ty": "is", "ibi": 1, "s": "Hello world"}),
                json!({"ty": "ds", "si": 6, "ei": 11}),
            ],
        )
        .unwrap();
        assert_eq!(doc.text, "Hello");
        assert_eq!(doc.position, 5);
    }

    #[test]
    fn test_mlti_and_no_ops() {
        let doc = command_list(
            GoogleText::new(),
            &[json!({"ty": "mlti", "mts": [
                {"ty": "is", "ibi": 1, "s": "ac"},
                {"ty": "as", "st": "text"},
                {"ty": "is", "ibi": 2, "s": "b"}
            ]})],
        )
        .unwrap();
        assert_eq!(doc.text, "abc");
        assert_eq!(doc.edit_metadata.length, vec![2, 3]);
    }

    #[test]
    fn test_history_entries_with_trailing_fields() {
        let changelog = vec![
            json!([{"ty": "is", "ibi": 1, "s": "x"}, 1700000000000u64, "user"]),
            json!([{"ty": "is", "ibi": 2, "s": "y"}, 1700000000001u64, "user"]),
        ];
        assert_eq!(from_changelog(&changelog).unwrap().text, "xy");
    }

    #[test]
    fn test_unknown_kind_is_skipped() {
        let doc = command_list(GoogleText::new(), &[json!({"ty": "zz"}), json!(["insert", "q", 0])]).unwrap();
        assert_eq!(doc.text, "q");
    }

    #[test]
    fn test_out_of_range_is_error() {
        assert!(matches!(
            command_list(GoogleText::new(), &[json!(["insert", "A", 3])]),
            Err(Error::Reconstruct(_))
        ));
        assert!(matches!(
            command_list(GoogleText::new(), &[json!({"ty": "ds", "si": 1, "ei": 2})]),
            Err(Error::Reconstruct(_))
        ));
    }

    #[test]
    fn test_multibyte_characters() {
        let doc = command_list(
            GoogleText::new(),
            &[json!(["insert", "héllo", 0]), json!(["delete", 1, 2]), json!(["insert", "e", 1])],
        )
        .unwrap();
        assert_eq!(doc.text, "hello");
    }
}
