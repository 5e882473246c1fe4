//! Key fields and scopes
//!
//! A scope lists the dimensions that partition one reducer's state. Fixed
//! dimensions (the student) are resolved once per consumer session; event
//! dimensions (a document id) are read per event from the dispatch metadata.

use lo_common::{AdditionalMetadata, SessionMetadata};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// One dimension of a scope
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyField {
    /// The student, resolved from session authentication
    Student,
    /// Read per event from the named dispatch-metadata slot
    Event(String),
}

impl KeyField {
    pub fn event(name: impl Into<String>) -> Self {
        KeyField::Event(name.into())
    }

    /// Name used when rendering the field into a state key
    pub fn name(&self) -> &str {
        match self {
            KeyField::Student => "STUDENT",
            KeyField::Event(name) => name,
        }
    }

    pub fn is_event_derived(&self) -> bool {
        matches!(self, KeyField::Event(_))
    }
}

/// Internal (reducer-private) or external (published) state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyStateType {
    Internal,
    External,
}

impl KeyStateType {
    /// Capitalised tag leading every state key
    pub fn name(&self) -> &'static str {
        match self {
            KeyStateType::Internal => "Internal",
            KeyStateType::External => "External",
        }
    }
}

/// Ordered, immutable set of key fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    fields: Arc<[KeyField]>,
}

impl Scope {
    /// Build a scope; repeated fields are kept once
    pub fn new(fields: impl IntoIterator<Item = KeyField>) -> Self {
        let mut unique: Vec<KeyField> = Vec::new();
        for field in fields {
            if !unique.contains(&field) {
                unique.push(field);
            }
        }
        Self {
            fields: unique.into(),
        }
    }

    /// Per-student state
    pub fn student() -> Self {
        Self::new([KeyField::Student])
    }

    /// Per-student, per-document state
    pub fn student_document() -> Self {
        Self::new([KeyField::Student, KeyField::event("doc_id")])
    }

    pub fn fields(&self) -> &[KeyField] {
        &self.fields
    }

    pub fn contains(&self, field: &KeyField) -> bool {
        self.fields.contains(field)
    }

    /// Resolve the fields known before any event arrives
    pub fn resolve_fixed(&self, session: &SessionMetadata) -> KeyDict {
        let mut dict = KeyDict::new();
        if self.contains(&KeyField::Student) {
            dict.insert(KeyField::Student, session.student_id());
        }
        dict
    }

    /// Complete `fixed` with event-derived fields for one event
    ///
    /// Returns `None` when some field cannot be resolved: the event is out of
    /// scope for this reducer.
    pub fn resolve_event(&self, fixed: &KeyDict, additional: &AdditionalMetadata) -> Option<KeyDict> {
        let mut dict = fixed.clone();
        for field in self.fields.iter() {
            if dict.contains(field) {
                continue;
            }
            match field {
                KeyField::Event(slot) => {
                    let value = additional.get(slot)?;
                    dict.insert(field.clone(), value);
                }
                KeyField::Student => return None,
            }
        }
        Some(dict)
    }
}

/// Concrete values for a scope's fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyDict(HashMap<KeyField, String>);

impl KeyDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: KeyField, value: impl Into<String>) {
        self.0.insert(field, value.into());
    }

    pub fn get(&self, field: &KeyField) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &KeyField) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&KeyField, &String)> {
        self.0.iter()
    }
}

impl FromIterator<(KeyField, String)> for KeyDict {
    fn from_iter<T: IntoIterator<Item = (KeyField, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
