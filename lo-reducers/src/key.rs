//! State key construction
//!
//! Keys look like `Internal,<reducer>,STUDENT:s1,doc_id:abc`: the state kind,
//! the reducer's fully-qualified name, then every key field as `name:value`
//! sorted by field name. The same inputs always give byte-identical keys, in
//! any process, which is what lets several workers share one store.

use crate::fields::{KeyDict, KeyStateType};

/// Build the store key for one reducer, key dictionary and state kind
///
/// ```
/// use lo_reducers::{make_key, KeyDict, KeyField, KeyStateType};
///
/// let mut dict = KeyDict::new();
/// dict.insert(KeyField::Student, "123");
/// assert_eq!(
///     make_key("some_module::reducer", &dict, KeyStateType::Internal),
///     "Internal,some_module::reducer,STUDENT:123"
/// );
/// ```
pub fn make_key(reducer_name: &str, key_dict: &KeyDict, state_type: KeyStateType) -> String {
    let mut entries: Vec<(&str, &str)> = key_dict
        .iter()
        .map(|(field, value)| (field.name(), value.as_str()))
        .collect();
    entries.sort_unstable();

    let mut parts = Vec::with_capacity(entries.len() + 2);
    parts.push(state_type.name().to_string());
    parts.push(reducer_name.to_string());
    for (name, value) in entries {
        parts.push(format!("{}:{}", name, value));
    }
    parts.join(",")
}
