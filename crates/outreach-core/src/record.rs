use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Separator used when a multi-valued field is rendered as text.
pub const LIST_SEPARATOR: &str = ",";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// Convert a raw JSON cell into a field value.
    ///
    /// `null` cells carry no value and yield `None`. Objects (attachments, linked
    /// record stubs) are kept as their compact JSON text so they stay searchable.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(flag) => Some(Self::Bool(*flag)),
            Value::Number(number) => Some(Self::Number(number.clone())),
            Value::String(text) => Some(Self::Text(text.clone())),
            Value::Array(items) => Some(Self::List(items.iter().filter_map(Self::from_json).collect())),
            Value::Object(_) => Some(Self::Text(value.to_string())),
        }
    }

    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Bool(flag) => flag.to_string(),
            Self::Number(number) => number.to_string(),
            Self::Text(text) => text.clone(),
            Self::List(items) => {
                items.iter().map(Self::render).collect::<Vec<_>>().join(LIST_SEPARATOR)
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Bool(_) | Self::Number(_) => false,
            Self::Text(text) => text.is_empty(),
            Self::List(items) => items.iter().all(Self::is_empty),
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Field name to value mapping that keeps the order fields arrived in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    entries: Vec<(String, FieldValue)>,
}

impl FieldMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, replacing an existing value in place.
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) -> Option<FieldValue> {
        let name = name.into();
        if let Some((_, existing)) = self.entries.iter_mut().find(|(key, _)| *key == name) {
            return Some(std::mem::replace(existing, value));
        }
        self.entries.push((name, value));
        None
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(key, _)| key == name).map(|(_, value)| value)
    }

    #[must_use]
    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Stringified value of one field; a missing field renders as the empty string.
    #[must_use]
    pub fn render(&self, name: &str) -> String {
        self.get(name).map(FieldValue::render).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &FieldValue> {
        self.entries.iter().map(|(_, value)| value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn from_json_object(object: &serde_json::Map<String, Value>) -> Self {
        object
            .iter()
            .filter_map(|(key, value)| FieldValue::from_json(value).map(|value| (key.clone(), value)))
            .collect()
    }
}

impl FromIterator<(String, FieldValue)> for FieldMap {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

impl<'de> Deserialize<'de> for FieldMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let object = serde_json::Map::<String, Value>::deserialize(deserializer)?;
        Ok(Self::from_json_object(&object))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub fields: FieldMap,
}

impl Record {
    #[must_use]
    pub fn new(id: impl Into<String>, fields: FieldMap) -> Self {
        Self { id: id.into(), fields }
    }
}

/// The canonical imported record set, in source order.
///
/// A store is only ever replaced as a whole; records are never merged into an
/// existing store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordStore {
    records: Vec<Record>,
}

impl RecordStore {
    #[must_use]
    pub fn from_records(records: Vec<Record>) -> Self {
        Self { records }
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|record| record.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Every field name seen across the store, in first-seen order.
    #[must_use]
    pub fn field_names(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut names = Vec::new();
        for record in &self.records {
            for key in record.fields.keys() {
                if seen.insert(key) {
                    names.push(key.to_string());
                }
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(json: &str) -> FieldMap {
        match serde_json::from_str::<FieldMap>(json) {
            Ok(map) => map,
            Err(err) => panic!("fixture should decode: {err}"),
        }
    }

    #[test]
    fn field_map_preserves_source_order_and_drops_nulls() {
        let map = fields(r#"{"Zeta": "z", "Alpha": null, "Email": "a@x.com", "Count": 3}"#);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["Zeta", "Email", "Count"]);
        assert_eq!(map.render("Count"), "3");
        assert_eq!(map.render("Alpha"), "");
    }

    #[test]
    fn list_values_render_joined() {
        let map = fields(r#"{"Tags": ["vip", "west", 7, true]}"#);
        assert_eq!(map.render("Tags"), "vip,west,7,true");
    }

    #[test]
    fn object_values_are_kept_as_json_text() {
        let map = fields(r#"{"Owner": {"name": "Dana"}}"#);
        assert_eq!(map.render("Owner"), r#"{"name":"Dana"}"#);
    }

    #[test]
    fn empty_text_and_empty_lists_are_empty_values() {
        assert!(FieldValue::from("").is_empty());
        assert!(FieldValue::List(vec![FieldValue::from("")]).is_empty());
        assert!(!FieldValue::Bool(false).is_empty());
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut map = FieldMap::new();
        map.insert("A", FieldValue::from("1"));
        map.insert("B", FieldValue::from("2"));
        let previous = map.insert("A", FieldValue::from("3"));
        assert_eq!(previous, Some(FieldValue::from("1")));
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(map.render("A"), "3");
    }

    #[test]
    fn field_names_are_union_in_first_seen_order() {
        let store = RecordStore::from_records(vec![
            Record::new("rec1", fields(r#"{"Name": "A", "Email": "a@x.com"}"#)),
            Record::new("rec2", fields(r#"{"Company": "Acme", "Name": "B"}"#)),
        ]);
        assert_eq!(store.field_names(), vec!["Name", "Email", "Company"]);
        assert!(store.contains("rec2"));
        assert!(!store.contains("rec3"));
    }
}
