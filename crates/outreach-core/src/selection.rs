use serde::{Deserialize, Serialize};

use crate::record::RecordStore;

/// Record ids explicitly marked by the user, in the order they were marked.
///
/// Ids that no longer resolve against the record store are kept but inert.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(transparent)]
pub struct SelectionSet {
    ids: Vec<String>,
}

impl SelectionSet {
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|selected| selected == id)
    }

    /// Flip membership of `id`; returns whether it is selected afterwards.
    pub fn toggle(&mut self, id: &str) -> bool {
        if let Some(position) = self.ids.iter().position(|selected| selected == id) {
            self.ids.remove(position);
            false
        } else {
            self.ids.push(id.to_string());
            true
        }
    }

    /// Replace the selection with `ids`.
    pub fn select_all<'a, I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.ids.clear();
        for id in ids {
            if !self.contains(id) {
                self.ids.push(id.to_string());
            }
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Selected ids that still resolve to a record, in selection order.
    #[must_use]
    pub fn live_ids<'s>(&'s self, store: &RecordStore) -> Vec<&'s str> {
        self.ids.iter().map(String::as_str).filter(|id| store.contains(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FieldMap, Record};

    #[test]
    fn toggle_adds_then_removes() {
        let mut selection = SelectionSet::default();
        assert!(selection.toggle("rec1"));
        assert!(selection.toggle("rec2"));
        assert!(!selection.toggle("rec1"));
        assert_eq!(selection.ids(), &["rec2".to_string()]);
    }

    #[test]
    fn select_all_replaces_and_dedupes() {
        let mut selection = SelectionSet::default();
        selection.toggle("old");
        selection.select_all(["a", "b", "a"]);
        assert_eq!(selection.ids(), &["a".to_string(), "b".to_string()]);
        selection.clear();
        assert!(selection.is_empty());
    }

    #[test]
    fn stale_ids_are_inert() {
        let store = RecordStore::from_records(vec![Record::new("rec1", FieldMap::new())]);
        let mut selection = SelectionSet::default();
        selection.toggle("gone");
        selection.toggle("rec1");
        assert_eq!(selection.live_ids(&store), vec!["rec1"]);
        assert_eq!(selection.len(), 2);
    }
}
