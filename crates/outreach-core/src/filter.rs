use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::record::Record;

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct FilterState {
    #[serde(default)]
    pub search_term: String,
    #[serde(default)]
    pub field_filters: BTreeMap<String, String>,
}

impl FilterState {
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.search_term.is_empty() || self.field_filters.values().any(|pattern| !pattern.is_empty())
    }

    /// Set the substring pattern for one field; an empty pattern removes the filter.
    pub fn set_field_filter(&mut self, field: impl Into<String>, pattern: impl Into<String>) {
        let field = field.into();
        let pattern = pattern.into();
        if pattern.is_empty() {
            self.field_filters.remove(&field);
        } else {
            self.field_filters.insert(field, pattern);
        }
    }

    pub fn clear(&mut self) {
        self.search_term.clear();
        self.field_filters.clear();
    }

    fn matches(&self, record: &Record, term: Option<&str>, patterns: &[(&str, String)]) -> bool {
        if let Some(term) = term {
            let any_field = record.fields.values().any(|value| value.render().to_lowercase().contains(term));
            if !any_field {
                return false;
            }
        }

        patterns
            .iter()
            .all(|(field, pattern)| record.fields.render(field).to_lowercase().contains(pattern.as_str()))
    }
}

/// Ordered subset of records passing the current search and field filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredView<'a> {
    records: Vec<&'a Record>,
}

impl<'a> FilteredView<'a> {
    #[must_use]
    pub fn records(&self) -> &[&'a Record] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Record> + '_ {
        self.records.iter().copied()
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
    pub fn ids(&self) -> Vec<&'a str> {
        self.records.iter().map(|record| record.id.as_str()).collect()
    }
}

/// Derive the filtered view for `state`.
///
/// Pure and total: the result depends only on the inputs, keeps input order, and
/// never fails. Passing an existing view back in narrows it further, so applying
/// the same state twice yields the same view.
pub fn apply<'a, I>(records: I, state: &FilterState) -> FilteredView<'a>
where
    I: IntoIterator<Item = &'a Record>,
{
    let term = (!state.search_term.is_empty()).then(|| state.search_term.to_lowercase());
    let patterns: Vec<(&str, String)> = state
        .field_filters
        .iter()
        .filter(|(_, pattern)| !pattern.is_empty())
        .map(|(field, pattern)| (field.as_str(), pattern.to_lowercase()))
        .collect();

    FilteredView {
        records: records
            .into_iter()
            .filter(|record| state.matches(record, term.as_deref(), &patterns))
            .collect(),
    }
}
