use serde::{Deserialize, Serialize};

use crate::fields::context_allow_list;
use crate::filter::FilteredView;
use crate::record::{FieldMap, Record, RecordStore};
use crate::selection::SelectionSet;

pub const DEFAULT_CONTEXT_CAP: usize = 80;

/// Upper bounds on how many records a generation payload may carry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct ContextCaps {
    pub filtered: usize,
    pub selected: usize,
}

impl Default for ContextCaps {
    fn default() -> Self {
        Self { filtered: DEFAULT_CONTEXT_CAP, selected: DEFAULT_CONTEXT_CAP }
    }
}

/// A record reduced to its allow-listed fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlimRecord {
    pub id: String,
    pub fields: FieldMap,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CampaignContext {
    pub total_record_count: usize,
    pub filtered_count: usize,
    pub selected_count: usize,
    pub selected_ids: Vec<String>,
    pub cap: usize,
    pub filtered_sample: Vec<SlimRecord>,
    pub selected_sample: Vec<SlimRecord>,
}

impl CampaignContext {
    /// Whether either sample is smaller than the population it was drawn from.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.filtered_sample.len() < self.filtered_count
            || self.selected_sample.len() < self.selected_count
    }
}

/// Keep only allow-listed fields, in allow-list order.
#[must_use]
pub fn slim_record(record: &Record) -> SlimRecord {
    SlimRecord {
        id: record.id.clone(),
        fields: context_allow_list()
            .filter_map(|name| record.fields.get(name).map(|value| (name.to_string(), value.clone())))
            .collect(),
    }
}

/// Snapshot the filtered and selected records for one generation request.
///
/// Counts are always the true totals; only the samples are capped. The
/// selected sample is drawn from the filtered view, so selected records hidden
/// by the current filters are counted but not sampled.
#[must_use]
pub fn build_context(
    store: &RecordStore,
    view: &FilteredView<'_>,
    selection: &SelectionSet,
    caps: ContextCaps,
) -> CampaignContext {
    let selected_ids: Vec<String> =
        selection.live_ids(store).into_iter().map(str::to_string).collect();

    CampaignContext {
        total_record_count: store.len(),
        filtered_count: view.len(),
        selected_count: selected_ids.len(),
        selected_ids,
        cap: caps.filtered,
        filtered_sample: view.iter().take(caps.filtered).map(slim_record).collect(),
        selected_sample: view
            .iter()
            .filter(|record| selection.contains(&record.id))
            .take(caps.selected)
            .map(slim_record)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{apply, FilterState};
    use crate::record::FieldValue;

    fn record(id: &str, entries: &[(&str, &str)]) -> Record {
        Record::new(
            id,
            entries.iter().map(|(key, value)| ((*key).to_string(), FieldValue::from(*value))).collect(),
        )
    }

    fn store(size: usize) -> RecordStore {
        RecordStore::from_records(
            (0..size)
                .map(|index| {
                    let city = if index % 2 == 0 { "Seattle" } else { "Boise" };
                    record(
                        &format!("rec{index}"),
                        &[
                            ("Notes", "private"),
                            ("Name", &format!("Client {index}")),
                            ("City", city),
                            ("Email", &format!("c{index}@example.com")),
                        ],
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn sample_is_capped_but_counts_are_true() {
        let store = store(10);
        let state = FilterState { search_term: "seattle".to_string(), ..FilterState::default() };
        let view = apply(store.records(), &state);
        assert_eq!(view.len(), 5);

        let context = build_context(&store, &view, &SelectionSet::default(), ContextCaps { filtered: 2, selected: 2 });
        assert_eq!(context.filtered_sample.len(), 2);
        assert_eq!(context.filtered_count, 5);
        assert_eq!(context.total_record_count, 10);
        assert_eq!(context.cap, 2);
        assert!(context.is_truncated());
    }

    #[test]
    fn slim_record_keeps_only_allow_listed_fields() {
        let slim = slim_record(&record("rec1", &[("Notes", "x"), ("City", "Reno"), ("Name", "Ana")]));
        assert_eq!(slim.fields.keys().collect::<Vec<_>>(), vec!["Name", "City"]);
        assert_eq!(slim.id, "rec1");
    }

    #[test]
    fn selected_sample_comes_from_filtered_view_in_view_order() {
        let store = store(6);
        let state = FilterState { search_term: "seattle".to_string(), ..FilterState::default() };
        let view = apply(store.records(), &state);
        let mut selection = SelectionSet::default();
        selection.toggle("rec4");
        selection.toggle("rec1");
        selection.toggle("rec0");
        selection.toggle("missing");

        let context = build_context(&store, &view, &selection, ContextCaps::default());
        assert_eq!(context.selected_count, 3);
        assert_eq!(context.selected_ids, vec!["rec4", "rec1", "rec0"]);
        let sampled = context.selected_sample.iter().map(|slim| slim.id.as_str()).collect::<Vec<_>>();
        assert_eq!(sampled, vec!["rec0", "rec4"]);
    }

    #[test]
    fn context_serializes_with_camel_case_keys() {
        let store = store(1);
        let view = apply(store.records(), &FilterState::default());
        let context = build_context(&store, &view, &SelectionSet::default(), ContextCaps::default());
        let json = serde_json::to_value(&context).unwrap_or_else(|err| panic!("serialize context: {err}"));
        assert_eq!(json["totalRecordCount"], 1);
        assert_eq!(json["filteredSample"][0]["fields"]["Email"], "c0@example.com");
        assert!(json.get("filtered_sample").is_none());
    }
}
