use serde::{Deserialize, Serialize};

use crate::fields::{email_value, name_value, DEFAULT_DISPLAY_NAME};
use crate::filter::FilteredView;
use crate::record::{FieldMap, Record, RecordStore};
use crate::selection::SelectionSet;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub email: String,
    pub display_name: String,
    pub source_fields: FieldMap,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionTier {
    /// Base list came from explicitly selected records.
    Selection,
    /// Nothing was selected; records were matched by a name mentioned in the prompt.
    NameMention,
    /// Neither tier produced a base list.
    Unresolved,
}

impl ResolutionTier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Selection => "selection",
            Self::NameMention => "name_mention",
            Self::Unresolved => "unresolved",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resolution {
    pub tier: ResolutionTier,
    /// Records in the base list, including those later dropped for lacking an email.
    pub matched_records: usize,
    pub recipients: Vec<Recipient>,
}

impl Resolution {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    #[must_use]
    pub fn emails(&self) -> Vec<&str> {
        self.recipients.iter().map(|recipient| recipient.email.as_str()).collect()
    }
}

/// Convert one record into a recipient, or `None` when it has no usable email.
#[must_use]
pub fn recipient_from_record(record: &Record) -> Option<Recipient> {
    let email = email_value(&record.fields)?;
    Some(Recipient {
        email,
        display_name: name_value(&record.fields).unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string()),
        source_fields: record.fields.clone(),
    })
}

fn normalized_prompt(prompt: Option<&str>) -> Option<String> {
    prompt.filter(|text| !text.trim().is_empty()).map(str::to_lowercase)
}

fn mentioned_records<'a>(view: &FilteredView<'a>, lower_prompt: &str) -> Vec<(&'a Record, String)> {
    view.iter()
        .filter_map(|record| {
            let candidate = name_value(&record.fields)?.to_lowercase();
            lower_prompt.contains(candidate.as_str()).then_some((record, candidate))
        })
        .collect()
}

/// Distinct lower-cased names from the filtered view that the prompt mentions.
#[must_use]
pub fn mentioned_names(view: &FilteredView<'_>, prompt: &str) -> Vec<String> {
    let Some(lower_prompt) = normalized_prompt(Some(prompt)) else {
        return Vec::new();
    };

    let mut names: Vec<String> = Vec::new();
    for (_, name) in mentioned_records(view, &lower_prompt) {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Resolve the ordered recipient list for an action.
///
/// Explicitly selected records (taken from the full store) always win. Only when
/// the selection resolves to no record at all does a non-blank prompt get
/// scanned for names from the filtered view. Records without an email are
/// dropped silently in both tiers.
#[must_use]
pub fn resolve(
    store: &RecordStore,
    view: &FilteredView<'_>,
    selection: &SelectionSet,
    prompt: Option<&str>,
) -> Resolution {
    let selected: Vec<&Record> =
        store.records().iter().filter(|record| selection.contains(&record.id)).collect();

    let (tier, base) = if !selected.is_empty() {
        (ResolutionTier::Selection, selected)
    } else if let Some(lower_prompt) = normalized_prompt(prompt) {
        let mentioned: Vec<&Record> =
            mentioned_records(view, &lower_prompt).into_iter().map(|(record, _)| record).collect();
        if mentioned.is_empty() {
            (ResolutionTier::Unresolved, mentioned)
        } else {
            (ResolutionTier::NameMention, mentioned)
        }
    } else {
        (ResolutionTier::Unresolved, Vec::new())
    };

    Resolution {
        tier,
        matched_records: base.len(),
        recipients: base.into_iter().filter_map(recipient_from_record).collect(),
    }
}
