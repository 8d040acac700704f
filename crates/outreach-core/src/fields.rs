//! Field-name alias lists used to interpret records whose column names vary
//! from table to table.

use crate::record::FieldMap;

/// Display-name priority list; the first alias present with a non-empty value wins.
pub const NAME_ALIASES: [&str; 8] = [
    "FULL_NAME",
    "full_name",
    "Full Name",
    "Name",
    "name",
    "FIRST_NAME",
    "First Name",
    "first_name",
];

pub const CONTEXT_NAME_FIELDS: [&str; 9] = [
    "FULL_NAME",
    "full_name",
    "Full Name",
    "Name",
    "name",
    "FIRST_NAME",
    "First Name",
    "LAST_NAME",
    "Last Name",
];

pub const CONTEXT_EMAIL_FIELDS: [&str; 6] = ["EMAIL", "Email", "E-mail", "EMAIL1", "EMAIL2", "EMAIL3"];

pub const CONTEXT_LOCATION_FIELDS: [&str; 6] =
    ["PERSON_CITY", "PERSON_STATE", "PERSON_COUNTRY", "City", "State", "Country"];

pub const CONTEXT_COMPANY_FIELDS: [&str; 2] = ["COMPANY", "Company"];

pub const DEFAULT_DISPLAY_NAME: &str = "Client";

/// Fields retained when a record is slimmed for a generation payload, in output order.
pub fn context_allow_list() -> impl Iterator<Item = &'static str> {
    CONTEXT_NAME_FIELDS
        .into_iter()
        .chain(CONTEXT_EMAIL_FIELDS)
        .chain(CONTEXT_LOCATION_FIELDS)
        .chain(CONTEXT_COMPANY_FIELDS)
}

#[must_use]
pub fn is_email_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    lower.contains("email") || lower == "e-mail"
}

/// First non-empty value among [`NAME_ALIASES`].
#[must_use]
pub fn name_value(fields: &FieldMap) -> Option<String> {
    NAME_ALIASES
        .iter()
        .filter_map(|alias| fields.get(alias))
        .find(|value| !value.is_empty())
        .map(|value| value.render())
}

/// Value of the record's email field: the first field whose key looks like an
/// email column. Only that field is consulted, even when it is empty.
#[must_use]
pub fn email_value(fields: &FieldMap) -> Option<String> {
    let (_, value) = fields.iter().find(|(key, _)| is_email_key(key))?;
    let email = value.render().trim().to_string();
    if email.is_empty() {
        None
    } else {
        Some(email)
    }
}
