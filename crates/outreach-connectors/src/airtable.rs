use outreach_core::{EngineError, Record, RecordPage, RecordSource, SourceProfile};
use serde::Deserialize;
use tracing::debug;

use crate::mailto::encode_uri_component;
use crate::transport_error;

pub const DEFAULT_AIRTABLE_BASE_URL: &str = "https://api.airtable.com";
pub const AIRTABLE_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct ListRecordsResponse {
    #[serde(default)]
    records: Vec<Record>,
    #[serde(default)]
    offset: Option<String>,
}

/// Decode one list-records response body.
///
/// # Errors
/// Returns `TransportFailure` when the body is not a list-records payload.
pub fn decode_page(body: &str) -> Result<RecordPage, EngineError> {
    let response = serde_json::from_str::<ListRecordsResponse>(body)
        .map_err(|err| EngineError::TransportFailure(format!("unexpected record page payload: {err}")))?;
    Ok(RecordPage { records: response.records, next_token: response.offset })
}

/// Paged reader for one Airtable table.
pub struct AirtableSource {
    agent: ureq::Agent,
    base_url: String,
    profile: SourceProfile,
}

impl AirtableSource {
    /// # Errors
    /// Returns `ConfigIncomplete` when the profile is missing a field.
    pub fn new(profile: SourceProfile) -> Result<Self, EngineError> {
        Self::with_base_url(profile, DEFAULT_AIRTABLE_BASE_URL)
    }

    /// # Errors
    /// Returns `ConfigIncomplete` when the profile is missing a field.
    pub fn with_base_url(profile: SourceProfile, base_url: &str) -> Result<Self, EngineError> {
        profile.validate()?;
        Ok(Self {
            agent: ureq::AgentBuilder::new().build(),
            base_url: base_url.trim_end_matches('/').to_string(),
            profile,
        })
    }

    fn table_url(&self) -> String {
        format!(
            "{}/v0/{}/{}",
            self.base_url,
            encode_uri_component(&self.profile.base_id),
            encode_uri_component(&self.profile.table_name)
        )
    }
}

impl RecordSource for AirtableSource {
    fn fetch_page(&mut self, token: Option<&str>) -> Result<RecordPage, EngineError> {
        let mut request = self
            .agent
            .get(&self.table_url())
            .set("Authorization", &format!("Bearer {}", self.profile.api_key))
            .query("pageSize", &AIRTABLE_PAGE_SIZE.to_string());
        if let Some(offset) = token {
            request = request.query("offset", offset);
        }

        debug!(table = %self.profile.table_name, has_offset = token.is_some(), "requesting record page");
        let response = request.call().map_err(|err| {
            transport_error(err, |code, response| format!("Error: {code} - {}", response.status_text()))
        })?;
        let body = response
            .into_string()
            .map_err(|err| EngineError::TransportFailure(format!("failed to read record page: {err}")))?;
        decode_page(&body)
    }
}
