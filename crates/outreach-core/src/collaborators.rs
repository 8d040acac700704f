//! Seams to the outside world: the paged record source, the text generator,
//! and the mail client. Implementations live outside this crate.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EngineError;
use crate::record::Record;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPage {
    pub records: Vec<Record>,
    pub next_token: Option<String>,
}

pub trait RecordSource {
    /// Fetch one page; `token` is `None` for the first page.
    ///
    /// # Errors
    /// Returns `TransportFailure` when the page cannot be read.
    fn fetch_page(&mut self, token: Option<&str>) -> Result<RecordPage, EngineError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportOutcome {
    pub records: Vec<Record>,
    pub page_count: usize,
}

/// Read every page from `source`, strictly one after another.
///
/// An empty continuation token ends the sequence. A token the source already
/// returned would loop forever and is reported as a transport failure.
///
/// # Errors
/// Propagates the first page failure; nothing fetched so far is returned.
pub fn fetch_all_pages(source: &mut dyn RecordSource) -> Result<ImportOutcome, EngineError> {
    let mut outcome = ImportOutcome::default();
    let mut seen_tokens: Vec<String> = Vec::new();
    let mut token: Option<String> = None;

    loop {
        let page = source.fetch_page(token.as_deref())?;
        outcome.page_count += 1;
        debug!(page = outcome.page_count, records = page.records.len(), "fetched record page");
        outcome.records.extend(page.records);

        match page.next_token.filter(|next| !next.is_empty()) {
            None => break,
            Some(next) if seen_tokens.contains(&next) => {
                return Err(EngineError::TransportFailure(format!(
                    "record source repeated continuation token `{next}`"
                )));
            }
            Some(next) => {
                seen_tokens.push(next.clone());
                token = Some(next);
            }
        }
    }

    Ok(outcome)
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: &str, content: &str) -> Self {
        Self { role: role.to_string(), content: content.to_string() }
    }
}

/// One generation call: instructions, a context payload, prior turns, and an
/// optional trailing user message.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub context: String,
    pub history: Vec<ChatMessage>,
    pub message: Option<String>,
}

impl GenerationRequest {
    /// Messages in wire order: system, context, history, then the new message.
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 3);
        messages.push(ChatMessage::new("system", &self.system));
        messages.push(ChatMessage::new("user", &self.context));
        messages.extend(self.history.iter().cloned());
        if let Some(message) = &self.message {
            messages.push(ChatMessage::new("user", message));
        }
        messages
    }
}

pub trait TextGenerator {
    /// # Errors
    /// Returns `TransportFailure` when the call fails or returns no content.
    fn generate(&mut self, request: &GenerationRequest) -> Result<String, EngineError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub recipient_emails: Vec<String>,
    pub subject: String,
    pub body: String,
}

pub trait MailDispatcher {
    /// # Errors
    /// Returns `TransportFailure` when the message cannot be handed off.
    fn dispatch(&mut self, message: &OutboundMessage) -> Result<(), EngineError>;
}
