//! HTTP and desktop-mail implementations of the engine's collaborator traits.

mod airtable;
mod mailto;
mod openai;

pub use airtable::{decode_page, AirtableSource, AIRTABLE_PAGE_SIZE, DEFAULT_AIRTABLE_BASE_URL};
pub use mailto::{compose_mailto, encode_uri_component, MailtoDispatcher};
pub use openai::{extract_content, OpenAiChat, DEFAULT_OPENAI_BASE_URL, GENERATION_TEMPERATURE};

use outreach_core::EngineError;

/// Map a failed HTTP call into the engine's transport error.
fn transport_error(err: ureq::Error, status_message: impl FnOnce(u16, ureq::Response) -> String) -> EngineError {
    match err {
        ureq::Error::Status(code, response) => EngineError::TransportFailure(status_message(code, response)),
        ureq::Error::Transport(transport) => EngineError::TransportFailure(transport.to_string()),
    }
}
