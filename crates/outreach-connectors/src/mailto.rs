use std::io::Write;

use outreach_core::{EngineError, MailDispatcher, OutboundMessage};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::info;

/// Characters `encodeURIComponent` leaves untouched.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[must_use]
pub fn encode_uri_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// Build the `mailto:` URI for a message.
///
/// # Errors
/// Returns `DispatchPreconditionFailure` when no recipient has an address.
pub fn compose_mailto(message: &OutboundMessage) -> Result<String, EngineError> {
    let to = message
        .recipient_emails
        .iter()
        .map(|email| email.trim())
        .filter(|email| !email.is_empty())
        .collect::<Vec<_>>()
        .join(",");
    if to.is_empty() {
        return Err(EngineError::DispatchPreconditionFailure("No valid email addresses found.".to_string()));
    }

    Ok(format!(
        "mailto:{to}?subject={}&body={}",
        encode_uri_component(&message.subject),
        encode_uri_component(&message.body)
    ))
}

/// Hands a campaign to the desktop mail client by emitting a `mailto:` URI.
pub struct MailtoDispatcher<W: Write> {
    sink: W,
}

impl<W: Write> MailtoDispatcher<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

impl<W: Write> MailDispatcher for MailtoDispatcher<W> {
    fn dispatch(&mut self, message: &OutboundMessage) -> Result<(), EngineError> {
        let uri = compose_mailto(message)?;
        writeln!(self.sink, "{uri}")
            .and_then(|()| self.sink.flush())
            .map_err(|err| EngineError::TransportFailure(format!("failed to hand off mailto link: {err}")))?;
        info!(recipients = message.recipient_emails.len(), "opened mail client link");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(emails: &[&str]) -> OutboundMessage {
        OutboundMessage {
            recipient_emails: emails.iter().map(|email| (*email).to_string()).collect(),
            subject: "Spring & Summer: 20% off!".to_string(),
            body: "Hi there,\nsee you (soon) at café".to_string(),
        }
    }

    #[test]
    fn encoding_matches_uri_component_rules() {
        assert_eq!(encode_uri_component("a b&c=d/e?f"), "a%20b%26c%3Dd%2Fe%3Ff");
        assert_eq!(encode_uri_component("keep-_.!~*'()"), "keep-_.!~*'()");
        assert_eq!(encode_uri_component("é"), "%C3%A9");
    }

    #[test]
    fn mailto_joins_recipients_and_encodes_parts() {
        let uri = compose_mailto(&message(&["a@x.com", " ", "b@x.com"]))
            .unwrap_or_else(|err| panic!("compose: {err}"));
        assert_eq!(
            uri,
            "mailto:a@x.com,b@x.com?subject=Spring%20%26%20Summer%3A%2020%25%20off!&body=Hi%20there%2C%0Asee%20you%20(soon)%20at%20caf%C3%A9"
        );
    }

    #[test]
    fn empty_recipients_are_a_precondition_failure() {
        assert!(matches!(compose_mailto(&message(&[])), Err(EngineError::DispatchPreconditionFailure(_))));
    }

    #[test]
    fn dispatcher_writes_one_line_to_sink() {
        let mut dispatcher = MailtoDispatcher::new(Vec::new());
        if let Err(err) = dispatcher.dispatch(&message(&["a@x.com"])) {
            panic!("dispatch failed: {err}");
        }
        let written = String::from_utf8(dispatcher.into_inner()).unwrap_or_else(|err| panic!("utf8: {err}"));
        assert!(written.starts_with("mailto:a@x.com?subject="));
        assert!(written.ends_with('\n'));
    }
}
