//! Instruction text and request assembly for the two generation calls.

use serde::Serialize;

use crate::collaborators::{ChatMessage, GenerationRequest};
use crate::context::CampaignContext;
use crate::error::EngineError;
use crate::recipient::Recipient;

pub const CAMPAIGN_SYSTEM_PROMPT: &str = r#"You are an AI assistant specialized in writing professional and personalized email campaigns.
You will receive high-level instructions from the user about an email campaign to send to a list of clients.

Output MUST be valid JSON with exactly this structure:
{
  "subject": "string",
  "previewText": "string",
  "bodyHtml": "string",
  "bodyText": "string"
}

- subject: catchy subject line
- previewText: short preview line
- bodyHtml: HTML email body (<p>, <strong>, <ul>, etc.)
- bodyText: same content as plain text
Do NOT include backticks, markdown fences, or anything other than the JSON."#;

pub const CHAT_ERROR_PREFIX: &str =
    "I encountered an error while responding. Please try again or check your API key.\n\nDetails: ";

pub const CAMPAIGN_ERROR_PREFIX: &str = "I encountered an error while generating the email campaign.\n\nDetails: ";

pub const CAMPAIGN_READY_MESSAGE: &str =
    "I generated an email campaign for the chosen recipients. You can review it in the preview panel.";

pub const NO_RECIPIENTS_GUIDANCE: &str = "Please select at least one client using the checkboxes, or clearly mention which client(s) you want (for example, \u{201c}send an email to Tina Cheng\u{201d}) before asking me to draft a campaign.";

#[must_use]
pub fn chat_system_prompt(cap: usize) -> String {
    format!(
        "You are a helpful assistant for client outreach and marketing. You will be given a JSON \"client_db_context\" that contains summary information and up to {cap} filtered clients, each with only key fields (names, emails, company, location). Use it to answer questions. If the user asks about clients beyond what you see, say that you only have access to the first {cap} filtered clients."
    )
}

fn to_pretty_json<T: Serialize>(value: &T) -> Result<String, EngineError> {
    serde_json::to_string_pretty(value)
        .map_err(|err| EngineError::Validation(format!("failed to encode generation payload: {err}")))
}

/// # Errors
/// Returns `Validation` if the context cannot be encoded.
pub fn chat_request(
    context: &CampaignContext,
    history: Vec<ChatMessage>,
    message: &str,
) -> Result<GenerationRequest, EngineError> {
    Ok(GenerationRequest {
        system: chat_system_prompt(context.cap),
        context: format!(
            "Here is the current client database context (up to {} filtered clients):\n{}",
            context.cap,
            to_pretty_json(context)?
        ),
        history,
        message: Some(message.to_string()),
    })
}

#[derive(Debug, Serialize)]
struct RecipientSample<'a> {
    index: usize,
    name: &'a str,
    email: &'a str,
}

/// Build the campaign request: instructions, a numbered sample of at most
/// `sample_cap` recipients, and the names the prompt mentioned.
///
/// # Errors
/// Returns `Validation` if the payload cannot be encoded.
pub fn campaign_request(
    prompt: &str,
    recipients: &[Recipient],
    sample_cap: usize,
    mentioned_names: &[String],
) -> Result<GenerationRequest, EngineError> {
    let sample = recipients
        .iter()
        .take(sample_cap)
        .enumerate()
        .map(|(index, recipient)| RecipientSample {
            index: index + 1,
            name: &recipient.display_name,
            email: &recipient.email,
        })
        .collect::<Vec<_>>();
    let names = serde_json::to_string(mentioned_names)
        .map_err(|err| EngineError::Validation(format!("failed to encode mentioned names: {err}")))?;

    Ok(GenerationRequest {
        system: CAMPAIGN_SYSTEM_PROMPT.to_string(),
        context: format!(
            "User instructions: {prompt}\n\nSample of recipients (up to {sample_cap}):\n{}\n\nMentioned client names: {names}",
            to_pretty_json(&sample)?
        ),
        history: Vec::new(),
        message: None,
    })
}
