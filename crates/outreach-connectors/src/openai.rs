use outreach_core::{EngineError, GenerationCredential, GenerationRequest, TextGenerator};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::transport_error;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const GENERATION_TEMPERATURE: f64 = 0.7;

const NO_CONTENT_MESSAGE: &str = "No content returned from the generation service";

/// Pull the first choice's message text out of a chat-completions body.
///
/// # Errors
/// Returns `TransportFailure` when the body carries no non-blank content.
pub fn extract_content(body: &Value) -> Result<String, EngineError> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|content| !content.is_empty())
        .map(str::to_string)
        .ok_or_else(|| EngineError::TransportFailure(NO_CONTENT_MESSAGE.to_string()))
}

fn error_message(code: u16, status_text: &str, body: Option<&Value>) -> String {
    body.and_then(|body| body.pointer("/error/message"))
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
        .map_or_else(|| format!("Generation API error: {code} {status_text}"), str::to_string)
}

/// Chat-completions client.
pub struct OpenAiChat {
    agent: ureq::Agent,
    base_url: String,
    credential: GenerationCredential,
}

impl OpenAiChat {
    /// # Errors
    /// Returns `ConfigIncomplete` when the credential is missing a field.
    pub fn new(credential: GenerationCredential) -> Result<Self, EngineError> {
        Self::with_base_url(credential, DEFAULT_OPENAI_BASE_URL)
    }

    /// # Errors
    /// Returns `ConfigIncomplete` when the credential is missing a field.
    pub fn with_base_url(credential: GenerationCredential, base_url: &str) -> Result<Self, EngineError> {
        credential.validate()?;
        Ok(Self {
            agent: ureq::AgentBuilder::new().build(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credential,
        })
    }

    #[must_use]
    pub fn request_body(&self, request: &GenerationRequest) -> Value {
        json!({
            "model": self.credential.model,
            "messages": request.messages(),
            "temperature": GENERATION_TEMPERATURE,
        })
    }
}

impl TextGenerator for OpenAiChat {
    fn generate(&mut self, request: &GenerationRequest) -> Result<String, EngineError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!(model = %self.credential.model, messages = request.messages().len(), "sending generation request");

        let response = self
            .agent
            .post(&url)
            .set("Authorization", &format!("Bearer {}", self.credential.api_key))
            .send_json(self.request_body(request))
            .map_err(|err| {
                transport_error(err, |code, response| {
                    let status_text = response.status_text().to_string();
                    let body = response.into_json::<Value>().ok();
                    error_message(code, &status_text, body.as_ref())
                })
            });

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "generation request failed");
                return Err(err);
            }
        };

        let body = response
            .into_json::<Value>()
            .map_err(|err| EngineError::TransportFailure(format!("failed to decode generation response: {err}")))?;
        extract_content(&body)
    }
}

#[cfg(test)]
mod tests {
    use outreach_core::ChatMessage;

    use super::*;

    #[test]
    fn content_is_trimmed() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "  hello \n"}}]});
        assert_eq!(extract_content(&body).ok().as_deref(), Some("hello"));
    }

    #[test]
    fn missing_or_blank_content_is_transport_failure() {
        for body in [json!({}), json!({"choices": []}), json!({"choices": [{"message": {"content": "  "}}]})] {
            match extract_content(&body) {
                Err(EngineError::TransportFailure(message)) => assert_eq!(message, NO_CONTENT_MESSAGE),
                other => panic!("expected transport failure, got {other:?}"),
            }
        }
    }

    #[test]
    fn api_error_message_is_preferred() {
        let body = json!({"error": {"message": "Incorrect API key provided"}});
        assert_eq!(error_message(401, "Unauthorized", Some(&body)), "Incorrect API key provided");
        assert_eq!(error_message(503, "Service Unavailable", None), "Generation API error: 503 Service Unavailable");
    }

    #[test]
    fn request_body_carries_model_temperature_and_ordered_messages() {
        let chat = OpenAiChat::new(GenerationCredential::new("sk-test"))
            .unwrap_or_else(|err| panic!("build client: {err}"));
        let request = GenerationRequest {
            system: "sys".to_string(),
            context: "ctx".to_string(),
            history: vec![ChatMessage::new("assistant", "earlier")],
            message: Some("now".to_string()),
        };
        let body = chat.request_body(&request);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["temperature"], 0.7);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][3]["content"], "now");
    }

    #[test]
    fn blank_key_is_config_incomplete() {
        assert!(matches!(
            OpenAiChat::new(GenerationCredential::default()),
            Err(EngineError::ConfigIncomplete(_))
        ));
    }
}
