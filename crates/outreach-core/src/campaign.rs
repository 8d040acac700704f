use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::collaborators::OutboundMessage;
use crate::error::EngineError;
use crate::recipient::Recipient;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CampaignId(pub Ulid);

impl CampaignId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for CampaignId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CampaignId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The four message parts a generation response must supply.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CampaignDraft {
    pub subject: String,
    pub preview_text: String,
    pub body_html: String,
    pub body_text: String,
}

impl CampaignDraft {
    /// Fields may be empty strings, but the message needs a body in one form.
    ///
    /// # Errors
    /// Returns `MalformedResponse` when both bodies are blank.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.body_text.trim().is_empty() && self.body_html.trim().is_empty() {
            return Err(EngineError::MalformedResponse("campaign has neither bodyText nor bodyHtml".to_string()));
        }
        Ok(())
    }

    /// Body handed to the mail collaborator: plain text, else HTML.
    #[must_use]
    pub fn dispatch_body(&self) -> &str {
        if self.body_text.trim().is_empty() {
            &self.body_html
        } else {
            &self.body_text
        }
    }
}

fn decode_draft(text: &str) -> Result<CampaignDraft, EngineError> {
    let draft = serde_json::from_str::<CampaignDraft>(text)
        .map_err(|err| EngineError::MalformedResponse(err.to_string()))?;
    draft.validate()?;
    Ok(draft)
}

/// Largest `{ ... }` span in `raw`, from the first open brace to the last close brace.
fn brace_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

/// Parse an untrusted generation response into a campaign draft.
///
/// The whole text is decoded first. When that fails, the largest brace span is
/// decoded instead, which recovers responses wrapped in prose or code fences.
/// Missing fields are never defaulted.
///
/// # Errors
/// Returns `MalformedResponse` when neither attempt yields a complete draft.
pub fn parse_campaign_response(raw: &str) -> Result<CampaignDraft, EngineError> {
    let strict_err = match decode_draft(raw.trim()) {
        Ok(draft) => return Ok(draft),
        Err(err) => err,
    };

    match brace_span(raw) {
        Some(span) if span.len() < raw.trim().len() => decode_draft(span),
        Some(_) => Err(strict_err),
        None => Err(EngineError::MalformedResponse("no JSON object found in response".to_string())),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Campaign {
    pub id: CampaignId,
    #[serde(flatten)]
    pub draft: CampaignDraft,
    pub recipients: Vec<Recipient>,
}

impl Campaign {
    #[must_use]
    pub fn new(draft: CampaignDraft, recipients: Vec<Recipient>) -> Self {
        Self { id: CampaignId::new(), draft, recipients }
    }

    #[must_use]
    pub fn outbound_message(&self) -> OutboundMessage {
        OutboundMessage {
            recipient_emails: self.recipients.iter().map(|recipient| recipient.email.clone()).collect(),
            subject: self.draft.subject.clone(),
            body: self.draft.dispatch_body().to_string(),
        }
    }
}

/// Lifecycle of the single current campaign.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CampaignState {
    #[default]
    NoCampaign,
    Generating {
        prompt: String,
        recipients: Vec<Recipient>,
        /// Preview on display when generation started; restored if this run fails.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous: Option<Campaign>,
    },
    PreviewReady {
        campaign: Campaign,
    },
    Dispatched {
        campaign: Campaign,
    },
    Discarded {
        campaign_id: CampaignId,
    },
    Failed {
        reason: String,
    },
}

impl CampaignState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoCampaign => "no_campaign",
            Self::Generating { .. } => "generating",
            Self::PreviewReady { .. } => "preview_ready",
            Self::Dispatched { .. } => "dispatched",
            Self::Discarded { .. } => "discarded",
            Self::Failed { .. } => "failed",
        }
    }

    #[must_use]
    pub fn is_generating(&self) -> bool {
        matches!(self, Self::Generating { .. })
    }

    /// The campaign on display, if any.
    #[must_use]
    pub fn campaign(&self) -> Option<&Campaign> {
        match self {
            Self::PreviewReady { campaign } | Self::Dispatched { campaign } => Some(campaign),
            _ => None,
        }
    }

    /// Enter `Generating`. A previous failure or finished campaign is left behind;
    /// a campaign in preview is held until the new one is ready.
    ///
    /// # Errors
    /// Returns `OperationInFlight` while a generation is running and
    /// `NoRecipientsResolved` when `recipients` is empty; the state is unchanged in both cases.
    pub fn begin(&mut self, prompt: &str, recipients: Vec<Recipient>) -> Result<(), EngineError> {
        if self.is_generating() {
            return Err(EngineError::OperationInFlight("a campaign is already being generated".to_string()));
        }
        if recipients.is_empty() {
            return Err(EngineError::NoRecipientsResolved(NO_RECIPIENTS_MESSAGE.to_string()));
        }
        let previous = match std::mem::take(self) {
            Self::PreviewReady { campaign } => Some(campaign),
            _ => None,
        };
        *self = Self::Generating { prompt: prompt.to_string(), recipients, previous };
        Ok(())
    }

    /// Settle a running generation with the parser's verdict.
    ///
    /// On failure a held preview is put back; otherwise the state becomes `Failed`.
    ///
    /// # Errors
    /// Returns `Validation` when nothing is generating, otherwise the failure passed in.
    pub fn complete(&mut self, outcome: Result<CampaignDraft, EngineError>) -> Result<Campaign, EngineError> {
        let (recipients, previous) = match std::mem::take(self) {
            Self::Generating { recipients, previous, .. } => (recipients, previous),
            other => {
                *self = other;
                return Err(EngineError::Validation("no campaign generation is in flight".to_string()));
            }
        };

        match outcome {
            Ok(draft) => {
                let campaign = Campaign::new(draft, recipients);
                *self = Self::PreviewReady { campaign: campaign.clone() };
                Ok(campaign)
            }
            Err(err) => {
                *self = match previous {
                    Some(campaign) => Self::PreviewReady { campaign },
                    None => Self::Failed { reason: err.detail().to_string() },
                };
                Err(err)
            }
        }
    }

    /// The previewed campaign, checked for dispatch.
    ///
    /// # Errors
    /// Returns `DispatchPreconditionFailure` unless a complete campaign with at
    /// least one recipient is in preview.
    pub fn ready_for_dispatch(&self) -> Result<&Campaign, EngineError> {
        let Self::PreviewReady { campaign } = self else {
            return Err(EngineError::DispatchPreconditionFailure(format!(
                "no campaign preview to send (state: {})",
                self.as_str()
            )));
        };
        if campaign.recipients.is_empty() {
            return Err(EngineError::DispatchPreconditionFailure("campaign has no recipients".to_string()));
        }
        campaign
            .draft
            .validate()
            .map_err(|err| EngineError::DispatchPreconditionFailure(err.detail().to_string()))?;
        Ok(campaign)
    }

    /// # Errors
    /// Same preconditions as [`CampaignState::ready_for_dispatch`].
    pub fn mark_dispatched(&mut self) -> Result<(), EngineError> {
        self.ready_for_dispatch()?;
        *self = match std::mem::take(self) {
            Self::PreviewReady { campaign } => Self::Dispatched { campaign },
            other => other,
        };
        Ok(())
    }

    /// # Errors
    /// Returns `Validation` unless a campaign is in preview.
    pub fn discard(&mut self) -> Result<CampaignId, EngineError> {
        match self {
            Self::PreviewReady { campaign } => {
                let campaign_id = campaign.id;
                *self = Self::Discarded { campaign_id };
                Ok(campaign_id)
            }
            other => Err(EngineError::Validation(format!("no campaign preview to discard (state: {})", other.as_str()))),
        }
    }

    /// # Errors
    /// Returns `Validation` unless the last generation failed.
    pub fn acknowledge(&mut self) -> Result<(), EngineError> {
        if matches!(self, Self::Failed { .. }) {
            *self = Self::NoCampaign;
            Ok(())
        } else {
            Err(EngineError::Validation(format!("no failed generation to acknowledge (state: {})", self.as_str())))
        }
    }

    /// A persisted `Generating` state cannot be resumed; fall back to the held
    /// preview, or treat it as failed.
    #[must_use]
    pub fn normalized_after_restart(self) -> Self {
        match self {
            Self::Generating { previous: Some(campaign), .. } => Self::PreviewReady { campaign },
            Self::Generating { .. } => {
                Self::Failed { reason: "generation was interrupted before a response arrived".to_string() }
            }
            other => other,
        }
    }
}

pub const NO_RECIPIENTS_MESSAGE: &str = "No recipients found. Please select at least one client (with an email) or mention a client name clearly in your prompt.";
