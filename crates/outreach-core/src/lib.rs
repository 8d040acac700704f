//! Record filtering and recipient resolution for client outreach.
//!
//! Records imported from a remote table are narrowed by search and field
//! filters, paged, selected, and resolved into recipients. A bounded context
//! snapshot feeds an external text generator whose untrusted reply is parsed
//! into a campaign with a small lifecycle. [`Session`] owns all of that state.

pub mod campaign;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod error;
pub mod fields;
pub mod filter;
pub mod pagination;
pub mod prompts;
pub mod recipient;
pub mod record;
pub mod selection;
pub mod session;
pub mod transcript;

pub use campaign::{parse_campaign_response, Campaign, CampaignDraft, CampaignId, CampaignState};
pub use collaborators::{
    fetch_all_pages, ChatMessage, GenerationRequest, ImportOutcome, MailDispatcher, OutboundMessage,
    RecordPage, RecordSource, TextGenerator,
};
pub use config::{EngineConfig, GenerationCredential, SourceProfile, DEFAULT_GENERATION_MODEL};
pub use context::{build_context, CampaignContext, ContextCaps, SlimRecord, DEFAULT_CONTEXT_CAP};
pub use error::{EngineError, ErrorKind};
pub use filter::{apply, FilterState, FilteredView};
pub use pagination::{PageWindow, Paginator, DEFAULT_PAGE_SIZE};
pub use recipient::{resolve, Recipient, Resolution, ResolutionTier};
pub use record::{FieldMap, FieldValue, Record, RecordStore};
pub use selection::SelectionSet;
pub use session::{DispatchReceipt, ImportSummary, Page, Session, WorkspaceState};
pub use transcript::{ConversationTurn, Role, Transcript};
