use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::campaign::{parse_campaign_response, Campaign, CampaignId, CampaignState, NO_RECIPIENTS_MESSAGE};
use crate::collaborators::{
    fetch_all_pages, GenerationRequest, ImportOutcome, MailDispatcher, RecordSource, TextGenerator,
};
use crate::config::EngineConfig;
use crate::context::{build_context, CampaignContext};
use crate::error::EngineError;
use crate::filter::{apply, FilterState, FilteredView};
use crate::pagination::{PageWindow, Paginator};
use crate::prompts::{
    campaign_request, chat_request, CAMPAIGN_ERROR_PREFIX, CAMPAIGN_READY_MESSAGE, CHAT_ERROR_PREFIX,
    NO_RECIPIENTS_GUIDANCE,
};
use crate::recipient::{mentioned_names, resolve, Resolution};
use crate::record::{Record, RecordStore};
use crate::selection::SelectionSet;
use crate::transcript::{ConversationTurn, Transcript};

/// Everything about a session that outlives one process, apart from the records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceState {
    #[serde(default)]
    pub filter: FilterState,
    #[serde(default = "first_page")]
    pub current_page: usize,
    #[serde(default)]
    pub selection: SelectionSet,
    #[serde(default)]
    pub transcript: Transcript,
    #[serde(default)]
    pub campaign: CampaignState,
    #[serde(default)]
    pub error_banner: Option<String>,
}

fn first_page() -> usize {
    1
}

impl Default for WorkspaceState {
    fn default() -> Self {
        Self {
            filter: FilterState::default(),
            current_page: first_page(),
            selection: SelectionSet::default(),
            transcript: Transcript::default(),
            campaign: CampaignState::default(),
            error_banner: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ImportSummary {
    pub record_count: usize,
    pub page_count: usize,
    pub field_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct DispatchReceipt {
    pub campaign_id: CampaignId,
    pub recipient_count: usize,
    pub subject: String,
}

/// The visible page of the filtered view.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Page<'a> {
    #[serde(flatten)]
    pub window: PageWindow,
    pub records: Vec<&'a Record>,
}

/// Single owner of all mutable engine state.
///
/// Every operation runs to completion on `&mut self`. The `begin_*`/`complete_*`
/// pairs let an event loop run the remote call elsewhere; while one is open the
/// matching action is rejected with `OperationInFlight`.
#[derive(Debug, Clone, Default)]
pub struct Session {
    config: EngineConfig,
    store: RecordStore,
    filter: FilterState,
    pager: Paginator,
    selection: SelectionSet,
    transcript: Transcript,
    campaign: CampaignState,
    error_banner: Option<String>,
    import_in_flight: bool,
    chat_in_flight: bool,
}

impl Session {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self { config, pager: Paginator::new(config.page_size), ..Self::default() }
    }

    /// Rebuild a session from a cached record store and persisted workspace.
    #[must_use]
    pub fn from_parts(config: EngineConfig, store: RecordStore, workspace: WorkspaceState) -> Self {
        let mut pager = Paginator::new(config.page_size);
        let view_len = apply(store.records(), &workspace.filter).len();
        pager.go_to(workspace.current_page, view_len);
        Self {
            config,
            store,
            filter: workspace.filter,
            pager,
            selection: workspace.selection,
            transcript: workspace.transcript,
            campaign: workspace.campaign.normalized_after_restart(),
            error_banner: workspace.error_banner,
            import_in_flight: false,
            chat_in_flight: false,
        }
    }

    #[must_use]
    pub fn workspace_state(&self) -> WorkspaceState {
        WorkspaceState {
            filter: self.filter.clone(),
            current_page: self.pager.current_page(),
            selection: self.selection.clone(),
            transcript: self.transcript.clone(),
            campaign: self.campaign.clone(),
            error_banner: self.error_banner.clone(),
        }
    }

    #[must_use]
    pub fn config(&self) -> EngineConfig {
        self.config
    }

    #[must_use]
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    #[must_use]
    pub fn filter_state(&self) -> &FilterState {
        &self.filter
    }

    #[must_use]
    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    #[must_use]
    pub fn campaign_state(&self) -> &CampaignState {
        &self.campaign
    }

    #[must_use]
    pub fn error_banner(&self) -> Option<&str> {
        self.error_banner.as_deref()
    }

    #[must_use]
    pub fn generation_in_flight(&self) -> bool {
        self.chat_in_flight || self.campaign.is_generating()
    }

    /// Surface `err` on the error banner and hand it back.
    pub fn report_error(&mut self, err: EngineError) -> EngineError {
        self.error_banner = Some(err.to_string());
        err
    }

    // --- import ---

    /// # Errors
    /// Returns `OperationInFlight` while another import is open.
    pub fn begin_import(&mut self) -> Result<(), EngineError> {
        if self.import_in_flight {
            return Err(EngineError::OperationInFlight("an import is already running".to_string()));
        }
        self.import_in_flight = true;
        Ok(())
    }

    /// Close the open import. On success the record store is replaced wholesale
    /// and selection and pagination reset; on failure nothing but the banner changes.
    ///
    /// # Errors
    /// Returns the fetch failure, or `Validation` when no import was open.
    pub fn complete_import(
        &mut self,
        outcome: Result<ImportOutcome, EngineError>,
    ) -> Result<ImportSummary, EngineError> {
        if !self.import_in_flight {
            return Err(EngineError::Validation("no import is in flight".to_string()));
        }
        self.import_in_flight = false;

        match outcome {
            Ok(outcome) => {
                self.store = RecordStore::from_records(outcome.records);
                self.selection.clear();
                self.pager.reset();
                self.error_banner = None;
                info!(records = self.store.len(), pages = outcome.page_count, "replaced record store");
                Ok(ImportSummary {
                    record_count: self.store.len(),
                    page_count: outcome.page_count,
                    field_names: self.store.field_names(),
                })
            }
            Err(err) => {
                warn!(error = %err, "import failed; keeping previous records");
                Err(self.report_error(err))
            }
        }
    }

    /// # Errors
    /// See [`Session::begin_import`] and [`Session::complete_import`].
    pub fn import(&mut self, source: &mut dyn RecordSource) -> Result<ImportSummary, EngineError> {
        self.begin_import()?;
        let outcome = fetch_all_pages(source);
        self.complete_import(outcome)
    }

    // --- filtering and paging ---

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.filter.search_term = term.into();
        self.pager.reset();
    }

    pub fn set_field_filter(&mut self, field: impl Into<String>, pattern: impl Into<String>) {
        self.filter.set_field_filter(field, pattern);
        self.pager.reset();
    }

    pub fn clear_filters(&mut self) {
        self.filter.clear();
        self.pager.reset();
    }

    #[must_use]
    pub fn filtered_view(&self) -> FilteredView<'_> {
        apply(self.store.records(), &self.filter)
    }

    #[must_use]
    pub fn available_fields(&self) -> Vec<String> {
        self.store.field_names()
    }

    #[must_use]
    pub fn page(&self) -> Page<'_> {
        let view = self.filtered_view();
        let window = self.pager.window(view.len());
        Page { window, records: window.slice(view.records()).to_vec() }
    }

    pub fn go_to_page(&mut self, page: usize) -> PageWindow {
        let total = self.filtered_view().len();
        self.pager.go_to(page, total)
    }

    pub fn next_page(&mut self) -> PageWindow {
        self.go_to_page(self.pager.current_page().saturating_add(1))
    }

    pub fn previous_page(&mut self) -> PageWindow {
        self.go_to_page(self.pager.current_page().saturating_sub(1))
    }

    // --- selection ---

    pub fn toggle_selection(&mut self, id: &str) -> bool {
        self.selection.toggle(id)
    }

    /// Select exactly the records in the current filtered view.
    pub fn select_all_filtered(&mut self) -> usize {
        let ids = apply(self.store.records(), &self.filter).ids();
        self.selection.select_all(ids);
        self.selection.len()
    }

    pub fn deselect_all(&mut self) {
        self.selection.clear();
    }

    // --- derived views ---

    #[must_use]
    pub fn resolve_recipients(&self, prompt: Option<&str>) -> Resolution {
        resolve(&self.store, &self.filtered_view(), &self.selection, prompt)
    }

    #[must_use]
    pub fn mentioned_names(&self, prompt: &str) -> Vec<String> {
        mentioned_names(&self.filtered_view(), prompt)
    }

    #[must_use]
    pub fn build_context(&self) -> CampaignContext {
        build_context(&self.store, &self.filtered_view(), &self.selection, self.config.context_caps)
    }

    // --- chat ---

    /// Record the user's message and build the chat request.
    ///
    /// # Errors
    /// Returns `Validation` for a blank message and `OperationInFlight` while a
    /// generation is running.
    pub fn begin_chat(&mut self, message: &str) -> Result<GenerationRequest, EngineError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(EngineError::Validation("chat message must not be empty".to_string()));
        }
        if self.generation_in_flight() {
            return Err(EngineError::OperationInFlight("a generation request is already running".to_string()));
        }

        let request = chat_request(&self.build_context(), self.transcript.history(), message)?;
        self.transcript.push(ConversationTurn::user(message));
        self.chat_in_flight = true;
        self.error_banner = None;
        Ok(request)
    }

    /// # Errors
    /// Returns the generation failure after logging an error turn.
    pub fn complete_chat(&mut self, reply: Result<String, EngineError>) -> Result<String, EngineError> {
        if !self.chat_in_flight {
            return Err(EngineError::Validation("no chat request is in flight".to_string()));
        }
        self.chat_in_flight = false;

        match reply.map(|text| text.trim().to_string()) {
            Ok(text) if !text.is_empty() => {
                self.transcript.push(ConversationTurn::assistant(text.clone()));
                Ok(text)
            }
            Ok(_) => self.fail_chat(EngineError::TransportFailure(
                "No content returned from the generation service".to_string(),
            )),
            Err(err) => self.fail_chat(err),
        }
    }

    fn fail_chat(&mut self, err: EngineError) -> Result<String, EngineError> {
        warn!(error = %err, "chat request failed");
        self.transcript.push(ConversationTurn::assistant_error(format!("{CHAT_ERROR_PREFIX}{}", err.detail())));
        Err(self.report_error(err))
    }

    /// # Errors
    /// See [`Session::begin_chat`] and [`Session::complete_chat`].
    pub fn send_chat(&mut self, message: &str, generator: &mut dyn TextGenerator) -> Result<String, EngineError> {
        let request = self.begin_chat(message)?;
        let reply = generator.generate(&request);
        self.complete_chat(reply)
    }

    // --- campaign ---

    /// Record the prompt, resolve recipients, and enter `Generating`.
    ///
    /// With no resolvable recipient the lifecycle does not move; a guidance
    /// turn is logged and `NoRecipientsResolved` returned.
    ///
    /// # Errors
    /// Returns `Validation`, `OperationInFlight`, or `NoRecipientsResolved`.
    pub fn begin_generation(&mut self, prompt: &str) -> Result<GenerationRequest, EngineError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(EngineError::Validation("campaign prompt must not be empty".to_string()));
        }
        if self.generation_in_flight() {
            return Err(EngineError::OperationInFlight("a generation request is already running".to_string()));
        }

        self.transcript.push(ConversationTurn::user(prompt));
        let resolution = self.resolve_recipients(Some(prompt));
        if resolution.is_empty() {
            self.transcript.push(ConversationTurn::assistant_error(NO_RECIPIENTS_GUIDANCE));
            return Err(self.report_error(EngineError::NoRecipientsResolved(NO_RECIPIENTS_MESSAGE.to_string())));
        }

        let names = self.mentioned_names(prompt);
        let request =
            campaign_request(prompt, &resolution.recipients, self.config.context_caps.selected, &names)?;
        info!(
            tier = resolution.tier.as_str(),
            recipients = resolution.recipients.len(),
            "starting campaign generation"
        );
        self.campaign.begin(prompt, resolution.recipients)?;
        self.error_banner = None;
        Ok(request)
    }

    /// Parse the raw response and settle the lifecycle.
    ///
    /// # Errors
    /// Returns the transport or parse failure after moving to `Failed` (or back
    /// to the preview held during regeneration), or `Validation` when nothing is generating.
    pub fn complete_generation(&mut self, raw: Result<String, EngineError>) -> Result<Campaign, EngineError> {
        if !self.campaign.is_generating() {
            return Err(EngineError::Validation("no campaign generation is in flight".to_string()));
        }

        let outcome = raw.and_then(|text| parse_campaign_response(&text));
        match self.campaign.complete(outcome) {
            Ok(campaign) => {
                self.transcript.push(ConversationTurn::assistant(CAMPAIGN_READY_MESSAGE));
                info!(campaign_id = %campaign.id, recipients = campaign.recipients.len(), "campaign ready for preview");
                Ok(campaign)
            }
            Err(err) => {
                warn!(error = %err, "campaign generation failed");
                self.transcript
                    .push(ConversationTurn::assistant_error(format!("{CAMPAIGN_ERROR_PREFIX}{}", err.detail())));
                Err(self.report_error(err))
            }
        }
    }

    /// # Errors
    /// See [`Session::begin_generation`] and [`Session::complete_generation`].
    pub fn generate_campaign(
        &mut self,
        prompt: &str,
        generator: &mut dyn TextGenerator,
    ) -> Result<Campaign, EngineError> {
        let request = self.begin_generation(prompt)?;
        let raw = generator.generate(&request);
        self.complete_generation(raw)
    }

    /// Hand the previewed campaign to the mail collaborator.
    ///
    /// # Errors
    /// Returns `DispatchPreconditionFailure` without a complete preview, or the
    /// collaborator's failure; the preview stays in place on failure.
    pub fn dispatch(&mut self, dispatcher: &mut dyn MailDispatcher) -> Result<DispatchReceipt, EngineError> {
        let (message, campaign_id) = match self.campaign.ready_for_dispatch() {
            Ok(campaign) => (campaign.outbound_message(), campaign.id),
            Err(err) => return Err(self.report_error(err)),
        };

        if let Err(err) = dispatcher.dispatch(&message) {
            warn!(error = %err, "dispatch failed");
            return Err(self.report_error(err));
        }
        self.campaign.mark_dispatched()?;
        info!(%campaign_id, recipients = message.recipient_emails.len(), "campaign dispatched");

        Ok(DispatchReceipt {
            campaign_id,
            recipient_count: message.recipient_emails.len(),
            subject: message.subject,
        })
    }

    /// # Errors
    /// Returns `Validation` unless a campaign is in preview.
    pub fn discard_campaign(&mut self) -> Result<CampaignId, EngineError> {
        self.campaign.discard()
    }

    /// # Errors
    /// Returns `Validation` unless the last generation failed.
    pub fn acknowledge_failure(&mut self) -> Result<(), EngineError> {
        self.campaign.acknowledge()?;
        self.error_banner = None;
        Ok(())
    }

    pub fn clear_transcript(&mut self) {
        self.transcript.clear();
    }

    pub fn dismiss_error(&mut self) {
        self.error_banner = None;
    }
}
