use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use outreach_connectors::{AirtableSource, MailtoDispatcher, OpenAiChat};
use outreach_core::{
    Campaign, CampaignContext, CampaignId, CampaignState, ConversationTurn, DispatchReceipt, EngineConfig,
    EngineError, FilterState, GenerationCredential, ImportSummary, MailDispatcher, PageWindow, Record,
    RecordSource, Resolution, Session, SourceProfile, TextGenerator,
};
use outreach_store_sqlite::{RecordImport, SchemaStatus, SqliteStore};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const API_CONTRACT_VERSION: &str = "api.v1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrateResult {
    pub dry_run: bool,
    pub current_version: i64,
    pub target_version: i64,
    pub would_apply_versions: Vec<i64>,
    pub after_version: Option<i64>,
    pub up_to_date: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigView {
    pub source_profile: Option<SourceProfile>,
    pub generation_credential: Option<GenerationCredential>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportResult {
    #[serde(flatten)]
    pub summary: ImportSummary,
    pub import: RecordImport,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecordListing {
    #[serde(flatten)]
    pub window: PageWindow,
    pub filter: FilterState,
    pub records: Vec<Record>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FilterSummary {
    pub filter: FilterState,
    pub total_count: usize,
    pub filtered_count: usize,
    pub window: PageWindow,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SelectionSummary {
    pub selected_ids: Vec<String>,
    pub live_count: usize,
    pub stale_count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatReply {
    pub reply: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DispatchResult {
    #[serde(flatten)]
    pub receipt: DispatchReceipt,
    pub mailto: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TranscriptView {
    pub turns: Vec<ConversationTurn>,
    pub error_banner: Option<String>,
}

/// Facade that rebuilds a [`Session`] from the database for every call and
/// persists the resulting workspace afterwards.
#[derive(Debug, Clone)]
pub struct OutreachApi {
    db_path: PathBuf,
    config: EngineConfig,
}

impl OutreachApi {
    #[must_use]
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path, config: EngineConfig::default() }
    }

    fn open_store(&self) -> Result<SqliteStore> {
        SqliteStore::open(&self.db_path)
    }

    fn open_migrated(&self) -> Result<SqliteStore> {
        let mut store = self.open_store()?;
        store.migrate()?;
        Ok(store)
    }

    fn load_session(&self, store: &SqliteStore) -> Result<Session> {
        let cached = store.load_records()?;
        let workspace = store.load_workspace()?;
        Ok(Session::from_parts(self.config, cached.store, workspace))
    }

    /// Run `op` against a freshly loaded session and persist the workspace
    /// whether or not the operation succeeded.
    fn with_session<T>(&self, op: impl FnOnce(&mut Session) -> Result<T, EngineError>) -> Result<T> {
        let mut store = self.open_migrated()?;
        let mut session = self.load_session(&store)?;
        let outcome = op(&mut session);
        store.save_workspace(&session.workspace_state()).context("failed to persist workspace")?;
        Ok(outcome?)
    }

    fn read_session<T>(&self, view: impl FnOnce(&Session) -> T) -> Result<T> {
        let store = self.open_migrated()?;
        let session = self.load_session(&store)?;
        Ok(view(&session))
    }

    /// Inspect schema status without mutating data.
    ///
    /// # Errors
    /// Returns an error when the `SQLite` database cannot be opened or queried.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        let store = self.open_store()?;
        store.schema_status()
    }

    /// Apply pending migrations, or return planned versions for dry-run mode.
    ///
    /// # Errors
    /// Returns an error when migration planning or execution fails.
    pub fn migrate(&self, dry_run: bool) -> Result<MigrateResult> {
        let mut store = self.open_store()?;
        let before = store.schema_status()?;
        if dry_run {
            return Ok(MigrateResult {
                dry_run: true,
                current_version: before.current_version,
                target_version: before.target_version,
                would_apply_versions: before.pending_versions,
                after_version: None,
                up_to_date: None,
            });
        }

        store.migrate()?;
        let after = store.schema_status()?;
        Ok(MigrateResult {
            dry_run: false,
            current_version: before.current_version,
            target_version: before.target_version,
            would_apply_versions: before.pending_versions,
            after_version: Some(after.current_version),
            up_to_date: Some(after.pending_versions.is_empty()),
        })
    }

    // --- configuration ---

    /// Validate and persist the record source profile.
    ///
    /// # Errors
    /// Returns `ConfigIncomplete` for a partial profile, or a persistence error.
    pub fn save_source_profile(&self, profile: &SourceProfile) -> Result<SourceProfile> {
        profile.validate()?;
        let mut store = self.open_migrated()?;
        store.save_source_profile(profile)?;
        Ok(profile.redacted())
    }

    /// Validate and persist the generation credential.
    ///
    /// # Errors
    /// Returns `ConfigIncomplete` for a blank key or model, or a persistence error.
    pub fn save_generation_credential(&self, credential: &GenerationCredential) -> Result<GenerationCredential> {
        credential.validate()?;
        let mut store = self.open_migrated()?;
        store.save_generation_credential(credential)?;
        Ok(credential.redacted())
    }

    /// Saved configuration with secrets redacted.
    ///
    /// # Errors
    /// Returns an error when settings cannot be read.
    pub fn show_config(&self) -> Result<ConfigView> {
        let store = self.open_migrated()?;
        Ok(ConfigView {
            source_profile: store.load_source_profile()?.map(|profile| profile.redacted()),
            generation_credential: store.load_generation_credential()?.map(|credential| credential.redacted()),
        })
    }

    fn required_profile(store: &SqliteStore) -> Result<Result<SourceProfile, EngineError>> {
        Ok(store
            .load_source_profile()?
            .ok_or_else(|| EngineError::ConfigIncomplete("record source is not configured".to_string()))
            .and_then(|profile| profile.validate().map(|()| profile)))
    }

    fn required_credential(store: &SqliteStore) -> Result<Result<GenerationCredential, EngineError>> {
        Ok(store
            .load_generation_credential()?
            .ok_or_else(|| EngineError::ConfigIncomplete("generation credential is not configured".to_string()))
            .and_then(|credential| credential.validate().map(|()| credential)))
    }

    // --- import ---

    /// Import every page from the configured table.
    ///
    /// # Errors
    /// Returns `ConfigIncomplete` without a saved profile, otherwise see [`OutreachApi::import_with`].
    pub fn import(&self) -> Result<ImportResult> {
        let store = self.open_migrated()?;
        let mut source = match Self::required_profile(&store)?.and_then(AirtableSource::new) {
            Ok(source) => source,
            Err(err) => return self.with_session(|session| Err(session.report_error(err))),
        };
        drop(store);
        self.import_with(&mut source)
    }

    /// Import from `source`, replacing the cached records only after every page arrived.
    ///
    /// # Errors
    /// Returns the engine failure (previous records kept) or a persistence error.
    pub fn import_with(&self, source: &mut dyn RecordSource) -> Result<ImportResult> {
        let mut store = self.open_migrated()?;
        let mut session = self.load_session(&store)?;
        let outcome = session.import(source);

        let result = match outcome {
            Ok(summary) => {
                let import = store.replace_records(session.store().records(), summary.page_count)?;
                info!(import_id = %import.import_id, records = import.record_count, "cached imported records");
                Ok(ImportResult { summary, import })
            }
            Err(err) => Err(err),
        };
        store.save_workspace(&session.workspace_state()).context("failed to persist workspace")?;
        Ok(result?)
    }

    // --- records and filters ---

    /// The current page, optionally after moving to `page`.
    ///
    /// # Errors
    /// Returns an error when the database cannot be read or written.
    pub fn list_records(&self, page: Option<usize>) -> Result<RecordListing> {
        self.with_session(|session| {
            if let Some(page) = page {
                session.go_to_page(page);
            }
            let current = session.page();
            Ok(RecordListing {
                window: current.window,
                filter: session.filter_state().clone(),
                records: current.records.into_iter().cloned().collect(),
            })
        })
    }

    /// # Errors
    /// Returns an error when the database cannot be read.
    pub fn available_fields(&self) -> Result<Vec<String>> {
        self.read_session(Session::available_fields)
    }

    /// # Errors
    /// Returns an error when the record does not exist.
    pub fn show_record(&self, id: &str) -> Result<Record> {
        self.read_session(|session| session.store().get(id).cloned())?
            .ok_or_else(|| anyhow!("record not found: {id}"))
    }

    fn filter_summary(session: &Session) -> FilterSummary {
        let page = session.page();
        FilterSummary {
            filter: session.filter_state().clone(),
            total_count: session.store().len(),
            filtered_count: session.filtered_view().len(),
            window: page.window,
        }
    }

    /// # Errors
    /// Returns an error when the database cannot be read or written.
    pub fn set_search_term(&self, term: &str) -> Result<FilterSummary> {
        self.with_session(|session| {
            session.set_search_term(term);
            Ok(Self::filter_summary(session))
        })
    }

    /// # Errors
    /// Returns an error when the database cannot be read or written.
    pub fn set_field_filter(&self, field: &str, pattern: &str) -> Result<FilterSummary> {
        self.with_session(|session| {
            session.set_field_filter(field, pattern);
            Ok(Self::filter_summary(session))
        })
    }

    /// # Errors
    /// Returns an error when the database cannot be read or written.
    pub fn clear_filters(&self) -> Result<FilterSummary> {
        self.with_session(|session| {
            session.clear_filters();
            Ok(Self::filter_summary(session))
        })
    }

    // --- selection ---

    fn selection_summary(session: &Session) -> SelectionSummary {
        let live_count = session.selection().live_ids(session.store()).len();
        SelectionSummary {
            selected_ids: session.selection().ids().to_vec(),
            live_count,
            stale_count: session.selection().len() - live_count,
        }
    }

    /// # Errors
    /// Returns an error when the database cannot be read or written.
    pub fn toggle_selection(&self, id: &str) -> Result<SelectionSummary> {
        self.with_session(|session| {
            session.toggle_selection(id);
            Ok(Self::selection_summary(session))
        })
    }

    /// # Errors
    /// Returns an error when the database cannot be read or written.
    pub fn select_all_filtered(&self) -> Result<SelectionSummary> {
        self.with_session(|session| {
            session.select_all_filtered();
            Ok(Self::selection_summary(session))
        })
    }

    /// # Errors
    /// Returns an error when the database cannot be read or written.
    pub fn deselect_all(&self) -> Result<SelectionSummary> {
        self.with_session(|session| {
            session.deselect_all();
            Ok(Self::selection_summary(session))
        })
    }

    /// # Errors
    /// Returns an error when the database cannot be read.
    pub fn show_selection(&self) -> Result<SelectionSummary> {
        self.read_session(Self::selection_summary)
    }

    // --- derived views ---

    /// # Errors
    /// Returns an error when the database cannot be read.
    pub fn resolve_recipients(&self, prompt: Option<&str>) -> Result<Resolution> {
        self.read_session(|session| session.resolve_recipients(prompt))
    }

    /// # Errors
    /// Returns an error when the database cannot be read.
    pub fn build_context(&self) -> Result<CampaignContext> {
        self.read_session(Session::build_context)
    }

    // --- generation ---

    /// # Errors
    /// Returns `ConfigIncomplete` without a saved credential, otherwise see [`OutreachApi::chat_with`].
    pub fn chat(&self, message: &str) -> Result<ChatReply> {
        let store = self.open_migrated()?;
        let mut generator = match Self::required_credential(&store)?.and_then(OpenAiChat::new) {
            Ok(generator) => generator,
            Err(err) => return self.with_session(|session| Err(session.report_error(err))),
        };
        drop(store);
        self.chat_with(message, &mut generator)
    }

    /// # Errors
    /// Returns the engine failure after logging an error turn, or a persistence error.
    pub fn chat_with(&self, message: &str, generator: &mut dyn TextGenerator) -> Result<ChatReply> {
        self.with_session(|session| session.send_chat(message, generator).map(|reply| ChatReply { reply }))
    }

    /// # Errors
    /// Returns `ConfigIncomplete` without a saved credential, otherwise see
    /// [`OutreachApi::generate_campaign_with`].
    pub fn generate_campaign(&self, prompt: &str) -> Result<Campaign> {
        let store = self.open_migrated()?;
        let mut generator = match Self::required_credential(&store)?.and_then(OpenAiChat::new) {
            Ok(generator) => generator,
            Err(err) => return self.with_session(|session| Err(session.report_error(err))),
        };
        drop(store);
        self.generate_campaign_with(prompt, &mut generator)
    }

    /// # Errors
    /// Returns `NoRecipientsResolved`, a transport or parse failure, or a persistence error.
    pub fn generate_campaign_with(&self, prompt: &str, generator: &mut dyn TextGenerator) -> Result<Campaign> {
        self.with_session(|session| session.generate_campaign(prompt, generator))
    }

    /// # Errors
    /// Returns an error when the database cannot be read.
    pub fn show_campaign(&self) -> Result<CampaignState> {
        self.read_session(|session| session.campaign_state().clone())
    }

    /// Hand the previewed campaign to the desktop mail client as a `mailto:` link.
    ///
    /// # Errors
    /// Returns `DispatchPreconditionFailure` without a complete preview.
    pub fn dispatch(&self) -> Result<DispatchResult> {
        let mut dispatcher = MailtoDispatcher::new(Vec::new());
        let receipt = self.dispatch_with(&mut dispatcher)?;
        let mailto = String::from_utf8(dispatcher.into_inner()).context("mailto link is not UTF-8")?;
        Ok(DispatchResult { receipt, mailto: mailto.trim_end().to_string() })
    }

    /// # Errors
    /// Returns `DispatchPreconditionFailure`, the dispatcher's failure, or a persistence error.
    pub fn dispatch_with(&self, dispatcher: &mut dyn MailDispatcher) -> Result<DispatchReceipt> {
        self.with_session(|session| session.dispatch(dispatcher))
    }

    /// # Errors
    /// Returns `Validation` unless a campaign is in preview.
    pub fn discard_campaign(&self) -> Result<CampaignId> {
        self.with_session(Session::discard_campaign)
    }

    /// # Errors
    /// Returns `Validation` unless the last generation failed.
    pub fn acknowledge_failure(&self) -> Result<CampaignState> {
        self.with_session(|session| {
            session.acknowledge_failure()?;
            Ok(session.campaign_state().clone())
        })
    }

    // --- transcript ---

    /// # Errors
    /// Returns an error when the database cannot be read.
    pub fn show_transcript(&self) -> Result<TranscriptView> {
        self.read_session(|session| TranscriptView {
            turns: session.transcript().turns().to_vec(),
            error_banner: session.error_banner().map(str::to_string),
        })
    }

    /// Clear the transcript and the error banner.
    ///
    /// # Errors
    /// Returns an error when the database cannot be read or written.
    pub fn clear_transcript(&self) -> Result<TranscriptView> {
        self.with_session(|session| {
            session.clear_transcript();
            session.dismiss_error();
            Ok(TranscriptView { turns: Vec::new(), error_banner: None })
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use outreach_core::{ErrorKind, FieldMap, FieldValue, GenerationRequest, OutboundMessage, RecordPage};

    use super::*;

    const CAMPAIGN_JSON: &str =
        r#"{"subject":"Spring hours","previewText":"We're open late","bodyHtml":"<p>Hi</p>","bodyText":"Hi"}"#;

    fn unique_temp_db_path() -> PathBuf {
        std::env::temp_dir().join(format!("outreach-api-{}.sqlite3", ulid::Ulid::new()))
    }

    fn cleanup(db_path: &PathBuf) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", db_path.display(), suffix));
        }
    }

    fn mk_record(id: &str, name: &str, email: &str, city: &str) -> Record {
        let mut fields = FieldMap::new();
        fields.insert("Full Name", FieldValue::from(name));
        fields.insert("Email", FieldValue::from(email));
        fields.insert("City", FieldValue::from(city));
        Record::new(id, fields)
    }

    struct FixtureSource {
        pages: VecDeque<Result<RecordPage, EngineError>>,
    }

    impl RecordSource for FixtureSource {
        fn fetch_page(&mut self, _token: Option<&str>) -> Result<RecordPage, EngineError> {
            self.pages.pop_front().unwrap_or_else(|| Ok(RecordPage::default()))
        }
    }

    fn fixture_source() -> FixtureSource {
        FixtureSource {
            pages: VecDeque::from(vec![
                Ok(RecordPage {
                    records: vec![
                        mk_record("rec1", "Tina Cheng", "tina@example.com", "Seattle"),
                        mk_record("rec2", "Omar Diaz", "omar@example.com", "Portland"),
                    ],
                    next_token: Some("page2".to_string()),
                }),
                Ok(RecordPage {
                    records: vec![mk_record("rec3", "Ana Seto", "ana@example.com", "Seattle")],
                    next_token: None,
                }),
            ]),
        }
    }

    struct CannedGenerator(Result<String, EngineError>);

    impl TextGenerator for CannedGenerator {
        fn generate(&mut self, _request: &GenerationRequest) -> Result<String, EngineError> {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct CollectingDispatcher(Vec<OutboundMessage>);

    impl MailDispatcher for CollectingDispatcher {
        fn dispatch(&mut self, message: &OutboundMessage) -> Result<(), EngineError> {
            self.0.push(message.clone());
            Ok(())
        }
    }

    fn engine_kind(err: &anyhow::Error) -> Option<ErrorKind> {
        err.downcast_ref::<EngineError>().map(EngineError::kind)
    }

    #[test]
    fn import_filter_select_and_campaign_flow_persists_between_calls() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = OutreachApi::new(db_path.clone());

        let imported = api.import_with(&mut fixture_source())?;
        assert_eq!(imported.summary.record_count, 3);
        assert_eq!(imported.import.page_count, 2);

        let summary = api.set_search_term("seattle")?;
        assert_eq!(summary.filtered_count, 2);
        let selection = api.select_all_filtered()?;
        assert_eq!(selection.selected_ids, vec!["rec1", "rec3"]);

        let context = api.build_context()?;
        assert_eq!(context.selected_count, 2);
        assert_eq!(context.total_record_count, 3);

        let campaign =
            api.generate_campaign_with("Announce spring hours", &mut CannedGenerator(Ok(CAMPAIGN_JSON.to_string())))?;
        assert_eq!(campaign.recipients.len(), 2);
        assert_eq!(api.show_campaign()?.as_str(), "preview_ready");

        let mut dispatcher = CollectingDispatcher::default();
        let receipt = api.dispatch_with(&mut dispatcher)?;
        assert_eq!(receipt.recipient_count, 2);
        assert_eq!(dispatcher.0[0].recipient_emails, vec!["tina@example.com", "ana@example.com"]);
        assert_eq!(api.show_campaign()?.as_str(), "dispatched");

        cleanup(&db_path);
        Ok(())
    }

    #[test]
    fn failed_generation_is_persisted_with_error_turn() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = OutreachApi::new(db_path.clone());
        api.import_with(&mut fixture_source())?;
        api.toggle_selection("rec2")?;

        let err = api
            .generate_campaign_with("Announce", &mut CannedGenerator(Ok("not json".to_string())))
            .err()
            .ok_or_else(|| anyhow!("generation should fail"))?;
        assert_eq!(engine_kind(&err), Some(ErrorKind::MalformedResponse));
        assert_eq!(api.show_campaign()?.as_str(), "failed");

        let transcript = api.show_transcript()?;
        assert!(transcript.turns.last().is_some_and(|turn| turn.is_error));
        assert!(transcript.error_banner.is_some());

        assert_eq!(api.acknowledge_failure()?, CampaignState::NoCampaign);
        cleanup(&db_path);
        Ok(())
    }

    #[test]
    fn missing_configuration_is_config_incomplete_and_bannered() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = OutreachApi::new(db_path.clone());

        let err = api.import().err().ok_or_else(|| anyhow!("import should fail"))?;
        assert_eq!(engine_kind(&err), Some(ErrorKind::ConfigIncomplete));
        let err = api.chat("hello").err().ok_or_else(|| anyhow!("chat should fail"))?;
        assert_eq!(engine_kind(&err), Some(ErrorKind::ConfigIncomplete));

        assert!(api.show_transcript()?.error_banner.is_some_and(|banner| banner.contains("not configured")));
        cleanup(&db_path);
        Ok(())
    }

    #[test]
    fn config_is_validated_and_redacted() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = OutreachApi::new(db_path.clone());

        let partial = SourceProfile { api_key: "pat".to_string(), ..SourceProfile::default() };
        let err = api.save_source_profile(&partial).err().ok_or_else(|| anyhow!("partial profile saved"))?;
        assert_eq!(engine_kind(&err), Some(ErrorKind::ConfigIncomplete));

        api.save_source_profile(&SourceProfile {
            api_key: "patSECRET1234".to_string(),
            base_id: "appBase".to_string(),
            table_name: "Clients".to_string(),
        })?;
        api.save_generation_credential(&GenerationCredential::new("sk-live-abcd"))?;

        let view = api.show_config()?;
        assert_eq!(view.source_profile.map(|profile| profile.api_key), Some("*********1234".to_string()));
        assert_eq!(view.generation_credential.map(|credential| credential.model), Some("gpt-4o-mini".to_string()));
        cleanup(&db_path);
        Ok(())
    }

    #[test]
    fn failed_import_keeps_cached_records() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = OutreachApi::new(db_path.clone());
        api.import_with(&mut fixture_source())?;

        let mut broken = FixtureSource {
            pages: VecDeque::from(vec![Err(EngineError::TransportFailure("Error: 500 - Server Error".to_string()))]),
        };
        assert!(api.import_with(&mut broken).is_err());
        assert_eq!(api.list_records(None)?.window.total, 3);
        assert!(api.show_record("rec3").is_ok());
        assert!(api.show_record("missing").is_err());
        cleanup(&db_path);
        Ok(())
    }

    #[test]
    fn dispatch_without_preview_fails_and_mailto_is_composed_on_success() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = OutreachApi::new(db_path.clone());
        api.import_with(&mut fixture_source())?;

        let err = api.dispatch().err().ok_or_else(|| anyhow!("dispatch should fail"))?;
        assert_eq!(engine_kind(&err), Some(ErrorKind::DispatchPreconditionFailure));

        api.generate_campaign_with(
            "please reach out to Tina Cheng this week",
            &mut CannedGenerator(Ok(CAMPAIGN_JSON.to_string())),
        )?;
        let result = api.dispatch()?;
        assert_eq!(result.mailto, "mailto:tina@example.com?subject=Spring%20hours&body=Hi");
        cleanup(&db_path);
        Ok(())
    }

    #[test]
    fn migrate_dry_run_reports_pending_versions() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = OutreachApi::new(db_path.clone());
        let planned = api.migrate(true)?;
        assert_eq!(planned.would_apply_versions, vec![1, 2]);
        let applied = api.migrate(false)?;
        assert_eq!(applied.up_to_date, Some(true));
        cleanup(&db_path);
        Ok(())
    }
}
