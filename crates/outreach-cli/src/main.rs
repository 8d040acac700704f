use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use outreach_api::OutreachApi;
use outreach_core::{EngineError, GenerationCredential, SourceProfile, DEFAULT_GENERATION_MODEL};
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "outreach")]
#[command(about = "Client outreach CLI")]
struct Cli {
    #[arg(long, default_value = "./outreach.sqlite3")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Db {
        #[command(subcommand)]
        command: Box<DbCommand>,
    },
    Config {
        #[command(subcommand)]
        command: Box<ConfigCommand>,
    },
    /// Fetch every page from the configured table and replace the cached records.
    Import,
    Records {
        #[command(subcommand)]
        command: Box<RecordsCommand>,
    },
    Filter {
        #[command(subcommand)]
        command: Box<FilterCommand>,
    },
    Select {
        #[command(subcommand)]
        command: Box<SelectCommand>,
    },
    /// Show who a campaign for this prompt would go to.
    Recipients(RecipientsArgs),
    /// Show the bounded context handed to the generation service.
    Context,
    Chat(ChatArgs),
    Campaign {
        #[command(subcommand)]
        command: Box<CampaignCommand>,
    },
    Transcript {
        #[command(subcommand)]
        command: Box<TranscriptCommand>,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Migrate(DbMigrateArgs),
}

#[derive(Debug, Args)]
struct DbMigrateArgs {
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    Source(SourceArgs),
    Credential(CredentialArgs),
    Show,
}

#[derive(Debug, Args)]
struct SourceArgs {
    #[arg(long, default_value = "")]
    api_key: String,
    #[arg(long, default_value = "")]
    base_id: String,
    #[arg(long = "table", default_value = "")]
    table_name: String,
}

#[derive(Debug, Args)]
struct CredentialArgs {
    #[arg(long, default_value = "")]
    api_key: String,
    #[arg(long, default_value = DEFAULT_GENERATION_MODEL)]
    model: String,
}

#[derive(Debug, Subcommand)]
enum RecordsCommand {
    List(ListArgs),
    Fields,
    Show(ShowRecordArgs),
}

#[derive(Debug, Args)]
struct ListArgs {
    #[arg(long)]
    page: Option<usize>,
}

#[derive(Debug, Args)]
struct ShowRecordArgs {
    id: String,
}

#[derive(Debug, Subcommand)]
enum FilterCommand {
    Search(SearchArgs),
    Set(FieldFilterArgs),
    Clear,
}

#[derive(Debug, Args)]
struct SearchArgs {
    #[arg(default_value = "")]
    term: String,
}

#[derive(Debug, Args)]
struct FieldFilterArgs {
    #[arg(long)]
    field: String,
    #[arg(long, default_value = "")]
    pattern: String,
}

#[derive(Debug, Subcommand)]
enum SelectCommand {
    Toggle(ToggleArgs),
    All,
    #[command(name = "none")]
    Clear,
    Show,
}

#[derive(Debug, Args)]
struct ToggleArgs {
    id: String,
}

#[derive(Debug, Args)]
struct RecipientsArgs {
    #[arg(long)]
    prompt: Option<String>,
}

#[derive(Debug, Args)]
struct ChatArgs {
    message: String,
}

#[derive(Debug, Subcommand)]
enum CampaignCommand {
    Generate(GenerateArgs),
    Show,
    Dispatch,
    Discard,
    Ack,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    prompt: String,
}

#[derive(Debug, Subcommand)]
enum TranscriptCommand {
    Show,
    Clear,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert("contract_version".to_string(), Value::String(CLI_CONTRACT_VERSION.to_string()));
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    emit_json(serde_json::to_value(value)?)
}

fn error_payload(err: &anyhow::Error) -> Value {
    let (kind, message) = match err.downcast_ref::<EngineError>() {
        Some(engine) => (engine.kind().as_str(), engine.detail().to_string()),
        None => ("internal", format!("{err:#}")),
    };
    serde_json::json!({ "error": { "kind": kind, "message": message } })
}

fn init_logging() {
    let default_level = "warn";
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    let api = OutreachApi::new(cli.db);

    match run(&api, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = %format!("{err:#}"), "command failed");
            match serde_json::to_string_pretty(&with_contract_version(error_payload(&err))) {
                Ok(body) => println!("{body}"),
                Err(_) => eprintln!("{err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(api: &OutreachApi, command: Command) -> Result<()> {
    match command {
        Command::Db { command } => run_db(api, *command),
        Command::Config { command } => run_config(api, *command),
        Command::Import => emit(&api.import()?),
        Command::Records { command } => run_records(api, *command),
        Command::Filter { command } => run_filter(api, *command),
        Command::Select { command } => run_select(api, *command),
        Command::Recipients(args) => emit(&api.resolve_recipients(args.prompt.as_deref())?),
        Command::Context => emit(&api.build_context()?),
        Command::Chat(args) => emit(&api.chat(&args.message)?),
        Command::Campaign { command } => run_campaign(api, *command),
        Command::Transcript { command } => run_transcript(api, *command),
    }
}

fn run_db(api: &OutreachApi, command: DbCommand) -> Result<()> {
    match command {
        DbCommand::SchemaVersion => {
            let status = api.schema_status()?;
            emit_json(serde_json::json!({
                "current_version": status.current_version,
                "target_version": status.target_version,
                "pending_versions": status.pending_versions,
                "up_to_date": status.pending_versions.is_empty()
            }))
        }
        DbCommand::Migrate(args) => emit(&api.migrate(args.dry_run)?),
    }
}

fn run_config(api: &OutreachApi, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Source(args) => {
            let saved = api.save_source_profile(&SourceProfile {
                api_key: args.api_key,
                base_id: args.base_id,
                table_name: args.table_name,
            })?;
            emit_json(serde_json::json!({ "source_profile": saved }))
        }
        ConfigCommand::Credential(args) => {
            let saved = api.save_generation_credential(&GenerationCredential {
                api_key: args.api_key,
                model: args.model,
            })?;
            emit_json(serde_json::json!({ "generation_credential": saved }))
        }
        ConfigCommand::Show => emit(&api.show_config()?),
    }
}

fn run_records(api: &OutreachApi, command: RecordsCommand) -> Result<()> {
    match command {
        RecordsCommand::List(args) => emit(&api.list_records(args.page)?),
        RecordsCommand::Fields => emit_json(serde_json::json!({ "fields": api.available_fields()? })),
        RecordsCommand::Show(args) => emit(&api.show_record(&args.id)?),
    }
}

fn run_filter(api: &OutreachApi, command: FilterCommand) -> Result<()> {
    let summary = match command {
        FilterCommand::Search(args) => api.set_search_term(&args.term)?,
        FilterCommand::Set(args) => api.set_field_filter(&args.field, &args.pattern)?,
        FilterCommand::Clear => api.clear_filters()?,
    };
    emit(&summary)
}

fn run_select(api: &OutreachApi, command: SelectCommand) -> Result<()> {
    let summary = match command {
        SelectCommand::Toggle(args) => api.toggle_selection(&args.id)?,
        SelectCommand::All => api.select_all_filtered()?,
        SelectCommand::Clear => api.deselect_all()?,
        SelectCommand::Show => api.show_selection()?,
    };
    emit(&summary)
}

fn run_campaign(api: &OutreachApi, command: CampaignCommand) -> Result<()> {
    match command {
        CampaignCommand::Generate(args) => emit(&api.generate_campaign(&args.prompt)?),
        CampaignCommand::Show => emit(&api.show_campaign()?),
        CampaignCommand::Dispatch => emit(&api.dispatch()?),
        CampaignCommand::Discard => {
            let campaign_id = api.discard_campaign()?;
            emit_json(serde_json::json!({ "discarded_campaign_id": campaign_id.to_string() }))
        }
        CampaignCommand::Ack => emit(&api.acknowledge_failure()?),
    }
}

fn run_transcript(api: &OutreachApi, command: TranscriptCommand) -> Result<()> {
    match command {
        TranscriptCommand::Show => emit(&api.show_transcript()?),
        TranscriptCommand::Clear => emit(&api.clear_transcript()?),
    }
}
