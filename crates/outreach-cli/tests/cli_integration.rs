use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{now}-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap_or_else(|err| panic!("failed to create temp dir {}: {err}", dir.display()));
    dir
}

fn run_outreach<I, S>(db: &Path, args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_outreach"))
        .arg("--db")
        .arg(db)
        .args(args)
        .output()
        .unwrap_or_else(|err| panic!("failed to execute outreach binary: {err}"))
}

fn parse_stdout(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    serde_json::from_str(&stdout).unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"))
}

fn run_json<I, S>(db: &Path, args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_outreach(db, args);
    if !output.status.success() {
        panic!(
            "outreach command failed (status={}):\nstdout:\n{}\nstderr:\n{}",
            output.status,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    parse_stdout(&output)
}

/// Run a command expected to fail and return its `error` object.
fn run_error<I, S>(db: &Path, args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_outreach(db, args);
    assert!(!output.status.success(), "command unexpectedly succeeded: {}", String::from_utf8_lossy(&output.stdout));
    let payload = parse_stdout(&output);
    assert_eq!(payload["contract_version"], "cli.v1");
    payload["error"].clone()
}

fn as_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_else(|| panic!("missing string field `{key}` in payload: {value}"))
}

fn db_in(dir: &Path) -> PathBuf {
    dir.join("outreach.sqlite3")
}

#[test]
fn schema_version_and_migrate_report_contract_version() {
    let dir = unique_temp_dir("outreach-cli-schema");
    let db = db_in(&dir);

    let dry_run = run_json(&db, ["db", "migrate", "--dry-run"]);
    assert_eq!(dry_run["contract_version"], "cli.v1");
    assert_eq!(dry_run["would_apply_versions"], serde_json::json!([1, 2]));

    run_json(&db, ["db", "migrate"]);
    let status = run_json(&db, ["db", "schema-version"]);
    assert_eq!(status["current_version"], 2);
    assert_eq!(status["up_to_date"], true);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn missing_configuration_is_reported_as_config_incomplete() {
    let dir = unique_temp_dir("outreach-cli-config");
    let db = db_in(&dir);

    let error = run_error(&db, ["import"]);
    assert_eq!(as_str(&error, "kind"), "config_incomplete");

    let error = run_error(&db, ["chat", "Who lives in Seattle?"]);
    assert_eq!(as_str(&error, "kind"), "config_incomplete");

    let error = run_error(&db, ["config", "source", "--api-key", "patSECRET"]);
    assert_eq!(as_str(&error, "kind"), "config_incomplete");
    assert!(as_str(&error, "message").contains("base_id, table_name"));

    let transcript = run_json(&db, ["transcript", "show"]);
    assert!(transcript["error_banner"].as_str().is_some_and(|banner| banner.contains("not configured")));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn saved_configuration_is_redacted_on_show() {
    let dir = unique_temp_dir("outreach-cli-redact");
    let db = db_in(&dir);

    run_json(&db, ["config", "source", "--api-key", "patSECRET1234", "--base-id", "appBase", "--table", "Clients"]);
    run_json(&db, ["config", "credential", "--api-key", "sk-live-abcd"]);

    let shown = run_json(&db, ["config", "show"]);
    assert_eq!(shown["source_profile"]["api_key"], "*********1234");
    assert_eq!(shown["source_profile"]["table_name"], "Clients");
    assert_eq!(shown["generation_credential"]["model"], "gpt-4o-mini");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn filters_and_selection_persist_between_invocations() {
    let dir = unique_temp_dir("outreach-cli-state");
    let db = db_in(&dir);

    let searched = run_json(&db, ["filter", "search", "tina"]);
    assert_eq!(searched["filter"]["search_term"], "tina");
    run_json(&db, ["filter", "set", "--field", "City", "--pattern", "Seattle"]);

    let listed = run_json(&db, ["records", "list"]);
    assert_eq!(listed["filter"]["search_term"], "tina");
    assert_eq!(listed["filter"]["field_filters"]["City"], "Seattle");
    assert_eq!(listed["records"], serde_json::json!([]));

    let cleared = run_json(&db, ["filter", "clear"]);
    assert_eq!(cleared["filter"]["search_term"], "");

    let toggled = run_json(&db, ["select", "toggle", "recGone"]);
    assert_eq!(toggled["selected_ids"], serde_json::json!(["recGone"]));
    assert_eq!(toggled["live_count"], 0);
    assert_eq!(toggled["stale_count"], 1);

    let shown = run_json(&db, ["select", "show"]);
    assert_eq!(shown["selected_ids"], serde_json::json!(["recGone"]));

    let none = run_json(&db, ["select", "none"]);
    assert_eq!(none["selected_ids"], serde_json::json!([]));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn campaign_without_recipients_is_refused_before_generation() {
    let dir = unique_temp_dir("outreach-cli-campaign");
    let db = db_in(&dir);

    let error = run_error(&db, ["campaign", "generate", "Announce spring hours"]);
    assert_eq!(as_str(&error, "kind"), "config_incomplete");

    run_json(&db, ["config", "credential", "--api-key", "sk-test"]);
    let error = run_error(&db, ["campaign", "generate", "Announce spring hours"]);
    assert_eq!(as_str(&error, "kind"), "no_recipients_resolved");

    let recipients = run_json(&db, ["recipients", "--prompt", "Announce spring hours"]);
    assert_eq!(recipients["tier"], "unresolved");

    let transcript = run_json(&db, ["transcript", "show"]);
    let turns = transcript["turns"].as_array().cloned().unwrap_or_default();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0]["role"], "user");
    assert_eq!(turns[1]["isError"], true);

    let state = run_json(&db, ["campaign", "show"]);
    assert_eq!(state["state"], "no_campaign");

    let error = run_error(&db, ["campaign", "dispatch"]);
    assert_eq!(as_str(&error, "kind"), "dispatch_precondition_failure");

    let cleared = run_json(&db, ["transcript", "clear"]);
    assert_eq!(cleared["turns"], serde_json::json!([]));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn empty_context_reports_caps_and_counts() {
    let dir = unique_temp_dir("outreach-cli-context");
    let db = db_in(&dir);

    let context = run_json(&db, ["context"]);
    assert_eq!(context["totalRecordCount"], 0);
    assert_eq!(context["cap"], 80);

    let fields = run_json(&db, ["records", "fields"]);
    assert_eq!(fields["fields"], serde_json::json!([]));

    let _ = fs::remove_dir_all(&dir);
}
