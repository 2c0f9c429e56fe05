use std::env;
use std::sync::{Mutex, OnceLock};

use eduloop_cli::commands::{approval, config, doctor, feedback, migrate, Invocation};
use eduloop_core::config::{ConfigOverrides, LoadOptions};
use eduloop_core::domain::approval::ReviewAction;
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn migrate_creates_tables_in_file_database() {
    with_database(&[], || {
        let result = migrate::run(&invocation());
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");

        let doctor = doctor::run(&invocation());
        assert_eq!(doctor.exit_code, 0, "{}", doctor.output);
        assert_eq!(parse_payload(&doctor.output)["data"]["overall_status"], "pass");
    });
}

#[test]
fn doctor_reports_missing_tables_before_migrate() {
    with_database(&[], || {
        let result = doctor::run(&invocation());
        assert_eq!(result.exit_code, 5, "failed readiness must not exit 0");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "schema");
        let report = &payload["data"];
        assert_eq!(report["overall_status"], "fail");

        let checks = report["checks"].as_array().expect("checks array");
        let schema = checks
            .iter()
            .find(|check| check["name"] == "schema_readiness")
            .expect("schema check present");
        assert_eq!(schema["status"], "fail");
    });
}

#[test]
fn submit_approve_and_inspect_request() {
    with_database(&[], || {
        let cli = invocation();
        let submitted =
            approval::submit(&cli, "S1", "learning_path", r#"{"topic":"algebra"}"#, Some("high"));
        assert_eq!(submitted.exit_code, 0, "{}", submitted.output);
        assert_eq!(parse_payload(&submitted.output)["data"]["request_id"], "1");

        let pending = parse_payload(&approval::pending(&cli, Some("high")).output);
        assert_eq!(pending["data"].as_array().map(Vec::len), Some(1));

        let approved = approval::review(&cli, ReviewAction::Approve, "1", "R1", "looks good");
        assert_eq!(approved.exit_code, 0, "{}", approved.output);

        let status = parse_payload(&approval::status(&cli, "1").output);
        assert_eq!(status["data"]["status"], "approved");
        assert_eq!(status["data"]["reviewer_id"], "R1");
        assert_eq!(status["data"]["decision_data"]["data"]["topic"], "algebra");

        let pending = parse_payload(&approval::pending(&cli, None).output);
        assert_eq!(pending["data"].as_array().map(Vec::len), Some(0));
    });
}

#[test]
fn pending_only_policy_refuses_second_review() {
    with_database(&[("EDULOOP_REVIEW_TRANSITION_POLICY", "pending_only")], || {
        let cli = invocation();
        approval::submit(&cli, "S1", "curriculum", "{}", None);
        assert_eq!(approval::review(&cli, ReviewAction::Approve, "1", "R1", "").exit_code, 0);

        let refused = approval::review(&cli, ReviewAction::Reject, "1", "R2", "");
        assert_eq!(refused.exit_code, 6);
        assert_eq!(parse_payload(&refused.output)["error_class"], "invalid_transition");

        let status = parse_payload(&approval::status(&cli, "1").output);
        assert_eq!(status["data"]["status"], "approved");
    });
}

#[test]
fn unknown_or_malformed_ids_are_reported() {
    with_database(&[], || {
        let cli = invocation();
        let missing = approval::review(&cli, ReviewAction::RequestRevision, "41", "R1", "");
        assert_eq!(missing.exit_code, 7);
        assert_eq!(parse_payload(&missing.output)["error_class"], "not_found");

        let status = approval::status(&cli, "41");
        assert_eq!(status.exit_code, 7);

        let malformed = approval::status(&cli, "abc");
        assert_eq!(malformed.exit_code, 6);
        assert_eq!(parse_payload(&malformed.output)["error_class"], "validation");
    });
}

#[test]
fn invalid_decision_json_is_rejected_before_storage() {
    with_database(&[], || {
        let result = approval::submit(&invocation(), "S1", "learning_path", "{not json", None);
        assert_eq!(result.exit_code, 6);
        assert_eq!(parse_payload(&result.output)["error_class"], "validation");
    });
}

#[test]
fn feedback_average_and_history() {
    with_database(&[], || {
        let cli = invocation();
        for rating in [4, 5] {
            let submitted =
                feedback::submit(&cli, "S1", "REC1", "positive", "helpful", Some(rating));
            assert_eq!(submitted.exit_code, 0, "{}", submitted.output);
        }

        let average = parse_payload(&feedback::average(&cli, "REC1").output);
        assert_eq!(average["data"]["average_rating"], 4.5);

        let unrated = parse_payload(&feedback::average(&cli, "REC2").output);
        assert_eq!(unrated["status"], "ok");
        assert!(unrated["data"]["average_rating"].is_null());

        let history = parse_payload(&feedback::history(&cli, "S1").output);
        let records = history["data"].as_array().expect("history array");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["rating"], 5);
    });
}

#[test]
fn invalid_feedback_writes_nothing() {
    with_database(&[], || {
        let cli = invocation();
        let bad_type = feedback::submit(&cli, "S1", "REC1", "great", "", Some(4));
        assert_eq!(bad_type.exit_code, 6);
        assert_eq!(parse_payload(&bad_type.output)["error_class"], "validation");

        let bad_rating = feedback::submit(&cli, "S1", "REC1", "positive", "", Some(11));
        assert_eq!(bad_rating.exit_code, 6);

        let history = parse_payload(&feedback::history(&cli, "S1").output);
        assert_eq!(history["data"].as_array().map(Vec::len), Some(0));
    });
}

#[test]
fn invalid_policy_env_is_a_config_failure() {
    with_database(&[("EDULOOP_REVIEW_TRANSITION_POLICY", "sometimes")], || {
        let result = approval::pending(&invocation(), None);
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn config_and_doctor_report_invalid_config_as_json_failures() {
    with_database(&[("EDULOOP_REVIEW_TRANSITION_POLICY", "sometimes")], || {
        let cli = invocation();

        let config = config::run(&cli);
        assert_eq!(config.exit_code, 2);
        let payload = parse_payload(&config.output);
        assert_eq!(payload["command"], "config");
        assert_eq!(payload["error_class"], "config_validation");
        assert!(payload["message"]
            .as_str()
            .is_some_and(|message| message.contains("EDULOOP_REVIEW_TRANSITION_POLICY")));

        let doctor = doctor::run(&cli);
        assert_eq!(doctor.exit_code, 2);
        let payload = parse_payload(&doctor.output);
        assert_eq!(payload["error_class"], "config_validation");
        assert_eq!(payload["data"]["checks"][1]["status"], "skipped");
    });
}

#[test]
fn config_lists_effective_values_with_sources() {
    with_database(&[("EDULOOP_LOG_LEVEL", "warn")], || {
        let cli = Invocation::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        let result = config::run(&cli);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        let entries = payload["data"].as_array().expect("config entries");
        let entry = |key: &str| {
            entries.iter().find(|entry| entry["key"] == key).expect("key listed").clone()
        };

        assert_eq!(entry("database.url")["value"], "sqlite::memory:");
        assert_eq!(entry("database.url")["source"], "flag (--database-url)");
        assert_eq!(entry("logging.level")["value"], "warn");
        assert_eq!(entry("logging.level")["source"], "env (EDULOOP_LOG_LEVEL)");
        assert_eq!(entry("review.transition_policy")["source"], "default");
    });
}

#[test]
fn explicit_config_file_must_exist() {
    with_database(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let cli = Invocation::load(LoadOptions {
            config_path: Some(dir.path().join("absent.toml")),
            require_file: true,
            ..LoadOptions::default()
        });

        let result = migrate::run(&cli);
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "config_validation");
    });
}

fn invocation() -> Invocation {
    Invocation::load(LoadOptions::default())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

/// Runs `test_fn` with a fresh file database and only the given `EDULOOP_*` vars set.
fn with_database(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    let dir = TempDir::new().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("eduloop.db").display());

    let mut all_vars = vec![("EDULOOP_DATABASE_URL", url.as_str())];
    all_vars.extend_from_slice(vars);
    with_env(&all_vars, test_fn);
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "EDULOOP_DATABASE_URL",
        "EDULOOP_DATABASE_MAX_CONNECTIONS",
        "EDULOOP_DATABASE_TIMEOUT_SECS",
        "EDULOOP_REVIEW_TRANSITION_POLICY",
        "EDULOOP_LOGGING_LEVEL",
        "EDULOOP_LOGGING_FORMAT",
        "EDULOOP_LOG_LEVEL",
        "EDULOOP_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
