use std::env;
use std::fs;
use std::path::Path;

use eduloop_core::config::resolve_config_path;
use serde::Serialize;
use toml::Value;

use crate::commands::{to_data, CommandResult, Invocation};

const COMMAND: &str = "config";

struct Field<'a> {
    key_path: &'static str,
    value: String,
    flag: Option<&'static str>,
    env_keys: &'a [&'static str],
}

#[derive(Debug, Serialize)]
struct EffectiveValue {
    key: &'static str,
    value: String,
    source: String,
}

pub fn run(invocation: &Invocation) -> CommandResult {
    let config = match invocation.config_for(COMMAND) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let config_file_path = resolve_config_path(invocation.options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let overrides = &invocation.options.overrides;

    let fields = [
        Field {
            key_path: "database.url",
            value: config.database.url.clone(),
            flag: overrides.database_url.as_ref().map(|_| "--database-url"),
            env_keys: &["EDULOOP_DATABASE_URL"],
        },
        Field {
            key_path: "database.max_connections",
            value: config.database.max_connections.to_string(),
            flag: None,
            env_keys: &["EDULOOP_DATABASE_MAX_CONNECTIONS"],
        },
        Field {
            key_path: "database.timeout_secs",
            value: config.database.timeout_secs.to_string(),
            flag: None,
            env_keys: &["EDULOOP_DATABASE_TIMEOUT_SECS"],
        },
        Field {
            key_path: "review.transition_policy",
            value: config.review.transition_policy.as_str().to_string(),
            flag: None,
            env_keys: &["EDULOOP_REVIEW_TRANSITION_POLICY"],
        },
        Field {
            key_path: "logging.level",
            value: config.logging.level.clone(),
            flag: overrides.log_level.as_ref().map(|_| "--log-level"),
            env_keys: &["EDULOOP_LOGGING_LEVEL", "EDULOOP_LOG_LEVEL"],
        },
        Field {
            key_path: "logging.format",
            value: format!("{:?}", config.logging.format).to_ascii_lowercase(),
            flag: None,
            env_keys: &["EDULOOP_LOGGING_FORMAT", "EDULOOP_LOG_FORMAT"],
        },
    ];

    let values: Vec<EffectiveValue> = fields
        .iter()
        .map(|field| EffectiveValue {
            key: field.key_path,
            value: field.value.clone(),
            source: field_source(field, config_file_doc.as_ref(), config_file_path.as_deref()),
        })
        .collect();

    CommandResult::success_with_data(
        COMMAND,
        "effective config (source precedence: flag > env > file > default)",
        to_data(&values),
    )
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    field: &Field<'_>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(flag) = field.flag {
        return format!("flag ({flag})");
    }

    let env_hit = field
        .env_keys
        .iter()
        .find(|key| env::var(key).is_ok_and(|value| !value.trim().is_empty()));
    if let Some(env_key) = env_hit {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, field.key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::{contains_path, field_source, Field};

    #[test]
    fn nested_keys_are_found_in_file_document() {
        let doc: toml::Value =
            "[review]\ntransition_policy = \"pending_only\"\n".parse().expect("valid toml");

        assert!(contains_path(&doc, "review.transition_policy"));
        assert!(!contains_path(&doc, "database.url"));
    }

    #[test]
    fn flag_source_wins_over_file() {
        let doc: toml::Value = "[logging]\nlevel = \"warn\"\n".parse().expect("valid toml");
        let flagged = Field {
            key_path: "logging.level",
            value: "debug".to_string(),
            flag: Some("--log-level"),
            env_keys: &[],
        };
        let from_file = Field { flag: None, value: "warn".to_string(), ..flagged };

        assert_eq!(field_source(&flagged, Some(&doc), None), "flag (--log-level)");
        assert_eq!(field_source(&from_file, Some(&doc), None), "file (config file)");
    }
}
