pub mod approval;
pub mod config;
pub mod doctor;
pub mod feedback;
pub mod migrate;

use std::future::Future;

use eduloop_core::config::{AppConfig, ConfigError, LoadOptions};
use eduloop_core::errors::ApplicationError;
use eduloop_db::{connect_with_settings, DbPool};
use serde::Serialize;
use serde_json::Value;

/// Configuration resolved once per process and handed to every command.
#[derive(Debug)]
pub struct Invocation {
    pub options: LoadOptions,
    pub config: Result<AppConfig, ConfigError>,
}

impl Invocation {
    pub fn load(options: LoadOptions) -> Self {
        let config = AppConfig::load(options.clone());
        Self { options, config }
    }

    /// The loaded config, or the command's `config_validation` failure.
    pub(crate) fn config_for(&self, command: &str) -> Result<&AppConfig, CommandResult> {
        self.config.as_ref().map_err(|error| {
            CommandResult::from_application_error(
                command,
                &ApplicationError::Configuration(error.to_string()),
            )
        })
    }
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::failure_with_data(command, error_class, message, exit_code, None)
    }

    pub fn failure_with_data(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn from_application_error(command: &str, error: &ApplicationError) -> Self {
        let exit_code = match error {
            ApplicationError::Configuration(_) => 2,
            ApplicationError::Persistence(_) => 5,
            ApplicationError::Domain(_) => 6,
            ApplicationError::NotFound { .. } => 7,
        };
        Self::failure(command, error.error_class(), error.to_string(), exit_code)
    }
}

/// Opens the pool, runs `operation` on a single-threaded runtime, and
/// closes the pool before returning.
pub(crate) fn execute<F, Fut>(
    invocation: &Invocation,
    command: &str,
    operation: F,
) -> CommandResult
where
    F: FnOnce(AppConfig, DbPool) -> Fut,
    Fut: Future<Output = CommandResult>,
{
    let config = match invocation.config_for(command) {
        Ok(config) => config.clone(),
        Err(failure) => return failure,
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        {
            Ok(pool) => pool,
            Err(error) => {
                return CommandResult::failure(command, "db_connectivity", error.to_string(), 4);
            }
        };

        let result = operation(config, pool.clone()).await;
        pool.close().await;
        result
    })
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub(crate) fn to_data<T: Serialize>(value: &T) -> Option<Value> {
    serde_json::to_value(value).ok()
}

#[cfg(test)]
mod tests {
    use eduloop_core::config::{ConfigError, LoadOptions};
    use eduloop_core::errors::{ApplicationError, DomainError};
    use serde_json::{json, Value};

    use super::{execute, CommandResult, Invocation};

    fn parse(result: &CommandResult) -> Value {
        serde_json::from_str(&result.output).expect("valid JSON")
    }

    #[test]
    fn application_errors_map_to_stable_exit_codes() {
        let cases = [
            (ApplicationError::from(DomainError::validation("rating", "out of range")), 6),
            (ApplicationError::NotFound { entity: "approval request", id: "9".into() }, 7),
            (ApplicationError::Persistence("disk I/O error".into()), 5),
            (ApplicationError::Configuration("bad url".into()), 2),
        ];

        for (error, expected_exit) in cases {
            let result = CommandResult::from_application_error("approval approve", &error);
            assert_eq!(result.exit_code, expected_exit);
            assert_eq!(parse(&result)["error_class"], error.error_class());
        }
    }

    #[test]
    fn config_failure_stops_command_before_it_runs() {
        let invocation = Invocation {
            options: LoadOptions::default(),
            config: Err(ConfigError::Validation("logging.level must be one of ...".into())),
        };

        let result = execute(&invocation, "approval pending", |_config, _pool| async {
            CommandResult::success("approval pending", "operation ran")
        });

        assert_eq!(result.exit_code, 2);
        let payload = parse(&result);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
        assert!(payload["message"].as_str().is_some_and(|m| m.contains("logging.level")));
    }

    #[test]
    fn failures_can_carry_data() {
        let result = CommandResult::failure_with_data(
            "doctor",
            "schema",
            "one or more readiness checks failed",
            5,
            Some(json!({"overall_status": "fail"})),
        );

        assert_eq!(result.exit_code, 5);
        assert_eq!(parse(&result)["data"]["overall_status"], "fail");
    }

    #[test]
    fn data_is_omitted_when_absent() {
        let plain = parse(&CommandResult::success("migrate", "done"));
        assert!(plain.get("data").is_none());

        let with_data = parse(&CommandResult::success_with_data(
            "feedback average",
            "average computed",
            Some(json!({"average_rating": 4.5})),
        ));
        assert_eq!(with_data["data"]["average_rating"], 4.5);
    }
}
