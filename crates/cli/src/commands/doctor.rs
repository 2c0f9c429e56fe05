use eduloop_core::config::AppConfig;
use eduloop_db::{connect_with_settings, schema, DbPool};
use serde::Serialize;

use crate::commands::{to_data, CommandResult, Invocation};

const COMMAND: &str = "doctor";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

/// Runs every readiness check. A failed report exits with the code of the
/// first failing check.
pub fn run(invocation: &Invocation) -> CommandResult {
    let report = build_report(invocation);
    let failed = report.checks.iter().find(|check| check.status == CheckStatus::Fail);

    match failed {
        None => CommandResult::success_with_data(COMMAND, report.summary.clone(), to_data(&report)),
        Some(check) => {
            let (error_class, exit_code) = failure_class(check.name);
            CommandResult::failure_with_data(
                COMMAND,
                error_class,
                report.summary.clone(),
                exit_code,
                to_data(&report),
            )
        }
    }
}

fn failure_class(check_name: &str) -> (&'static str, u8) {
    match check_name {
        "config_validation" => ("config_validation", 2),
        "database_connectivity" => ("db_connectivity", 4),
        _ => ("schema", 5),
    }
}

fn build_report(invocation: &Invocation) -> DoctorReport {
    let mut checks = Vec::new();

    match &invocation.config {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: format!(
                    "configuration loaded and validated (transition policy `{}`)",
                    config.review.transition_policy.as_str()
                ),
            });
            checks.extend(check_database(config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["database_connectivity", "schema_readiness"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            }];
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
                return vec![
                    DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Fail,
                        details: format!("failed to connect to database: {error}"),
                    },
                    DoctorCheck {
                        name: "schema_readiness",
                        status: CheckStatus::Skipped,
                        details: "skipped because the database is unreachable".to_string(),
                    },
                ];
            }
        };

        let connectivity = DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        };
        let readiness = check_schema(&pool).await;
        pool.close().await;
        vec![connectivity, readiness]
    })
}

async fn check_schema(pool: &DbPool) -> DoctorCheck {
    match schema::missing_tables(pool).await {
        Ok(missing) if missing.is_empty() => DoctorCheck {
            name: "schema_readiness",
            status: CheckStatus::Pass,
            details: "approval_requests and feedback tables present".to_string(),
        },
        Ok(missing) => DoctorCheck {
            name: "schema_readiness",
            status: CheckStatus::Fail,
            details: format!("missing tables: {}; run `eduloop migrate`", missing.join(", ")),
        },
        Err(error) => DoctorCheck {
            name: "schema_readiness",
            status: CheckStatus::Fail,
            details: format!("failed to inspect schema: {error}"),
        },
    }
}
