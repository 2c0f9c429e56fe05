use eduloop_core::domain::approval::{ApprovalRequestId, ReviewAction};
use eduloop_core::errors::ApplicationError;
use eduloop_review::ApprovalManager;
use serde_json::{json, Value};

use crate::commands::{execute, to_data, CommandResult, Invocation};

pub fn submit(
    invocation: &Invocation,
    subject: &str,
    decision_type: &str,
    data: &str,
    priority: Option<&str>,
) -> CommandResult {
    const COMMAND: &str = "approval submit";

    let decision_data = match serde_json::from_str::<Value>(data) {
        Ok(value) => value,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "validation",
                format!("--data is not valid JSON: {error}"),
                6,
            );
        }
    };

    execute(invocation, COMMAND, |config, pool| async move {
        let manager = ApprovalManager::sqlite(pool, config.review.transition_policy);
        match manager.create_approval_request(subject, decision_type, decision_data, priority).await
        {
            Ok(id) => CommandResult::success_with_data(
                COMMAND,
                format!("approval request {id} queued"),
                Some(json!({ "request_id": id.to_string() })),
            ),
            Err(error) => CommandResult::from_application_error(COMMAND, &error),
        }
    })
}

pub fn review(
    invocation: &Invocation,
    action: ReviewAction,
    id: &str,
    reviewer: &str,
    comments: &str,
) -> CommandResult {
    let command = match action {
        ReviewAction::Approve => "approval approve",
        ReviewAction::Reject => "approval reject",
        ReviewAction::RequestRevision => "approval revise",
    };
    let id = match parse_id(command, id) {
        Ok(id) => id,
        Err(failure) => return failure,
    };

    execute(invocation, command, |config, pool| async move {
        let manager = ApprovalManager::sqlite(pool, config.review.transition_policy);
        let result = match action {
            ReviewAction::Approve => manager.approve_request(id, reviewer, comments).await,
            ReviewAction::Reject => manager.reject_request(id, reviewer, comments).await,
            ReviewAction::RequestRevision => manager.request_revision(id, reviewer, comments).await,
        };

        match result {
            Ok(updated) => CommandResult::success_with_data(
                command,
                format!("approval request {id} is now {}", updated.status),
                to_data(&updated),
            ),
            Err(error) => CommandResult::from_application_error(command, &error),
        }
    })
}

pub fn pending(invocation: &Invocation, priority: Option<&str>) -> CommandResult {
    const COMMAND: &str = "approval pending";

    execute(invocation, COMMAND, |config, pool| async move {
        let manager = ApprovalManager::sqlite(pool, config.review.transition_policy);
        match manager.get_pending_requests(priority).await {
            Ok(requests) => CommandResult::success_with_data(
                COMMAND,
                format!("{} pending approval request(s)", requests.len()),
                to_data(&requests),
            ),
            Err(error) => CommandResult::from_application_error(COMMAND, &error),
        }
    })
}

pub fn status(invocation: &Invocation, id: &str) -> CommandResult {
    const COMMAND: &str = "approval status";

    let id = match parse_id(COMMAND, id) {
        Ok(id) => id,
        Err(failure) => return failure,
    };

    execute(invocation, COMMAND, |config, pool| async move {
        let manager = ApprovalManager::sqlite(pool, config.review.transition_policy);
        match manager.get_request_status(id).await {
            Ok(Some(request)) => CommandResult::success_with_data(
                COMMAND,
                format!("approval request {id} is {}", request.status),
                to_data(&request),
            ),
            Ok(None) => CommandResult::from_application_error(
                COMMAND,
                &ApplicationError::NotFound { entity: "approval request", id: id.to_string() },
            ),
            Err(error) => CommandResult::from_application_error(COMMAND, &error),
        }
    })
}

fn parse_id(command: &str, raw: &str) -> Result<ApprovalRequestId, CommandResult> {
    raw.parse::<ApprovalRequestId>()
        .map_err(|error| CommandResult::from_application_error(command, &error.into()))
}
