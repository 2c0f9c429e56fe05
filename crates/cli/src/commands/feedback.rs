use eduloop_review::FeedbackHandler;
use serde_json::json;

use crate::commands::{execute, to_data, CommandResult, Invocation};

pub fn submit(
    invocation: &Invocation,
    subject: &str,
    recommendation: &str,
    feedback_type: &str,
    comments: &str,
    rating: Option<i64>,
) -> CommandResult {
    const COMMAND: &str = "feedback submit";

    execute(invocation, COMMAND, |_config, pool| async move {
        let handler = FeedbackHandler::sqlite(pool);
        match handler.submit_feedback(subject, recommendation, feedback_type, comments, rating).await
        {
            Ok(record) => CommandResult::success_with_data(
                COMMAND,
                format!("feedback {} recorded", record.id.0),
                to_data(&record),
            ),
            Err(error) => CommandResult::from_application_error(COMMAND, &error),
        }
    })
}

pub fn history(invocation: &Invocation, subject: &str) -> CommandResult {
    const COMMAND: &str = "feedback history";

    execute(invocation, COMMAND, |_config, pool| async move {
        let handler = FeedbackHandler::sqlite(pool);
        match handler.get_feedback_history(subject).await {
            Ok(records) => CommandResult::success_with_data(
                COMMAND,
                format!("{} feedback record(s) for {subject}", records.len()),
                to_data(&records),
            ),
            Err(error) => CommandResult::from_application_error(COMMAND, &error),
        }
    })
}

pub fn average(invocation: &Invocation, recommendation: &str) -> CommandResult {
    const COMMAND: &str = "feedback average";

    execute(invocation, COMMAND, |_config, pool| async move {
        let handler = FeedbackHandler::sqlite(pool);
        match handler.get_average_rating(recommendation).await {
            Ok(average) => {
                let message = match average {
                    Some(value) => format!("average rating for {recommendation} is {value:.2}"),
                    None => format!("no rated feedback for {recommendation}"),
                };
                CommandResult::success_with_data(
                    COMMAND,
                    message,
                    Some(json!({
                        "recommendation_id": recommendation,
                        "average_rating": average,
                    })),
                )
            }
            Err(error) => CommandResult::from_application_error(COMMAND, &error),
        }
    })
}
