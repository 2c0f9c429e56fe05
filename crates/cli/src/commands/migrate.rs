use eduloop_db::schema;

use crate::commands::{execute, CommandResult, Invocation};

pub fn run(invocation: &Invocation) -> CommandResult {
    execute(invocation, "migrate", |_config, pool| async move {
        match schema::ensure_all(&pool).await {
            Ok(()) => CommandResult::success(
                "migrate",
                "ensured approval_requests and feedback tables",
            ),
            Err(error) => CommandResult::failure("migrate", "schema", error.to_string(), 5),
        }
    })
}
