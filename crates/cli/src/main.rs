use std::process::ExitCode;

fn main() -> ExitCode {
    eduloop_cli::run()
}
