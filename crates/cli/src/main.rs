use std::process::ExitCode;

fn main() -> ExitCode {
    paydesk_cli::run()
}
