use std::process::ExitCode;

fn main() -> ExitCode {
    brokerage_cli::run()
}
