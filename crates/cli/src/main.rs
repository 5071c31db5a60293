use std::process::ExitCode;

fn main() -> ExitCode {
    kommo_cli::run()
}
