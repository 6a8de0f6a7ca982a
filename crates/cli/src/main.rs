use std::process::ExitCode;

fn main() -> ExitCode {
    tenantry_cli::run()
}
