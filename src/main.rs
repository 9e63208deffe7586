use std::process::ExitCode;

fn main() -> ExitCode {
    cycle_events_lib::run()
}
