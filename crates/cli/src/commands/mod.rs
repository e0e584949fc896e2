pub mod chat;
pub mod config;
pub mod estimate;

use serde::Serialize;

/// What a subcommand hands back to `run`: stdout text plus the process exit
/// code. Successful commands print their domain output directly (an estimate
/// breakdown, a config listing); failures print a one-line JSON error report
/// so scripted callers can branch on `error_class`.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct ErrorReport<'a> {
    command: &'a str,
    error_class: &'a str,
    message: &'a str,
}

impl CommandResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self { exit_code: 0, output: output.into() }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let message = message.into();
        let report = ErrorReport { command, error_class, message: &message };
        let output = serde_json::to_string(&report)
            .unwrap_or_else(|_| format!("{command} failed ({error_class}): {message}"));
        Self { exit_code, output }
    }
}
