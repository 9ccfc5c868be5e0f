use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DevbootError {
    #[error("missing required environment variable(s): {}", .0.join(", "))]
    MissingCredential(Vec<String>),

    #[error("could not reclaim port {port}: {reason}")]
    PortReclaimFailure { port: u16, reason: String },

    #[error("command failed ({}): {command}", exit_label(.code))]
    ExternalCommandFailure { command: String, code: Option<i32> },

    #[error("dump file not found: {}", .0.display())]
    MissingDumpFile(PathBuf),

    #[error("dump utility '{0}' not found on PATH")]
    DumpUtilityUnavailable(String),

    #[error("interrupted while {0}")]
    Interrupted(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Which(#[from] which::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "terminated by signal".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, DevbootError>;
