use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Command-line arguments for rollcalld. Requests arrive on stdin, so
/// everything here is startup-only.
#[derive(Parser, Debug)]
#[command(name = "rollcalld")]
#[command(about = "Class-session check-in sidecar")]
#[command(version)]
pub struct Args {
    /// Workspace directory to open at startup
    #[arg(short, long, env = "ROLLCALLD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Log line format written to stderr
    #[arg(long, value_enum, default_value_t = LogFormat::Compact, env = "ROLLCALLD_LOG_FORMAT")]
    pub log_format: LogFormat,
}

/// Settings key holding notification message overrides.
pub const NOTIFY_MESSAGES_KEY: &str = "checkin.notifyMessages";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_arguments() {
        let args = Args::try_parse_from(["rollcalld"]).expect("parse");
        assert_eq!(args.log_format, LogFormat::Compact);
    }

    #[test]
    fn workspace_and_json_logs() {
        let args = Args::try_parse_from([
            "rollcalld",
            "--workspace",
            "/tmp/rollcall-ws",
            "--log-format",
            "json",
        ])
        .expect("parse");
        assert_eq!(args.workspace, Some(PathBuf::from("/tmp/rollcall-ws")));
        assert_eq!(args.log_format, LogFormat::Json);
    }

    #[test]
    fn rejects_unknown_log_format() {
        assert!(Args::try_parse_from(["rollcalld", "--log-format", "xml"]).is_err());
    }
}
