mod attendance;
mod config;
mod db;
mod guard;
mod history;
mod ipc;
mod logging;
mod registry;
mod roster;

use clap::Parser;
use std::io::{self, BufRead, Write};

fn main() {
    let args = config::Args::parse();
    logging::init(args.log_format);

    let mut state = ipc::AppState::new();
    if let Some(path) = args.workspace.as_deref() {
        // A bad startup workspace is not fatal; the UI can still select one.
        if let Err(e) = ipc::select_workspace(&mut state, path) {
            tracing::warn!(workspace = %path.display(), error = %e, "startup workspace not opened");
        }
    }
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rollcalld ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                tracing::warn!(error = %e, "unparseable request line");
                let _ = writeln!(
                    stdout,
                    "{}",
                    serde_json::json!({
                        "ok": false,
                        "error": { "code": "bad_json", "message": e.to_string() }
                    })
                );
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    if !state.sessions.is_empty() {
        tracing::info!(discarded = state.sessions.len(), "exiting with unsubmitted check-in sessions");
    }
}
