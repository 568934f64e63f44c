use latest_commits::{RunResult, RunSummary};

use crate::config::TOKEN_ENV;

/// Print the end-of-run summary: abort notice and report path to stderr,
/// counts to stdout.
pub fn print(summary: &RunSummary) {
    if let Some(message) = abort_message(summary) {
        eprintln!("{message}");
    }

    println!("\n{}", summary_line(&summary.result));

    if let Some(path) = &summary.report_path {
        eprintln!("Errors written to {}", path.display());
    }
}

pub fn summary_line(result: &RunResult) -> String {
    let mut line = format!(
        "Completed. Successful files: {}. Errors: {}.",
        result.succeeded_count, result.failed_count
    );
    if result.skipped_count > 0 {
        line.push_str(&format!(" Not attempted: {}.", result.skipped_count));
    }
    line
}

/// A credential problem gets its own message so it is not mistaken for a
/// flaky network.
pub fn abort_message(summary: &RunSummary) -> Option<String> {
    if !summary.result.aborted {
        return None;
    }

    let detail = summary
        .report
        .auth_failure()
        .map(|entry| {
            let status = entry
                .status
                .map(|s| format!("HTTP {s} "))
                .unwrap_or_default();
            format!(" {status}fetching {}", entry.source_url)
        })
        .unwrap_or_default();

    Some(format!(
        "AUTH ERROR{detail}: credentials were rejected, run aborted. \
         Check {TOKEN_ENV} or --user/--password."
    ))
}
