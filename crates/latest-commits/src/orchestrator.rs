use std::path::{Path, PathBuf};

use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::auth::Auth;
use crate::cancel::CancelFlag;
use crate::metadata::Timezone;
use crate::outcome::{ErrorKind, FetchOutcome, TargetResult};
use crate::persist::write_artifact;
use crate::report::{ErrorReport, ReportError};
use crate::retry::{Fetched, RetryPolicy};
use crate::target::{ERROR_REPORT_FILE, FetchTarget};
use crate::transport::Transport;

/// Every target succeeded.
pub const EXIT_SUCCESS: u8 = 0;
/// At least one target failed, or the run was aborted.
pub const EXIT_FAILURE: u8 = 2;

/// Errors raised after every target was processed. The run's summary is
/// carried along so counts and the abort flag still reach the operator.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("{source}")]
    Report {
        summary: Box<RunSummary>,
        source: ReportError,
    },
}

impl RunError {
    pub fn summary(&self) -> &RunSummary {
        match self {
            RunError::Report { summary, .. } => summary,
        }
    }
}

/// Knobs that shape a run but not the individual fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Targets fetched concurrently. `1` keeps resolver order.
    pub jobs: usize,
    pub timezone: Timezone,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            timezone: Timezone::Local,
        }
    }
}

/// Counts that drive the exit code.
///
/// `succeeded + failed + skipped == total`. Targets are only skipped when
/// an authentication failure aborted the run before they started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunResult {
    pub total_targets: usize,
    pub succeeded_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub aborted: bool,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.failed_count == 0 && !self.aborted
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_success() {
            EXIT_SUCCESS
        } else {
            EXIT_FAILURE
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub result: RunResult,
    /// One entry per attempted target, in completion order.
    pub outcomes: Vec<TargetResult>,
    pub report: ErrorReport,
    /// Set when `fetch_errors.json` was written.
    pub report_path: Option<PathBuf>,
}

/// Drives targets through the retry policy and persists what comes back.
pub struct Orchestrator<T> {
    transport: T,
    auth: Auth,
    policy: RetryPolicy,
    options: RunOptions,
}

impl<T: Transport> Orchestrator<T> {
    pub fn new(transport: T, auth: Auth, policy: RetryPolicy, options: RunOptions) -> Self {
        Self {
            transport,
            auth,
            policy,
            options,
        }
    }

    /// Fetch every target, then write the error report under `out_root`.
    ///
    /// Ordinary failures are recorded and the run continues. An
    /// authentication failure stops new targets from starting; targets
    /// already in flight finish their current attempt.
    pub async fn run(
        &self,
        targets: Vec<FetchTarget>,
        out_root: &Path,
    ) -> Result<RunSummary, RunError> {
        let total = targets.len();
        let jobs = self.options.jobs.max(1);
        let cancel = CancelFlag::new();

        info!(
            targets = total,
            jobs,
            attempts = self.policy.max_attempts(),
            auth = self.auth.scheme(),
            "starting fetch run"
        );

        let cancel_ref = &cancel;
        let mut results = futures::stream::iter(targets)
            .map(move |target| async move {
                let outcome = self.fetch_target(&target, cancel_ref).await;
                (target, outcome)
            })
            .buffer_unordered(jobs);

        let mut report = ErrorReport::new();
        let mut outcomes = Vec::with_capacity(total);
        let mut succeeded = 0;
        let mut failed = 0;

        while let Some((target, outcome)) = results.next().await {
            let Some(outcome) = outcome else {
                continue;
            };

            match &outcome {
                FetchOutcome::Success { bytes_written, .. } => {
                    succeeded += 1;
                    info!(
                        build = target.build(),
                        platform = target.platform(),
                        bytes = bytes_written,
                        path = %target.artifact_path().display(),
                        "saved"
                    );
                }
                FetchOutcome::Failure {
                    error_kind,
                    message,
                    attempts_made,
                } => {
                    failed += 1;
                    report.record(&target, *error_kind, message.clone(), *attempts_made);
                    if error_kind.is_fatal() {
                        error!(
                            build = target.build(),
                            platform = target.platform(),
                            url = target.source_url(),
                            "authentication failed, aborting run"
                        );
                    } else {
                        warn!(
                            build = target.build(),
                            platform = target.platform(),
                            url = target.source_url(),
                            kind = %error_kind,
                            attempts = attempts_made,
                            "target failed: {message}"
                        );
                    }
                }
            }

            outcomes.push(TargetResult { target, outcome });
        }
        drop(results);

        let aborted = cancel.is_cancelled();
        let result = RunResult {
            total_targets: total,
            succeeded_count: succeeded,
            failed_count: failed,
            skipped_count: total - succeeded - failed,
            aborted,
        };

        info!(
            succeeded = result.succeeded_count,
            failed = result.failed_count,
            skipped = result.skipped_count,
            aborted,
            "fetch run finished"
        );

        let path = out_root.join(ERROR_REPORT_FILE);
        let written = if report.is_empty() {
            ErrorReport::remove_stale(&path).map(|()| None)
        } else {
            report.flush(&path).map(|()| Some(path))
        };

        let mut summary = RunSummary {
            result,
            outcomes,
            report,
            report_path: None,
        };
        match written {
            Ok(report_path) => {
                summary.report_path = report_path;
                Ok(summary)
            }
            Err(source) => Err(RunError::Report {
                summary: Box::new(summary),
                source,
            }),
        }
    }

    /// `None` when the run was aborted before this target started.
    async fn fetch_target(
        &self,
        target: &FetchTarget,
        cancel: &CancelFlag,
    ) -> Option<FetchOutcome> {
        if cancel.is_cancelled() {
            debug!(
                build = target.build(),
                platform = target.platform(),
                "run aborted, skipping"
            );
            return None;
        }

        info!(
            url = target.source_url(),
            dest = %target.dest_dir().display(),
            "fetching"
        );

        let outcome = match self
            .policy
            .fetch_with_retry(&self.transport, target.source_url(), &self.auth, cancel)
            .await
        {
            Ok(fetched) => self.persist(target, fetched),
            Err(failure) => {
                if failure.is_fatal() {
                    cancel.cancel();
                }
                FetchOutcome::Failure {
                    error_kind: ErrorKind::from_transport(failure.error()),
                    message: failure.error().to_string(),
                    attempts_made: failure.attempts(),
                }
            }
        };

        Some(outcome)
    }

    fn persist(&self, target: &FetchTarget, fetched: Fetched) -> FetchOutcome {
        // Stamped when the fetch completed, not when the run started.
        let fetched_at = self.options.timezone.now();

        match write_artifact(target, &fetched.body, fetched_at) {
            Ok(bytes_written) => FetchOutcome::Success {
                bytes_written,
                fetched_at,
            },
            Err(e) => FetchOutcome::Failure {
                error_kind: ErrorKind::FilesystemFailure,
                message: e.to_string(),
                attempts_made: fetched.attempts,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::metadata::MetadataRecord;
    use crate::report::ErrorEntry;
    use crate::target::resolve;
    use crate::test_support::{ScriptedTransport, ok, status};

    use super::*;

    const BASE: &str = "https://host/repo";

    fn url(build: &str, platform: &str) -> String {
        format!("{BASE}/{build}/{platform}/latest_commits.txt")
    }

    fn orchestrator(
        transport: Arc<ScriptedTransport>,
        jobs: usize,
    ) -> Orchestrator<Arc<ScriptedTransport>> {
        Orchestrator::new(
            transport,
            Auth::bearer("token"),
            RetryPolicy::new(3, Duration::ZERO),
            RunOptions {
                jobs,
                ..RunOptions::default()
            },
        )
    }

    fn read_report(path: &Path) -> Vec<ErrorEntry> {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn all_success_exits_zero_without_report() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::serving("abc123\n"));
        let targets = resolve(&["3025"], &["windows", "linux"], BASE, dir.path()).unwrap();

        let summary = orchestrator(transport, 1)
            .run(targets, dir.path())
            .await
            .unwrap();

        assert_eq!(summary.result.total_targets, 2);
        assert_eq!(summary.result.succeeded_count, 2);
        assert_eq!(summary.result.failed_count, 0);
        assert_eq!(summary.result.exit_code(), EXIT_SUCCESS);
        assert!(summary.report_path.is_none());
        assert!(!dir.path().join("fetch_errors.json").exists());

        let windows = MetadataRecord::read(&dir.path().join("3025/windows/meta.json")).unwrap();
        let linux = MetadataRecord::read(&dir.path().join("3025/linux/meta.json")).unwrap();
        assert_eq!(windows.platform, "windows");
        assert_eq!(linux.platform, "linux");
        assert!(windows.fetched_at <= linux.fetched_at);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("3025/linux/latest_commits.txt")).unwrap(),
            "abc123\n"
        );
    }

    #[tokio::test]
    async fn persistent_not_found_is_recorded_and_run_continues() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::serving("ok"));
        for _ in 0..3 {
            transport.push(&url("9999", "zzz"), status(404));
        }
        let targets = resolve(&["9999", "3025"], &["zzz", "linux"], BASE, dir.path()).unwrap();

        let summary = orchestrator(Arc::clone(&transport), 1)
            .run(targets, dir.path())
            .await
            .unwrap();

        assert_eq!(summary.result.failed_count, 1);
        assert_eq!(summary.result.succeeded_count, 3);
        assert!(!summary.result.aborted);
        assert_eq!(summary.result.exit_code(), EXIT_FAILURE);
        assert_eq!(transport.calls_to(&url("9999", "zzz")), 3);

        let failure = summary
            .outcomes
            .iter()
            .find(|r| r.target.build() == "9999" && r.target.platform() == "zzz")
            .unwrap();
        assert_eq!(
            failure.outcome.error_kind(),
            Some(ErrorKind::HttpFailure { status: 404 })
        );

        let entries = read_report(&dir.path().join("fetch_errors.json"));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].build, "9999");
        assert_eq!(entries[0].error_kind, "http_failure");
        assert_eq!(entries[0].status, Some(404));
        assert_eq!(entries[0].attempts, 3);
        assert_eq!(summary.report_path, Some(dir.path().join("fetch_errors.json")));
    }

    #[tokio::test]
    async fn auth_failure_aborts_remaining_targets() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::serving("ok"));
        transport.push(&url("1", "linux"), status(500));
        transport.push(&url("1", "linux"), status(500));
        transport.push(&url("2", "windows"), status(401));
        let targets = resolve(&["1", "2", "3"], &["windows", "linux"], BASE, dir.path()).unwrap();

        let summary = orchestrator(Arc::clone(&transport), 1)
            .run(targets, dir.path())
            .await
            .unwrap();

        let result = summary.result;
        assert!(result.aborted);
        assert_eq!(result.exit_code(), EXIT_FAILURE);
        assert_eq!(result.succeeded_count, 2);
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.skipped_count, 3);
        assert_eq!(
            result.succeeded_count + result.failed_count + result.skipped_count,
            result.total_targets
        );

        // Nothing after the auth failure in resolver order was attempted.
        assert_eq!(transport.calls_to(&url("2", "linux")), 0);
        assert_eq!(transport.calls_to(&url("3", "windows")), 0);
        assert_eq!(transport.calls_to(&url("3", "linux")), 0);

        let entries = read_report(&dir.path().join("fetch_errors.json"));
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_auth_failure());
        assert_eq!(entries[0].status, Some(401));
        assert_eq!(summary.report.auth_failure().unwrap().build, "2");
    }

    #[tokio::test]
    async fn report_keeps_failures_before_the_auth_failure() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::serving("ok"));
        for _ in 0..3 {
            transport.push(&url("1", "arm"), status(503));
        }
        transport.push(&url("2", "arm"), status(403));
        let targets = resolve(&["1", "2"], &["arm"], BASE, dir.path()).unwrap();

        let summary = orchestrator(transport, 1)
            .run(targets, dir.path())
            .await
            .unwrap();

        let entries = read_report(&dir.path().join("fetch_errors.json"));
        let kinds: Vec<&str> = entries.iter().map(|e| e.error_kind.as_str()).collect();
        assert_eq!(kinds, vec!["http_failure", "auth_failure"]);
        assert!(summary.result.aborted);
    }

    #[tokio::test]
    async fn filesystem_failure_is_recorded_per_target() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("3025"), "blocks the build dir").unwrap();
        let transport = Arc::new(ScriptedTransport::serving("ok"));
        let targets = resolve(&["3025", "3026"], &["linux"], BASE, dir.path()).unwrap();

        let summary = orchestrator(transport, 1)
            .run(targets, dir.path())
            .await
            .unwrap();

        assert_eq!(summary.result.failed_count, 1);
        assert_eq!(summary.result.succeeded_count, 1);
        assert!(!summary.result.aborted);
        assert_eq!(summary.report.entries()[0].error_kind, "filesystem_failure");
        assert!(dir.path().join("3026/linux/latest_commits.txt").exists());
    }

    #[tokio::test]
    async fn successful_run_removes_stale_report() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("fetch_errors.json");
        std::fs::write(&stale, "[]").unwrap();
        let transport = Arc::new(ScriptedTransport::serving("ok"));
        let targets = resolve(&["1"], &["linux"], BASE, dir.path()).unwrap();

        orchestrator(transport, 1)
            .run(targets, dir.path())
            .await
            .unwrap();

        assert!(!stale.exists());
    }

    #[tokio::test]
    async fn unwritable_report_is_a_run_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        // Directory where the report file should go.
        std::fs::create_dir_all(out.join("fetch_errors.json")).unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        let targets = resolve(&["1"], &["linux"], BASE, &out).unwrap();

        let result = orchestrator(transport, 1).run(targets, &out).await;
        assert!(matches!(
            result,
            Err(RunError::Report {
                source: ReportError::Io { .. },
                ..
            })
        ));
    }

    #[tokio::test]
    async fn unwritable_report_keeps_aborted_summary() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir_all(out.join("fetch_errors.json")).unwrap();
        let transport = Arc::new(ScriptedTransport::serving("ok"));
        transport.push(&url("1", "linux"), status(401));
        let targets = resolve(&["1", "2"], &["windows", "linux"], BASE, &out).unwrap();

        let err = orchestrator(transport, 1)
            .run(targets, &out)
            .await
            .unwrap_err();

        let summary = err.summary();
        assert!(summary.result.aborted);
        assert_eq!(summary.result.succeeded_count, 1);
        assert_eq!(summary.result.failed_count, 1);
        assert_eq!(summary.result.skipped_count, 2);
        assert_eq!(summary.result.exit_code(), EXIT_FAILURE);
        assert!(summary.report_path.is_none());
        assert_eq!(summary.report.auth_failure().unwrap().platform, "linux");
    }

    #[tokio::test]
    async fn auth_failure_stops_parallel_workers() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::with_fallback(status(500)));
        transport.push(&url("1", "windows"), status(401));
        let targets = resolve(&["1", "2", "3"], &["windows", "linux"], BASE, dir.path()).unwrap();

        let summary = orchestrator(Arc::clone(&transport), 2)
            .run(targets, dir.path())
            .await
            .unwrap();

        let result = summary.result;
        assert!(result.aborted);
        assert_eq!(result.total_targets, 6);
        assert_eq!(result.succeeded_count, 0);
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.skipped_count, 5);
        assert_eq!(transport.calls().len(), 1);
        assert!(summary.report.auth_failure().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_jobs_complete_every_target() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::serving("ok"));
        transport.push(&url("2", "arm"), status(500));
        transport.push(&url("2", "arm"), status(500));
        transport.push(&url("2", "arm"), status(500));
        let builds: Vec<String> = (1..=4).map(|b| b.to_string()).collect();
        let targets = resolve(&builds, &["windows", "linux", "arm"], BASE, dir.path()).unwrap();

        let summary = orchestrator(Arc::clone(&transport), 4)
            .run(targets, dir.path())
            .await
            .unwrap();

        assert_eq!(summary.result.total_targets, 12);
        assert_eq!(summary.result.succeeded_count, 11);
        assert_eq!(summary.result.failed_count, 1);
        assert_eq!(summary.result.skipped_count, 0);
        assert_eq!(summary.outcomes.len(), 12);
        assert_eq!(transport.calls().len(), 14);
    }

    #[test]
    fn exit_codes() {
        let clean = RunResult {
            total_targets: 2,
            succeeded_count: 2,
            failed_count: 0,
            skipped_count: 0,
            aborted: false,
        };
        assert_eq!(clean.exit_code(), EXIT_SUCCESS);

        let partial = RunResult {
            succeeded_count: 1,
            failed_count: 1,
            ..clean
        };
        assert_eq!(partial.exit_code(), EXIT_FAILURE);

        let total = RunResult {
            succeeded_count: 0,
            failed_count: 2,
            ..clean
        };
        assert_eq!(total.exit_code(), EXIT_FAILURE);
    }
}
