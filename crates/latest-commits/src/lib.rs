pub mod auth;
pub mod cancel;
pub mod metadata;
pub mod orchestrator;
pub mod outcome;
pub mod persist;
pub mod report;
pub mod retry;
pub mod target;
pub mod transport;

pub use auth::Auth;
pub use cancel::CancelFlag;
pub use metadata::{MetadataRecord, Timezone, TimezoneError};
pub use orchestrator::{EXIT_FAILURE, EXIT_SUCCESS, Orchestrator, RunError, RunOptions, RunResult, RunSummary};
pub use outcome::{ErrorKind, FetchOutcome, TargetResult};
pub use persist::PersistError;
pub use report::{ErrorEntry, ErrorReport, ReportError};
pub use retry::{Fetched, RetryFailure, RetryPolicy};
pub use target::{FetchTarget, ResolveError, resolve};
pub use transport::{Transport, TransportError};

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
