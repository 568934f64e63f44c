use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Run-wide abort signal shared by every in-flight target.
///
/// Set once an authentication failure is seen. Targets check it before
/// starting and retry loops check it before sleeping.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
