//! Shared cancellation flag for one render.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cheap-to-clone cancellation signal.
///
/// The host (or a host-polling observer) sets it; the executor checks it
/// between nodes and long-running compute steps poll it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear before reusing the token for the next render
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
