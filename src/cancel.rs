use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{P4Error, P4Result};

/// Shared interruption flag for long running resolution and server calls.
///
/// Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(P4Error::Cancelled)` once [`cancel`](Self::cancel) was called.
    pub fn check(&self) -> P4Result<()> {
        if self.is_cancelled() {
            Err(P4Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
