//! Cancellation token with an optional deadline.
//!
//! Storage operations take a `&Cancellation` and poll it at their suspension
//! points: between retry attempts and between multipart parts. Cancelling
//! after a tier's commit point does not roll back the write; it only unblocks
//! the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{TfSafeError, TfSafeResult};

/// Cooperative cancellation flag plus an optional deadline.
///
/// Clones share the flag; [`Cancellation::child`] derives a token with a
/// tighter deadline for a single tier call.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Cancellation {
    /// A token that never fires on its own.
    pub fn none() -> Self {
        Self::default()
    }

    /// A token that fires `timeout` from now.
    pub fn with_deadline(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Derives a token sharing this flag but bounded by `timeout` from now,
    /// or by the parent deadline if that is sooner.
    pub fn child(&self, timeout: Duration) -> Self {
        let child_deadline = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) => Some(parent.min(child_deadline)),
            None => Some(child_deadline),
        };
        Self {
            flag: Arc::clone(&self.flag),
            deadline,
        }
    }

    /// Requests cancellation; every clone observes it.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether the flag fired or the deadline passed.
    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        matches!(self.deadline, Some(d) if Instant::now() >= d)
    }

    /// Errors with [`TfSafeError::Cancelled`] naming `operation` when fired.
    pub fn check(&self, operation: &str) -> TfSafeResult<()> {
        if self.is_cancelled() {
            return Err(TfSafeError::Cancelled {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_token_is_live() {
        let cancel = Cancellation::none();
        assert!(!cancel.is_cancelled());
        assert!(cancel.check("store").is_ok());
    }

    #[test]
    fn test_cancel_propagates_to_clones() {
        let cancel = Cancellation::none();
        let clone = cancel.clone();
        cancel.cancel();
        assert!(clone.is_cancelled());
        let err = clone.check("retrieve").unwrap_err();
        assert!(matches!(err, TfSafeError::Cancelled { ref operation } if operation == "retrieve"));
    }

    #[test]
    fn test_expired_deadline_fires() {
        let cancel = Cancellation::with_deadline(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_child_inherits_flag_not_only_deadline() {
        let parent = Cancellation::none();
        let child = parent.child(Duration::from_secs(3600));
        assert!(!child.is_cancelled());
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_child_deadline_never_exceeds_parent() {
        let parent = Cancellation::with_deadline(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        let child = parent.child(Duration::from_secs(3600));
        assert!(child.is_cancelled());
    }
}
