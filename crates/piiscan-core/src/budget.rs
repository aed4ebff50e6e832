//! Wall-clock budget and cancellation for a single scan job.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Result, ScanError};

/// Deadline plus a cancellation flag shared between a job and its submitter.
///
/// Long-running stages call [`JobBudget::check`] between units of work so a
/// cancelled or expired job stops promptly and frees its worker.
#[derive(Debug, Clone)]
pub struct JobBudget {
    limit: Duration,
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl JobBudget {
    /// Budget that expires `limit` from now.
    pub fn new(limit: Duration) -> Self {
        Self {
            limit,
            deadline: Instant::now().checked_add(limit),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Budget that never expires on its own.
    pub fn unlimited() -> Self {
        Self {
            limit: Duration::MAX,
            deadline: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Ask the job to stop at its next check.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn is_expired(&self) -> bool {
        self.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail with [`ScanError::ProcessingTimeout`] once the budget is spent.
    pub fn check(&self) -> Result<()> {
        if self.is_expired() {
            return Err(ScanError::ProcessingTimeout { limit: self.limit });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_budget_is_expired() {
        let budget = JobBudget::new(Duration::ZERO);
        assert!(budget.is_expired());
        assert!(matches!(budget.check(), Err(ScanError::ProcessingTimeout { .. })));
    }

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let budget = JobBudget::new(Duration::from_secs(60));
        let handle = budget.clone();
        assert!(budget.check().is_ok());
        handle.cancel();
        assert!(budget.is_cancelled());
        assert!(budget.check().is_err());
    }

    #[test]
    fn test_unlimited() {
        let budget = JobBudget::unlimited();
        assert!(!budget.is_expired());
    }
}
