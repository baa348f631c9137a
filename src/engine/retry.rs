//! Retry policy
//!
//! Bounds automatic retries per title. Mount, copy, and registration
//! failures all route through here uniformly; discovery and metadata
//! failures never do (they mean "not installable", not transience).

/// What to do with a title after a failed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    /// Back to `Pending`; attempted again next cycle.
    Retry,
    /// Budget exhausted: `Error`, escalate to the repair prompt.
    Escalate,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Decide the disposition given the retry count AFTER the failure has
    /// been counted. A title escalates on exactly its `max_retries`-th
    /// consecutive failure, never earlier and never later.
    pub fn disposition(&self, retry_count: u32) -> RetryDisposition {
        if retry_count < self.max_retries {
            RetryDisposition::Retry
        } else {
            RetryDisposition::Escalate
        }
    }
}
