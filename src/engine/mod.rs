pub mod core;
pub mod install;
pub mod retry;

pub use core::Engine;
pub use install::{InstallError, InstallOrchestrator, InstallOutcome};
pub use retry::{RetryDisposition, RetryPolicy};
