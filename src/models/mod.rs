pub mod candidate;
pub mod queue;

pub use candidate::{Candidate, TitleMeta};
pub use queue::{QueueEntry, QueueState};
