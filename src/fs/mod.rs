pub mod locking;
pub mod markers;
pub mod queue_state;
