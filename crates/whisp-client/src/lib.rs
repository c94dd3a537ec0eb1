pub mod outbox;

pub use outbox::{OutboxEvent, OutboxTracker, SendState};
