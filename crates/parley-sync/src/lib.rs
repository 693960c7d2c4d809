// Live conversation and message synchronization on top of the transport
// boundary: idempotent thread resolution, snapshot-publishing sync engines,
// and snippet projection for conversation list rows.

pub mod config;
pub mod conversations;
pub mod messages;
pub mod resolver;
pub mod snippet;

#[cfg(test)]
mod testutil;

pub use config::SyncConfig;
pub use conversations::{ConversationFeed, ConversationSyncEngine, ThreadSnapshot};
pub use messages::{MessageFeed, MessageSnapshot, ThreadSyncEngine};
pub use resolver::get_or_create_thread;
pub use snippet::{calendar_day, project, Direction, Snippet};
