// Transport capability boundary for the Parley messaging layer.
//
// The real messaging network is consumed exclusively through the traits in
// `client`; `memory` provides a complete in-process implementation used by
// tests and local development.

pub mod client;
pub mod memory;
pub mod stream;

pub use client::{MessagingClient, Signer, ThreadHandle, Transport};
pub use memory::MemoryTransport;
pub use stream::{
    stop_channel, subscription_channel, MessageStream, StreamHandle, StreamItem, Subscription,
    ThreadStream,
};
