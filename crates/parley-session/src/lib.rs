// Messaging identity resolution and session ownership.
//
// `IdentityResolver` decides between attaching to an existing identity and
// registering a new one; `Session` is the single owner of the process-wide
// active client.

pub mod identity;
pub mod session;

pub use identity::IdentityResolver;
pub use session::Session;
