/// EVM wallet address size in bytes
pub const ADDRESS_SIZE: usize = 20;

/// Key derivation context for deterministic inbox identifiers (BLAKE3)
pub const KDF_CONTEXT_INBOX_ID: &str = "parley-inbox-id-v1";

/// Default capacity for the engines' mpsc channels
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Maximum message body size in bytes (64 KiB)
pub const MAX_BODY_SIZE: usize = 65_536;

/// Placeholder preview for threads with no classifiable history
pub const EMPTY_SNIPPET: &str = "---";
