use std::sync::Arc;

use tracing::{debug, info};

use parley_shared::{Address, IdentityError};
use parley_transport::{MessagingClient, Signer, Transport};

/// Obtains a client for a wallet address, preferring to attach to an
/// existing identity over registering a new one. Registration is heavier and
/// interrupts the user with a signature prompt, and registering on top of an
/// existing identity would fork installations.
pub struct IdentityResolver {
    transport: Arc<dyn Transport>,
}

impl IdentityResolver {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Whether the address already carries a messaging identity.
    /// Side-effect-free.
    pub async fn is_registered(&self, address: &Address) -> Result<bool, IdentityError> {
        Ok(self.transport.is_registered(address).await?)
    }

    /// Attach to the address's identity, registering one first if needed.
    pub async fn resolve_or_create(
        &self,
        address: &Address,
        signer: &dyn Signer,
    ) -> Result<Arc<dyn MessagingClient>, IdentityError> {
        if self.transport.is_registered(address).await? {
            debug!(address = %address.short(), "Identity exists, attaching");
            self.transport.build(address).await
        } else {
            info!(address = %address.short(), "No identity yet, registering");
            self.transport.create(address, signer).await
        }
    }
}
