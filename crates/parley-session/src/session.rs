use std::sync::Arc;

use tracing::info;

use parley_shared::{Address, IdentityError};
use parley_transport::{MessagingClient, Signer, Transport};

use crate::identity::IdentityResolver;

/// Owner of the process-wide active messaging client.
///
/// At most one client is live at a time: two concurrently active clients
/// would hold divergent views of consent and installation state. Switching
/// wallets therefore closes the previous client before resolving the next
/// one. Engines receive the client by injection; nothing reads it from
/// global state.
pub struct Session {
    resolver: IdentityResolver,
    active: Option<ActiveClient>,
}

struct ActiveClient {
    address: Address,
    client: Arc<dyn MessagingClient>,
}

impl Session {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            resolver: IdentityResolver::new(transport),
            active: None,
        }
    }

    /// The currently active client, if any.
    pub fn client(&self) -> Option<Arc<dyn MessagingClient>> {
        self.active.as_ref().map(|a| a.client.clone())
    }

    /// The wallet address the active client is bound to.
    pub fn address(&self) -> Option<&Address> {
        self.active.as_ref().map(|a| &a.address)
    }

    /// Connect for a wallet address. Reuses the live client when the address
    /// is unchanged; otherwise closes the previous client first.
    pub async fn connect(
        &mut self,
        address: &Address,
        signer: &dyn Signer,
    ) -> Result<Arc<dyn MessagingClient>, IdentityError> {
        if let Some(active) = &self.active {
            if active.address == *address {
                return Ok(active.client.clone());
            }
            info!(
                from = %active.address.short(),
                to = %address.short(),
                "Switching wallets"
            );
        }
        self.disconnect().await;

        let client = self.resolver.resolve_or_create(address, signer).await?;
        self.active = Some(ActiveClient {
            address: address.clone(),
            client: client.clone(),
        });
        Ok(client)
    }

    /// Close and drop the active client. No-op when none is active.
    pub async fn disconnect(&mut self) {
        if let Some(active) = self.active.take() {
            active.client.close().await;
            info!(address = %active.address.short(), "Session disconnected");
        }
    }
}
