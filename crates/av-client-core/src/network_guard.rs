use crate::error::NetworkError;
use av_api_types::{ChainDescriptor, ChainId};
use av_chain_client::{ProviderError, WalletProvider};
use tracing::{debug, info, warn};

/// Steps of the switch / add-then-switch sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwitchStep {
    Checking,
    /// `after_add` marks the single retry that follows `wallet_addEthereumChain`.
    Switching { after_add: bool },
    AddingChain,
    Verified,
}

/// Makes sure the wallet sits on the required chain before anything binds to it.
#[derive(Debug, Clone)]
pub struct NetworkGuard {
    descriptor: ChainDescriptor,
}

impl NetworkGuard {
    pub fn new(descriptor: ChainDescriptor) -> Self {
        Self { descriptor }
    }

    pub fn required_chain(&self) -> ChainId {
        self.descriptor.chain_id
    }

    /// No-op when the wallet is already on the required chain. Otherwise asks
    /// for a switch, adding the chain first if the wallet has never seen it.
    /// The switch is retried at most once.
    pub async fn ensure_network(&self, wallet: &dyn WalletProvider) -> Result<(), NetworkError> {
        let required = self.required_chain();
        let mut step = SwitchStep::Checking;

        loop {
            step = match step {
                SwitchStep::Checking => {
                    let current = wallet.chain_id().await.map_err(unavailable)?;
                    if current == required {
                        SwitchStep::Verified
                    } else {
                        info!(%current, %required, "wallet on wrong chain, requesting switch");
                        SwitchStep::Switching { after_add: false }
                    }
                }
                SwitchStep::Switching { after_add } => match wallet.switch_chain(required).await {
                    Ok(()) => SwitchStep::Verified,
                    Err(err) if err.is_user_rejected() => return Err(NetworkError::UserRejected),
                    Err(err) if err.is_unrecognized_chain() && !after_add => {
                        debug!(%required, "chain unknown to wallet, adding it");
                        SwitchStep::AddingChain
                    }
                    Err(err) => return Err(unavailable(err)),
                },
                SwitchStep::AddingChain => match wallet.add_chain(&self.descriptor).await {
                    Ok(()) => SwitchStep::Switching { after_add: true },
                    Err(err) if err.is_user_rejected() => return Err(NetworkError::UserRejected),
                    Err(err) => return Err(unavailable(err)),
                },
                SwitchStep::Verified => return Ok(()),
            };
        }
    }
}

fn unavailable(err: ProviderError) -> NetworkError {
    warn!(code = ?err.code, "network switch failed: {}", err.message);
    NetworkError::Unavailable(err.message)
}
