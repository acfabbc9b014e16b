use crate::error::ConnectError;
use crate::network_guard::NetworkGuard;
use av_api_types::Address;
use av_chain_client::{ProviderError, UNAUTHORIZED, VotingContract, WalletProvider};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Contract binding: fixed address plus the account that signs for it.
///
/// The only way the reconciler and the vote commander reach the contract.
#[derive(Clone)]
pub struct ContractHandle {
    contract: Rc<dyn VotingContract>,
    signer: Address,
}

impl ContractHandle {
    pub fn new(contract: Rc<dyn VotingContract>, signer: Address) -> Self {
        Self { contract, signer }
    }

    pub fn address(&self) -> &Address {
        self.contract.address()
    }

    pub fn signer(&self) -> &Address {
        &self.signer
    }

    pub fn contract(&self) -> &dyn VotingContract {
        self.contract.as_ref()
    }
}

impl fmt::Debug for ContractHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractHandle")
            .field("address", self.address())
            .field("signer", &self.signer)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub account: Address,
    pub contract: ContractHandle,
}

/// Wallet authorization, network check and contract binding, in that order.
#[derive(Debug, Clone)]
pub struct SessionBinder {
    contract_address: Address,
}

impl SessionBinder {
    pub fn new(contract_address: Address) -> Self {
        Self { contract_address }
    }

    pub fn contract_address(&self) -> &Address {
        &self.contract_address
    }

    /// Safe to call again while connected: it re-validates the network and
    /// hands back a fresh binding. Event subscriptions are not its concern.
    pub async fn connect(
        &self,
        wallet: Option<&dyn WalletProvider>,
        guard: &NetworkGuard,
    ) -> Result<Session, ConnectError> {
        let Some(wallet) = wallet else {
            warn!("no wallet provider injected");
            return Err(ConnectError::NoWallet);
        };

        let accounts = wallet.request_accounts().await.map_err(account_error)?;
        let Some(account) = accounts.into_iter().next() else {
            return Err(ConnectError::NoAccounts);
        };
        debug!(%account, "account access granted");

        guard.ensure_network(wallet).await?;

        let contract = self.bind(wallet, &account)?;
        info!(%account, contract = %self.contract_address, "session bound");
        Ok(Session { account, contract })
    }

    /// Binds the contract for `signer` without touching the network.
    pub fn bind(
        &self,
        wallet: &dyn WalletProvider,
        signer: &Address,
    ) -> Result<ContractHandle, ConnectError> {
        let contract = wallet
            .bind_contract(&self.contract_address, signer)
            .map_err(|err| ConnectError::Provider(err.message))?;
        Ok(ContractHandle::new(contract, signer.clone()))
    }
}

fn account_error(err: ProviderError) -> ConnectError {
    if err.is_user_rejected() || err.code == Some(UNAUTHORIZED) {
        ConnectError::UserRejected
    } else {
        ConnectError::Provider(err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;
    use av_api_types::{ChainDescriptor, ChainId, SEPOLIA_CHAIN_ID, VOTING_CONTRACT_ADDRESS};
    use av_chain_client::memory::{DEFAULT_ROSTER, InMemoryChain, Prompt};

    fn alice() -> Address {
        Address::new("0xABC0000000000000000000000000000000000001")
    }

    fn setup(chain_id: ChainId) -> (InMemoryChain, SessionBinder, NetworkGuard) {
        let chain = InMemoryChain::new(chain_id, vec![alice()]);
        chain.deploy(Address::new(VOTING_CONTRACT_ADDRESS), SEPOLIA_CHAIN_ID, &DEFAULT_ROSTER);
        (
            chain,
            SessionBinder::new(Address::new(VOTING_CONTRACT_ADDRESS)),
            NetworkGuard::new(ChainDescriptor::sepolia()),
        )
    }

    #[tokio::test]
    async fn binds_first_account_to_the_fixed_address() {
        let (chain, binder, guard) = setup(SEPOLIA_CHAIN_ID);
        let session = binder.connect(Some(&chain), &guard).await.unwrap();
        assert_eq!(session.account, alice());
        assert_eq!(session.contract.address().as_str(), VOTING_CONTRACT_ADDRESS);
        assert_eq!(session.contract.signer(), &alice());
    }

    #[tokio::test]
    async fn missing_wallet_is_reported_without_prompting() {
        let (_, binder, guard) = setup(SEPOLIA_CHAIN_ID);
        let err = binder.connect(None, &guard).await.unwrap_err();
        assert_eq!(err, ConnectError::NoWallet);
    }

    #[tokio::test]
    async fn declined_authorization_is_user_rejected() {
        let (chain, binder, guard) = setup(SEPOLIA_CHAIN_ID);
        chain.set_rejects_accounts(true);
        let err = binder.connect(Some(&chain), &guard).await.unwrap_err();
        assert_eq!(err, ConnectError::UserRejected);
        assert_eq!(chain.prompts(), vec![Prompt::RequestAccounts]);
    }

    #[tokio::test]
    async fn empty_account_list_is_no_accounts() {
        let (chain, binder, guard) = setup(SEPOLIA_CHAIN_ID);
        chain.set_accounts(Vec::new());
        let err = binder.connect(Some(&chain), &guard).await.unwrap_err();
        assert_eq!(err, ConnectError::NoAccounts);
    }

    #[tokio::test]
    async fn network_failure_is_wrapped() {
        let (chain, binder, guard) = setup(ChainId(1));
        chain.set_rejects_switch(true);
        let err = binder.connect(Some(&chain), &guard).await.unwrap_err();
        assert_eq!(err, ConnectError::WrongNetwork(NetworkError::UserRejected));
    }

    #[test]
    fn unauthorized_counts_as_rejection() {
        let err = account_error(ProviderError::new(UNAUTHORIZED, "unauthorized"));
        assert_eq!(err, ConnectError::UserRejected);
        let err = account_error(ProviderError::transport("disconnected"));
        assert_eq!(err, ConnectError::Provider("disconnected".into()));
    }
}
