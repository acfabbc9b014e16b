use crate::{AbiVotingContract, PollSettings, RpcTransport, Runtime, malformed};
use async_trait::async_trait;
use av_api_types::{Address, ChainDescriptor, ChainId};
use av_chain_client::{
    EventSink, METHOD_NOT_FOUND, ProviderError, ProviderResult, Subscription, VotingContract,
    WalletProvider,
};
use serde_json::{Value, json};
use std::rc::Rc;

/// [`WalletProvider`] speaking EIP-1193 methods over `T`.
pub struct Eip1193Wallet<T, R> {
    transport: Rc<T>,
    runtime: Rc<R>,
    poll: PollSettings,
}

impl<T, R> Eip1193Wallet<T, R>
where
    T: RpcTransport + 'static,
    R: Runtime + 'static,
{
    pub fn new(transport: T, runtime: R) -> Self {
        Self::with_poll_settings(transport, runtime, PollSettings::default())
    }

    pub fn with_poll_settings(transport: T, runtime: R, poll: PollSettings) -> Self {
        Self {
            transport: Rc::new(transport),
            runtime: Rc::new(runtime),
            poll,
        }
    }
}

#[async_trait(?Send)]
impl<T, R> WalletProvider for Eip1193Wallet<T, R>
where
    T: RpcTransport + 'static,
    R: Runtime + 'static,
{
    async fn request_accounts(&self) -> ProviderResult<Vec<Address>> {
        // Dev nodes expose unlocked accounts but not the authorization prompt.
        let accounts = match self.transport.request("eth_requestAccounts", json!([])).await {
            Err(err) if err.code == Some(METHOD_NOT_FOUND) => {
                self.transport.request("eth_accounts", json!([])).await?
            }
            other => other?,
        };
        serde_json::from_value::<Vec<Address>>(accounts.clone())
            .map_err(|_| malformed("account list", &accounts))
    }

    async fn chain_id(&self) -> ProviderResult<ChainId> {
        let value = self.transport.request("eth_chainId", json!([])).await?;
        value
            .as_str()
            .and_then(ChainId::parse)
            .ok_or_else(|| malformed("chain id", &value))
    }

    async fn switch_chain(&self, chain_id: ChainId) -> ProviderResult<()> {
        self.transport
            .request(
                "wallet_switchEthereumChain",
                json!([{ "chainId": chain_id.to_hex() }]),
            )
            .await?;
        Ok(())
    }

    async fn add_chain(&self, descriptor: &ChainDescriptor) -> ProviderResult<()> {
        let descriptor = serde_json::to_value(descriptor)
            .map_err(|err| ProviderError::transport(format!("chain descriptor: {err}")))?;
        self.transport
            .request("wallet_addEthereumChain", Value::Array(vec![descriptor]))
            .await?;
        Ok(())
    }

    fn bind_contract(&self, address: &Address, signer: &Address) -> ProviderResult<Rc<dyn VotingContract>> {
        Ok(Rc::new(AbiVotingContract::new(
            self.transport.clone(),
            self.runtime.clone(),
            address.clone(),
            signer.clone(),
            self.poll,
        )))
    }

    fn subscribe(&self, sink: EventSink) -> ProviderResult<Subscription> {
        self.transport.on_wallet_events(sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InstantRuntime, MockTransport};
    use av_api_types::SEPOLIA_CHAIN_ID;

    fn wallet() -> (Rc<MockTransport>, Eip1193Wallet<Rc<MockTransport>, InstantRuntime>) {
        let transport = Rc::new(MockTransport::default());
        let wallet = Eip1193Wallet::new(transport.clone(), InstantRuntime);
        (transport, wallet)
    }

    #[tokio::test]
    async fn falls_back_to_eth_accounts_on_dev_nodes() {
        let (transport, wallet) = wallet();
        transport
            .expect(
                "eth_requestAccounts",
                Err(ProviderError::new(METHOD_NOT_FOUND, "method not found")),
            )
            .expect("eth_accounts", Ok(json!(["0xabc0000000000000000000000000000000000001"])));

        let accounts = wallet.request_accounts().await.unwrap();
        assert_eq!(accounts, vec![Address::new("0xabc0000000000000000000000000000000000001")]);
    }

    #[tokio::test]
    async fn rejected_authorization_is_not_retried() {
        let (transport, wallet) = wallet();
        transport.expect("eth_requestAccounts", Err(ProviderError::user_rejected()));

        let err = wallet.request_accounts().await.unwrap_err();
        assert!(err.is_user_rejected());
        assert_eq!(transport.requests.borrow().len(), 1);
    }

    #[tokio::test]
    async fn chain_switching_uses_hex_quantities() {
        let (transport, wallet) = wallet();
        transport
            .expect("eth_chainId", Ok(json!("0x1")))
            .expect("wallet_switchEthereumChain", Ok(Value::Null))
            .expect("wallet_addEthereumChain", Ok(Value::Null));

        assert_eq!(wallet.chain_id().await.unwrap(), ChainId(1));
        wallet.switch_chain(SEPOLIA_CHAIN_ID).await.unwrap();
        wallet.add_chain(&ChainDescriptor::sepolia()).await.unwrap();

        assert_eq!(transport.params(1), json!([{ "chainId": "0xaa36a7" }]));
        let added = transport.params(2);
        assert_eq!(added[0]["chainId"], "0xaa36a7");
        assert_eq!(added[0]["nativeCurrency"]["symbol"], "SepoliaETH");
    }

    #[tokio::test]
    async fn malformed_chain_id_is_a_transport_error() {
        let (transport, wallet) = wallet();
        transport.expect("eth_chainId", Ok(json!(42.5)));
        let err = wallet.chain_id().await.unwrap_err();
        assert_eq!(err.code, None);
    }
}
