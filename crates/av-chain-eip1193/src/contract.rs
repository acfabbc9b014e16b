use crate::{PollSettings, RpcTransport, Runtime, abi_error, malformed};
use async_trait::async_trait;
use av_abi::{from_hex, parse_quantity, to_hex_prefixed};
use av_api_types::{Address, Candidate, ContractEvent, TxHash};
use av_chain_client::{
    EventSink, ProviderError, ProviderResult, Subscription, VoteReceipt, VotingContract, deliver,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::cell::Cell;
use std::rc::Rc;
use tracing::{debug, warn};

/// Voting contract reached through `eth_call` / `eth_sendTransaction`.
pub struct AbiVotingContract<T, R> {
    transport: Rc<T>,
    runtime: Rc<R>,
    address: Address,
    signer: Address,
    poll: PollSettings,
}

impl<T, R> Clone for AbiVotingContract<T, R> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            runtime: self.runtime.clone(),
            address: self.address.clone(),
            signer: self.signer.clone(),
            poll: self.poll,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptResponse {
    block_number: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LogResponse {
    topics: Vec<String>,
    data: String,
}

impl<T, R> AbiVotingContract<T, R>
where
    T: RpcTransport + 'static,
    R: Runtime + 'static,
{
    pub fn new(transport: Rc<T>, runtime: Rc<R>, address: Address, signer: Address, poll: PollSettings) -> Self {
        Self {
            transport,
            runtime,
            address,
            signer,
            poll,
        }
    }

    async fn call(&self, data: Vec<u8>) -> ProviderResult<Vec<u8>> {
        let result = self
            .transport
            .request(
                "eth_call",
                json!([
                    { "from": self.signer, "to": self.address, "data": to_hex_prefixed(&data) },
                    "latest"
                ]),
            )
            .await?;
        let raw = result
            .as_str()
            .ok_or_else(|| malformed("eth_call result", &result))?;
        from_hex(raw).map_err(abi_error)
    }

    async fn block_number(&self) -> ProviderResult<u64> {
        let value = self.transport.request("eth_blockNumber", json!([])).await?;
        value
            .as_str()
            .and_then(|raw| parse_quantity(raw).ok())
            .ok_or_else(|| malformed("block number", &value))
    }

    /// Fetches `Voted` logs from `from_block` up to the current head.
    /// Returns the events and the block to resume from.
    pub async fn poll_voted(&self, from_block: u64) -> ProviderResult<(Vec<ContractEvent>, u64)> {
        let head = self.block_number().await?;
        if head < from_block {
            return Ok((Vec::new(), from_block));
        }

        let logs = self
            .transport
            .request(
                "eth_getLogs",
                json!([{
                    "address": self.address,
                    "topics": [to_hex_prefixed(&av_abi::voted_topic())],
                    "fromBlock": format!("{from_block:#x}"),
                    "toBlock": format!("{head:#x}"),
                }]),
            )
            .await?;
        let logs: Vec<LogResponse> =
            serde_json::from_value(logs.clone()).map_err(|_| malformed("log list", &logs))?;

        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            let topics = log
                .topics
                .iter()
                .map(|topic| from_hex(topic))
                .collect::<Result<Vec<_>, _>>()
                .map_err(abi_error)?;
            let data = from_hex(&log.data).map_err(abi_error)?;
            events.push(av_abi::decode_voted_log(&topics, &data).map_err(abi_error)?);
        }
        Ok((events, head + 1))
    }
}

#[async_trait(?Send)]
impl<T, R> VotingContract for AbiVotingContract<T, R>
where
    T: RpcTransport + 'static,
    R: Runtime + 'static,
{
    fn address(&self) -> &Address {
        &self.address
    }

    async fn has_voted(&self, voter: &Address) -> ProviderResult<bool> {
        let data = av_abi::encode_has_voted(voter).map_err(abi_error)?;
        let raw = self.call(data).await?;
        av_abi::decode_bool(&raw).map_err(abi_error)
    }

    async fn get_all_characters(&self) -> ProviderResult<Vec<Candidate>> {
        let raw = self.call(av_abi::encode_get_all_characters()).await?;
        av_abi::decode_characters(&raw).map_err(abi_error)
    }

    async fn vote(&self, candidate_index: u64) -> ProviderResult<TxHash> {
        let result = self
            .transport
            .request(
                "eth_sendTransaction",
                json!([{
                    "from": self.signer,
                    "to": self.address,
                    "data": to_hex_prefixed(&av_abi::encode_vote(candidate_index)),
                }]),
            )
            .await?;
        result
            .as_str()
            .map(|hash| TxHash(hash.to_owned()))
            .ok_or_else(|| malformed("transaction hash", &result))
    }

    async fn wait_for_confirmation(&self, tx_hash: &TxHash) -> ProviderResult<VoteReceipt> {
        for _ in 0..self.poll.max_receipt_polls {
            let value = self
                .transport
                .request("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;
            if value.is_null() {
                self.runtime.sleep(self.poll.interval_ms).await;
                continue;
            }

            let receipt: ReceiptResponse = serde_json::from_value(value.clone())
                .map_err(|_| malformed("receipt", &value))?;
            let Some(block_number) = receipt.block_number.as_deref() else {
                // Known to the node but not mined yet.
                self.runtime.sleep(self.poll.interval_ms).await;
                continue;
            };
            return Ok(VoteReceipt {
                tx_hash: tx_hash.clone(),
                block_number: parse_quantity(block_number).map_err(abi_error)?,
                success: receipt.status.as_deref() != Some("0x0"),
            });
        }

        Err(ProviderError::transport(format!(
            "transaction {tx_hash} not confirmed after {} polls",
            self.poll.max_receipt_polls
        )))
    }

    fn subscribe_voted(&self, sink: EventSink) -> ProviderResult<Subscription> {
        let cancelled = Rc::new(Cell::new(false));
        let stop = cancelled.clone();
        let contract = self.clone();

        self.runtime.spawn(Box::pin(async move {
            let mut next_block: Option<u64> = None;
            loop {
                if next_block.is_some() {
                    contract.runtime.sleep(contract.poll.interval_ms).await;
                }
                if stop.get() || sink.is_closed() {
                    debug!(address = %contract.address, "voted log poller stopped");
                    break;
                }

                let from = match next_block {
                    Some(block) => block,
                    None => match contract.block_number().await {
                        Ok(head) => head + 1,
                        Err(err) => {
                            warn!("voted log poller: block number unavailable: {err}");
                            contract.runtime.sleep(contract.poll.interval_ms).await;
                            continue;
                        }
                    },
                };

                match contract.poll_voted(from).await {
                    Ok((events, resume)) => {
                        for event in events {
                            deliver(&sink, event.into());
                        }
                        next_block = Some(resume);
                    }
                    Err(err) => {
                        warn!("voted log poller: {err}");
                        next_block = Some(from);
                    }
                }
            }
        }));

        Ok(Subscription::new(move || cancelled.set(true)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InstantRuntime, MockTransport};
    use av_chain_client::INTERNAL_ERROR;

    fn contract() -> (Rc<MockTransport>, AbiVotingContract<MockTransport, InstantRuntime>) {
        let transport = Rc::new(MockTransport::default());
        let contract = AbiVotingContract::new(
            transport.clone(),
            Rc::new(InstantRuntime),
            Address::new("0xD1516F6fA4F1EC48A0EDD31D0c0d4C9d817f6438"),
            Address::new("0xabc0000000000000000000000000000000000001"),
            PollSettings {
                interval_ms: 0,
                max_receipt_polls: 3,
            },
        );
        (transport, contract)
    }

    #[tokio::test]
    async fn reads_decode_the_roster() {
        let (transport, contract) = contract();
        let roster = vec![Candidate::new("Goku", 2), Candidate::new("Eren Yeager", 0)];
        transport.expect(
            "eth_call",
            Ok(json!(to_hex_prefixed(&av_abi::encode_characters(&roster)))),
        );

        assert_eq!(contract.get_all_characters().await.unwrap(), roster);
        let params = transport.params(0);
        assert_eq!(params[0]["to"], "0xD1516F6fA4F1EC48A0EDD31D0c0d4C9d817f6438");
        assert_eq!(params[1], "latest");
    }

    #[tokio::test]
    async fn has_voted_sends_the_encoded_call() {
        let (transport, contract) = contract();
        transport.expect("eth_call", Ok(json!(to_hex_prefixed(&av_abi::encode_bool(true)))));

        let voter = Address::new("0xabc0000000000000000000000000000000000001");
        assert!(contract.has_voted(&voter).await.unwrap());
        let expected = to_hex_prefixed(&av_abi::encode_has_voted(&voter).unwrap());
        assert_eq!(transport.params(0)[0]["data"], expected);
    }

    #[tokio::test]
    async fn confirmation_polls_until_mined() {
        let (transport, contract) = contract();
        transport
            .expect("eth_sendTransaction", Ok(json!("0xfeed")))
            .expect("eth_getTransactionReceipt", Ok(Value::Null))
            .expect(
                "eth_getTransactionReceipt",
                Ok(json!({ "blockNumber": "0x10", "status": "0x1" })),
            );

        let hash = contract.vote(2).await.unwrap();
        assert_eq!(hash, TxHash("0xfeed".to_owned()));
        let receipt = contract.wait_for_confirmation(&hash).await.unwrap();
        assert_eq!(receipt.block_number, 16);
        assert!(receipt.success);

        let sent = transport.params(0);
        assert_eq!(sent[0]["data"], to_hex_prefixed(&av_abi::encode_vote(2)));
        assert_eq!(sent[0]["from"], "0xabc0000000000000000000000000000000000001");
    }

    #[tokio::test]
    async fn confirmation_gives_up_after_max_polls() {
        let (transport, contract) = contract();
        for _ in 0..3 {
            transport.expect("eth_getTransactionReceipt", Ok(Value::Null));
        }
        let err = contract
            .wait_for_confirmation(&TxHash("0xfeed".to_owned()))
            .await
            .unwrap_err();
        assert!(err.message.contains("not confirmed"));
    }

    #[tokio::test]
    async fn rejected_send_surfaces_the_provider_error() {
        let (transport, contract) = contract();
        transport.expect(
            "eth_sendTransaction",
            Err(ProviderError::new(INTERNAL_ERROR, "insufficient funds for gas")),
        );
        let err = contract.vote(0).await.unwrap_err();
        assert_eq!(err.code, Some(INTERNAL_ERROR));
    }

    #[tokio::test]
    async fn voted_logs_are_decoded_from_the_head_window() {
        let (transport, contract) = contract();
        let mut voter_topic = vec![0_u8; 12];
        voter_topic.extend_from_slice(&[0xab; 20]);
        let mut index = vec![0_u8; 31];
        index.push(3);

        transport
            .expect("eth_blockNumber", Ok(json!("0x20")))
            .expect(
                "eth_getLogs",
                Ok(json!([{
                    "topics": [
                        to_hex_prefixed(&av_abi::voted_topic()),
                        to_hex_prefixed(&voter_topic),
                    ],
                    "data": to_hex_prefixed(&index),
                }])),
            );

        let (events, resume) = contract.poll_voted(0x1e).await.unwrap();
        assert_eq!(resume, 0x21);
        assert_eq!(
            events,
            vec![ContractEvent::Voted {
                voter: Address::new(format!("0x{}", "ab".repeat(20))),
                candidate_index: 3,
            }]
        );
        assert_eq!(transport.params(1)[0]["fromBlock"], "0x1e");
        assert_eq!(transport.params(1)[0]["toBlock"], "0x20");
    }

    #[tokio::test]
    async fn polling_ahead_of_the_head_is_a_no_op() {
        let (transport, contract) = contract();
        transport.expect("eth_blockNumber", Ok(json!("0x5")));
        let (events, resume) = contract.poll_voted(9).await.unwrap();
        assert!(events.is_empty());
        assert_eq!(resume, 9);
    }
}
