// src/chain.rs
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ChainError;
use crate::types::{FeeEstimate, ShapedTransaction, EIP712_TX_TYPE};

/// `paymasterParams` of a zkSync-style call request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymasterParams {
    pub paymaster: Address,
    pub paymaster_input: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip712Meta {
    pub gas_per_pubdata: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_params: Option<PaymasterParams>,
}

/// Call request used by `eth_estimateGas` and `zks_estimateFee`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateRequest {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    #[serde(rename = "type")]
    pub transaction_type: U64,
    pub eip712_meta: Eip712Meta,
}

impl EstimateRequest {
    pub fn from_shaped(shaped: &ShapedTransaction, gas_per_pubdata: U256) -> Self {
        let paymaster_params = shaped.paymaster.map(|paymaster| PaymasterParams {
            paymaster,
            paymaster_input: shaped
                .paymaster_input
                .as_ref()
                .map(|input| input.to_vec())
                .unwrap_or_default(),
        });
        Self {
            from: shaped.from(),
            to: shaped.to,
            data: shaped.data.clone(),
            value: shaped.value,
            transaction_type: U64::from(EIP712_TX_TYPE),
            eip712_meta: Eip712Meta {
                gas_per_pubdata,
                paymaster_params,
            },
        }
    }
}

/// Chain transport the pipeline reads from and broadcasts through.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64, ChainError>;

    async fn get_code(&self, address: Address) -> Result<Bytes, ChainError>;

    /// Read-only `eth_call` against the latest block.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError>;

    async fn get_transaction_count(
        &self,
        address: Address,
        block: BlockNumber,
    ) -> Result<U256, ChainError>;

    async fn estimate_gas(&self, request: &EstimateRequest) -> Result<U256, ChainError>;

    async fn estimate_fee(&self, request: &EstimateRequest) -> Result<FeeEstimate, ChainError>;

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, ChainError>;

    /// Waits until the transaction is mined. `None` when it was dropped.
    async fn wait_for_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>, ChainError>;
}

fn chain_id_from_word(id: U256) -> Result<u64, ChainError> {
    u64::try_from(id)
        .map_err(|_| ChainError::new("eth_chainId", format!("chain id {id} does not fit in u64")))
}

/// [`ChainClient`] backed by an ethers middleware stack.
pub struct EthersChainClient<M> {
    client: Arc<M>,
    receipt_interval: Duration,
}

impl EthersChainClient<Provider<Http>> {
    pub fn from_url(eth_rpc_url: &str) -> anyhow::Result<Self> {
        let provider = Provider::<Http>::try_from(eth_rpc_url)?;
        Ok(Self::new(Arc::new(provider)))
    }
}

impl<M> EthersChainClient<M> {
    pub fn new(client: Arc<M>) -> Self {
        Self {
            client,
            receipt_interval: Duration::from_secs(4),
        }
    }

    pub fn with_receipt_interval(mut self, interval: Duration) -> Self {
        self.receipt_interval = interval;
        self
    }
}

#[async_trait]
impl<M> ChainClient for EthersChainClient<M>
where
    M: Middleware + 'static,
{
    async fn chain_id(&self) -> Result<u64, ChainError> {
        let id = self
            .client
            .get_chainid()
            .await
            .map_err(|e| ChainError::new("eth_chainId", e.to_string()))?;
        chain_id_from_word(id)
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, ChainError> {
        self.client
            .get_code(address, None)
            .await
            .map_err(|e| ChainError::new("eth_getCode", e.to_string()))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.client
            .call(&tx, None)
            .await
            .map_err(|e| ChainError::new("eth_call", e.to_string()))
    }

    async fn get_transaction_count(
        &self,
        address: Address,
        block: BlockNumber,
    ) -> Result<U256, ChainError> {
        self.client
            .get_transaction_count(address, Some(block.into()))
            .await
            .map_err(|e| ChainError::new("eth_getTransactionCount", e.to_string()))
    }

    async fn estimate_gas(&self, request: &EstimateRequest) -> Result<U256, ChainError> {
        debug!("eth_estimateGas for {:?} -> {:?}", request.from, request.to);
        self.client
            .provider()
            .request("eth_estimateGas", [request])
            .await
            .map_err(|e| ChainError::new("eth_estimateGas", e.to_string()))
    }

    async fn estimate_fee(&self, request: &EstimateRequest) -> Result<FeeEstimate, ChainError> {
        self.client
            .provider()
            .request("zks_estimateFee", [request])
            .await
            .map_err(|e| ChainError::new("zks_estimateFee", e.to_string()))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, ChainError> {
        self.client
            .provider()
            .request("eth_sendRawTransaction", [raw])
            .await
            .map_err(|e| ChainError::new("eth_sendRawTransaction", e.to_string()))
    }

    async fn wait_for_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>, ChainError> {
        PendingTransaction::new(hash, self.client.provider())
            .interval(self.receipt_interval)
            .await
            .map_err(|e| ChainError::new("eth_getTransactionReceipt", e.to_string()))
    }
}
