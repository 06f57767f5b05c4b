// src/rpc.rs
use std::sync::Arc;

use ethers::types::{Address, Bytes, TransactionReceipt, H256};
use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::error::{ErrorObject, INVALID_PARAMS_CODE};
use serde_json::json;
use tracing::{debug, error, info};

use crate::chain::ChainClient;
use crate::client::SmartAccountClient;
use crate::error::SmartAccountError;
use crate::types::{Call, TransactionRequest};

/// Nothing reached the chain; safe to retry.
pub const PRE_BROADCAST_ERROR_CODE: i32 = -32000;
/// The transaction was broadcast; check its status before resubmitting.
pub const POST_BROADCAST_ERROR_CODE: i32 = -32001;

impl From<SmartAccountError> for ErrorObject<'static> {
    fn from(err: SmartAccountError) -> Self {
        let code = if err.is_validation() {
            INVALID_PARAMS_CODE
        } else if err.is_pre_broadcast() {
            PRE_BROADCAST_ERROR_CODE
        } else {
            POST_BROADCAST_ERROR_CODE
        };
        let data = json!({
            "stage": err.stage().map(|stage| stage.to_string()),
            "preBroadcast": err.is_pre_broadcast(),
        });
        ErrorObject::owned(code, err.to_string(), Some(data))
    }
}

fn to_rpc_result<T>(method: &str, result: Result<T, SmartAccountError>) -> RpcResult<T> {
    result.map_err(|e| {
        error!("{} failed: {}", method, e);
        e.into()
    })
}

#[rpc(server, namespace = "wallet")]
pub trait WalletRpc {
    /// Counterfactual address of the bound owner's smart account
    #[method(name = "getSmartAccountAddress")]
    async fn get_smart_account_address(&self) -> RpcResult<Address>;

    #[method(name = "isDeployed")]
    async fn is_deployed(&self) -> RpcResult<bool>;

    /// Sends a single EIP-712 call, deploying the account first when needed
    #[method(name = "sendTransaction")]
    async fn send_transaction(&self, request: TransactionRequest) -> RpcResult<H256>;

    #[method(name = "sendTransactionBatch")]
    async fn send_transaction_batch(
        &self,
        calls: Vec<Call>,
        paymaster: Option<Address>,
        paymaster_input: Option<Bytes>,
    ) -> RpcResult<H256>;

    /// Returns the signed envelope without broadcasting it
    #[method(name = "signTransaction")]
    async fn sign_transaction(&self, request: TransactionRequest) -> RpcResult<Bytes>;

    #[method(name = "getTransactionReceipt")]
    async fn get_transaction_receipt(&self, hash: H256) -> RpcResult<TransactionReceipt>;
}

pub struct WalletRpcImpl<C> {
    client: Arc<SmartAccountClient<C>>,
}

impl<C> WalletRpcImpl<C> {
    pub fn new(client: Arc<SmartAccountClient<C>>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: ChainClient + 'static> WalletRpcServer for WalletRpcImpl<C> {
    async fn get_smart_account_address(&self) -> RpcResult<Address> {
        to_rpc_result(
            "wallet_getSmartAccountAddress",
            self.client.smart_account_address().await,
        )
    }

    async fn is_deployed(&self) -> RpcResult<bool> {
        to_rpc_result("wallet_isDeployed", self.client.is_deployed().await)
    }

    async fn send_transaction(&self, request: TransactionRequest) -> RpcResult<H256> {
        debug!("Received sendTransaction request to {:?}", request.to);
        let hash = to_rpc_result(
            "wallet_sendTransaction",
            self.client.send_transaction(request).await,
        )?;
        info!("Sent transaction {:?}", hash);
        Ok(hash)
    }

    async fn send_transaction_batch(
        &self,
        calls: Vec<Call>,
        paymaster: Option<Address>,
        paymaster_input: Option<Bytes>,
    ) -> RpcResult<H256> {
        debug!("Received sendTransactionBatch request with {} calls", calls.len());
        let hash = to_rpc_result(
            "wallet_sendTransactionBatch",
            self.client
                .send_transaction_batch(calls, paymaster, paymaster_input)
                .await,
        )?;
        info!("Sent batch transaction {:?}", hash);
        Ok(hash)
    }

    async fn sign_transaction(&self, request: TransactionRequest) -> RpcResult<Bytes> {
        to_rpc_result(
            "wallet_signTransaction",
            self.client.sign_transaction(request).await,
        )
    }

    async fn get_transaction_receipt(&self, hash: H256) -> RpcResult<TransactionReceipt> {
        to_rpc_result(
            "wallet_getTransactionReceipt",
            self.client.wait_for_receipt(hash).await,
        )
    }
}
