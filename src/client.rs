// src/client.rs
use std::sync::Arc;

use ethers::abi::AbiEncode;
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256};
use tracing::info;

use crate::account::{AddressDeriver, DeploymentOracle};
use crate::builder::TransactionBuilder;
use crate::chain::ChainClient;
use crate::config::DeploymentConfig;
use crate::eip712::Eip712Signer;
use crate::error::{Result, SmartAccountError};
use crate::fees::FeeAndNonceResolver;
use crate::signer::SignerCapability;
use crate::submit::{serialize, Submitter};
use crate::types::{
    Call, DeploymentState, PreparedTransaction, SignedTransaction, SmartAccountIdentity,
    TransactionIntent, TransactionRequest,
};

/// Wallet actions of a smart account owned by the bound signer.
pub struct SmartAccountClient<C> {
    config: DeploymentConfig,
    signer: Option<Arc<dyn SignerCapability>>,
    deriver: AddressDeriver<C>,
    oracle: DeploymentOracle<C>,
    builder: TransactionBuilder,
    resolver: FeeAndNonceResolver<C>,
    eip712: Eip712Signer,
    submitter: Submitter<C>,
}

impl<C: ChainClient> SmartAccountClient<C> {
    pub fn new(
        chain: Arc<C>,
        config: DeploymentConfig,
        signer: Option<Arc<dyn SignerCapability>>,
    ) -> Self {
        Self {
            deriver: AddressDeriver::new(chain.clone(), config.factory),
            oracle: DeploymentOracle::new(chain.clone()),
            builder: TransactionBuilder::from_config(&config),
            resolver: FeeAndNonceResolver::from_config(chain.clone(), &config),
            eip712: Eip712Signer::from_config(signer.clone(), &config),
            submitter: Submitter::new(chain),
            signer,
            config,
        }
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    pub fn owner(&self) -> Result<Address> {
        self.signer
            .as_ref()
            .map(|signer| signer.address())
            .ok_or(SmartAccountError::AccountNotFound)
    }

    pub async fn identity(&self) -> Result<SmartAccountIdentity> {
        self.deriver.derive(self.owner()?).await
    }

    pub async fn smart_account_address(&self) -> Result<Address> {
        Ok(self.identity().await?.derived_address)
    }

    pub async fn is_deployed(&self) -> Result<bool> {
        let identity = self.identity().await?;
        let state = self
            .oracle
            .state(identity.derived_address, self.config.strict_deployment_probe)
            .await?;
        Ok(state == DeploymentState::Deployed)
    }

    /// Derive, probe, shape and resolve. Deployment state is read fresh on
    /// every call.
    pub async fn prepare(&self, intent: &TransactionIntent) -> Result<PreparedTransaction> {
        let identity = self.identity().await?;
        let state = self
            .oracle
            .state(identity.derived_address, self.config.strict_deployment_probe)
            .await?;
        info!(
            "Smart account {:?} of {:?} is {:?}",
            identity.derived_address, identity.owner_address, state
        );

        let shaped = self
            .builder
            .shape(intent, state, &identity, self.config.validator)?;
        self.resolver.resolve(shaped, &intent.overrides).await
    }

    pub async fn sign_intent(&self, intent: &TransactionIntent) -> Result<SignedTransaction> {
        let prepared = self.prepare(intent).await?;
        self.eip712.sign(prepared).await
    }

    pub async fn submit(&self, signed: &SignedTransaction) -> Result<H256> {
        self.submitter.submit(signed).await
    }

    pub async fn send_calls(&self, intent: &TransactionIntent) -> Result<H256> {
        let signed = self.sign_intent(intent).await?;
        self.submit(&signed).await
    }

    /// Sends a single call described by a loosely-typed request. Requests
    /// without any EIP-712 marker are rejected before any chain read.
    pub async fn send_transaction(&self, request: TransactionRequest) -> Result<H256> {
        let intent = self.request_intent(request).await?;
        self.send_calls(&intent).await
    }

    pub async fn send_transaction_batch(
        &self,
        calls: Vec<Call>,
        paymaster: Option<Address>,
        paymaster_input: Option<Bytes>,
    ) -> Result<H256> {
        let mut intent = TransactionIntent::new(calls)?;
        intent.paymaster = paymaster;
        intent.paymaster_input = paymaster_input;
        self.send_calls(&intent).await
    }

    /// ABI-encodes `call` and sends it to `target`.
    pub async fn write_contract<T: AbiEncode>(
        &self,
        target: Address,
        call: T,
        value: U256,
    ) -> Result<H256> {
        let intent = TransactionIntent::single(Call::new(target, value, call.encode()));
        self.send_calls(&intent).await
    }

    /// Signed `0x71` envelope of the request, not broadcast.
    pub async fn sign_transaction(&self, request: TransactionRequest) -> Result<Bytes> {
        let intent = self.request_intent(request).await?;
        let signed = self.sign_intent(&intent).await?;
        Ok(serialize(&signed))
    }

    pub async fn wait_for_receipt(&self, hash: H256) -> Result<TransactionReceipt> {
        self.submitter.wait_for_receipt(hash).await
    }

    async fn request_intent(&self, request: TransactionRequest) -> Result<TransactionIntent> {
        let from = request.from;
        let intent = request.into_intent()?;
        if let Some(from) = from {
            let identity = self.identity().await?;
            if from != identity.derived_address && from != identity.owner_address {
                return Err(SmartAccountError::AccountNotFound);
            }
        }
        Ok(intent)
    }
}
