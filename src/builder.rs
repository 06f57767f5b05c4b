// src/builder.rs
use ethers::abi::AbiEncode;
use ethers::types::Address;
use tracing::debug;

use crate::abi::DeployAccountCall;
use crate::config::DeploymentConfig;
use crate::encoder::CallEncoder;
use crate::error::Result;
use crate::types::{
    DeploymentState, ShapedTransaction, SmartAccountIdentity, TransactionIntent, TransactionSender,
};

/// Turns an intent into the on-chain transaction skeleton for the account's
/// current deployment state.
#[derive(Debug, Clone, Copy)]
pub struct TransactionBuilder {
    factory: Address,
    encoder: CallEncoder,
}

impl TransactionBuilder {
    pub fn new(factory: Address, encoder: CallEncoder) -> Self {
        Self { factory, encoder }
    }

    pub fn from_config(config: &DeploymentConfig) -> Self {
        Self::new(config.factory, CallEncoder::new(config.batch_caller))
    }

    pub fn shape(
        &self,
        intent: &TransactionIntent,
        state: DeploymentState,
        identity: &SmartAccountIdentity,
        validator: Address,
    ) -> Result<ShapedTransaction> {
        let value = intent.total_value()?;

        let (sender, to, data) = match state {
            DeploymentState::Deployed => {
                let sender = TransactionSender::SmartAccount(identity.derived_address);
                match intent.calls() {
                    [call] => (sender, call.target, self.encoder.encode_single(call)),
                    calls => (
                        sender,
                        self.encoder.batch_caller(),
                        self.encoder.encode_batch(calls),
                    ),
                }
            }
            DeploymentState::Undeployed => {
                let init_call = self.encoder.init_call(intent)?;
                let initializer =
                    self.encoder
                        .encode_initializer(identity.owner_address, validator, init_call);
                let data = DeployAccountCall {
                    salt: identity.salt.0,
                    initializer,
                }
                .encode()
                .into();
                (TransactionSender::Owner(identity.owner_address), self.factory, data)
            }
        };

        debug!(
            "Shaped {:?} transaction from {:?} to {:?} with value {}",
            state,
            sender.address(),
            to,
            value
        );

        Ok(ShapedTransaction {
            sender,
            to,
            data,
            value,
            paymaster: intent.paymaster,
            paymaster_input: intent.paymaster_input.clone(),
        })
    }
}
