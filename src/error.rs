// src/error.rs
use std::fmt;

use ethers::types::{Address, H256, U256};
use thiserror::Error;

/// Pipeline stage an I/O failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DeriveAddress,
    ProbeDeployment,
    ResolveNonce,
    EstimateGas,
    EstimateFee,
    Sign,
    Broadcast,
    Receipt,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::DeriveAddress => "derive-address",
            Stage::ProbeDeployment => "probe-deployment",
            Stage::ResolveNonce => "resolve-nonce",
            Stage::EstimateGas => "estimate-gas",
            Stage::EstimateFee => "estimate-fee",
            Stage::Sign => "sign",
            Stage::Broadcast => "broadcast",
            Stage::Receipt => "receipt",
        };
        f.write_str(name)
    }
}

/// Failure reported by the RPC collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{method} failed: {message}")]
pub struct ChainError {
    pub method: &'static str,
    pub message: String,
}

impl ChainError {
    pub fn new(method: &'static str, message: impl Into<String>) -> Self {
        Self {
            method,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("Signature request rejected: {0}")]
    Rejected(String),

    #[error("Signer backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum SmartAccountError {
    #[error("Malformed address: {0}")]
    MalformedAddress(String),

    #[error("Could not find an account to execute with, bind a signer to the client")]
    AccountNotFound,

    #[error("Transaction is not an EIP-712 transaction: {0}")]
    InvalidTransactionShape(String),

    #[error("Chain mismatch: transaction is for chain {expected}, signer is connected to chain {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    #[error("`maxFeePerGas` ({max_fee_per_gas}) cannot be less than the `maxPriorityFeePerGas` ({max_priority_fee_per_gas})")]
    FeeTooLow {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },

    #[error("Deployment probe for {address:?} failed: {source}")]
    DeploymentProbeFailed {
        address: Address,
        #[source]
        source: ChainError,
    },

    #[error("Signer rejected the request: {0}")]
    SignerRejected(String),

    #[error("Signer failed: {0}")]
    SignerFailed(String),

    #[error("Broadcast failed: {0}")]
    BroadcastFailed(#[source] ChainError),

    #[error("Contract read failed during {stage}: {source}")]
    ContractRead {
        stage: Stage,
        #[source]
        source: ChainError,
    },

    #[error("Chain read failed during {stage}: {source}")]
    ChainRead {
        stage: Stage,
        #[source]
        source: ChainError,
    },

    #[error("ABI decoding failed during {stage}: {message}")]
    Abi { stage: Stage, message: String },

    #[error("Transaction intent has no calls")]
    EmptyBatch,

    #[error("Total call value overflows uint256")]
    ValueOverflow,

    #[error("Transaction {0:?} was broadcast but reverted")]
    TransactionReverted(H256),

    #[error("Transaction {hash:?} was broadcast but its receipt is unavailable: {reason}")]
    ReceiptUnavailable { hash: H256, reason: String },
}

impl SmartAccountError {
    /// `true` when nothing reached the chain, so the request may be retried
    /// without risking a duplicate submission.
    pub fn is_pre_broadcast(&self) -> bool {
        !matches!(
            self,
            SmartAccountError::TransactionReverted(_) | SmartAccountError::ReceiptUnavailable { .. }
        )
    }

    /// Structural errors that no retry can fix.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SmartAccountError::MalformedAddress(_)
                | SmartAccountError::InvalidTransactionShape(_)
                | SmartAccountError::ChainMismatch { .. }
                | SmartAccountError::FeeTooLow { .. }
                | SmartAccountError::EmptyBatch
                | SmartAccountError::ValueOverflow
        )
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            SmartAccountError::DeploymentProbeFailed { .. } => Some(Stage::ProbeDeployment),
            SmartAccountError::ContractRead { stage, .. }
            | SmartAccountError::ChainRead { stage, .. }
            | SmartAccountError::Abi { stage, .. } => Some(*stage),
            SmartAccountError::SignerRejected(_)
            | SmartAccountError::SignerFailed(_)
            | SmartAccountError::AccountNotFound => Some(Stage::Sign),
            SmartAccountError::BroadcastFailed(_) | SmartAccountError::ChainMismatch { .. } => {
                Some(Stage::Broadcast)
            }
            SmartAccountError::TransactionReverted(_)
            | SmartAccountError::ReceiptUnavailable { .. } => Some(Stage::Receipt),
            _ => None,
        }
    }
}

impl From<SignerError> for SmartAccountError {
    fn from(err: SignerError) -> Self {
        match err {
            SignerError::Rejected(reason) => SmartAccountError::SignerRejected(reason),
            SignerError::Backend(reason) => SmartAccountError::SignerFailed(reason),
        }
    }
}

pub type Result<T, E = SmartAccountError> = std::result::Result<T, E>;
