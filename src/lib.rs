// src/lib.rs
pub mod abi;
pub mod account;
pub mod builder;
pub mod chain;
pub mod client;
pub mod config;
pub mod eip712;
pub mod encoder;
pub mod error;
pub mod fees;
pub mod rpc;
pub mod signer;
pub mod submit;
pub mod types;

#[cfg(test)]
mod test_utils;

pub use crate::chain::{ChainClient, EthersChainClient};
pub use crate::client::SmartAccountClient;
pub use crate::config::{DeploymentConfig, SignatureScheme};
pub use crate::error::{Result, SmartAccountError};
pub use crate::signer::{LocalWalletSigner, SignerCapability};
pub use crate::types::{Call, TransactionIntent, TransactionRequest};
