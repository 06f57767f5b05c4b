// src/signer.rs
use std::fmt;

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip712::TypedData;
use ethers::types::{Address, Bytes, H256};

use crate::error::SignerError;

/// What a signer backend is asked to sign.
#[derive(Debug, Clone)]
pub enum SignPayload {
    /// A bare 32-byte digest.
    Digest(H256),
    /// Structured EIP-712 data, for backends that only expose `eth_signTypedData_v4`.
    TypedData(Box<TypedData>),
}

/// Key custody is up to the embedding application: anything that can sign a
/// digest or typed data on behalf of the owner key can drive the pipeline.
#[async_trait]
pub trait SignerCapability: fmt::Debug + Send + Sync {
    /// Address of the owner key.
    fn address(&self) -> Address;

    /// Returns the 65-byte `r || s || v` signature.
    async fn sign(&self, payload: &SignPayload) -> Result<Bytes, SignerError>;
}

/// Signer over a private key held in process memory.
#[derive(Debug, Clone)]
pub struct LocalWalletSigner {
    wallet: LocalWallet,
}

impl LocalWalletSigner {
    pub fn new(wallet: LocalWallet) -> Self {
        Self { wallet }
    }

    pub fn from_private_key(private_key: &str, chain_id: u64) -> Result<Self, SignerError> {
        let wallet = private_key
            .parse::<LocalWallet>()
            .map_err(|e| SignerError::Backend(e.to_string()))?
            .with_chain_id(chain_id);
        Ok(Self::new(wallet))
    }
}

#[async_trait]
impl SignerCapability for LocalWalletSigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn sign(&self, payload: &SignPayload) -> Result<Bytes, SignerError> {
        let signature = match payload {
            SignPayload::Digest(digest) => self.wallet.sign_hash(*digest),
            SignPayload::TypedData(typed_data) => {
                self.wallet.sign_typed_data(typed_data.as_ref()).await
            }
        }
        .map_err(|e| SignerError::Backend(e.to_string()))?;

        Ok(Bytes::from(signature.to_vec()))
    }
}
