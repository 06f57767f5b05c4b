// src/config.rs
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

/// Default `gasPerPubdataByteLimit` of the chain's EIP-712 transactions.
pub const DEFAULT_GAS_PER_PUBDATA: u64 = 50_000;

pub const DEFAULT_SIGN_MESSAGE_DETAILS: &str = "You are signing a hash of your transaction";

/// How the validator-scoped signature over a smart account transaction is requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SignatureScheme {
    /// Wrap the transaction digest in a `SignMessage{details, hash}` typed-data
    /// struct under the validator's domain.
    #[default]
    SignMessage,
    /// Sign the transaction typed data itself.
    TypedTransaction,
    /// Sign the 32-byte transaction digest.
    RawDigest,
}

impl std::str::FromStr for SignatureScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sign-message" | "signMessage" => Ok(SignatureScheme::SignMessage),
            "typed-transaction" | "typedTransaction" => Ok(SignatureScheme::TypedTransaction),
            "raw-digest" | "rawDigest" => Ok(SignatureScheme::RawDigest),
            other => Err(format!("unknown signature scheme: {other}")),
        }
    }
}

/// Per-deployment contract addresses and chain parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    pub chain_id: u64,
    /// Smart account factory (`getAddressForSalt`, `deployAccount`).
    pub factory: Address,
    /// K1 validator module installed on new accounts.
    pub validator: Address,
    /// Auxiliary contract executing `batchCall(Call[])`.
    pub batch_caller: Address,
    #[serde(default = "default_gas_per_pubdata")]
    pub gas_per_pubdata: U256,
    #[serde(default)]
    pub signature_scheme: SignatureScheme,
    #[serde(default = "default_sign_message_details")]
    pub sign_message_details: String,
    /// Surface bytecode probe failures instead of treating them as undeployed.
    #[serde(default)]
    pub strict_deployment_probe: bool,
}

fn default_gas_per_pubdata() -> U256 {
    U256::from(DEFAULT_GAS_PER_PUBDATA)
}

fn default_sign_message_details() -> String {
    DEFAULT_SIGN_MESSAGE_DETAILS.to_string()
}

impl DeploymentConfig {
    pub fn new(chain_id: u64, factory: Address, validator: Address, batch_caller: Address) -> Self {
        Self {
            chain_id,
            factory,
            validator,
            batch_caller,
            gas_per_pubdata: default_gas_per_pubdata(),
            signature_scheme: SignatureScheme::default(),
            sign_message_details: default_sign_message_details(),
            strict_deployment_probe: false,
        }
    }

    pub fn with_signature_scheme(mut self, scheme: SignatureScheme) -> Self {
        self.signature_scheme = scheme;
        self
    }

    pub fn with_strict_deployment_probe(mut self, strict: bool) -> Self {
        self.strict_deployment_probe = strict;
        self
    }
}
