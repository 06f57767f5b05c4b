// src/types.rs
use ethers::contract::{EthAbiCodec, EthAbiType};
use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SmartAccountError};

/// EIP-2718 type byte of the chain's EIP-712 transactions (113).
pub const EIP712_TX_TYPE: u8 = 0x71;

/// Parses a 20-byte hex address, with or without the `0x` prefix.
pub fn parse_address(value: &str) -> Result<Address> {
    let trimmed = value.trim();
    let stripped = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let bytes =
        hex::decode(stripped).map_err(|e| SmartAccountError::MalformedAddress(format!("{value}: {e}")))?;
    if bytes.len() != 20 {
        return Err(SmartAccountError::MalformedAddress(format!(
            "{value}: expected 20 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(Address::from_slice(&bytes))
}

///`Call(address,bool,uint256,bytes)`
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EthAbiType,
    EthAbiCodec,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    #[serde(alias = "to")]
    pub target: Address,
    #[serde(default)]
    pub allow_failure: bool,
    #[serde(default)]
    pub value: U256,
    #[serde(default, alias = "data")]
    pub call_data: Bytes,
}

impl Call {
    /// A call that aborts the whole transaction when it fails.
    pub fn new(target: Address, value: U256, call_data: impl Into<Bytes>) -> Self {
        Self {
            target,
            allow_failure: false,
            value,
            call_data: call_data.into(),
        }
    }
}

/// Caller-supplied values that skip the matching chain read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_per_pubdata: Option<U256>,
}

/// One or more calls to execute from the smart account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionIntent {
    calls: Vec<Call>,
    pub paymaster: Option<Address>,
    pub paymaster_input: Option<Bytes>,
    pub overrides: FeeOverrides,
}

impl TransactionIntent {
    pub fn new(calls: Vec<Call>) -> Result<Self> {
        if calls.is_empty() {
            return Err(SmartAccountError::EmptyBatch);
        }
        Ok(Self {
            calls,
            paymaster: None,
            paymaster_input: None,
            overrides: FeeOverrides::default(),
        })
    }

    pub fn single(call: Call) -> Self {
        Self {
            calls: vec![call],
            paymaster: None,
            paymaster_input: None,
            overrides: FeeOverrides::default(),
        }
    }

    pub fn with_paymaster(mut self, paymaster: Address, paymaster_input: impl Into<Bytes>) -> Self {
        self.paymaster = Some(paymaster);
        self.paymaster_input = Some(paymaster_input.into());
        self
    }

    pub fn with_overrides(mut self, overrides: FeeOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn is_batch(&self) -> bool {
        self.calls.len() > 1
    }

    /// Sum of every call's value.
    pub fn total_value(&self) -> Result<U256> {
        self.calls.iter().try_fold(U256::zero(), |sum, call| {
            sum.checked_add(call.value).ok_or(SmartAccountError::ValueOverflow)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartAccountIdentity {
    pub owner_address: Address,
    /// `keccak256(owner_address)`
    pub salt: H256,
    pub derived_address: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeploymentState {
    Undeployed,
    Deployed,
}

/// Account that sends, pays for and signs a shaped transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionSender {
    /// The deployed smart account, authenticated by its validator module.
    SmartAccount(Address),
    /// The owner key itself, deploying its account through the factory.
    Owner(Address),
}

impl TransactionSender {
    pub fn address(&self) -> Address {
        match self {
            TransactionSender::SmartAccount(address) | TransactionSender::Owner(address) => *address,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapedTransaction {
    pub sender: TransactionSender,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub paymaster: Option<Address>,
    pub paymaster_input: Option<Bytes>,
}

impl ShapedTransaction {
    pub fn from(&self) -> Address {
        self.sender.address()
    }

    pub fn tx_type(&self) -> u8 {
        EIP712_TX_TYPE
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTransaction {
    pub transaction: ShapedTransaction,
    pub gas: U256,
    pub nonce: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub gas_per_pubdata: U256,
    pub chain_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub prepared: PreparedTransaction,
    pub custom_signature: Bytes,
}

/// Fee parameters returned by the chain's fee estimation call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEstimate {
    pub gas_limit: U256,
    pub gas_per_pubdata_limit: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// Loosely-typed transaction request as accepted over JSON-RPC.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<U256>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub tx_type: Option<String>,
    /// Marker only. The pipeline signs the transaction it builds, so a
    /// supplied signature is never carried into it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_signature: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_input: Option<Bytes>,
    /// Overrides the configured `gasPerPubdataByteLimit`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_per_pubdata: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_deps: Option<Vec<Bytes>>,
}

/// A [`TransactionRequest`] after its transaction family has been decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedRequest {
    Eip712(Eip712Request),
    Legacy(TransactionRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip712Request(TransactionRequest);

impl TransactionRequest {
    fn has_eip712_type(&self) -> bool {
        matches!(
            self.tx_type.as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("eip712") | Some("0x71") | Some("113")
        )
    }

    pub fn classify(self) -> TypedRequest {
        let has_marker = self.custom_signature.is_some()
            || self.paymaster.is_some()
            || self.paymaster_input.is_some()
            || self.gas_per_pubdata.is_some()
            || self.factory_deps.is_some();

        if self.has_eip712_type() || has_marker {
            TypedRequest::Eip712(Eip712Request(self))
        } else {
            TypedRequest::Legacy(self)
        }
    }

    /// Classifies the request and turns it into a single-call intent.
    pub fn into_intent(self) -> Result<TransactionIntent> {
        match self.classify() {
            TypedRequest::Eip712(request) => request.into_intent(),
            TypedRequest::Legacy(_) => Err(SmartAccountError::InvalidTransactionShape(
                "include `type: \"eip712\"` or one of `customSignature`, `paymaster`, \
                 `paymasterInput`, `gasPerPubdata`, `factoryDeps`"
                    .to_string(),
            )),
        }
    }
}

impl Eip712Request {
    pub fn request(&self) -> &TransactionRequest {
        &self.0
    }

    /// Fee fields and `gasPerPubdata` become overrides. `customSignature` and
    /// `from` are not part of the intent.
    pub fn into_intent(self) -> Result<TransactionIntent> {
        let request = self.0;
        if request.factory_deps.as_ref().is_some_and(|deps| !deps.is_empty()) {
            return Err(SmartAccountError::InvalidTransactionShape(
                "factory deps are not supported".to_string(),
            ));
        }
        let to = request.to.ok_or_else(|| {
            SmartAccountError::InvalidTransactionShape("missing `to` address".to_string())
        })?;

        let call = Call::new(
            to,
            request.value.unwrap_or_default(),
            request.data.unwrap_or_default(),
        );
        let mut intent = TransactionIntent::single(call).with_overrides(FeeOverrides {
            gas: request.gas,
            nonce: request.nonce,
            max_fee_per_gas: request.max_fee_per_gas,
            max_priority_fee_per_gas: request.max_priority_fee_per_gas,
            gas_per_pubdata: request.gas_per_pubdata,
        });
        intent.paymaster = request.paymaster;
        intent.paymaster_input = request.paymaster_input;
        Ok(intent)
    }
}
