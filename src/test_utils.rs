// src/test_utils.rs
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use ethers::abi::{AbiDecode, AbiEncode};
use ethers::types::{Address, BlockNumber, Bytes, TransactionReceipt, H256, U256, U64};
use ethers::utils::keccak256;
use ethers::utils::rlp::Rlp;

use crate::abi::{DeployAccountCall, GetAddressForSaltCall};
use crate::chain::{ChainClient, EstimateRequest};
use crate::config::DeploymentConfig;
use crate::error::{ChainError, SignerError};
use crate::signer::{LocalWalletSigner, SignPayload, SignerCapability};
use crate::types::FeeEstimate;

pub const CHAIN_ID: u64 = 11124;
pub const FACTORY: Address = Address::repeat_byte(0xfa);
pub const VALIDATOR: Address = Address::repeat_byte(0xf4);
pub const BATCH_CALLER: Address = Address::repeat_byte(0xbc);

/// Well-known development key.
pub const TEST_PRIVATE_KEY: &str =
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub fn test_signer() -> LocalWalletSigner {
    LocalWalletSigner::from_private_key(TEST_PRIVATE_KEY, CHAIN_ID).unwrap()
}

pub fn test_config() -> DeploymentConfig {
    DeploymentConfig::new(CHAIN_ID, FACTORY, VALIDATOR, BATCH_CALLER)
}

/// Signer whose user declines every request.
#[derive(Debug)]
pub struct RejectingSigner;

#[async_trait]
impl SignerCapability for RejectingSigner {
    fn address(&self) -> Address {
        Address::repeat_byte(0x11)
    }

    async fn sign(&self, _payload: &SignPayload) -> Result<Bytes, SignerError> {
        Err(SignerError::Rejected("user declined".to_string()))
    }
}

struct MockState {
    code: HashMap<Address, Bytes>,
    failing: HashSet<&'static str>,
    nonce: U256,
    gas: U256,
    fee: FeeEstimate,
    calls: Vec<(Address, Bytes)>,
    nonce_reads: Vec<(Address, BlockNumber)>,
    estimate_requests: Vec<EstimateRequest>,
    sent: Vec<Bytes>,
    reverted: HashSet<H256>,
    receipt_status: Option<u64>,
}

/// In-memory chain with a factory at [`FACTORY`]. Broadcasting a
/// `deployAccount` envelope deploys the account, or reverts when the salt is
/// already taken.
pub struct MockChain {
    chain_id: u64,
    state: Mutex<MockState>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::with_chain_id(CHAIN_ID)
    }

    pub fn with_chain_id(chain_id: u64) -> Self {
        Self {
            chain_id,
            state: Mutex::new(MockState {
                code: HashMap::new(),
                failing: HashSet::new(),
                nonce: U256::zero(),
                gas: U256::from(600_000u64),
                fee: FeeEstimate {
                    gas_limit: U256::from(600_000u64),
                    gas_per_pubdata_limit: U256::from(50_000u64),
                    max_fee_per_gas: U256::from(25_000_000u64),
                    max_priority_fee_per_gas: U256::zero(),
                },
                calls: vec![],
                nonce_reads: vec![],
                estimate_requests: vec![],
                sent: vec![],
                reverted: HashSet::new(),
                receipt_status: None,
            }),
        }
    }

    /// Address the mock factory assigns to `salt`.
    pub fn account_for_salt(salt: H256) -> Address {
        let mut preimage = b"account".to_vec();
        preimage.extend_from_slice(salt.as_bytes());
        Address::from_slice(&keccak256(preimage)[12..])
    }

    pub fn hash_of(raw: &Bytes) -> H256 {
        H256::from(keccak256(raw))
    }

    pub fn deploy(&self, address: Address) {
        self.set_code(address, Bytes::from(vec![0x60, 0x80, 0x60, 0x40]));
    }

    pub fn set_code(&self, address: Address, code: Bytes) {
        self.state.lock().unwrap().code.insert(address, code);
    }

    pub fn fail_method(&self, method: &'static str) {
        self.state.lock().unwrap().failing.insert(method);
    }

    pub fn set_nonce(&self, nonce: U256) {
        self.state.lock().unwrap().nonce = nonce;
    }

    pub fn set_gas(&self, gas: U256) {
        self.state.lock().unwrap().gas = gas;
    }

    pub fn set_fee(&self, fee: FeeEstimate) {
        self.state.lock().unwrap().fee = fee;
    }

    /// Forces the status of every receipt.
    pub fn set_receipt_status(&self, status: u64) {
        self.state.lock().unwrap().receipt_status = Some(status);
    }

    pub fn calls(&self) -> Vec<(Address, Bytes)> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn nonce_reads(&self) -> Vec<(Address, BlockNumber)> {
        self.state.lock().unwrap().nonce_reads.clone()
    }

    pub fn estimate_requests(&self) -> Vec<EstimateRequest> {
        self.state.lock().unwrap().estimate_requests.clone()
    }

    pub fn sent_transactions(&self) -> Vec<Bytes> {
        self.state.lock().unwrap().sent.clone()
    }

    fn check(&self, method: &'static str) -> Result<(), ChainError> {
        if self.state.lock().unwrap().failing.contains(method) {
            return Err(ChainError::new(method, "connection refused"));
        }
        Ok(())
    }

    /// Applies a `deployAccount` envelope to the factory. Returns `false` when
    /// the factory would revert.
    fn execute(state: &mut MockState, raw: &Bytes) -> bool {
        let rlp = Rlp::new(&raw[1..]);
        let to: Address = rlp.val_at(4).unwrap();
        let data: Vec<u8> = rlp.val_at(6).unwrap();
        if to != FACTORY {
            return true;
        }
        match DeployAccountCall::decode(&data) {
            Ok(deploy) => {
                let account = Self::account_for_salt(H256::from(deploy.salt));
                if state.code.contains_key(&account) {
                    return false;
                }
                state
                    .code
                    .insert(account, Bytes::from(vec![0x60, 0x80, 0x60, 0x40]));
                true
            }
            Err(_) => false,
        }
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.check("eth_chainId")?;
        Ok(self.chain_id)
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, ChainError> {
        self.check("eth_getCode")?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .code
            .get(&address)
            .cloned()
            .unwrap_or_default())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        self.check("eth_call")?;
        self.state.lock().unwrap().calls.push((to, data.clone()));
        if to != FACTORY {
            return Err(ChainError::new("eth_call", "execution reverted"));
        }
        let call = GetAddressForSaltCall::decode(&data)
            .map_err(|e| ChainError::new("eth_call", e.to_string()))?;
        Ok(Self::account_for_salt(H256::from(call.salt)).encode().into())
    }

    async fn get_transaction_count(
        &self,
        address: Address,
        block: BlockNumber,
    ) -> Result<U256, ChainError> {
        self.check("eth_getTransactionCount")?;
        let mut state = self.state.lock().unwrap();
        state.nonce_reads.push((address, block));
        Ok(state.nonce)
    }

    async fn estimate_gas(&self, request: &EstimateRequest) -> Result<U256, ChainError> {
        self.check("eth_estimateGas")?;
        let mut state = self.state.lock().unwrap();
        state.estimate_requests.push(request.clone());
        Ok(state.gas)
    }

    async fn estimate_fee(&self, request: &EstimateRequest) -> Result<FeeEstimate, ChainError> {
        self.check("zks_estimateFee")?;
        let mut state = self.state.lock().unwrap();
        state.estimate_requests.push(request.clone());
        Ok(state.fee.clone())
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, ChainError> {
        self.check("eth_sendRawTransaction")?;
        let hash = Self::hash_of(&raw);
        let mut state = self.state.lock().unwrap();
        if !Self::execute(&mut state, &raw) {
            state.reverted.insert(hash);
        }
        state.sent.push(raw);
        Ok(hash)
    }

    async fn wait_for_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>, ChainError> {
        self.check("eth_getTransactionReceipt")?;
        let state = self.state.lock().unwrap();
        if !state.sent.iter().any(|raw| Self::hash_of(raw) == hash) {
            return Ok(None);
        }
        let status = state.receipt_status.unwrap_or(if state.reverted.contains(&hash) {
            0
        } else {
            1
        });
        Ok(Some(TransactionReceipt {
            transaction_hash: hash,
            block_number: Some(U64::from(state.sent.len())),
            status: Some(U64::from(status)),
            ..Default::default()
        }))
    }
}
