// src/encoder.rs
use ethers::abi::AbiEncode;
use ethers::types::{Address, Bytes};

use crate::abi::{BatchCallCall, InitializeCall};
use crate::error::Result;
use crate::types::{Call, TransactionIntent};

/// ABI call-data construction for single calls, batches and account initializers.
#[derive(Debug, Clone, Copy)]
pub struct CallEncoder {
    batch_caller: Address,
}

impl CallEncoder {
    pub fn new(batch_caller: Address) -> Self {
        Self { batch_caller }
    }

    pub fn batch_caller(&self) -> Address {
        self.batch_caller
    }

    /// Call-data of a single call, already ABI-encoded by its producer.
    pub fn encode_single(&self, call: &Call) -> Bytes {
        call.call_data.clone()
    }

    /// `batchCall(calls)`. Every sub-call is forced to `allowFailure = false`
    /// so one failing call reverts the whole batch.
    pub fn encode_batch(&self, calls: &[Call]) -> Bytes {
        let calls = calls
            .iter()
            .cloned()
            .map(|call| Call {
                allow_failure: false,
                ..call
            })
            .collect();
        BatchCallCall { calls }.encode().into()
    }

    /// The call an account runs right after deployment: the intent's only
    /// call, or the batch caller carrying the whole batch and its total value.
    pub fn init_call(&self, intent: &TransactionIntent) -> Result<Call> {
        match intent.calls() {
            [call] => Ok(Call::new(call.target, call.value, self.encode_single(call))),
            calls => Ok(Call::new(
                self.batch_caller,
                intent.total_value()?,
                self.encode_batch(calls),
            )),
        }
    }

    /// `initialize(owner, validator, [], initCall)` of the smart account.
    pub fn encode_initializer(&self, owner: Address, validator: Address, init_call: Call) -> Bytes {
        InitializeCall {
            initial_k1_owner: owner,
            initial_k1_validator: validator,
            modules: vec![],
            init_call: Call {
                allow_failure: false,
                ..init_call
            },
        }
        .encode()
        .into()
    }
}
