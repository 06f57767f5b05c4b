// src/abi.rs
use ethers::abi::{self, ParamType, Token};
use ethers::contract::{abigen, EthCall};
use ethers::types::{Address, Bytes};

use crate::error::{Result, SmartAccountError, Stage};
use crate::types::Call;

abigen!(
    AccountFactory,
    r#"[
        function getAddressForSalt(bytes32 salt) external view returns (address)
        function deployAccount(bytes32 salt, bytes initializer) external payable returns (address)
    ]"#,
);

///`initialize(address,address,bytes[],(address,bool,uint256,bytes))`
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, EthCall)]
#[ethcall(
    name = "initialize",
    abi = "initialize(address,address,bytes[],(address,bool,uint256,bytes))"
)]
pub struct InitializeCall {
    pub initial_k1_owner: Address,
    pub initial_k1_validator: Address,
    pub modules: Vec<Bytes>,
    pub init_call: Call,
}

///`batchCall((address,bool,uint256,bytes)[])`
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, EthCall)]
#[ethcall(name = "batchCall", abi = "batchCall((address,bool,uint256,bytes)[])")]
pub struct BatchCallCall {
    pub calls: Vec<Call>,
}

/// ABI-encodes the validator signature triple `(bytes, address, bytes[])`
/// with an empty factory-deps list.
pub fn encode_validator_signature(raw_signature: &Bytes, validator: Address) -> Bytes {
    abi::encode(&[
        Token::Bytes(raw_signature.to_vec()),
        Token::Address(validator),
        Token::Array(vec![]),
    ])
    .into()
}

/// Inverse of [`encode_validator_signature`].
pub fn decode_validator_signature(data: &[u8]) -> Result<(Bytes, Address, Vec<Bytes>)> {
    let abi_error = |message: String| SmartAccountError::Abi {
        stage: Stage::Sign,
        message,
    };
    let tokens = abi::decode(
        &[
            ParamType::Bytes,
            ParamType::Address,
            ParamType::Array(Box::new(ParamType::Bytes)),
        ],
        data,
    )
    .map_err(|e| abi_error(e.to_string()))?;

    match tokens.as_slice() {
        [Token::Bytes(raw), Token::Address(validator), Token::Array(deps)] => {
            let deps = deps
                .iter()
                .map(|dep| match dep {
                    Token::Bytes(dep) => Ok(Bytes::from(dep.clone())),
                    other => Err(abi_error(format!("unexpected factory dep token {other:?}"))),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok((Bytes::from(raw.clone()), *validator, deps))
        }
        other => Err(abi_error(format!("unexpected signature tokens {other:?}"))),
    }
}
