// src/eip712.rs
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

use ethers::abi::{self, Token};
use ethers::types::transaction::eip712::{EIP712Domain, Eip712, Eip712DomainType, TypedData};
use ethers::types::{Address, Bytes, Signature, H256, U256};
use ethers::utils::keccak256;
use serde_json::Value;
use tracing::{debug, info};

use crate::abi::{decode_validator_signature, encode_validator_signature};
use crate::config::{DeploymentConfig, SignatureScheme};
use crate::error::{Result, SmartAccountError, Stage};
use crate::signer::{SignPayload, SignerCapability};
use crate::types::{PreparedTransaction, SignedTransaction, TransactionSender, EIP712_TX_TYPE};

pub const DOMAIN_NAME: &str = "zkSync";
pub const DOMAIN_VERSION: &str = "2";

const TRANSACTION_FIELDS: [(&str, &str); 13] = [
    ("txType", "uint256"),
    ("from", "uint256"),
    ("to", "uint256"),
    ("gasLimit", "uint256"),
    ("gasPerPubdataByteLimit", "uint256"),
    ("maxFeePerGas", "uint256"),
    ("maxPriorityFeePerGas", "uint256"),
    ("paymaster", "uint256"),
    ("nonce", "uint256"),
    ("value", "uint256"),
    ("data", "bytes"),
    ("factoryDeps", "bytes32[]"),
    ("paymasterInput", "bytes"),
];

const SIGN_MESSAGE_FIELDS: [(&str, &str); 2] = [("details", "string"), ("hash", "bytes32")];

fn encode_type(name: &str, fields: &[(&str, &str)]) -> String {
    let members = fields
        .iter()
        .map(|(field, ty)| format!("{ty} {field}"))
        .collect::<Vec<_>>()
        .join(",");
    format!("{name}({members})")
}

fn type_members(fields: &[(&str, &str)]) -> Vec<Eip712DomainType> {
    fields
        .iter()
        .map(|(name, ty)| Eip712DomainType {
            name: name.to_string(),
            r#type: ty.to_string(),
        })
        .collect()
}

fn domain_members(domain: &EIP712Domain) -> Vec<Eip712DomainType> {
    let mut fields = vec![("name", "string"), ("version", "string"), ("chainId", "uint256")];
    if domain.verifying_contract.is_some() {
        fields.push(("verifyingContract", "address"));
    }
    type_members(&fields)
}

fn hex_value(data: &[u8]) -> Value {
    Value::String(format!("0x{}", hex::encode(data)))
}

fn address_word(address: Address) -> U256 {
    U256::from_big_endian(address.as_bytes())
}

fn typed_data_digest(domain: &EIP712Domain, struct_hash: [u8; 32]) -> H256 {
    let mut input = [0u8; 66];
    input[0] = 0x19;
    input[1] = 0x01;
    input[2..34].copy_from_slice(&domain.separator());
    input[34..].copy_from_slice(&struct_hash);
    H256::from(keccak256(input))
}

/// The chain's own transaction domain: `{name: "zkSync", version: "2", chainId}`.
pub fn transaction_domain(chain_id: u64) -> EIP712Domain {
    EIP712Domain {
        name: Some(DOMAIN_NAME.to_string()),
        version: Some(DOMAIN_VERSION.to_string()),
        chain_id: Some(U256::from(chain_id)),
        verifying_contract: None,
        salt: None,
    }
}

/// Transaction domain scoped to the validator module that checks the signature.
pub fn validator_domain(chain_id: u64, validator: Address) -> EIP712Domain {
    EIP712Domain {
        verifying_contract: Some(validator),
        ..transaction_domain(chain_id)
    }
}

/// EIP-712 `Transaction` struct of a prepared transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionStruct {
    pub chain_id: u64,
    pub tx_type: U256,
    pub from: Address,
    pub to: Address,
    pub gas_limit: U256,
    pub gas_per_pubdata_byte_limit: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster: Address,
    pub nonce: U256,
    pub value: U256,
    pub data: Bytes,
    pub factory_deps: Vec<H256>,
    pub paymaster_input: Bytes,
}

impl TransactionStruct {
    pub fn from_prepared(prepared: &PreparedTransaction) -> Self {
        let tx = &prepared.transaction;
        Self {
            chain_id: prepared.chain_id,
            tx_type: U256::from(EIP712_TX_TYPE),
            from: tx.from(),
            to: tx.to,
            gas_limit: prepared.gas,
            gas_per_pubdata_byte_limit: prepared.gas_per_pubdata,
            max_fee_per_gas: prepared.max_fee_per_gas,
            max_priority_fee_per_gas: prepared.max_priority_fee_per_gas,
            paymaster: tx.paymaster.unwrap_or_default(),
            nonce: prepared.nonce,
            value: tx.value,
            data: tx.data.clone(),
            factory_deps: vec![],
            paymaster_input: tx.paymaster_input.clone().unwrap_or_default(),
        }
    }

    pub fn type_string() -> String {
        encode_type("Transaction", &TRANSACTION_FIELDS)
    }

    fn hash_struct(&self) -> [u8; 32] {
        let deps: Vec<u8> = self.factory_deps.iter().flat_map(|dep| dep.0).collect();
        let encoded = abi::encode(&[
            Token::FixedBytes(keccak256(Self::type_string()).to_vec()),
            Token::Uint(self.tx_type),
            Token::Uint(address_word(self.from)),
            Token::Uint(address_word(self.to)),
            Token::Uint(self.gas_limit),
            Token::Uint(self.gas_per_pubdata_byte_limit),
            Token::Uint(self.max_fee_per_gas),
            Token::Uint(self.max_priority_fee_per_gas),
            Token::Uint(address_word(self.paymaster)),
            Token::Uint(self.nonce),
            Token::Uint(self.value),
            Token::FixedBytes(keccak256(&self.data).to_vec()),
            Token::FixedBytes(keccak256(deps).to_vec()),
            Token::FixedBytes(keccak256(&self.paymaster_input).to_vec()),
        ]);
        keccak256(encoded)
    }

    /// Digest the chain (and the validator) recompute for this transaction.
    pub fn digest(&self) -> H256 {
        typed_data_digest(&transaction_domain(self.chain_id), self.hash_struct())
    }

    /// The same struct as `eth_signTypedData_v4` JSON.
    pub fn to_typed_data(&self) -> TypedData {
        let domain = transaction_domain(self.chain_id);
        let mut types = BTreeMap::new();
        types.insert("EIP712Domain".to_string(), domain_members(&domain));
        types.insert("Transaction".to_string(), type_members(&TRANSACTION_FIELDS));

        let number = |value: U256| Value::String(value.to_string());
        let mut message = BTreeMap::new();
        message.insert("txType".to_string(), number(self.tx_type));
        message.insert("from".to_string(), number(address_word(self.from)));
        message.insert("to".to_string(), number(address_word(self.to)));
        message.insert("gasLimit".to_string(), number(self.gas_limit));
        message.insert(
            "gasPerPubdataByteLimit".to_string(),
            number(self.gas_per_pubdata_byte_limit),
        );
        message.insert("maxFeePerGas".to_string(), number(self.max_fee_per_gas));
        message.insert(
            "maxPriorityFeePerGas".to_string(),
            number(self.max_priority_fee_per_gas),
        );
        message.insert("paymaster".to_string(), number(address_word(self.paymaster)));
        message.insert("nonce".to_string(), number(self.nonce));
        message.insert("value".to_string(), number(self.value));
        message.insert("data".to_string(), hex_value(&self.data));
        message.insert(
            "factoryDeps".to_string(),
            Value::Array(self.factory_deps.iter().map(|dep| hex_value(dep.as_bytes())).collect()),
        );
        message.insert("paymasterInput".to_string(), hex_value(&self.paymaster_input));

        TypedData {
            domain,
            types,
            primary_type: "Transaction".to_string(),
            message,
        }
    }
}

impl Eip712 for TransactionStruct {
    type Error = Infallible;

    fn domain(&self) -> Result<EIP712Domain, Self::Error> {
        Ok(transaction_domain(self.chain_id))
    }

    fn type_hash() -> Result<[u8; 32], Self::Error> {
        Ok(keccak256(Self::type_string()))
    }

    fn struct_hash(&self) -> Result<[u8; 32], Self::Error> {
        Ok(self.hash_struct())
    }
}

/// `SignMessage{details, hash}` wrapper around a transaction digest, under the
/// validator-scoped domain.
pub fn sign_message_typed_data(
    chain_id: u64,
    validator: Address,
    details: &str,
    hash: H256,
) -> TypedData {
    let domain = validator_domain(chain_id, validator);
    let mut types = BTreeMap::new();
    types.insert("EIP712Domain".to_string(), domain_members(&domain));
    types.insert("SignMessage".to_string(), type_members(&SIGN_MESSAGE_FIELDS));

    let mut message = BTreeMap::new();
    message.insert("details".to_string(), Value::String(details.to_string()));
    message.insert("hash".to_string(), hex_value(hash.as_bytes()));

    TypedData {
        domain,
        types,
        primary_type: "SignMessage".to_string(),
        message,
    }
}

/// Digest of [`sign_message_typed_data`].
pub fn sign_message_digest(chain_id: u64, validator: Address, details: &str, hash: H256) -> H256 {
    let struct_hash = keccak256(abi::encode(&[
        Token::FixedBytes(keccak256(encode_type("SignMessage", &SIGN_MESSAGE_FIELDS)).to_vec()),
        Token::FixedBytes(keccak256(details.as_bytes()).to_vec()),
        Token::FixedBytes(hash.as_bytes().to_vec()),
    ]));
    typed_data_digest(&validator_domain(chain_id, validator), struct_hash)
}

/// Produces the custom signature of a prepared transaction.
pub struct Eip712Signer {
    signer: Option<Arc<dyn SignerCapability>>,
    validator: Address,
    scheme: SignatureScheme,
    details: String,
}

impl Eip712Signer {
    pub fn new(
        signer: Option<Arc<dyn SignerCapability>>,
        validator: Address,
        scheme: SignatureScheme,
        details: impl Into<String>,
    ) -> Self {
        Self {
            signer,
            validator,
            scheme,
            details: details.into(),
        }
    }

    pub fn from_config(signer: Option<Arc<dyn SignerCapability>>, config: &DeploymentConfig) -> Self {
        Self::new(
            signer,
            config.validator,
            config.signature_scheme,
            config.sign_message_details.clone(),
        )
    }

    /// Digest the signer is asked to sign for `sender` under this signer's scheme.
    fn signing_payload(&self, tx_struct: &TransactionStruct, sender: TransactionSender) -> SignPayload {
        let digest = tx_struct.digest();
        match (sender, self.scheme) {
            (_, SignatureScheme::RawDigest) => SignPayload::Digest(digest),
            (TransactionSender::Owner(_), _) | (_, SignatureScheme::TypedTransaction) => {
                SignPayload::TypedData(Box::new(tx_struct.to_typed_data()))
            }
            (TransactionSender::SmartAccount(_), SignatureScheme::SignMessage) => {
                SignPayload::TypedData(Box::new(sign_message_typed_data(
                    tx_struct.chain_id,
                    self.validator,
                    &self.details,
                    digest,
                )))
            }
        }
    }

    pub async fn sign(&self, prepared: PreparedTransaction) -> Result<SignedTransaction> {
        let signer = self
            .signer
            .as_ref()
            .ok_or(SmartAccountError::AccountNotFound)?;

        let sender = prepared.transaction.sender;
        if let TransactionSender::Owner(owner) = sender {
            if owner != signer.address() {
                return Err(SmartAccountError::AccountNotFound);
            }
        }

        let tx_struct = TransactionStruct::from_prepared(&prepared);
        debug!("Transaction digest {:?}", tx_struct.digest());
        info!(
            "Requesting {:?} signature for transaction from {:?}",
            self.scheme,
            sender.address()
        );

        let payload = self.signing_payload(&tx_struct, sender);
        let raw_signature = signer.sign(&payload).await?;

        let custom_signature = match sender {
            TransactionSender::SmartAccount(_) => {
                encode_validator_signature(&raw_signature, self.validator)
            }
            TransactionSender::Owner(_) => raw_signature,
        };

        Ok(SignedTransaction {
            prepared,
            custom_signature,
        })
    }

    /// Recomputes the digest the validator (or the default account, for
    /// owner-sent transactions) checks, and recovers the key that signed it.
    pub fn recover_owner(&self, signed: &SignedTransaction) -> Result<Address> {
        let tx_struct = TransactionStruct::from_prepared(&signed.prepared);
        let sender = signed.prepared.transaction.sender;

        let raw_signature = match sender {
            TransactionSender::SmartAccount(_) => {
                let (raw, validator, factory_deps) =
                    decode_validator_signature(&signed.custom_signature)?;
                if validator != self.validator || !factory_deps.is_empty() {
                    return Err(SmartAccountError::InvalidTransactionShape(format!(
                        "signature is bound to validator {validator:?} with {} factory deps",
                        factory_deps.len()
                    )));
                }
                raw
            }
            TransactionSender::Owner(_) => signed.custom_signature.clone(),
        };

        let digest = match self.signing_payload(&tx_struct, sender) {
            SignPayload::Digest(digest) => digest,
            SignPayload::TypedData(typed_data) => {
                let encoded = typed_data.encode_eip712().map_err(|e| SmartAccountError::Abi {
                    stage: Stage::Sign,
                    message: e.to_string(),
                })?;
                H256::from(encoded)
            }
        };

        let signature =
            Signature::try_from(raw_signature.as_ref()).map_err(|e| SmartAccountError::Abi {
                stage: Stage::Sign,
                message: e.to_string(),
            })?;
        signature.recover(digest).map_err(|e| SmartAccountError::Abi {
            stage: Stage::Sign,
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_signer, RejectingSigner, CHAIN_ID};
    use crate::types::ShapedTransaction;

    const VALIDATOR: Address = Address::repeat_byte(0xf4);

    fn prepared(sender: TransactionSender) -> PreparedTransaction {
        PreparedTransaction {
            transaction: ShapedTransaction {
                sender,
                to: Address::repeat_byte(0xc4),
                data: Bytes::from(vec![0x40, 0xc1, 0x0f, 0x19]),
                value: U256::from(10u64),
                paymaster: Some(Address::repeat_byte(0xa8)),
                paymaster_input: Some(Bytes::from(vec![0x8c, 0x5a, 0x34, 0x45])),
            },
            gas: U256::from(500_000u64),
            nonce: U256::from(3u64),
            max_fee_per_gas: U256::from(25_000_000u64),
            max_priority_fee_per_gas: U256::zero(),
            gas_per_pubdata: U256::from(50_000u64),
            chain_id: CHAIN_ID,
        }
    }

    fn signer_for(scheme: SignatureScheme) -> (Eip712Signer, Address) {
        let signer = test_signer();
        let owner = signer.address();
        (
            Eip712Signer::new(
                Some(Arc::new(signer)),
                VALIDATOR,
                scheme,
                crate::config::DEFAULT_SIGN_MESSAGE_DETAILS,
            ),
            owner,
        )
    }

    #[test]
    fn test_type_string() {
        assert_eq!(
            TransactionStruct::type_string(),
            "Transaction(uint256 txType,uint256 from,uint256 to,uint256 gasLimit,\
             uint256 gasPerPubdataByteLimit,uint256 maxFeePerGas,uint256 maxPriorityFeePerGas,\
             uint256 paymaster,uint256 nonce,uint256 value,bytes data,bytes32[] factoryDeps,\
             bytes paymasterInput)"
        );
    }

    #[test]
    fn test_domain_separator_fields() {
        let expected = keccak256(abi::encode(&[
            Token::FixedBytes(
                keccak256("EIP712Domain(string name,string version,uint256 chainId)").to_vec(),
            ),
            Token::FixedBytes(keccak256("zkSync").to_vec()),
            Token::FixedBytes(keccak256("2").to_vec()),
            Token::Uint(U256::from(CHAIN_ID)),
        ]));
        assert_eq!(transaction_domain(CHAIN_ID).separator(), expected);
        assert_ne!(
            validator_domain(CHAIN_ID, VALIDATOR).separator(),
            transaction_domain(CHAIN_ID).separator()
        );
    }

    #[test]
    fn test_digest_matches_typed_data_encoding() {
        let tx_struct =
            TransactionStruct::from_prepared(&prepared(TransactionSender::SmartAccount(Address::repeat_byte(0xaa))));

        let typed = tx_struct.to_typed_data();
        assert_eq!(H256::from(typed.encode_eip712().unwrap()), tx_struct.digest());
        assert_eq!(
            tx_struct.encode_eip712().map(H256::from),
            Ok(tx_struct.digest())
        );
    }

    #[test]
    fn test_sign_message_wrapper_matches_manual_digest() {
        let hash = H256::repeat_byte(0x5e);
        let typed = sign_message_typed_data(
            CHAIN_ID,
            VALIDATOR,
            crate::config::DEFAULT_SIGN_MESSAGE_DETAILS,
            hash,
        );

        assert_eq!(typed.primary_type, "SignMessage");
        assert_eq!(typed.domain.verifying_contract, Some(VALIDATOR));
        assert_eq!(
            H256::from(typed.encode_eip712().unwrap()),
            sign_message_digest(CHAIN_ID, VALIDATOR, crate::config::DEFAULT_SIGN_MESSAGE_DETAILS, hash)
        );
    }

    #[test]
    fn test_digest_covers_every_field() {
        let base = TransactionStruct::from_prepared(&prepared(TransactionSender::SmartAccount(
            Address::repeat_byte(0xaa),
        )));
        let mut bumped_nonce = base.clone();
        bumped_nonce.nonce += U256::one();
        let mut other_chain = base.clone();
        other_chain.chain_id += 1;
        let mut no_paymaster = base.clone();
        no_paymaster.paymaster = Address::zero();

        assert_ne!(base.digest(), bumped_nonce.digest());
        assert_ne!(base.digest(), other_chain.digest());
        assert_ne!(base.digest(), no_paymaster.digest());
    }

    #[tokio::test]
    async fn test_smart_account_signature_round_trip() {
        let (eip712_signer, owner) = signer_for(SignatureScheme::SignMessage);
        let prepared = prepared(TransactionSender::SmartAccount(Address::repeat_byte(0xaa)));

        let signed = eip712_signer.sign(prepared.clone()).await.unwrap();
        assert_eq!(signed.prepared, prepared);

        let (raw, validator, deps) = decode_validator_signature(&signed.custom_signature).unwrap();
        assert_eq!(raw.len(), 65);
        assert_eq!(validator, VALIDATOR);
        assert!(deps.is_empty());

        // the raw signature covers the SignMessage wrapper, not the bare digest
        let digest = TransactionStruct::from_prepared(&prepared).digest();
        let wrapped = sign_message_digest(
            CHAIN_ID,
            VALIDATOR,
            crate::config::DEFAULT_SIGN_MESSAGE_DETAILS,
            digest,
        );
        let signature = Signature::try_from(raw.as_ref()).unwrap();
        assert_eq!(signature.recover(wrapped).unwrap(), owner);
        assert_eq!(eip712_signer.recover_owner(&signed).unwrap(), owner);
    }

    #[tokio::test]
    async fn test_alternative_schemes_recover_owner() {
        for scheme in [SignatureScheme::TypedTransaction, SignatureScheme::RawDigest] {
            let (eip712_signer, owner) = signer_for(scheme);
            let prepared = prepared(TransactionSender::SmartAccount(Address::repeat_byte(0xaa)));

            let signed = eip712_signer.sign(prepared.clone()).await.unwrap();
            let (raw, _, _) = decode_validator_signature(&signed.custom_signature).unwrap();
            let signature = Signature::try_from(raw.as_ref()).unwrap();
            let digest = TransactionStruct::from_prepared(&prepared).digest();

            assert_eq!(signature.recover(digest).unwrap(), owner);
            assert_eq!(eip712_signer.recover_owner(&signed).unwrap(), owner);
        }
    }

    #[tokio::test]
    async fn test_owner_sent_transaction_carries_raw_signature() {
        let (eip712_signer, owner) = signer_for(SignatureScheme::SignMessage);
        let prepared = prepared(TransactionSender::Owner(owner));

        let signed = eip712_signer.sign(prepared.clone()).await.unwrap();
        assert_eq!(signed.custom_signature.len(), 65);

        let digest = TransactionStruct::from_prepared(&prepared).digest();
        let signature = Signature::try_from(signed.custom_signature.as_ref()).unwrap();
        assert_eq!(signature.recover(digest).unwrap(), owner);
        assert_eq!(eip712_signer.recover_owner(&signed).unwrap(), owner);
    }

    #[tokio::test]
    async fn test_missing_signer_is_account_not_found() {
        let eip712_signer = Eip712Signer::new(None, VALIDATOR, SignatureScheme::SignMessage, "");
        let err = eip712_signer
            .sign(prepared(TransactionSender::SmartAccount(Address::repeat_byte(0xaa))))
            .await
            .unwrap_err();
        assert!(matches!(err, SmartAccountError::AccountNotFound));
    }

    #[tokio::test]
    async fn test_foreign_owner_is_account_not_found() {
        let (eip712_signer, _) = signer_for(SignatureScheme::SignMessage);
        let err = eip712_signer
            .sign(prepared(TransactionSender::Owner(Address::repeat_byte(0x99))))
            .await
            .unwrap_err();
        assert!(matches!(err, SmartAccountError::AccountNotFound));
    }

    #[tokio::test]
    async fn test_rejected_signature_request() {
        let eip712_signer = Eip712Signer::new(
            Some(Arc::new(RejectingSigner)),
            VALIDATOR,
            SignatureScheme::SignMessage,
            "",
        );
        let err = eip712_signer
            .sign(prepared(TransactionSender::SmartAccount(Address::repeat_byte(0xaa))))
            .await
            .unwrap_err();
        assert!(matches!(err, SmartAccountError::SignerRejected(_)));
        assert!(err.is_pre_broadcast());
    }
}
