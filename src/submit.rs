// src/submit.rs
use std::sync::Arc;

use ethers::types::{Bytes, TransactionReceipt, H256, U64};
use ethers::utils::rlp::RlpStream;
use tracing::{info, warn};

use crate::chain::ChainClient;
use crate::error::{Result, SmartAccountError, Stage};
use crate::types::{SignedTransaction, EIP712_TX_TYPE};

/// Canonical `0x71` envelope of a signed transaction.
pub fn serialize(signed: &SignedTransaction) -> Bytes {
    let prepared = &signed.prepared;
    let tx = &prepared.transaction;

    let mut rlp = RlpStream::new_list(16);
    rlp.append(&prepared.nonce);
    rlp.append(&prepared.max_priority_fee_per_gas);
    rlp.append(&prepared.max_fee_per_gas);
    rlp.append(&prepared.gas);
    rlp.append(&tx.to);
    rlp.append(&tx.value);
    rlp.append(&tx.data.to_vec());
    rlp.append(&prepared.chain_id);
    // r and s stay empty, the signature travels in customSignature
    rlp.append_empty_data();
    rlp.append_empty_data();
    rlp.append(&prepared.chain_id);
    rlp.append(&tx.from());
    rlp.append(&prepared.gas_per_pubdata);
    rlp.begin_list(0);
    rlp.append(&signed.custom_signature.to_vec());
    match tx.paymaster {
        Some(paymaster) => {
            rlp.begin_list(2);
            rlp.append(&paymaster);
            rlp.append(&tx.paymaster_input.clone().unwrap_or_default().to_vec());
        }
        None => {
            rlp.begin_list(0);
        }
    }

    let mut encoded = vec![EIP712_TX_TYPE];
    encoded.extend_from_slice(&rlp.out());
    Bytes::from(encoded)
}

/// Broadcasts signed envelopes and follows them to a receipt.
pub struct Submitter<C> {
    chain: Arc<C>,
}

impl<C: ChainClient> Submitter<C> {
    pub fn new(chain: Arc<C>) -> Self {
        Self { chain }
    }

    /// Refuses to broadcast to a chain other than the one the transaction was
    /// prepared and signed for.
    pub async fn submit(&self, signed: &SignedTransaction) -> Result<H256> {
        let expected = signed.prepared.chain_id;
        let actual = self
            .chain
            .chain_id()
            .await
            .map_err(|source| SmartAccountError::ChainRead {
                stage: Stage::Broadcast,
                source,
            })?;
        if actual != expected {
            return Err(SmartAccountError::ChainMismatch { expected, actual });
        }

        let raw = serialize(signed);
        let hash = self
            .chain
            .send_raw_transaction(raw)
            .await
            .map_err(SmartAccountError::BroadcastFailed)?;

        info!(
            "Broadcast transaction {:?} from {:?} with nonce {}",
            hash,
            signed.prepared.transaction.from(),
            signed.prepared.nonce
        );
        Ok(hash)
    }

    pub async fn wait_for_receipt(&self, hash: H256) -> Result<TransactionReceipt> {
        match self.chain.wait_for_receipt(hash).await {
            Ok(Some(receipt)) if receipt.status == Some(U64::zero()) => {
                warn!("Transaction {:?} reverted", hash);
                Err(SmartAccountError::TransactionReverted(hash))
            }
            Ok(Some(receipt)) => {
                info!(
                    "Transaction {:?} included in block {:?}",
                    hash, receipt.block_number
                );
                Ok(receipt)
            }
            Ok(None) => Err(SmartAccountError::ReceiptUnavailable {
                hash,
                reason: "transaction dropped from the mempool".to_string(),
            }),
            Err(err) => Err(SmartAccountError::ReceiptUnavailable {
                hash,
                reason: err.to_string(),
            }),
        }
    }
}
