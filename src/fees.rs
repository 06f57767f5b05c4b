// src/fees.rs
use std::sync::Arc;

use ethers::types::{BlockNumber, U256};
use tracing::{debug, info};

use crate::chain::{ChainClient, EstimateRequest};
use crate::config::DeploymentConfig;
use crate::error::{Result, SmartAccountError, Stage};
use crate::types::{FeeOverrides, PreparedTransaction, ShapedTransaction};

/// Fills nonce, gas limit and fee fields of a shaped transaction from chain state.
pub struct FeeAndNonceResolver<C> {
    chain: Arc<C>,
    chain_id: u64,
    gas_per_pubdata: U256,
}

impl<C: ChainClient> FeeAndNonceResolver<C> {
    pub fn new(chain: Arc<C>, chain_id: u64, gas_per_pubdata: U256) -> Self {
        Self {
            chain,
            chain_id,
            gas_per_pubdata,
        }
    }

    pub fn from_config(chain: Arc<C>, config: &DeploymentConfig) -> Self {
        Self::new(chain, config.chain_id, config.gas_per_pubdata)
    }

    /// Reads nonce (pending tag), gas and fees concurrently for the shaped
    /// transaction's sender. Supplied overrides skip their read.
    pub async fn resolve(
        &self,
        shaped: ShapedTransaction,
        overrides: &FeeOverrides,
    ) -> Result<PreparedTransaction> {
        let account = shaped.from();
        let gas_per_pubdata = overrides.gas_per_pubdata.unwrap_or(self.gas_per_pubdata);
        let request = EstimateRequest::from_shaped(&shaped, gas_per_pubdata);

        let nonce = async {
            match overrides.nonce {
                Some(nonce) => Ok(nonce),
                None => self
                    .chain
                    .get_transaction_count(account, BlockNumber::Pending)
                    .await
                    .map_err(|source| SmartAccountError::ChainRead {
                        stage: Stage::ResolveNonce,
                        source,
                    }),
            }
        };

        let gas = async {
            match overrides.gas {
                Some(gas) => Ok(gas),
                None => self.chain.estimate_gas(&request).await.map_err(|source| {
                    SmartAccountError::ChainRead {
                        stage: Stage::EstimateGas,
                        source,
                    }
                }),
            }
        };

        let fees = async {
            match (overrides.max_fee_per_gas, overrides.max_priority_fee_per_gas) {
                (Some(max_fee), Some(max_priority)) => {
                    Ok::<_, SmartAccountError>((max_fee, max_priority))
                }
                (max_fee, max_priority) => {
                    let estimate = self.chain.estimate_fee(&request).await.map_err(|source| {
                        SmartAccountError::ChainRead {
                            stage: Stage::EstimateFee,
                            source,
                        }
                    })?;

                    if let (Some(max_fee), None) = (max_fee, max_priority) {
                        if max_fee < estimate.max_priority_fee_per_gas {
                            return Err(SmartAccountError::FeeTooLow {
                                max_fee_per_gas: max_fee,
                                max_priority_fee_per_gas: estimate.max_priority_fee_per_gas,
                            });
                        }
                    }

                    Ok((
                        max_fee.unwrap_or(estimate.max_fee_per_gas),
                        max_priority.unwrap_or(estimate.max_priority_fee_per_gas),
                    ))
                }
            }
        };

        let (nonce, gas, (max_fee_per_gas, max_priority_fee_per_gas)) =
            tokio::try_join!(nonce, gas, fees)?;

        // the fee cap must cover the tip, whichever side was supplied
        if max_fee_per_gas < max_priority_fee_per_gas {
            return Err(SmartAccountError::FeeTooLow {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            });
        }

        debug!(
            "Resolved nonce {} gas {} maxFeePerGas {} maxPriorityFeePerGas {}",
            nonce, gas, max_fee_per_gas, max_priority_fee_per_gas
        );
        info!("Prepared transaction for {:?} with nonce {}", account, nonce);

        Ok(PreparedTransaction {
            transaction: shaped,
            gas,
            nonce,
            max_fee_per_gas,
            max_priority_fee_per_gas,
            gas_per_pubdata,
            chain_id: self.chain_id,
        })
    }
}
