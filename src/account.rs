// src/account.rs
use std::sync::Arc;

use ethers::abi::{AbiDecode, AbiEncode};
use ethers::types::{Address, H256};
use ethers::utils::keccak256;
use tracing::{debug, warn};

use crate::abi::GetAddressForSaltCall;
use crate::chain::ChainClient;
use crate::error::{Result, SmartAccountError, Stage};
use crate::types::{parse_address, DeploymentState, SmartAccountIdentity};

/// Salt the factory deploys an owner's account under: `keccak256(owner)`.
pub fn salt_for_owner(owner: Address) -> H256 {
    H256::from(keccak256(owner.as_bytes()))
}

/// Resolves the counterfactual smart account address of an owner key through
/// the factory's `getAddressForSalt` view.
pub struct AddressDeriver<C> {
    chain: Arc<C>,
    factory: Address,
}

impl<C: ChainClient> AddressDeriver<C> {
    pub fn new(chain: Arc<C>, factory: Address) -> Self {
        Self { chain, factory }
    }

    pub async fn derive(&self, owner: Address) -> Result<SmartAccountIdentity> {
        let salt = salt_for_owner(owner);
        let call = GetAddressForSaltCall { salt: salt.0 };

        let output = self
            .chain
            .call(self.factory, call.encode().into())
            .await
            .map_err(|source| SmartAccountError::ContractRead {
                stage: Stage::DeriveAddress,
                source,
            })?;
        let derived_address = Address::decode(&output).map_err(|e| SmartAccountError::Abi {
            stage: Stage::DeriveAddress,
            message: format!("getAddressForSalt returned {output}: {e}"),
        })?;

        debug!("Derived smart account {:?} for owner {:?}", derived_address, owner);

        Ok(SmartAccountIdentity {
            owner_address: owner,
            salt,
            derived_address,
        })
    }

    /// Same as [`AddressDeriver::derive`] for a hex-encoded owner address.
    pub async fn derive_str(&self, owner: &str) -> Result<SmartAccountIdentity> {
        let owner = parse_address(owner)?;
        self.derive(owner).await
    }
}

/// Classifies an address by the presence of deployed bytecode. Never cached.
pub struct DeploymentOracle<C> {
    chain: Arc<C>,
}

impl<C: ChainClient> DeploymentOracle<C> {
    pub fn new(chain: Arc<C>) -> Self {
        Self { chain }
    }

    /// Strict probe: read failures are returned to the caller.
    pub async fn probe(&self, address: Address) -> Result<DeploymentState> {
        let code = self
            .chain
            .get_code(address)
            .await
            .map_err(|source| SmartAccountError::DeploymentProbeFailed { address, source })?;

        if code.is_empty() {
            Ok(DeploymentState::Undeployed)
        } else {
            Ok(DeploymentState::Deployed)
        }
    }

    /// Lenient probe: a read failure counts as not deployed and is logged.
    pub async fn is_deployed(&self, address: Address) -> bool {
        match self.probe(address).await {
            Ok(state) => state == DeploymentState::Deployed,
            Err(err) => {
                warn!("Deployment probe failed, assuming undeployed: {}", err);
                false
            }
        }
    }

    pub async fn state(&self, address: Address, strict: bool) -> Result<DeploymentState> {
        if strict {
            return self.probe(address).await;
        }
        Ok(if self.is_deployed(address).await {
            DeploymentState::Deployed
        } else {
            DeploymentState::Undeployed
        })
    }
}
