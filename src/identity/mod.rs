//! Signing identities for the bundle flow
//!
//! Two independent accounts take part in every bundle:
//! - the contract identity, which owns the bundler contract calls
//! - the token identity, which owns the token contract calls
//!
//! Each owns its own nonce sequence.

mod nonce;

pub use nonce::NonceManager;

use crate::chain::ChainClient;
use crate::config::IdentitiesConfig;
use crate::error::{BundlerError, BundlerResult};

use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes};
use std::fmt;
use tracing::info;

/// Which of the two transacting accounts a request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityRole {
    Contract,
    Token,
}

impl IdentityRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityRole::Contract => "contract",
            IdentityRole::Token => "token",
        }
    }
}

impl fmt::Display for IdentityRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An account plus its signing credential
pub struct Identity {
    role: IdentityRole,
    wallet: LocalWallet,
}

impl Identity {
    /// Create an identity from a hex private key (with or without 0x prefix)
    pub fn from_private_key(role: IdentityRole, key: &str, chain_id: u64) -> BundlerResult<Self> {
        let key_hex = key.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let wallet = key_hex
            .parse::<LocalWallet>()
            .map_err(|e| BundlerError::Wallet(format!("Invalid {} signer key: {}", role, e)))?
            .with_chain_id(chain_id);

        Ok(Self { role, wallet })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("role", &self.role)
            .field("address", &self.address())
            .finish()
    }
}

/// Holds both identities and their nonce sequences
pub struct IdentityRegistry {
    contract: Identity,
    token: Identity,
    nonces: NonceManager,
    chain_id: u64,
}

impl IdentityRegistry {
    /// Build the registry; both identities must be distinct accounts
    pub fn new(contract: Identity, token: Identity, chain_id: u64) -> BundlerResult<Self> {
        if contract.address() == token.address() {
            return Err(BundlerError::Wallet(
                "Contract and token identities must be different accounts".to_string(),
            ));
        }

        info!(
            contract = ?contract.address(),
            token = ?token.address(),
            chain_id,
            "Identity registry initialized"
        );

        Ok(Self {
            contract,
            token,
            nonces: NonceManager::new(),
            chain_id,
        })
    }

    /// Load both identities from configuration
    pub fn from_config(config: &IdentitiesConfig, chain_id: u64) -> BundlerResult<Self> {
        let contract = Identity::from_private_key(
            IdentityRole::Contract,
            &config.contract_signer_key,
            chain_id,
        )?;
        let token =
            Identity::from_private_key(IdentityRole::Token, &config.token_signer_key, chain_id)?;

        Self::new(contract, token, chain_id)
    }

    pub fn get(&self, role: IdentityRole) -> &Identity {
        match role {
            IdentityRole::Contract => &self.contract,
            IdentityRole::Token => &self.token,
        }
    }

    pub fn address(&self, role: IdentityRole) -> Address {
        self.get(role).address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Allocate the identity's next nonce, re-reading the chain
    pub async fn nonce_for(&self, role: IdentityRole, chain: &dyn ChainClient) -> BundlerResult<u64> {
        self.nonces.allocate(role, self.address(role), chain).await
    }

    /// Hand back a nonce whose transaction was never broadcast
    pub async fn release_nonce(&self, role: IdentityRole, nonce: u64) {
        self.nonces.release(role, nonce).await
    }

    /// Sign a transaction as `role`, returning the raw signed bytes
    pub async fn sign(&self, role: IdentityRole, tx: &TypedTransaction) -> BundlerResult<Bytes> {
        let identity = self.get(role);

        if let Some(chain_id) = tx.chain_id() {
            if chain_id.as_u64() != self.chain_id {
                return Err(BundlerError::Wallet(format!(
                    "Transaction targets chain {} but identities are bound to {}",
                    chain_id, self.chain_id
                )));
            }
        }

        let mut tx = tx.clone();
        tx.set_from(identity.address());

        let signature = identity
            .wallet
            .sign_transaction(&tx)
            .await
            .map_err(|e| BundlerError::Wallet(format!("Failed to sign as {}: {}", role, e)))?;

        Ok(tx.rlp_signed(&signature))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ethers::types::TransactionRequest;

    pub(crate) const CONTRACT_KEY: &str =
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    pub(crate) const TOKEN_KEY: &str =
        "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    pub(crate) fn test_registry(chain_id: u64) -> IdentityRegistry {
        let contract =
            Identity::from_private_key(IdentityRole::Contract, CONTRACT_KEY, chain_id).unwrap();
        let token = Identity::from_private_key(IdentityRole::Token, TOKEN_KEY, chain_id).unwrap();
        IdentityRegistry::new(contract, token, chain_id).unwrap()
    }

    #[test]
    fn test_keys_with_and_without_prefix() {
        let registry = test_registry(1);
        assert_eq!(
            registry.address(IdentityRole::Contract),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse::<Address>().unwrap()
        );
        assert_eq!(
            registry.address(IdentityRole::Token),
            "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".parse::<Address>().unwrap()
        );
    }

    #[test]
    fn test_rejects_shared_identity() {
        let a = Identity::from_private_key(IdentityRole::Contract, CONTRACT_KEY, 1).unwrap();
        let b = Identity::from_private_key(IdentityRole::Token, CONTRACT_KEY, 1).unwrap();
        assert!(matches!(
            IdentityRegistry::new(a, b, 1),
            Err(BundlerError::Wallet(_))
        ));
    }

    #[test]
    fn test_rejects_malformed_key() {
        assert!(Identity::from_private_key(IdentityRole::Token, "0xnothex", 1).is_err());
    }

    #[tokio::test]
    async fn test_sign_recovers_to_identity() {
        let registry = test_registry(11155111);
        let tx: TypedTransaction = TransactionRequest::new()
            .to(Address::repeat_byte(9))
            .nonce(3)
            .gas(21_000)
            .gas_price(1)
            .chain_id(11155111u64)
            .into();

        let raw = registry.sign(IdentityRole::Token, &tx).await.unwrap();
        let rlp = ethers::utils::rlp::Rlp::new(raw.as_ref());
        let (decoded, signature) = TypedTransaction::decode_signed(&rlp).unwrap();

        assert_eq!(decoded.nonce(), Some(&3.into()));
        assert_eq!(
            signature.recover(decoded.sighash()).unwrap(),
            registry.address(IdentityRole::Token)
        );
    }

    #[tokio::test]
    async fn test_sign_rejects_foreign_chain() {
        let registry = test_registry(1);
        let tx: TypedTransaction = TransactionRequest::new().chain_id(5u64).into();
        assert!(registry.sign(IdentityRole::Contract, &tx).await.is_err());
    }
}
