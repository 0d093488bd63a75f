//! Error types for the bundle relayer

use thiserror::Error;

/// Main error type for the relayer
#[derive(Error, Debug)]
pub enum BundlerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chain query error: {0}")]
    ChainQuery(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Invalid amount {input:?}: {reason}")]
    InvalidAmount { input: String, reason: String },

    #[error("Bundle assembly error: {0}")]
    Assembly(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Relay transport error: {0}")]
    RelayTransport(String),

    #[error("Bundle simulation failed: {0}")]
    Simulation(String),

    #[error("Bundle not included in blocks {first_block}..={last_block} after {attempts} attempts")]
    BundleNotIncluded {
        first_block: u64,
        last_block: u64,
        attempts: u32,
    },

    #[error("Nonce conflict for {account} at target block {target_block}: bundle can never land as built")]
    NonceConflict { account: String, target_block: u64 },
}

impl BundlerError {
    /// Whether the bundle must be rebuilt before anything is retried
    pub fn is_fatal(&self) -> bool {
        !matches!(self, BundlerError::BundleNotIncluded { .. })
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            BundlerError::BundleNotIncluded { .. } => 2,
            _ => 1,
        }
    }
}

/// Result type for relayer operations
pub type BundlerResult<T> = Result<T, BundlerError>;
