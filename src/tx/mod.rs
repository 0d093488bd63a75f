//! Transaction construction: call encoding, amounts and gas policy

pub mod builder;
mod gas;
pub mod units;

pub use builder::{ContractAddresses, ContractCall, PlannedTransaction, TransactionBuilder};
pub use gas::GasPolicy;
