//! Bundle assembly
//!
//! A bundle is an ordered list of signed transactions that must land together,
//! in order, in a single block.

mod assembler;
mod types;

pub use assembler::BundleAssembler;
pub use types::{BundleTransaction, SignedBundle};
