//! Public batch dispatch
//!
//! A single `sendBatch` call broadcast through the public mempool; no bundling,
//! no relay and no retries.

mod batch;

pub use batch::{BatchDispatcher, BatchReceipt};
