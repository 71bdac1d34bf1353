mod keys;
mod store;

pub use keys::LedgerKeys;
pub use store::{derive_estimate, StepLedger, DERIVED_FACTOR};
